use std::time::Duration;

/// Named TTL presets exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TtlPreset {
    /// 30 seconds.
    Short,
    /// 2 minutes.
    Medium,
    /// 10 minutes.
    Long,
    /// 1 hour.
    VeryLong,
    /// 24 hours.
    Day,
}

impl TtlPreset {
    pub const fn duration(self) -> Duration {
        match self {
            TtlPreset::Short => Duration::from_secs(30),
            TtlPreset::Medium => Duration::from_secs(2 * 60),
            TtlPreset::Long => Duration::from_secs(10 * 60),
            TtlPreset::VeryLong => Duration::from_secs(60 * 60),
            TtlPreset::Day => Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl From<TtlPreset> for Duration {
    fn from(preset: TtlPreset) -> Self {
        preset.duration()
    }
}
