//! Shared fixtures for unit tests.

use serde::{Deserialize, Serialize};

use lingocache_core::storage::Entity;

/// A vocabulary flashcard, the entity most dashboard screens read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flashcard {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub deck: String,
    pub front: String,
    pub back: String,
    pub level: u32,
}

impl Flashcard {
    pub fn new(deck: &str, front: &str, back: &str) -> Self {
        Self {
            id: None,
            deck: deck.to_string(),
            front: front.to_string(),
            back: back.to_string(),
            level: 0,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }
}

impl Entity for Flashcard {
    const ENTITY_TYPE: &'static str = "Flashcard";

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }
}

/// Installs a test-friendly tracing subscriber honoring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lingocache=debug".into()),
        )
        .with_test_writer()
        .try_init();
}
