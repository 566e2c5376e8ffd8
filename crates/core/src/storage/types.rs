use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Comparison applied by a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Field value is one of the values of a JSON array.
    In,
    /// String field contains the substring, or array field contains the value.
    Contains,
}

/// A single `field <op> value` condition over an entity's JSON representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Eq, value)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Options accepted by `find_one`, `find_many` and `count`.
///
/// Filters are combined with AND. The struct serializes with a fixed field
/// order, and the cache canonicalizes it again before building a key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<OrderBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::eq(field, value))
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// A page of results returned by `find_many`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    /// Number of matching entities before pagination.
    pub total: u64,
    pub offset: usize,
    pub limit: Option<usize>,
    pub has_more: bool,
}

/// A partial update: top-level fields replace the entity's fields.
pub type Patch = Map<String, Value>;

/// One element of an `update_batch` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchUpdate {
    pub id: String,
    pub patch: Patch,
}

impl BatchUpdate {
    pub fn new(id: impl Into<String>, patch: Patch) -> Self {
        Self {
            id: id.into(),
            patch,
        }
    }
}
