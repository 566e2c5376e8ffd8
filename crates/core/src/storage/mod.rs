mod error;
mod query;
mod traits;
mod types;

pub use error::{RepositoryError, Result};
pub use query::{apply_patch, compare_values, matches_filters, paginate, sort_entities};
pub use traits::{Entity, Repository};
pub use types::{BatchUpdate, Filter, FilterOp, OrderBy, Page, Patch, QueryOptions, SortDirection};
