//! Pure query evaluation over the JSON representation of entities.
//!
//! Used by backends that keep entities in memory. Field names may be dotted
//! paths (`"stats.reviews"`) to reach nested objects.

use std::cmp::Ordering;

use serde_json::Value;

use super::{Filter, FilterOp, OrderBy, Page, Patch, RepositoryError, Result, SortDirection};

fn field_value<'a>(entity: &'a Value, field: &str) -> Option<&'a Value> {
    field
        .split('.')
        .try_fold(entity, |current, segment| current.get(segment))
}

/// Orders two JSON values of the same kind. Values of different kinds are unordered.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn matches_filter(entity: &Value, filter: &Filter) -> bool {
    let actual = field_value(entity, &filter.field);
    let ordering = || actual.and_then(|v| compare_values(v, &filter.value));

    match filter.op {
        FilterOp::Eq => actual.unwrap_or(&Value::Null) == &filter.value,
        FilterOp::Ne => actual.unwrap_or(&Value::Null) != &filter.value,
        FilterOp::Gt => ordering() == Some(Ordering::Greater),
        FilterOp::Gte => matches!(ordering(), Some(Ordering::Greater | Ordering::Equal)),
        FilterOp::Lt => ordering() == Some(Ordering::Less),
        FilterOp::Lte => matches!(ordering(), Some(Ordering::Less | Ordering::Equal)),
        FilterOp::In => match (&filter.value, actual) {
            (Value::Array(candidates), Some(v)) => candidates.contains(v),
            _ => false,
        },
        FilterOp::Contains => match (actual, &filter.value) {
            (Some(Value::String(haystack)), Value::String(needle)) => haystack.contains(needle),
            (Some(Value::Array(items)), needle) => items.contains(needle),
            _ => false,
        },
    }
}

/// Returns true when the entity satisfies every filter.
pub fn matches_filters(entity: &Value, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| matches_filter(entity, filter))
}

/// Sorts `(json, entity)` pairs by the given keys. Missing fields sort first.
pub fn sort_entities<T>(items: &mut [(Value, T)], order_by: &[OrderBy]) {
    if order_by.is_empty() {
        return;
    }

    items.sort_by(|(a, _), (b, _)| {
        for order in order_by {
            let ordering = match (field_value(a, &order.field), field_value(b, &order.field)) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(a), Some(b)) => compare_values(a, b).unwrap_or(Ordering::Equal),
            };
            let ordering = match order.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

/// Cuts a page out of an already filtered and sorted result.
pub fn paginate<T>(items: Vec<T>, offset: Option<usize>, limit: Option<usize>) -> Page<T> {
    let total = items.len();
    let offset = offset.unwrap_or(0);

    let data: Vec<T> = items
        .into_iter()
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .collect();
    let has_more = offset + data.len() < total;

    Page {
        data,
        total: total as u64,
        offset,
        limit,
        has_more,
    }
}

/// Merges a patch into an entity's JSON object.
///
/// The `id` field cannot be changed through a patch.
pub fn apply_patch(entity: &Value, patch: &Patch) -> Result<Value> {
    let Value::Object(fields) = entity else {
        return Err(RepositoryError::InvalidData(
            "entity must serialize to a JSON object".to_string(),
        ));
    };

    if let Some(new_id) = patch.get("id") {
        if fields.get("id") != Some(new_id) {
            return Err(RepositoryError::InvalidData(
                "patch cannot change the entity id".to_string(),
            ));
        }
    }

    let mut merged = fields.clone();
    for (key, value) in patch {
        merged.insert(key.clone(), value.clone());
    }
    Ok(Value::Object(merged))
}
