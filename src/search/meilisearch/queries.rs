//! Meilisearch request bodies.
//!
//! Dates live in the index as numbers so they can be range-filtered and
//! sorted: publication dates in unix seconds, creation instants in unix
//! microseconds. Everything else keeps the entity's camelCase field names.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde_json::{json, Value};

use crate::error::SearchError;
use crate::search::descriptor::{CREATED_AT, ISSUED_AT};
use crate::search::document::{PaperPatch, SearchableEntity};
use crate::search::query::{FilterClause, QueryPlan, Ranking};

pub(crate) fn date_timestamp(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

fn datetime_timestamp(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

/// Index value of a date for the given attribute.
fn attribute_timestamp(attribute: &str, date: NaiveDate) -> i64 {
    match attribute {
        CREATED_AT => datetime_timestamp(date.and_time(NaiveTime::MIN).and_utc()),
        _ => date_timestamp(date),
    }
}

/// Document body for an upsert.
pub fn document_body(entity: &SearchableEntity) -> Result<Value, SearchError> {
    let mut doc = serde_json::to_value(entity)?;
    if let Some(map) = doc.as_object_mut() {
        match entity.issued_at {
            Some(date) => {
                map.insert(ISSUED_AT.to_string(), json!(date_timestamp(date)));
            }
            // Missing sort values sort last in Meilisearch, so leave the field out
            None => {
                map.remove(ISSUED_AT);
            }
        }
        map.insert(
            CREATED_AT.to_string(),
            json!(datetime_timestamp(entity.created_at)),
        );
    }
    Ok(doc)
}

/// Partial document body: only the fields present in the patch plus the id.
pub fn patch_body(patch: &PaperPatch) -> Result<Value, SearchError> {
    let mut doc = serde_json::to_value(patch)?;
    if let (Some(map), Some(issued_at)) = (doc.as_object_mut(), patch.issued_at) {
        let value = match issued_at {
            Some(date) => json!(date_timestamp(date)),
            None => Value::Null,
        };
        map.insert(ISSUED_AT.to_string(), value);
    }
    Ok(doc)
}

/// Quote a filter value, escaping backslashes and double quotes.
fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn clause_expression(clause: &FilterClause) -> Option<String> {
    match clause {
        FilterClause::AnyOf { attribute, values } => match values.len() {
            0 => None,
            1 => Some(format!("{} = {}", attribute, quote(&values[0]))),
            _ => {
                let alternatives: Vec<String> = values
                    .iter()
                    .map(|v| format!("{} = {}", attribute, quote(v)))
                    .collect();
                Some(format!("({})", alternatives.join(" OR ")))
            }
        },
        FilterClause::DateRange {
            attribute,
            start,
            end,
        } => Some(format!(
            "{attr} >= {} AND {attr} < {}",
            attribute_timestamp(attribute, *start),
            attribute_timestamp(attribute, *end),
            attr = attribute
        )),
    }
}

/// AND-combine the plan's clauses into one filter expression.
pub fn filter_expression(filters: &[FilterClause]) -> Option<String> {
    let clauses: Vec<String> = filters.iter().filter_map(clause_expression).collect();
    if clauses.is_empty() {
        None
    } else {
        Some(clauses.join(" AND "))
    }
}

/// Body for `POST /indexes/{uid}/search`.
///
/// Text queries send no `sort`, so relevance alone orders them. Placeholder
/// queries send no `q`, so no relevance is computed and the sort decides.
pub fn search_body(plan: &QueryPlan) -> Value {
    let mut body = json!({
        "offset": plan.offset,
        "limit": plan.limit,
        "attributesToRetrieve": ["id"]
    });

    match &plan.ranking {
        Ranking::Relevance { text } => {
            body["q"] = json!(text);
        }
        Ranking::Sorted { attribute, order } => {
            body["sort"] = json!([
                format!("{}:{}", attribute, order),
                format!("{}:asc", plan.tie_breaker)
            ]);
        }
    }

    if let Some(filter) = filter_expression(&plan.filters) {
        body["filter"] = json!(filter);
    }

    body
}
