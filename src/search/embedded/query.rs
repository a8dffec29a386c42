//! Query building for the embedded index.

use std::cmp::Ordering;
use std::ops::Bound;

use chrono::{NaiveDate, NaiveTime};
use tantivy::query::{
    AllQuery, BooleanQuery, BoostQuery, FuzzyTermQuery, Occur, PhraseQuery, Query, RangeQuery,
    TermQuery,
};
use tantivy::schema::IndexRecordOption;
use tantivy::tokenizer::TextAnalyzer;
use tantivy::{DateTime, Term};

use crate::error::SearchError;
use crate::search::descriptor::{
    IndexDescriptor, CREATED_AT, ISSUED_AT, LIKE_COUNT, PRIMARY_KEY, TOTAL_VIEW_COUNT,
};
use crate::search::document::SearchableEntity;
use crate::search::embedded::schema::{analyze, PaperFields};
use crate::search::query::{FilterClause, SortOrder};

/// Exact words outrank typo and prefix matches.
const EXACT_BOOST: f32 = 2.0;

/// All words close together outranks scattered matches.
const PHRASE_BOOST: f32 = 3.0;
const PHRASE_SLOP: u32 = 3;

pub fn date_value(date: NaiveDate) -> DateTime {
    DateTime::from_timestamp_secs(date.and_time(NaiveTime::MIN).and_utc().timestamp())
}

fn boosted(query: impl Query + 'static, boost: f32) -> Box<dyn Query> {
    Box::new(BoostQuery::new(Box::new(query), boost))
}

/// Build a query for one filter clause.
fn filter_query(clause: &FilterClause, fields: &PaperFields) -> Result<Box<dyn Query>, SearchError> {
    match clause {
        FilterClause::AnyOf { attribute, values } => {
            let field = fields.raw_field(attribute).ok_or_else(|| {
                SearchError::invalid_query(format!("attribute {} is not filterable", attribute))
            })?;
            let alternatives: Vec<(Occur, Box<dyn Query>)> = values
                .iter()
                .map(|value| {
                    let term = Term::from_field_text(field, value);
                    let query: Box<dyn Query> =
                        Box::new(TermQuery::new(term, IndexRecordOption::Basic));
                    (Occur::Should, query)
                })
                .collect();
            Ok(Box::new(BooleanQuery::new(alternatives)))
        }
        FilterClause::DateRange {
            attribute,
            start,
            end,
        } => {
            if attribute != ISSUED_AT && attribute != CREATED_AT {
                return Err(SearchError::invalid_query(format!(
                    "attribute {} is not a date",
                    attribute
                )));
            }
            Ok(Box::new(RangeQuery::new_date_bounds(
                attribute.clone(),
                Bound::Included(date_value(*start)),
                Bound::Excluded(date_value(*end)),
            )))
        }
    }
}

/// Relevance query for free text, `None` when nothing survives analysis.
///
/// Every word is optional, so papers matching more words score higher.
/// Each word matches exactly, within the typo budget for its length, and
/// the last one also as a prefix. Field weights follow the attribute order.
fn text_query(
    text: &str,
    fields: &PaperFields,
    descriptor: &IndexDescriptor,
    analyzer: &mut TextAnalyzer,
) -> Option<Box<dyn Query>> {
    let words = analyze(analyzer, text);
    if words.is_empty() {
        return None;
    }
    let last = words.len() - 1;

    let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
    for (position, word) in words.iter().enumerate() {
        let typos = descriptor.typo_tolerance.max_typos(word);
        let mut per_field: Vec<(Occur, Box<dyn Query>)> = Vec::new();

        for (name, field) in &fields.text {
            let weight = descriptor.attribute_weight(name).unwrap_or(1.0);
            let term = Term::from_field_text(*field, word);

            per_field.push((
                Occur::Should,
                boosted(
                    TermQuery::new(term.clone(), IndexRecordOption::WithFreqs),
                    weight * EXACT_BOOST,
                ),
            ));
            if typos > 0 {
                per_field.push((
                    Occur::Should,
                    boosted(FuzzyTermQuery::new(term.clone(), typos, true), weight),
                ));
            }
            if position == last {
                per_field.push((
                    Occur::Should,
                    boosted(FuzzyTermQuery::new_prefix(term, 0, true), weight),
                ));
            }
        }

        clauses.push((Occur::Should, Box::new(BooleanQuery::new(per_field))));
    }

    if words.len() > 1 {
        for (name, field) in &fields.text {
            let weight = descriptor.attribute_weight(name).unwrap_or(1.0);
            let terms = words
                .iter()
                .map(|w| Term::from_field_text(*field, w))
                .collect();
            let mut phrase = PhraseQuery::new(terms);
            phrase.set_slop(PHRASE_SLOP);
            clauses.push((Occur::Should, boosted(phrase, weight * PHRASE_BOOST)));
        }
    }

    Some(Box::new(BooleanQuery::new(clauses)))
}

/// AND the filters with the optional text query.
pub fn compile(
    filters: &[FilterClause],
    text: Option<&str>,
    fields: &PaperFields,
    descriptor: &IndexDescriptor,
    analyzer: &mut TextAnalyzer,
) -> Result<Box<dyn Query>, SearchError> {
    let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();

    if let Some(text) = text {
        if let Some(query) = text_query(text, fields, descriptor, analyzer) {
            clauses.push((Occur::Must, query));
        }
    }

    for clause in filters {
        clauses.push((Occur::Must, filter_query(clause, fields)?));
    }

    if clauses.is_empty() {
        return Ok(Box::new(AllQuery));
    }
    Ok(Box::new(BooleanQuery::new(clauses)))
}

/// Whether documents can be ordered by this attribute.
pub fn is_sort_attribute(attribute: &str) -> bool {
    matches!(
        attribute,
        CREATED_AT | ISSUED_AT | LIKE_COUNT | TOTAL_VIEW_COUNT | PRIMARY_KEY
    )
}

fn directed(ordering: Ordering, order: SortOrder) -> Ordering {
    match order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}

/// Order two documents by attribute, ties broken by ascending id.
///
/// A missing issue date sorts last in both directions.
pub fn compare(
    a: &SearchableEntity,
    b: &SearchableEntity,
    attribute: &str,
    order: SortOrder,
) -> Ordering {
    let primary = match attribute {
        ISSUED_AT => match (a.issued_at, b.issued_at) {
            (Some(x), Some(y)) => directed(x.cmp(&y), order),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
        CREATED_AT => directed(a.created_at.cmp(&b.created_at), order),
        LIKE_COUNT => directed(a.like_count.cmp(&b.like_count), order),
        TOTAL_VIEW_COUNT => directed(a.total_view_count.cmp(&b.total_view_count), order),
        PRIMARY_KEY => directed(a.id.cmp(&b.id), order),
        _ => Ordering::Equal,
    };
    primary.then_with(|| a.id.cmp(&b.id))
}
