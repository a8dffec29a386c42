//! Static description of the paper index.
//!
//! The descriptor is computed once from configuration and handed to whichever
//! backend is active; each backend translates it into its own settings.

use serde::Serialize;
use serde_json::{json, Value};

/// Primary key of every indexed document.
pub const PRIMARY_KEY: &str = "id";

pub const TITLE: &str = "title";
pub const TRANSLATED_SUMMARY: &str = "translatedSummary";
pub const SUMMARY: &str = "summary";
pub const HASHTAGS: &str = "hashtags";
pub const CATEGORIES: &str = "categories";
pub const AUTHORS: &str = "authors";
pub const ISSUED_AT: &str = "issuedAt";
pub const CREATED_AT: &str = "createdAt";
pub const LIKE_COUNT: &str = "likeCount";
pub const TOTAL_VIEW_COUNT: &str = "totalViewCount";

/// Searchable attributes, strongest signal first.
const SEARCHABLE_ATTRIBUTES: [&str; 6] = [
    TITLE,
    TRANSLATED_SUMMARY,
    SUMMARY,
    HASHTAGS,
    CATEGORIES,
    AUTHORS,
];

const FILTERABLE_ATTRIBUTES: [&str; 5] = [CATEGORIES, AUTHORS, HASHTAGS, ISSUED_AT, CREATED_AT];

const SORTABLE_ATTRIBUTES: [&str; 5] = [
    CREATED_AT,
    ISSUED_AT,
    LIKE_COUNT,
    TOTAL_VIEW_COUNT,
    PRIMARY_KEY,
];

/// English stop words dropped from both documents and queries.
const STOP_WORDS: [&str; 33] = [
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "in", "is", "it",
    "its", "of", "on", "or", "that", "the", "this", "to", "was", "were", "will", "with", "we",
    "our", "via", "into", "than", "these", "those",
];

/// Characters that split words in addition to the engine defaults.
const SEPARATOR_TOKENS: [&str; 2] = ["|", "·"];

/// Characters that never split words, so `c++`, `c#` and `f#` stay whole.
const NON_SEPARATOR_TOKENS: [&str; 2] = ["+", "#"];

/// One step of the ranking-rule sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RankingRule {
    /// Number of matched query words.
    Words,
    /// Fewer typos first.
    Typo,
    /// Query terms close together first.
    Proximity,
    /// Matches in higher-priority searchable attributes first.
    Attribute,
    /// Explicit sort field.
    Sort,
    /// Exact matches over prefix/fuzzy matches.
    Exactness,
}

impl RankingRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Words => "words",
            Self::Typo => "typo",
            Self::Proximity => "proximity",
            Self::Attribute => "attribute",
            Self::Sort => "sort",
            Self::Exactness => "exactness",
        }
    }
}

/// Relevance dominates; an explicit sort only breaks ties below it.
pub const RANKING_RULES: [RankingRule; 6] = [
    RankingRule::Words,
    RankingRule::Typo,
    RankingRule::Proximity,
    RankingRule::Attribute,
    RankingRule::Sort,
    RankingRule::Exactness,
];

/// How many typos a query word may carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypoTolerance {
    pub enabled: bool,
    /// Minimum word length accepting one typo.
    pub min_word_size_one_typo: usize,
    /// Minimum word length accepting two typos.
    pub min_word_size_two_typos: usize,
}

impl Default for TypoTolerance {
    fn default() -> Self {
        Self {
            enabled: true,
            min_word_size_one_typo: 5,
            min_word_size_two_typos: 9,
        }
    }
}

impl TypoTolerance {
    /// Edit distance allowed for a word of this many characters.
    pub fn max_typos(&self, word: &str) -> u8 {
        if !self.enabled {
            return 0;
        }
        let len = word.chars().count();
        if len >= self.min_word_size_two_typos {
            2
        } else if len >= self.min_word_size_one_typo {
            1
        } else {
            0
        }
    }
}

/// Everything a backend needs to build the paper index.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDescriptor {
    pub name: String,
    pub primary_key: String,
    pub searchable_attributes: Vec<String>,
    pub filterable_attributes: Vec<String>,
    pub sortable_attributes: Vec<String>,
    pub ranking_rules: Vec<RankingRule>,
    pub typo_tolerance: TypoTolerance,
    pub stop_words: Vec<String>,
    pub separator_tokens: Vec<String>,
    pub non_separator_tokens: Vec<String>,
}

impl IndexDescriptor {
    /// Descriptor for the paper index under the given name.
    pub fn papers(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: PRIMARY_KEY.to_string(),
            searchable_attributes: to_strings(&SEARCHABLE_ATTRIBUTES),
            filterable_attributes: to_strings(&FILTERABLE_ATTRIBUTES),
            sortable_attributes: to_strings(&SORTABLE_ATTRIBUTES),
            ranking_rules: RANKING_RULES.to_vec(),
            typo_tolerance: TypoTolerance::default(),
            stop_words: to_strings(&STOP_WORDS),
            separator_tokens: to_strings(&SEPARATOR_TOKENS),
            non_separator_tokens: to_strings(&NON_SEPARATOR_TOKENS),
        }
    }

    pub fn is_filterable(&self, attribute: &str) -> bool {
        self.filterable_attributes.iter().any(|a| a == attribute)
    }

    pub fn is_sortable(&self, attribute: &str) -> bool {
        self.sortable_attributes.iter().any(|a| a == attribute)
    }

    /// Relevance weight for a searchable attribute: the first one weighs most.
    pub fn attribute_weight(&self, attribute: &str) -> Option<f32> {
        let count = self.searchable_attributes.len();
        self.searchable_attributes
            .iter()
            .position(|a| a == attribute)
            .map(|pos| (count - pos) as f32)
    }

    /// Settings payload understood by Meilisearch's `/settings` endpoint.
    pub fn settings_json(&self) -> Value {
        let ranking_rules: Vec<&str> = self.ranking_rules.iter().map(|r| r.as_str()).collect();
        json!({
            "searchableAttributes": self.searchable_attributes,
            "filterableAttributes": self.filterable_attributes,
            "sortableAttributes": self.sortable_attributes,
            "rankingRules": ranking_rules,
            "typoTolerance": {
                "enabled": self.typo_tolerance.enabled,
                "minWordSizeForTypos": {
                    "oneTypo": self.typo_tolerance.min_word_size_one_typo,
                    "twoTypos": self.typo_tolerance.min_word_size_two_typos
                }
            },
            "stopWords": self.stop_words,
            "separatorTokens": self.separator_tokens,
            "nonSeparatorTokens": self.non_separator_tokens
        })
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
