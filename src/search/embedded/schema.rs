//! Tantivy schema and text analysis for the paper index.

use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, FAST, INDEXED, STORED,
    STRING,
};
use tantivy::tokenizer::{
    LowerCaser, RegexTokenizer, RemoveLongFilter, StopWordFilter, TextAnalyzer, TokenStream,
};
use tantivy::Index;

use crate::error::SearchError;
use crate::search::descriptor::{
    IndexDescriptor, AUTHORS, CATEGORIES, CREATED_AT, HASHTAGS, ISSUED_AT, PRIMARY_KEY,
};

/// Name the paper analyzer is registered under.
pub const PAPER_TOKENIZER: &str = "paper_text";

/// Stored JSON copy of the indexed entity.
pub const SOURCE: &str = "source";

pub const CATEGORIES_RAW: &str = "categories_raw";
pub const AUTHORS_RAW: &str = "authors_raw";
pub const HASHTAGS_RAW: &str = "hashtags_raw";

/// Resolved field handles for the paper index
#[derive(Debug, Clone)]
pub struct PaperFields {
    pub id: Field,
    pub source: Field,
    /// Tokenized fields paired with their attribute name, in priority order.
    pub text: Vec<(String, Field)>,
    pub categories_raw: Field,
    pub authors_raw: Field,
    pub hashtags_raw: Field,
    pub issued_at: Field,
    pub created_at: Field,
}

impl PaperFields {
    /// Look every field up in an existing schema.
    ///
    /// Fails when the index was built from an older schema.
    pub fn resolve(schema: &Schema, descriptor: &IndexDescriptor) -> Result<Self, SearchError> {
        let field = |name: &str| {
            schema
                .get_field(name)
                .map_err(|_| SearchError::engine(format!("schema lacks field {}", name)))
        };

        let text = descriptor
            .searchable_attributes
            .iter()
            .map(|name| Ok((name.clone(), field(name)?)))
            .collect::<Result<Vec<_>, SearchError>>()?;

        Ok(Self {
            id: field(PRIMARY_KEY)?,
            source: field(SOURCE)?,
            text,
            categories_raw: field(CATEGORIES_RAW)?,
            authors_raw: field(AUTHORS_RAW)?,
            hashtags_raw: field(HASHTAGS_RAW)?,
            issued_at: field(ISSUED_AT)?,
            created_at: field(CREATED_AT)?,
        })
    }

    /// Exact-match field backing a filterable list attribute.
    pub fn raw_field(&self, attribute: &str) -> Option<Field> {
        match attribute {
            CATEGORIES => Some(self.categories_raw),
            AUTHORS => Some(self.authors_raw),
            HASHTAGS => Some(self.hashtags_raw),
            _ => None,
        }
    }
}

/// Create the Tantivy schema for papers.
pub fn create_paper_schema(descriptor: &IndexDescriptor) -> Schema {
    let mut schema_builder = Schema::builder();

    // Stored ID for hydrating from PostgreSQL
    schema_builder.add_text_field(PRIMARY_KEY, STRING | STORED);
    schema_builder.add_text_field(SOURCE, STORED);

    // Positions are kept so phrase queries can reward proximity
    let text_options = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer(PAPER_TOKENIZER)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    );
    for name in &descriptor.searchable_attributes {
        schema_builder.add_text_field(name, text_options.clone());
    }

    schema_builder.add_text_field(CATEGORIES_RAW, STRING);
    schema_builder.add_text_field(AUTHORS_RAW, STRING);
    schema_builder.add_text_field(HASHTAGS_RAW, STRING);

    // FAST enables efficient range queries
    schema_builder.add_date_field(ISSUED_AT, INDEXED | FAST);
    schema_builder.add_date_field(CREATED_AT, INDEXED | FAST);

    schema_builder.build()
}

/// Names every field of a current schema carries.
pub fn expected_fields(descriptor: &IndexDescriptor) -> Vec<String> {
    let mut names: Vec<String> = [
        PRIMARY_KEY,
        SOURCE,
        CATEGORIES_RAW,
        AUTHORS_RAW,
        HASHTAGS_RAW,
        ISSUED_AT,
        CREATED_AT,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    names.extend(descriptor.searchable_attributes.iter().cloned());
    names
}

/// Token pattern: letters, digits and the non-separator characters.
///
/// Anything else, separator tokens included, splits words.
fn token_pattern(descriptor: &IndexDescriptor) -> String {
    let mut class = String::from(r"\p{L}\p{N}_");
    for token in &descriptor.non_separator_tokens {
        for c in token.chars() {
            if c.is_ascii_punctuation() {
                class.push('\\');
            }
            class.push(c);
        }
    }
    format!("[{}]+", class)
}

/// Build the analyzer used for documents and queries alike.
///
/// No stemming: Meilisearch doesn't stem either, and both backends must
/// match the same words.
pub fn paper_analyzer(descriptor: &IndexDescriptor) -> Result<TextAnalyzer, SearchError> {
    let tokenizer = RegexTokenizer::new(&token_pattern(descriptor))?;
    Ok(TextAnalyzer::builder(tokenizer)
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .filter(StopWordFilter::remove(descriptor.stop_words.clone()))
        .build())
}

/// Register the paper analyzer on an index. Must run every time an index is opened.
pub fn register_analyzer(index: &Index, descriptor: &IndexDescriptor) -> Result<(), SearchError> {
    index
        .tokenizers()
        .register(PAPER_TOKENIZER, paper_analyzer(descriptor)?);
    Ok(())
}

/// Split text the way the index does.
pub fn analyze(analyzer: &mut TextAnalyzer, text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut stream = analyzer.token_stream(text);
    stream.process(&mut |token| words.push(token.text.clone()));
    words
}
