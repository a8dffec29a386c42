//! Search query planning and execution.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::error::SearchError;
use crate::search::bounded;
use crate::search::manager::IndexSchemaManager;
use crate::search::query::{QueryPlan, Ranking, SearchHits, SearchQuery};

/// Turns a [`SearchQuery`] into a backend query and runs it.
///
/// Unlike the synchronizer this fails fast: a disabled or unreachable backend
/// is an error so the caller can switch to the relational path.
pub struct QueryPlanner {
    schema: Arc<IndexSchemaManager>,
}

impl QueryPlanner {
    pub fn new(schema: Arc<IndexSchemaManager>) -> Self {
        Self { schema }
    }

    /// Execute a search and return ids in the backend's order.
    ///
    /// A page past the last match yields no ids but keeps the total.
    #[instrument(skip(self, query), fields(page = query.page, limit = query.limit))]
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchHits, SearchError> {
        if !self.schema.is_enabled() {
            return Err(SearchError::Disabled);
        }

        // Validate before touching the network.
        let plan = QueryPlan::build(query, self.schema.descriptor())?;

        if !self.schema.ensure_index_exists().await? {
            return Err(SearchError::unavailable("search backend unreachable"));
        }

        debug!(
            filters = plan.filters.len(),
            relevance = matches!(plan.ranking, Ranking::Relevance { .. }),
            offset = plan.offset,
            "Executing search plan"
        );

        let hits = bounded(
            self.schema.timeout(),
            self.schema.backend().execute(self.schema.descriptor(), &plan),
        )
        .await?;

        debug!(
            returned = hits.ids.len(),
            total_estimate = hits.total_estimate,
            "Search complete"
        );
        Ok(hits)
    }
}
