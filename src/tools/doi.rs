use super::{fail, ToolResult};
use crate::models::{AccessToken, Listing};
use crate::parsers::ParserChain;
use crate::resilience::CallEnvelope;
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

/// Input for resolving a DOI into its files
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ResolveDoiInput {
    /// DOI in any common form (`10.x/y`, `doi:10.x/y`, `https://doi.org/10.x/y`)
    /// or a dataset landing page URL
    pub doi: String,
    /// How many folder levels to descend for hierarchical records (default: 1)
    #[serde(default = "default_depth")]
    pub depth: u32,
}

const fn default_depth() -> u32 {
    1
}

/// DOI resolution operations of the facade
#[derive(Clone)]
pub struct DoiTool {
    chain: Arc<ParserChain>,
    timeout: Duration,
}

impl std::fmt::Debug for DoiTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DoiTool")
            .field("chain", &self.chain)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl DoiTool {
    pub fn new(chain: Arc<ParserChain>, timeout: Duration) -> Self {
        Self { chain, timeout }
    }

    pub fn chain(&self) -> &ParserChain {
        &self.chain
    }

    /// Files published under a DOI
    #[instrument(skip(self, auth), fields(doi = %input.doi))]
    pub async fn resolve_doi(
        &self,
        auth: Option<&AccessToken>,
        input: ResolveDoiInput,
    ) -> ToolResult<Listing> {
        let chain = Arc::clone(&self.chain);
        let auth = auth.cloned();
        let (doi, depth) = (input.doi.clone(), input.depth);

        let listing = CallEnvelope::new("resolveDoi", self.timeout)
            .call(async move { chain.resolve(auth.as_ref(), &doi, depth).await })
            .await
            .map_err(|e| fail(e, &[("doi", input.doi.as_str())]))?;

        info!("DOI {} resolved to {} elements", input.doi, listing.count);
        Ok(listing)
    }
}
