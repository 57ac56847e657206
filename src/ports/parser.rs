//! # Parser Service Port

use crate::config::{HttpConfig, ParserConfig};
use crate::models::{AccessToken, Listing};
use crate::parsers::RedirectCache;
use crate::Result;
use async_trait::async_trait;

/// Contract for DOI/dataset resolvers
///
/// A parser is constructed per resolution attempt. [`can_resolve`] runs first
/// and may record what it learned about the identifier (record id, links);
/// only a matching parser is then initialized and asked to [`resolve`].
///
/// [`can_resolve`]: ParserService::can_resolve
/// [`resolve`]: ParserService::resolve
#[async_trait]
pub trait ParserService: Send + Sync {
    /// Configured parser id
    fn id(&self) -> &str;

    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Prepare the HTTP client used by [`resolve`](ParserService::resolve)
    async fn init(&mut self, config: &ParserConfig, http: &HttpConfig) -> bool;

    /// Whether this parser handles `identifier`.
    ///
    /// Any redirect following must go through `redirects`, which is shared
    /// with the other candidates of the same resolution.
    async fn can_resolve(
        &mut self,
        auth: Option<&AccessToken>,
        identifier: &str,
        redirects: &mut RedirectCache,
    ) -> Result<bool>;

    /// Files of the dataset, descending at most `depth` folder levels
    async fn resolve(
        &self,
        auth: Option<&AccessToken>,
        identifier: &str,
        depth: u32,
    ) -> Result<Listing>;
}
