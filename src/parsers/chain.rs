//! # Parser Chain
//!
//! Selects the parser for an identifier by asking each configured candidate,
//! in declaration order, whether it can resolve it. The first positive answer
//! wins and no further candidate is constructed. All candidates of one
//! selection share a single [`RedirectCache`], so the identifier is followed
//! over the network at most once.

use super::redirect::{Identifier, RedirectCache};
use crate::config::{Config, HttpConfig, ParserConfig};
use crate::error::{ids, Error, Result};
use crate::models::{AccessToken, Listing};
use crate::ports::ParserService;
use crate::registry::{AdapterFactories, ParserFactory};
use crate::resilience::within;
use std::fmt;
use tracing::{debug, info, warn};

/// Progress of one selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    Idle,
    Trying(usize),
    Matched(usize),
    Resolved(usize),
    Exhausted,
}

impl fmt::Display for ChainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Trying(index) => write!(f, "trying #{index}"),
            Self::Matched(index) => write!(f, "matched #{index}"),
            Self::Resolved(index) => write!(f, "resolved by #{index}"),
            Self::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// The matching parser, initialized and ready to resolve
pub struct ResolvedParser {
    pub parser: Box<dyn ParserService>,
    pub config: ParserConfig,
    /// Network probes spent during selection (0 or 1)
    pub probes: usize,
}

impl fmt::Debug for ResolvedParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedParser")
            .field("parser", &self.parser.id())
            .field("config", &self.config)
            .field("probes", &self.probes)
            .finish()
    }
}

struct Candidate {
    config: ParserConfig,
    factory: ParserFactory,
}

/// Ordered parser candidates
pub struct ParserChain {
    candidates: Vec<Candidate>,
    http: HttpConfig,
}

impl fmt::Debug for ParserChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserChain")
            .field(
                "candidates",
                &self.candidates.iter().map(|c| &c.config.id).collect::<Vec<_>>(),
            )
            .field("http", &self.http)
            .finish()
    }
}

fn advance(state: &mut ChainState, next: ChainState, identifier: &str) {
    debug!("Parser chain for {}: {} -> {}", identifier, state, next);
    *state = next;
}

impl ParserChain {
    /// Build the chain, failing on parser implementations with no factory
    pub fn new(config: &Config, factories: &AdapterFactories) -> Result<Self> {
        let candidates = config
            .parsers
            .iter()
            .map(|parser| {
                factories
                    .parser(&parser.implementation)
                    .map(|factory| Candidate {
                        config: parser.clone(),
                        factory: factory.clone(),
                    })
                    .ok_or_else(|| {
                        Error::canonical(ids::INVALID_PARSER_CONFIG, "Unknown parser implementation")
                            .with_detail("parserId", &parser.id)
                            .with_detail("implementation", &parser.implementation)
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        info!("Parser chain ready with {} candidates", candidates.len());
        Ok(Self {
            candidates,
            http: config.http.clone(),
        })
    }

    pub fn candidates(&self) -> impl Iterator<Item = &ParserConfig> {
        self.candidates.iter().map(|c| &c.config)
    }

    pub const fn http(&self) -> &HttpConfig {
        &self.http
    }

    /// Pick and initialize the first parser able to resolve `identifier`
    pub async fn select(
        &self,
        auth: Option<&AccessToken>,
        identifier: &str,
    ) -> Result<ResolvedParser> {
        let parsed =
            Identifier::parse(identifier).map_err(|e| e.with_detail("doi", identifier))?;
        let mut redirects = RedirectCache::new(identifier, &parsed, &self.http)?;
        let mut state = ChainState::Idle;

        for (index, candidate) in self.candidates.iter().enumerate() {
            advance(&mut state, ChainState::Trying(index), identifier);
            let mut parser = (candidate.factory)(&candidate.config);

            let answer = within(
                "canResolve",
                candidate.config.timeout(),
                parser.can_resolve(auth, identifier, &mut redirects),
            )
            .await;

            match answer {
                Ok(true) => {
                    advance(&mut state, ChainState::Matched(index), identifier);
                    if !parser.init(&candidate.config, &self.http).await {
                        return Err(Error::canonical(
                            ids::INVALID_PARSER_CONFIG,
                            "Parser failed to initialize",
                        )
                        .with_detail("parserId", &candidate.config.id));
                    }
                    advance(&mut state, ChainState::Resolved(index), identifier);
                    info!("Parser {} selected for {}", candidate.config.id, identifier);
                    return Ok(ResolvedParser {
                        parser,
                        config: candidate.config.clone(),
                        probes: redirects.probes(),
                    });
                }
                Ok(false) => {
                    debug!("Parser {} declined {}", candidate.config.id, identifier);
                }
                Err(e) => {
                    warn!(
                        "Parser {} could not check {}: {}",
                        candidate.config.id, identifier, e
                    );
                }
            }
        }

        advance(&mut state, ChainState::Exhausted, identifier);
        Err(
            Error::canonical(ids::DOI_NOT_SUPPORTED, "No configured parser handles this DOI")
                .with_detail("doi", identifier),
        )
    }

    /// Select a parser and list the files behind `identifier`
    pub async fn resolve(
        &self,
        auth: Option<&AccessToken>,
        identifier: &str,
        depth: u32,
    ) -> Result<Listing> {
        let selected = self.select(auth, identifier).await?;
        let listing = within(
            "resolve",
            selected.config.timeout(),
            selected.parser.resolve(auth, identifier, depth),
        )
        .await?;
        debug!(
            "Parser {} listed {} elements for {}",
            selected.config.id, listing.count, identifier
        );
        Ok(listing)
    }
}
