pub mod adapters;
pub mod config;
pub mod error;
pub mod fields;
pub mod models;
pub mod parsers;
pub mod ports;
pub mod registry;
pub mod resilience;
pub mod tools;

pub use config::{Config, ConfigOverrides, HttpConfig, ParserConfig, ServiceConfig};
pub use error::{CanonicalError, Error, ErrorMapper, Result};
pub use fields::{FieldMap, FTS_FIELDS};
pub use models::{AccessToken, Listing, StorageAuth, StorageElement, TransferSpec};
pub use parsers::{ParserChain, RedirectCache};
pub use ports::{ParserService, StorageService, TransferService};
pub use registry::{AdapterFactories, Backend, BackendRegistry};
pub use resilience::{within, CallEnvelope};
pub use tools::{DoiTool, Facade, StorageTool, ToolResult, TransferTool};
