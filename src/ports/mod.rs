//! # Ports Module
//!
//! Capability contracts every backend adapter implements. The core (registry,
//! parser chain and tools) depends only on these traits, never on a concrete
//! backend, so adding a backend means adding an adapter plus one entry in the
//! factory table.
//!
//! - [`TransferService`]: bulk transfer engines (FTS3)
//! - [`StorageService`]: storage element management (FTS3 data management, S3)
//! - [`ParserService`]: DOI/dataset resolvers (Zenodo, B2Share, ESRF)

pub mod parser;
pub mod storage;
pub mod transfer;

pub use parser::ParserService;
pub use storage::StorageService;
pub use transfer::TransferService;
