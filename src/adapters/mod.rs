//! # Adapters Module
//!
//! Concrete implementations of the service ports. Each adapter talks to one
//! kind of external backend and translates between its wire format and the
//! shared models; the facade only ever sees them through the port traits.
//!
//! - [`FtsTransfer`]: FTS3 REST API, transfers plus data management
//! - [`S3Storage`]: S3-compatible object stores
//!
//! DOI resolvers live in [`crate::parsers`].

pub mod fts;
pub mod s3;

pub use fts::FtsTransfer;
pub use s3::{S3Location, S3Storage};
