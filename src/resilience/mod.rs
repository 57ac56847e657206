pub mod timeout;

pub use timeout::{within, CallEnvelope};
