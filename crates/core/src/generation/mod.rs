//! Remote generation capability boundary.
//!
//! The orchestrator depends on three abstract capabilities: start an
//! operation, poll it to completion, and be told when a failure points at
//! dead credentials. [`HttpGenerationClient`] is the production backend; the
//! `testing` module carries a scripted mock.

mod http;
mod traits;
mod types;

pub use http::HttpGenerationClient;
pub use traits::{
    CredentialProvider, CredentialRefresh, EnvCredentialProvider, GenerationClient,
    LoggingCredentialRefresh,
};
pub use types::*;
