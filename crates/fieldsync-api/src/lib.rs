/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public fieldsync backend adapter crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod auth;
pub mod http;
pub mod types;

// Re-export commonly used types from auth
pub use auth::{StaticTokenProvider, TokenProvider};

// Re-export commonly used types from http
pub use http::{ApiError, ClientConfig, Result, SyncClient};

// Re-export all types
pub use types::*;
