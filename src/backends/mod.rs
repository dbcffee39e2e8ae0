//! Concrete collaborator implementations.
//!
//! Stages only see the traits in `clipforge_common`; this module provides
//! the production adapter behind them.

pub mod http;

pub use http::HttpBackend;
