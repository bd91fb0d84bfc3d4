//! Endpoint configuration and response caching for LLM clients.
//!
//! - [`config`] resolves, filters, and builds lists of endpoint configs
//! - [`fallback`] tries those configs one after another until one answers
//! - [`cache`] memoizes responses under a seed so repeated requests are free

pub mod cache;
pub mod config;
pub mod error;
pub mod fallback;

// re-exports
pub use cache::{CacheConfig, CacheSeed, ResponseCache};
pub use config::{ConfigListResolver, EndpointConfig, FilterPredicate};
pub use error::{EndpointFailure, Error, FailureKind, Result};
pub use fallback::{EndpointInvoker, FallbackChain, FallbackOutcome};
