//! Endpoint configuration lists.
//!
//! This module loads ordered lists of [`EndpointConfig`] records, the input to
//! the fallback protocol in [`crate::fallback`]. A list is a JSON array of
//! objects, each with at least a `model` field:
//!
//! ```json
//! [
//!   {"model": "gpt-4", "api_key": "sk-...", "tags": ["gpt4", "premium"]},
//!   {"model": "gpt-4", "api_key": "...", "base_url": "https://x.openai.azure.com",
//!    "api_type": "azure", "api_version": "2024-02-01"}
//! ]
//! ```
//!
//! # Components
//!
//! - [`resolver`]: finds and parses a list from an environment variable or file
//! - [`filter`]: tagged predicates selecting records by field or tag overlap
//! - [`builders`]: helpers to assemble lists from keys, models, or `.env` files
//! - [`source`]: environment and filesystem views the resolver reads through
//! - [`types`]: the [`EndpointConfig`] record itself
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use llmconf::config::{ConfigListResolver, FilterPredicate, MemoryFs};
//!
//! let fs = MemoryFs::new().with_file(
//!     "/srv/OAI_CONFIG_LIST",
//!     r#"[{"model": "gpt-4", "tags": ["premium"]}, {"model": "gpt-4o-mini"}]"#,
//! );
//! let env = HashMap::from([(
//!     "OAI_CONFIG_LIST".to_string(),
//!     "/srv/OAI_CONFIG_LIST".to_string(),
//! )]);
//! let resolver = ConfigListResolver::builder()
//!     .environment(env)
//!     .filesystem(fs)
//!     .build();
//!
//! let premium = FilterPredicate::new().tags(["premium"]);
//! let configs = resolver.resolve("OAI_CONFIG_LIST", Some(&premium)).unwrap();
//! assert_eq!(configs.len(), 1);
//! ```

pub mod builders;
pub mod filter;
pub mod resolver;
pub mod source;
pub mod types;

pub use builders::{
    DotenvModelSpec, config_list_from_models, filter_config, get_config_list,
};
pub use filter::{FieldMatch, FilterPredicate};
pub use resolver::{
    ConfigListResolver, ConfigListResolverBuilder, DEFAULT_CONFIG_LIST_VAR, parse_config_list,
};
pub use source::{
    ConfigSource, Environment, FileSystem, LayeredEnv, MemoryFs, ProcessEnv, StdFs,
};
pub use types::{ApiType, EndpointConfig, EndpointConfigBuilder};
