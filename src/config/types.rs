//! Endpoint configuration records.
//!
//! An [`EndpointConfig`] describes one inference backend: which model to call,
//! where, with which credential, and the tags used to select it from a list.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// API variant spoken by an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ApiType {
    /// The default OpenAI-style API. Also used when the record omits `api_type`.
    #[default]
    OpenAi,
    /// The Azure-compatible variant, usually paired with an `api_version`.
    Azure,
    /// Any other variant, kept verbatim.
    Other(String),
}

impl ApiType {
    /// The string form used in config files.
    pub fn as_str(&self) -> &str {
        match self {
            ApiType::OpenAi => "openai",
            ApiType::Azure => "azure",
            ApiType::Other(s) => s,
        }
    }
}

impl From<String> for ApiType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "openai" => ApiType::OpenAi,
            "azure" => ApiType::Azure,
            _ => ApiType::Other(value),
        }
    }
}

impl From<&str> for ApiType {
    fn from(value: &str) -> Self {
        ApiType::from(value.to_string())
    }
}

impl From<ApiType> for String {
    fn from(value: ApiType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ApiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One candidate endpoint in a config list.
///
/// Records are immutable once loaded; use [`EndpointConfig::builder`] to
/// construct them in code and [`EndpointConfig::with_model`] to derive a copy
/// for a different model.
#[derive(Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EndpointConfig {
    /// Model identifier sent to the endpoint.
    model: String,

    /// Secret credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,

    /// Base address of the endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    base_url: Option<String>,

    /// API variant, `openai` when absent.
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    api_type: ApiType,

    /// API version string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_version: Option<String>,

    /// Tags used by filters.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    tags: BTreeSet<String>,

    /// Any other endpoint-specific parameters.
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

impl EndpointConfig {
    /// Start building a config for `model`.
    pub fn builder(model: impl Into<String>) -> EndpointConfigBuilder {
        EndpointConfigBuilder::new(model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub fn api_type(&self) -> &ApiType {
        &self.api_type
    }

    pub fn api_version(&self) -> Option<&str> {
        self.api_version.as_deref()
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn extra(&self) -> &BTreeMap<String, Value> {
        &self.extra
    }

    /// A copy of this config pointing at a different model.
    pub fn with_model(&self, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..self.clone()
        }
    }

    /// The parameters of this config that identify a response in the cache.
    ///
    /// Only `model` and the extra parameters; credentials and transport
    /// details never reach a cache key.
    pub fn cache_params(&self) -> serde_json::Map<String, Value> {
        let mut params: serde_json::Map<String, Value> = self
            .extra
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        params.insert("model".to_string(), Value::String(self.model.clone()));
        params
    }

    /// JSON schema of a single config-list record.
    pub fn record_schema() -> Result<Value> {
        Ok(serde_json::to_value(schemars::schema_for!(EndpointConfig))?)
    }
}

impl fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("api_type", &self.api_type)
            .field("api_version", &self.api_version)
            .field("tags", &self.tags)
            .field("extra", &self.extra)
            .finish()
    }
}

/// Builder for [`EndpointConfig`].
#[derive(Debug, Clone)]
pub struct EndpointConfigBuilder {
    inner: EndpointConfig,
}

impl EndpointConfigBuilder {
    fn new(model: impl Into<String>) -> Self {
        Self {
            inner: EndpointConfig {
                model: model.into(),
                api_key: None,
                base_url: None,
                api_type: ApiType::default(),
                api_version: None,
                tags: BTreeSet::new(),
                extra: BTreeMap::new(),
            },
        }
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.inner.api_key = Some(api_key.into());
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.inner.base_url = Some(base_url.into());
        self
    }

    pub fn api_type(mut self, api_type: impl Into<ApiType>) -> Self {
        self.inner.api_type = api_type.into();
        self
    }

    pub fn api_version(mut self, api_version: impl Into<String>) -> Self {
        self.inner.api_version = Some(api_version.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.inner.tags.insert(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Set an endpoint-specific parameter.
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inner.extra.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> EndpointConfig {
        self.inner
    }
}
