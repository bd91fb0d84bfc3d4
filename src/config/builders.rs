//! Helpers for building config lists in code.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::config::filter::FilterPredicate;
use crate::config::resolver::ConfigListResolver;
use crate::config::source::{Environment, LayeredEnv};
use crate::config::types::{ApiType, EndpointConfig};
use crate::error::{Error, Result};

/// Apply `predicate` to `configs`, preserving order.
pub fn filter_config(
    configs: Vec<EndpointConfig>,
    predicate: &FilterPredicate,
) -> Vec<EndpointConfig> {
    predicate.apply(configs)
}

/// Build one config per API key.
///
/// When `base_urls` is given it must have the same length as `api_keys`; the
/// two are paired by position. Blank keys are skipped.
///
/// The configs come back with an empty model and are not usable on their
/// own: expand them with [`config_list_from_models`] first. A
/// [`FallbackChain`](crate::fallback::FallbackChain) rejects a config without
/// a model.
pub fn get_config_list(
    api_keys: &[impl AsRef<str>],
    base_urls: Option<&[String]>,
    api_type: Option<ApiType>,
    api_version: Option<&str>,
) -> Result<Vec<EndpointConfig>> {
    if let Some(urls) = base_urls
        && urls.len() != api_keys.len()
    {
        return Err(Error::malformed(
            None,
            format!(
                "{} base URLs given for {} API keys",
                urls.len(),
                api_keys.len()
            ),
        ));
    }

    let mut configs = Vec::with_capacity(api_keys.len());
    for (i, key) in api_keys.iter().enumerate() {
        let key = key.as_ref().trim();
        if key.is_empty() {
            log::warn!("skipping blank API key at position {}", i);
            continue;
        }

        let mut builder = EndpointConfig::builder("").api_key(key);
        if let Some(url) = base_urls.and_then(|urls| urls.get(i)) {
            builder = builder.base_url(url.clone());
        }
        if let Some(api_type) = &api_type {
            builder = builder.api_type(api_type.clone());
        }
        if let Some(version) = api_version {
            builder = builder.api_version(version);
        }
        configs.push(builder.build());
    }
    Ok(configs)
}

/// Expand `base` into one config per model in `models`.
///
/// The output is grouped by base config, then by model. An empty `models`
/// slice returns `base` unchanged.
pub fn config_list_from_models(
    base: &[EndpointConfig],
    models: &[impl AsRef<str>],
) -> Vec<EndpointConfig> {
    if models.is_empty() {
        return base.to_vec();
    }
    base.iter()
        .flat_map(|config| models.iter().map(|m| config.with_model(m.as_ref())))
        .collect()
}

/// How one model is configured from a `.env` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotenvModelSpec {
    /// Name of the variable holding the API key.
    pub api_key_env_var: String,
    pub base_url: Option<String>,
    pub api_type: Option<ApiType>,
    pub api_version: Option<String>,
}

impl From<&str> for DotenvModelSpec {
    fn from(api_key_env_var: &str) -> Self {
        Self {
            api_key_env_var: api_key_env_var.to_string(),
            base_url: None,
            api_type: None,
            api_version: None,
        }
    }
}

impl ConfigListResolver {
    /// Build a config list from API keys stored in a `.env` file.
    ///
    /// The file is layered under the resolver's environment: variables that
    /// are already set keep their value. A missing `.env` file is not an
    /// error. Each entry of `model_api_key_map` yields one config whose key is
    /// read from the named variable; entries whose variable is unset are
    /// skipped. `None` maps `gpt-4` and `gpt-3.5-turbo` to `OPENAI_API_KEY`.
    pub fn config_list_from_dotenv(
        &self,
        dotenv_path: impl AsRef<Path>,
        model_api_key_map: Option<Vec<(String, DotenvModelSpec)>>,
        filter: Option<&FilterPredicate>,
    ) -> Result<Vec<EndpointConfig>> {
        let env = self.dotenv_environment(dotenv_path.as_ref())?;

        let mapping = model_api_key_map.unwrap_or_else(|| {
            vec![
                ("gpt-4".to_string(), DotenvModelSpec::from("OPENAI_API_KEY")),
                (
                    "gpt-3.5-turbo".to_string(),
                    DotenvModelSpec::from("OPENAI_API_KEY"),
                ),
            ]
        });

        let mut configs = Vec::with_capacity(mapping.len());
        for (model, spec) in mapping {
            let Some(api_key) = env.var(&spec.api_key_env_var) else {
                log::warn!(
                    "no value for {} in the environment or .env, skipping model {}",
                    spec.api_key_env_var,
                    model
                );
                continue;
            };

            let mut builder = EndpointConfig::builder(model).api_key(api_key);
            if let Some(url) = spec.base_url {
                builder = builder.base_url(url);
            }
            if let Some(api_type) = spec.api_type {
                builder = builder.api_type(api_type);
            }
            if let Some(version) = spec.api_version {
                builder = builder.api_version(version);
            }
            configs.push(builder.build());
        }

        if configs.is_empty() {
            log::warn!("no endpoint configs could be built from .env");
        }

        Ok(match filter {
            Some(filter) => filter.apply(configs),
            None => configs,
        })
    }

    fn dotenv_environment(&self, path: &Path) -> Result<LayeredEnv> {
        let mut overlay = HashMap::new();
        if self.filesystem().is_file(path) {
            let text = self.filesystem().read_to_string(path)?;
            for item in dotenv::from_read_iter(text.as_bytes()) {
                let (key, value) = item?;
                overlay.insert(key, value);
            }
            log::debug!("loaded {} variables from {}", overlay.len(), path.display());
        } else {
            log::debug!("{} not found, using the environment only", path.display());
        }
        Ok(LayeredEnv::new(Arc::clone(self.environment()), overlay))
    }
}
