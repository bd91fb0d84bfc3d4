//! Config list resolution from the environment or the filesystem.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use crate::config::filter::FilterPredicate;
use crate::config::source::{ConfigSource, Environment, FileSystem, ProcessEnv, StdFs};
use crate::config::types::EndpointConfig;
use crate::error::{Error, Result};

/// Environment variable consulted by [`ConfigListResolver::resolve_default`].
pub const DEFAULT_CONFIG_LIST_VAR: &str = "OAI_CONFIG_LIST";

/// Loads ordered lists of [`EndpointConfig`] from an environment variable or a
/// JSON file.
///
/// Given a source string the resolver tries, in order:
/// 1. the environment variable named `source`, when its value is the path of a
///    readable file holding a JSON array;
/// 2. the same variable's value parsed as an inline JSON array;
/// 3. `source` as a file path, relative to the configured file location.
///
/// ```rust
/// use std::collections::HashMap;
/// use llmconf::config::{ConfigListResolver, MemoryFs};
///
/// let env = HashMap::from([(
///     "OAI_CONFIG_LIST".to_string(),
///     r#"[{"model": "gpt-4", "tags": ["default"]}]"#.to_string(),
/// )]);
/// let resolver = ConfigListResolver::builder()
///     .environment(env)
///     .filesystem(MemoryFs::new())
///     .build();
///
/// let configs = resolver.resolve("OAI_CONFIG_LIST", None).unwrap();
/// assert_eq!(configs[0].model(), "gpt-4");
/// ```
#[derive(Clone)]
pub struct ConfigListResolver {
    env: Arc<dyn Environment>,
    fs: Arc<dyn FileSystem>,
    file_location: Option<PathBuf>,
}

impl ConfigListResolver {
    /// A resolver bound to the process environment and the real filesystem.
    pub fn from_process() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ConfigListResolverBuilder {
        ConfigListResolverBuilder::default()
    }

    /// The environment this resolver reads from.
    pub fn environment(&self) -> &Arc<dyn Environment> {
        &self.env
    }

    /// The filesystem this resolver reads from.
    pub fn filesystem(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    /// Directory that relative file sources are resolved against.
    pub fn file_location(&self) -> Option<&Path> {
        self.file_location.as_deref()
    }

    /// Resolve `source` into an ordered config list, optionally filtered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigNotFound`] when no step yields a list, and
    /// [`Error::ConfigMalformed`] when the list found contains an invalid
    /// record. A malformed record never produces a partial list.
    pub fn resolve(
        &self,
        source: &str,
        filter: Option<&FilterPredicate>,
    ) -> Result<Vec<EndpointConfig>> {
        let (origin, configs) = self.load(source)?;
        let total = configs.len();

        let configs = match filter {
            Some(filter) => filter.apply(configs),
            None => configs,
        };

        log::debug!(
            "resolved {} of {} endpoint configs from {}",
            configs.len(),
            total,
            origin
        );
        Ok(configs)
    }

    /// Resolve the list named by [`DEFAULT_CONFIG_LIST_VAR`].
    pub fn resolve_default(&self, filter: Option<&FilterPredicate>) -> Result<Vec<EndpointConfig>> {
        self.resolve(DEFAULT_CONFIG_LIST_VAR, filter)
    }

    /// Load the unfiltered list for `source` along with where it came from.
    pub fn load(&self, source: &str) -> Result<(ConfigSource, Vec<EndpointConfig>)> {
        if let Some(value) = self.env.var(source) {
            if let Some(found) = self.load_env_file(source, value.trim()) {
                return found;
            }

            match array_document(&value) {
                Some(records) => {
                    let configs = parse_records(records)?;
                    return Ok((
                        ConfigSource::EnvInline {
                            var: source.to_string(),
                        },
                        configs,
                    ));
                }
                None => log::debug!(
                    "${} is neither a config file path nor an inline JSON array",
                    source
                ),
            }
        }

        let path = self.file_path(source);
        if self.fs.is_file(&path) {
            let text = match self.fs.read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    log::warn!("{} is unreadable: {}", path.display(), e);
                    return Err(Error::ConfigNotFound {
                        source_name: source.to_string(),
                    });
                }
            };
            let document: Value = serde_json::from_str(&text)
                .map_err(|e| Error::malformed(None, format!("{}: {}", path.display(), e)))?;
            let Value::Array(records) = document else {
                return Err(Error::malformed(
                    None,
                    format!("{}: expected a JSON array of configs", path.display()),
                ));
            };
            let configs = parse_records(records)?;
            return Ok((ConfigSource::File(path), configs));
        }

        Err(Error::ConfigNotFound {
            source_name: source.to_string(),
        })
    }

    /// Step one: the variable's value names a file.
    ///
    /// Returns `None` to fall through to the next step.
    fn load_env_file(
        &self,
        var: &str,
        value: &str,
    ) -> Option<Result<(ConfigSource, Vec<EndpointConfig>)>> {
        if value.is_empty() {
            return None;
        }
        let path = Path::new(value);
        if !self.fs.is_file(path) {
            return None;
        }

        let text = match self.fs.read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                log::warn!("${} points to {} which is unreadable: {}", var, value, e);
                return None;
            }
        };

        let Some(records) = array_document(&text) else {
            log::warn!(
                "${} points to {} which is not a JSON array, ignoring it",
                var,
                value
            );
            return None;
        };

        Some(parse_records(records).map(|configs| {
            (
                ConfigSource::EnvFile {
                    var: var.to_string(),
                    path: path.to_path_buf(),
                },
                configs,
            )
        }))
    }

    fn file_path(&self, source: &str) -> PathBuf {
        match &self.file_location {
            Some(dir) => dir.join(source),
            None => PathBuf::from(source),
        }
    }
}

impl Default for ConfigListResolver {
    fn default() -> Self {
        Self::from_process()
    }
}

impl fmt::Debug for ConfigListResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigListResolver")
            .field("file_location", &self.file_location)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ConfigListResolver`].
#[derive(Default)]
pub struct ConfigListResolverBuilder {
    env: Option<Arc<dyn Environment>>,
    fs: Option<Arc<dyn FileSystem>>,
    file_location: Option<PathBuf>,
}

impl ConfigListResolverBuilder {
    /// Read variables from `env` instead of the process environment.
    pub fn environment(mut self, env: impl Environment + 'static) -> Self {
        self.env = Some(Arc::new(env));
        self
    }

    /// Share an existing environment view.
    pub fn shared_environment(mut self, env: Arc<dyn Environment>) -> Self {
        self.env = Some(env);
        self
    }

    /// Read files through `fs` instead of `std::fs`.
    pub fn filesystem(mut self, fs: impl FileSystem + 'static) -> Self {
        self.fs = Some(Arc::new(fs));
        self
    }

    /// Share an existing filesystem view.
    pub fn shared_filesystem(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = Some(fs);
        self
    }

    /// Resolve relative file sources against `dir`.
    pub fn file_location(mut self, dir: impl Into<PathBuf>) -> Self {
        self.file_location = Some(dir.into());
        self
    }

    pub fn build(self) -> ConfigListResolver {
        ConfigListResolver {
            env: self.env.unwrap_or_else(|| Arc::new(ProcessEnv)),
            fs: self.fs.unwrap_or_else(|| Arc::new(StdFs)),
            file_location: self.file_location,
        }
    }
}

/// Parse a JSON document holding a config list.
///
/// # Errors
///
/// Returns [`Error::ConfigMalformed`] if `text` is not a JSON array or any
/// record in it is invalid.
pub fn parse_config_list(text: &str) -> Result<Vec<EndpointConfig>> {
    let document: Value =
        serde_json::from_str(text).map_err(|e| Error::malformed(None, e.to_string()))?;
    match document {
        Value::Array(records) => parse_records(records),
        _ => Err(Error::malformed(None, "expected a JSON array of configs")),
    }
}

/// Convert raw records into configs, failing on the first invalid one.
pub(crate) fn parse_records(records: Vec<Value>) -> Result<Vec<EndpointConfig>> {
    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            if !record.is_object() {
                return Err(Error::malformed(Some(index), "record is not a JSON object"));
            }
            serde_json::from_value(record).map_err(|e| Error::malformed(Some(index), e.to_string()))
        })
        .collect()
}

fn array_document(text: &str) -> Option<Vec<Value>> {
    match serde_json::from_str(text) {
        Ok(Value::Array(records)) => Some(records),
        _ => None,
    }
}
