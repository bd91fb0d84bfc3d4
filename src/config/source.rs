//! Environment and filesystem access for config resolution.
//!
//! The resolver never touches the process environment or `std::fs` directly.
//! It reads through [`Environment`] and [`FileSystem`], so tests can hand it a
//! fixed snapshot instead of mutating global state.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Read-only view of environment variables.
pub trait Environment: Send + Sync {
    /// The value of `name`, or `None` when unset or not valid unicode.
    fn var(&self, name: &str) -> Option<String>;
}

/// Read-only view of the filesystem.
pub trait FileSystem: Send + Sync {
    /// Whether `path` exists and is a regular file.
    fn is_file(&self, path: &Path) -> bool;

    /// Read the whole file at `path` as UTF-8.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl Environment for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// An environment with a fallback layer underneath.
///
/// Variables set in `base` win; `overlay` only fills in names `base` lacks.
/// Used to apply `.env` files without overriding the real environment.
#[derive(Clone)]
pub struct LayeredEnv {
    base: Arc<dyn Environment>,
    overlay: HashMap<String, String>,
}

impl LayeredEnv {
    pub fn new(base: Arc<dyn Environment>, overlay: HashMap<String, String>) -> Self {
        Self { base, overlay }
    }
}

impl Environment for LayeredEnv {
    fn var(&self, name: &str) -> Option<String> {
        self.base
            .var(name)
            .or_else(|| self.overlay.get(name).cloned())
    }
}

/// `std::fs` backed filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFs;

impl FileSystem for StdFs {
    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// In-memory filesystem for tests and embedded configs.
#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    files: HashMap<PathBuf, String>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file.
    pub fn with_file(mut self, path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        self.files.insert(path.into(), contents.into());
        self
    }
}

impl FileSystem for MemoryFs {
    fn is_file(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            )
        })
    }
}

/// Where a resolved config list came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// The environment variable held a path to this file.
    EnvFile { var: String, path: PathBuf },
    /// The environment variable held the JSON document itself.
    EnvInline { var: String },
    /// The source string named this file directly.
    File(PathBuf),
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::EnvFile { var, path } => write!(f, "${} -> {}", var, path.display()),
            ConfigSource::EnvInline { var } => write!(f, "${} (inline)", var),
            ConfigSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layered_env_prefers_base() {
        let base: HashMap<String, String> =
            HashMap::from([("KEY".to_string(), "from-base".to_string())]);
        let overlay = HashMap::from([
            ("KEY".to_string(), "from-overlay".to_string()),
            ("OTHER".to_string(), "only-overlay".to_string()),
        ]);
        let env = LayeredEnv::new(Arc::new(base), overlay);

        assert_eq!(env.var("KEY").as_deref(), Some("from-base"));
        assert_eq!(env.var("OTHER").as_deref(), Some("only-overlay"));
        assert_eq!(env.var("MISSING"), None);
    }

    #[test]
    fn test_memory_fs() {
        let fs = MemoryFs::new().with_file("/etc/list.json", "[]");
        assert!(fs.is_file(Path::new("/etc/list.json")));
        assert!(!fs.is_file(Path::new("/etc/other.json")));
        assert_eq!(fs.read_to_string(Path::new("/etc/list.json")).unwrap(), "[]");
        assert_eq!(
            fs.read_to_string(Path::new("/nope")).unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }
}
