//! Path resolution and content loading
//!
//!     The builder never touches the filesystem directly. Everything that depends on I/O goes
//!     through a [SourceLoader]: expanding an include pattern into concrete paths (wildcards
//!     included) and reading a unit's text. [FsLoader] is the production implementation,
//!     [MemoryLoader] serves hosts that already hold their sources in memory, and tests.
//!
//!     Paths are normalized lexically (`.` and `..` folded, no symlink resolution) so that the
//!     same file reached through different relative spellings maps to one unit identity.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Component, Path, PathBuf};

use crate::sieve::error::{ErrorKind, LoadError};
use crate::sieve::flags::FlagEnv;

/// Resolves include patterns and loads unit text
pub trait SourceLoader: Send + Sync + 'static {
    /// Expand `pattern` relative to `base` into concrete paths, in a stable order.
    /// Wildcard patterns may expand to nothing; a plain path that does not exist is an error.
    fn resolve(
        &self,
        base: &Path,
        pattern: &str,
    ) -> impl Future<Output = Result<Vec<PathBuf>, LoadError>> + Send;

    /// Read the full text behind `path`
    fn load(&self, path: &Path) -> impl Future<Output = Result<String, LoadError>> + Send;
}

/// Loads from the local filesystem, expanding wildcards with `glob`
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLoader;

impl SourceLoader for FsLoader {
    fn resolve(
        &self,
        base: &Path,
        pattern: &str,
    ) -> impl Future<Output = Result<Vec<PathBuf>, LoadError>> + Send {
        let joined = normalize_path(&base.join(pattern));
        let wildcard = is_wildcard(pattern);

        async move {
            if !wildcard {
                return match tokio::fs::metadata(&joined).await {
                    Ok(meta) if meta.is_file() => Ok(vec![joined]),
                    _ => Err(LoadError::NotFound(joined)),
                };
            }

            tokio::task::spawn_blocking(move || -> Result<Vec<PathBuf>, LoadError> {
                let mut paths = Vec::new();
                for entry in glob::glob(&joined.to_string_lossy())? {
                    let path = entry.map_err(|e| LoadError::Io(e.into_error()))?;
                    if path.is_file() {
                        paths.push(normalize_path(&path));
                    }
                }
                paths.sort();
                Ok(paths)
            })
            .await
            .map_err(|e| LoadError::Task(e.to_string()))?
        }
    }

    fn load(&self, path: &Path) -> impl Future<Output = Result<String, LoadError>> + Send {
        let path = path.to_path_buf();
        async move {
            tokio::fs::read_to_string(&path).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    LoadError::NotFound(path)
                } else {
                    LoadError::Io(e)
                }
            })
        }
    }
}

/// Serves sources from memory, keyed by normalized path
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    files: BTreeMap<PathBuf, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl AsRef<Path>, content: impl Into<String>) -> Self {
        self.insert(path, content);
        self
    }

    pub fn insert(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        self.files
            .insert(normalize_path(path.as_ref()), content.into());
    }
}

impl SourceLoader for MemoryLoader {
    fn resolve(
        &self,
        base: &Path,
        pattern: &str,
    ) -> impl Future<Output = Result<Vec<PathBuf>, LoadError>> + Send {
        let joined = normalize_path(&base.join(pattern));
        let result: Result<Vec<PathBuf>, LoadError> = if is_wildcard(pattern) {
            glob::Pattern::new(&joined.to_string_lossy())
                .map(|matcher| {
                    let options = glob::MatchOptions {
                        require_literal_separator: true,
                        ..glob::MatchOptions::new()
                    };
                    // BTreeMap keys are already sorted
                    self.files
                        .keys()
                        .filter(|path| matcher.matches_path_with(path, options))
                        .cloned()
                        .collect()
                })
                .map_err(LoadError::from)
        } else if self.files.contains_key(&joined) {
            Ok(vec![joined])
        } else {
            Err(LoadError::NotFound(joined))
        };
        std::future::ready(result)
    }

    fn load(&self, path: &Path) -> impl Future<Output = Result<String, LoadError>> + Send {
        let path = normalize_path(path);
        let result = self
            .files
            .get(&path)
            .cloned()
            .ok_or(LoadError::NotFound(path));
        std::future::ready(result)
    }
}

pub(crate) fn is_wildcard(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Fold `.` and `..` components without touching the filesystem
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(
                    normalized.components().next_back(),
                    Some(Component::Normal(_))
                );
                if can_pop {
                    normalized.pop();
                } else if !matches!(
                    normalized.components().next_back(),
                    Some(Component::RootDir | Component::Prefix(_))
                ) {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Identity string of a path-backed unit
pub fn path_identity(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Expand `${name}` references against the build-time flag environment
pub fn substitute_flags(pattern: &str, env: &FlagEnv) -> Result<String, ErrorKind> {
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated reference stays literal
            out.push_str(&rest[start..]);
            return Ok(out);
        };

        let name = after[..end].trim();
        let value = env
            .get(name)
            .ok_or_else(|| ErrorKind::UndefinedVariable(name.to_string()))?;
        out.push_str(&value.to_string());
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}
