//! Error types
//!
//! Every failure surfaced by a compile is a [SieveError]: the identity of the unit being
//! built, the 1-based line of the offending directive (0 when the failure is not tied to a
//! line) and an [ErrorKind]. The library never prints these, hosts render them.

use std::path::PathBuf;
use thiserror::Error;

use crate::sieve::directive::ScopeKind;

/// Error surfaced by a compile request
#[derive(Debug, Error)]
#[error("{unit}:{line}: {kind}")]
pub struct SieveError {
    pub unit: String,
    pub line: usize,
    #[source]
    pub kind: ErrorKind,
}

impl SieveError {
    pub fn new(unit: impl Into<String>, line: usize, kind: ErrorKind) -> Self {
        Self {
            unit: unit.into(),
            line,
            kind,
        }
    }

    /// Human readable message without the location prefix
    pub fn message(&self) -> String {
        self.kind.to_string()
    }
}

/// What went wrong
#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("unknown directive `{0}`")]
    UnknownDirective(String),

    #[error("`{directive}` requires {expected}")]
    MissingOperand {
        directive: &'static str,
        expected: &'static str,
    },

    #[error("malformed condition `{0}`")]
    MalformedCondition(String),

    #[error("`end{0}` has no open scope to close")]
    UnmatchedClose(ScopeKind),

    #[error("`end{found}` cannot close `{open}` opened on line {opened_at}")]
    MismatchedClose {
        found: ScopeKind,
        open: ScopeKind,
        opened_at: usize,
    },

    #[error("`{0}` is never closed")]
    Unclosed(ScopeKind),

    #[error("undefined variable `${{{0}}}` in include path")]
    UndefinedVariable(String),

    #[error("cannot resolve `{pattern}`: {source}")]
    Resolve {
        pattern: String,
        #[source]
        source: LoadError,
    },

    #[error("cannot load `{}`: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: LoadError,
    },

    #[error("invalid source map: {0}")]
    InvalidSourceMap(String),

    #[error("compile request has neither a path nor inline content")]
    MissingSource,

    #[error("source maps were requested but this session does not track positions")]
    TrackingDisabled,
}

/// Failure reported by a [SourceLoader](crate::sieve::loader::SourceLoader)
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no such file `{}`", .0.display())]
    NotFound(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("bad wildcard pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("loader task failed: {0}")]
    Task(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_unit_and_line() {
        let err = SieveError::new(
            "src/main.js",
            12,
            ErrorKind::UnknownDirective("iff".to_string()),
        );
        assert_eq!(err.to_string(), "src/main.js:12: unknown directive `iff`");
        assert_eq!(err.message(), "unknown directive `iff`");
    }

    #[test]
    fn test_mismatched_close_message() {
        let kind = ErrorKind::MismatchedClose {
            found: ScopeKind::If,
            open: ScopeKind::Label,
            opened_at: 3,
        };
        assert_eq!(
            kind.to_string(),
            "`endif` cannot close `label` opened on line 3"
        );
    }

    #[test]
    fn test_undefined_variable_message() {
        let kind = ErrorKind::UndefinedVariable("target".to_string());
        assert_eq!(
            kind.to_string(),
            "undefined variable `${target}` in include path"
        );
    }
}
