use newapi_types::ErrorCategory;
use std::borrow::Cow;

/// Case-insensitive predicate over the concatenated stderr text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Pattern {
    Contains(Cow<'static, str>),
    All(Vec<Pattern>),
    Any(Vec<Pattern>),
}

impl Pattern {
    pub fn contains(needle: impl Into<Cow<'static, str>>) -> Self {
        Pattern::Contains(needle.into())
    }

    pub fn any_of(needles: &[&'static str]) -> Self {
        Pattern::Any(needles.iter().copied().map(Pattern::contains).collect())
    }

    pub fn all_of(needles: &[&'static str]) -> Self {
        Pattern::All(needles.iter().copied().map(Pattern::contains).collect())
    }

    /// `haystack` must already be lowercased.
    pub fn matches(&self, haystack: &str) -> bool {
        match self {
            Pattern::Contains(needle) => haystack.contains(&needle.to_lowercase()),
            Pattern::All(parts) => parts.iter().all(|p| p.matches(haystack)),
            Pattern::Any(parts) => parts.iter().any(|p| p.matches(haystack)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureRule {
    pub category: ErrorCategory,
    pub pattern: Pattern,
}

impl SignatureRule {
    pub fn new(category: ErrorCategory, pattern: Pattern) -> Self {
        Self { category, pattern }
    }
}

/// Built-in signatures, highest priority first.
pub fn default_rules() -> Vec<SignatureRule> {
    vec![
        SignatureRule::new(
            ErrorCategory::PortInUse,
            Pattern::Any(vec![
                Pattern::contains("address already in use"),
                Pattern::contains("eaddrinuse"),
                Pattern::contains("only one usage of each socket address"),
                Pattern::all_of(&["bind", "port", "in use"]),
            ]),
        ),
        SignatureRule::new(
            ErrorCategory::DatabaseLocked,
            Pattern::Any(vec![
                Pattern::contains("database is locked"),
                Pattern::contains("sqlite_busy"),
                Pattern::all_of(&["database", "locked"]),
            ]),
        ),
        SignatureRule::new(
            ErrorCategory::PermissionDenied,
            Pattern::any_of(&[
                "permission denied",
                "access is denied",
                "operation not permitted",
                "eacces",
            ]),
        ),
        SignatureRule::new(
            ErrorCategory::NetworkUnreachable,
            Pattern::Any(vec![
                Pattern::contains("network is unreachable"),
                Pattern::contains("no route to host"),
                Pattern::contains("no such host"),
                Pattern::all_of(&["dial tcp", "i/o timeout"]),
                Pattern::all_of(&["dial tcp", "connection refused"]),
            ]),
        ),
        SignatureRule::new(
            ErrorCategory::InvalidConfiguration,
            Pattern::Any(vec![
                Pattern::contains("invalid config"),
                Pattern::all_of(&["config", "invalid value"]),
                Pattern::all_of(&["failed to parse", "env"]),
                Pattern::contains("unknown flag"),
                Pattern::contains("flag provided but not defined"),
            ]),
        ),
        SignatureRule::new(
            ErrorCategory::OutOfMemory,
            Pattern::any_of(&[
                "out of memory",
                "cannot allocate memory",
                "fatal error: runtime: cannot allocate",
            ]),
        ),
        SignatureRule::new(
            ErrorCategory::MissingFile,
            Pattern::any_of(&[
                "no such file or directory",
                "the system cannot find the file",
                "the system cannot find the path",
                "enoent",
            ]),
        ),
    ]
}
