//! Error types for Harvest.
//!
//! Library crates use [`HarvestError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

/// Coarse classification of a [`HarvestError`], stable across context wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed document, unknown element, missing or illegal attribute.
    Definition,
    /// Plugin registration failure.
    Plugin,
    /// Missing capability or unusable configuration.
    Configuration,
    /// Operation-level failure during a run.
    Domain,
    /// Fault raised by a scripting evaluator.
    Script,
    /// Filesystem I/O failure.
    Io,
    /// Network/HTTP failure.
    Network,
    /// Cooperative cancellation.
    Interrupted,
}

/// Top-level error type for all Harvest operations.
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// The definition document is malformed or violates an element contract.
    #[error("definition error: {message}{}", at(.location))]
    Definition {
        message: String,
        location: Option<String>,
    },

    /// An element name could not be bound to any registered operation.
    #[error("unknown operation {name}{}", at(.location))]
    UnknownOperation {
        name: String,
        location: Option<String>,
    },

    /// A plugin could not be registered.
    #[error("plugin error ({plugin}): {message}")]
    Plugin { plugin: String, message: String },

    /// Configuration loading error or missing capability (e.g. no script evaluator).
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Operation-level failure (misuse, bad attribute value, unbound variable…).
    #[error("{message}")]
    Domain { message: String },

    /// A scripting evaluator rejected or failed a script.
    #[error("script error [{language}]: {message}")]
    Script { language: String, message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// Network/HTTP error while loading a document or running `http`.
    #[error("network error: {0}")]
    Network(String),

    /// The run was cancelled.
    #[error("execution interrupted")]
    Interrupted,

    /// A failure raised inside a running operation, tagged with that operation.
    #[error("<{element}> at {location}: {source}")]
    Operation {
        element: String,
        location: String,
        source: Box<HarvestError>,
    },
}

fn at(location: &Option<String>) -> String {
    location
        .as_deref()
        .map(|loc| format!(" (at {loc})"))
        .unwrap_or_default()
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, HarvestError>;

impl HarvestError {
    /// Create a definition error from any displayable message.
    pub fn definition(msg: impl Into<String>) -> Self {
        Self::Definition {
            message: msg.into(),
            location: None,
        }
    }

    /// Create a definition error pointing at a source location.
    pub fn definition_at(msg: impl Into<String>, location: impl Into<String>) -> Self {
        Self::Definition {
            message: msg.into(),
            location: Some(location.into()),
        }
    }

    /// Create a configuration error from any displayable message.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// Create a domain error from any displayable message.
    pub fn domain(msg: impl Into<String>) -> Self {
        Self::Domain {
            message: msg.into(),
        }
    }

    /// Create a plugin error for the given plugin identifier.
    pub fn plugin(plugin: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Plugin {
            plugin: plugin.into(),
            message: msg.into(),
        }
    }

    /// Create a script error for the given language.
    pub fn script(language: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Script {
            language: language.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Tag this error with the operation it escaped from.
    ///
    /// Errors that already carry an operation, definition errors that carry a
    /// location, and interruptions are returned unchanged so the innermost
    /// failing operation is the one reported.
    pub fn in_operation(self, element: impl Into<String>, location: impl Into<String>) -> Self {
        match self {
            Self::Operation { .. } | Self::Interrupted => self,
            Self::Definition {
                location: Some(_), ..
            } => self,
            other => Self::Operation {
                element: element.into(),
                location: location.into(),
                source: Box::new(other),
            },
        }
    }

    /// Taxonomy class of this error, looking through operation context.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Definition { .. } | Self::UnknownOperation { .. } => ErrorKind::Definition,
            Self::Plugin { .. } => ErrorKind::Plugin,
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Domain { .. } => ErrorKind::Domain,
            Self::Script { .. } => ErrorKind::Script,
            Self::Io { .. } => ErrorKind::Io,
            Self::Network(_) => ErrorKind::Network,
            Self::Interrupted => ErrorKind::Interrupted,
            Self::Operation { source, .. } => source.kind(),
        }
    }

    /// The innermost error, with operation context stripped.
    pub fn root(&self) -> &HarvestError {
        match self {
            Self::Operation { source, .. } => source.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = HarvestError::configuration("no script engine found for name: 'lua'");
        assert_eq!(
            err.to_string(),
            "configuration error: no script engine found for name: 'lua'"
        );

        let err = HarvestError::definition_at("missing attribute 'name'", "line 3, column 5");
        assert!(err.to_string().contains("(at line 3, column 5)"));
    }

    #[test]
    fn kind_looks_through_operation_context() {
        let err = HarvestError::domain("cannot use zip-entry outside of zip")
            .in_operation("zip-entry", "line 2, column 3");
        assert_eq!(err.kind(), ErrorKind::Domain);
        assert!(err.to_string().starts_with("<zip-entry> at line 2, column 3"));
    }

    #[test]
    fn innermost_operation_wins() {
        let err = HarvestError::domain("boom")
            .in_operation("var", "line 4, column 1")
            .in_operation("config", "line 1, column 1");
        match &err {
            HarvestError::Operation { element, .. } => assert_eq!(element, "var"),
            other => panic!("expected operation context, got {other:?}"),
        }
        assert!(matches!(err.root(), HarvestError::Domain { .. }));
    }

    #[test]
    fn interruption_is_never_wrapped() {
        let err = HarvestError::Interrupted.in_operation("sleep", "line 1, column 1");
        assert!(matches!(err, HarvestError::Interrupted));
    }
}
