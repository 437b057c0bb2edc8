use testgear_wire::Kind;

/// Errors raised by capability tables, the registry and provider loaders.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// No provider, variable or command matches the name.
    #[error("{what} {name} not found")]
    NotFound { what: &'static str, name: String },

    /// The entry exists but holds a different kind.
    #[error("{name} is of {found} type, not {expected}")]
    KindMismatch {
        name: String,
        expected: Kind,
        found: Kind,
    },

    /// Reserved metadata names cannot be written.
    #[error("{0} is read-only")]
    ReadOnly(String),

    #[error("provider {0} is already loaded")]
    AlreadyLoaded(String),

    /// The code unit could not be resolved or has no registration entry point.
    #[error("failed to load provider {name}: {reason}")]
    LoadError { name: String, reason: String },

    /// The code unit could not be released cleanly.
    #[error("failed to unload provider {name}: {reason}")]
    UnloadError { name: String, reason: String },

    /// The provider's initialization hook failed.
    #[error("provider {name} failed to initialize: {reason}")]
    InitFailed { name: String, reason: String },
}

impl PluginError {
    pub(crate) fn not_found(what: &'static str, name: impl Into<String>) -> Self {
        PluginError::NotFound {
            what,
            name: name.into(),
        }
    }

    pub(crate) fn load(name: impl Into<String>, reason: impl Into<String>) -> Self {
        PluginError::LoadError {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PluginError>;
