use thiserror::Error;

use crate::construct::EntityKind;
use crate::formatter::functions::FunctionError;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Store version {found} is newer than the supported version {supported}")]
    SchemaVersion { found: u32, supported: u32 },

    // template language
    #[error("Lexical error at offset {offset}: {message}")]
    Lexical { message: String, offset: usize },
    #[error("Syntax error at offset {offset}: {message}")]
    Syntax { message: String, offset: usize },
    #[error("Unresolved variable '{name}'")]
    UnresolvedVariable { name: String },
    #[error("Unknown function '{name}'")]
    UnknownFunction { name: String },
    #[error("Error calling '{function}'{}: {source}", .variable.as_ref().map(|v| format!(" on variable '{v}'")).unwrap_or_default())]
    Evaluation {
        function: String,
        variable: Option<String>,
        #[source]
        source: FunctionError,
    },

    // entity store
    #[error("Invalid value for {kind}.{property}: {message}")]
    Validation {
        kind: EntityKind,
        property: String,
        message: String,
    },
    #[error("{kind} '{uuid}' does not exist")]
    NotFound { kind: EntityKind, uuid: String },
    #[error("Duplicate {kind}: {message}")]
    Duplicate { kind: EntityKind, message: String },
    #[error("Integrity violation on {kind}: {message}")]
    Integrity { kind: EntityKind, message: String },
    #[error("Unknown property '{property}' for {kind}")]
    UnknownProperty { kind: EntityKind, property: String },
    #[error("Criteria error: {0}")]
    Criteria(String),
}

pub type Result<T> = std::result::Result<T, CatalogError>;

impl CatalogError {
    pub(crate) fn validation(kind: EntityKind, property: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            kind,
            property: property.to_string(),
            message: message.into(),
        }
    }
    pub(crate) fn not_found(kind: EntityKind, uuid: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            uuid: uuid.into(),
        }
    }
    pub(crate) fn integrity(kind: EntityKind, message: impl Into<String>) -> Self {
        Self::Integrity {
            kind,
            message: message.into(),
        }
    }
    pub(crate) fn duplicate(kind: EntityKind, message: impl Into<String>) -> Self {
        Self::Duplicate {
            kind,
            message: message.into(),
        }
    }
    /// True for errors raised by a malformed template rather than by evaluation.
    pub fn is_template_syntax(&self) -> bool {
        matches!(self, Self::Lexical { .. } | Self::Syntax { .. })
    }
}

// Helper conversions
impl From<rusqlite::Error> for CatalogError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}
impl From<config::ConfigError> for CatalogError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
