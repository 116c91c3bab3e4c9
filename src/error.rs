
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EntryError {
    #[error("Key not found: {key} in {entry}")]
    KeyNotFound { key: String, entry: String },
    #[error("Path not found: {path} in {entry}")]
    PathNotFound { path: String, entry: String },
    #[error("Could not find the action '{action}' neither along the ancestry path '{ancestry}' nor among the built-in methods")]
    ActionNotFound { action: String, ancestry: String },
    #[error("The '{action}' action is missing required arguments: {missing:?}")]
    MissingRequiredArgument { action: String, missing: Vec<String> },
    #[error("The '{action}' action accepts {accepted} arguments, but {given} were given")]
    TooManyArguments { action: String, accepted: usize, given: usize },
    #[error("The '{0}' action declares a variable argument list or a required parameter after an optional one, which cannot be bound")]
    UnsupportedSignature(String),
    #[error("Could not parse the condition '{condition}'")]
    QuerySyntaxError { condition: String },
    #[error("There was already another entry named {name} with path {existing}, remove it first")]
    DuplicateChildName { name: String, existing: String },
    #[error("Invalid reference: {0}")]
    InvalidReference(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Parse error: {message}")]
    Parse { message: String },
    #[error("Config error: {0}")]
    Config(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, EntryError>;

// Helper conversions
impl From<std::io::Error> for EntryError {
    fn from(e: std::io::Error) -> Self { Self::Persistence(e.to_string()) }
}
impl From<serde_json::Error> for EntryError {
    fn from(e: serde_json::Error) -> Self { Self::Persistence(e.to_string()) }
}
impl From<config::ConfigError> for EntryError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
impl<T> From<std::sync::PoisonError<T>> for EntryError {
    fn from(e: std::sync::PoisonError<T>) -> Self { Self::Lock(e.to_string()) }
}
