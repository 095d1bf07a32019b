use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("class '{0}' is already registered")]
    DuplicateClass(String),

    #[error("'{class}' does not respond to '{selector}'")]
    SelectorNotFound { class: String, selector: String },
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
