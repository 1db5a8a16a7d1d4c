#[allow(clippy::single_component_path_imports)]
use serde_yaml;

/// One rejected form field and the message shown next to it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, utoipa::ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, thiserror::Error)]
pub enum PracticeError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("validation failed: {}", join_field_errors(.0))]
    Validation(Vec<FieldError>),
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("text error: {0}")]
    Text(#[from] nadym_types::TextError),
    #[error("identifier error: {0}")]
    Uuid(#[from] nadym_uuid::UuidError),
    #[error("file storage error: {0}")]
    Files(#[from] nadym_files::FilesError),

    #[error("failed to read record file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to write record file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to create record directory: {0}")]
    DirCreation(std::io::Error),
    #[error("failed to remove record directory: {0}")]
    DirRemoval(std::io::Error),
    #[error("failed to serialize YAML: {0}")]
    YamlSerialization(serde_yaml::Error),
    #[error("failed to deserialize YAML: {0}")]
    YamlDeserialization(serde_yaml::Error),
}

impl PracticeError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Single-field validation failure.
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }
}

pub type PracticeResult<T> = std::result::Result<T, PracticeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_lists_every_field() {
        let err = PracticeError::Validation(vec![
            FieldError::new("email", "invalid email address"),
            FieldError::new("first_name", "this field is required"),
        ]);
        assert_eq!(
            err.to_string(),
            "validation failed: email: invalid email address; first_name: this field is required"
        );
    }

    #[test]
    fn test_not_found_message() {
        let err = PracticeError::not_found("patient", "abc");
        assert_eq!(err.to_string(), "patient not found: abc");
    }
}
