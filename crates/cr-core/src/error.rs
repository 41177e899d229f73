/// Error type for building canonical rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    #[error("Empty rule value")]
    EmptyValue,
    #[error("Unknown rule kind: {0}")]
    UnknownKind(String),
    #[error("Missing ',' separator in rule line: {0}")]
    MissingSeparator(String),
    #[error("Invalid {kind} value: {value}")]
    InvalidValue { kind: &'static str, value: String },
}
