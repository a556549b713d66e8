use thiserror::Error;

#[derive(Error, Debug)]
pub enum WigglerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown {kind} unit: {value:?}. Use one of: {expected}")]
    UnknownUnit {
        kind: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("Material {name:?} is not in the material library{hint}")]
    UnknownMaterial { name: String, hint: String },

    #[error("Malformed result line {line}: {content:?} (expected two numeric columns)")]
    Parse { line: usize, content: String },

    #[error("Solver error: {0}")]
    Solver(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),
}

pub type WigglerResult<T> = Result<T, WigglerError>;
