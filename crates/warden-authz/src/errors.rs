use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("model parse error: {0}")]
    ModelParse(String),
    #[error("failed to read model file {path}: {source}")]
    ModelIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unknown policy type: {0}")]
    InvalidPolicyType(String),
    #[error("invalid rule: {0}")]
    InvalidRule(String),
    #[error("request has {actual} fields, model expects {expected}")]
    RequestArity { expected: usize, actual: usize },
    #[error("matcher evaluation failed: {0}")]
    Eval(String),
}

impl AuthzError {
    pub(crate) fn parse(message: impl Into<String>) -> Self {
        AuthzError::ModelParse(message.into())
    }

    pub(crate) fn eval(message: impl Into<String>) -> Self {
        AuthzError::Eval(message.into())
    }
}

pub type AuthzResult<T> = Result<T, AuthzError>;
