use thiserror::Error;

/// Errors raised while resolving handler parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    /// Strict mode only: no rule could satisfy the parameter.
    #[error("no binding can satisfy parameter `{name}`")]
    Unresolved { name: String },
    /// The binding exists but holds a value of another type.
    #[error("binding `{name}` holds `{found}`, expected `{expected}`")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("no binding named `{name}`")]
    Unbound { name: String },
}
