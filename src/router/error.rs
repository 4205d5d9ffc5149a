use thiserror::Error;

/// Configuration and URL-building errors raised by the router.
///
/// These are programmer errors: they surface at registration time (or when
/// building a URL) and are never retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RouteError {
    /// The template could not be parsed into literals and `{name}` slots.
    #[error("invalid URL pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A regex override named a variable the pattern does not declare.
    #[error("URL pattern `{pattern}` has no variable `{name}`")]
    UnknownVariable { pattern: String, name: String },

    /// A variable or method regex failed to compile.
    #[error("invalid regex for `{name}`: {source}")]
    InvalidRegex {
        name: String,
        #[source]
        source: regex::Error,
    },

    /// `build_url` was not given a value for a declared variable.
    #[error("missing value for `{name}` while building `{pattern}`")]
    MissingParameter { pattern: String, name: String },

    /// `build_url` was given a value its variable's regex rejects.
    #[error("value `{value}` for `{name}` does not match `{regex}`")]
    ParameterMismatch {
        name: String,
        value: String,
        regex: String,
    },

    /// A route reached its terminal step without a handler.
    #[error("route `{route}` has no handler")]
    MissingHandler { route: String },

    /// The collection prefix is fixed once a route is registered.
    #[error("cannot change prefix to `{requested}`: routes are already registered under `{current}`")]
    PrefixLocked { current: String, requested: String },

    #[error("no route named `{0}`")]
    UnknownRoute(String),

    /// Reverse routing on a route without any URL pattern.
    #[error("route `{0}` has no URL pattern to build from")]
    NoPattern(String),
}
