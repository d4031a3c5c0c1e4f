use thiserror::Error;

/// Errors raised by the latency history store.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HistoryError {
    /// The sample was addressed to a target that was never registered.
    #[error("unknown target '{0}'")]
    UnknownTarget(String),
}

/// Errors raised while parsing a `#rrggbb` display color.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ColorError {
    #[error("color '{0}' must start with '#'")]
    MissingHash(String),
    #[error("color '{0}' must have exactly six hex digits")]
    BadLength(String),
    #[error("color '{0}' contains a non-hex digit")]
    BadDigit(String),
}
