//! The configuration error type and its path attribution rules.

use std::fmt::{Debug, Display};

use thiserror::Error;

/// Path used for errors concerning the document as a whole.
pub const ROOT: &str = "root";

/// A configuration element could not be resolved.
///
/// `what` is the underlying cause and `location` the diagnostic path of the
/// offending element. Once a location is assigned it is never replaced, so the
/// innermost path reported while an error propagates is the one preserved.
#[derive(Debug, Error)]
#[error("invalid configuration element '{}': {:#}", location_label(.location), .what)]
pub struct ConfigurationError {
    what: anyhow::Error,
    location: Option<String>,
}

impl ConfigurationError {
    /// Create an error without a location.
    pub fn new(what: impl Into<anyhow::Error>) -> Self {
        Self {
            what: what.into(),
            location: None,
        }
    }

    /// Create an error from a plain message.
    pub fn msg<M>(message: M) -> Self
    where
        M: Display + Debug + Send + Sync + 'static,
    {
        Self::new(anyhow::Error::msg(message))
    }

    /// Assign `location` unless a location is already set.
    pub fn at(mut self, location: impl Into<String>) -> Self {
        if self.location.is_none() {
            self.location = Some(location.into());
        }
        self
    }

    /// The underlying cause.
    pub fn what(&self) -> &anyhow::Error {
        &self.what
    }

    /// The diagnostic path of the offending element, if known.
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// Attribute an arbitrary failure to `location`.
    ///
    /// Configuration errors carrying a location pass through untouched; any
    /// other failure is wrapped and located at `location`.
    pub fn attribute(error: anyhow::Error, location: &str) -> Self {
        match error.downcast::<ConfigurationError>() {
            Ok(inner) => inner.at(location),
            Err(other) => Self::new(other).at(location),
        }
    }
}

fn location_label(location: &Option<String>) -> &str {
    location.as_deref().unwrap_or("<unknown>")
}
