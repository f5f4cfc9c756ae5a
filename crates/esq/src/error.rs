//! 💀 The error taxonomy: four ways for a query to disappoint you, plus serde.
//!
//! Not-found is deliberately absent from this list. A 404 is an answer, not a failure:
//! it travels as [`crate::connection::Reply::NotFound`], `Option::None`, or `false`.

/// 💀 Everything the library can hand back instead of a result.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// 🔧 Nodes, protocols or credentials are missing or contradict each other.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 📡 The cluster answered, but not with anything we can use.
    #[error("Transport error: {message}")]
    Transport {
        status: Option<u16>,
        message: String,
        body: Option<String>,
    },

    /// 🔌 The request never got an answer at all. Refused, unresolved, timed out.
    #[error("Elasticsearch request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// 🎯 The engine said (or implied) that the query itself failed.
    #[error("Query execution error: {0}")]
    QueryExecution(String),

    /// 🚫 The condition cannot be expressed in the query DSL.
    #[error("Unsupported condition: {0}")]
    UnsupportedCondition(String),

    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedCondition(message.into())
    }

    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            message: message.into(),
            body: None,
        }
    }

    /// 📡 True for both flavours of transport failure: bad replies and dead sockets.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Network(_))
    }

    /// The HTTP status that came back, if the failure got that far.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            Self::Network(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
