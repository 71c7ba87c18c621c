use crate::engine::net::RequestId;

/// Errors produced by the network layer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NetError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Cross-origin request to '{url}' refused")]
    CrossOrigin { url: String },

    #[error("Cannot encode request body: {0}")]
    Encode(String),

    #[error("Invalid header '{name}'")]
    InvalidHeader { name: String },
}

/// Errors produced while resolving the widget configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Malformed configuration override: {0}")]
    Malformed(String),

    #[error("Configuration value '{field}' must not be empty")]
    EmptyValue { field: &'static str },

    #[error("Endpoint '{field}' is not a valid path or URL: {value}")]
    InvalidEndpoint { field: &'static str, value: String },

    #[error("Duration '{field}' must be greater than zero")]
    ZeroDuration { field: &'static str },
}

/// Umbrella error for the consent widget. None of these ever escape a public
/// entry point; they are turned into diagnostics instead.
#[derive(Debug, thiserror::Error)]
pub enum WidgetError {
    #[error("Network error: {0}")]
    Network(#[from] NetError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cannot serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Node is no longer part of the document")]
    StaleNode,

    #[error("Node cannot be inserted there")]
    InvalidHierarchy,

    #[error("Unknown request {0}")]
    UnknownRequest(RequestId),

    #[error("Widget worker has stopped")]
    WorkerGone,
}
