// Error types and error handling module
// This file defines the error taxonomy shared by the store client,
// the query engine and the reconciliation driver
//
// Numan Thabit 2025 Nov

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("store rejected credentials: {0}")]
    Auth(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("no index found for index prefix: {prefix}")]
    IndexNotFound { prefix: String },
    #[error("credential error: {0}")]
    Credential(String),
    #[error("metrics registry error: {0}")]
    Registry(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<ExporterError>,
    },
}

impl ExporterError {
    /// Wrap the error with a human readable context, keeping the original as source.
    pub fn context(self, context: impl Into<String>) -> Self {
        ExporterError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping context layers.
    pub fn root(&self) -> &ExporterError {
        match self {
            ExporterError::Context { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_index_not_found(&self) -> bool {
        matches!(self.root(), ExporterError::IndexNotFound { .. })
    }

    /// Short stable tag used as a metric label.
    pub fn kind(&self) -> &'static str {
        match self.root() {
            ExporterError::Transport(_) => "transport",
            ExporterError::Auth(_) => "auth",
            ExporterError::Store(_) => "store",
            ExporterError::Decode(_) => "decode",
            ExporterError::IndexNotFound { .. } => "index_not_found",
            ExporterError::Credential(_) => "credential",
            ExporterError::Registry(_) => "registry",
            ExporterError::Config(_) => "config",
            ExporterError::Context { .. } => "context",
        }
    }
}

impl From<prometheus::Error> for ExporterError {
    fn from(err: prometheus::Error) -> Self {
        ExporterError::Registry(err.to_string())
    }
}
