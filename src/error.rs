use thiserror::Error;

/// Error taxonomy for the query gateway.
///
/// Every failure is returned to the immediate caller as a value; nothing in
/// the core logs-and-swallows. `Compilation` and `UnsupportedDatastore` are
/// request-fatal but never process-fatal.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The AST could not be compiled for the target dialect
    /// (e.g. OFFSET without LIMIT in SQL). No partial result exists.
    #[error("compilation: {reason}")]
    Compilation { reason: String },

    /// The connection descriptor named a backend type with no registered
    /// adapter factory.
    #[error("unsupported datastore: {datastore}")]
    UnsupportedDatastore { datastore: String },

    /// The backend driver reported a failure while executing a compiled
    /// query. Surfaced as-is; the core performs no retries.
    #[error("execution: {message}")]
    Execution { message: String },

    /// The backend client could not be constructed or a connection could
    /// not be acquired from the pool.
    #[error("connection: {message}")]
    Connection { message: String },

    #[error("timeout: query did not complete within {seconds}s")]
    Timeout { seconds: u64 },

    #[error("config: {message}")]
    Config { message: String },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    pub fn compilation(reason: impl Into<String>) -> Self {
        GatewayError::Compilation {
            reason: reason.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        GatewayError::Execution {
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        GatewayError::Connection {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        GatewayError::Config {
            message: message.into(),
        }
    }
}
