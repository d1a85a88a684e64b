use thiserror::Error;

/// Warehouse-side failures. The pager surfaces these as-is; retrying is
/// the caller's policy, never the adapter's.
#[derive(Error, Debug)]
pub enum WarehouseError {
    #[error("Failed to connect to warehouse: {0}")]
    Connect(String),

    #[error("Warehouse query timed out after {timeout_ms}ms")]
    QueryTimeout { timeout_ms: u64 },

    #[error("Warehouse query failed: {0}")]
    Query(String),

    #[error("Failed to decode column '{column}' of type {ty}")]
    Decode { column: String, ty: String },
}

/// Target-store failures, carrying enough detail to classify them as
/// transient or fatal.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to connect to store: {0}")]
    Connect(String),

    #[error("Store rejected statement (code {code}): {message}")]
    Server { code: u16, message: String },

    #[error("Store connection lost: {0}")]
    Connection(String),

    #[error("Store I/O error: {0}")]
    Io(String),

    #[error("Unexpected store error: {0}")]
    Other(String),
}

/// Whether a store error is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Fatal,
}

// MySQL concurrency errors the batch writer retries on.
const ER_LOCK_WAIT_TIMEOUT: u16 = 1205;
const ER_LOCK_DEADLOCK: u16 = 1213;

/// Classifies a store error for the batch writer's retry loop:
/// deadlocks, lock-wait timeouts and connection loss are transient;
/// everything else fails its batch.
pub fn classify_store_error(err: &StoreError) -> ErrorClass {
    match err {
        StoreError::Server { code, .. }
            if *code == ER_LOCK_DEADLOCK || *code == ER_LOCK_WAIT_TIMEOUT =>
        {
            ErrorClass::Transient
        }
        StoreError::Connection(_) | StoreError::Io(_) => ErrorClass::Transient,
        _ => ErrorClass::Fatal,
    }
}

impl From<mysql_async::Error> for StoreError {
    fn from(err: mysql_async::Error) -> Self {
        match err {
            mysql_async::Error::Server(server) => StoreError::Server {
                code: server.code,
                message: server.message,
            },
            mysql_async::Error::Io(io) => StoreError::Io(io.to_string()),
            mysql_async::Error::Driver(driver) => StoreError::Connection(driver.to_string()),
            other => StoreError::Other(other.to_string()),
        }
    }
}
