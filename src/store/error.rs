use rusqlite::ErrorCode;

#[derive(Debug)]
pub enum StoreError {
    /// Store not initialized, or an incompatible schema is present
    Schema(String),
    UnknownProduct(i64),
    InvalidQuantity(i64),
    /// Outgoing movement would drive stock below zero; nothing was recorded
    InsufficientStock {
        product_id: i64,
        requested: i64,
        available: i64,
    },
    /// Underlying database failure (I/O, busy, locked, corrupt)
    Unavailable(rusqlite::Error),
    Io(std::io::Error),
    LockPoisoned(String),
}

impl StoreError {
    /// Whether retrying on a later cycle may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::CannotOpen
            ),
            StoreError::Unavailable(_) | StoreError::Io(_) => true,
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Unavailable(err)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Schema(msg) => write!(f, "Schema error: {}", msg),
            StoreError::UnknownProduct(id) => write!(f, "Unknown product: {}", id),
            StoreError::InvalidQuantity(q) => write!(f, "Invalid quantity: {} (must be > 0)", q),
            StoreError::InsufficientStock {
                product_id,
                requested,
                available,
            } => write!(
                f,
                "Insufficient stock for product {}: requested {}, available {}",
                product_id, requested, available
            ),
            StoreError::Unavailable(e) => write!(f, "Store unavailable: {}", e),
            StoreError::Io(e) => write!(f, "Store unavailable (IO): {}", e),
            StoreError::LockPoisoned(msg) => write!(f, "Store lock poisoned: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Unavailable(e) => Some(e),
            StoreError::Io(e) => Some(e),
            _ => None,
        }
    }
}
