use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque, process-unique transaction token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Mints a fresh transaction id.
    pub fn new() -> Self {
        Self(NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wraps a raw id. Ids built this way are not guaranteed to be unique.
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Txn({})", self.0)
    }
}

/// Permission a transaction requests on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permissions {
    /// Shared access
    ReadOnly,
    /// Exclusive access
    ReadWrite,
}

impl Permissions {
    /// Returns true if holding `self` already grants everything `other` asks for.
    pub fn covers(self, other: Permissions) -> bool {
        self == Permissions::ReadWrite || self == other
    }

    /// Two requests from different transactions can be held together only
    /// if both are shared.
    pub fn is_compatible_with(self, other: Permissions) -> bool {
        self == Permissions::ReadOnly && other == Permissions::ReadOnly
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permissions::ReadOnly => write!(f, "READ_ONLY"),
            Permissions::ReadWrite => write!(f, "READ_WRITE"),
        }
    }
}
