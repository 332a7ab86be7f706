//! Caller identity
//!
//! Authentication happens outside this crate. The transport layer resolves a
//! request to a trusted [`Caller`] and hands it to registry operations that
//! need authorization.

/// Kind of account behind a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountType {
    /// Mosque account that owns and broadcasts sessions
    Broadcaster,
    /// Registered listener
    Listener,
    /// Operator account; carries no extra privileges in this crate, and
    /// session ownership checks compare ids only
    Admin,
}

/// A resolved, trusted caller
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Caller {
    /// Account id
    pub id: String,
    /// Account type
    pub account_type: AccountType,
}

impl Caller {
    /// Create a caller
    pub fn new(id: impl Into<String>, account_type: AccountType) -> Self {
        Self {
            id: id.into(),
            account_type,
        }
    }

    /// Shorthand for a broadcaster account
    pub fn broadcaster(id: impl Into<String>) -> Self {
        Self::new(id, AccountType::Broadcaster)
    }

    /// Shorthand for a listener account
    pub fn listener(id: impl Into<String>) -> Self {
        Self::new(id, AccountType::Listener)
    }

    /// Whether this caller is the given account
    pub fn is(&self, account_id: &str) -> bool {
        self.id == account_id
    }
}
