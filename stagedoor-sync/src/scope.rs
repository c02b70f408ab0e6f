//! Synchronization scopes
//!
//! A scope is an independent synchronization domain with its own event
//! stream and its own monotonic `serverSeq` counter. Clients name scopes
//! with lowercase strings; the store keeps an uppercase tag. The two
//! representations are closed enums linked by total conversions, so adding
//! a scope forces every mapping to be updated at compile time.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// Public scope, as used on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Inventory,
    Tickets,
}

impl Scope {
    pub const ALL: [Scope; 2] = [Scope::Inventory, Scope::Tickets];

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Inventory => "inventory",
            Scope::Tickets => "tickets",
        }
    }

    /// Tag stored in the `scope` columns
    pub fn db_tag(self) -> &'static str {
        StoredScope::from(self).as_db_str()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inventory" => Ok(Scope::Inventory),
            "tickets" => Ok(Scope::Tickets),
            _ => Err(SyncError::InvalidOperation(format!("Unknown sync scope: {s}"))),
        }
    }
}

/// Storage-layer scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoredScope {
    Inventory,
    Tickets,
}

impl StoredScope {
    pub fn as_db_str(self) -> &'static str {
        match self {
            StoredScope::Inventory => "INVENTORY",
            StoredScope::Tickets => "TICKETS",
        }
    }

    /// Parse a tag read back from the database
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Internal`] for a tag no scope maps to.
    pub fn from_db_str(s: &str) -> SyncResult<Self> {
        match s {
            "INVENTORY" => Ok(StoredScope::Inventory),
            "TICKETS" => Ok(StoredScope::Tickets),
            _ => Err(SyncError::Internal(format!("Unknown stored scope: {s}"))),
        }
    }
}

impl From<Scope> for StoredScope {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::Inventory => StoredScope::Inventory,
            Scope::Tickets => StoredScope::Tickets,
        }
    }
}

impl From<StoredScope> for Scope {
    fn from(scope: StoredScope) -> Self {
        match scope {
            StoredScope::Inventory => Scope::Inventory,
            StoredScope::Tickets => Scope::Tickets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_mapping_is_bijective() {
        for scope in Scope::ALL {
            let stored = StoredScope::from(scope);
            assert_eq!(Scope::from(stored), scope);
            assert_eq!(StoredScope::from_db_str(stored.as_db_str()).unwrap(), stored);
        }
    }

    #[test]
    fn test_scope_parsing() {
        assert_eq!("inventory".parse::<Scope>().unwrap(), Scope::Inventory);
        assert_eq!("tickets".parse::<Scope>().unwrap(), Scope::Tickets);
        assert!("INVENTORY".parse::<Scope>().is_err());
        assert!("meals".parse::<Scope>().is_err());
    }

    #[test]
    fn test_scope_serialization() {
        assert_eq!(serde_json::to_string(&Scope::Tickets).unwrap(), r#""tickets""#);
        assert_eq!(Scope::Inventory.db_tag(), "INVENTORY");
    }

    #[test]
    fn test_unknown_stored_scope() {
        assert!(StoredScope::from_db_str("MEALS").is_err());
    }
}
