//! Identifier newtypes
//!
//! Users, merchants and products are keyed by UUIDs. The invoice is an
//! opaque string: it is the correlation key the payment gateway echoes back
//! and the room identifier for arbitration chat, so it is generated once at
//! transaction creation and never changes.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id!(
    /// A platform user (buyer, merchant owner, or arbiter)
    UserId
);
uuid_id!(
    /// A merchant account (owned by exactly one user)
    MerchantId
);
uuid_id!(
    /// A catalog product
    ProductId
);

/// The transaction's immutable external reference.
///
/// Format: `INV-<unix millis>-<4 random bytes, hex, uppercase>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Invoice(pub String);

impl Invoice {
    /// Generate a fresh globally-unique invoice reference.
    pub fn generate() -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        let nonce: [u8; 4] = rand::random();
        Self(format!(
            "INV-{}-{}",
            millis,
            hex::encode_upper(nonce)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Invoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Invoice {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Invoice {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoice_format() {
        let invoice = Invoice::generate();
        assert!(invoice.as_str().starts_with("INV-"));
        let parts: Vec<&str> = invoice.as_str().splitn(3, '-').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 8);
        assert_eq!(parts[2], parts[2].to_uppercase());
    }

    #[test]
    fn invoices_are_unique() {
        let a = Invoice::generate();
        let b = Invoice::generate();
        assert_ne!(a, b);
    }
}
