//! # Identifier Newtypes
//!
//! Every aggregate in the ledger is keyed by its own UUID newtype. The
//! `Display` form carries a namespace prefix (`task:…`, `bid:…`) so log
//! lines are unambiguous; `FromStr` accepts the bare UUID.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Access the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|_| ValidationError::InvalidId {
                        kind: $prefix,
                        value: s.to_string(),
                    })
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
    /// Identifier of a task (assignment), the root aggregate.
    TaskId,
    "task"
);
uuid_id!(
    /// Identifier of a bid placed on a task.
    BidId,
    "bid"
);
uuid_id!(
    /// Identifier of the escrow payment attached to a task.
    PaymentId,
    "payment"
);
uuid_id!(
    /// Identifier of a dispute raised on a task.
    DisputeId,
    "dispute"
);
uuid_id!(
    /// Identifier of a follow-up entry appended to a dispute.
    FollowUpId,
    "follow-up"
);
uuid_id!(
    /// Identifier of a work submission.
    SubmissionId,
    "submission"
);
uuid_id!(
    /// Identifier of a marketplace user, as issued by the identity provider.
    UserId,
    "user"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_namespace() {
        let id = TaskId::new();
        assert!(id.to_string().starts_with("task:"));
        assert!(BidId::new().to_string().starts_with("bid:"));
    }

    #[test]
    fn parse_accepts_bare_uuid() {
        let raw = Uuid::new_v4();
        let parsed: DisputeId = raw.to_string().parse().unwrap();
        assert_eq!(parsed.as_uuid(), &raw);
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = "not-a-uuid".parse::<UserId>().unwrap_err();
        assert!(err.to_string().contains("user"));
    }

    #[test]
    fn serializes_as_plain_uuid() {
        let id = PaymentId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.0));
    }
}
