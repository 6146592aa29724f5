// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Identifier value objects.
//!
//! Every aggregate gets its own UUID newtype so a `DocumentId` can never be
//! handed to an operation expecting a `NodeId`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::GovernanceError;

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }

            /// Parse an externally supplied identifier.
            pub fn parse(raw: &str) -> Result<Self, GovernanceError> {
                Uuid::parse_str(raw.trim()).map(Self).map_err(|_| {
                    GovernanceError::Validation(format!("malformed {} identifier '{}'", $label, raw))
                })
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

uuid_identifier!(
    /// Folder or category node in the hierarchy
    NodeId, "node"
);
uuid_identifier!(DocumentId, "document");
uuid_identifier!(VersionId, "version");
uuid_identifier!(CheckoutId, "checkout");
uuid_identifier!(AclEntryId, "acl entry");
uuid_identifier!(
    /// Person as known to the identity provider
    PersonId, "person"
);
uuid_identifier!(RoleId, "role");
uuid_identifier!(WorkflowDefinitionId, "workflow definition");
uuid_identifier!(WorkflowInstanceId, "workflow instance");
uuid_identifier!(TaskId, "task");
uuid_identifier!(RetentionPolicyId, "retention policy");
uuid_identifier!(
    /// A policy applied to one document
    RetentionId, "retention record"
);
uuid_identifier!(LegalHoldId, "legal hold");
uuid_identifier!(AuditEntryId, "audit entry");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_malformed_identifier() {
        let err = DocumentId::parse("not-a-uuid").unwrap_err();
        assert!(matches!(err, GovernanceError::Validation(msg) if msg.contains("document")));
    }

    #[test]
    fn test_parse_round_trips_display() {
        let id = NodeId::new();
        assert_eq!(NodeId::parse(&id.to_string()).unwrap(), id);
    }
}
