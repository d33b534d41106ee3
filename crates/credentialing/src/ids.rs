//! Strongly typed identifiers shared across the workflows.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
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
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Tenant identifier; organizations may form a parent/children family.
    OrganizationId
);
uuid_id!(ProfessionalId);
uuid_id!(QualificationId);
uuid_id!(SpecialtyRowId);
uuid_id!(EducationId);
uuid_id!(CompanyId);
uuid_id!(CompanyLinkId);
uuid_id!(BankAccountId);
uuid_id!(
    /// Identifier of an entry in the global specialty catalog.
    SpecialtyId
);
uuid_id!(ScreeningProcessId);
uuid_id!(DocumentId);
uuid_id!(VersionId);
uuid_id!(DiffId);

/// Opaque reference to an authenticated user (staff member or professional).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_display() {
        let id = ProfessionalId::new();
        let parsed: ProfessionalId = id.to_string().parse().expect("uuid parses");
        assert_eq!(id, parsed);
    }

    #[test]
    fn ids_serialize_as_bare_uuid_strings() {
        let id = ScreeningProcessId::new();
        let value = serde_json::to_value(id).expect("serializes");
        assert_eq!(value, serde_json::Value::String(id.0.to_string()));
    }
}
