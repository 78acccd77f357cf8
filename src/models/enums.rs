use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }

            pub fn all() -> &'static [$name] {
                &[$(Self::$variant),+]
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(EntityType {
    Request => "request",
    Purchase => "purchase",
    Contract => "contract",
    PlanItem => "plan_item",
    Approval => "approval",
});

impl EntityType {
    /// Physical table holding this entity type.
    pub fn table_name(&self) -> &'static str {
        match self {
            Self::Request => "requests",
            Self::Purchase => "purchases",
            Self::Contract => "contracts",
            Self::PlanItem => "plan_items",
            Self::Approval => "approvals",
        }
    }

    /// Workflow statuses this entity type may carry.
    pub fn statuses(&self) -> &'static [Status] {
        use Status::*;
        match self {
            Self::Request => &[Draft, OnApproval, Approved, Rejected, InPurchase, Cancelled],
            Self::Purchase => &[Draft, Planned, InProgress, Completed, Failed, Cancelled],
            Self::Contract => &[Draft, OnApproval, Rejected, OnRegistration, Signed, Cancelled],
            Self::PlanItem => &[Draft, OnApproval, Included, Completed, Excluded],
            Self::Approval => &[Pending, Approved, Rejected, Rework, Cancelled],
        }
    }

    pub fn allows_status(&self, status: Status) -> bool {
        self.statuses().contains(&status)
    }
}

str_enum!(ChangeSource {
    Ingestion => "INGESTION",
    User => "USER",
});

// How a stored reference found its target.
str_enum!(LinkMatch {
    Guid => "GUID",
    BusinessKey => "BUSINESS_KEY",
    NumericKey => "NUMERIC_KEY",
});

impl LinkMatch {
    /// Numeric-key matches are provisional: an exact key may still turn up.
    pub fn is_exact(&self) -> bool {
        !matches!(self, Self::NumericKey)
    }
}

str_enum!(Status {
    Draft => "DRAFT",
    OnApproval => "ON_APPROVAL",
    Approved => "APPROVED",
    Rejected => "REJECTED",
    InPurchase => "IN_PURCHASE",
    Planned => "PLANNED",
    InProgress => "IN_PROGRESS",
    Completed => "COMPLETED",
    Failed => "FAILED",
    OnRegistration => "ON_REGISTRATION",
    Signed => "SIGNED",
    Included => "INCLUDED",
    Excluded => "EXCLUDED",
    Pending => "PENDING",
    Rework => "REWORK",
    Cancelled => "CANCELLED",
});

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn entity_type_round_trip() {
        for variant in EntityType::all() {
            assert_eq!(EntityType::from_str(variant.as_str()).unwrap(), *variant);
        }
    }

    #[test]
    fn status_round_trip() {
        for variant in Status::all() {
            assert_eq!(Status::from_str(variant.as_str()).unwrap(), *variant);
        }
    }

    #[test]
    fn only_numeric_link_matches_are_provisional() {
        assert!(LinkMatch::Guid.is_exact());
        assert!(LinkMatch::BusinessKey.is_exact());
        assert!(!LinkMatch::NumericKey.is_exact());
        assert_eq!(LinkMatch::from_str("NUMERIC_KEY").unwrap(), LinkMatch::NumericKey);
    }

    #[test]
    fn every_status_is_used_by_some_entity_type() {
        for status in Status::all() {
            assert!(
                EntityType::all().iter().any(|t| t.allows_status(*status)),
                "{status} is not reachable"
            );
        }
    }

    #[test]
    fn table_names_are_distinct() {
        let mut names: Vec<_> = EntityType::all().iter().map(|t| t.table_name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), EntityType::all().len());
    }

    #[test]
    fn invalid_enum_returns_error() {
        assert!(EntityType::from_str("invoice").is_err());
        assert!(Status::from_str("signed").is_err());
        assert!(ChangeSource::from_str("").is_err());
    }
}
