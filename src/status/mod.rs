//! Workflow status: ordered trace rules, the classifier that applies them
//! and the accepted spellings of every status.

pub mod aliases;
pub mod classifier;
pub mod rules;

pub use aliases::{resolve_entity_type, resolve_status, status_label, AliasError};
pub use classifier::{classify, classify_entity, classify_trace, reclassify_all};
pub use rules::{rules_for, validate_rules, ClassificationRule, RuleError, TracePredicate};
