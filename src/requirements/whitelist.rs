//! Restricting provide and unprovide to a subset of requirements.

use std::sync::Arc;

use super::requirement::{Requirement, RequirementClass};

/// One match criterion in a whitelist.
#[derive(Debug, Clone)]
pub enum WhitelistEntry {
    /// Requirements governing this variable.
    ByName(String),
    /// Requirements of this class or a subclass.
    ByVariant(RequirementClass),
    /// This exact requirement instance.
    ByIdentity(Arc<Requirement>),
}

impl WhitelistEntry {
    /// Check whether `requirement` matches this entry.
    pub fn matches(&self, requirement: &Arc<Requirement>) -> bool {
        match self {
            Self::ByName(name) => requirement.env_var == *name,
            Self::ByVariant(class) => requirement.is_a(*class),
            Self::ByIdentity(other) => Arc::ptr_eq(other, requirement),
        }
    }
}

impl From<&str> for WhitelistEntry {
    fn from(name: &str) -> Self {
        Self::ByName(name.to_string())
    }
}

impl From<RequirementClass> for WhitelistEntry {
    fn from(class: RequirementClass) -> Self {
        Self::ByVariant(class)
    }
}

impl From<Arc<Requirement>> for WhitelistEntry {
    fn from(requirement: Arc<Requirement>) -> Self {
        Self::ByIdentity(requirement)
    }
}

/// Check whether `requirement` passes `whitelist`. `None` lets everything through.
pub fn in_whitelist(requirement: &Arc<Requirement>, whitelist: Option<&[WhitelistEntry]>) -> bool {
    whitelist.is_none_or(|entries| entries.iter().any(|entry| entry.matches(requirement)))
}
