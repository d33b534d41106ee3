//! Organizations and the family scope used by uniqueness checks.

pub mod router;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::OrganizationId;
use crate::storage::RepositoryError;

/// Tenant record. A child organization points at its parent; hierarchies are one level deep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    pub parent_id: Option<OrganizationId>,
    pub settings: OrganizationSettings,
    pub created_at: DateTime<Utc>,
}

/// Per-tenant screening knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationSettings {
    #[serde(default = "default_client_validation")]
    pub client_validation_enabled: bool,
    #[serde(default)]
    pub token_ttl_hours: Option<u32>,
}

fn default_client_validation() -> bool {
    true
}

impl Default for OrganizationSettings {
    fn default() -> Self {
        Self {
            client_validation_enabled: true,
            token_ttl_hours: None,
        }
    }
}

/// Set of organizations a uniqueness rule applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrganizationScope {
    Single(OrganizationId),
    Family {
        root: OrganizationId,
        members: BTreeSet<OrganizationId>,
    },
}

impl OrganizationScope {
    pub fn single(id: OrganizationId) -> Self {
        OrganizationScope::Single(id)
    }

    /// Builds a family scope; the root is always a member.
    pub fn family(root: OrganizationId, members: impl IntoIterator<Item = OrganizationId>) -> Self {
        let mut members: BTreeSet<_> = members.into_iter().collect();
        members.insert(root);
        OrganizationScope::Family { root, members }
    }

    pub fn contains(&self, id: &OrganizationId) -> bool {
        match self {
            OrganizationScope::Single(single) => single == id,
            OrganizationScope::Family { members, .. } => members.contains(id),
        }
    }

    pub fn is_family(&self) -> bool {
        matches!(self, OrganizationScope::Family { .. })
    }
}

/// Lookup of tenants; implemented by storage adapters.
pub trait OrganizationDirectory: Send + Sync {
    fn insert(&self, organization: Organization) -> Result<Organization, RepositoryError>;
    fn fetch(&self, id: &OrganizationId) -> Result<Option<Organization>, RepositoryError>;
    fn children_of(&self, id: &OrganizationId) -> Result<Vec<Organization>, RepositoryError>;
}

/// Resolves the scope of `organization`: its whole family (root plus children) when it is part
/// of a hierarchy, otherwise only itself.
pub fn family_scope<D>(
    directory: &D,
    organization: &Organization,
) -> Result<OrganizationScope, RepositoryError>
where
    D: OrganizationDirectory + ?Sized,
{
    let root = organization.parent_id.unwrap_or(organization.id);
    let children = directory.children_of(&root)?;

    if organization.parent_id.is_none() && children.is_empty() {
        return Ok(OrganizationScope::single(organization.id));
    }

    Ok(OrganizationScope::family(
        root,
        children.into_iter().map(|child| child.id),
    ))
}
