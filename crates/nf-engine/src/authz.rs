//! Authorization resolution
//!
//! One decision function over a tagged ownership descriptor replaces the
//! per-service "is owner or has team role" conditionals. The resolver reads
//! membership and never writes, so it is shared freely by the binder, the
//! catalogs and the dispatcher.

use nf_common::{NotifryError, Ownership, Result};
use nf_store::MembershipStore;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

pub struct AuthorizationResolver {
    memberships: Arc<dyn MembershipStore>,
}

impl AuthorizationResolver {
    pub fn new(memberships: Arc<dyn MembershipStore>) -> Self {
        Self { memberships }
    }

    /// Decide whether `actor_user_id` may act on a resource with the given
    /// ownership. Personal resources admit exactly their owner; team-scoped
    /// resources admit members whose role appears in the descriptor. A
    /// missing membership and an insufficient role produce the same `Deny`,
    /// so callers cannot distinguish "not found" from "not allowed".
    pub async fn resolve(&self, actor_user_id: i64, ownership: &Ownership) -> Result<Decision> {
        match ownership {
            Ownership::Personal { user_id } => Ok(if actor_user_id == *user_id {
                Decision::Allow
            } else {
                Decision::Deny
            }),
            Ownership::TeamScoped {
                team_id,
                required_roles,
            } => {
                let membership = self.memberships.find(*team_id, actor_user_id).await?;
                Ok(match membership {
                    Some(m) if required_roles.contains(&m.role) => Decision::Allow,
                    _ => Decision::Deny,
                })
            }
        }
    }

    /// Resolve and map a denial to an opaque `Denied` error carrying the
    /// caller's message
    pub async fn require(
        &self,
        actor_user_id: i64,
        ownership: &Ownership,
        denial_message: &str,
    ) -> Result<()> {
        match self.resolve(actor_user_id, ownership).await? {
            Decision::Allow => Ok(()),
            Decision::Deny => Err(NotifryError::denied(denial_message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nf_common::{TeamRole, MANAGE_ROLES, MEMBER_ROLES};
    use nf_store::{MemoryStore, TeamMembership};

    async fn store_with_membership(team_id: i64, user_id: i64, role: TeamRole) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .insert(TeamMembership::new(team_id, user_id, role))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_personal_resource_admits_only_owner() {
        let resolver = AuthorizationResolver::new(Arc::new(MemoryStore::new()));
        let ownership = Ownership::personal(9);

        assert!(resolver.resolve(9, &ownership).await.unwrap().is_allowed());
        assert!(!resolver.resolve(10, &ownership).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn test_team_resource_gates_on_role() {
        let store = store_with_membership(1, 5, TeamRole::Member).await;
        let resolver = AuthorizationResolver::new(store);

        let manage = Ownership::team_scoped(1, MANAGE_ROLES);
        let member = Ownership::team_scoped(1, MEMBER_ROLES);

        assert!(!resolver.resolve(5, &manage).await.unwrap().is_allowed());
        assert!(resolver.resolve(5, &member).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn test_absent_membership_and_wrong_role_are_indistinguishable() {
        let store = store_with_membership(1, 5, TeamRole::Member).await;
        let resolver = AuthorizationResolver::new(store);
        let manage = Ownership::team_scoped(1, MANAGE_ROLES);

        let wrong_role = resolver.resolve(5, &manage).await.unwrap();
        let no_membership = resolver.resolve(77, &manage).await.unwrap();
        assert_eq!(wrong_role, no_membership);
        assert_eq!(wrong_role, Decision::Deny);
    }

    #[tokio::test]
    async fn test_admin_and_owner_can_manage() {
        for role in [TeamRole::Owner, TeamRole::Admin] {
            let store = store_with_membership(1, 5, role).await;
            let resolver = AuthorizationResolver::new(store);
            let manage = Ownership::team_scoped(1, MANAGE_ROLES);
            assert!(resolver.resolve(5, &manage).await.unwrap().is_allowed());
        }
    }

    #[tokio::test]
    async fn test_require_maps_denial_to_opaque_error() {
        let resolver = AuthorizationResolver::new(Arc::new(MemoryStore::new()));
        let err = resolver
            .require(2, &Ownership::personal(9), "you don't have permission")
            .await
            .unwrap_err();
        assert!(matches!(err, NotifryError::Denied { .. }));
    }
}
