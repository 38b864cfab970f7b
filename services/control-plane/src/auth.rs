//! Authorization gate: principals, global permissions, and per-queue verbs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Queue, QueueVerb};

/// The implicit group every principal belongs to.
pub const EVERYONE_GROUP: &str = "everyone";

/// The authenticated actor behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub name: String,
    pub groups: Vec<String>,
}

impl Principal {
    /// A named principal; membership in [`EVERYONE_GROUP`] is implied.
    pub fn new(name: impl Into<String>, mut groups: Vec<String>) -> Self {
        if !groups.iter().any(|g| g == EVERYONE_GROUP) {
            groups.push(EVERYONE_GROUP.to_string());
        }
        Self {
            name: name.into(),
            groups,
        }
    }

    /// The principal used when no credentials are presented.
    pub fn anonymous() -> Self {
        Self::new("anonymous", Vec::new())
    }

    pub fn is_member_of(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }
}

/// Singleton permissions checked against the global permission table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Permission {
    CreateQueue,
    DeleteQueue,
    SubmitAnyJobs,
    CancelAnyJobs,
    ReprioritizeAnyJobs,
    WatchAllEvents,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::CreateQueue => "create_queue",
            Permission::DeleteQueue => "delete_queue",
            Permission::SubmitAnyJobs => "submit_any_jobs",
            Permission::CancelAnyJobs => "cancel_any_jobs",
            Permission::ReprioritizeAnyJobs => "reprioritize_any_jobs",
            Permission::WatchAllEvents => "watch_all_events",
        }
    }

    pub const ALL: [Permission; 6] = [
        Permission::CreateQueue,
        Permission::DeleteQueue,
        Permission::SubmitAnyJobs,
        Permission::CancelAnyJobs,
        Permission::ReprioritizeAnyJobs,
        Permission::WatchAllEvents,
    ];
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Authorization failures.
///
/// `Unauthorized` translates to permission-denied at the façade; `Lookup`
/// covers transport or table-lookup failures and translates to unavailable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("user {principal} is not allowed to perform {action}")]
    Unauthorized { principal: String, action: String },

    #[error("permission lookup failed: {0}")]
    Lookup(String),
}

impl AuthError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, AuthError::Unauthorized { .. })
    }
}

/// The two permission checks every operation funnels through.
#[async_trait]
pub trait ActionAuthorizer: Send + Sync {
    /// Checks a singleton global permission.
    async fn authorize_action(
        &self,
        principal: &Principal,
        permission: Permission,
    ) -> Result<(), AuthError>;

    /// Grants access if the principal holds the global permission OR the
    /// queue's permission table grants the verb to the principal or one of
    /// its groups.
    async fn authorize_queue_action(
        &self,
        principal: &Principal,
        queue: &Queue,
        permission: Permission,
        verb: QueueVerb,
    ) -> Result<(), AuthError>;
}

/// Reference authorizer backed by a static permission-to-groups table.
pub struct PrincipalAuthorizer {
    permission_groups: BTreeMap<Permission, Vec<String>>,
}

impl PrincipalAuthorizer {
    pub fn new(permission_groups: BTreeMap<Permission, Vec<String>>) -> Self {
        Self { permission_groups }
    }

    /// Grants every global permission to the listed groups.
    pub fn for_admin_groups(groups: Vec<String>) -> Self {
        let permission_groups = Permission::ALL
            .into_iter()
            .map(|p| (p, groups.clone()))
            .collect();
        Self::new(permission_groups)
    }

    /// Grants every global permission to everyone. Development only.
    pub fn allow_everyone() -> Self {
        Self::for_admin_groups(vec![EVERYONE_GROUP.to_string()])
    }

    fn holds(&self, principal: &Principal, permission: Permission) -> bool {
        self.permission_groups
            .get(&permission)
            .is_some_and(|groups| groups.iter().any(|g| principal.is_member_of(g)))
    }
}

#[async_trait]
impl ActionAuthorizer for PrincipalAuthorizer {
    async fn authorize_action(
        &self,
        principal: &Principal,
        permission: Permission,
    ) -> Result<(), AuthError> {
        if self.holds(principal, permission) {
            Ok(())
        } else {
            Err(AuthError::Unauthorized {
                principal: principal.name.clone(),
                action: permission.to_string(),
            })
        }
    }

    async fn authorize_queue_action(
        &self,
        principal: &Principal,
        queue: &Queue,
        permission: Permission,
        verb: QueueVerb,
    ) -> Result<(), AuthError> {
        if self.holds(principal, permission) {
            return Ok(());
        }
        if queue.verb_granted_to(verb, &principal.name, &principal.groups) {
            return Ok(());
        }
        Err(AuthError::Unauthorized {
            principal: principal.name.clone(),
            action: format!("{} on queue {}", verb, queue.name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QueueGrant;

    fn queue_with_grant(user: &str, verb: QueueVerb) -> Queue {
        Queue {
            name: "q1".to_string(),
            priority_factor: 1.0,
            permissions: vec![QueueGrant {
                subjects: crate::model::GrantSubjects {
                    users: vec![user.to_string()],
                    groups: Vec::new(),
                },
                verbs: vec![verb],
            }],
            resource_limits: None,
        }
    }

    #[test]
    fn test_principal_always_in_everyone() {
        let p = Principal::new("alice", vec!["team-a".to_string()]);
        assert!(p.is_member_of(EVERYONE_GROUP));
        assert!(p.is_member_of("team-a"));
    }

    #[tokio::test]
    async fn test_global_permission_table() {
        let authorizer = PrincipalAuthorizer::for_admin_groups(vec!["admins".to_string()]);
        let admin = Principal::new("root", vec!["admins".to_string()]);
        let user = Principal::new("alice", Vec::new());

        assert!(authorizer
            .authorize_action(&admin, Permission::CreateQueue)
            .await
            .is_ok());
        let err = authorizer
            .authorize_action(&user, Permission::CreateQueue)
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn test_queue_grant_satisfies_verb_check() {
        let authorizer = PrincipalAuthorizer::for_admin_groups(vec!["admins".to_string()]);
        let alice = Principal::new("alice", Vec::new());
        let queue = queue_with_grant("alice", QueueVerb::Submit);

        assert!(authorizer
            .authorize_queue_action(&alice, &queue, Permission::SubmitAnyJobs, QueueVerb::Submit)
            .await
            .is_ok());
        assert!(authorizer
            .authorize_queue_action(&alice, &queue, Permission::CancelAnyJobs, QueueVerb::Cancel)
            .await
            .unwrap_err()
            .is_unauthorized());
    }

    #[tokio::test]
    async fn test_global_permission_overrides_queue_grants() {
        let authorizer = PrincipalAuthorizer::for_admin_groups(vec!["admins".to_string()]);
        let admin = Principal::new("root", vec!["admins".to_string()]);
        let queue = queue_with_grant("alice", QueueVerb::Submit);

        assert!(authorizer
            .authorize_queue_action(&admin, &queue, Permission::CancelAnyJobs, QueueVerb::Cancel)
            .await
            .is_ok());
    }
}
