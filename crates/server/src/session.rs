//! Per-identity session context.
//!
//! A session holds the authenticated identity and caches the role looked up
//! for it. The role is fetched at most once per identity; switching to a
//! different identity drops the cached role.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::{CurrentUser, Permission, Role};
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;

/// Source of role assignments.
#[async_trait]
pub trait RoleResolver: Send + Sync {
    /// `Ok(None)` when the user has no role assigned.
    async fn lookup(&self, user_id: &str) -> std::result::Result<Option<String>, sqlx::Error>;
}

#[derive(Clone)]
pub struct SqlRoleResolver {
    pool: SqlitePool,
}

impl SqlRoleResolver {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleResolver for SqlRoleResolver {
    async fn lookup(&self, user_id: &str) -> std::result::Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>("SELECT role FROM user_roles WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }
}

/// Resolve a role, degrading to [`Role::User`] on any failure.
pub async fn resolve_role(resolver: &dyn RoleResolver, user_id: &str) -> Role {
    match resolver.lookup(user_id).await {
        Ok(Some(value)) => value.parse().unwrap_or_else(|e| {
            tracing::warn!(user_id, error = %e, "unrecognised role, using least privilege");
            Role::User
        }),
        Ok(None) => Role::User,
        Err(e) => {
            tracing::warn!(user_id, error = %e, "role lookup failed, using least privilege");
            Role::User
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    identity: Option<AuthUser>,
    role: Option<Role>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn for_identity(identity: AuthUser) -> Self {
        Self {
            identity: Some(identity),
            role: None,
        }
    }

    pub fn identity(&self) -> Option<&AuthUser> {
        self.identity.as_ref()
    }

    /// Replace the identity. The cached role survives only if the user id
    /// is unchanged.
    pub fn switch_identity(&mut self, identity: Option<AuthUser>) {
        let same_user = match (&self.identity, &identity) {
            (Some(old), Some(new)) => old.id == new.id,
            _ => false,
        };
        if !same_user {
            self.role = None;
        }
        self.identity = identity;
    }

    pub fn cached_role(&self) -> Option<Role> {
        self.role
    }

    /// The identity's role, fetched on first use.
    pub async fn role(&mut self, resolver: &dyn RoleResolver) -> Option<Role> {
        let identity = self.identity.as_ref()?;
        if let Some(role) = self.role {
            return Some(role);
        }
        let role = resolve_role(resolver, &identity.id).await;
        self.role = Some(role);
        Some(role)
    }

    /// Policy view of the session. Without a resolved role the session is
    /// treated as least-privileged.
    pub fn current_user(&self) -> Option<CurrentUser> {
        self.identity
            .as_ref()
            .map(|identity| CurrentUser::new(&identity.id, self.role.unwrap_or_default()))
    }

    pub fn has_role(&self, required: Role) -> bool {
        self.current_user()
            .is_some_and(|user| user.role.has_role(required))
    }

    /// Authenticated user, or `401`.
    pub fn require_user(&self) -> Result<CurrentUser> {
        self.current_user().ok_or(AppError::Unauthorized)
    }

    /// Authenticated user holding `permission`, or `401`/`403`.
    pub fn require(&self, permission: Permission) -> Result<CurrentUser> {
        let user = self.require_user()?;
        if !permission.check(Some(&user)) {
            tracing::debug!(user_id = %user.id, ?permission, "permission denied");
            return Err(AppError::access_denied());
        }
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct FixedResolver {
        answer: std::result::Result<Option<&'static str>, ()>,
        calls: AtomicUsize,
    }

    impl FixedResolver {
        fn new(answer: std::result::Result<Option<&'static str>, ()>) -> Self {
            Self {
                answer,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RoleResolver for FixedResolver {
        async fn lookup(&self, _user_id: &str) -> std::result::Result<Option<String>, sqlx::Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.answer {
                Ok(value) => Ok(value.map(str::to_string)),
                Err(()) => Err(sqlx::Error::PoolTimedOut),
            }
        }
    }

    fn identity(id: &str) -> AuthUser {
        AuthUser {
            id: id.to_string(),
            email: format!("{id}@example.com"),
            name: id.to_string(),
        }
    }

    #[tokio::test]
    async fn lookup_failure_degrades_to_user() {
        let resolver = FixedResolver::new(Err(()));
        assert_eq!(resolve_role(&resolver, "u1").await, Role::User);
    }

    #[tokio::test]
    async fn missing_or_unknown_role_degrades_to_user() {
        assert_eq!(resolve_role(&FixedResolver::new(Ok(None)), "u1").await, Role::User);
        assert_eq!(
            resolve_role(&FixedResolver::new(Ok(Some("owner"))), "u1").await,
            Role::User
        );
    }

    #[tokio::test]
    async fn role_is_fetched_once_per_identity() {
        let resolver = FixedResolver::new(Ok(Some("manager")));
        let mut session = Session::for_identity(identity("u1"));

        assert_eq!(session.role(&resolver).await, Some(Role::Manager));
        assert_eq!(session.role(&resolver).await, Some(Role::Manager));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);

        session.switch_identity(Some(identity("u1")));
        assert_eq!(session.cached_role(), Some(Role::Manager));

        session.switch_identity(Some(identity("u2")));
        assert_eq!(session.cached_role(), None);
        session.role(&resolver).await;
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn anonymous_session_is_denied() {
        let resolver = FixedResolver::new(Ok(Some("admin")));
        let mut session = Session::anonymous();

        assert_eq!(session.role(&resolver).await, None);
        assert!(matches!(session.require_user(), Err(AppError::Unauthorized)));
        assert!(matches!(
            session.require(Permission::ManageTeam),
            Err(AppError::Unauthorized)
        ));
        assert!(!session.has_role(Role::User));
    }

    #[tokio::test]
    async fn require_checks_permission() {
        let resolver = FixedResolver::new(Ok(Some("manager")));
        let mut session = Session::for_identity(identity("m"));
        session.role(&resolver).await;

        assert!(session.require(Permission::ManageTeam).is_ok());
        assert!(matches!(
            session.require(Permission::ManageUsers),
            Err(AppError::Forbidden(_))
        ));
        assert!(session.has_role(Role::Worker));
    }
}
