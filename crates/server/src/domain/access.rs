//! Permission predicates.
//!
//! Every decision is a total function of the current user (if any), the
//! resource owner and a membership fact. No I/O happens here; callers load
//! the facts first. A missing user is denied everything.

use serde::{Deserialize, Serialize};

use super::role::Role;

/// The signed-in user as seen by the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: String,
    pub role: Role,
}

impl CurrentUser {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    fn is(&self, user_id: &str) -> bool {
        self.id == user_id
    }
}

pub fn can_access_project(user: Option<&CurrentUser>, owner_id: &str, is_member: bool) -> bool {
    user.is_some_and(|u| u.is_admin() || u.is(owner_id) || is_member)
}

/// Membership grants access but never edit rights.
pub fn can_edit_project(user: Option<&CurrentUser>, owner_id: &str) -> bool {
    user.is_some_and(|u| u.is_admin() || u.is(owner_id))
}

pub fn can_upload_files(user: Option<&CurrentUser>, owner_id: &str, is_member: bool) -> bool {
    can_access_project(user, owner_id, is_member)
}

pub fn can_delete_file(user: Option<&CurrentUser>, uploader_id: &str, project_owner_id: &str) -> bool {
    user.is_some_and(|u| u.is_admin() || u.is(uploader_id) || u.is(project_owner_id))
}

/// Permissions that depend on the role alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ManageTeam,
    ManageProjects,
    ViewReports,
    DeleteProjects,
    ManageUsers,
    CreateWorkers,
    ManageTasks,
}

impl Permission {
    pub const ALL: [Permission; 7] = [
        Permission::ManageTeam,
        Permission::ManageProjects,
        Permission::ViewReports,
        Permission::DeleteProjects,
        Permission::ManageUsers,
        Permission::CreateWorkers,
        Permission::ManageTasks,
    ];

    fn allowed_for(self, role: Role) -> bool {
        match self {
            Permission::ManageTeam | Permission::ManageProjects | Permission::ViewReports => {
                matches!(role, Role::Admin | Role::Manager)
            }
            Permission::DeleteProjects
            | Permission::ManageUsers
            | Permission::CreateWorkers
            | Permission::ManageTasks => role == Role::Admin,
        }
    }

    pub fn check(self, user: Option<&CurrentUser>) -> bool {
        user.is_some_and(|u| self.allowed_for(u.role))
    }

    /// Every permission the user holds, for clients that hide controls.
    pub fn granted(user: Option<&CurrentUser>) -> Vec<Permission> {
        Self::ALL.into_iter().filter(|p| p.check(user)).collect()
    }
}

pub fn can_manage_team(user: Option<&CurrentUser>) -> bool {
    Permission::ManageTeam.check(user)
}

pub fn can_manage_projects(user: Option<&CurrentUser>) -> bool {
    Permission::ManageProjects.check(user)
}

pub fn can_view_reports(user: Option<&CurrentUser>) -> bool {
    Permission::ViewReports.check(user)
}

pub fn can_delete_projects(user: Option<&CurrentUser>) -> bool {
    Permission::DeleteProjects.check(user)
}

pub fn can_manage_users(user: Option<&CurrentUser>) -> bool {
    Permission::ManageUsers.check(user)
}

pub fn can_create_workers(user: Option<&CurrentUser>) -> bool {
    Permission::CreateWorkers.check(user)
}

pub fn can_manage_tasks(user: Option<&CurrentUser>) -> bool {
    Permission::ManageTasks.check(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, role: Role) -> CurrentUser {
        CurrentUser::new(id, role)
    }

    #[test]
    fn owner_can_edit_member_cannot() {
        let owner = user("u", Role::User);
        let other = user("v", Role::User);

        assert!(can_edit_project(Some(&owner), "u"));
        assert!(!can_edit_project(Some(&other), "u"));
        assert!(can_access_project(Some(&other), "u", true));
    }

    #[test]
    fn admin_bypasses_ownership() {
        let admin = user("a", Role::Admin);
        assert!(can_access_project(Some(&admin), "someone", false));
        assert!(can_edit_project(Some(&admin), "someone"));
        assert!(can_delete_file(Some(&admin), "x", "y"));
    }

    #[test]
    fn manager_is_not_implicitly_a_project_member() {
        let manager = user("m", Role::Manager);
        assert!(!can_access_project(Some(&manager), "u", false));
        assert!(!can_edit_project(Some(&manager), "u"));
    }

    #[test]
    fn upload_follows_access() {
        let member = user("v", Role::Worker);
        assert!(can_upload_files(Some(&member), "u", true));
        assert!(!can_upload_files(Some(&member), "u", false));
    }

    #[test]
    fn file_deletion_by_uploader_or_project_owner() {
        let uploader = user("up", Role::Worker);
        let owner = user("own", Role::User);
        let bystander = user("b", Role::Manager);

        assert!(can_delete_file(Some(&uploader), "up", "own"));
        assert!(can_delete_file(Some(&owner), "up", "own"));
        assert!(!can_delete_file(Some(&bystander), "up", "own"));
    }

    #[test]
    fn role_permissions() {
        let manager = user("m", Role::Manager);
        let worker = user("w", Role::Worker);
        let admin = user("a", Role::Admin);

        assert!(can_manage_team(Some(&manager)));
        assert!(can_manage_projects(Some(&manager)));
        assert!(can_view_reports(Some(&manager)));
        assert!(!can_delete_projects(Some(&manager)));
        assert!(!can_manage_users(Some(&manager)));
        assert!(!can_create_workers(Some(&manager)));
        assert!(!can_manage_tasks(Some(&manager)));

        assert!(!can_manage_team(Some(&worker)));
        assert!(Permission::granted(Some(&worker)).is_empty());

        assert_eq!(Permission::granted(Some(&admin)).len(), Permission::ALL.len());
    }

    #[test]
    fn unauthenticated_is_denied_everything() {
        assert!(!can_access_project(None, "u", true));
        assert!(!can_edit_project(None, "u"));
        assert!(!can_upload_files(None, "u", true));
        assert!(!can_delete_file(None, "u", "u"));
        for permission in Permission::ALL {
            assert!(!permission.check(None));
        }
        assert!(Permission::granted(None).is_empty());
    }
}
