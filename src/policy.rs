//! Role policy: the single place that turns a role id into capabilities.

/// Numeric role identifier as stored on the employee record and in tokens.
pub type RoleId = i32;

/// Roles with administrative reach over every employee's documents.
pub const PRIVILEGED_ROLES: [RoleId; 3] = [2, 5, 6];

/// Capabilities
///
/// What a role may do. Derived purely from the role id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// May approve, reject and hand off any employee's documents.
    pub is_privileged: bool,
}

impl Capabilities {
    /// May view and list documents owned by someone else.
    pub fn can_view_all_documents(&self) -> bool {
        self.is_privileged
    }

    /// May drive approve / reject / mark-sent transitions.
    pub fn can_review_documents(&self) -> bool {
        self.is_privileged
    }
}

pub fn is_privileged(role_id: RoleId) -> bool {
    PRIVILEGED_ROLES.contains(&role_id)
}

pub fn capabilities(role_id: RoleId) -> Capabilities {
    Capabilities {
        is_privileged: is_privileged(role_id),
    }
}
