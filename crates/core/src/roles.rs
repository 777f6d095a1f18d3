//! Caller roles and the authority table for incident commands.
//!
//! Roles arrive from the identity oracle (a JWT claim at the HTTP edge) and
//! are checked here before any incident state is examined.

use crate::error::CoreError;
use crate::types::DbId;

define_text_enum! {
    /// Role of the calling user.
    Role {
        Admin = "admin",
        Manager = "manager",
        Technician = "technician",
        Staff = "staff",
        Citizen = "citizen",
    }
}

/// An authority a command may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Acknowledge, assign, reject, close, verify, approve costs, open
    /// maintenance, run duplicate scans and resolve merge suggestions.
    Triage,
    /// Resolve an assigned incident.
    Resolve,
    /// Record the external AI scorer's assessment.
    RecordAssessment,
    /// Report, comment publicly, upvote, read.
    Participate,
    /// Post and read internal comments.
    InternalNotes,
}

impl Permission {
    fn describe(self) -> &'static str {
        match self {
            Permission::Triage => "triage incidents",
            Permission::Resolve => "resolve incidents",
            Permission::RecordAssessment => "record AI assessments",
            Permission::Participate => "participate in incidents",
            Permission::InternalNotes => "use internal comments",
        }
    }
}

impl Role {
    pub fn can(self, permission: Permission) -> bool {
        use Role::*;
        match permission {
            Permission::Triage => matches!(self, Admin | Manager),
            Permission::Resolve => matches!(self, Admin | Manager | Technician),
            Permission::RecordAssessment => matches!(self, Admin),
            Permission::Participate => true,
            Permission::InternalNotes => matches!(self, Admin | Manager | Technician | Staff),
        }
    }

    /// Whether incidents reported by this role count as staff reports.
    pub fn is_staff(self) -> bool {
        !matches!(self, Role::Citizen)
    }
}

/// The authenticated caller of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: DbId,
    pub user_name: String,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: DbId, user_name: impl Into<String>, role: Role) -> Self {
        Self {
            user_id,
            user_name: user_name.into(),
            role,
        }
    }

    /// Fail with `PermissionDenied` unless the actor's role grants `permission`.
    pub fn require(&self, permission: Permission) -> Result<(), CoreError> {
        if self.role.can(permission) {
            Ok(())
        } else {
            Err(CoreError::PermissionDenied(format!(
                "Role '{}' may not {}",
                self.role,
                permission.describe()
            )))
        }
    }
}
