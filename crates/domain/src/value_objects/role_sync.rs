use std::fmt::Display;

/// Role mutations needed to make the external store match the desired plan.
/// Computed from a membership snapshot, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleDelta {
    /// Role to add, when the desired plan maps to one the subject does not hold.
    pub grant: Option<String>,
    /// Other plan-mapped roles currently held, in ascending plan-rank order.
    pub revoke: Vec<String>,
}

impl RoleDelta {
    pub fn is_empty(&self) -> bool {
        self.grant.is_none() && self.revoke.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleOperation {
    Grant,
    Revoke,
}

impl RoleOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleOperation::Grant => "grant",
            RoleOperation::Revoke => "revoke",
        }
    }
}

impl Display for RoleOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One role mutation that did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSyncFailure {
    pub operation: RoleOperation,
    pub role_id: String,
    pub error: String,
}
