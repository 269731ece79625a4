use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Role buckets a layer version hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Viewer,
    Editor,
    Drafter,
    Reviewer,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Viewer, Role::Editor, Role::Drafter, Role::Reviewer];

    pub fn flag(&self) -> RoleFlags {
        match self {
            Role::Viewer => RoleFlags::VIEWER,
            Role::Editor => RoleFlags::EDITOR,
            Role::Drafter => RoleFlags::DRAFTER,
            Role::Reviewer => RoleFlags::REVIEWER,
        }
    }
}

/// Whether a grant names a person or a team. Target ids are opaque and
/// resolved by the directory collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Individual,
    Team,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct RoleFlags: u8 {
        const VIEWER = 0b0001;
        const EDITOR = 0b0010;
        const DRAFTER = 0b0100;
        const REVIEWER = 0b1000;
    }
}

impl fmt::Display for RoleFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.is_empty() {
            parts.push("NONE");
        } else {
            if self.contains(RoleFlags::VIEWER) {
                parts.push("VIEWER");
            }
            if self.contains(RoleFlags::EDITOR) {
                parts.push("EDITOR");
            }
            if self.contains(RoleFlags::DRAFTER) {
                parts.push("DRAFTER");
            }
            if self.contains(RoleFlags::REVIEWER) {
                parts.push("REVIEWER");
            }
        }
        write!(f, "{}", parts.join("|"))
    }
}

/// Individuals and teams holding one role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrants {
    pub individuals: BTreeSet<String>,
    pub teams: BTreeSet<String>,
}

impl RoleGrants {
    fn bucket_mut(&mut self, kind: TargetKind) -> &mut BTreeSet<String> {
        match kind {
            TargetKind::Individual => &mut self.individuals,
            TargetKind::Team => &mut self.teams,
        }
    }

    pub fn bucket(&self, kind: TargetKind) -> &BTreeSet<String> {
        match kind {
            TargetKind::Individual => &self.individuals,
            TargetKind::Team => &self.teams,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty() && self.teams.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    pub viewer: RoleGrants,
    pub editor: RoleGrants,
    pub drafter: RoleGrants,
    pub reviewer: RoleGrants,
}

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grants(&self, role: Role) -> &RoleGrants {
        match role {
            Role::Viewer => &self.viewer,
            Role::Editor => &self.editor,
            Role::Drafter => &self.drafter,
            Role::Reviewer => &self.reviewer,
        }
    }

    fn grants_mut(&mut self, role: Role) -> &mut RoleGrants {
        match role {
            Role::Viewer => &mut self.viewer,
            Role::Editor => &mut self.editor,
            Role::Drafter => &mut self.drafter,
            Role::Reviewer => &mut self.reviewer,
        }
    }

    /// Adds the target to the role bucket; returns false if it was already there.
    pub fn grant(&mut self, role: Role, kind: TargetKind, target_id: &str) -> bool {
        self.grants_mut(role)
            .bucket_mut(kind)
            .insert(target_id.to_string())
    }

    /// Removes the target from the role bucket; returns false if it was absent.
    pub fn revoke(&mut self, role: Role, kind: TargetKind, target_id: &str) -> bool {
        self.grants_mut(role).bucket_mut(kind).remove(target_id)
    }

    /// Every role the target holds directly.
    pub fn roles_for(&self, kind: TargetKind, target_id: &str) -> RoleFlags {
        Role::ALL
            .iter()
            .filter(|role| self.grants(**role).bucket(kind).contains(target_id))
            .fold(RoleFlags::empty(), |acc, role| acc | role.flag())
    }

    pub fn is_empty(&self) -> bool {
        Role::ALL.iter().all(|role| self.grants(*role).is_empty())
    }
}
