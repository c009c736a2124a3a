//! Subject groups.

use serde::{Deserialize, Serialize};

/// A named set of subjects.
///
/// Members are kept sorted and free of duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Group {
    /// Group identifier. Policies name groups through this id.
    #[serde(default)]
    pub id: String,

    /// Subject identifiers belonging to the group.
    #[serde(default)]
    pub members: Vec<String>,
}

impl Group {
    /// Creates a group with normalized members.
    #[must_use]
    pub fn new(id: impl Into<String>, members: impl IntoIterator<Item = String>) -> Self {
        let mut group = Self {
            id: id.into(),
            members: members.into_iter().collect(),
        };
        group.normalize();
        group
    }

    /// Sorts and deduplicates the member list.
    pub fn normalize(&mut self) {
        self.members.sort();
        self.members.dedup();
    }

    /// Returns `true` if `member` belongs to the group.
    #[must_use]
    pub fn contains(&self, member: &str) -> bool {
        self.members.binary_search_by(|m| m.as_str().cmp(member)).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_deduplicates_members() {
        let group = Group::new(
            "group1",
            ["ken", "alice", "ken"].into_iter().map(String::from),
        );
        assert_eq!(group.members, vec!["alice", "ken"]);
        assert!(group.contains("ken"));
        assert!(!group.contains("bob"));
    }
}
