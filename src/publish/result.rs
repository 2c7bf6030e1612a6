//! publish::result

use serde::Serialize;

use crate::core::types::Oid;

/// Outcome of a successful publish.
///
/// Success means every file of the change set is reachable from the
/// branch at `commit_id`; there is no partial result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitResult {
    /// The new branch tip
    pub commit_id: Oid,
    /// Root tree of the new commit
    pub tree_id: Oid,
    /// The commit the branch pointed at before
    pub parent_id: Oid,
    /// Web URL of the commit, if the store provides one
    pub url: Option<String>,
    /// Number of files written
    pub files_changed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_ids_as_strings() {
        let result = CommitResult {
            commit_id: Oid::new("a".repeat(40)).unwrap(),
            tree_id: Oid::new("b".repeat(40)).unwrap(),
            parent_id: Oid::new("c".repeat(40)).unwrap(),
            url: None,
            files_changed: 2,
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["commit_id"], "a".repeat(40));
        assert_eq!(json["files_changed"], 2);
        assert!(json["url"].is_null());
    }
}
