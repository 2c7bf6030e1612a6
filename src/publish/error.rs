//! publish::error
//!
//! Failure taxonomy of a publish run.
//!
//! Every failure names the phase it happened in. Failures before
//! [`PublishPhase::UpdateRef`] leave the branch untouched; only the ref
//! update itself can produce an outcome the caller has to re-check.

use thiserror::Error;

use super::PublishPhase;
use crate::core::change_set::ChangeSetError;
use crate::core::types::{BranchName, Oid};
use crate::store::StoreError;

/// Errors from [`Publisher::publish`](super::Publisher::publish).
#[derive(Debug, Error)]
pub enum PublishError {
    /// The change set was rejected before anything was written.
    ///
    /// Path and batch problems are caught before any store call; a clash
    /// with the branch's tree is caught once the base tree is listed.
    #[error("invalid change set: {0}")]
    Validation(#[from] ChangeSetError),

    /// The target branch does not exist.
    #[error("branch '{branch}' not found")]
    NotFound { branch: BranchName },

    /// The branch moved after it was resolved; nothing was published.
    ///
    /// `commit` was created but is not reachable from the branch.
    #[error(
        "branch '{branch}' moved since {old}; commit {new} was not published",
        old = .expected.short(12),
        new = .commit.short(12)
    )]
    Conflict {
        branch: BranchName,
        expected: Oid,
        commit: Oid,
    },

    /// The store failed before the ref moved; nothing was published.
    ///
    /// Usually a preparation phase. `UpdateRef` here means the update
    /// request itself was never sent.
    #[error("{phase} failed: {source}")]
    Transport {
        phase: PublishPhase,
        source: StoreError,
    },

    /// The ref update failed in a way that may or may not have landed.
    #[error(
        "outcome of updating '{branch}' to {new} is unknown: {source}",
        new = .commit.short(12)
    )]
    AmbiguousPublish {
        branch: BranchName,
        commit: Oid,
        source: StoreError,
    },

    /// The run was cancelled before the ref update was issued.
    #[error("publish cancelled during {phase}")]
    Cancelled { phase: PublishPhase },
}

impl PublishError {
    /// The phase the run stopped in.
    pub fn phase(&self) -> PublishPhase {
        match self {
            PublishError::Validation(ChangeSetError::CollidesWithBase { .. }) => {
                PublishPhase::FetchBaseTree
            }
            PublishError::Validation(_) => PublishPhase::ValidatePaths,
            PublishError::NotFound { .. } => PublishPhase::ResolveRef,
            PublishError::Conflict { .. } | PublishError::AmbiguousPublish { .. } => {
                PublishPhase::UpdateRef
            }
            PublishError::Transport { phase, .. } | PublishError::Cancelled { phase } => *phase,
        }
    }

    /// Whether re-running the same publish from scratch is known to be safe.
    ///
    /// True only when the branch is guaranteed untouched and the failure was
    /// not caused by the input itself. A conflict is not retryable as-is:
    /// the caller must decide whether its changes still apply on the new tip.
    pub fn is_retryable(&self) -> bool {
        match self {
            PublishError::Transport { .. } | PublishError::Cancelled { .. } => true,
            _ => false,
        }
    }

    /// Whether the caller must re-read the branch before deciding anything.
    pub fn requires_reresolve(&self) -> bool {
        matches!(
            self,
            PublishError::Conflict { .. } | PublishError::AmbiguousPublish { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::path_policy::PathRejection;

    fn oid(c: char) -> Oid {
        Oid::new(c.to_string().repeat(40)).unwrap()
    }

    fn main() -> BranchName {
        BranchName::new("main").unwrap()
    }

    #[test]
    fn preparation_transport_is_retryable() {
        for phase in [
            PublishPhase::ResolveRef,
            PublishPhase::FetchBaseTree,
            PublishPhase::CreateBlobs,
            PublishPhase::BuildTree,
            PublishPhase::CreateCommit,
        ] {
            let err = PublishError::Transport {
                phase,
                source: StoreError::RateLimited,
            };
            assert!(err.is_retryable(), "{phase} should be retryable");
            assert!(!err.requires_reresolve());
        }
    }

    #[test]
    fn unsent_update_is_retryable() {
        let err = PublishError::Transport {
            phase: PublishPhase::UpdateRef,
            source: StoreError::RateLimited,
        };
        assert!(err.is_retryable());
        assert!(!err.requires_reresolve());
        assert_eq!(err.phase(), PublishPhase::UpdateRef);
    }

    #[test]
    fn update_outcomes_are_not_retryable() {
        let conflict = PublishError::Conflict {
            branch: main(),
            expected: oid('a'),
            commit: oid('b'),
        };
        let ambiguous = PublishError::AmbiguousPublish {
            branch: main(),
            commit: oid('b'),
            source: StoreError::NetworkError("reset".into()),
        };

        for err in [conflict, ambiguous] {
            assert!(!err.is_retryable());
            assert!(err.requires_reresolve());
            assert_eq!(err.phase(), PublishPhase::UpdateRef);
        }
    }

    #[test]
    fn validation_is_not_retryable() {
        let err = PublishError::from(ChangeSetError::RejectedPath {
            path: ".env".into(),
            reason: PathRejection::SecretFile,
        });
        assert!(!err.is_retryable());
        assert_eq!(err.phase(), PublishPhase::ValidatePaths);
    }

    #[test]
    fn display_names_phase_and_short_ids() {
        let err = PublishError::Transport {
            phase: PublishPhase::CreateBlobs,
            source: StoreError::RateLimited,
        };
        assert_eq!(err.to_string(), "create blobs failed: rate limited");

        let err = PublishError::Conflict {
            branch: main(),
            expected: oid('a'),
            commit: oid('b'),
        };
        assert_eq!(
            err.to_string(),
            "branch 'main' moved since aaaaaaaaaaaa; commit bbbbbbbbbbbb was not published"
        );
    }
}
