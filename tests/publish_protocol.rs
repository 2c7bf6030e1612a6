//! Integration tests for the publish protocol.
//!
//! These tests drive `Publisher` against `MockStore`, injecting failures at
//! each phase and checking what ends up visible on the branch.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use gitpress::core::change_set::{ChangeSet, ChangeSetError, FileAction, FileChange};
use gitpress::core::path_policy::{PathPolicy, PathRejection};
use gitpress::core::types::BranchName;
use gitpress::publish::{PublishError, PublishOptions, PublishPhase, Publisher};
use gitpress::store::mock::{FailOn, MockOperation, MockStore};
use gitpress::store::StoreError;

fn main_branch() -> BranchName {
    BranchName::new("main").unwrap()
}

fn site() -> MockStore {
    MockStore::with_branch(
        "main",
        &[
            ("README.md", b"# Site"),
            ("data/md/welcome.md", b"Welcome"),
            ("data/json/resources.json", b"[]"),
        ],
    )
}

fn creates(files: &[(&str, &str)], message: Option<&str>) -> ChangeSet {
    ChangeSet::new(
        files
            .iter()
            .map(|(path, content)| FileChange::new(*path, *content, FileAction::Create))
            .collect(),
        message.map(str::to_string),
    )
    .unwrap()
}

fn publisher(store: &MockStore) -> Publisher<'_> {
    Publisher::new(store, PublishOptions::default())
}

// =============================================================================
// Example scenarios
// =============================================================================

mod scenarios {
    use super::*;

    #[tokio::test]
    async fn two_new_files_become_one_commit() {
        let store = site();
        let c0 = store.head("main").unwrap();
        let t0 = store.commit(&c0).unwrap().tree_id;

        let changes = creates(&[("a.md", "# A"), ("b.md", "# B")], Some("add docs"));
        let result = publisher(&store)
            .publish(&main_branch(), &changes)
            .await
            .unwrap();

        assert_eq!(result.parent_id, c0);
        assert_eq!(result.files_changed, 2);
        assert_eq!(store.head("main"), Some(result.commit_id.clone()));

        let commit = store.commit(&result.commit_id).unwrap();
        assert_eq!(commit.parent_ids, vec![c0]);
        assert_eq!(commit.tree_id, result.tree_id);
        assert_eq!(
            store.commit_message(&result.commit_id).as_deref(),
            Some("add docs")
        );
        assert!(result.url.is_some());

        // New tree = T0 plus a.md and b.md.
        let before = store.tree_entries(&t0).unwrap();
        let after = store.tree_entries(&result.tree_id).unwrap();
        assert_eq!(after.len(), before.len() + 2);
        for entry in &before {
            assert!(after.contains(entry), "lost base entry {:?}", entry);
        }

        let files = store.files_at("main");
        assert_eq!(files["a.md"], b"# A");
        assert_eq!(files["b.md"], b"# B");
    }

    #[tokio::test]
    async fn traversal_path_rejected_before_any_store_call() {
        let store = site();
        let head = store.head("main");
        let counts = store.object_counts();

        let changes = creates(&[("ok.md", "fine"), ("../../etc/passwd", "root")], None);
        let err = publisher(&store)
            .publish(&main_branch(), &changes)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PublishError::Validation(ChangeSetError::RejectedPath {
                reason: PathRejection::ParentTraversal,
                ..
            })
        ));
        assert!(store.operations().is_empty());
        assert_eq!(store.object_counts(), counts);
        assert_eq!(store.head("main"), head);
    }

    #[tokio::test]
    async fn concurrent_publishes_from_same_tip_one_conflicts() {
        let store = site().with_blob_delay(Duration::from_millis(10));
        let c0 = store.head("main").unwrap();

        let first = creates(&[("first.md", "1")], Some("first"));
        let second = creates(&[("second.md", "2")], Some("second"));
        let a = publisher(&store);
        let b = publisher(&store);
        let branch = main_branch();

        let (ra, rb) = tokio::join!(a.publish(&branch, &first), b.publish(&branch, &second));

        let (winner, loser) = match (ra, rb) {
            (Ok(w), Err(l)) | (Err(l), Ok(w)) => (w, l),
            other => panic!("expected exactly one success: {:?}", other),
        };

        assert_eq!(winner.parent_id, c0);
        assert_eq!(store.head("main"), Some(winner.commit_id));
        match loser {
            PublishError::Conflict {
                expected, commit, ..
            } => {
                assert_eq!(expected, c0);
                assert!(store.commit(&commit).is_some(), "loser's commit exists");
            }
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn writer_between_resolve_and_update_is_not_overwritten() {
        let store = site();
        let c0 = store.head("main").unwrap();
        store.before_update_ref(|s| {
            s.commit_directly("main", &[("racer.md", b"racer")], "racer");
        });

        let err = publisher(&store)
            .publish(&main_branch(), &creates(&[("mine.md", "mine")], None))
            .await
            .unwrap_err();

        assert!(matches!(err, PublishError::Conflict { ref expected, .. } if *expected == c0));
        assert!(err.requires_reresolve());

        let files = store.files_at("main");
        assert!(files.contains_key("racer.md"));
        assert!(!files.contains_key("mine.md"));
    }
}

// =============================================================================
// Failure at each phase
// =============================================================================

mod failures {
    use super::*;

    #[tokio::test]
    async fn preparation_failures_leave_branch_untouched() {
        let cases = [
            (FailOn::GetRef(StoreError::RateLimited), PublishPhase::ResolveRef),
            (
                FailOn::GetCommit(StoreError::NetworkError("reset".into())),
                PublishPhase::FetchBaseTree,
            ),
            (
                FailOn::GetTree(StoreError::RateLimited),
                PublishPhase::FetchBaseTree,
            ),
            (
                FailOn::CreateBlob(StoreError::RateLimited),
                PublishPhase::CreateBlobs,
            ),
            (
                FailOn::NthBlob(2, StoreError::NetworkError("reset".into())),
                PublishPhase::CreateBlobs,
            ),
            (
                FailOn::CreateTree(StoreError::ApiError {
                    status: 502,
                    message: "bad gateway".into(),
                }),
                PublishPhase::BuildTree,
            ),
            (
                FailOn::CreateCommit(StoreError::RateLimited),
                PublishPhase::CreateCommit,
            ),
        ];

        for (fail_on, phase) in cases {
            let store = site().fail_on(fail_on.clone());
            let head = store.head("main");

            let changes = creates(&[("a.md", "a"), ("b.md", "b"), ("c.md", "c")], None);
            let err = publisher(&store)
                .publish(&main_branch(), &changes)
                .await
                .unwrap_err();

            assert_eq!(err.phase(), phase, "{:?}", fail_on);
            assert!(
                matches!(err, PublishError::Transport { .. }),
                "{:?}: {:?}",
                fail_on,
                err
            );
            assert!(err.is_retryable(), "{:?}", fail_on);
            assert_eq!(store.head("main"), head, "{:?}", fail_on);
            assert!(
                !store
                    .operations()
                    .iter()
                    .any(|op| matches!(op, MockOperation::UpdateRef { .. })),
                "{:?} reached update_ref",
                fail_on
            );
        }
    }

    #[tokio::test]
    async fn file_and_directory_collisions_are_rejected_before_upload() {
        for (path, existing) in [
            ("README.md/x.md", "README.md"),
            ("data/md", "data/md/"),
        ] {
            for check_actions in [true, false] {
                let store = site();
                let before = store.files_at("main");
                let options = PublishOptions {
                    check_actions,
                    ..Default::default()
                };
                let changes = creates(&[("keep.md", "k"), (path, "x")], None);

                let err = Publisher::new(&store, options)
                    .publish(&main_branch(), &changes)
                    .await
                    .unwrap_err();

                match &err {
                    PublishError::Validation(ChangeSetError::CollidesWithBase {
                        path: p,
                        existing: e,
                    }) => {
                        assert_eq!(p, path);
                        assert_eq!(e, existing);
                    }
                    other => panic!("{path}: expected collision, got {other:?}"),
                }
                assert_eq!(err.phase(), PublishPhase::FetchBaseTree);
                assert!(!err.is_retryable());
                assert_eq!(store.files_at("main"), before);
                assert!(!store
                    .operations()
                    .iter()
                    .any(|op| matches!(op, MockOperation::CreateBlob { .. })));
            }
        }
    }

    #[tokio::test]
    async fn missing_branch_is_not_found() {
        let store = site();
        let err = publisher(&store)
            .publish(
                &BranchName::new("gone").unwrap(),
                &creates(&[("a.md", "a")], None),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PublishError::NotFound { ref branch } if branch.as_str() == "gone"));
        assert!(!err.is_retryable());
        assert_eq!(store.operations().len(), 1);
    }

    #[tokio::test]
    async fn failed_blob_leaves_only_unreferenced_objects() {
        let store = site().fail_on(FailOn::NthBlob(3, StoreError::RateLimited));
        let options = PublishOptions {
            blob_concurrency: 1,
            ..Default::default()
        };
        let (blobs_before, trees_before, commits_before) = store.object_counts();

        let changes = creates(&[("a.md", "a"), ("b.md", "b"), ("c.md", "c")], None);
        let err = Publisher::new(&store, options)
            .publish(&main_branch(), &changes)
            .await
            .unwrap_err();

        assert_eq!(err.phase(), PublishPhase::CreateBlobs);
        let (blobs, trees, commits) = store.object_counts();
        assert_eq!(blobs, blobs_before + 2);
        assert_eq!(commits, commits_before);
        // Only the recursive base listing may add cached subtrees, never new roots.
        assert!(trees >= trees_before);
        assert!(!store.files_at("main").contains_key("a.md"));
    }

    #[tokio::test]
    async fn update_transport_error_is_ambiguous() {
        let store = site().fail_on(FailOn::UpdateRef(StoreError::NetworkError(
            "connection reset".into(),
        )));
        let head = store.head("main");

        let err = publisher(&store)
            .publish(&main_branch(), &creates(&[("a.md", "a")], None))
            .await
            .unwrap_err();

        assert!(matches!(err, PublishError::AmbiguousPublish { .. }));
        assert!(!err.is_retryable());
        assert!(err.requires_reresolve());
        assert_eq!(store.head("main"), head);
    }

    #[tokio::test]
    async fn unsent_update_is_retryable_transport() {
        let store = site().fail_on(FailOn::UpdateRef(StoreError::NotSent(Box::new(
            StoreError::RateLimited,
        ))));
        let head = store.head("main");

        let err = publisher(&store)
            .publish(&main_branch(), &creates(&[("a.md", "a")], None))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PublishError::Transport {
                phase: PublishPhase::UpdateRef,
                source: StoreError::RateLimited,
            }
        ));
        assert!(err.is_retryable());
        assert!(!err.requires_reresolve());
        assert_eq!(store.head("main"), head);
    }

    #[tokio::test]
    async fn update_that_landed_but_errored_is_ambiguous() {
        let store = site().fail_on(FailOn::UpdateRefAfterApply(StoreError::ApiError {
            status: 504,
            message: "gateway timeout".into(),
        }));

        let err = publisher(&store)
            .publish(&main_branch(), &creates(&[("a.md", "a")], None))
            .await
            .unwrap_err();

        match err {
            PublishError::AmbiguousPublish { commit, .. } => {
                assert_eq!(store.head("main"), Some(commit));
            }
            other => panic!("expected ambiguous publish, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn store_conflict_maps_to_conflict() {
        let store = site().fail_on(FailOn::UpdateRef(StoreError::Conflict(
            "not a fast forward".into(),
        )));

        let err = publisher(&store)
            .publish(&main_branch(), &creates(&[("a.md", "a")], None))
            .await
            .unwrap_err();

        assert!(matches!(err, PublishError::Conflict { .. }));
        assert_eq!(err.phase(), PublishPhase::UpdateRef);
    }
}

// =============================================================================
// Retry and content preservation
// =============================================================================

mod idempotence {
    use super::*;

    #[tokio::test]
    async fn retry_after_preparation_failure_matches_single_run() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();
        let changes = creates(&[("a.md", "a"), ("docs/b.md", "b")], None);

        let flaky = site().fail_on(FailOn::CreateTree(StoreError::RateLimited));
        let err = publisher(&flaky)
            .publish_at(&main_branch(), &changes, now)
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        flaky.clear_fail_on();
        let retried = publisher(&flaky)
            .publish_at(&main_branch(), &changes, now)
            .await
            .unwrap();

        let clean = site();
        let single = publisher(&clean)
            .publish_at(&main_branch(), &changes, now)
            .await
            .unwrap();

        assert_eq!(retried.tree_id, single.tree_id);
        assert_eq!(retried.commit_id, single.commit_id);
        assert_eq!(flaky.files_at("main"), clean.files_at("main"));
    }

    #[tokio::test]
    async fn modify_replaces_content_and_keeps_siblings() {
        let store = site();
        let c0 = store.head("main").unwrap();
        let before = store.tree_entries(&store.commit(&c0).unwrap().tree_id).unwrap();

        let changes = ChangeSet::new(
            vec![FileChange::new(
                "data/md/welcome.md",
                "Welcome back",
                FileAction::Modify,
            )],
            None,
        )
        .unwrap();
        let result = publisher(&store)
            .publish(&main_branch(), &changes)
            .await
            .unwrap();

        let after = store.tree_entries(&result.tree_id).unwrap();
        assert_eq!(after.len(), before.len());
        for entry in before.iter().filter(|(p, _, _)| p != "data/md/welcome.md") {
            assert!(after.contains(entry), "sibling changed: {:?}", entry);
        }
        assert_eq!(store.files_at("main")["data/md/welcome.md"], b"Welcome back");
    }

    #[tokio::test]
    async fn identical_content_at_two_paths() {
        let store = site();
        let changes = creates(&[("a.md", "same"), ("b.md", "same")], None);
        publisher(&store)
            .publish(&main_branch(), &changes)
            .await
            .unwrap();

        let files = store.files_at("main");
        assert_eq!(files["a.md"], b"same");
        assert_eq!(files["b.md"], b"same");
    }
}

// =============================================================================
// Options
// =============================================================================

mod options {
    use super::*;

    #[tokio::test]
    async fn blob_uploads_are_bounded() {
        for limit in [1usize, 3] {
            let store = site().with_blob_delay(Duration::from_millis(5));
            let files: Vec<(String, String)> = (0..10)
                .map(|i| (format!("post-{i}.md"), format!("post {i}")))
                .collect();
            let refs: Vec<(&str, &str)> = files
                .iter()
                .map(|(p, c)| (p.as_str(), c.as_str()))
                .collect();

            let options = PublishOptions {
                blob_concurrency: limit,
                ..Default::default()
            };
            Publisher::new(&store, options)
                .publish(&main_branch(), &creates(&refs, None))
                .await
                .unwrap();

            assert_eq!(store.max_blobs_in_flight(), limit);
        }
    }

    #[tokio::test]
    async fn zero_concurrency_treated_as_one() {
        let store = site().with_blob_delay(Duration::from_millis(1));
        let options = PublishOptions {
            blob_concurrency: 0,
            ..Default::default()
        };
        Publisher::new(&store, options)
            .publish(&main_branch(), &creates(&[("a.md", "a"), ("b.md", "b")], None))
            .await
            .unwrap();
        assert_eq!(store.max_blobs_in_flight(), 1);
    }

    #[tokio::test]
    async fn tree_overrides_follow_change_set_order() {
        let store = site().with_blob_delay(Duration::from_millis(1));
        let changes = creates(&[("z.md", "z"), ("a.md", "a"), ("m/n.md", "n")], None);
        publisher(&store)
            .publish(&main_branch(), &changes)
            .await
            .unwrap();

        let paths = store
            .operations()
            .into_iter()
            .find_map(|op| match op {
                MockOperation::CreateTree { paths, .. } => Some(paths),
                _ => None,
            })
            .unwrap();
        assert_eq!(paths, vec!["z.md", "a.md", "m/n.md"]);
    }

    #[tokio::test]
    async fn base_tree_is_listed_with_or_without_action_checks() {
        for check_actions in [true, false] {
            let store = site();
            let t0 = store.commit(&store.head("main").unwrap()).unwrap().tree_id;
            let options = PublishOptions {
                check_actions,
                ..Default::default()
            };
            Publisher::new(&store, options)
                .publish(&main_branch(), &creates(&[("README.md", "# New")], None))
                .await
                .unwrap();
            assert!(store.operations().contains(&MockOperation::GetTree {
                id: t0,
                recursive: true,
            }));
        }
    }

    #[tokio::test]
    async fn configured_denied_dirs_are_enforced() {
        let store = site();
        let options = PublishOptions {
            policy: PathPolicy::with_denied_dirs(["vendor"]),
            ..Default::default()
        };
        let err = Publisher::new(&store, options)
            .publish(
                &main_branch(),
                &creates(&[("vendor/lib/x.js", "x")], None),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PublishError::Validation(ChangeSetError::RejectedPath {
                reason: PathRejection::DependencyDir(_),
                ..
            })
        ));
        assert!(store.operations().is_empty());
    }

    #[tokio::test]
    async fn generated_message_when_none_given() {
        let store = site();
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 9, 30, 0).unwrap();
        let result = publisher(&store)
            .publish_at(
                &main_branch(),
                &creates(&[("a.md", "a"), ("b.md", "b")], None),
                now,
            )
            .await
            .unwrap();

        assert_eq!(
            store.commit_message(&result.commit_id).as_deref(),
            Some("Publish 2 files: a.md, b.md (2026-10-16T09:30:00Z)")
        );
    }
}

// =============================================================================
// Cancellation
// =============================================================================

mod cancellation {
    use super::*;

    #[tokio::test]
    async fn cancelled_before_start_makes_no_calls() {
        let store = site();
        let token = CancellationToken::new();
        token.cancel();

        let err = publisher(&store)
            .with_cancellation(token)
            .publish(&main_branch(), &creates(&[("a.md", "a")], None))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PublishError::Cancelled {
                phase: PublishPhase::ValidatePaths
            }
        ));
        assert!(err.is_retryable());
        assert!(store.operations().is_empty());
    }

    #[tokio::test]
    async fn cancelled_during_blob_upload() {
        let store = site().with_blob_delay(Duration::from_millis(200));
        let head = store.head("main");
        let token = CancellationToken::new();

        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = publisher(&store)
            .with_cancellation(token)
            .publish(&main_branch(), &creates(&[("a.md", "a"), ("b.md", "b")], None))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PublishError::Cancelled {
                phase: PublishPhase::CreateBlobs
            }
        ));
        assert_eq!(store.head("main"), head);
        assert!(!store
            .operations()
            .iter()
            .any(|op| matches!(op, MockOperation::CreateTree { .. })));
    }

    #[tokio::test]
    async fn cancellation_after_update_issued_is_ignored() {
        let store = site();
        let token = CancellationToken::new();

        let trigger = token.clone();
        store.before_update_ref(move |_| trigger.cancel());

        let result = publisher(&store)
            .with_cancellation(token.clone())
            .publish(&main_branch(), &creates(&[("a.md", "a")], None))
            .await
            .unwrap();

        assert!(token.is_cancelled());
        assert_eq!(store.head("main"), Some(result.commit_id));
    }
}
