//! End-to-end tests for the synchronization engine against the in-memory
//! remote. Time is paused so latency-driven races are deterministic.

use std::sync::Arc;
use std::time::Duration;
use tempfile::{TempDir, tempdir};
use tokio::sync::mpsc;

use draftsync::cache::LocalCache;
use draftsync::classify::{ErrorCategory, RecommendedAction, classify};
use draftsync::draft::{
    AcademicInfo, Attachment, AttachmentSource, Draft, DraftPatch, FileUpload, PhaseKind,
    RepositorySettings, TeamSpec,
};
use draftsync::engine::{DraftEngine, SkipCause, SyncAttempt, SyncEvent, SyncTrigger};
use draftsync::errors::{RemoteFailure, SyncError};
use draftsync::remote::{DraftId, InMemoryDraftClient, RemoteCall, RemoteOperation, TeamRole};
use draftsync::savers::Step;

fn minimal_draft() -> Draft {
    Draft {
        title: "My Project".into(),
        summary: "x".repeat(60),
        category: Some("educacao".into()),
        ..Default::default()
    }
}

fn full_draft() -> Draft {
    Draft {
        title: "Horta Comunitária".into(),
        summary: "Sensores de umidade e irrigação automática para hortas escolares.".into(),
        category: Some("sustentabilidade".into()),
        academic: AcademicInfo {
            course: Some("Informática".into()),
            class_group: Some("3A".into()),
            modality: Some("integrado".into()),
        },
        team: TeamSpec {
            authors: vec!["a@x.com".into(), "b@x.com".into()],
            advisors: vec!["prof@x.com".into()],
            leader_email: Some("b@x.com".into()),
            current_user_is_leader: false,
        },
        repository: RepositorySettings {
            has_repository: true,
            repository_url: Some("https://git.example.org/horta".into()),
            code_public: true,
            project_public: true,
        },
        terms_accepted: true,
        ..Default::default()
    }
}

fn directory_client() -> InMemoryDraftClient {
    InMemoryDraftClient::new()
        .with_student("a@x.com", "u-a")
        .with_student("b@x.com", "u-b")
        .with_teacher("prof@x.com", "u-prof")
}

struct Harness {
    client: Arc<InMemoryDraftClient>,
    engine: Arc<DraftEngine>,
    cache: LocalCache,
    _dir: TempDir,
}

fn harness(client: InMemoryDraftClient, draft: Draft, step: Step) -> Harness {
    let dir = tempdir().unwrap();
    let client = Arc::new(client);
    let engine = DraftEngine::new(client.clone(), LocalCache::new(dir.path(), "session"))
        .with_draft(draft)
        .with_current_step(step);
    Harness {
        client,
        engine: Arc::new(engine),
        cache: LocalCache::new(dir.path(), "session"),
        _dir: dir,
    }
}

fn operations(client: &InMemoryDraftClient) -> Vec<RemoteOperation> {
    client.calls().iter().map(RemoteCall::operation).collect()
}

fn classification(err: &SyncError) -> &draftsync::Classification {
    err.classification().expect("classified error")
}

// =============================================================================
// Minimum validity gate
// =============================================================================

mod validity_gate {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_valid_draft_reaches_base_step() {
        let h = harness(InMemoryDraftClient::new(), minimal_draft(), Step::Base);

        let attempt = h.engine.try_sync().await;
        let report = attempt.report().expect("cycle ran");
        assert!(report.base_saved());
        assert_eq!(operations(&h.client), vec![RemoteOperation::CreateBase]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_title_is_silent_noop() {
        let draft = Draft {
            title: "Short".into(),
            ..minimal_draft()
        };
        let h = harness(InMemoryDraftClient::new(), draft, Step::Visibility);

        let attempt = h.engine.try_sync().await;
        assert_eq!(attempt, SyncAttempt::Skipped(SkipCause::NotReady));
        assert!(h.client.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_category_is_silent_noop() {
        let draft = Draft {
            category: None,
            ..minimal_draft()
        };
        let h = harness(InMemoryDraftClient::new(), draft, Step::Base);

        assert_eq!(
            h.engine.try_sync().await,
            SyncAttempt::Skipped(SkipCause::NotReady)
        );
        assert!(h.client.calls().is_empty());
    }
}

// =============================================================================
// Identity and step ordering
// =============================================================================

mod identity {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_single_create_then_patches() {
        let h = harness(InMemoryDraftClient::new(), minimal_draft(), Step::Base);

        for n in 0..4 {
            h.engine
                .mutate(DraftPatch::summary("y".repeat(60 + n)))
                .await
                .unwrap();
            h.engine.try_sync().await;
        }

        assert_eq!(h.client.count(RemoteOperation::CreateBase), 1);
        assert_eq!(h.client.count(RemoteOperation::PatchBase), 3);
        assert_eq!(h.engine.identity().await, Some(DraftId::new("draft-1")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_create_retries_as_create() {
        let h = harness(InMemoryDraftClient::new(), minimal_draft(), Step::Base);
        h.client
            .fail_next(RemoteOperation::CreateBase, RemoteFailure::network("offline"));

        h.engine.try_sync().await;
        assert_eq!(h.engine.identity().await, None);
        h.engine.try_sync().await;

        assert_eq!(h.client.count(RemoteOperation::CreateBase), 2);
        assert_eq!(h.client.count(RemoteOperation::PatchBase), 0);
        assert_eq!(h.engine.identity().await, Some(DraftId::new("draft-1")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_steps_never_run_without_identity() {
        let h = harness(directory_client(), full_draft(), Step::Visibility);
        h.client
            .fail_always(RemoteOperation::CreateBase, RemoteFailure::http(500, "boom"));

        let report = h.engine.try_sync().await.report().cloned().unwrap();
        assert_eq!(report.failed_steps(), vec![Step::Base]);
        assert!(report.steps.is_empty());
        assert_eq!(operations(&h.client), vec![RemoteOperation::CreateBase]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resumed_identity_patches() {
        let dir = tempdir().unwrap();
        let client = Arc::new(InMemoryDraftClient::new());
        let engine = DraftEngine::new(client.clone(), LocalCache::new(dir.path(), "s"))
            .with_draft(minimal_draft())
            .with_identity(DraftId::new("draft-42"));

        engine.try_sync().await;
        assert_eq!(
            client.calls(),
            vec![RemoteCall::PatchBase {
                id: "draft-42".into(),
                title: "My Project".into(),
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_steps_run_through_current_step_in_order() {
        let h = harness(directory_client(), full_draft(), Step::Team);

        h.engine.try_sync().await;
        assert_eq!(
            operations(&h.client),
            vec![
                RemoteOperation::CreateBase,
                RemoteOperation::PatchAcademic,
                RemoteOperation::ResolveIdentities,
                RemoteOperation::PatchTeam,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_save_continues_past_failed_step() {
        let h = harness(directory_client(), full_draft(), Step::Visibility);
        h.client.fail_next(
            RemoteOperation::PatchAcademic,
            RemoteFailure::http(500, "boom"),
        );

        let report = h.engine.try_sync().await.report().cloned().unwrap();
        assert_eq!(report.failed_steps(), vec![Step::Academic]);
        assert_eq!(
            report.saved_steps(),
            vec![Step::Base, Step::Team, Step::Phases, Step::Visibility]
        );
        assert!(h.engine.sync_state().await.has_unsaved_changes);
    }

    #[tokio::test(start_paused = true)]
    async fn test_incomplete_sections_are_skipped() {
        let h = harness(InMemoryDraftClient::new(), minimal_draft(), Step::Visibility);

        let report = h.engine.try_sync().await.report().cloned().unwrap();
        assert!(report.is_complete());
        assert_eq!(
            operations(&h.client),
            vec![
                RemoteOperation::CreateBase,
                RemoteOperation::PatchPhases,
                RemoteOperation::PatchVisibility,
            ]
        );
    }
}

// =============================================================================
// Local cache
// =============================================================================

mod cache {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_mutate_writes_cache_eagerly() {
        let h = harness(InMemoryDraftClient::new(), minimal_draft(), Step::Base);

        h.engine
            .mutate(DraftPatch::title("Projeto Solar Escolar"))
            .await
            .unwrap();

        let snapshot = h.cache.load().unwrap().unwrap();
        assert_eq!(snapshot.draft.title, "Projeto Solar Escolar");
        assert!(h.client.calls().is_empty());
        assert!(h.engine.sync_state().await.has_unsaved_changes);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_cycle_clears_cache() {
        let h = harness(InMemoryDraftClient::new(), minimal_draft(), Step::Visibility);
        h.engine.mutate(DraftPatch::title("Projeto Solar")).await.unwrap();

        let report = h.engine.try_sync().await.report().cloned().unwrap();
        assert!(report.cache_cleared);
        assert!(!h.cache.exists());

        let state = h.engine.sync_state().await;
        assert!(!state.has_unsaved_changes);
        assert!(state.last_synced_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_base_keeps_cache() {
        let h = harness(InMemoryDraftClient::new(), minimal_draft(), Step::Visibility);
        h.engine.mutate(DraftPatch::title("Projeto Solar")).await.unwrap();
        h.client
            .fail_next(RemoteOperation::CreateBase, RemoteFailure::network("offline"));

        let report = h.engine.try_sync().await.report().cloned().unwrap();
        assert!(!report.cache_cleared);
        assert!(h.cache.exists());

        let state = h.engine.sync_state().await;
        assert!(state.has_unsaved_changes);
        assert!(state.last_synced_at.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_failure_clears_cache_but_stays_unsaved() {
        let h = harness(directory_client(), full_draft(), Step::Visibility);
        h.engine.mutate(DraftPatch::title("Horta Escolar")).await.unwrap();
        h.client
            .fail_next(RemoteOperation::PatchTeam, RemoteFailure::http(500, "boom"));

        let report = h.engine.try_sync().await.report().cloned().unwrap();
        assert!(report.cache_cleared);
        assert!(!h.cache.exists());
        assert!(h.engine.sync_state().await.has_unsaved_changes);
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_during_cycle_keeps_cache_and_unsaved() {
        let h = harness(
            InMemoryDraftClient::new().with_latency(Duration::from_secs(1)),
            minimal_draft(),
            Step::Base,
        );

        let engine = h.engine.clone();
        let cycle = tokio::spawn(async move { engine.try_sync().await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.engine
            .mutate(DraftPatch::title("Título editado no meio"))
            .await
            .unwrap();

        let attempt = cycle.await.unwrap();
        let report = attempt.report().unwrap();
        assert!(report.base_saved());
        assert!(report.edited_during_cycle);
        assert!(!report.cache_cleared);

        let snapshot = h.cache.load().unwrap().unwrap();
        assert_eq!(snapshot.draft.title, "Título editado no meio");
        assert!(h.engine.sync_state().await.has_unsaved_changes);
    }
}

// =============================================================================
// Reentrancy
// =============================================================================

mod reentrancy {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_trigger_during_cycle_is_dropped() {
        let h = harness(
            InMemoryDraftClient::new().with_latency(Duration::from_secs(2)),
            minimal_draft(),
            Step::Base,
        );

        let engine = h.engine.clone();
        let first = tokio::spawn(async move { engine.try_sync().await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(h.engine.is_syncing());
        assert!(h.engine.sync_state().await.is_syncing);
        assert_eq!(
            h.engine.try_sync().await,
            SyncAttempt::Skipped(SkipCause::Busy)
        );
        assert!(matches!(
            h.engine.save_draft_explicit().await,
            Err(SyncError::Busy)
        ));
        assert!(matches!(h.engine.publish().await, Err(SyncError::Busy)));

        first.await.unwrap();
        assert!(!h.engine.is_syncing());
        assert_eq!(h.client.count(RemoteOperation::CreateBase), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_undrained_event_channel_does_not_block_cycles() {
        let (tx, _rx) = mpsc::channel(1);
        let dir = tempdir().unwrap();
        let client = Arc::new(InMemoryDraftClient::new());
        let engine = DraftEngine::new(client.clone(), LocalCache::new(dir.path(), "s"))
            .with_draft(minimal_draft())
            .with_event_channel(tx);

        let first = tokio::time::timeout(Duration::from_secs(60), engine.try_sync())
            .await
            .expect("cycle finishes with a full event channel");
        assert!(first.report().unwrap().base_saved());
        assert!(!engine.is_syncing());

        engine.mutate(DraftPatch::title("Segundo título salvo")).await.unwrap();
        let second = engine.try_sync().await;
        assert!(matches!(second, SyncAttempt::Ran(_)));
        assert_eq!(client.count(RemoteOperation::PatchBase), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_triggers_run_one_cycle() {
        let h = harness(
            InMemoryDraftClient::new().with_latency(Duration::from_secs(1)),
            minimal_draft(),
            Step::Base,
        );

        let attempts = futures::future::join_all((0..5).map(|_| {
            let engine = h.engine.clone();
            async move { engine.try_sync().await }
        }))
        .await;

        let ran = attempts
            .iter()
            .filter(|a| matches!(a, SyncAttempt::Ran(_)))
            .count();
        assert_eq!(ran, 1);
        assert_eq!(h.client.count(RemoteOperation::CreateBase), 1);
    }
}

// =============================================================================
// Duplicate title during auto-save
// =============================================================================

mod duplicate_title {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_conflict_message_classifies_as_duplicate() {
        let result = classify(Some(409), "Já existe um projeto com este título");
        assert_eq!(result.category, ErrorCategory::DuplicateTitle);
        assert_eq!(result.action, RecommendedAction::Navigate);
        assert_eq!(result.target_step, Some(Step::Base));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_save_holds_until_title_changes() {
        let (tx, mut rx) = mpsc::channel(64);
        let dir = tempdir().unwrap();
        let client = Arc::new(InMemoryDraftClient::new().with_taken_title("My Project"));
        let engine = DraftEngine::new(client.clone(), LocalCache::new(dir.path(), "s"))
            .with_draft(minimal_draft())
            .with_event_channel(tx);

        let report = engine.try_sync().await.report().cloned().unwrap();
        assert_eq!(report.failed_steps(), vec![Step::Base]);

        assert_eq!(
            engine.try_sync().await,
            SyncAttempt::Skipped(SkipCause::DuplicateTitle)
        );
        assert_eq!(client.count(RemoteOperation::CreateBase), 1);

        engine.mutate(DraftPatch::summary("z".repeat(70))).await.unwrap();
        assert_eq!(
            engine.try_sync().await,
            SyncAttempt::Skipped(SkipCause::DuplicateTitle)
        );

        engine.mutate(DraftPatch::title("My Other Project")).await.unwrap();
        assert!(engine.try_sync().await.report().unwrap().is_complete());
        assert_eq!(client.count(RemoteOperation::CreateBase), 2);

        drop(engine);
        let mut warnings = 0;
        while let Some(event) = rx.recv().await {
            if let SyncEvent::DuplicateTitle { title } = event {
                assert_eq!(title, "My Project");
                warnings += 1;
            }
        }
        assert_eq!(warnings, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_save_surfaces_duplicate() {
        let h = harness(
            InMemoryDraftClient::new().with_taken_title("My Project"),
            minimal_draft(),
            Step::Base,
        );

        let err = h.engine.save_draft_explicit().await.unwrap_err();
        let result = classification(&err);
        assert_eq!(result.category, ErrorCategory::DuplicateTitle);
        assert_eq!(result.target_step, Some(Step::Base));
        assert!(*h.engine.subscribe_armed().borrow());
    }
}

// =============================================================================
// Explicit save
// =============================================================================

mod explicit_save {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_validation_blocks_before_any_call() {
        let draft = Draft {
            title: "Curto".into(),
            summary: "breve".into(),
            ..minimal_draft()
        };
        let h = harness(InMemoryDraftClient::new(), draft, Step::Base);

        let err = h.engine.save_draft_explicit().await.unwrap_err();
        let result = classification(&err);
        assert_eq!(result.category, ErrorCategory::Validation);
        assert_eq!(result.details.len(), 2);
        assert!(h.client.calls().is_empty());
        assert!(*h.engine.subscribe_armed().borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_saves_every_step_and_disarms_autosave() {
        let h = harness(directory_client(), full_draft(), Step::Base);

        let report = h.engine.save_draft_explicit().await.unwrap();
        assert_eq!(report.trigger, SyncTrigger::Explicit);
        assert_eq!(report.saved_steps(), Step::ALL.to_vec());
        assert!(!*h.engine.subscribe_armed().borrow());

        let visibility = h.client.calls_of(RemoteOperation::PatchVisibility);
        match &visibility[0] {
            RemoteCall::PatchVisibility { fields, .. } => assert!(!fields.publish),
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_during_save_rearms_autosave() {
        let h = harness(
            InMemoryDraftClient::new().with_latency(Duration::from_secs(1)),
            minimal_draft(),
            Step::Base,
        );

        let engine = h.engine.clone();
        let save = tokio::spawn(async move { engine.save_draft_explicit().await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!*h.engine.subscribe_armed().borrow());
        h.engine
            .mutate(DraftPatch::title("Título editado no meio"))
            .await
            .unwrap();

        let report = save.await.unwrap().unwrap();
        assert!(report.edited_during_cycle);
        assert!(*h.engine.subscribe_armed().borrow());
        assert!(h.engine.sync_state().await.has_unsaved_changes);
        assert_eq!(
            h.cache.load().unwrap().unwrap().draft.title,
            "Título editado no meio"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_save_returns_retry_and_keeps_state() {
        let h = harness(InMemoryDraftClient::new(), minimal_draft(), Step::Base);
        h.engine.mutate(DraftPatch::title("Projeto Solar")).await.unwrap();
        let before = h.engine.draft().await;
        h.client
            .fail_always(RemoteOperation::CreateBase, RemoteFailure::network("offline"));

        let err = h.engine.save_draft_explicit().await.unwrap_err();
        let result = classification(&err);
        assert_eq!(result.category, ErrorCategory::Network);
        assert_eq!(result.action, RecommendedAction::Retry);

        assert_eq!(h.engine.draft().await, before);
        assert_eq!(h.cache.load().unwrap().unwrap().draft.title, "Projeto Solar");
        assert!(h.engine.sync_state().await.has_unsaved_changes);
        assert!(*h.engine.subscribe_armed().borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_at_first_failure() {
        let h = harness(directory_client(), full_draft(), Step::Base);
        h.client
            .fail_next(RemoteOperation::PatchAcademic, RemoteFailure::http(500, "boom"));

        let err = h.engine.save_draft_explicit().await.unwrap_err();
        assert_eq!(classification(&err).category, ErrorCategory::Server);
        assert_eq!(
            operations(&h.client),
            vec![RemoteOperation::CreateBase, RemoteOperation::PatchAcademic]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_uploads_pending_attachment_once() {
        let mut draft = minimal_draft();
        draft.phases.modeling.attachments.push(Attachment::pending(FileUpload::new(
            "diagrama.png",
            "image/png",
            vec![1, 2, 3],
        )));
        let h = harness(InMemoryDraftClient::new(), draft, Step::Base);

        h.engine.save_draft_explicit().await.unwrap();
        h.engine.save_draft_explicit().await.unwrap();

        assert_eq!(h.client.count(RemoteOperation::UploadFile), 1);
        let draft = h.engine.draft().await;
        assert!(matches!(
            draft.phases.modeling.attachments[0].source,
            AttachmentSource::Remote(_)
        ));
    }
}

// =============================================================================
// Publish
// =============================================================================

mod publish {
    use super::*;

    fn team_authors(client: &InMemoryDraftClient) -> Vec<(String, TeamRole)> {
        match &client.calls_of(RemoteOperation::PatchTeam)[0] {
            RemoteCall::PatchTeam { authors, .. } => authors
                .iter()
                .map(|m| (m.email.clone(), m.role))
                .collect(),
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_writes_every_step() {
        let (tx, mut rx) = mpsc::channel(64);
        let dir = tempdir().unwrap();
        let client = Arc::new(directory_client());
        let engine = DraftEngine::new(client.clone(), LocalCache::new(dir.path(), "s"))
            .with_draft(full_draft())
            .with_event_channel(tx);
        engine.mutate(DraftPatch::title("Horta Escolar")).await.unwrap();

        let report = engine.publish().await.unwrap();
        assert_eq!(report.trigger, SyncTrigger::Publish);
        assert_eq!(
            client.calls().iter().map(RemoteCall::operation).collect::<Vec<_>>(),
            vec![
                RemoteOperation::ResolveIdentities,
                RemoteOperation::CreateBase,
                RemoteOperation::PatchAcademic,
                RemoteOperation::PatchTeam,
                RemoteOperation::PatchPhases,
                RemoteOperation::PatchVisibility,
            ]
        );
        match client.calls().last().unwrap() {
            RemoteCall::PatchVisibility { fields, .. } => assert!(fields.publish),
            other => panic!("unexpected call {:?}", other),
        }

        let state = engine.sync_state().await;
        assert!(state.published);
        assert!(!state.has_unsaved_changes);
        assert!(!LocalCache::new(dir.path(), "s").exists());

        drop(engine);
        let mut published = false;
        while let Some(event) = rx.recv().await {
            if let SyncEvent::Published { id } = event {
                assert_eq!(id, DraftId::new("draft-1"));
                published = true;
            }
        }
        assert!(published);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leader_falls_back_to_first_author() {
        let client = InMemoryDraftClient::new()
            .with_student("a@x.com", "u-a")
            .with_student("b@x.com", "u-b");
        let mut draft = full_draft();
        draft.team.advisors.clear();
        draft.team.leader_email = Some("c@x.com".into());
        let h = harness(client, draft, Step::Base);

        h.engine.publish().await.unwrap();
        assert_eq!(
            team_authors(&h.client),
            vec![
                ("a@x.com".to_string(), TeamRole::Leader),
                ("b@x.com".to_string(), TeamRole::Author),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_designated_leader_is_kept() {
        let h = harness(directory_client(), full_draft(), Step::Base);

        h.engine.publish().await.unwrap();
        assert_eq!(
            team_authors(&h.client),
            vec![
                ("a@x.com".to_string(), TeamRole::Author),
                ("b@x.com".to_string(), TeamRole::Leader),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresolved_member_fails_before_any_write() {
        let client = InMemoryDraftClient::new().with_student("a@x.com", "u-a");
        let h = harness(client, full_draft(), Step::Base);

        let err = h.engine.publish().await.unwrap_err();
        let result = classification(&err);
        assert_eq!(result.category, ErrorCategory::InvalidTeam);
        assert_eq!(result.target_step, Some(Step::Team));
        assert_eq!(result.details, vec!["b@x.com", "prof@x.com"]);
        assert_eq!(operations(&h.client), vec![RemoteOperation::ResolveIdentities]);
        assert!(!h.engine.sync_state().await.published);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terms_must_be_accepted() {
        let draft = Draft {
            terms_accepted: false,
            ..full_draft()
        };
        let h = harness(directory_client(), draft, Step::Base);

        let err = h.engine.publish().await.unwrap_err();
        assert_eq!(classification(&err).category, ErrorCategory::TermsNotAccepted);
        assert!(h.client.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_authors_is_leader_undefined() {
        let mut draft = full_draft();
        draft.team.authors.clear();
        let h = harness(directory_client(), draft, Step::Base);

        let err = h.engine.publish().await.unwrap_err();
        assert_eq!(classification(&err).category, ErrorCategory::LeaderUndefined);
        assert!(h.client.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_incomplete_academic_info_is_validation() {
        let mut draft = full_draft();
        draft.academic.modality = None;
        let h = harness(directory_client(), draft, Step::Base);

        let err = h.engine.publish().await.unwrap_err();
        let result = classification(&err);
        assert_eq!(result.category, ErrorCategory::Validation);
        assert_eq!(result.details, vec!["Informe a modalidade"]);
        assert!(h.client.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_rejection_is_classified() {
        let h = harness(directory_client(), full_draft(), Step::Base);
        h.client.fail_next(
            RemoteOperation::PatchTeam,
            RemoteFailure::http(400, "A equipe deve ter exatamente 1 líder"),
        );

        let err = h.engine.publish().await.unwrap_err();
        let result = classification(&err);
        assert_eq!(result.category, ErrorCategory::LeaderUndefined);
        assert_eq!(result.target_step, Some(Step::Team));
        assert!(!h.engine.sync_state().await.published);
        assert!(*h.engine.subscribe_armed().borrow());
        assert_eq!(h.client.count(RemoteOperation::PatchPhases), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_binaries_are_sent_inline() {
        let mut draft = full_draft();
        draft.phases.prototyping.attachments.push(Attachment::pending(FileUpload::new(
            "prototipo.pdf",
            "application/pdf",
            vec![0; 16],
        )));
        draft
            .phases
            .ideation
            .attachments
            .push(Attachment::link("pesquisa", "https://example.org/p"));
        let h = harness(directory_client(), draft, Step::Base);

        h.engine.publish().await.unwrap();
        assert_eq!(h.client.count(RemoteOperation::UploadFile), 0);
        match &h.client.calls_of(RemoteOperation::PatchPhases)[0] {
            RemoteCall::PatchPhases {
                binary_count,
                attachment_counts,
                ..
            } => {
                assert_eq!(*binary_count, 1);
                assert_eq!(attachment_counts, &vec![1, 0, 1, 0]);
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_published_session_refuses_further_writes() {
        let h = harness(directory_client(), full_draft(), Step::Visibility);
        h.engine.publish().await.unwrap();
        h.client.reset_calls();

        assert!(matches!(
            h.engine.publish().await,
            Err(SyncError::AlreadyPublished)
        ));
        assert!(matches!(
            h.engine.save_draft_explicit().await,
            Err(SyncError::AlreadyPublished)
        ));
        assert_eq!(
            h.engine.try_sync().await,
            SyncAttempt::Skipped(SkipCause::Published)
        );
        assert!(h.client.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_during_publish_stays_in_cache() {
        let h = harness(
            directory_client().with_latency(Duration::from_secs(1)),
            full_draft(),
            Step::Visibility,
        );

        let engine = h.engine.clone();
        let publish = tokio::spawn(async move { engine.publish().await });
        tokio::time::sleep(Duration::from_millis(1500)).await;
        h.engine
            .mutate(DraftPatch::title("Horta editada durante o envio"))
            .await
            .unwrap();

        let report = publish.await.unwrap().unwrap();
        assert!(report.edited_during_cycle);
        assert!(!report.cache_cleared);

        let state = h.engine.sync_state().await;
        assert!(state.published);
        assert!(state.has_unsaved_changes);
        let snapshot = h.cache.load().unwrap().unwrap();
        assert_eq!(snapshot.draft.title, "Horta editada durante o envio");
    }
}

// =============================================================================
// Recovery
// =============================================================================

mod recovery {
    use super::*;

    fn cached(dir: &TempDir, title: &str) -> LocalCache {
        let cache = LocalCache::new(dir.path(), "s");
        let draft = Draft {
            title: title.into(),
            ..minimal_draft()
        };
        cache.store(&draft).unwrap();
        cache
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_offered_once() {
        let dir = tempdir().unwrap();
        let cache = cached(&dir, "Projeto Recuperado");
        let engine = DraftEngine::new(Arc::new(InMemoryDraftClient::new()), cache);

        let snapshot = engine.pending_recovery().await.unwrap().unwrap();
        assert_eq!(snapshot.draft.title, "Projeto Recuperado");
        assert!(engine.pending_recovery().await.unwrap().is_none());

        engine.recover_from_cache(&snapshot).await;
        assert_eq!(engine.draft().await.title, "Projeto Recuperado");
        assert!(engine.sync_state().await.has_unsaved_changes);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_recovery_when_resuming_known_draft() {
        let dir = tempdir().unwrap();
        let cache = cached(&dir, "Projeto Recuperado");
        let engine = DraftEngine::new(Arc::new(InMemoryDraftClient::new()), cache)
            .with_identity(DraftId::new("draft-7"));

        assert!(engine.pending_recovery().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_wakes_scheduler() {
        let dir = tempdir().unwrap();
        let cache = cached(&dir, "Projeto Recuperado");
        let engine = DraftEngine::new(Arc::new(InMemoryDraftClient::new()), cache);
        let mut edits = engine.subscribe_edits();

        let snapshot = engine.pending_recovery().await.unwrap().unwrap();
        engine.recover_from_cache(&snapshot).await;
        assert!(edits.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_discard_deletes_snapshot() {
        let dir = tempdir().unwrap();
        let cache = cached(&dir, "Projeto Recuperado");
        let engine = DraftEngine::new(Arc::new(InMemoryDraftClient::new()), cache);

        engine.discard_cache().unwrap();
        assert!(!LocalCache::new(dir.path(), "s").exists());
        engine.discard_cache().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovered_draft_syncs() {
        let dir = tempdir().unwrap();
        let cache = cached(&dir, "Projeto Recuperado");
        let client = Arc::new(InMemoryDraftClient::new());
        let engine = DraftEngine::new(client.clone(), cache);

        let snapshot = engine.pending_recovery().await.unwrap().unwrap();
        engine.recover_from_cache(&snapshot).await;
        engine.try_sync().await;

        assert_eq!(
            client.calls(),
            vec![RemoteCall::CreateBase {
                title: "Projeto Recuperado".into(),
            }]
        );
        assert!(!LocalCache::new(dir.path(), "s").exists());
    }
}

// =============================================================================
// Scheduler wiring
// =============================================================================

mod scheduling {
    use super::*;
    use draftsync::{AutoSaveScheduler, AutoSaveTimings};

    #[tokio::test(start_paused = true)]
    async fn test_typing_session_syncs_after_quiet_period() {
        let h = harness(InMemoryDraftClient::new(), minimal_draft(), Step::Phases);
        let handle = AutoSaveScheduler::spawn(h.engine.clone(), AutoSaveTimings::default());
        tokio::task::yield_now().await;

        h.engine
            .mutate(DraftPatch::phase_description(PhaseKind::Ideation, "Entrevistas"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert_eq!(h.client.count(RemoteOperation::CreateBase), 1);
        assert_eq!(h.client.count(RemoteOperation::PatchPhases), 1);
        assert!(!h.engine.sync_state().await.has_unsaved_changes);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_save_cancels_timers() {
        let h = harness(InMemoryDraftClient::new(), minimal_draft(), Step::Base);
        let _handle = AutoSaveScheduler::spawn(h.engine.clone(), AutoSaveTimings::default());
        tokio::task::yield_now().await;

        h.engine.save_draft_explicit().await.unwrap();
        h.client.reset_calls();
        tokio::task::yield_now().await;

        h.engine.mutate(DraftPatch::title("Projeto Alterado")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(130)).await;
        assert!(h.client.calls().is_empty());
    }
}
