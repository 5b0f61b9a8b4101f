//! Draft commands: `draftsync save`, `draftsync publish`, `draftsync sync`.
//!
//! Each command loads a JSON draft document, builds a [`DraftEngine`] around
//! it and runs one engine operation. The draft is written to the local cache
//! first so a failed run leaves a recovery record behind.

use anyhow::{Context, Result, anyhow};
use console::style;
use std::sync::Arc;

use draftsync::cache::LocalCache;
use draftsync::config::DraftsyncConfig;
use draftsync::draft::Draft;
use draftsync::engine::{CycleReport, DraftEngine, SyncAttempt};
use draftsync::errors::SyncError;
use draftsync::remote::{DraftId, HttpDraftClient, InMemoryDraftClient, RemoteDraftClient};
use draftsync::savers::{Step, StepOutcome};
use draftsync::{Classification, classify_failure};

use super::super::DraftArgs;

fn session_key(args: &DraftArgs) -> String {
    args.session.clone().unwrap_or_else(|| {
        args.draft
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    })
}

fn build_engine(
    config: &DraftsyncConfig,
    args: &DraftArgs,
    client: Arc<dyn RemoteDraftClient>,
) -> Result<DraftEngine> {
    let draft = Draft::load(&args.draft)?;
    let cache = LocalCache::new(&config.cache_dir(), &session_key(args));
    if config.is_initialized() {
        cache
            .store(&draft)
            .with_context(|| format!("Failed to cache draft at {}", cache.path().display()))?;
    }
    Ok(engine_for(config, args, draft, cache, client))
}

fn engine_for(
    config: &DraftsyncConfig,
    args: &DraftArgs,
    draft: Draft,
    cache: LocalCache,
    client: Arc<dyn RemoteDraftClient>,
) -> DraftEngine {
    let mut engine = DraftEngine::new(client, cache)
        .with_draft(draft)
        .with_rules(config.validation_rules())
        .with_current_user(config.user_email().map(str::to_string));
    if let Some(id) = &args.draft_id {
        engine = engine.with_identity(DraftId::new(id.clone()));
    }
    engine
}

fn http_client(config: &DraftsyncConfig) -> Result<Arc<dyn RemoteDraftClient>> {
    Ok(Arc::new(HttpDraftClient::from_config(&config.toml.remote)?))
}

/// Explicit save, or a best-effort cycle through `step` when one is given.
pub async fn cmd_save(config: &DraftsyncConfig, args: &DraftArgs, step: Option<u8>) -> Result<()> {
    let engine = build_engine(config, args, http_client(config)?)?;

    match step {
        Some(n) => {
            let step = Step::from_number(n).ok_or_else(|| anyhow!("No such step: {}", n))?;
            let attempt = engine.with_current_step(step).try_sync().await;
            finish_attempt(attempt)
        }
        None => match engine.save_draft_explicit().await {
            Ok(report) => {
                print_report("Saved", &report);
                Ok(())
            }
            Err(e) => Err(sync_failure(e)),
        },
    }
}

pub async fn cmd_publish(config: &DraftsyncConfig, args: &DraftArgs) -> Result<()> {
    let engine = build_engine(config, args, http_client(config)?)?;
    match engine.publish().await {
        Ok(report) => {
            print_report("Published", &report);
            Ok(())
        }
        Err(e) => Err(sync_failure(e)),
    }
}

/// One auto-save cycle through every step.
///
/// With `dry_run` the cycle runs against an in-memory remote on which every
/// team address resolves, and the calls it received are printed as JSON. The
/// session's cache record is neither written nor cleared.
pub async fn cmd_sync(config: &DraftsyncConfig, args: &DraftArgs, dry_run: bool) -> Result<()> {
    if !dry_run {
        let engine = build_engine(config, args, http_client(config)?)?;
        let attempt = engine.with_current_step(Step::Visibility).try_sync().await;
        return finish_attempt(attempt);
    }

    // The session's real cache record is left alone; the cycle gets a scratch one.
    let scratch = tempfile::tempdir().context("Failed to create scratch cache directory")?;
    let draft = Draft::load(&args.draft)?;
    let client = Arc::new(dry_run_client(&draft));
    let cache = LocalCache::new(scratch.path(), &session_key(args));
    let engine = engine_for(config, args, draft, cache, client.clone())
        .with_current_step(Step::Visibility);
    let attempt = engine.try_sync().await;
    if let SyncAttempt::Skipped(cause) = &attempt {
        eprintln!("{} sync skipped: {:?}", style("!").yellow(), cause);
    }

    let json = serde_json::to_string_pretty(&client.calls()).context("Failed to serialize calls")?;
    println!("{}", json);
    Ok(())
}

fn dry_run_client(draft: &Draft) -> InMemoryDraftClient {
    let mut client = InMemoryDraftClient::new();
    for (i, email) in draft.team.authors.iter().enumerate() {
        client = client.with_student(email, &format!("student-{}", i + 1));
    }
    for (i, email) in draft.team.advisors.iter().enumerate() {
        client = client.with_teacher(email, &format!("teacher-{}", i + 1));
    }
    client
}

fn finish_attempt(attempt: SyncAttempt) -> Result<()> {
    match attempt {
        SyncAttempt::Skipped(cause) => {
            println!("{} Nothing synced: {:?}", style("!").yellow(), cause);
            Ok(())
        }
        SyncAttempt::Ran(report) => {
            print_report("Synced", &report);
            match report.first_failure() {
                Some(failure) => Err(print_classification(&classify_failure(&failure.failure))),
                None => Ok(()),
            }
        }
    }
}

fn print_report(verb: &str, report: &CycleReport) {
    match &report.identity {
        Some(id) => println!("{} draft {}", style(verb).green().bold(), id),
        None => println!("{} nothing: no remote draft yet", style(verb).yellow().bold()),
    }
    for step in &report.steps {
        match step.outcome {
            StepOutcome::Saved => println!("  {} {}", style("✓").green(), step.step),
            StepOutcome::Skipped(reason) => {
                println!("  {} {} skipped: {}", style("-").dim(), step.step, reason)
            }
        }
    }
    for failure in &report.failures {
        println!("  {} {}", style("✗").red(), failure);
    }
    if report.edited_during_cycle {
        println!("  {}", style("Draft changed during the cycle; still unsaved").dim());
    }
}

fn sync_failure(error: SyncError) -> anyhow::Error {
    match error {
        SyncError::Classified(classification) => print_classification(&classification),
        other => other.into(),
    }
}

/// Print a classification to stderr and turn it into the command's error.
fn print_classification(classification: &Classification) -> anyhow::Error {
    eprintln!();
    eprintln!("{}", style(&classification.title).red().bold());
    eprintln!("{}", style(&classification.subtitle).dim());
    eprintln!();
    eprintln!("{}", classification.message);
    for detail in &classification.details {
        eprintln!("  - {}", detail);
    }
    eprintln!();
    match classification.target_step {
        Some(step) => eprintln!("Recommended: go back to {}", step),
        None => eprintln!("Recommended: {:?}", classification.action),
    }
    if classification.category.is_transient() {
        eprintln!("{}", style("The draft is kept in the local cache.").dim());
    }
    anyhow!("{}", classification.title)
}

