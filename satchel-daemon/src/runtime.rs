//! Engine runtime: one full reconciliation at startup, then a live loop
//! mapping filesystem events to single-key actions.
//!
//! Task topology mirrors the startup sequence:
//! - `watcher_task` owns the notify subscription and bridges classified
//!   events into an mpsc channel, debouncing create/write bursts per path;
//! - `processor_task` is the only consumer: it applies one action per
//!   event, strictly sequentially, so same-key actions can never reorder
//!   or race, and it alone touches the sync cache;
//! - a signal task turns ctrl-c into the broadcast stop signal.
//!
//! Remote-side changes made by another writer are *not* seen here; they
//! surface at the next startup reconciliation. That asymmetry is part of
//! the design, not an oversight.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::event::{ModifyKind, RenameMode};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use satchel_core::{config, Config, SyncAction, SyncKey};
use satchel_sync::{diff, scan, ObjectStore, RemoteStore, SyncCache, SyncError};

use crate::error::DaemonError;

/// Ignore repeat create/write events for a path within this window.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Engine state and context
// ---------------------------------------------------------------------------

/// Engine lifecycle, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Initializing,
    Reconciling,
    Watching,
    ShuttingDown,
    Closed,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Initializing => write!(f, "initializing"),
            EngineState::Reconciling => write!(f, "reconciling"),
            EngineState::Watching => write!(f, "watching"),
            EngineState::ShuttingDown => write!(f, "shutting-down"),
            EngineState::Closed => write!(f, "closed"),
        }
    }
}

fn transition(state: EngineState) {
    tracing::info!(state = %state, "engine state");
}

/// Everything the engine needs, constructed once at startup and passed
/// explicitly to every task — no process-wide singletons.
pub struct EngineContext<S> {
    pub config: Config,
    pub cache: SyncCache,
    pub store: Arc<S>,
}

/// One filesystem change, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub op: WatchOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOp {
    Create,
    Write,
    Remove,
    Rename,
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Initialize and run the engine against the real S3 store.
pub async fn run(home: PathBuf, config: Config) -> Result<(), DaemonError> {
    transition(EngineState::Initializing);
    config.validate()?;

    let mut config = config;
    // Canonicalize so that watcher paths (which arrive as real paths, e.g.
    // /private/var/... on macOS) strip against the same root.
    config.root = std::fs::canonicalize(&config.root).unwrap_or(config.root);

    let cache = SyncCache::open_at(&config::cache_db_path_at(&home))?;
    let store = Arc::new(RemoteStore::new(&config));

    run_engine(EngineContext {
        config,
        cache,
        store,
    })
    .await
}

/// Run the reconcile-then-watch loop over an already-built context.
pub async fn run_engine<S>(ctx: EngineContext<S>) -> Result<(), DaemonError>
where
    S: ObjectStore + 'static,
{
    transition(EngineState::Reconciling);
    reconcile_once(&ctx).await?;

    transition(EngineState::Watching);
    let root = ctx.config.root.clone();
    let (event_tx, event_rx) = mpsc::unbounded_channel::<WatchEvent>();
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let result = watcher_task(root, event_tx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let result = processor_task(ctx, event_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, stopping engine");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Engine(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (watcher_result, processor_result, signal_result) =
        tokio::join!(watcher_handle, processor_handle, signal_handle);

    handle_join("watcher", watcher_result)?;
    handle_join("processor", processor_result)?;
    handle_join("signal_handler", signal_result)?;

    transition(EngineState::Closed);
    Ok(())
}

// ---------------------------------------------------------------------------
// Full reconciliation
// ---------------------------------------------------------------------------

/// Scan, list, diff, apply. A failure to scan or list aborts the pass;
/// a failure on a single key is logged and the pass moves on.
async fn reconcile_once<S: ObjectStore>(ctx: &EngineContext<S>) -> Result<(), DaemonError> {
    let root = ctx.config.root.clone();
    let local = tokio::task::spawn_blocking(move || scan(&root))
        .await
        .map_err(|err| DaemonError::Engine(format!("scan task join error: {err}")))??;
    let remote = ctx.store.list().await?;

    let actions = diff(&local, &remote, &ctx.cache, ctx.config.add_only)?;
    tracing::info!(
        local = local.len(),
        remote = remote.len(),
        actions = actions.len(),
        "reconciliation computed",
    );

    let mut applied = 0usize;
    let mut failed = 0usize;
    for action in &actions {
        match apply_action(&ctx.config, ctx.store.as_ref(), &ctx.cache, action).await {
            Ok(()) => applied += 1,
            Err(err) => {
                failed += 1;
                tracing::error!(key = %action.key(), error = %err, "action failed; continuing with next key");
            }
        }
    }
    tracing::info!(applied, failed, "reconciliation pass finished");
    Ok(())
}

/// Apply one action and record its outcome in the cache.
///
/// The cache write happens only after the remote call succeeded, so a
/// cache entry never refers to an ETag the store did not confirm.
async fn apply_action<S: ObjectStore>(
    config: &Config,
    store: &S,
    cache: &SyncCache,
    action: &SyncAction,
) -> Result<(), SyncError> {
    match action {
        SyncAction::Upload(key) => {
            let path = key.to_path(&config.root);
            let transfer = store.upload(&path).await?;
            cache.set(&transfer.key, &transfer.etag)?;
        }
        SyncAction::Download(key, etag) => {
            let path = key.to_path(&config.root);
            let transfer = store.download(&path, etag).await?;
            cache.set(&transfer.key, &transfer.etag)?;
        }
        SyncAction::Delete(key) => {
            let path = key.to_path(&config.root);
            let deleted = store.delete(&path).await?;
            cache.delete(&deleted)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Watcher task
// ---------------------------------------------------------------------------

async fn watcher_task(
    root: PathBuf,
    events: mpsc::UnboundedSender<WatchEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = raw_tx.send(event);
    })?;
    watcher.watch(&root, RecursiveMode::Recursive)?;
    tracing::info!(root = %root.display(), "watching");

    let mut debounce = HashMap::<PathBuf, Instant>::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            raw = raw_rx.recv() => {
                let Some(raw) = raw else { break };
                let event = match raw {
                    Ok(event) => event,
                    Err(err) => {
                        // Delivery failures are reported, never fatal to
                        // the subscription.
                        tracing::warn!(error = %err, "watch error");
                        continue;
                    }
                };

                for (path, op) in classify(&event) {
                    tracing::debug!(path = %path.display(), op = ?op, "filesystem event");

                    if matches!(op, WatchOp::Create | WatchOp::Write)
                        && !should_process_event(&mut debounce, &path, Instant::now())
                    {
                        continue;
                    }

                    if events.send(WatchEvent { path, op }).is_err() {
                        // Processor is gone; nothing left to deliver to.
                        return Ok(());
                    }
                }
            }
        }
    }

    Ok(())
}

/// Map a notify event onto per-path operations.
///
/// A rename arrives as Name-modify events: the old path behaves as a
/// removal, the new path as a creation. Everything else under Modify is
/// a content write.
fn classify(event: &Event) -> Vec<(PathBuf, WatchOp)> {
    let with = |op: WatchOp| -> Vec<(PathBuf, WatchOp)> {
        event.paths.iter().map(|p| (p.clone(), op)).collect()
    };

    match &event.kind {
        EventKind::Create(_) => with(WatchOp::Create),
        EventKind::Remove(_) => with(WatchOp::Remove),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => vec![
            (event.paths[0].clone(), WatchOp::Rename),
            (event.paths[1].clone(), WatchOp::Create),
        ],
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => with(WatchOp::Create),
        EventKind::Modify(ModifyKind::Name(_)) => with(WatchOp::Rename),
        EventKind::Modify(_) => with(WatchOp::Write),
        _ => Vec::new(),
    }
}

fn should_process_event(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
) -> bool {
    should_process_event_with_threshold(debounce, path, now, DEBOUNCE_WINDOW)
}

fn should_process_event_with_threshold(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
    threshold: Duration,
) -> bool {
    debounce.retain(|_, seen_at| now.duration_since(*seen_at) <= Duration::from_secs(30));
    match debounce.get(path) {
        Some(last_seen) if now.duration_since(*last_seen) < threshold => false,
        _ => {
            debounce.insert(path.to_path_buf(), now);
            true
        }
    }
}

// ---------------------------------------------------------------------------
// Processor task
// ---------------------------------------------------------------------------

async fn processor_task<S: ObjectStore>(
    ctx: EngineContext<S>,
    mut events: mpsc::UnboundedReceiver<WatchEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_event = events.recv() => {
                let Some(event) = maybe_event else { break };
                handle_event(&ctx, event).await;
            }
        }
    }

    // The current action finished before the loop saw the stop signal;
    // all committed cache writes are already durable.
    transition(EngineState::ShuttingDown);
    ctx.cache.close()?;
    Ok(())
}

/// Map one filesystem event to its single-key action and apply it.
async fn handle_event<S: ObjectStore>(ctx: &EngineContext<S>, event: WatchEvent) {
    let Some(key) = SyncKey::from_path(&ctx.config.root, &event.path) else {
        tracing::debug!(path = %event.path.display(), "event outside the keyed tree; ignoring");
        return;
    };

    let action = match event.op {
        WatchOp::Create | WatchOp::Write => {
            if event.path.is_dir() {
                tracing::debug!(key = %key, "directory event; nothing to upload");
                return;
            }
            SyncAction::Upload(key)
        }
        WatchOp::Remove | WatchOp::Rename => {
            if ctx.config.add_only {
                tracing::debug!(key = %key, "add-only mode: removal not propagated");
                return;
            }
            SyncAction::Delete(key)
        }
    };

    if let Err(err) = apply_action(&ctx.config, ctx.store.as_ref(), &ctx.cache, &action).await {
        tracing::error!(action = %action, error = %err, "watch action failed; continuing");
    }
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Engine(format!("{task} task join failure: {err}"))),
    }
}
