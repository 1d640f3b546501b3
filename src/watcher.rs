//! Filesystem watch loop for continuous synchronization.
//!
//! Raw notify events are filtered through the same ignore rules as the
//! enumerator (so writes to the context store never re-trigger analysis),
//! then coalesced with a sliding debounce window: each new event restarts
//! the window, and one flush covers everything that arrived since the last
//! one. While a flush's analysis run is in flight, new events queue up for
//! the next window rather than starting a concurrent run.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use std::collections::BTreeSet;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::analysis::run_incremental_analysis;
use crate::context::AppContext;
use crate::files::{is_candidate, parse_dacignore};

/// A running watch loop. Dropping it without [`Watcher::stop`] aborts the
/// loop without a final flush.
pub struct Watcher {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
    // Keeps the OS watch registered for the lifetime of the loop
    _fs_watcher: RecommendedWatcher,
}

impl Watcher {
    /// Register a recursive watch on the project root and spawn the
    /// debounce loop. Each flushed batch triggers one incremental analysis
    /// run.
    pub fn start(ctx: Arc<AppContext>) -> Result<Self> {
        let ignore = parse_dacignore(&ctx.project_root)?;
        let root = ctx.project_root.clone();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut fs_watcher =
            notify::recommended_watcher(move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !matches!(
                        event.kind,
                        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                    ) {
                        return;
                    }
                    for path in event.paths {
                        if is_candidate(&root, &path, &ignore) {
                            let _ = tx.send(path);
                        }
                    }
                }
                Err(e) => error!(error = %e, "watch error"),
            })
            .context("failed to create filesystem watcher")?;
        fs_watcher
            .watch(&ctx.project_root, RecursiveMode::Recursive)
            .with_context(|| format!("failed to watch {}", ctx.project_root.display()))?;

        info!(root = %ctx.project_root.display(), "watching for changes");

        let (shutdown, shutdown_rx) = oneshot::channel();
        let window = Duration::from_millis(ctx.config.watch.debounce_ms);
        let handle = tokio::spawn(async move {
            debounce_loop(rx, shutdown_rx, window, move |paths| {
                let ctx = ctx.clone();
                async move {
                    info!(changed = paths.len(), "flushing change batch");
                    if let Err(e) = run_incremental_analysis(&ctx).await {
                        error!(error = %e, "analysis run failed; retrying on next change");
                    }
                }
            })
            .await;
        });

        Ok(Self {
            shutdown,
            handle,
            _fs_watcher: fs_watcher,
        })
    }

    /// Stop the loop, flushing any pending batch first.
    pub async fn stop(self) -> Result<()> {
        let _ = self.shutdown.send(());
        self.handle.await.context("watch loop panicked")?;
        Ok(())
    }
}

/// Coalesce events into batches: a batch flushes once `window` has elapsed
/// with no new event, or on shutdown. Exits when the event channel closes
/// or shutdown fires.
async fn debounce_loop<F, Fut>(
    mut events: mpsc::UnboundedReceiver<PathBuf>,
    mut shutdown: oneshot::Receiver<()>,
    window: Duration,
    mut flush: F,
) where
    F: FnMut(Vec<PathBuf>) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut pending: BTreeSet<PathBuf> = BTreeSet::new();
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                if !pending.is_empty() {
                    flush(pending.into_iter().collect()).await;
                }
                return;
            }
            event = events.recv() => {
                match event {
                    Some(path) => {
                        debug!(path = %path.display(), "change observed");
                        pending.insert(path);
                        // Sliding window: every event pushes the flush out
                        deadline = Some(Instant::now() + window);
                    }
                    None => {
                        if !pending.is_empty() {
                            flush(pending.into_iter().collect()).await;
                        }
                        return;
                    }
                }
            }
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                if deadline.is_some() =>
            {
                deadline = None;
                flush(std::mem::take(&mut pending).into_iter().collect()).await;
            }
        }
    }
}
