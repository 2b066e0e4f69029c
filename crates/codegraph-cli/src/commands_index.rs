//! `codegraph index` and `codegraph watch`.

use codegraph_core::{CodegraphConfig, GraphStore, Repository};
use codegraph_engine::{ContextService, Indexer, Scheduler};
use codegraph_watch::{ChangeKind, FileWatcher};
use crossbeam_channel::select;
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

fn start_scheduler(config: &CodegraphConfig, root: &Path) -> anyhow::Result<Arc<Scheduler>> {
    let store = crate::open_store(config)?;
    let indexer = Indexer::new(root, store, &config.index)?;
    Ok(Arc::new(Scheduler::start(
        indexer,
        config.index.workers,
        config.retry.clone(),
    )))
}

/// Reconcile the tree and block until every queued file is done.
fn index_tree(scheduler: &Scheduler) -> anyhow::Result<()> {
    let started = Instant::now();
    let summary = scheduler.reconcile()?;
    let total = summary.queued + summary.deletions;
    while !scheduler.wait_idle(PROGRESS_INTERVAL)? {
        let status = scheduler.status()?;
        tracing::info!("Indexing: {}/{} files processed", status.processed, total);
    }
    let status = scheduler.status()?;
    tracing::info!(
        "Indexed {} files in {:.2}s ({} deletions)",
        summary.scanned,
        started.elapsed().as_secs_f64(),
        summary.deletions
    );
    for failure in &status.failed {
        tracing::warn!("Failed: {}: {}", failure.path, failure.error);
    }
    Ok(())
}

pub(crate) fn cmd_index(
    config: &CodegraphConfig,
    root: &Path,
    is_dependency: bool,
) -> anyhow::Result<()> {
    let scheduler = start_scheduler(config, root)?;
    index_tree(&scheduler)?;

    let store = scheduler.indexer().upsert().store().clone();
    store.register_repository(&Repository {
        path: root.to_string_lossy().into_owned(),
        name: root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.to_string_lossy().into_owned()),
        is_dependency,
        indexed_at: chrono::Utc::now(),
    })?;

    let status = scheduler.status()?;
    scheduler.shutdown();
    print_summary(store.as_ref(), status.failed.len())?;
    if !status.failed.is_empty() {
        anyhow::bail!("{} files failed to index", status.failed.len());
    }
    Ok(())
}

fn print_summary(store: &dyn GraphStore, failed: usize) -> anyhow::Result<()> {
    let stats = store.stats()?;
    println!("Indexing complete:");
    println!("  Files:       {}", stats.file_count);
    println!("  Nodes:       {}", stats.node_count);
    println!(
        "  Edges:       {} ({} unresolved)",
        stats.edge_count, stats.unresolved_edge_count
    );
    let mut kinds: Vec<_> = stats.node_kind_counts.iter().collect();
    kinds.sort();
    for (kind, count) in kinds {
        println!("    {kind:<10} {count}");
    }
    if failed > 0 {
        println!("  Failed:      {failed}");
    }
    Ok(())
}

pub(crate) fn cmd_watch(config: &CodegraphConfig, root: &Path, serve: bool) -> anyhow::Result<()> {
    let scheduler = start_scheduler(config, root)?;
    index_tree(&scheduler)?;

    let known = scheduler
        .indexer()
        .tracker()?
        .known_paths()
        .into_iter()
        .map(|p| root.join(p));
    let watcher = FileWatcher::new(
        root,
        &config.watch,
        scheduler.indexer().filter().clone(),
        known,
    )?;

    if serve {
        let store: Arc<dyn GraphStore> = scheduler.indexer().upsert().store().clone();
        let service =
            ContextService::new(store, config.clone()).with_scheduler(Arc::clone(&scheduler));
        std::thread::Builder::new()
            .name("codegraph-serve".into())
            .spawn(move || {
                if let Err(e) = serve_stdin(&service) {
                    tracing::error!("Context service stopped: {e}");
                }
            })?;
    }

    eprintln!("Watching {} for file changes (Ctrl+C to stop)", root.display());
    let relink = crossbeam_channel::tick(Duration::from_secs(
        config.watch.relink_interval_secs.max(1),
    ));
    loop {
        select! {
            recv(watcher.receiver()) -> event => {
                let Ok(event) = event else { break };
                let label = match event.kind {
                    ChangeKind::Created => "created",
                    ChangeKind::Modified => "modified",
                    ChangeKind::Deleted => "deleted",
                };
                tracing::debug!("[{label}] {}", event.path.display());
                if let Err(e) = scheduler.enqueue_path(&event.path) {
                    tracing::error!("Failed to queue {}: {e}", event.path.display());
                }
            }
            recv(relink) -> _ => {
                match scheduler.relink_unresolved() {
                    Ok(0) => {}
                    Ok(linked) => tracing::info!("Linked {linked} waiting edges"),
                    Err(e) => tracing::warn!("Relink sweep failed: {e}"),
                }
            }
        }
    }

    scheduler.shutdown();
    Ok(())
}

/// Answer JSON requests from stdin, one per line, until EOF.
pub(crate) fn serve_stdin(service: &ContextService) -> anyhow::Result<()> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = service.handle_line(&line);
        let json = serde_json::to_string(&response)?;
        writeln!(stdout, "{json}")?;
        stdout.flush()?;
    }
    Ok(())
}
