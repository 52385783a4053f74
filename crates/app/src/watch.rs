use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio::sync::mpsc;

use crate::pipeline::{DocumentFailure, Stage};

/// True for `*.pdf` files, any case.
pub fn is_statement(path: &Path) -> bool {
    path.extension().is_some_and(|x| x.eq_ignore_ascii_case("pdf"))
}

/// Statements in `dir`, sorted by path.
pub fn list_statements(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_statement(p))
        .collect();
    paths.sort();
    Ok(paths)
}

/// Spawn a notify watcher on `watch_dir` that sends new statement paths to `tx`.
/// Returns the watcher; it must be kept alive for watching to continue.
pub fn spawn_statement_watcher(
    watch_dir: &Path,
    tx: mpsc::Sender<PathBuf>,
) -> notify::Result<impl notify::Watcher> {
    use notify::{EventKind, RecursiveMode, Watcher};

    let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
        match event {
            Ok(ev) if matches!(ev.kind, EventKind::Create(_) | EventKind::Modify(_)) => {
                for path in ev.paths.into_iter().filter(|p| is_statement(p)) {
                    if tx.try_send(path).is_err() {
                        tracing::warn!("statement queue full; event dropped");
                    }
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "watch error"),
        }
    })?;

    watcher.watch(watch_dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

/// Document ids already processed this session.
#[derive(Debug, Default)]
pub struct SeenStatements {
    ids: HashSet<String>,
}

impl SeenStatements {
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Records a processed statement; `failure` is `None` on success.
    /// A statement that failed to decrypt stays unrecorded so the next
    /// rescan tries it again.
    pub fn settle(&mut self, id: &str, failure: Option<&DocumentFailure>) {
        if failure.map_or(true, |f| f.stage != Stage::Decrypt) {
            self.ids.insert(id.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
