use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::event_bus::{Event, EventEmitter, FileEvent};

#[derive(Debug, Error, Diagnostic)]
pub enum WorkspaceError {
    /// A relative path escaped the workspace root.
    #[error("path '{path}' resolves outside the workspace root")]
    #[diagnostic(
        code(pipewright::workspace::outside_root),
        help("Workspace paths must stay under the root; remove '..' segments or absolute prefixes.")
    )]
    OutsideRoot { path: String },

    #[error("workspace root '{root}' is not usable: {message}")]
    #[diagnostic(code(pipewright::workspace::bad_root))]
    BadRoot { root: String, message: String },
}

/// A directory tree a pipeline executes against.
pub trait Workspace: Send + Sync {
    fn root(&self) -> &Path;

    /// Whether `relative` exists under the root.
    fn exists(&self, relative: &str) -> bool;

    /// Resolve `relative` to an absolute path, rejecting traversal outside
    /// the root.
    fn resolve(&self, relative: &str) -> Result<PathBuf, WorkspaceError>;
}

/// Local-filesystem workspace rooted at a directory.
pub struct LocalWorkspace {
    root: PathBuf,
}

impl LocalWorkspace {
    /// Create (if needed) and canonicalize the root directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, WorkspaceError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| WorkspaceError::BadRoot {
            root: root.display().to_string(),
            message: e.to_string(),
        })?;
        let root = root.canonicalize().map_err(|e| WorkspaceError::BadRoot {
            root: root.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { root })
    }
}

impl Workspace for LocalWorkspace {
    fn root(&self) -> &Path {
        &self.root
    }

    fn exists(&self, relative: &str) -> bool {
        self.resolve(relative)
            .map(|path| path.exists())
            .unwrap_or(false)
    }

    fn resolve(&self, relative: &str) -> Result<PathBuf, WorkspaceError> {
        let candidate = Path::new(relative);
        if candidate.is_absolute() {
            return Err(WorkspaceError::OutsideRoot {
                path: relative.to_string(),
            });
        }
        // Normalize lexically: any '..' that would climb past the root is a
        // traversal attempt, independent of what exists on disk.
        let mut depth: i64 = 0;
        for component in candidate.components() {
            match component {
                Component::Normal(_) => depth += 1,
                Component::ParentDir => {
                    depth -= 1;
                    if depth < 0 {
                        return Err(WorkspaceError::OutsideRoot {
                            path: relative.to_string(),
                        });
                    }
                }
                Component::CurDir => {}
                Component::RootDir | Component::Prefix(_) => {
                    return Err(WorkspaceError::OutsideRoot {
                        path: relative.to_string(),
                    });
                }
            }
        }
        Ok(self.root.join(candidate))
    }
}

/// Locator-registered manager holding the current workspace.
pub struct WorkspaceManager {
    current: RwLock<Arc<dyn Workspace>>,
}

impl WorkspaceManager {
    pub fn new(workspace: Arc<dyn Workspace>) -> Self {
        Self {
            current: RwLock::new(workspace),
        }
    }

    /// Manager rooted at a fresh local directory.
    pub fn local(root: impl Into<PathBuf>) -> Result<Self, WorkspaceError> {
        Ok(Self::new(Arc::new(LocalWorkspace::new(root)?)))
    }

    #[must_use]
    pub fn current(&self) -> Arc<dyn Workspace> {
        Arc::clone(&self.current.read())
    }

    pub fn set_current(&self, workspace: Arc<dyn Workspace>) {
        *self.current.write() = workspace;
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    len: u64,
    modified: Option<SystemTime>,
}

/// Scan-diff watcher publishing workspace file events on the bus.
///
/// Each [`Self::scan`] walks the workspace root, diffs against the previous
/// snapshot, and emits `FileCreated`/`FileModified`/`FileDeleted` events.
/// Drive it from a periodic task or call it at stage boundaries.
pub struct WorkspaceWatcher {
    workspace: Arc<dyn Workspace>,
    emitter: Arc<dyn EventEmitter>,
    seen: Mutex<FxHashMap<PathBuf, FileStamp>>,
}

impl WorkspaceWatcher {
    pub fn new(workspace: Arc<dyn Workspace>, emitter: Arc<dyn EventEmitter>) -> Self {
        Self {
            workspace,
            emitter,
            seen: Mutex::new(FxHashMap::default()),
        }
    }

    /// Walk the tree once and publish one event per observed change.
    /// Returns the events for callers that want them directly.
    pub fn scan(&self) -> Vec<FileEvent> {
        let mut current: FxHashMap<PathBuf, FileStamp> = FxHashMap::default();
        collect_files(self.workspace.root(), &mut current);

        let mut events = Vec::new();
        let mut seen = self.seen.lock();
        for (path, stamp) in &current {
            match seen.get(path) {
                None => events.push(FileEvent::created(path.clone(), stamp.len)),
                Some(prev) if prev != stamp => {
                    events.push(FileEvent::modified(path.clone(), stamp.len));
                }
                Some(_) => {}
            }
        }
        for path in seen.keys() {
            if !current.contains_key(path) {
                events.push(FileEvent::deleted(path.clone()));
            }
        }
        *seen = current;
        drop(seen);

        for event in &events {
            let _ = self.emitter.emit(Event::File(event.clone()));
        }
        events
    }
}

fn collect_files(dir: &Path, out: &mut FxHashMap<PathBuf, FileStamp>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            collect_files(&path, out);
        } else if file_type.is_file() {
            if let Ok(meta) = entry.metadata() {
                out.insert(
                    path,
                    FileStamp {
                        len: meta.len(),
                        modified: meta.modified().ok(),
                    },
                );
            }
        }
    }
}

/// Convert a filesystem timestamp for event payloads.
#[must_use]
pub fn system_time_to_utc(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}
