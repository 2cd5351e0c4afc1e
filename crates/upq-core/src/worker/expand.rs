//! Job expansion: one enqueued path becomes zero or more transfer targets.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Lower-cased file extensions excluded from directory expansion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreSet(HashSet<String>);

impl IgnoreSet {
    /// Accepts `"html"`, `".HTML"`, etc.; blanks are dropped.
    pub fn new<S: AsRef<str>>(exts: &[S]) -> Self {
        Self(
            exts.iter()
                .map(|e| e.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        )
    }

    pub fn contains(&self, ext: &str) -> bool {
        self.0.contains(&ext.trim_start_matches('.').to_ascii_lowercase())
    }

    /// True if `path` has an extension in the set. Files without one are never ignored.
    pub fn ignores(&self, path: &Path) -> bool {
        path.extension()
            .map(|e| self.contains(&e.to_string_lossy()))
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One file to upload and the remote folder (relative to the root path) it lands in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTarget {
    /// `"/"` for a single-file job, `"/<dir name>"` for files of a directory job.
    pub destination: String,
    pub source: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    File,
    Directory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedJob {
    pub kind: JobKind,
    pub root: PathBuf,
    pub targets: Vec<TransferTarget>,
}

#[derive(Error, Debug)]
pub enum ExpandError {
    #[error("path does not exist: {}", .0.display())]
    Missing(PathBuf),

    #[error("not a regular file or directory: {}", .0.display())]
    Unsupported(PathBuf),

    #[error("stat {}: {source}", path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("walk directory: {0}")]
    Walk(#[from] walkdir::Error),

    /// Directory files are flattened into one remote folder; two files with
    /// the same name would collide there.
    #[error("{} and {} both upload as {name}", first.display(), second.display())]
    NameCollision {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },
}

/// Resolve `path` into transfer targets. Blocking; run on a blocking task.
///
/// A regular file yields one target with destination `"/"`. A directory
/// yields one target per non-ignored regular file anywhere beneath it, all
/// with destination `"/<dir name>"`. Symlinks inside a directory are not followed.
pub fn expand(path: &Path, ignore: &IgnoreSet) -> Result<ExpandedJob, ExpandError> {
    let meta = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ExpandError::Missing(path.to_path_buf()))
        }
        Err(source) => {
            return Err(ExpandError::Stat {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if meta.is_file() {
        return Ok(ExpandedJob {
            kind: JobKind::File,
            root: path.to_path_buf(),
            targets: vec![TransferTarget {
                destination: "/".to_string(),
                source: path.to_path_buf(),
            }],
        });
    }
    if !meta.is_dir() {
        return Err(ExpandError::Unsupported(path.to_path_buf()));
    }

    let dir_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let destination = format!("/{}", dir_name);

    let mut seen: HashMap<String, PathBuf> = HashMap::new();
    let mut targets = Vec::new();
    for entry in WalkDir::new(path).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() || ignore.ignores(entry.path()) {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(first) = seen.get(&name) {
            return Err(ExpandError::NameCollision {
                name,
                first: first.clone(),
                second: entry.path().to_path_buf(),
            });
        }
        seen.insert(name, entry.path().to_path_buf());
        targets.push(TransferTarget {
            destination: destination.clone(),
            source: entry.into_path(),
        });
    }

    Ok(ExpandedJob {
        kind: JobKind::Directory,
        root: path.to_path_buf(),
        targets,
    })
}

/// `rootpath` + target destination, e.g. `/upload` + `/photos` = `/upload/photos`.
pub fn remote_dir(rootpath: &str, destination: &str) -> String {
    let root = rootpath.trim_end_matches('/');
    let dest = destination.trim_start_matches('/');
    match (root.is_empty(), dest.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{}", dest),
        (false, true) => root.to_string(),
        (false, false) => format!("{}/{}", root, dest),
    }
}
