//! Literal find/replace over the `.json` files of one directory.
//!
//! No schema awareness: the token is replaced wherever it occurs in the file
//! text. Subdirectories are not visited.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

const EXTENSION: &str = ".json";

#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error("token to replace must not be empty")]
    InvalidToken,

    #[error("{}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
}

impl RewriteError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// One file whose content changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: PathBuf,
    pub replacements: usize,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RewriteReport {
    /// `.json` files examined.
    pub scanned: usize,
    /// Files that contained the token, in path order.
    pub changed: Vec<FileChange>,
    /// `.json` files left alone because they are not valid UTF-8.
    pub skipped: Vec<PathBuf>,
}

impl RewriteReport {
    pub fn replacements(&self) -> usize {
        self.changed.iter().map(|c| c.replacements).sum()
    }
}

fn is_json(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(EXTENSION))
}

/// Replace every `from` with `to` in each `.json` file directly inside `dir`.
///
/// Each file gets a single pass, so a `to` that contains `from` is not
/// expanded again. Files are written only when their content changed; with
/// `dry_run` nothing is written and the report says what would change.
pub fn rewrite_dir(
    dir: &Path,
    from: &str,
    to: &str,
    dry_run: bool,
) -> Result<RewriteReport, RewriteError> {
    if from.is_empty() {
        return Err(RewriteError::InvalidToken);
    }

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(RewriteError::io(dir))? {
        let entry = entry.map_err(RewriteError::io(dir))?;
        let path = entry.path();
        if !is_json(&path) {
            continue;
        }
        // Follows symlinks, so a linked fixture is rewritten in place.
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => paths.push(path),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "dangling symlink, skipping");
            }
            Err(e) => return Err(RewriteError::io(&path)(e)),
        }
    }
    paths.sort();

    let mut report = RewriteReport::default();
    for path in paths {
        report.scanned += 1;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                warn!(path = %path.display(), "not valid UTF-8, skipping");
                report.skipped.push(path);
                continue;
            }
            Err(e) => return Err(RewriteError::io(&path)(e)),
        };

        let replacements = content.matches(from).count();
        if replacements == 0 {
            debug!(path = %path.display(), "no match");
            continue;
        }
        if !dry_run {
            fs::write(&path, content.replace(from, to)).map_err(RewriteError::io(&path))?;
        }
        info!(path = %path.display(), replacements, dry_run, "rewrote");
        report.changed.push(FileChange { path, replacements });
    }
    Ok(report)
}
