//! File selection.
//!
//! Walks each configured source root and maps every selected file to the
//! same relative path under the target directory.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::Config;
use crate::error::{DirectiveError, Error, ErrorKind, FilePosition, Result};
use crate::fs::FileSystem;
use crate::pattern::{self, PathPattern};

/// One selected file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Copied to the destination without any directive processing.
    pub copy_only: bool,
    /// A copy-only file that still runs through the global phase.
    pub scan: bool,
}

/// `/`-separated form of a relative path.
fn slash_path(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

fn listed(list: &[String], ext: &str) -> bool {
    list.iter().any(|e| e == "*" || e == ext)
}

/// Select files as `config` describes.  Files below the target directory
/// are never selected.
pub fn collect(config: &Config, fs: &dyn FileSystem) -> Result<Vec<SourceFile>> {
    let excludes: Vec<PathPattern> = pattern::compile_all(&config.excludes)
        .map_err(|e| Error::detached(ErrorKind::Lexical, format!("invalid exclude pattern: {e}")))?;

    let mut selected = Vec::new();
    for root in &config.sources {
        let (base, files) = if fs.is_file(root) {
            let base = root.parent().map(Path::to_path_buf).unwrap_or_default();
            (base, vec![root.clone()])
        } else {
            let files = fs.walk(root).map_err(|e| {
                DirectiveError::io(format!("cannot read source directory {}", root.display()), e)
                    .at(None, vec![FilePosition { file: root.clone(), line: 0 }])
            })?;
            (root.clone(), files)
        };

        for path in files {
            if path.starts_with(&config.target) {
                continue;
            }
            let Ok(rel) = path.strip_prefix(&base) else {
                continue;
            };
            let rel_text = slash_path(rel);
            if let Some(p) = excludes.iter().find(|p| p.matches(&rel_text)) {
                debug!(target: "dirpp::sources", path = %rel_text, pattern = p.src(), "excluded by pattern");
                continue;
            }
            let Some(ext) = extension_of(&path) else {
                continue;
            };
            let copy_only = if listed(&config.extensions, &ext) {
                false
            } else if listed(&config.copy_extensions, &ext) {
                true
            } else {
                continue;
            };
            let scan = copy_only && listed(&config.scan_extensions, &ext);
            selected.push(SourceFile {
                destination: config.target.join(rel),
                source: path,
                copy_only,
                scan,
            });
        }
    }
    debug!(target: "dirpp::sources", count = selected.len(), "selected files");
    Ok(selected)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
