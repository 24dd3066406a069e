//! File-system seam.
//!
//! The engine reads sources and includes and writes destinations only
//! through [`FileSystem`], so tests and embedding callers can run it on an
//! in-memory tree.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

pub trait FileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Write `bytes`, creating parent directories as needed.
    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;

    fn is_file(&self, path: &Path) -> bool;

    /// Every file below `dir`, recursively, sorted by path.
    fn walk(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

// ── Disk ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy)]
pub struct DiskFs;

impl FileSystem for DiskFs {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, bytes)
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn walk(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        walk_recursive(dir, &mut files)?;
        files.sort();
        Ok(files)
    }
}

fn walk_recursive(dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk_recursive(&path, files)?;
        } else if path.is_file() {
            files.push(path);
        }
    }
    Ok(())
}

// ── Memory ────────────────────────────────────────────────────────────────────

/// In-memory file tree keyed by path.
#[derive(Debug, Default)]
pub struct MemoryFs {
    files: RefCell<BTreeMap<PathBuf, Vec<u8>>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file (builder style).
    pub fn with(self, path: impl Into<PathBuf>, text: &str) -> Self {
        self.insert(path, text);
        self
    }

    pub fn insert(&self, path: impl Into<PathBuf>, text: &str) {
        self.files
            .borrow_mut()
            .insert(path.into(), text.as_bytes().to_vec());
    }

    /// Contents of `path` as text, if present and valid UTF-8.
    pub fn text(&self, path: impl AsRef<Path>) -> Option<String> {
        let files = self.files.borrow();
        let bytes = files.get(path.as_ref())?;
        String::from_utf8(bytes.clone()).ok()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.borrow().keys().cloned().collect()
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{}: no such file", path.display()),
    )
}

impl FileSystem for MemoryFs {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| not_found(path))
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        self.files
            .borrow_mut()
            .insert(path.to_path_buf(), bytes.to_vec());
        Ok(())
    }

    fn is_file(&self, path: &Path) -> bool {
        self.files.borrow().contains_key(path)
    }

    fn walk(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let files: Vec<PathBuf> = self
            .files
            .borrow()
            .keys()
            .filter(|p| p.starts_with(dir))
            .cloned()
            .collect();
        if files.is_empty() {
            return Err(not_found(dir));
        }
        Ok(files)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_round_trip() {
        let fs = MemoryFs::new().with("src/a.txt", "hello");
        assert_eq!(fs.read_to_string(Path::new("src/a.txt")).unwrap(), "hello");
        assert!(fs.is_file(Path::new("src/a.txt")));
        fs.write(Path::new("out/a.txt"), b"bye").unwrap();
        assert_eq!(fs.text("out/a.txt").as_deref(), Some("bye"));
        assert_eq!(
            fs.read(Path::new("missing")).unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }

    #[test]
    fn memory_walk_is_sorted_and_scoped() {
        let fs = MemoryFs::new()
            .with("src/b.txt", "")
            .with("src/sub/a.txt", "")
            .with("other/c.txt", "");
        assert_eq!(
            fs.walk(Path::new("src")).unwrap(),
            vec![PathBuf::from("src/b.txt"), PathBuf::from("src/sub/a.txt")]
        );
        assert!(fs.walk(Path::new("none")).is_err());
    }

    #[test]
    fn disk_walk_and_write() {
        let dir = tempfile::tempdir().unwrap();
        let fs = DiskFs;
        fs.write(&dir.path().join("x/y/z.txt"), b"1").unwrap();
        fs.write(&dir.path().join("a.txt"), b"2").unwrap();
        let files = fs.walk(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.txt"));
        assert_eq!(fs.read(&dir.path().join("x/y/z.txt")).unwrap(), b"1");
    }
}
