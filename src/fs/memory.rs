use super::{DirEntry, FileKind, Filesystem, Metadata};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone)]
enum Entry {
    File { bytes: Vec<u8>, mode: u32 },
    Dir { mode: u32 },
    Symlink { target: String },
}

impl Entry {
    fn kind(&self) -> FileKind {
        match self {
            Entry::File { .. } => FileKind::File,
            Entry::Dir { .. } => FileKind::Dir,
            Entry::Symlink { .. } => FileKind::Symlink,
        }
    }
}

/// An in-memory filesystem double used by tests. Preserves mode bits
/// exactly and distinguishes files, directories, and symlinks without
/// following them implicitly.
#[derive(Debug, Default)]
pub struct InMemoryFilesystem {
    entries: Mutex<BTreeMap<PathBuf, Entry>>,
}

fn not_found(op: &'static str, path: &Path) -> Error {
    Error::fs_op(
        op,
        path,
        std::io::Error::new(std::io::ErrorKind::NotFound, "no such file or directory"),
    )
}

impl InMemoryFilesystem {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Seed the root directory so relative traversal has a starting point.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let fs = Self::new();
        fs.entries
            .lock()
            .unwrap()
            .insert(root.into(), Entry::Dir { mode: 0o755 });
        fs
    }

    fn resolve(&self, path: &Path) -> Option<(PathBuf, Entry)> {
        self.entries
            .lock()
            .unwrap()
            .get(path)
            .map(|e| (path.to_path_buf(), e.clone()))
    }
}

impl Filesystem for InMemoryFilesystem {
    fn stat(&self, path: &Path) -> Result<Metadata> {
        // Following symlinks: in this double, only one indirection is
        // resolved, matching the fixtures exercised by the core's tests.
        let (_, entry) = self.resolve(path).ok_or_else(|| not_found("stat", path))?;
        match entry {
            Entry::Symlink { target } => self.stat(Path::new(&target)),
            Entry::File { bytes, mode } => Ok(Metadata {
                kind: FileKind::File,
                size: bytes.len() as u64,
                mode,
            }),
            Entry::Dir { mode } => Ok(Metadata {
                kind: FileKind::Dir,
                size: 0,
                mode,
            }),
        }
    }

    fn lstat(&self, path: &Path) -> Result<Metadata> {
        let (_, entry) = self.resolve(path).ok_or_else(|| not_found("lstat", path))?;
        Ok(match entry {
            Entry::File { bytes, mode } => Metadata {
                kind: FileKind::File,
                size: bytes.len() as u64,
                mode,
            },
            Entry::Dir { mode } => Metadata {
                kind: FileKind::Dir,
                size: 0,
                mode,
            },
            Entry::Symlink { target } => Metadata {
                kind: FileKind::Symlink,
                size: target.len() as u64,
                mode: 0o777,
            },
        })
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let entries = self.entries.lock().unwrap();
        if !matches!(entries.get(path), Some(Entry::Dir { .. })) {
            return Err(not_found("read_dir", path));
        }
        let mut out = Vec::new();
        for (child_path, entry) in entries.iter() {
            if child_path.parent() == Some(path) {
                out.push(DirEntry {
                    name: child_path.file_name().unwrap().to_string_lossy().into_owned(),
                    kind: entry.kind(),
                });
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    fn read_link(&self, path: &Path) -> Result<String> {
        match self.resolve(path) {
            Some((_, Entry::Symlink { target })) => Ok(target),
            Some(_) => Err(Error::InvalidPath {
                path: path.display().to_string(),
                reason: "not a symlink".to_string(),
            }),
            None => Err(not_found("read_link", path)),
        }
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        match self.resolve(path) {
            Some((_, Entry::File { bytes, .. })) => Ok(bytes),
            Some((_, Entry::Symlink { target })) => self.read_file(Path::new(&target)),
            Some(_) => Err(Error::InvalidPath {
                path: path.display().to_string(),
                reason: "not a regular file".to_string(),
            }),
            None => Err(not_found("read_file", path)),
        }
    }

    fn write_file(&self, path: &Path, bytes: &[u8], mode: u32) -> Result<()> {
        self.entries.lock().unwrap().insert(
            path.to_path_buf(),
            Entry::File {
                bytes: bytes.to_vec(),
                mode,
            },
        );
        Ok(())
    }

    fn mkdir(&self, path: &Path, mode: u32) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(parent) = path.parent() {
            if !matches!(entries.get(parent), Some(Entry::Dir { .. })) {
                return Err(Error::ParentNotFound {
                    path: path.to_path_buf(),
                });
            }
        }
        if entries.contains_key(path) {
            return Err(Error::fs_op(
                "mkdir",
                path,
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "file exists"),
            ));
        }
        entries.insert(path.to_path_buf(), Entry::Dir { mode });
        Ok(())
    }

    fn mkdir_all(&self, path: &Path, mode: u32) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        let mut ancestors: Vec<&Path> = path.ancestors().collect();
        ancestors.reverse();
        for ancestor in ancestors {
            match entries.get(ancestor) {
                Some(Entry::Dir { .. }) => {}
                Some(_) => {
                    return Err(Error::fs_op(
                        "mkdir_all",
                        ancestor,
                        std::io::Error::new(std::io::ErrorKind::AlreadyExists, "not a directory"),
                    ));
                }
                None => {
                    entries.insert(ancestor.to_path_buf(), Entry::Dir { mode });
                }
            }
        }
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        if entries.remove(path).is_none() {
            return Err(not_found("remove", path));
        }
        Ok(())
    }

    fn remove_all(&self, path: &Path) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        if !entries.contains_key(path) {
            return Err(not_found("remove_all", path));
        }
        entries.retain(|p, _| p != path && !p.starts_with(path));
        Ok(())
    }

    fn symlink(&self, original: &Path, link: &Path) -> Result<()> {
        self.entries.lock().unwrap().insert(
            link.to_path_buf(),
            Entry::Symlink {
                target: original.display().to_string(),
            },
        );
        Ok(())
    }

    fn rename(&self, old: &Path, new: &Path) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.remove(old).ok_or_else(|| not_found("rename", old))?;
        entries.insert(new.to_path_buf(), entry);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.entries.lock().unwrap().contains_key(path)
    }

    fn is_dir(&self, path: &Path) -> Result<bool> {
        Ok(matches!(
            self.entries.lock().unwrap().get(path),
            Some(Entry::Dir { .. })
        ))
    }

    fn is_symlink(&self, path: &Path) -> Result<bool> {
        Ok(matches!(
            self.entries.lock().unwrap().get(path),
            Some(Entry::Symlink { .. })
        ))
    }
}
