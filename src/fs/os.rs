use super::{DirEntry, FileKind, Filesystem, Metadata};
use crate::error::{Error, Result};
use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;

/// The real, OS-backed filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFilesystem;

impl OsFilesystem {
    pub fn new() -> Self {
        Self
    }
}

fn to_metadata(meta: &fs::Metadata) -> Metadata {
    let kind = if meta.is_dir() {
        FileKind::Dir
    } else if meta.file_type().is_symlink() {
        FileKind::Symlink
    } else {
        FileKind::File
    };
    Metadata {
        kind,
        size: meta.size(),
        mode: meta.mode() & 0o7777,
    }
}

impl Filesystem for OsFilesystem {
    fn stat(&self, path: &Path) -> Result<Metadata> {
        let meta = fs::metadata(path).map_err(|e| Error::fs_op("stat", path, e))?;
        Ok(to_metadata(&meta))
    }

    fn lstat(&self, path: &Path) -> Result<Metadata> {
        let meta = fs::symlink_metadata(path).map_err(|e| Error::fs_op("lstat", path, e))?;
        Ok(to_metadata(&meta))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path).map_err(|e| Error::fs_op("read_dir", path, e))? {
            let entry = entry.map_err(|e| Error::fs_op("read_dir", path, e))?;
            let meta = entry
                .file_type()
                .map_err(|e| Error::fs_op("read_dir", path, e))?;
            let kind = if meta.is_dir() {
                FileKind::Dir
            } else if meta.is_symlink() {
                FileKind::Symlink
            } else {
                FileKind::File
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn read_link(&self, path: &Path) -> Result<String> {
        let target = fs::read_link(path).map_err(|e| Error::fs_op("read_link", path, e))?;
        Ok(target.to_string_lossy().into_owned())
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).map_err(|e| Error::fs_op("read_file", path, e))
    }

    fn write_file(&self, path: &Path, bytes: &[u8], mode: u32) -> Result<()> {
        fs::write(path, bytes).map_err(|e| Error::fs_op("write_file", path, e))?;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .map_err(|e| Error::fs_op("write_file", path, e))
    }

    fn mkdir(&self, path: &Path, mode: u32) -> Result<()> {
        fs::create_dir(path).map_err(|e| Error::fs_op("mkdir", path, e))?;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .map_err(|e| Error::fs_op("mkdir", path, e))
    }

    fn mkdir_all(&self, path: &Path, mode: u32) -> Result<()> {
        fs::create_dir_all(path).map_err(|e| Error::fs_op("mkdir_all", path, e))?;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .map_err(|e| Error::fs_op("mkdir_all", path, e))
    }

    fn remove(&self, path: &Path) -> Result<()> {
        let meta = fs::symlink_metadata(path).map_err(|e| Error::fs_op("remove", path, e))?;
        if meta.is_dir() {
            fs::remove_dir(path).map_err(|e| Error::fs_op("remove", path, e))
        } else {
            fs::remove_file(path).map_err(|e| Error::fs_op("remove", path, e))
        }
    }

    fn remove_all(&self, path: &Path) -> Result<()> {
        let meta = fs::symlink_metadata(path).map_err(|e| Error::fs_op("remove_all", path, e))?;
        if meta.is_dir() {
            fs::remove_dir_all(path).map_err(|e| Error::fs_op("remove_all", path, e))
        } else {
            fs::remove_file(path).map_err(|e| Error::fs_op("remove_all", path, e))
        }
    }

    fn symlink(&self, original: &Path, link: &Path) -> Result<()> {
        std::os::unix::fs::symlink(original, link).map_err(|e| Error::fs_op("symlink", link, e))
    }

    fn rename(&self, old: &Path, new: &Path) -> Result<()> {
        fs::rename(old, new).map_err(|e| Error::fs_op("rename", old, e))
    }

    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    fn is_dir(&self, path: &Path) -> Result<bool> {
        match fs::metadata(path) {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::fs_op("is_dir", path, e)),
        }
    }

    fn is_symlink(&self, path: &Path) -> Result<bool> {
        match fs::symlink_metadata(path) {
            Ok(meta) => Ok(meta.file_type().is_symlink()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::fs_op("is_symlink", path, e)),
        }
    }
}
