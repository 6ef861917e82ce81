//! Filesystem access used by probes and fixers.

use std::ffi::CString;
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Capacity of the filesystem holding a path, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskUsage {
    pub total: u64,
    pub used: u64,
}

impl DiskUsage {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.used as f64 / self.total as f64) * 100.0
    }
}

/// stat, chmod, mkdir and read, nothing more
pub trait FileSystem: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    /// Permission bits including setuid/setgid/sticky (`mode & 0o7777`)
    fn mode(&self, path: &Path) -> io::Result<u32>;

    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()>;

    /// Create `path` and its parents; an existing directory is not an error
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Names of the entries directly inside `path`
    fn list_dir(&self, path: &Path) -> io::Result<Vec<String>>;

    /// `root` and every directory below it, at most `max_depth` levels down,
    /// in file-name order. Unreadable subtrees are skipped.
    fn walk_dirs(&self, root: &Path, max_depth: usize) -> Vec<PathBuf>;

    fn write(&self, path: &Path, contents: &str) -> io::Result<()>;

    fn disk_usage(&self, path: &Path) -> io::Result<DiskUsage>;
}

/// The real host filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn mode(&self, path: &Path) -> io::Result<u32> {
        let metadata = fs::metadata(path)?;
        Ok(metadata.permissions().mode() & 0o7777)
    }

    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()> {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        Ok(fs::read_dir(path)?
            .flatten()
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect())
    }

    fn walk_dirs(&self, root: &Path, max_depth: usize) -> Vec<PathBuf> {
        WalkDir::new(root)
            .max_depth(max_depth)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_dir())
            .map(|entry| entry.into_path())
            .collect()
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        fs::write(path, contents)
    }

    fn disk_usage(&self, path: &Path) -> io::Result<DiskUsage> {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }

        let fragment = stat.f_frsize as u64;
        let total = stat.f_blocks as u64 * fragment;
        let free = stat.f_bfree as u64 * fragment;

        Ok(DiskUsage {
            total,
            used: total.saturating_sub(free),
        })
    }
}
