use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::Path;
use tempfile::TempDir;
use walkdir::WalkDir;

/// Filesystem operations the engine needs. Everything that touches disk goes
/// through this trait so tests can inject failures.
pub trait Filesystem: Send + Sync {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn exists(&self, path: &Path) -> bool;

    fn is_dir(&self, path: &Path) -> bool;

    /// Names of the entries directly inside `dir`.
    fn list_directory(&self, dir: &Path) -> io::Result<BTreeSet<String>>;

    /// Copy `from` to `to` (recursively for folders) and verify the copy.
    fn copy_verified(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Remove a file or a whole folder tree.
    fn remove(&self, path: &Path) -> io::Result<()>;
}

impl fmt::Debug for dyn Filesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn Filesystem")
    }
}

/// The real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFilesystem;

impl Filesystem for OsFilesystem {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn exists(&self, path: &Path) -> bool {
        // A dangling symlink is still an entry that occupies its name
        path.symlink_metadata().is_ok()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn list_directory(&self, dir: &Path) -> io::Result<BTreeSet<String>> {
        let mut names = BTreeSet::new();
        for entry in fs::read_dir(dir)? {
            names.insert(entry?.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    fn copy_verified(&self, from: &Path, to: &Path) -> io::Result<()> {
        if !from.is_dir() {
            return copy_file_verified(from, to);
        }
        for entry in WalkDir::new(from).follow_links(false) {
            let entry = entry.map_err(io::Error::from)?;
            let relative = entry
                .path()
                .strip_prefix(from)
                .map_err(io::Error::other)?;
            let dest = to.join(relative);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&dest)?;
            } else {
                copy_file_verified(entry.path(), &dest)?;
            }
        }
        Ok(())
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        if path.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        }
    }
}

fn copy_file_verified(from: &Path, to: &Path) -> io::Result<()> {
    fs::copy(from, to)?;
    if calculate_checksum(from)? != calculate_checksum(to)? {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("checksum mismatch after copying {}", from.display()),
        ));
    }
    Ok(())
}

/// SHA-256 of a file's contents as lowercase hex.
pub fn calculate_checksum(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Whether a rename failed because source and target are on different volumes.
pub fn is_cross_device(err: &io::Error) -> bool {
    match err.raw_os_error() {
        // ERROR_NOT_SAME_DEVICE
        Some(17) if cfg!(windows) => true,
        // EXDEV
        Some(18) if cfg!(unix) => true,
        _ => false,
    }
}

/// Detect if the filesystem at the given path is case-insensitive
pub fn detect_case_insensitive_fs(path: &Path) -> bool {
    let Ok(temp_dir) = TempDir::new_in(path) else {
        return false;
    };

    let lower = temp_dir.path().join("case_probe_a");
    let upper = temp_dir.path().join("CASE_PROBE_A");
    if fs::write(&lower, b"probe").is_err() {
        return false;
    }
    fs::metadata(&upper).is_ok()
}
