//! File and library copying utilities.

use anyhow::{bail, Context, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::paths::file_name_str;

/// Make a file writable by its owner and readable by everyone (chmod 644).
pub fn make_user_writable(path: &Path) -> Result<()> {
    let mut perms = fs::metadata(path)
        .with_context(|| format!("Failed to read metadata: {}", path.display()))?
        .permissions();
    perms.set_mode(0o644);
    fs::set_permissions(path, perms)
        .with_context(|| format!("Failed to set permissions: {}", path.display()))?;
    Ok(())
}

/// Copy a directory recursively, merging into `dst` if it already exists.
///
/// Symlinks are followed so the bundle never links back into the prefix.
/// Existing destination files are overwritten.
///
/// Returns the total size in bytes of all files copied.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<u64> {
    let mut total_size: u64 = 0;

    if !src.is_dir() {
        bail!("Resource directory does not exist: {}", src.display());
    }

    fs::create_dir_all(dst).with_context(|| format!("Failed to create {}", dst.display()))?;

    for entry in fs::read_dir(src).with_context(|| format!("Failed to read {}", src.display()))? {
        let entry = entry?;
        let path = entry.path();
        let dest_path = dst.join(entry.file_name());

        if path.is_dir() {
            total_size += copy_dir_recursive(&path, &dest_path)?;
        } else {
            total_size += copy_file(&path, &dest_path)?;
        }
    }

    Ok(total_size)
}

fn copy_file(src: &Path, dst: &Path) -> Result<u64> {
    // Previous runs leave read-only copies of read-only Homebrew files.
    if dst.exists() && fs::metadata(dst)?.permissions().readonly() {
        make_user_writable(dst)?;
    }
    fs::copy(src, dst)
        .with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))
}

/// Copy a library into `dest_dir`, keeping its file name.
///
/// `lib` should be a real path so the copy carries the versioned name
/// (`libglib-2.0.0.dylib`) rather than a symlink's.
pub fn copy_library_into(lib: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let dest = dest_dir.join(file_name_str(lib)?);
    copy_file(lib, &dest)?;
    Ok(dest)
}

/// Create a symlink if it doesn't already exist.
///
/// Returns `Ok(true)` if the symlink was created, `Ok(false)` if it already existed.
pub fn create_symlink_if_missing(target: &Path, link: &Path) -> Result<bool> {
    if link.exists() || link.is_symlink() {
        return Ok(false);
    }
    std::os::unix::fs::symlink(target, link).with_context(|| {
        format!(
            "Failed to create symlink {} -> {}",
            link.display(),
            target.display()
        )
    })?;
    Ok(true)
}
