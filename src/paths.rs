//! Prefix, bundle and install-name path handling.

use anyhow::{bail, Context, Result};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Install-name prefix for libraries copied into `Contents/Resources/lib`.
pub const BUNDLE_LIB_PREFIX: &str = "@executable_path/../Resources/lib/";

/// Install-name prefix for anything under `Contents/Resources`.
pub const BUNDLE_RESOURCES_PREFIX: &str = "@executable_path/../Resources/";

/// Prefix used by `otool -L` for `LC_RPATH`-relative references.
pub const RPATH_PREFIX: &str = "@rpath/";

/// The .NET runtime id the bundle targets. Selects the Homebrew prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Runtime {
    X64,
    Arm64,
}

impl Runtime {
    /// Homebrew installs into `/usr/local` on Intel and `/opt/homebrew` on Apple silicon.
    #[must_use]
    pub fn default_prefix(self) -> PathBuf {
        match self {
            Runtime::X64 => PathBuf::from("/usr/local"),
            Runtime::Arm64 => PathBuf::from("/opt/homebrew"),
        }
    }

    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Runtime::X64 => "osx-x64",
            Runtime::Arm64 => "osx-arm64",
        }
    }
}

impl FromStr for Runtime {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "osx-x64" => Ok(Runtime::X64),
            "osx-arm64" => Ok(Runtime::Arm64),
            other => bail!("Invalid runtime id '{}' (expected osx-x64 or osx-arm64)", other),
        }
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// The install name a bundled library is referenced by.
#[must_use]
pub fn bundled_install_name(file_name: &str) -> String {
    format!("{BUNDLE_LIB_PREFIX}{file_name}")
}

/// Resolve all symlinks in `path`.
pub fn real_path(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .with_context(|| format!("Failed to resolve real path of {}", path.display()))
}

/// Make `path` absolute against the working directory without resolving symlinks.
///
/// `otool -L` only prints absolute paths, so the prefix they are matched
/// against must be absolute too. Symlinks are kept as given because Homebrew
/// records install names through them.
pub fn absolute_path(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path)
        .with_context(|| format!("Failed to make {} absolute", path.display()))
}

/// Turn a reference from `otool -L` into a file-system path.
///
/// `@rpath/libfoo.dylib` is looked up next to the library that references it,
/// which is where Homebrew places the webp family of libraries.
#[must_use]
pub fn resolve_dependency(referenced: &str, referencing_dir: &Path) -> PathBuf {
    match referenced.strip_prefix(RPATH_PREFIX) {
        Some(name) => referencing_dir.join(name),
        None => PathBuf::from(referenced),
    }
}

/// Locate a package's install root from one of its files.
///
/// Resolves `prefix/relative` (Homebrew links into `Cellar`), takes the
/// containing directory and walks up `levels` parents. For example
/// `lib/libadwaita-1.0.dylib` with one level gives the package root that
/// holds `share/locale`.
pub fn package_root(prefix: &Path, relative: &str, levels: usize) -> Result<PathBuf> {
    let file = real_path(&prefix.join(relative))?;
    let mut dir = file
        .parent()
        .with_context(|| format!("{} has no parent directory", file.display()))?;
    for _ in 0..levels {
        dir = dir
            .parent()
            .with_context(|| format!("{} has no parent directory", dir.display()))?;
    }
    Ok(dir.to_path_buf())
}

/// Loadable modules (pixbuf loaders, input methods) use `.so`, not `.dylib`.
#[must_use]
pub fn is_plugin_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "so")
}

/// Shared libraries and loadable modules both carry load commands.
#[must_use]
pub fn is_mach_o_library(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "dylib" || ext == "so")
}

/// Recursively list the files under `dir` matching `filter`, sorted.
///
/// Symlinked directories are followed, matching how they are copied.
pub fn find_files(dir: &Path, filter: fn(&Path) -> bool) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut to_visit = vec![dir.to_path_buf()];

    while let Some(current) = to_visit.pop() {
        let entries = fs::read_dir(&current)
            .with_context(|| format!("Failed to read directory {}", current.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                to_visit.push(path);
            } else if filter(&path) {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}

/// File name of a path as UTF-8, which install names require.
pub fn file_name_str(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("{} has no UTF-8 file name", path.display()))
}
