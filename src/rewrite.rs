//! Load-path rewriting for copied libraries and plugin caches.

use anyhow::{Context, Result};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

use crate::copy::make_user_writable;
use crate::paths::{
    bundled_install_name, file_name_str, is_plugin_file, real_path, BUNDLE_RESOURCES_PREFIX,
    RPATH_PREFIX,
};
use crate::tools::{InstallNameChange, InstallNameEdit, MachOTools};

/// Compute the `-change` pairs that point every dependency into the bundle.
///
/// The new name uses the file name of the dependency's real path, since that
/// is the name the file was copied under. Each dependency is also matched
/// through `@rpath/<name>`, the form webp and its relatives are linked with.
#[must_use]
pub fn install_name_changes(deps: &[String]) -> Vec<InstallNameChange> {
    let mut changes: Vec<InstallNameChange> = Vec::new();

    for dep in deps {
        let dep_path = Path::new(dep);
        let Some(dep_name) = dep_path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        // Copies inside the bundle may carry @rpath references that no longer resolve.
        let real_name = real_path(dep_path)
            .ok()
            .and_then(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .unwrap_or_else(|| dep_name.to_string());
        let new = bundled_install_name(&real_name);

        for old in [dep.clone(), format!("{RPATH_PREFIX}{dep_name}")] {
            if !changes.iter().any(|c| c.old == old) {
                changes.push(InstallNameChange {
                    old,
                    new: new.clone(),
                });
            }
        }
    }

    changes
}

/// Rewrite the load paths of a copied library so they resolve inside the bundle.
///
/// Homebrew installs libraries read-only, so the file is made user-writable
/// first. Dylibs also get a bundle-relative install name; plugins have none.
pub fn fix_install_names(tools: &dyn MachOTools, lib: &Path, deps: &[String]) -> Result<()> {
    make_user_writable(lib)?;

    let id = if is_plugin_file(lib) {
        None
    } else {
        Some(bundled_install_name(file_name_str(lib)?))
    };
    let edit = InstallNameEdit {
        id,
        changes: install_name_changes(deps),
    };
    debug!("Fixing {} load path(s) in {}", edit.changes.len(), lib.display());

    tools
        .edit_install_names(lib, &edit)
        .with_context(|| format!("Failed to rewrite load paths of {}", lib.display()))
}

fn cache_path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"/.*/(lib|share)/").expect("valid cache path pattern"))
}

/// Point the absolute `lib/` and `share/` paths of a plugin cache into the bundle.
///
/// ```text
/// "/opt/homebrew/lib/gdk-pixbuf-2.0/2.10.0/loaders/libpixbufloader-svg.so"
/// "@executable_path/../Resources/lib/gdk-pixbuf-2.0/2.10.0/loaders/libpixbufloader-svg.so"
/// ```
#[must_use]
pub fn rewrite_cache_paths(contents: &str) -> String {
    let replacement = format!("{BUNDLE_RESOURCES_PREFIX}${{1}}/");
    cache_path_pattern()
        .replace_all(contents, replacement.as_str())
        .into_owned()
}

/// Install a cache such as `loaders.cache` or `immodules.cache` into the bundle.
///
/// Reads `prefix/cache_path`, rewrites its paths and writes the result to
/// `resource_dir/cache_path`. Returns the destination.
pub fn install_plugin_cache(prefix: &Path, cache_path: &str, resource_dir: &Path) -> Result<PathBuf> {
    let src = prefix.join(cache_path);
    let dest = resource_dir.join(cache_path);

    let contents = fs::read_to_string(&src)
        .with_context(|| format!("Failed to read plugin cache {}", src.display()))?;
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    // The copy of the plugin directory may have brought a read-only cache along.
    if dest.exists() {
        make_user_writable(&dest)?;
    }
    fs::write(&dest, rewrite_cache_paths(&contents))
        .with_context(|| format!("Failed to write plugin cache {}", dest.display()))?;

    debug!("Installed plugin cache {}", dest.display());
    Ok(dest)
}
