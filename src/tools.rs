//! Wrappers around the Xcode command line tools.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::{Command, Output};
use tracing::debug;

/// A single `install_name_tool -change old new` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallNameChange {
    pub old: String,
    pub new: String,
}

/// Everything `install_name_tool` should rewrite in one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallNameEdit {
    /// New `LC_ID_DYLIB`. Loadable bundles (`.so` plugins) have none.
    pub id: Option<String>,
    pub changes: Vec<InstallNameChange>,
}

impl InstallNameEdit {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.changes.is_empty()
    }
}

/// The Mach-O operations the bundler needs.
///
/// [`XcodeTools`] shells out to the real tools. Tests substitute an
/// implementation that works on plain files.
pub trait MachOTools {
    /// Return the raw `otool -L` listing for `path`.
    fn list_dependencies(&self, path: &Path) -> Result<String>;

    /// Apply `edit` to the load commands of `path`.
    fn edit_install_names(&self, path: &Path, edit: &InstallNameEdit) -> Result<()>;
}

/// `otool` and `install_name_tool` from the Xcode command line tools.
#[derive(Debug, Default, Clone, Copy)]
pub struct XcodeTools;

impl MachOTools for XcodeTools {
    fn list_dependencies(&self, path: &Path) -> Result<String> {
        let output = Command::new("otool")
            .arg("-L")
            .arg(path)
            .output()
            .context("otool command not found - install the Xcode command line tools")?;
        check_status("otool", path, &output)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn edit_install_names(&self, path: &Path, edit: &InstallNameEdit) -> Result<()> {
        if edit.is_empty() {
            return Ok(());
        }

        let mut cmd = Command::new("install_name_tool");
        if let Some(id) = &edit.id {
            cmd.arg("-id").arg(id);
        }
        for change in &edit.changes {
            cmd.arg("-change").arg(&change.old).arg(&change.new);
        }
        cmd.arg(path);
        debug!(
            "install_name_tool: {} change(s) on {}",
            edit.changes.len(),
            path.display()
        );

        let output = cmd
            .output()
            .context("install_name_tool command not found - install the Xcode command line tools")?;
        check_status("install_name_tool", path, &output)
    }
}

fn check_status(tool: &str, path: &Path, output: &Output) -> Result<()> {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("{} failed on {}: {}", tool, path.display(), stderr.trim());
    }
    Ok(())
}
