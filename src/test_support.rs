//! Plain-text stand-ins for Mach-O files, so the bundler can be tested off macOS.
//!
//! A mock library is a text file holding the lines `otool -L` would print
//! after the header: the library's own install name first, then one line per
//! dependency.
//!
//! Paths go through the crate root so `tests/` can include this file too.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::{InstallNameEdit, MachOTools};

const VERSIONS: &str = "(compatibility version 1.0.0, current version 1.0.0)";

pub(crate) struct FileTools;

impl MachOTools for FileTools {
    fn list_dependencies(&self, path: &Path) -> Result<String> {
        let body = fs::read_to_string(path)
            .with_context(|| format!("otool failed on {}", path.display()))?;
        Ok(format!("{}:\n{}", path.display(), body))
    }

    fn edit_install_names(&self, path: &Path, edit: &InstallNameEdit) -> Result<()> {
        let body = fs::read_to_string(path)?;
        let mut lines: Vec<String> = Vec::new();
        for (i, line) in body.lines().enumerate() {
            let reference = line
                .trim_start()
                .split(" (")
                .next()
                .unwrap_or_default();
            let replacement = match (&edit.id, i) {
                (Some(id), 0) => Some(id.as_str()),
                _ => edit
                    .changes
                    .iter()
                    .find(|c| c.old == reference)
                    .map(|c| c.new.as_str()),
            };
            match replacement {
                Some(new) => lines.push(format!("\t{new} {VERSIONS}")),
                None => lines.push(line.to_string()),
            }
        }
        fs::write(path, lines.join("\n") + "\n")?;
        Ok(())
    }
}

/// A dylib whose install name is its own path.
pub(crate) fn write_mock_lib(path: &Path, deps: &[&str]) {
    let mut refs = vec![path.to_str().unwrap()];
    refs.extend_from_slice(deps);
    write_lines(path, &refs);
}

/// A loadable bundle: dependencies only, no install name.
pub(crate) fn write_mock_plugin(path: &Path, deps: &[&str]) {
    write_lines(path, deps);
}

fn write_lines(path: &Path, refs: &[&str]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let body: String = refs
        .iter()
        .map(|r| format!("\t{r} {VERSIONS}\n"))
        .collect();
    fs::write(path, body).unwrap();
}
