//! Post-bundle check that every rewritten load path stays inside the bundle.

use anyhow::Result;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::paths::{absolute_path, find_files, is_mach_o_library, BUNDLE_RESOURCES_PREFIX, RPATH_PREFIX};
use crate::tools::MachOTools;

/// A load path that would not resolve once the bundle is moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// `@executable_path/../Resources/...` names a file the bundle lacks.
    MissingTarget { file: PathBuf, reference: String },
    /// The reference still points into the build machine's prefix.
    PrefixReference { file: PathBuf, reference: String },
    /// `@rpath/...` was left in place; the app sets no rpath into the bundle.
    RpathReference { file: PathBuf, reference: String },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::MissingTarget { file, reference } => {
                write!(f, "{}: {} is not in the bundle", file.display(), reference)
            }
            Violation::PrefixReference { file, reference } => {
                write!(f, "{}: {} points outside the bundle", file.display(), reference)
            }
            Violation::RpathReference { file, reference } => {
                write!(f, "{}: {} was not rewritten", file.display(), reference)
            }
        }
    }
}

/// Load-command references in `otool -L` output, headers excluded.
fn references(output: &str) -> impl Iterator<Item = &str> {
    output
        .lines()
        .filter(|line| !line.trim_end().ends_with(':'))
        .filter_map(|line| line.trim_start().split(" (").next())
        .filter(|reference| !reference.is_empty())
}

/// Check every library and plugin under `resource_dir`.
///
/// A relative `prefix` is made absolute first, like [`crate::Bundler`] does.
pub fn verify_bundle(
    tools: &dyn MachOTools,
    resource_dir: &Path,
    prefix: &Path,
) -> Result<Vec<Violation>> {
    let prefix = absolute_path(prefix)?;
    let mut violations = Vec::new();

    for file in find_files(resource_dir, is_mach_o_library)? {
        let output = tools.list_dependencies(&file)?;
        for reference in references(&output) {
            if let Some(relative) = reference.strip_prefix(BUNDLE_RESOURCES_PREFIX) {
                if !resource_dir.join(relative).exists() {
                    violations.push(Violation::MissingTarget {
                        file: file.clone(),
                        reference: reference.to_string(),
                    });
                }
            } else if reference.starts_with(RPATH_PREFIX) {
                violations.push(Violation::RpathReference {
                    file: file.clone(),
                    reference: reference.to_string(),
                });
            } else if Path::new(reference).starts_with(&prefix) {
                violations.push(Violation::PrefixReference {
                    file: file.clone(),
                    reference: reference.to_string(),
                });
            }
        }
        debug!("Verified {}", file.display());
    }

    Ok(violations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{write_mock_lib, write_mock_plugin, FileTools};
    use tempfile::TempDir;

    #[test]
    fn test_clean_bundle() {
        let temp = TempDir::new().unwrap();
        let resources = temp.path();
        write_mock_lib(&resources.join("lib/libglib-2.0.0.dylib"), &[]);
        write_mock_plugin(
            &resources.join("lib/gdk-pixbuf-2.0/2.10.0/loaders/libpixbufloader-png.so"),
            &[
                "@executable_path/../Resources/lib/libglib-2.0.0.dylib",
                "/usr/lib/libSystem.B.dylib",
            ],
        );

        let violations = verify_bundle(&FileTools, resources, Path::new("/opt/homebrew")).unwrap();
        // The mock dylib's install name is its own absolute path, outside the prefix.
        assert!(violations.is_empty(), "{:?}", violations);
    }

    #[test]
    fn test_reports_leftover_rpath_reference() {
        let temp = TempDir::new().unwrap();
        let resources = temp.path();
        let plugin = resources.join("lib/gtk-3.0/3.0.0/immodules/im-quartz.so");
        write_mock_plugin(
            &plugin,
            &[
                "@rpath/Carbon.framework/Carbon",
                "/System/Library/Frameworks/Cocoa.framework/Versions/A/Cocoa",
            ],
        );

        let violations = verify_bundle(&FileTools, resources, Path::new("/opt/homebrew")).unwrap();
        assert_eq!(
            violations,
            vec![Violation::RpathReference {
                file: plugin,
                reference: "@rpath/Carbon.framework/Carbon".to_string(),
            }]
        );
        assert!(violations[0].to_string().contains("was not rewritten"));
    }

    #[test]
    fn test_reports_missing_and_prefix_references() {
        let temp = TempDir::new().unwrap();
        let resources = temp.path();
        let plugin = resources.join("lib/loaders/libpixbufloader-svg.so");
        write_mock_plugin(
            &plugin,
            &[
                "@executable_path/../Resources/lib/librsvg-2.2.dylib",
                "/opt/homebrew/opt/cairo/lib/libcairo.2.dylib",
            ],
        );

        let violations = verify_bundle(&FileTools, resources, Path::new("/opt/homebrew")).unwrap();
        assert_eq!(
            violations,
            vec![
                Violation::MissingTarget {
                    file: plugin.clone(),
                    reference: "@executable_path/../Resources/lib/librsvg-2.2.dylib".to_string(),
                },
                Violation::PrefixReference {
                    file: plugin,
                    reference: "/opt/homebrew/opt/cairo/lib/libcairo.2.dylib".to_string(),
                },
            ]
        );
    }
}
