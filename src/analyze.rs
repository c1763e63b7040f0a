//! Mach-O dependency analysis using otool.

use anyhow::{bail, Context, Result};
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::paths::{real_path, resolve_dependency, RPATH_PREFIX};
use crate::tools::MachOTools;

/// Selects which `otool -L` references belong to the bundle.
///
/// Only libraries installed under the package prefix are vendored, plus
/// `@rpath` references which Homebrew uses for the webp family. System
/// libraries (`/usr/lib`, `/System/Library`) are left alone.
#[derive(Debug, Clone)]
pub struct DependencyMatcher {
    prefixed: Regex,
    rpath: Regex,
}

impl DependencyMatcher {
    pub fn new(prefix: &Path) -> Result<Self> {
        let prefix = prefix.to_str().with_context(|| {
            format!("Prefix {} is not valid UTF-8", prefix.display())
        })?;
        let prefix = prefix.trim_end_matches('/');
        let prefixed = Regex::new(&format!(
            r"(?:^|\s)({}/\S*\.dylib)",
            regex::escape(prefix)
        ))
        .context("Failed to build prefix dependency pattern")?;
        let rpath = Regex::new(&format!(r"(?:^|\s)({}lib\S*\.dylib)", regex::escape(RPATH_PREFIX)))
            .context("Failed to build @rpath dependency pattern")?;
        Ok(Self { prefixed, rpath })
    }

    /// Prefixed references are returned as-is, `@rpath` ones re-rooted onto `referencing_dir`.
    fn references(&self, line: &str, referencing_dir: &Path) -> Vec<String> {
        let mut refs: Vec<String> = self
            .prefixed
            .captures_iter(line)
            .map(|caps| caps[1].to_string())
            .collect();
        refs.extend(self.rpath.captures_iter(line).map(|caps| {
            resolve_dependency(&caps[1], referencing_dir)
                .to_string_lossy()
                .into_owned()
        }));
        refs
    }
}

/// Parse `otool -L` output into the bundled library references.
///
/// Example otool output:
/// ```text
/// /opt/homebrew/lib/libadwaita-1.0.dylib:
/// 	/opt/homebrew/opt/libadwaita/lib/libadwaita-1.0.dylib (compatibility version 0.0.0, current version 0.0.0)
/// 	/opt/homebrew/opt/gtk4/lib/libgtk-4.1.dylib (compatibility version 1401.0.0, current version 1401.30.0)
/// 	@rpath/libwebp.7.dylib (compatibility version 10.0.0, current version 10.0.0)
/// 	/usr/lib/libSystem.B.dylib (compatibility version 1.0.0, current version 1345.100.2)
/// ```
///
/// Header lines (`path:` and `path (architecture arm64):`) are skipped so a
/// library never lists itself through its own header. Duplicates are dropped
/// keeping the first occurrence.
#[must_use]
pub fn parse_otool_output(
    output: &str,
    matcher: &DependencyMatcher,
    referencing_dir: &Path,
) -> Vec<String> {
    let mut libs: Vec<String> = Vec::new();

    for line in output.lines() {
        if line.trim_end().ends_with(':') {
            continue;
        }
        for lib in matcher.references(line, referencing_dir) {
            if !libs.contains(&lib) {
                libs.push(lib);
            }
        }
    }

    libs
}

/// Extract the bundled library references of a single Mach-O file.
///
/// # Errors
///
/// Returns an error if the file does not exist or `otool` fails on it.
#[must_use = "library dependencies should be processed"]
pub fn get_library_dependencies(
    tools: &dyn MachOTools,
    lib_path: &Path,
    matcher: &DependencyMatcher,
) -> Result<Vec<String>> {
    // Check file exists first for a clear error message
    if !lib_path.exists() {
        bail!("File does not exist: {}", lib_path.display());
    }

    let output = tools.list_dependencies(lib_path)?;
    let dir = lib_path
        .parent()
        .with_context(|| format!("{} has no parent directory", lib_path.display()))?;
    Ok(parse_otool_output(&output, matcher, dir))
}

/// Libraries keyed by real path, each with the references `otool` reported.
///
/// Iteration follows discovery order.
#[derive(Debug, Default, Clone)]
pub struct DependencyMap {
    entries: Vec<(PathBuf, Vec<String>)>,
    index: HashMap<PathBuf, usize>,
}

impl DependencyMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, lib: &Path) -> bool {
        self.index.contains_key(lib)
    }

    #[must_use]
    pub fn get(&self, lib: &Path) -> Option<&[String]> {
        self.index.get(lib).map(|&i| self.entries[i].1.as_slice())
    }

    pub fn insert(&mut self, lib: PathBuf, deps: Vec<String>) {
        match self.index.get(&lib) {
            Some(&i) => self.entries[i].1 = deps,
            None => {
                self.index.insert(lib.clone(), self.entries.len());
                self.entries.push((lib, deps));
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &[String])> {
        self.entries
            .iter()
            .map(|(lib, deps)| (lib.as_path(), deps.as_slice()))
    }

    pub fn libraries(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(|(lib, _)| lib.as_path())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Recursively collect `root` and every library it transitively references.
///
/// Libraries are keyed by real path, so the versioned symlinks Homebrew
/// creates (`opt/glib/lib/libglib-2.0.dylib`) collapse onto the file in
/// `Cellar`. Libraries already in `map` are not analysed again, which lets
/// callers accumulate several roots into one map.
pub fn collect_dependencies(
    tools: &dyn MachOTools,
    root: &Path,
    matcher: &DependencyMatcher,
    map: &mut DependencyMap,
) -> Result<()> {
    let mut to_process = vec![real_path(root)?];

    while let Some(lib) = to_process.pop() {
        if map.contains(&lib) {
            continue;
        }

        let deps = get_library_dependencies(tools, &lib, matcher)?;
        debug!("{}: {} bundled reference(s)", lib.display(), deps.len());

        let mut real_deps = Vec::with_capacity(deps.len());
        for dep in &deps {
            let real = real_path(Path::new(dep))
                .with_context(|| format!("Dependency of {}", lib.display()))?;
            real_deps.push(real);
        }
        map.insert(lib, deps);

        // Reversed so the first reference is visited first.
        for real in real_deps.into_iter().rev() {
            if !map.contains(&real) {
                to_process.push(real);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{write_mock_lib, FileTools};
    use tempfile::TempDir;

    #[test]
    fn test_parse_otool_output() {
        let matcher = DependencyMatcher::new(Path::new("/opt/homebrew")).unwrap();
        let output = "\
/opt/homebrew/lib/libadwaita-1.0.dylib:
\t/opt/homebrew/opt/libadwaita/lib/libadwaita-1.0.dylib (compatibility version 0.0.0, current version 0.0.0)
\t/opt/homebrew/opt/gtk4/lib/libgtk-4.1.dylib (compatibility version 1401.0.0, current version 1401.30.0)
\t@rpath/libwebp.7.dylib (compatibility version 10.0.0, current version 10.0.0)
\t/usr/lib/libSystem.B.dylib (compatibility version 1.0.0, current version 1345.100.2)
";
        let libs = parse_otool_output(output, &matcher, Path::new("/opt/homebrew/Cellar/x/lib"));
        assert_eq!(
            libs,
            vec![
                "/opt/homebrew/opt/libadwaita/lib/libadwaita-1.0.dylib",
                "/opt/homebrew/opt/gtk4/lib/libgtk-4.1.dylib",
                "/opt/homebrew/Cellar/x/lib/libwebp.7.dylib",
            ]
        );
    }

    #[test]
    fn test_parse_ignores_other_prefixes() {
        let matcher = DependencyMatcher::new(Path::new("/usr/local")).unwrap();
        let output = "\
\t/opt/homebrew/lib/libglib-2.0.0.dylib (compatibility version 1.0.0, current version 1.0.0)
\t/tmp/usr/local/lib/libfoo.dylib (compatibility version 1.0.0, current version 1.0.0)
\t/usr/local/lib/libintl.8.dylib (compatibility version 12.0.0, current version 12.0.0)
";
        let libs = parse_otool_output(output, &matcher, Path::new("/usr/local/lib"));
        assert_eq!(libs, vec!["/usr/local/lib/libintl.8.dylib"]);
    }

    #[test]
    fn test_parse_skips_headers_and_duplicates() {
        let matcher = DependencyMatcher::new(Path::new("/usr/local")).unwrap();
        let output = "\
/usr/local/lib/libfoo.dylib (architecture x86_64):
\t/usr/local/lib/libbar.dylib (compatibility version 1.0.0, current version 1.0.0)
/usr/local/lib/libfoo.dylib (architecture arm64):
\t/usr/local/lib/libbar.dylib (compatibility version 1.0.0, current version 1.0.0)
";
        let libs = parse_otool_output(output, &matcher, Path::new("/usr/local/lib"));
        assert_eq!(libs, vec!["/usr/local/lib/libbar.dylib"]);
    }

    #[test]
    fn test_collect_dependencies_is_closed() {
        let temp = TempDir::new().unwrap();
        let prefix = real_path(temp.path()).unwrap();
        let lib = prefix.join("lib");

        write_mock_lib(&lib.join("libc.dylib"), &[]);
        write_mock_lib(&lib.join("libb.dylib"), &[lib.join("libc.dylib").to_str().unwrap()]);
        std::os::unix::fs::symlink("libb.dylib", lib.join("libb.1.dylib")).unwrap();
        write_mock_lib(
            &lib.join("liba.dylib"),
            &[
                lib.join("libb.1.dylib").to_str().unwrap(),
                "@rpath/libc.dylib",
            ],
        );

        let matcher = DependencyMatcher::new(&prefix).unwrap();
        let mut map = DependencyMap::new();
        collect_dependencies(&FileTools, &lib.join("liba.dylib"), &matcher, &mut map).unwrap();

        let libs: Vec<_> = map.libraries().map(Path::to_path_buf).collect();
        assert_eq!(
            libs,
            vec![
                lib.join("liba.dylib"),
                lib.join("libb.dylib"),
                lib.join("libc.dylib"),
            ]
        );
        assert_eq!(map.get(&lib.join("libc.dylib")).unwrap().len(), 1);
        assert_eq!(map.get(&lib.join("libb.1.dylib")), None);
        for (_, deps) in map.iter() {
            for dep in deps {
                assert!(map.contains(&real_path(Path::new(dep)).unwrap()));
            }
        }
    }

    #[test]
    fn test_missing_library_fails() {
        let matcher = DependencyMatcher::new(Path::new("/usr/local")).unwrap();
        let result =
            get_library_dependencies(&FileTools, Path::new("/nonexistent/libx.dylib"), &matcher);
        assert!(result.unwrap_err().to_string().contains("does not exist"));
    }

    #[test]
    fn test_missing_dependency_fails() {
        let temp = TempDir::new().unwrap();
        let prefix = real_path(temp.path()).unwrap();
        let lib = prefix.join("lib/liba.dylib");
        write_mock_lib(&lib, &[prefix.join("lib/libgone.dylib").to_str().unwrap()]);

        let matcher = DependencyMatcher::new(&prefix).unwrap();
        let mut map = DependencyMap::new();
        let err = collect_dependencies(&FileTools, &lib, &matcher, &mut map).unwrap_err();
        assert!(format!("{:#}", err).contains("libgone.dylib"));
    }
}
