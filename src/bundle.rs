//! Vendoring a prefix's libraries and resources into `Contents/Resources`.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::analyze::{collect_dependencies, get_library_dependencies, DependencyMap, DependencyMatcher};
use crate::config::BundleConfig;
use crate::copy::{copy_dir_recursive, copy_library_into, create_symlink_if_missing};
use crate::paths::{absolute_path, file_name_str, find_files, is_plugin_file, package_root};
use crate::rewrite::{fix_install_names, install_plugin_cache};
use crate::tools::MachOTools;

/// What a bundling run produced.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BundleReport {
    /// Libraries copied into `Resources/lib`.
    pub libraries: usize,
    /// Plugin modules whose load paths were rewritten in place.
    pub plugins: usize,
    /// Bytes of locale, icon, plugin and schema files copied.
    pub resource_bytes: u64,
}

pub struct Bundler<'a> {
    tools: &'a dyn MachOTools,
    prefix: PathBuf,
    resource_dir: PathBuf,
    config: BundleConfig,
    matcher: DependencyMatcher,
}

impl<'a> Bundler<'a> {
    /// A relative `prefix` is made absolute against the working directory.
    pub fn new(
        tools: &'a dyn MachOTools,
        prefix: &Path,
        resource_dir: &Path,
        config: BundleConfig,
    ) -> Result<Self> {
        let prefix = absolute_path(prefix)?;
        Ok(Self {
            tools,
            matcher: DependencyMatcher::new(&prefix)?,
            prefix,
            resource_dir: resource_dir.to_path_buf(),
            config,
        })
    }

    #[must_use]
    pub fn lib_install_dir(&self) -> PathBuf {
        self.resource_dir.join("lib")
    }

    /// Run every bundling step in order.
    pub fn run(&self) -> Result<BundleReport> {
        let mut report = BundleReport::default();

        let deps = self.collect()?;
        report.libraries = self.install_libraries(&deps)?;
        self.create_symlinks()?;

        let locale_src = package_root(&self.prefix, &self.config.gtk_lib, 1)?.join("share/locale");
        info!("Copying translations from {}", locale_src.display());
        report.resource_bytes +=
            copy_dir_recursive(&locale_src, &self.resource_dir.join("share/locale"))?;

        let icons_src = package_root(&self.prefix, &self.config.icon_theme, 1)?;
        info!("Copying icons from {}", icons_src.display());
        report.resource_bytes +=
            copy_dir_recursive(&icons_src, &self.resource_dir.join("share/icons"))?;

        for plugin_dir in &self.config.plugin_dirs {
            let (plugins, bytes) = self.install_plugins(&plugin_dir.path)?;
            report.plugins += plugins;
            report.resource_bytes += bytes;
            if let Some(cache) = &plugin_dir.cache {
                install_plugin_cache(&self.prefix, cache, &self.resource_dir)?;
            }
        }

        for res in &self.config.resource_dirs {
            info!("Copying {}", res);
            report.resource_bytes +=
                copy_dir_recursive(&self.prefix.join(res), &self.resource_dir.join(res))?;
        }

        Ok(report)
    }

    /// Collect the dependency closure of the root libraries and of every plugin.
    ///
    /// Plugins are analysed from the prefix so libraries only they use are
    /// vendored too.
    pub fn collect(&self) -> Result<DependencyMap> {
        let mut deps = DependencyMap::new();

        for root in &self.config.root_libs {
            info!("Collecting dependencies of {}", root);
            collect_dependencies(self.tools, &self.prefix.join(root), &self.matcher, &mut deps)
                .with_context(|| format!("Failed to collect dependencies of {}", root))?;
        }

        for plugin_dir in &self.config.plugin_dirs {
            let dir = self.prefix.join(&plugin_dir.path);
            for plugin in find_files(&dir, is_plugin_file)? {
                collect_dependencies(self.tools, &plugin, &self.matcher, &mut deps)?;
            }
        }

        if deps.is_empty() {
            bail!("Nothing to bundle: no root libraries or plugins are configured");
        }
        info!("Found {} libraries", deps.len());
        Ok(deps)
    }

    /// Copy every collected library into `Resources/lib` and fix its load paths.
    fn install_libraries(&self, deps: &DependencyMap) -> Result<usize> {
        let lib_install_dir = self.lib_install_dir();
        fs::create_dir_all(&lib_install_dir)
            .with_context(|| format!("Failed to create {}", lib_install_dir.display()))?;

        let mut installed: HashMap<&str, &Path> = HashMap::new();
        for (lib, lib_deps) in deps.iter() {
            if is_plugin_file(lib) {
                continue;
            }
            let name = file_name_str(lib)?;
            if let Some(other) = installed.insert(name, lib) {
                bail!(
                    "Libraries {} and {} would both be installed as {}",
                    other.display(),
                    lib.display(),
                    name
                );
            }

            let lib_copy = copy_library_into(lib, &lib_install_dir)?;
            debug!("Installed {}", lib_copy.display());
            fix_install_names(self.tools, &lib_copy, lib_deps)?;
        }

        Ok(installed.len())
    }

    fn create_symlinks(&self) -> Result<()> {
        let lib_install_dir = self.lib_install_dir();
        for symlink in &self.config.symlinks {
            if !lib_install_dir.join(&symlink.target).exists() {
                warn!(
                    "Symlink {} points at {}, which was not bundled",
                    symlink.link, symlink.target
                );
            }
            if create_symlink_if_missing(
                Path::new(&symlink.target),
                &lib_install_dir.join(&symlink.link),
            )? {
                debug!("Linked {} -> {}", symlink.link, symlink.target);
            }
        }
        Ok(())
    }

    /// Copy a plugin directory into the bundle and fix the load paths of its modules.
    ///
    /// Returns the number of modules patched and the bytes copied.
    fn install_plugins(&self, plugin_path: &str) -> Result<(usize, u64)> {
        info!("Copying plugins from {}", plugin_path);
        let dest = self.resource_dir.join(plugin_path);
        let bytes = copy_dir_recursive(&self.prefix.join(plugin_path), &dest)?;

        let plugins = find_files(&dest, is_plugin_file)?;
        for plugin in &plugins {
            let plugin_deps = get_library_dependencies(self.tools, plugin, &self.matcher)?;
            fix_install_names(self.tools, plugin, &plugin_deps)?;
        }

        Ok((plugins.len(), bytes))
    }
}
