//! Vendor GTK libraries into a macOS application bundle.
//!
//! Collects the dependency closure of a set of libraries with `otool -L`,
//! copies it into `Contents/Resources/lib` and rewrites every load path with
//! `install_name_tool` so it resolves relative to `@executable_path`. Plugin
//! directories (pixbuf loaders, input methods), their caches, translations,
//! icons and GSettings schemas are copied alongside.

mod analyze;
mod bundle;
mod config;
mod copy;
mod paths;
mod rewrite;
#[cfg(test)]
mod test_support;
mod tools;
mod verify;

pub use analyze::{
    collect_dependencies, get_library_dependencies, parse_otool_output, DependencyMap,
    DependencyMatcher,
};
pub use bundle::{BundleReport, Bundler};
pub use config::{BundleConfig, LibrarySymlink, PluginDir, Profile};
pub use copy::{copy_dir_recursive, copy_library_into, create_symlink_if_missing, make_user_writable};
pub use paths::{
    absolute_path, bundled_install_name, find_files, is_mach_o_library, is_plugin_file, package_root, real_path,
    resolve_dependency, Runtime, BUNDLE_LIB_PREFIX, BUNDLE_RESOURCES_PREFIX,
};
pub use rewrite::{fix_install_names, install_name_changes, install_plugin_cache, rewrite_cache_paths};
pub use tools::{InstallNameChange, InstallNameEdit, MachOTools, XcodeTools};
pub use verify::{verify_bundle, Violation};
