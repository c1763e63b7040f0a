//! Bundle layouts: which libraries, plugins and resources go into the bundle.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A directory of loadable modules copied as-is, with an optional cache file
/// whose paths are rewritten into the bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDir {
    /// Relative to the prefix, e.g. `lib/gdk-pixbuf-2.0/2.10.0`.
    pub path: String,
    /// Relative to the prefix, e.g. `lib/gdk-pixbuf-2.0/2.10.0/loaders.cache`.
    #[serde(default)]
    pub cache: Option<String>,
}

/// A symlink created inside `Resources/lib`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibrarySymlink {
    pub link: String,
    pub target: String,
}

/// Everything that varies between GTK versions. All paths are relative to
/// the package prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BundleConfig {
    /// Libraries whose dependency closure is vendored into `Resources/lib`.
    pub root_libs: Vec<String>,
    /// The GTK library; `share/locale` is copied from its package.
    pub gtk_lib: String,
    /// An icon theme's `index.theme`; the whole icons root is copied.
    pub icon_theme: String,
    pub plugin_dirs: Vec<PluginDir>,
    /// Copied verbatim to the same relative path under `Resources`.
    pub resource_dirs: Vec<String>,
    pub symlinks: Vec<LibrarySymlink>,
}

/// Built-in layouts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Profile {
    /// GTK 4 with libadwaita.
    #[default]
    Adwaita,
    /// GTK 3 with input method modules.
    Gtk3,
}

const PIXBUF_LOADERS: &str = "lib/gdk-pixbuf-2.0/2.10.0";
const GLIB_SCHEMAS: &str = "share/glib-2.0/schemas";
const ADWAITA_THEME: &str = "share/icons/Adwaita/index.theme";

impl Profile {
    #[must_use]
    pub fn config(self) -> BundleConfig {
        match self {
            Profile::Adwaita => BundleConfig {
                root_libs: strings(&[
                    "lib/libadwaita-1.0.dylib",
                    "lib/librsvg-2.2.dylib",
                    "lib/libtiff.6.dylib",
                    "lib/libwebpdemux.2.dylib",
                    "lib/libwebpmux.3.dylib",
                ]),
                gtk_lib: "lib/libadwaita-1.0.dylib".to_string(),
                icon_theme: ADWAITA_THEME.to_string(),
                plugin_dirs: vec![pixbuf_loaders()],
                resource_dirs: strings(&[GLIB_SCHEMAS]),
                // GtkSharp loads the unversioned name.
                symlinks: vec![LibrarySymlink {
                    link: "libgdk_pixbuf-2.0.dylib".to_string(),
                    target: "libgdk_pixbuf-2.0.0.dylib".to_string(),
                }],
            },
            Profile::Gtk3 => BundleConfig {
                root_libs: strings(&["lib/libgtk-3.0.dylib", "lib/librsvg-2.2.dylib"]),
                gtk_lib: "lib/libgtk-3.0.dylib".to_string(),
                icon_theme: ADWAITA_THEME.to_string(),
                plugin_dirs: vec![
                    pixbuf_loaders(),
                    PluginDir {
                        path: "lib/gtk-3.0/3.0.0/immodules".to_string(),
                        cache: Some("lib/gtk-3.0/3.0.0/immodules.cache".to_string()),
                    },
                ],
                resource_dirs: strings(&[GLIB_SCHEMAS]),
                symlinks: Vec::new(),
            },
        }
    }
}

fn pixbuf_loaders() -> PluginDir {
    PluginDir {
        path: PIXBUF_LOADERS.to_string(),
        cache: Some(format!("{PIXBUF_LOADERS}/loaders.cache")),
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

impl Default for BundleConfig {
    fn default() -> Self {
        Profile::default().config()
    }
}

impl BundleConfig {
    /// Parse a TOML layout. Keys that are left out keep the default profile's values.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Invalid bundle configuration")
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml_str(&contents).with_context(|| format!("In {}", path.display()))
    }
}
