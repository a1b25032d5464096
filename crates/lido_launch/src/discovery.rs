//! Sub-application discovery
//!
//! Every immediate subdirectory of the apps root that carries a
//! `manifest.json` becomes one dev-server peer.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::config::{SubstitutionContext, SubstitutionError, APP_DIR_ARG};

pub const MANIFEST_FILE: &str = "manifest.json";

/// Candidate roots, relative to the project root, tried in order
pub const DEFAULT_APP_ROOTS: &[&str] = &["apps/", "../apps/"];

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    name: String,
}

/// A sub-application directory and its declared name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDir {
    pub dir: PathBuf,
    pub name: String,
}

/// A discovered sub-application and the command that serves it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppManifest {
    pub dir: PathBuf,
    pub name: String,
    pub command: Vec<String>,
}

/// Pick the directory to scan.
///
/// An explicit root must exist. Without one, the first existing default
/// candidate is used; `None` means there is nothing to scan.
pub fn resolve_root(
    explicit: Option<&Path>,
    project_root: &Path,
) -> Result<Option<PathBuf>, DiscoveryError> {
    if let Some(path) = explicit {
        let path = project_root.join(path);
        if !path.is_dir() {
            return Err(DiscoveryError::MissingRoot(path));
        }
        return Ok(Some(path));
    }

    Ok(DEFAULT_APP_ROOTS
        .iter()
        .map(|candidate| project_root.join(candidate))
        .find(|path| path.is_dir()))
}

/// Scan `root` for sub-applications, in directory-name order.
///
/// Every manifest is parsed here, so a broken one is reported before any
/// command is built. Two directories declaring the same name are an error.
pub fn scan_apps(root: &Path) -> Result<Vec<AppDir>, DiscoveryError> {
    log::info!("Checking apps in {}", root.display());

    let entries = std::fs::read_dir(root).map_err(|e| DiscoveryError::Io {
        path: root.to_path_buf(),
        source: e,
    })?;

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| DiscoveryError::Io {
            path: root.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();

    let mut apps: Vec<AppDir> = Vec::new();
    for dir in dirs {
        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            log::debug!(
                "Manifest {} doesn't exist, skipping",
                manifest_path.display()
            );
            continue;
        }

        let content = std::fs::read_to_string(&manifest_path).map_err(|e| DiscoveryError::Io {
            path: manifest_path.clone(),
            source: e,
        })?;
        let manifest: Manifest =
            serde_json::from_str(&content).map_err(|e| DiscoveryError::Manifest {
                path: manifest_path.clone(),
                source: e,
            })?;

        let name = if manifest.name.trim().is_empty() {
            let fallback = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            log::warn!(
                "{} has no name, using '{}'",
                manifest_path.display(),
                fallback
            );
            fallback
        } else {
            manifest.name
        };

        if let Some(first) = apps.iter().find(|app| app.name == name) {
            return Err(DiscoveryError::DuplicateName {
                name,
                first: first.dir.clone(),
                second: dir,
            });
        }

        log::info!("Found app: {}", name);
        apps.push(AppDir { dir, name });
    }

    if apps.is_empty() {
        log::info!("No apps found in {}", root.display());
    }

    Ok(apps)
}

/// Build each app's command from `template`, binding `$(arg app_dir)` to
/// the app's directory.
pub fn expand_commands(
    apps: &[AppDir],
    template: &[String],
    ctx: &SubstitutionContext,
) -> Result<Vec<AppManifest>, DiscoveryError> {
    apps.iter()
        .map(|app| {
            let app_ctx = ctx
                .clone()
                .with_arg(APP_DIR_ARG, app.dir.to_string_lossy().into_owned());
            let command = app_ctx
                .substitute_all(template)
                .map_err(|e| DiscoveryError::Template {
                    app: app.name.clone(),
                    source: e,
                })?;
            Ok(AppManifest {
                dir: app.dir.clone(),
                name: app.name.clone(),
                command,
            })
        })
        .collect()
}

/// [`scan_apps`] followed by [`expand_commands`]
pub fn discover_apps(
    root: &Path,
    template: &[String],
    ctx: &SubstitutionContext,
) -> Result<Vec<AppManifest>, DiscoveryError> {
    let apps = scan_apps(root)?;
    expand_commands(&apps, template, ctx)
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Apps directory '{}' does not exist", .0.display())]
    MissingRoot(PathBuf),

    #[error("Failed to scan '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid manifest '{}': {source}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(
        "Apps '{}' and '{}' are both named '{name}'",
        first.display(),
        second.display()
    )]
    DuplicateName {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Failed to build command for app '{app}': {source}")]
    Template {
        app: String,
        #[source]
        source: SubstitutionError,
    },
}
