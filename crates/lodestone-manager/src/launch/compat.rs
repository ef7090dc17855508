//! Windows compatibility layer detection (Proton and Wine).

use lodestone_core::config::InstallationConfig;
use lodestone_core::platform::paths;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Guidance shown when a Windows-only title cannot run on this host.
pub const MISSING_LAYER_GUIDANCE: &str =
    "No Windows compatibility layer found. Install Wine or Proton through Steam, then try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompatibilityKind {
    Proton,
    Wine,
}

/// A detected compatibility runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatibilityLayer {
    pub kind: CompatibilityKind,
    pub executable: PathBuf,
    /// Steam installation the runtime belongs to, when known.
    pub steam_root: Option<PathBuf>,
}

impl CompatibilityLayer {
    /// Arguments that run `target` through this layer.
    pub fn args(&self, target: &Path) -> Vec<String> {
        let target = target.to_string_lossy().into_owned();
        match self.kind {
            CompatibilityKind::Proton => vec!["run".to_string(), target],
            CompatibilityKind::Wine => vec![target],
        }
    }

    /// Environment for running a title installed at `install_dir`.
    pub fn environment(&self, install_dir: &Path) -> HashMap<String, String> {
        let mut env = HashMap::new();
        match self.kind {
            CompatibilityKind::Proton => {
                let data = install_dir.join(InstallationConfig::PROTON_COMPAT_DATA_DIR);
                env.insert(
                    "STEAM_COMPAT_DATA_PATH".to_string(),
                    data.to_string_lossy().into_owned(),
                );
                let client = self
                    .steam_root
                    .clone()
                    .unwrap_or_else(|| install_dir.to_path_buf());
                env.insert(
                    "STEAM_COMPAT_CLIENT_INSTALL_PATH".to_string(),
                    client.to_string_lossy().into_owned(),
                );
            }
            CompatibilityKind::Wine => {
                let prefix = install_dir.join(InstallationConfig::WINE_PREFIX_DIR);
                env.insert("WINEPREFIX".to_string(), prefix.to_string_lossy().into_owned());
            }
        }
        env
    }

    /// Directory the layer expects to exist before launch.
    pub fn prefix_dir(&self, install_dir: &Path) -> PathBuf {
        match self.kind {
            CompatibilityKind::Proton => install_dir.join(InstallationConfig::PROTON_COMPAT_DATA_DIR),
            CompatibilityKind::Wine => install_dir.join(InstallationConfig::WINE_PREFIX_DIR),
        }
    }
}

/// Where to look for compatibility layers.
///
/// Built from the environment in production; tests construct it with
/// controlled directories.
#[derive(Debug, Clone, Default)]
pub struct CompatProbe {
    pub path_dirs: Vec<PathBuf>,
    pub steam_roots: Vec<PathBuf>,
}

impl CompatProbe {
    pub fn new(path_dirs: Vec<PathBuf>, steam_roots: Vec<PathBuf>) -> Self {
        Self {
            path_dirs,
            steam_roots,
        }
    }

    /// A probe that never finds anything.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Probe `PATH` and the user's Steam installations.
    pub fn from_env() -> Self {
        let path_dirs = std::env::var_os("PATH")
            .map(|p| std::env::split_paths(&p).collect())
            .unwrap_or_default();
        Self::new(path_dirs, paths::steam_roots())
    }

    /// Find the preferred layer: `proton` on PATH, then Wine, then Steam's Proton.
    pub fn detect(&self) -> Option<CompatibilityLayer> {
        if let Some(proton) = self.find_on_path("proton") {
            return Some(CompatibilityLayer {
                kind: CompatibilityKind::Proton,
                executable: proton,
                steam_root: self.steam_roots.iter().find(|r| r.is_dir()).cloned(),
            });
        }

        for wine in ["wine64", "wine"] {
            if let Some(executable) = self.find_on_path(wine) {
                return Some(CompatibilityLayer {
                    kind: CompatibilityKind::Wine,
                    executable,
                    steam_root: None,
                });
            }
        }

        self.find_steam_proton()
    }

    pub fn is_available(&self) -> bool {
        self.detect().is_some()
    }

    fn find_on_path(&self, name: &str) -> Option<PathBuf> {
        self.path_dirs
            .iter()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
    }

    /// Newest Proton runtime across all Steam roots, by folder name.
    fn find_steam_proton(&self) -> Option<CompatibilityLayer> {
        let mut found: Vec<(String, PathBuf, PathBuf)> = Vec::new();

        for root in &self.steam_roots {
            for search_dir in paths::proton_search_dirs(root) {
                let Ok(entries) = std::fs::read_dir(&search_dir) else {
                    continue;
                };
                for entry in entries.filter_map(|e| e.ok()) {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    let script = entry.path().join("proton");
                    if name.to_lowercase().contains("proton") && script.is_file() {
                        found.push((name, script, root.clone()));
                    }
                }
            }
        }

        let (name, executable, root) = found.into_iter().max_by(|a, b| a.0.cmp(&b.0))?;
        debug!("Using Steam Proton runtime {}", name);
        Some(CompatibilityLayer {
            kind: CompatibilityKind::Proton,
            executable,
            steam_root: Some(root),
        })
    }
}
