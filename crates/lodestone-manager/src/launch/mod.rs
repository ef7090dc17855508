//! Working out how to start an installed title.
//!
//! [`LaunchResolver::resolve_launch`] picks the executable for the platform,
//! honouring a stored preference, and wraps Windows builds in a
//! compatibility layer on Linux. The result is a plain [`LaunchSpec`].

pub mod candidates;
pub mod compat;

pub use compat::{CompatProbe, CompatibilityKind, CompatibilityLayer};

use crate::installer::markers;
use lodestone_core::platform::set_executable;
use lodestone_core::{LodestoneError, Result, TargetOs};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Everything needed to start a title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchSpec {
    pub command: PathBuf,
    pub arguments: Vec<String>,
    pub working_directory: PathBuf,
    pub environment: HashMap<String, String>,
    pub compatibility: Option<CompatibilityKind>,
    /// The executable or bundle that was selected.
    pub target: PathBuf,
}

impl LaunchSpec {
    /// Start the process without waiting for it.
    pub fn spawn(&self) -> Result<tokio::process::Child> {
        info!(
            "Launching {} {:?} in {}",
            self.command.display(),
            self.arguments,
            self.working_directory.display()
        );
        tokio::process::Command::new(&self.command)
            .args(&self.arguments)
            .current_dir(&self.working_directory)
            .envs(&self.environment)
            .spawn()
            .map_err(|e| LodestoneError::LaunchFailed {
                command: self.command.display().to_string(),
                message: e.to_string(),
            })
    }
}

/// Resolves launch specs for installed titles.
#[derive(Debug, Clone)]
pub struct LaunchResolver {
    probe: CompatProbe,
}

impl LaunchResolver {
    pub fn new(probe: CompatProbe) -> Self {
        Self { probe }
    }

    pub fn probe(&self) -> &CompatProbe {
        &self.probe
    }

    /// Decide what to run for the title installed at `install_dir`.
    ///
    /// Fails with `SelectionRequired` when several candidates exist and
    /// `stored_preference` does not point at an existing file. On Linux, an
    /// install holding only Windows builds fails with
    /// `CompatibilityLayerUnavailable` first when no layer is present.
    pub fn resolve_launch(
        &self,
        install_dir: &Path,
        platform: TargetOs,
        stored_preference: Option<&Path>,
    ) -> Result<LaunchSpec> {
        self.resolve_project_launch(install_dir, platform, stored_preference, None)
    }

    /// [`resolve_launch`](Self::resolve_launch) that also accepts a small
    /// extensionless launcher named after `project_hint`.
    pub fn resolve_project_launch(
        &self,
        install_dir: &Path,
        platform: TargetOs,
        stored_preference: Option<&Path>,
        project_hint: Option<&str>,
    ) -> Result<LaunchSpec> {
        if !install_dir.is_dir() {
            return Err(LodestoneError::NoExecutableFound(install_dir.to_path_buf()));
        }

        let preferred = stored_preference.filter(|p| p.exists());
        let mut found = candidates::root_executables(install_dir, platform, project_hint);
        if found.is_empty() && platform.is_linux() {
            found = candidates::windows_executables(install_dir);
            if !found.is_empty() {
                debug!(
                    "Only Windows executables in {}, a compatibility layer is required",
                    install_dir.display()
                );
                let native_preference =
                    preferred.is_some_and(|p| !candidates::is_windows_executable(p));
                if !native_preference && self.probe.detect().is_none() {
                    return Err(LodestoneError::CompatibilityLayerUnavailable {
                        guidance: compat::MISSING_LAYER_GUIDANCE.to_string(),
                    });
                }
            }
        }

        let target = match preferred {
            Some(preferred) => preferred.to_path_buf(),
            None => match found.len() {
                0 => return Err(LodestoneError::NoExecutableFound(install_dir.to_path_buf())),
                1 => found.remove(0),
                _ => return Err(LodestoneError::SelectionRequired { candidates: found }),
            },
        };

        let spec = self.build_spec(install_dir, platform, target)?;

        if let Err(e) = markers::write_last_played(install_dir) {
            warn!("Could not record last played time: {}", e);
        }
        Ok(spec)
    }

    fn build_spec(&self, install_dir: &Path, platform: TargetOs, target: PathBuf) -> Result<LaunchSpec> {
        let working_directory = target
            .parent()
            .filter(|p| p.starts_with(install_dir))
            .unwrap_or(install_dir)
            .to_path_buf();

        if platform.is_linux() && candidates::is_windows_executable(&target) {
            let layer = self.probe.detect().ok_or_else(|| {
                LodestoneError::CompatibilityLayerUnavailable {
                    guidance: compat::MISSING_LAYER_GUIDANCE.to_string(),
                }
            })?;
            let prefix = layer.prefix_dir(install_dir);
            std::fs::create_dir_all(&prefix).map_err(|e| LodestoneError::io_with_path(e, &prefix))?;

            return Ok(LaunchSpec {
                command: layer.executable.clone(),
                arguments: layer.args(&target),
                working_directory,
                environment: layer.environment(install_dir),
                compatibility: Some(layer.kind),
                target,
            });
        }

        if candidates::is_app_bundle(&target) {
            return Ok(LaunchSpec {
                command: PathBuf::from("open"),
                arguments: vec!["-W".to_string(), target.to_string_lossy().into_owned()],
                working_directory: install_dir.to_path_buf(),
                environment: HashMap::new(),
                compatibility: None,
                target,
            });
        }

        if platform != TargetOs::Windows && !cfg!(windows) {
            if let Err(e) = set_executable(&target) {
                warn!("Could not mark {} executable: {}", target.display(), e);
            }
        }

        Ok(LaunchSpec {
            command: target.clone(),
            arguments: Vec::new(),
            working_directory,
            environment: HashMap::new(),
            compatibility: None,
            target,
        })
    }
}
