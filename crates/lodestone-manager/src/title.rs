//! Installation lifecycle of a single title.
//!
//! ```text
//! NotInstalled -> Downloading -> Installing -> Installed
//! Installed -> UpdateAvailable -> Updating -> Installed
//! ```
//!
//! Status changes are published on a `tokio::sync::watch` channel. Only one
//! install, update or uninstall runs per title at a time; concurrent calls
//! fail with `InstallInProgress` instead of queueing.

use crate::installer::{markers, plan_asset, ArchiveInstaller, InstallReport};
use crate::launch::{LaunchResolver, LaunchSpec};
use crate::progress::{InstallStage, ProgressUpdate};
use lodestone_core::config::InstallationConfig;
use lodestone_core::platform::{remove_path_best_effort, remove_path_with_retry};
use lodestone_core::{
    CancellationToken, LodestoneError, PlatformDescriptor, Release, ReleaseResolver, Result,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{info, warn};

/// Where a title is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TitleStatus {
    NotInstalled,
    Downloading,
    Installing,
    Installed { version: String },
    UpdateAvailable { installed: String, latest: String },
    Updating,
}

impl TitleStatus {
    /// An install, update or uninstall is running.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            TitleStatus::Downloading | TitleStatus::Installing | TitleStatus::Updating
        )
    }

    pub fn installed_version(&self) -> Option<&str> {
        match self {
            TitleStatus::Installed { version } => Some(version),
            TitleStatus::UpdateAvailable { installed, .. } => Some(installed),
            _ => None,
        }
    }
}

/// Manages installing, updating and launching one title.
pub struct TitleManager {
    repo: String,
    install_dir: PathBuf,
    platform: PlatformDescriptor,
    resolver: Arc<ReleaseResolver>,
    installer: Arc<ArchiveInstaller>,
    launcher: Arc<LaunchResolver>,
    status_tx: watch::Sender<TitleStatus>,
    /// Held for the duration of install, update and uninstall.
    install_lock: Mutex<()>,
}

impl TitleManager {
    pub fn new(
        repo: impl Into<String>,
        install_dir: impl Into<PathBuf>,
        platform: PlatformDescriptor,
        resolver: Arc<ReleaseResolver>,
        installer: Arc<ArchiveInstaller>,
        launcher: Arc<LaunchResolver>,
    ) -> Self {
        let install_dir = install_dir.into();
        let (status_tx, _) = watch::channel(status_from_disk(&install_dir));
        Self {
            repo: repo.into(),
            install_dir,
            platform,
            resolver,
            installer,
            launcher,
            status_tx,
            install_lock: Mutex::new(()),
        }
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// Name segment of the repository, used to recognise the main executable.
    pub fn project_name(&self) -> Option<&str> {
        project_name(&self.repo)
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    pub fn platform(&self) -> PlatformDescriptor {
        self.platform
    }

    pub fn status(&self) -> TitleStatus {
        self.status_tx.borrow().clone()
    }

    /// Receive every status change.
    pub fn subscribe(&self) -> watch::Receiver<TitleStatus> {
        self.status_tx.subscribe()
    }

    /// Version tag recorded in `version.txt`.
    pub fn installed_version(&self) -> Option<String> {
        markers::read_version(&self.install_dir)
    }

    /// Last resolved release, without network traffic.
    pub fn current_release(&self) -> Option<Release> {
        self.resolver.current_release(&self.repo)
    }

    fn set_status(&self, status: TitleStatus) {
        let previous = self.status_tx.send_replace(status.clone());
        if previous != status {
            info!("{}: {:?} -> {:?}", self.repo, previous, status);
        }
    }

    fn busy_error(&self) -> LodestoneError {
        LodestoneError::InstallInProgress {
            title: self.repo.clone(),
        }
    }

    /// Compare the installed version with the latest release.
    ///
    /// While an operation is running the current status is returned as-is.
    /// Upstream failures keep an installed title `Installed`.
    pub async fn refresh_status(&self, force: bool) -> Result<TitleStatus> {
        let Ok(_guard) = self.install_lock.try_lock() else {
            return Ok(self.status());
        };

        let installed = self.installed_version();
        let status = match self
            .resolver
            .resolve(&self.repo, installed.is_some(), force)
            .await
        {
            Ok(release) => match installed {
                Some(version) if version == release.tag => TitleStatus::Installed { version },
                Some(version) => TitleStatus::UpdateAvailable {
                    installed: version,
                    latest: release.tag,
                },
                None => TitleStatus::NotInstalled,
            },
            Err(e) => match installed {
                Some(version) => {
                    warn!("Could not check {} for updates: {}", self.repo, e);
                    TitleStatus::Installed { version }
                }
                None => {
                    self.set_status(TitleStatus::NotInstalled);
                    return Err(e);
                }
            },
        };

        self.set_status(status.clone());
        Ok(status)
    }

    /// Install the latest release.
    ///
    /// Reinstalls over an existing installation.
    pub async fn install(
        &self,
        progress: Option<mpsc::Sender<ProgressUpdate>>,
        cancel: &CancellationToken,
    ) -> Result<InstallReport> {
        let _guard = self.install_lock.try_lock().map_err(|_| self.busy_error())?;
        self.run_install(progress, cancel).await
    }

    /// Update to the latest release.
    ///
    /// Returns `None` when the installed version is already current.
    pub async fn update(
        &self,
        progress: Option<mpsc::Sender<ProgressUpdate>>,
        cancel: &CancellationToken,
    ) -> Result<Option<InstallReport>> {
        let _guard = self.install_lock.try_lock().map_err(|_| self.busy_error())?;

        let Some(installed) = self.installed_version() else {
            return Err(LodestoneError::Other(format!(
                "{} is not installed",
                self.repo
            )));
        };
        let latest = self.resolver.resolve(&self.repo, true, true).await?;
        if latest.tag == installed {
            self.set_status(TitleStatus::Installed { version: installed });
            return Ok(None);
        }

        self.run_install(progress, cancel).await.map(Some)
    }

    async fn run_install(
        &self,
        progress: Option<mpsc::Sender<ProgressUpdate>>,
        cancel: &CancellationToken,
    ) -> Result<InstallReport> {
        let is_update = self.installed_version().is_some();
        let dir_existed = self.install_dir.exists();
        self.set_status(if is_update {
            TitleStatus::Updating
        } else {
            TitleStatus::Downloading
        });

        let result = self
            .install_latest(is_update, progress, cancel)
            .await;

        match result {
            Ok(report) => {
                self.set_status(TitleStatus::Installed {
                    version: report.version.clone(),
                });
                Ok(report)
            }
            Err(e) => {
                warn!("Installation of {} failed: {}", self.repo, e);
                if !dir_existed && self.install_dir.exists() {
                    let dir = self.install_dir.clone();
                    let _ = tokio::task::spawn_blocking(move || remove_path_best_effort(&dir)).await;
                }
                self.set_status(status_from_disk(&self.install_dir));
                Err(e)
            }
        }
    }

    async fn install_latest(
        &self,
        is_update: bool,
        progress: Option<mpsc::Sender<ProgressUpdate>>,
        cancel: &CancellationToken,
    ) -> Result<InstallReport> {
        let release = self
            .resolver
            .resolve(&self.repo, is_update, false)
            .await?;
        let plan = plan_asset(&release, self.platform.os, self.launcher.probe())?;

        if is_update {
            markers::clear_version(&self.install_dir)?;
        }

        let (inner_tx, inner_rx) = mpsc::channel(64);
        let (result, ()) = tokio::join!(
            self.installer.install_project(
                &plan.asset,
                &release.tag,
                &self.install_dir,
                plan.target_os,
                self.project_name(),
                Some(inner_tx),
                cancel,
            ),
            self.relay_progress(inner_rx, progress.as_ref(), is_update)
        );
        result
    }

    /// Forward installer progress and move to `Installing` once extraction starts.
    async fn relay_progress(
        &self,
        mut rx: mpsc::Receiver<ProgressUpdate>,
        progress: Option<&mpsc::Sender<ProgressUpdate>>,
        is_update: bool,
    ) {
        while let Some(update) = rx.recv().await {
            if !is_update
                && matches!(
                    update,
                    ProgressUpdate::StageChanged {
                        stage: InstallStage::Extract,
                        ..
                    }
                )
            {
                self.set_status(TitleStatus::Installing);
            }
            if let Some(tx) = progress {
                let _ = tx.send(update).await;
            }
        }
    }

    /// Delete the installation directory.
    pub async fn uninstall(&self) -> Result<()> {
        let _guard = self.install_lock.try_lock().map_err(|_| self.busy_error())?;

        let dir = self.install_dir.clone();
        tokio::task::spawn_blocking(move || {
            remove_path_with_retry(
                &dir,
                InstallationConfig::DELETE_RETRY_ATTEMPTS,
                InstallationConfig::DELETE_RETRY_BASE_DELAY,
            )
            .map_err(|e| LodestoneError::io_with_path(e, &dir))
        })
        .await
        .map_err(|e| LodestoneError::Other(format!("Uninstall task failed: {}", e)))??;

        info!("Uninstalled {} from {}", self.repo, self.install_dir.display());
        self.set_status(TitleStatus::NotInstalled);
        Ok(())
    }

    /// Switch portable mode on or off.
    pub fn set_portable(&self, portable: bool) -> Result<()> {
        if !self.install_dir.is_dir() {
            return Err(LodestoneError::NoExecutableFound(self.install_dir.clone()));
        }
        markers::set_portable(&self.install_dir, portable)
    }

    pub fn is_portable(&self) -> bool {
        markers::is_portable(&self.install_dir)
    }

    /// Persist the executable to launch when several are available.
    pub fn select_executable(&self, executable: &Path) -> Result<()> {
        let absolute = if executable.is_absolute() {
            executable.to_path_buf()
        } else {
            self.install_dir.join(executable)
        };
        if !absolute.exists() {
            return Err(LodestoneError::NoExecutableFound(absolute));
        }
        markers::write_selected_executable(&self.install_dir, &absolute)
    }

    /// Resolve how to start the title, honouring the stored selection.
    pub fn launch_spec(&self) -> Result<LaunchSpec> {
        let preference = markers::read_selected_executable(&self.install_dir);
        self.launcher.resolve_project_launch(
            &self.install_dir,
            self.platform.os,
            preference.as_deref(),
            self.project_name(),
        )
    }

    /// Resolve and start the title.
    pub fn launch(&self) -> Result<tokio::process::Child> {
        self.launch_spec()?.spawn()
    }
}

fn project_name(repo: &str) -> Option<&str> {
    repo.rsplit('/')
        .next()
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

fn status_from_disk(install_dir: &Path) -> TitleStatus {
    match markers::read_version(install_dir) {
        Some(version) => TitleStatus::Installed { version },
        None => TitleStatus::NotInstalled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_states() {
        assert!(TitleStatus::Downloading.is_busy());
        assert!(TitleStatus::Installing.is_busy());
        assert!(TitleStatus::Updating.is_busy());
        assert!(!TitleStatus::NotInstalled.is_busy());
        assert!(!TitleStatus::Installed {
            version: "v1".into()
        }
        .is_busy());
    }

    #[test]
    fn test_installed_version_accessor() {
        let status = TitleStatus::UpdateAvailable {
            installed: "v1".into(),
            latest: "v2".into(),
        };
        assert_eq!(status.installed_version(), Some("v1"));
        assert_eq!(TitleStatus::NotInstalled.installed_version(), None);
    }

    #[test]
    fn test_project_name_from_repository() {
        assert_eq!(project_name("studio/starfall"), Some("starfall"));
        assert_eq!(project_name("starfall"), Some("starfall"));
        assert_eq!(project_name("studio/"), None);
    }

    #[test]
    fn test_status_serializes_with_state_tag() {
        let json = serde_json::to_value(TitleStatus::Installed {
            version: "v1".into(),
        })
        .unwrap();
        assert_eq!(json["state"], "installed");
        assert_eq!(json["version"], "v1");
    }
}
