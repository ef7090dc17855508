//! Downloading and unpacking release assets into an install directory.
//!
//! An installation runs through fixed stages (see [`InstallStage`]):
//! pre-flight, download into a scratch directory beside the destination,
//! extraction and flattening inside that scratch directory, a merge into the
//! destination, and finally writing `version.txt`. The version marker is the
//! commit point: a directory without it is not installed.

pub mod archive;
pub mod flatten;
pub mod fsops;
pub mod markers;
pub mod plan;
pub mod tar_reader;

pub use archive::ArchiveKind;
pub use flatten::{ensure_executable_at_root, FlattenOutcome};
pub use plan::{plan_asset, AssetPlan};

use crate::launch::candidates;
use crate::progress::{download_percent, InstallStage, ProgressUpdate};
use fsops::CollisionPolicy;
use lodestone_core::config::InstallationConfig;
use lodestone_core::network::{DownloadProgress, Downloader, HttpClient};
use lodestone_core::platform::{remove_path_best_effort, set_executable};
use lodestone_core::{Asset, CancellationToken, LodestoneError, Result, TargetOs};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Summary of a finished installation.
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub version: String,
    pub install_dir: PathBuf,
    pub asset_file_name: String,
    pub kind: ArchiveKind,
    pub bytes_downloaded: u64,
    pub flatten: FlattenOutcome,
    pub portable_marker_created: bool,
}

/// Scratch directory beside the destination.
///
/// [`ScratchDir::remove`] deletes it with retries on the blocking pool.
/// Dropping it without that, as when the install future is abandoned, makes
/// a single attempt.
struct ScratchDir {
    path: PathBuf,
    removed: bool,
}

impl ScratchDir {
    fn create_beside(destination: &Path) -> Result<Self> {
        let parent = destination
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir);
        let stem = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "install".to_string());
        let path = parent.join(format!(
            "{}{}-{}-{}",
            InstallationConfig::SCRATCH_DIR_PREFIX,
            stem,
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        std::fs::create_dir_all(&path).map_err(|e| LodestoneError::io_with_path(e, &path))?;
        Ok(Self {
            path,
            removed: false,
        })
    }

    async fn remove(mut self) {
        self.removed = true;
        let path = self.path.clone();
        match tokio::task::spawn_blocking(move || remove_path_best_effort(&path)).await {
            Ok(true) => debug!("Removed scratch directory {}", self.path.display()),
            Ok(false) => {}
            Err(e) => warn!("Scratch cleanup task failed: {}", e),
        }
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.removed || !self.path.exists() {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            warn!("Could not remove scratch directory {}: {}", self.path.display(), e);
        }
    }
}

async fn emit(progress: Option<&mpsc::Sender<ProgressUpdate>>, update: ProgressUpdate) {
    if let Some(tx) = progress {
        let _ = tx.send(update).await;
    }
}

async fn enter_stage(
    progress: Option<&mpsc::Sender<ProgressUpdate>>,
    stage: InstallStage,
    message: &str,
) {
    emit(progress, ProgressUpdate::stage(stage, message)).await;
    emit(progress, ProgressUpdate::overall(stage.start_percent())).await;
}

/// Relay downloader progress as overall installation progress.
async fn forward_download_progress(
    mut rx: mpsc::Receiver<DownloadProgress>,
    progress: Option<&mpsc::Sender<ProgressUpdate>>,
) {
    while let Some(update) = rx.recv().await {
        emit(
            progress,
            ProgressUpdate::Download {
                downloaded_bytes: update.bytes_downloaded,
                total_bytes: update.total_bytes,
            },
        )
        .await;
        if let Some(fraction) = update.fraction() {
            emit(progress, ProgressUpdate::overall(download_percent(fraction))).await;
        }
    }
}

/// Leading word of an asset name, used to recognise the main executable.
fn project_hint(file_name: &str) -> Option<String> {
    file_name
        .split(['-', '_', '.', ' '])
        .next()
        .filter(|s| s.len() >= 2)
        .map(str::to_string)
}

/// Installs release assets.
pub struct ArchiveInstaller {
    downloader: Downloader,
}

impl ArchiveInstaller {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self {
            downloader: Downloader::new(http),
        }
    }

    /// Download `asset` and lay it out under `destination`.
    ///
    /// `target_os` is the platform the asset was built for, which differs
    /// from the host when a compatibility layer runs it.
    pub async fn install(
        &self,
        asset: &Asset,
        version_tag: &str,
        destination: &Path,
        target_os: TargetOs,
        progress: Option<mpsc::Sender<ProgressUpdate>>,
        cancel: &CancellationToken,
    ) -> Result<InstallReport> {
        self.install_project(asset, version_tag, destination, target_os, None, progress, cancel)
            .await
    }

    /// [`install`](Self::install) for a known project.
    ///
    /// `project_name` (the repository name) guides the search for the main
    /// executable; without it the leading word of the asset name is used.
    #[allow(clippy::too_many_arguments)]
    pub async fn install_project(
        &self,
        asset: &Asset,
        version_tag: &str,
        destination: &Path,
        target_os: TargetOs,
        project_name: Option<&str>,
        progress: Option<mpsc::Sender<ProgressUpdate>>,
        cancel: &CancellationToken,
    ) -> Result<InstallReport> {
        let progress = progress.as_ref();
        info!(
            "Installing {} ({}) into {}",
            asset.file_name,
            version_tag,
            destination.display()
        );

        enter_stage(progress, InstallStage::Preflight, "Preparing installation...").await;
        let kind = ArchiveKind::from_file_name(&asset.file_name)?;
        let hint = project_name
            .filter(|name| !name.trim().is_empty())
            .map(str::to_string)
            .or_else(|| project_hint(&asset.file_name));
        tokio::fs::create_dir_all(destination)
            .await
            .map_err(|e| LodestoneError::io_with_path(e, destination))?;
        let scratch = ScratchDir::create_beside(destination)?;

        let staged_result = async {
            cancel.check()?;

            enter_stage(progress, InstallStage::Download, "Downloading...").await;
            let download_path = scratch.path.join(&asset.file_name);
            let (dl_tx, dl_rx) = mpsc::channel(32);
            let (downloaded, ()) = tokio::join!(
                self.downloader
                    .download(&asset.download_url, &download_path, Some(dl_tx), cancel),
                forward_download_progress(dl_rx, progress)
            );
            let bytes_downloaded = downloaded?;
            cancel.check()?;

            // The payload is laid out in a staging tree and merged into the
            // destination last, so files of a previous version never mask it.
            let staged = scratch.path.join("staged");

            enter_stage(progress, InstallStage::Extract, "Extracting...").await;
            {
                let archive = download_path.clone();
                let staged = staged.clone();
                let scratch_root = scratch.path.clone();
                let file_name = asset.file_name.clone();
                tokio::task::spawn_blocking(move || {
                    place_payload(kind, &archive, &file_name, &staged, &scratch_root)
                })
                .await
                .map_err(|e| LodestoneError::ExtractionFailed {
                    message: format!("Extraction task failed: {}", e),
                })??;
            }

            enter_stage(progress, InstallStage::Flatten, "Arranging files...").await;
            let flatten = {
                let destination = destination.to_path_buf();
                let hint = hint.clone();
                tokio::task::spawn_blocking(move || {
                    let outcome = ensure_executable_at_root(&staged, target_os, hint.as_deref())?;
                    mark_root_executables(&staged, target_os, hint.as_deref())?;
                    let merged = fsops::move_entries_into(
                        &staged,
                        &destination,
                        CollisionPolicy::Overwrite,
                    )?;
                    debug!("Merged {} entries into {}", merged.moved, destination.display());
                    Ok::<_, LodestoneError>(outcome)
                })
                .await
                .map_err(|e| LodestoneError::ExtractionFailed {
                    message: format!("Flattening task failed: {}", e),
                })??
            };

            enter_stage(progress, InstallStage::Finalize, "Finishing up...").await;
            markers::write_version(destination, version_tag)?;
            let portable_marker_created = markers::ensure_portable_marker(destination)?;
            Ok::<_, LodestoneError>((bytes_downloaded, flatten, portable_marker_created))
        }
        .await;

        scratch.remove().await;
        let (bytes_downloaded, flatten, portable_marker_created) = staged_result?;

        emit(progress, ProgressUpdate::overall(100.0)).await;
        emit(
            progress,
            ProgressUpdate::Completed {
                version: version_tag.to_string(),
            },
        )
        .await;
        info!("Installed {} into {}", version_tag, destination.display());

        Ok(InstallReport {
            version: version_tag.to_string(),
            install_dir: destination.to_path_buf(),
            asset_file_name: asset.file_name.clone(),
            kind,
            bytes_downloaded,
            flatten,
            portable_marker_created,
        })
    }
}

/// Put the downloaded payload into `destination` according to its kind.
fn place_payload(
    kind: ArchiveKind,
    archive: &Path,
    file_name: &str,
    destination: &Path,
    scratch: &Path,
) -> Result<()> {
    std::fs::create_dir_all(destination)
        .map_err(|e| LodestoneError::io_with_path(e, destination))?;

    match kind {
        ArchiveKind::Executable => {
            let target = destination.join(file_name);
            fsops::move_path(archive, &target)?;
            if !cfg!(windows) {
                set_executable(&target)?;
            }
            Ok(())
        }
        ArchiveKind::Zip if cfg!(windows) => archive::extract_zip(archive, destination).map(|_| ()),
        ArchiveKind::Zip => {
            let unpacked = scratch.join("unpacked");
            archive::extract_zip(archive, &unpacked)?;

            if let Some(bundle) = find_bundle(&unpacked) {
                let Some(name) = bundle.file_name() else {
                    return Ok(());
                };
                let target = destination.join(name);
                info!("Placing application bundle {}", target.display());
                return fsops::move_path(&bundle, &target);
            }

            if let Some(tarball) = archive::find_embedded_tarball(&unpacked) {
                info!("Unpacking embedded tarball {}", tarball.display());
                return archive::extract_tar_gz(&tarball, destination).map(|_| ());
            }

            fsops::move_entries_into(&unpacked, destination, CollisionPolicy::Overwrite)
                .map(|_| ())
        }
        other => archive::extract(other, archive, destination),
    }
}

/// Shallowest application bundle inside an extracted zip.
fn find_bundle(root: &Path) -> Option<PathBuf> {
    WalkDir::new(root)
        .min_depth(1)
        .max_depth(3)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| e.file_type().is_dir() && candidates::is_app_bundle(e.path()))
        .map(|e| e.into_path())
}

fn mark_root_executables(root: &Path, target_os: TargetOs, project_hint: Option<&str>) -> Result<()> {
    if cfg!(windows) || !target_os.is_linux() {
        return Ok(());
    }
    for executable in candidates::root_executables(root, target_os, project_hint) {
        set_executable(&executable)?;
    }
    Ok(())
}
