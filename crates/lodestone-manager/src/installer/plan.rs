//! Choosing which asset of a release to install on a platform.

use super::archive::ArchiveKind;
use crate::launch::compat::{CompatProbe, MISSING_LAYER_GUIDANCE};
use lodestone_core::matcher;
use lodestone_core::{Asset, LodestoneError, Release, Result, TargetOs};
use tracing::info;

/// The asset to install and the OS it was built for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPlan {
    pub asset: Asset,
    /// OS the asset targets; differs from the host when running through a
    /// compatibility layer.
    pub target_os: TargetOs,
    pub requires_compatibility: bool,
}

/// First matching asset the installer can handle, else the first match.
fn best_asset(release: &Release, os: TargetOs) -> Option<&Asset> {
    let compatible = matcher::compatible_assets(release, os);
    compatible
        .iter()
        .find(|a| ArchiveKind::from_file_name(&a.file_name).is_ok())
        .or_else(|| compatible.first())
        .copied()
}

/// Plan an installation of `release` for `platform`.
///
/// Linux hosts without a native build fall back to the Windows build when a
/// compatibility layer is present.
pub fn plan_asset(release: &Release, platform: TargetOs, probe: &CompatProbe) -> Result<AssetPlan> {
    if let Some(asset) = best_asset(release, platform) {
        return Ok(AssetPlan {
            asset: asset.clone(),
            target_os: platform,
            requires_compatibility: false,
        });
    }

    if platform.is_linux() {
        if let Some(asset) = best_asset(release, TargetOs::Windows) {
            if !probe.is_available() {
                return Err(LodestoneError::CompatibilityLayerUnavailable {
                    guidance: MISSING_LAYER_GUIDANCE.to_string(),
                });
            }
            info!(
                "No native {} build in {}, using {} through a compatibility layer",
                platform, release.tag, asset.file_name
            );
            return Ok(AssetPlan {
                asset: asset.clone(),
                target_os: TargetOs::Windows,
                requires_compatibility: true,
            });
        }
    }

    Err(LodestoneError::NoCompatibleAsset {
        tag: release.tag.clone(),
        platform: platform.to_string(),
    })
}
