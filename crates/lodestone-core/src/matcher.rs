//! Platform asset matching.
//!
//! Release assets carry no structured platform metadata, so the platform is
//! inferred from the file name. The heuristic is a fixed, ordered set of
//! case-insensitive marker checks per target: rejection markers first, then
//! acceptance markers.

use crate::models::{Asset, Release, TargetOs};
use regex::Regex;
use std::sync::LazyLock;

const WINDOWS_REJECT: &[&str] = &[
    "linux", "macos", "darwin", ".deb", ".rpm", ".appimage", ".dmg", ".pkg", "flatpak", "switch",
];
const WINDOWS_ACCEPT: &[&str] = &[
    "windows", "win64", "win32", "win-x64", "win-x86", ".exe", ".msi", "msvc", "mingw",
];

const MAC_ACCEPT: &[&str] = &["macos", "osx", "darwin", ".dmg", ".pkg"];

const LINUX_ACCEPT: &[&str] = &["linux", ".appimage", ".deb", ".rpm", "tar.gz", "tar.xz"];
const LINUX_REJECT_FOR_MAC: &[&str] = &["linux", ".appimage", ".deb", ".rpm", "flatpak"];

const ARM_MARKERS: &[&str] = &["arm64", "aarch64", "armv7", "armhf"];
const FLATPAK_MARKERS: &[&str] = &["flatpak", ".flatpakref"];
const X64_MARKERS: &[&str] = &["x86_64", "x64", "amd64", "x86-64"];
const X86_32_MARKERS: &[&str] = &["i686", "i386", "i586"];

/// `win` as a standalone token, so "darwin" and "winter" do not count.
static WIN_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^a-z])win(?:[^a-z]|$)").unwrap());

fn contains_any(name: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| name.contains(m))
}

fn has_windows_marker(name: &str) -> bool {
    contains_any(name, WINDOWS_ACCEPT) || WIN_TOKEN.is_match(name)
}

/// A `mac` occurrence that is not the start of "machin..." (machine, machina).
fn has_mac_token(name: &str) -> bool {
    name.match_indices("mac")
        .any(|(idx, _)| !name[idx + 3..].starts_with("hin"))
}

fn has_mac_marker(name: &str) -> bool {
    contains_any(name, MAC_ACCEPT) || has_mac_token(name)
}

/// Whether an asset file name is a build for the given platform.
pub fn matches(file_name: &str, platform: TargetOs) -> bool {
    let name = file_name.to_lowercase();

    match platform {
        TargetOs::Windows => {
            if contains_any(&name, WINDOWS_REJECT) {
                return false;
            }
            has_windows_marker(&name)
        }
        TargetOs::MacOS => {
            if has_windows_marker(&name) || contains_any(&name, LINUX_REJECT_FOR_MAC) {
                return false;
            }
            has_mac_marker(&name)
        }
        TargetOs::LinuxX64 | TargetOs::LinuxArm64 | TargetOs::LinuxFlatpak => {
            if has_windows_marker(&name) || has_mac_marker(&name) {
                return false;
            }
            let flatpak_marked =
                platform == TargetOs::LinuxFlatpak && contains_any(&name, FLATPAK_MARKERS);
            if !contains_any(&name, LINUX_ACCEPT) && !flatpak_marked {
                return false;
            }
            match platform {
                TargetOs::LinuxArm64 => contains_any(&name, ARM_MARKERS),
                TargetOs::LinuxFlatpak => contains_any(&name, FLATPAK_MARKERS),
                _ => {
                    !contains_any(&name, X86_32_MARKERS)
                        && contains_any(&name, X64_MARKERS)
                        && !contains_any(&name, ARM_MARKERS)
                        && !contains_any(&name, FLATPAK_MARKERS)
                }
            }
        }
    }
}

/// Match against a free-form platform name.
///
/// Known names go through [`matches`]; anything else falls back to plain
/// case-insensitive containment.
pub fn matches_platform_name(file_name: &str, platform: &str) -> bool {
    match platform.parse::<TargetOs>() {
        Ok(os) => matches(file_name, os),
        Err(_) => file_name
            .to_lowercase()
            .contains(&platform.trim().to_lowercase()),
    }
}

/// All assets of a release that match the platform, in upstream order.
pub fn compatible_assets(release: &Release, platform: TargetOs) -> Vec<&Asset> {
    release
        .assets
        .iter()
        .filter(|a| matches(&a.file_name, platform))
        .collect()
}

/// The first asset matching the platform.
pub fn select_asset(release: &Release, platform: TargetOs) -> Option<&Asset> {
    release
        .assets
        .iter()
        .find(|a| matches(&a.file_name, platform))
}
