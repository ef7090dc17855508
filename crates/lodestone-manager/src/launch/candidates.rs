//! Executable discovery inside an install directory.

use lodestone_core::config::InstallationConfig;
use lodestone_core::TargetOs;
use std::path::{Path, PathBuf};

/// Linux runtime suffixes in launch priority order.
pub const LINUX_SUFFIX_PRIORITY: &[&str] = &[".x86_64", ".appimage", ".arm64", ".aarch64"];

/// Files that never make sense as a launch target even without an extension.
const NON_EXECUTABLE_NAMES: &[&str] = &[
    "license",
    "licence",
    "copying",
    "readme",
    "changelog",
    "authors",
    "notice",
    "credits",
    "makefile",
];

/// Bundled helpers shipped next to Windows games.
const WINDOWS_HELPER_EXECUTABLES: &[&str] = &[
    "unitycrashhandler64.exe",
    "unitycrashhandler32.exe",
    "crashpad_handler.exe",
    "unins000.exe",
    "uninstall.exe",
    "vc_redist.x64.exe",
    "vc_redist.x86.exe",
    "dxsetup.exe",
];

fn lower_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().to_lowercase())
}

fn arch_mismatch(suffix: &str, os: TargetOs) -> bool {
    match os {
        TargetOs::LinuxArm64 => suffix == ".x86_64",
        TargetOs::LinuxX64 | TargetOs::LinuxFlatpak => matches!(suffix, ".arm64" | ".aarch64"),
        _ => false,
    }
}

/// Priority of a Linux runtime suffix, skipping the wrong architecture.
pub fn linux_suffix_rank(path: &Path, os: TargetOs) -> Option<usize> {
    let name = lower_name(path)?;
    LINUX_SUFFIX_PRIORITY
        .iter()
        .position(|suffix| name.ends_with(suffix))
        .filter(|&idx| !arch_mismatch(LINUX_SUFFIX_PRIORITY[idx], os))
}

fn is_plain_extensionless_name(name: &str) -> bool {
    !name.starts_with('.') && !name.contains('.') && !NON_EXECUTABLE_NAMES.contains(&name)
}

/// Extensionless file large enough to plausibly be a native binary.
pub fn is_large_extensionless(path: &Path) -> bool {
    let Some(name) = lower_name(path) else {
        return false;
    };
    if !is_plain_extensionless_name(&name) {
        return false;
    }
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() >= InstallationConfig::MIN_EXTENSIONLESS_EXECUTABLE_BYTES)
        .unwrap_or(false)
}

/// Extensionless file whose name contains the project name, whatever its size.
pub fn is_project_named(path: &Path, project_hint: Option<&str>) -> bool {
    let Some(hint) = project_hint.map(normalize_hint).filter(|h| h.len() >= 2) else {
        return false;
    };
    let Some(name) = lower_name(path) else {
        return false;
    };
    is_plain_extensionless_name(&name) && normalize_hint(&name).contains(&hint) && path.is_file()
}

/// Windows executable that is not a bundled helper.
pub fn is_windows_executable(path: &Path) -> bool {
    match lower_name(path) {
        Some(name) => {
            name.ends_with(".exe")
                && !WINDOWS_HELPER_EXECUTABLES.contains(&name.as_str())
                && path.is_file()
        }
        None => false,
    }
}

/// macOS application bundle.
pub fn is_app_bundle(path: &Path) -> bool {
    lower_name(path).is_some_and(|n| n.ends_with(".app")) && path.is_dir()
}

fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

fn top_level_entries(dir: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(read_dir) => read_dir.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(_) => return Vec::new(),
    };
    entries.sort();
    entries
}

/// Launch candidates directly under `dir` for `os`, best first.
///
/// Outside Windows, a small extensionless file named after `project_hint`
/// also counts, after every other candidate.
pub fn root_executables(dir: &Path, os: TargetOs, project_hint: Option<&str>) -> Vec<PathBuf> {
    let entries = top_level_entries(dir);

    let mut found: Vec<PathBuf> = match os {
        TargetOs::Windows => {
            return entries
                .into_iter()
                .filter(|p| is_windows_executable(p))
                .collect()
        }
        TargetOs::MacOS => {
            let mut bundles: Vec<PathBuf> =
                entries.iter().filter(|p| is_app_bundle(p)).cloned().collect();
            let mut binaries: Vec<PathBuf> = entries
                .iter()
                .filter(|p| is_large_extensionless(p))
                .cloned()
                .collect();
            binaries.sort_by_key(|p| std::cmp::Reverse(file_size(p)));
            bundles.append(&mut binaries);
            bundles
        }
        TargetOs::LinuxX64 | TargetOs::LinuxArm64 | TargetOs::LinuxFlatpak => {
            let mut ranked: Vec<(usize, PathBuf)> = entries
                .iter()
                .filter(|p| p.is_file())
                .filter_map(|p| linux_suffix_rank(p, os).map(|rank| (rank, p.clone())))
                .collect();
            ranked.sort();

            let mut extensionless: Vec<PathBuf> = entries
                .iter()
                .filter(|p| is_large_extensionless(p))
                .cloned()
                .collect();
            extensionless.sort_by_key(|p| std::cmp::Reverse(file_size(p)));

            ranked
                .into_iter()
                .map(|(_, p)| p)
                .chain(extensionless)
                .collect()
        }
    };

    let named: Vec<PathBuf> = entries
        .into_iter()
        .filter(|p| is_project_named(p, project_hint) && !found.contains(p))
        .collect();
    found.extend(named);
    found
}

/// Top-level Windows executables, used for the compatibility fallback.
pub fn windows_executables(dir: &Path) -> Vec<PathBuf> {
    root_executables(dir, TargetOs::Windows, None)
}

fn normalize_hint(hint: &str) -> String {
    hint.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

/// Score a file found during a recursive search; `None` means not a candidate.
pub fn executable_score(path: &Path, os: TargetOs, project_hint: Option<&str>) -> Option<u32> {
    let base = match os {
        TargetOs::Windows => is_windows_executable(path).then_some(1),
        TargetOs::MacOS => {
            if is_large_extensionless(path) {
                Some(2)
            } else {
                is_project_named(path, project_hint).then_some(1)
            }
        }
        _ => {
            if linux_suffix_rank(path, os).is_some() {
                Some(3)
            } else if is_large_extensionless(path) {
                Some(2)
            } else {
                is_project_named(path, project_hint).then_some(1)
            }
        }
    }?;

    let name_bonus = project_hint
        .map(normalize_hint)
        .filter(|hint| !hint.is_empty())
        .and_then(|hint| {
            let name = path.file_name()?.to_string_lossy();
            normalize_hint(&name).contains(&hint).then_some(4)
        })
        .unwrap_or(0);

    Some(base + name_bonus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_sized(path: &Path, len: usize) {
        std::fs::write(path, vec![0u8; len]).unwrap();
    }

    const BIG: usize = 64 * 1024;

    #[test]
    fn test_linux_priority_and_arch_filter() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        write_sized(&dir.join("Game.arm64"), 10);
        write_sized(&dir.join("Game.AppImage"), 10);
        write_sized(&dir.join("Game.x86_64"), 10);
        write_sized(&dir.join("gamebin"), BIG);
        write_sized(&dir.join("tiny"), 10);
        write_sized(&dir.join("LICENSE"), BIG);
        write_sized(&dir.join("libgame.so"), BIG);

        let x64 = root_executables(dir, TargetOs::LinuxX64, None);
        assert_eq!(
            x64,
            vec![
                dir.join("Game.x86_64"),
                dir.join("Game.AppImage"),
                dir.join("gamebin")
            ]
        );

        let arm = root_executables(dir, TargetOs::LinuxArm64, None);
        assert_eq!(
            arm,
            vec![
                dir.join("Game.AppImage"),
                dir.join("Game.arm64"),
                dir.join("gamebin")
            ]
        );
    }

    #[test]
    fn test_windows_skips_helpers() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        write_sized(&dir.join("Game.exe"), 10);
        write_sized(&dir.join("UnityCrashHandler64.exe"), 10);
        write_sized(&dir.join("readme.txt"), 10);

        assert_eq!(root_executables(dir, TargetOs::Windows, None), vec![dir.join("Game.exe")]);
    }

    #[test]
    fn test_macos_bundles_first() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        std::fs::create_dir_all(dir.join("Game.app/Contents")).unwrap();
        write_sized(&dir.join("server"), BIG);

        assert_eq!(
            root_executables(dir, TargetOs::MacOS, None),
            vec![dir.join("Game.app"), dir.join("server")]
        );
    }

    #[test]
    fn test_executable_score_prefers_project_name() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        write_sized(&dir.join("MyGame.x86_64"), 10);
        write_sized(&dir.join("Launcher.x86_64"), 10);
        write_sized(&dir.join("notes.txt"), 10);

        let os = TargetOs::LinuxX64;
        assert_eq!(executable_score(&dir.join("MyGame.x86_64"), os, Some("my-game")), Some(7));
        assert_eq!(executable_score(&dir.join("Launcher.x86_64"), os, Some("my-game")), Some(3));
        assert_eq!(executable_score(&dir.join("notes.txt"), os, Some("notes")), None);
    }

    #[test]
    fn test_small_project_named_file_qualifies() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        write_sized(&dir.join("mygame"), 20 * 1024);
        write_sized(&dir.join("mygame.pck"), 10);
        write_sized(&dir.join("readme"), 10);

        let os = TargetOs::LinuxX64;
        assert_eq!(executable_score(&dir.join("mygame"), os, None), None);
        assert_eq!(executable_score(&dir.join("mygame"), os, Some("MyGame")), Some(5));
        assert_eq!(executable_score(&dir.join("mygame.pck"), os, Some("MyGame")), None);
        assert_eq!(executable_score(&dir.join("readme"), os, Some("readme")), None);

        assert!(root_executables(dir, os, None).is_empty());
        assert_eq!(root_executables(dir, os, Some("MyGame")), vec![dir.join("mygame")]);
        assert!(root_executables(dir, TargetOs::Windows, Some("MyGame")).is_empty());
    }

    #[test]
    fn test_missing_directory_has_no_candidates() {
        let temp_dir = TempDir::new().unwrap();
        assert!(root_executables(&temp_dir.path().join("nope"), TargetOs::LinuxX64, None).is_empty());
    }
}
