//! Moving a nested executable up to the install root.
//!
//! Archives often wrap their contents in a project-named folder. This pass
//! makes sure the platform's executable sits directly under the root so the
//! launcher can find it with a shallow scan.

use super::fsops::{self, CollisionPolicy};
use super::markers;
use crate::launch::candidates;
use lodestone_core::config::InstallationConfig;
use lodestone_core::platform::remove_path_with_retry;
use lodestone_core::{LodestoneError, Result, TargetOs};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Nesting levels unwrapped before giving up.
const MAX_UNWRAP_DEPTH: usize = 4;

/// What the flattening pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlattenOutcome {
    /// An executable was already at the root.
    AlreadyFlat,
    /// A macOS application bundle was moved to the root.
    MovedBundle(PathBuf),
    /// Contents of a nested directory were moved to the root.
    Flattened { moved: usize, skipped: usize },
    /// No executable could be found anywhere in the tree.
    NothingFound,
}

/// Ensure an executable for `os` sits directly under `root`.
///
/// `project_hint` (usually the repository name) boosts recursive matches
/// whose file name contains it, and lets a small extensionless launcher of
/// that name count as an executable.
pub fn ensure_executable_at_root(
    root: &Path,
    os: TargetOs,
    project_hint: Option<&str>,
) -> Result<FlattenOutcome> {
    let mut moved = 0;
    let mut skipped = 0;

    for _ in 0..MAX_UNWRAP_DEPTH {
        if !candidates::root_executables(root, os, project_hint).is_empty() {
            break;
        }

        if os == TargetOs::MacOS {
            if let Some(bundle) = find_app_bundle(root) {
                return move_bundle_to_root(root, &bundle);
            }
        }

        let Some(source) = find_source_dir(root, os, project_hint)? else {
            break;
        };
        let summary = lift_directory(root, &source)?;
        moved += summary.0;
        skipped += summary.1;
    }

    if moved > 0 || skipped > 0 {
        info!(
            "Flattened {}: moved {} entries, skipped {}",
            root.display(),
            moved,
            skipped
        );
        return Ok(FlattenOutcome::Flattened { moved, skipped });
    }

    if candidates::root_executables(root, os, project_hint).is_empty() {
        warn!("No {} executable found under {}", os, root.display());
        Ok(FlattenOutcome::NothingFound)
    } else {
        Ok(FlattenOutcome::AlreadyFlat)
    }
}

fn is_layout_entry(path: &Path) -> bool {
    if markers::is_marker_file(path) {
        return false;
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    !name.starts_with(InstallationConfig::SCRATCH_DIR_PREFIX)
        && name != InstallationConfig::PROTON_COMPAT_DATA_DIR
        && name != InstallationConfig::WINE_PREFIX_DIR
}

/// Directory whose contents should be lifted into the root.
fn find_source_dir(root: &Path, os: TargetOs, project_hint: Option<&str>) -> Result<Option<PathBuf>> {
    let entries: Vec<PathBuf> = fsops::read_dir_sorted(root)?
        .into_iter()
        .filter(|p| is_layout_entry(p))
        .collect();
    let dirs: Vec<&PathBuf> = entries.iter().filter(|p| p.is_dir()).collect();
    let has_files = entries.iter().any(|p| !p.is_dir());

    if !has_files && dirs.len() == 1 {
        return Ok(Some(dirs[0].clone()));
    }

    let best = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.depth() != 1 || is_layout_entry(e.path()))
        .filter_map(|e| e.ok())
        .filter(|e| e.depth() >= 2 && e.file_type().is_file())
        .filter_map(|e| {
            let score = candidates::executable_score(e.path(), os, project_hint)?;
            let size = e.metadata().map(|m| m.len()).unwrap_or(0);
            Some((score, size, e.into_path()))
        })
        .max_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)).then_with(|| b.2.cmp(&a.2)));

    Ok(best.and_then(|(score, _, path)| {
        debug!("Best executable match {} (score {})", path.display(), score);
        path.parent().map(Path::to_path_buf)
    }))
}

/// Move the contents of `source` into `root`, skipping collisions.
fn lift_directory(root: &Path, source: &Path) -> Result<(usize, usize)> {
    let Ok(relative) = source.strip_prefix(root) else {
        return Ok((0, 0));
    };
    let Some(top) = relative.components().next() else {
        return Ok((0, 0));
    };
    let top_dir = root.join(top);

    // The source's ancestor may share a name with one of its own entries
    // (Game/Game). Park it under a scratch name so both can coexist.
    let parked = root.join(format!(
        "{}flatten-{}",
        InstallationConfig::SCRATCH_DIR_PREFIX,
        top.as_os_str().to_string_lossy()
    ));
    std::fs::rename(&top_dir, &parked).map_err(|e| LodestoneError::io_with_path(e, &top_dir))?;
    let rest = relative.strip_prefix(top).unwrap_or(Path::new(""));
    let source = if rest.as_os_str().is_empty() {
        parked.clone()
    } else {
        parked.join(rest)
    };

    let summary = fsops::move_entries_into(&source, root, CollisionPolicy::Skip)?;

    if let Err(e) = remove_path_with_retry(
        &source,
        InstallationConfig::DELETE_RETRY_ATTEMPTS,
        InstallationConfig::DELETE_RETRY_BASE_DELAY,
    ) {
        warn!("Could not remove {} after flattening: {}", source.display(), e);
    }
    if let Some(parent) = source.parent() {
        fsops::remove_empty_parents(parent, root);
    }

    if parked.exists() && !top_dir.exists() {
        if let Err(e) = std::fs::rename(&parked, &top_dir) {
            warn!("Could not restore {}: {}", top_dir.display(), e);
        }
    }

    Ok((summary.moved, summary.skipped.len()))
}

fn find_app_bundle(root: &Path) -> Option<PathBuf> {
    WalkDir::new(root)
        .min_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| e.file_type().is_dir() && candidates::is_app_bundle(e.path()))
        .map(|e| e.into_path())
}

fn move_bundle_to_root(root: &Path, bundle: &Path) -> Result<FlattenOutcome> {
    let Some(name) = bundle.file_name() else {
        return Ok(FlattenOutcome::NothingFound);
    };
    let target = root.join(name);
    fsops::move_path(bundle, &target)?;
    if let Some(parent) = bundle.parent() {
        fsops::remove_empty_parents(parent, root);
    }
    info!("Moved application bundle to {}", target.display());
    Ok(FlattenOutcome::MovedBundle(target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const BIG: usize = 64 * 1024;

    fn write(path: &Path, len: usize) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, vec![7u8; len]).unwrap();
    }

    #[test]
    fn test_already_flat_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(&root.join("Game.x86_64"), 10);
        write(&root.join("data/level.pak"), 10);

        let outcome = ensure_executable_at_root(root, TargetOs::LinuxX64, None).unwrap();
        assert_eq!(outcome, FlattenOutcome::AlreadyFlat);
        assert!(root.join("data/level.pak").exists());
    }

    #[test]
    fn test_sole_subdirectory_is_lifted() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(&root.join("MyGame/MyGame.exe"), 10);
        write(&root.join("MyGame/data/a.pak"), 10);

        let outcome = ensure_executable_at_root(root, TargetOs::Windows, None).unwrap();
        assert!(matches!(outcome, FlattenOutcome::Flattened { moved: 2, .. }));
        assert!(root.join("MyGame.exe").exists());
        assert!(root.join("data/a.pak").exists());
        assert!(!root.join("MyGame").exists());

        let again = ensure_executable_at_root(root, TargetOs::Windows, None).unwrap();
        assert_eq!(again, FlattenOutcome::AlreadyFlat);
    }

    #[test]
    fn test_same_name_as_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(&root.join("game/game"), BIG);
        write(&root.join("game/assets/a.pak"), 10);

        ensure_executable_at_root(root, TargetOs::LinuxX64, Some("game")).unwrap();

        assert!(root.join("game").is_file());
        assert!(root.join("assets/a.pak").exists());
        assert!(!root
            .join(format!("{}flatten-game", InstallationConfig::SCRATCH_DIR_PREFIX))
            .exists());
    }

    #[test]
    fn test_best_match_chosen_when_root_has_files() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(&root.join("README.txt"), 10);
        write(&root.join("tools/helper.x86_64"), 10);
        write(&root.join("build/bin/Space-Game.x86_64"), 10);
        write(&root.join("build/bin/lib.so"), 10);

        ensure_executable_at_root(root, TargetOs::LinuxX64, Some("space_game")).unwrap();

        assert!(root.join("Space-Game.x86_64").exists());
        assert!(root.join("lib.so").exists());
        assert!(root.join("tools/helper.x86_64").exists());
        assert!(!root.join("build").exists());
    }

    #[test]
    fn test_small_project_named_launcher_is_lifted() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(&root.join("README.md"), 10);
        write(&root.join("MyGame/mygame"), 20 * 1024);
        write(&root.join("MyGame/mygame.pck"), 10);

        let outcome = ensure_executable_at_root(root, TargetOs::LinuxX64, Some("MyGame")).unwrap();
        assert!(matches!(outcome, FlattenOutcome::Flattened { moved: 2, .. }));
        assert!(root.join("mygame").is_file());
        assert!(root.join("mygame.pck").is_file());
        assert!(root.join("README.md").exists());

        let again = ensure_executable_at_root(root, TargetOs::LinuxX64, Some("MyGame")).unwrap();
        assert_eq!(again, FlattenOutcome::AlreadyFlat);
    }

    #[test]
    fn test_collisions_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(&root.join("config.ini"), 3);
        write(&root.join("nested/Game.exe"), 10);
        write(&root.join("nested/config.ini"), 5);

        let outcome = ensure_executable_at_root(root, TargetOs::Windows, None).unwrap();
        assert_eq!(outcome, FlattenOutcome::Flattened { moved: 1, skipped: 1 });
        assert_eq!(std::fs::metadata(root.join("config.ini")).unwrap().len(), 3);
        assert!(!root.join("nested").exists());
    }

    #[test]
    fn test_two_levels_of_nesting() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(&root.join("outer/inner/Game.exe"), 10);

        ensure_executable_at_root(root, TargetOs::Windows, None).unwrap();
        assert!(root.join("Game.exe").exists());
        assert!(!root.join("outer").exists());
    }

    #[test]
    fn test_macos_bundle_moved_to_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(&root.join("dist/Game.app/Contents/MacOS/Game"), 10);

        let outcome = ensure_executable_at_root(root, TargetOs::MacOS, None).unwrap();
        assert_eq!(outcome, FlattenOutcome::MovedBundle(root.join("Game.app")));
        assert!(root.join("Game.app/Contents/MacOS/Game").exists());
        assert!(!root.join("dist").exists());
    }

    #[test]
    fn test_markers_do_not_block_unwrapping() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(&root.join("version.txt"), 3);
        write(&root.join("Game/Game.exe"), 10);

        ensure_executable_at_root(root, TargetOs::Windows, None).unwrap();
        assert!(root.join("Game.exe").exists());
    }

    #[test]
    fn test_nothing_found() {
        let temp_dir = TempDir::new().unwrap();
        write(&temp_dir.path().join("docs/manual.pdf"), 10);
        write(&temp_dir.path().join("notes.txt"), 10);

        let outcome = ensure_executable_at_root(temp_dir.path(), TargetOs::Windows, None).unwrap();
        assert_eq!(outcome, FlattenOutcome::NothingFound);
        assert!(temp_dir.path().join("docs/manual.pdf").exists());
    }
}
