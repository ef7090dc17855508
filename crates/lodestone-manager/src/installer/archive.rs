//! Archive format detection and extraction.

use super::tar_reader::{self, TarError};
use lodestone_core::{LodestoneError, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// How a downloaded asset is turned into an installed tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// A self-contained binary placed as-is.
    Executable,
    Zip,
    TarGz,
    TarZst,
    /// Formats only the system `tar` binary can unpack.
    SystemTar,
}

const EXECUTABLE_SUFFIXES: &[&str] = &[".exe", ".appimage", ".x86_64", ".arm64", ".aarch64"];
const SYSTEM_TAR_SUFFIXES: &[&str] = &[".tar.xz", ".txz", ".tar.bz2", ".tbz2"];

impl ArchiveKind {
    /// Classify an asset by file name.
    pub fn from_file_name(file_name: &str) -> Result<Self> {
        let name = file_name.to_lowercase();

        let kind = if name.ends_with(".zip") {
            ArchiveKind::Zip
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            ArchiveKind::TarGz
        } else if name.ends_with(".tar.zst") || name.ends_with(".tzst") {
            ArchiveKind::TarZst
        } else if SYSTEM_TAR_SUFFIXES.iter().any(|s| name.ends_with(s)) && cfg!(unix) {
            ArchiveKind::SystemTar
        } else if EXECUTABLE_SUFFIXES.iter().any(|s| name.ends_with(s)) || !name.contains('.') {
            ArchiveKind::Executable
        } else {
            return Err(LodestoneError::UnsupportedArchiveFormat {
                file_name: file_name.to_string(),
            });
        };

        Ok(kind)
    }

    pub fn is_archive(&self) -> bool {
        !matches!(self, ArchiveKind::Executable)
    }
}

impl From<TarError> for LodestoneError {
    fn from(err: TarError) -> Self {
        match err {
            TarError::Io { path, source } => LodestoneError::extraction_io(source, path.as_deref()),
            other => LodestoneError::ExtractionFailed {
                message: other.to_string(),
            },
        }
    }
}

/// Extract a zip archive into `destination`, overwriting existing files.
pub fn extract_zip(archive_path: &Path, destination: &Path) -> Result<usize> {
    let file = File::open(archive_path).map_err(|e| LodestoneError::io_with_path(e, archive_path))?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))?;
    let mut written = 0;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            debug!("Skipping unsafe zip entry {}", entry.name());
            continue;
        };
        let outpath = destination.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath)
                .map_err(|e| LodestoneError::extraction_io(e, Some(&outpath)))?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| LodestoneError::extraction_io(e, Some(parent)))?;
        }
        let mut outfile =
            File::create(&outpath).map_err(|e| LodestoneError::extraction_io(e, Some(&outpath)))?;
        std::io::copy(&mut entry, &mut outfile)
            .map_err(|e| LodestoneError::extraction_io(e, Some(&outpath)))?;
        written += 1;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                let mode = (mode & 0o7777) | 0o600;
                std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode)).ok();
            }
        }
    }

    info!("Extracted {} files from {}", written, archive_path.display());
    Ok(written)
}

/// Extract a gzip-compressed tarball with the built-in tar reader.
pub fn extract_tar_gz(archive_path: &Path, destination: &Path) -> Result<usize> {
    let file = File::open(archive_path).map_err(|e| LodestoneError::io_with_path(e, archive_path))?;
    let decoder = flate2::read::GzDecoder::new(BufReader::new(file));
    let stats = tar_reader::unpack(decoder, destination)?;
    info!(
        "Extracted {} files from {}",
        stats.files,
        archive_path.display()
    );
    Ok(stats.files)
}

/// Extract a zstd-compressed tarball with the built-in tar reader.
pub fn extract_tar_zst(archive_path: &Path, destination: &Path) -> Result<usize> {
    let file = File::open(archive_path).map_err(|e| LodestoneError::io_with_path(e, archive_path))?;
    let decoder = zstd::stream::read::Decoder::new(BufReader::new(file)).map_err(|e| {
        LodestoneError::ExtractionFailed {
            message: format!("Invalid zstd stream in {}: {}", archive_path.display(), e),
        }
    })?;
    let stats = tar_reader::unpack(decoder, destination)?;
    info!(
        "Extracted {} files from {}",
        stats.files,
        archive_path.display()
    );
    Ok(stats.files)
}

/// Unpack with the host `tar` binary.
pub fn extract_with_system_tar(archive_path: &Path, destination: &Path) -> Result<()> {
    std::fs::create_dir_all(destination)
        .map_err(|e| LodestoneError::io_with_path(e, destination))?;

    let output = std::process::Command::new("tar")
        .arg("-xf")
        .arg(archive_path)
        .arg("-C")
        .arg(destination)
        .output()
        .map_err(|e| LodestoneError::ExtractionFailed {
            message: format!("Could not run tar: {}", e),
        })?;

    if !output.status.success() {
        return Err(LodestoneError::ExtractionFailed {
            message: format!(
                "tar exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    Ok(())
}

/// Extract any supported archive kind into `destination`.
pub fn extract(kind: ArchiveKind, archive_path: &Path, destination: &Path) -> Result<()> {
    match kind {
        ArchiveKind::Zip => extract_zip(archive_path, destination).map(|_| ()),
        ArchiveKind::TarGz => extract_tar_gz(archive_path, destination).map(|_| ()),
        ArchiveKind::TarZst => extract_tar_zst(archive_path, destination).map(|_| ()),
        ArchiveKind::SystemTar => extract_with_system_tar(archive_path, destination),
        ArchiveKind::Executable => Err(LodestoneError::ExtractionFailed {
            message: format!("{} is not an archive", archive_path.display()),
        }),
    }
}

/// Find a tarball shipped inside another archive (zip-wrapped tar.gz).
pub fn find_embedded_tarball(root: &Path) -> Option<PathBuf> {
    let tarballs: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .max_depth(3)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            let name = e.file_name().to_string_lossy().to_lowercase();
            name.ends_with(".tar.gz") || name.ends_with(".tgz")
        })
        .map(|e| e.into_path())
        .collect();

    match tarballs.as_slice() {
        [single] => Some(single.clone()),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::installer::tar_reader::tests::build_tar;
    use std::io::Write;
    use tempfile::TempDir;

    /// Write a zip with `(name, contents)` entries.
    pub(crate) fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default().unix_permissions(0o755);
        for (name, contents) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(contents).unwrap();
        }
        zip.finish().unwrap();
    }

    /// Write a gzip-compressed tarball.
    pub(crate) fn write_tar_gz(path: &Path, entries: &[(&str, Option<&[u8]>)]) {
        let file = File::create(path).unwrap();
        let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::fast());
        encoder.write_all(&build_tar(entries)).unwrap();
        encoder.finish().unwrap();
    }

    #[test]
    fn test_kind_from_file_name() {
        assert_eq!(ArchiveKind::from_file_name("Game.zip").unwrap(), ArchiveKind::Zip);
        assert_eq!(ArchiveKind::from_file_name("Game.TAR.GZ").unwrap(), ArchiveKind::TarGz);
        assert_eq!(ArchiveKind::from_file_name("game.tgz").unwrap(), ArchiveKind::TarGz);
        assert_eq!(ArchiveKind::from_file_name("game.tar.zst").unwrap(), ArchiveKind::TarZst);
        assert_eq!(
            ArchiveKind::from_file_name("Game.Setup.exe").unwrap(),
            ArchiveKind::Executable
        );
        assert_eq!(
            ArchiveKind::from_file_name("Game-x86_64.AppImage").unwrap(),
            ArchiveKind::Executable
        );
        assert_eq!(ArchiveKind::from_file_name("gamebin").unwrap(), ArchiveKind::Executable);
        assert!(matches!(
            ArchiveKind::from_file_name("Game.dmg"),
            Err(LodestoneError::UnsupportedArchiveFormat { .. })
        ));
        assert!(ArchiveKind::from_file_name("game.deb").is_err());
    }

    #[test]
    #[cfg(unix)]
    fn test_xz_uses_system_tar_on_unix() {
        assert_eq!(
            ArchiveKind::from_file_name("game.tar.xz").unwrap(),
            ArchiveKind::SystemTar
        );
    }

    #[test]
    fn test_extract_zip() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("game.zip");
        write_zip(
            &archive,
            &[("Game/Game.exe", &b"MZ"[..]), ("Game/data/a.pak", &b"pak"[..])],
        );
        let dest = temp_dir.path().join("out");

        assert_eq!(extract_zip(&archive, &dest).unwrap(), 2);
        assert_eq!(std::fs::read(dest.join("Game/Game.exe")).unwrap(), b"MZ");
        assert!(dest.join("Game/data/a.pak").exists());
    }

    #[test]
    fn test_extract_tar_gz() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("game.tar.gz");
        write_tar_gz(&archive, &[("Game/", None), ("Game/Game.x86_64", Some(&b"ELF"[..]))]);
        let dest = temp_dir.path().join("out");

        assert_eq!(extract_tar_gz(&archive, &dest).unwrap(), 1);
        assert_eq!(std::fs::read(dest.join("Game/Game.x86_64")).unwrap(), b"ELF");
    }

    #[test]
    fn test_extract_tar_zst() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("game.tar.zst");
        let compressed =
            zstd::stream::encode_all(build_tar(&[("bin/game", Some(&b"ELF"[..]))]).as_slice(), 3)
                .unwrap();
        std::fs::write(&archive, compressed).unwrap();
        let dest = temp_dir.path().join("out");

        assert_eq!(extract_tar_zst(&archive, &dest).unwrap(), 1);
        assert!(dest.join("bin/game").exists());
    }

    #[test]
    fn test_corrupt_zip_is_extraction_failure() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("broken.zip");
        std::fs::write(&archive, b"definitely not a zip").unwrap();

        assert!(matches!(
            extract_zip(&archive, &temp_dir.path().join("out")),
            Err(LodestoneError::ExtractionFailed { .. })
        ));
    }

    #[test]
    fn test_find_embedded_tarball() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("dist")).unwrap();
        std::fs::write(temp_dir.path().join("dist/game.tar.gz"), b"x").unwrap();
        std::fs::write(temp_dir.path().join("README.txt"), b"x").unwrap();

        assert_eq!(
            find_embedded_tarball(temp_dir.path()),
            Some(temp_dir.path().join("dist/game.tar.gz"))
        );

        std::fs::write(temp_dir.path().join("other.tgz"), b"x").unwrap();
        assert_eq!(find_embedded_tarball(temp_dir.path()), None);
    }
}
