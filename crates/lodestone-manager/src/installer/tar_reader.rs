//! Minimal tar decoder.
//!
//! Handles the subset of the format release tarballs use:
//!
//! | field     | offset | length | encoding                          |
//! |-----------|--------|--------|-----------------------------------|
//! | name      | 0      | 100    | NUL-terminated                    |
//! | mode      | 100    | 8      | octal                             |
//! | size      | 124    | 12     | octal, or base-256 if high bit set |
//! | typeflag  | 156    | 1      | `'5'` directory, `'0'`/NUL file    |
//! | magic     | 257    | 6      | `ustar`                           |
//! | prefix    | 345    | 155    | joined before name when ustar      |
//!
//! Data follows the header padded to a 512-byte boundary. GNU long names
//! (`'L'`) are honoured; every other entry type (links, pax headers, device
//! nodes) is skipped along with its data. Two zero blocks or EOF at a header
//! boundary end the archive.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const BLOCK: usize = 512;

/// Errors produced while decoding a tar stream.
#[derive(Debug, Error)]
pub enum TarError {
    #[error("I/O error while unpacking {path:?}: {source}")]
    Io {
        path: Option<PathBuf>,
        #[source]
        source: io::Error,
    },

    #[error("Invalid size field for entry '{name}'")]
    InvalidSize { name: String },

    #[error("Archive ends inside entry '{name}'")]
    Truncated { name: String },

    #[error("Entry '{0}' escapes the destination directory")]
    UnsafePath(String),
}

impl From<io::Error> for TarError {
    fn from(source: io::Error) -> Self {
        TarError::Io { path: None, source }
    }
}

/// Entry type from the typeflag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    LongName,
    Other(u8),
}

impl EntryKind {
    fn from_flag(flag: u8) -> Self {
        match flag {
            b'0' | 0 | b'7' => EntryKind::File,
            b'5' => EntryKind::Directory,
            b'L' => EntryKind::LongName,
            other => EntryKind::Other(other),
        }
    }
}

/// Decoded header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarHeader {
    pub name: String,
    pub mode: Option<u32>,
    pub size: u64,
    pub kind: EntryKind,
}

/// Counts of what an unpack produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnpackStats {
    pub files: usize,
    pub directories: usize,
    pub skipped: usize,
}

/// Decode one 512-byte header block. Returns `None` for an all-zero block.
pub fn parse_header(block: &[u8; BLOCK]) -> Result<Option<TarHeader>, TarError> {
    if block.iter().all(|b| *b == 0) {
        return Ok(None);
    }

    let mut name = c_string(&block[0..100]);
    if &block[257..262] == b"ustar" {
        let prefix = c_string(&block[345..500]);
        if !prefix.is_empty() {
            name = format!("{}/{}", prefix, name);
        }
    }

    let size = parse_size(&block[124..136]).ok_or_else(|| TarError::InvalidSize {
        name: name.clone(),
    })?;
    let mode = parse_octal(&block[100..108]).map(|m| m as u32);

    Ok(Some(TarHeader {
        name,
        mode,
        size,
        kind: EntryKind::from_flag(block[156]),
    }))
}

/// Unpack a tar stream into `destination`.
pub fn unpack<R: Read>(reader: R, destination: &Path) -> Result<UnpackStats, TarError> {
    let mut reader = reader;
    let mut stats = UnpackStats::default();
    let mut long_name: Option<String> = None;
    let mut block = [0u8; BLOCK];

    fs::create_dir_all(destination).map_err(|e| io_at(e, destination))?;

    loop {
        if !read_block(&mut reader, &mut block)? {
            break;
        }
        let Some(mut header) = parse_header(&block)? else {
            // First zero block; a second one (or EOF) normally follows.
            break;
        };

        if header.kind == EntryKind::LongName {
            let mut data = Vec::with_capacity(header.size.min(4096) as usize);
            copy_exact(&mut reader, &mut data, header.size, &header.name)?;
            skip_padding(&mut reader, header.size, &header.name)?;
            long_name = Some(c_string(&data));
            continue;
        }
        if let Some(name) = long_name.take() {
            header.name = name;
        }
        // Pre-POSIX archives mark directories with a trailing slash only.
        if header.kind == EntryKind::File && header.name.ends_with('/') {
            header.kind = EntryKind::Directory;
        }

        let relative = safe_relative_path(&header.name)?;
        match (header.kind, relative) {
            (EntryKind::Directory, Some(relative)) => {
                let path = destination.join(relative);
                fs::create_dir_all(&path).map_err(|e| io_at(e, &path))?;
                stats.directories += 1;
                skip_data(&mut reader, header.size, &header.name)?;
            }
            (EntryKind::File, Some(relative)) => {
                let path = destination.join(relative);
                write_file(&mut reader, &path, &header)?;
                stats.files += 1;
            }
            (kind, _) => {
                debug!("Skipping tar entry '{}' ({:?})", header.name, kind);
                stats.skipped += 1;
                skip_data(&mut reader, header.size, &header.name)?;
            }
        }
    }

    Ok(stats)
}

fn write_file<R: Read>(reader: &mut R, path: &Path, header: &TarHeader) -> Result<(), TarError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_at(e, parent))?;
    }

    let mut file = File::create(path).map_err(|e| io_at(e, path))?;
    copy_exact(reader, &mut file, header.size, &header.name)?;
    file.flush().map_err(|e| io_at(e, path))?;
    drop(file);
    skip_padding(reader, header.size, &header.name)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Some(mode) = header.mode {
            let mode = (mode & 0o7777) | 0o600;
            fs::set_permissions(path, fs::Permissions::from_mode(mode))
                .map_err(|e| io_at(e, path))?;
        }
    }

    Ok(())
}

/// Fill `block`; `false` on clean EOF before the first byte.
fn read_block<R: Read>(reader: &mut R, block: &mut [u8; BLOCK]) -> Result<bool, TarError> {
    let mut filled = 0;
    while filled < BLOCK {
        match reader.read(&mut block[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(TarError::Truncated {
                    name: "<header>".to_string(),
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}

fn copy_exact<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    size: u64,
    name: &str,
) -> Result<(), TarError> {
    let copied = io::copy(&mut reader.take(size), writer)?;
    if copied != size {
        return Err(TarError::Truncated {
            name: name.to_string(),
        });
    }
    Ok(())
}

fn skip_padding<R: Read>(reader: &mut R, size: u64, name: &str) -> Result<(), TarError> {
    let padding = padded_len(size) - size;
    copy_exact(reader, &mut io::sink(), padding, name)
}

fn skip_data<R: Read>(reader: &mut R, size: u64, name: &str) -> Result<(), TarError> {
    copy_exact(reader, &mut io::sink(), padded_len(size), name)
}

/// `size` rounded up to a whole number of blocks.
fn padded_len(size: u64) -> u64 {
    size.div_ceil(BLOCK as u64) * BLOCK as u64
}

fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn parse_octal(field: &[u8]) -> Option<u64> {
    let text = c_string(field);
    let digits = text.trim_matches(|c: char| c == ' ' || c == '\0');
    if digits.is_empty() {
        return Some(0);
    }
    u64::from_str_radix(digits, 8).ok()
}

fn parse_size(field: &[u8]) -> Option<u64> {
    if field[0] & 0x80 != 0 {
        // GNU base-256 for sizes beyond the octal range.
        let mut value: u64 = u64::from(field[0] & 0x7f);
        for byte in &field[1..] {
            value = value.checked_mul(256)?.checked_add(u64::from(*byte))?;
        }
        return Some(value);
    }
    parse_octal(field)
}

/// Relative path for an entry, `None` for entries that name the root itself.
fn safe_relative_path(name: &str) -> Result<Option<PathBuf>, TarError> {
    let mut relative = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(TarError::UnsafePath(name.to_string()))
            }
        }
    }
    Ok((!relative.as_os_str().is_empty()).then_some(relative))
}

fn io_at(source: io::Error, path: &Path) -> TarError {
    TarError::Io {
        path: Some(path.to_path_buf()),
        source,
    }
}
