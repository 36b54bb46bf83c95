use std::fs::{self, Permissions};
use std::io::{self, Read};
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};

use super::change::{detect_change, write_file, Change};

/// What a decode did to the destination tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    pub directories: usize,
    pub written: usize,
    pub unchanged: usize,
    pub skipped: usize,
}

/// Decode a tar stream onto disk below `dest`
///
/// The stream is consumed in a single pass. Regular files whose content already
/// matches the destination are left untouched, keeping their timestamps.
/// File and directory modes are restored; directory modes are applied once
/// every entry is on disk. Links and special files are skipped.
pub fn decode_into<R: Read>(reader: R, dest: &Path) -> io::Result<DecodeStats> {
    let mut archive = Archive::new(reader);
    let mut stats = DecodeStats::default();
    let mut dir_modes = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.into_owned();
        let Some(relative) = sanitize(&name) else {
            log::warn!("Skipping archive entry outside destination: {}", name.display());
            stats.skipped += 1;
            continue;
        };
        let target = dest.join(&relative);

        match entry.header().entry_type() {
            EntryType::Directory => {
                ensure_dir(&target)?;
                dir_modes.push((target, entry.header().mode()?));
                stats.directories += 1;
            }
            EntryType::Regular | EntryType::Continuous => {
                if let Some(parent) = target.parent() {
                    ensure_dir(parent)?;
                }
                let mode = entry.header().mode()?;
                match detect_change(&mut entry, &target)? {
                    Change::Unchanged => stats.unchanged += 1,
                    Change::Changed(mut body) => {
                        log::debug!("extracting entry target={}", target.display());
                        write_file(&mut body, &target, mode)?;
                        stats.written += 1;
                    }
                }
            }
            EntryType::Symlink | EntryType::Link => {
                log::warn!("Skipping link entry {}", name.display());
                stats.skipped += 1;
            }
            other => {
                log::debug!("Skipping {:?} entry {}", other, name.display());
                stats.skipped += 1;
            }
        }
    }

    // deepest first, so a read-only parent is set after its children
    for (dir, mode) in dir_modes.iter().rev() {
        fs::set_permissions(dir, Permissions::from_mode(mode & 0o7777))?;
    }

    Ok(stats)
}

/// Make sure `target` is a directory, creating it and its parents if absent
fn ensure_dir(target: &Path) -> io::Result<()> {
    match fs::metadata(target) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} exists and is not a directory", target.display()),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => fs::create_dir_all(target),
        Err(e) => Err(e),
    }
}

/// Relative form of an entry name, or `None` if it would escape the destination
fn sanitize(name: &Path) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in name.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if clean.as_os_str().is_empty() {
        None
    } else {
        Some(clean)
    }
}
