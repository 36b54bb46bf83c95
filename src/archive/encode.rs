use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tar::Builder;
use walkdir::WalkDir;

/// Encode `src` into a tar stream written to `writer`
///
/// Entries are named relative to the parent of `src`, so encoding `/a/b/in`
/// yields `in`, `in/x.txt`, ... in depth-first, name-sorted order. Regular files
/// that cannot be opened are skipped entirely (no header is emitted); a read
/// failure after the header was written aborts the whole encode.
///
/// Returns the writer once the archive trailer has been written.
pub fn encode_dir<W: Write>(src: &Path, writer: W) -> io::Result<W> {
    let root = archive_root(src);
    let mut builder = Builder::new(writer);

    for entry in WalkDir::new(src).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let name = if relative.as_os_str().is_empty() {
            root.clone()
        } else {
            root.join(relative)
        };
        if name.as_os_str().is_empty() {
            continue;
        }

        let file_type = entry.file_type();
        if file_type.is_dir() {
            builder.append_dir(&name, entry.path())?;
        } else if file_type.is_file() {
            let mut file = match File::open(entry.path()) {
                Ok(file) => file,
                Err(e) => {
                    log::warn!("Skipping unreadable file {}: {}", entry.path().display(), e);
                    continue;
                }
            };
            builder.append_file(&name, &mut file)?;
        } else {
            log::debug!("Skipping non-regular entry {}", entry.path().display());
        }
    }

    builder.into_inner()
}

/// Name the archive root after the last component of `src`
fn archive_root(src: &Path) -> PathBuf {
    src.file_name().map(PathBuf::from).unwrap_or_default()
}
