//! Change detection for single-pass archive entry bodies
//!
//! A tar entry can be read exactly once. To compare it against a file already on
//! disk without losing the bytes, the entry is read through a [`TeeReader`] that
//! keeps a copy; if the content differs, that copy becomes the body to write.

use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions, Permissions};
use std::io::{self, Cursor, Read, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::Path;

/// Reader that copies every byte it yields into `sink`
pub struct TeeReader<R, W> {
    reader: R,
    sink: W,
}

impl<R: Read, W: Write> TeeReader<R, W> {
    pub fn new(reader: R, sink: W) -> Self {
        Self { reader, sink }
    }

    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.sink)
    }
}

impl<R: Read, W: Write> Read for TeeReader<R, W> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.reader.read(buf)?;
        self.sink.write_all(&buf[..n])?;
        Ok(n)
    }
}

/// Readable body of an entry: the untouched stream or the replay buffer
pub enum Body<R> {
    Original(R),
    Buffered(Cursor<Vec<u8>>),
}

impl<R: Read> Read for Body<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Body::Original(reader) => reader.read(buf),
            Body::Buffered(cursor) => cursor.read(buf),
        }
    }
}

/// Outcome of comparing an entry against its destination
pub enum Change<R> {
    /// Destination already holds identical content; nothing to write
    Unchanged,
    /// Destination is missing or differs; write exactly this body
    Changed(Body<R>),
}

impl<R> Change<R> {
    pub fn is_changed(&self) -> bool {
        matches!(self, Change::Changed(_))
    }
}

/// Hex SHA-256 of everything `reader` yields
pub fn sha256_hex(mut reader: impl Read) -> io::Result<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Decide whether `body` needs to be written to `target`
///
/// The caller must write the body carried by [`Change::Changed`], never the
/// original reader: after hashing, the original is exhausted.
pub fn detect_change<R: Read>(body: R, target: &Path) -> io::Result<Change<R>> {
    match fs::symlink_metadata(target) {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Ok(Change::Changed(Body::Original(body)));
        }
        Err(e) => return Err(e),
    }

    // an unreadable target is rewritten through write_file's permission recovery
    let existing = match File::open(target) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            return Ok(Change::Changed(Body::Original(body)));
        }
        Err(e) => return Err(e),
    };
    let target_hash = sha256_hex(existing)?;

    let mut tee = TeeReader::new(body, Vec::new());
    let source_hash = sha256_hex(&mut tee)?;

    if source_hash == target_hash {
        return Ok(Change::Unchanged);
    }

    let (_, buffered) = tee.into_inner();
    Ok(Change::Changed(Body::Buffered(Cursor::new(buffered))))
}

fn open_for_write(target: &Path, mode: u32) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(target)
}

/// Write `body` to `target` and leave it with permission bits `mode`
///
/// A destination that lost its write bit is made writable for the duration of
/// the write; the final `chmod` restores `mode` either way.
pub fn write_file(body: &mut impl Read, target: &Path, mode: u32) -> io::Result<u64> {
    let mode = mode & 0o7777;
    let mut file = match open_for_write(target, mode) {
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied && target.exists() => {
            fs::set_permissions(target, Permissions::from_mode(mode | 0o200))?;
            open_for_write(target, mode)?
        }
        other => other?,
    };

    let written = io::copy(body, &mut file)?;
    file.flush()?;
    drop(file);

    fs::set_permissions(target, Permissions::from_mode(mode))?;
    Ok(written)
}
