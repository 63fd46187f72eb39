//! Whole-file persistence helpers.
//!
//! Every on-disk artifact in this app is rewritten as a whole file. Writes
//! go through a temp file in the same directory followed by a rename, so a
//! crash mid-write leaves the previous version intact instead of a
//! truncated one.

use std::fs;
use std::io;
use std::path::Path;

pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}
