//! Optional sink that appends raw inbound JSON messages to disk.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Error;

/// Writes each inbound message to its own sequence-numbered file. The
/// target directory must be empty at startup; a non-empty directory (or
/// a path that is a regular file) is a fatal configuration error.
pub struct CacheSink {
    dir: PathBuf,
    next_seq: AtomicU64,
}

impl CacheSink {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let dir = dir.into();

        if dir.is_file() {
            return Err(Error::Config(format!(
                "cache path {} is a regular file",
                dir.display()
            )));
        }

        fs::create_dir_all(&dir)?;
        if directory_has_entries(&dir)? {
            return Err(Error::Config(format!(
                "cache directory {} is not empty",
                dir.display()
            )));
        }

        Ok(Self {
            dir,
            next_seq: AtomicU64::new(0),
        })
    }

    /// Append `raw` as `NNNNNN_<product>_<message_type>.json`.
    pub fn write(&self, product: &str, message_type: &str, raw: &str) -> Result<(), Error> {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let filename = format!("{seq:06}_{product}_{message_type}.json");
        let mut file = fs::File::create(self.dir.join(filename))?;
        file.write_all(raw.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }
}

fn directory_has_entries(dir: &Path) -> Result<bool, Error> {
    Ok(fs::read_dir(dir)?.next().is_some())
}
