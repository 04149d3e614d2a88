//! Size-bounded rotating log file.
//!
//! The active file keeps its configured name (`combined.log`); rotated files
//! get a numeric suffix, `.1` being the most recent. A sink keeps at most
//! `max_files` files, the active one included, and deletes the oldest beyond
//! that.
//!
//! Writes never fail towards the caller: an I/O error is reported on stderr
//! and the record is dropped.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// A `Write` implementation that rotates by size.
///
/// Not internally synchronized. Each instance is owned by a single
/// `tracing_appender::non_blocking` worker.
#[derive(Debug)]
pub struct RotatingFileWriter {
    path: PathBuf,
    file: Option<File>,
    written: u64,
    max_bytes: u64,
    max_files: usize,
}

impl RotatingFileWriter {
    /// Open (or create) the active file at `path`, appending to it.
    pub fn open(path: impl Into<PathBuf>, max_bytes: u64, max_files: usize) -> io::Result<Self> {
        let path = path.into();
        let file = open_append(&path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path,
            file: Some(file),
            written,
            max_bytes: max_bytes.max(1),
            max_files: max_files.max(1),
        })
    }

    /// Path of the active file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the `index`-th rotated file (1 = most recent).
    pub fn rotated_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{}", index));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        // Close before renaming so the handle never points at a history file.
        self.file = None;

        let history = self.max_files - 1;
        if history == 0 {
            self.file = Some(File::create(&self.path)?);
            self.written = 0;
            return Ok(());
        }

        let oldest = self.rotated_path(history);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for index in (1..history).rev() {
            let from = self.rotated_path(index);
            if from.exists() {
                fs::rename(&from, self.rotated_path(index + 1))?;
            }
        }
        fs::rename(&self.path, self.rotated_path(1))?;

        self.file = Some(open_append(&self.path)?);
        self.written = 0;
        Ok(())
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<()> {
        if self.written > 0 && self.written + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }
        if self.file.is_none() {
            self.file = Some(open_append(&self.path)?);
        }
        if let Some(file) = self.file.as_mut() {
            file.write_all(buf)?;
            self.written += buf.len() as u64;
        }
        Ok(())
    }
}

impl Write for RotatingFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Err(e) = self.try_write(buf) {
            eprintln!(
                "log sink {} failed, record dropped: {}",
                self.path.display(),
                e
            );
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            if let Err(e) = file.flush() {
                eprintln!("log sink {} flush failed: {}", self.path.display(), e);
            }
        }
        Ok(())
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}
