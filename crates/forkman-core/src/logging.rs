use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Append-only log file that rotates to `<file>.old` once it grows past
/// `max_bytes`. The size check runs each time a writer is handed out, i.e.
/// once per event, so a single line is never split across files.
#[derive(Debug, Clone)]
pub struct RotatingLogFile {
    path: PathBuf,
    max_bytes: u64,
    mirror_stderr: bool,
}

impl RotatingLogFile {
    pub fn new(path: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            path: path.into(),
            max_bytes,
            mirror_stderr: false,
        }
    }

    pub fn mirror_stderr(mut self, mirror: bool) -> Self {
        self.mirror_stderr = mirror;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn open_writer(&self) -> Result<LogLineWriter> {
        rotate_if_needed(&self.path, self.max_bytes)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open log file: {}", self.path.display()))?;
        Ok(LogLineWriter {
            file: Some(file),
            mirror_stderr: self.mirror_stderr,
        })
    }
}

impl<'a> MakeWriter<'a> for RotatingLogFile {
    type Writer = LogLineWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.open_writer().unwrap_or(LogLineWriter {
            file: None,
            mirror_stderr: self.mirror_stderr,
        })
    }
}

#[derive(Debug)]
pub struct LogLineWriter {
    file: Option<File>,
    mirror_stderr: bool,
}

impl Write for LogLineWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.mirror_stderr {
            let _ = io::stderr().write_all(buf);
        }
        match &mut self.file {
            Some(file) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.file {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

pub fn rotated_log_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".old");
    path.with_file_name(name)
}

/// Returns whether a rotation happened.
pub fn rotate_if_needed(path: &Path, max_bytes: u64) -> Result<bool> {
    let size = match fs::metadata(path) {
        Ok(metadata) => metadata.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to stat log file: {}", path.display()));
        }
    };
    if size <= max_bytes {
        return Ok(false);
    }

    let rotated = rotated_log_path(path);
    fs::rename(path, &rotated).with_context(|| {
        format!(
            "failed to rotate log {} -> {}",
            path.display(),
            rotated.display()
        )
    })?;
    Ok(true)
}

pub fn init_logging(path: &Path, max_bytes: u64, verbose: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log dir: {}", parent.display()))?;
    }

    let filter = EnvFilter::new(if verbose { "debug" } else { "info" });
    let sink = RotatingLogFile::new(path, max_bytes).mirror_stderr(verbose);
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(sink)
        .with_ansi(false)
        .with_target(false);

    if verbose {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init()
            .context("failed to install log subscriber")?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.without_time())
            .try_init()
            .context("failed to install log subscriber")?;
    }
    Ok(())
}
