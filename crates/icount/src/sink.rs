//! Report file.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;

/// Buffered report file, named `<client>.<pid>.out`.
pub struct ReportSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl ReportSink {
    /// Create (or truncate) the report file for this process under `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if `dir` cannot be created or the file cannot be opened.
    pub fn create(dir: &Path, client_name: &str) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(report_file_name(client_name, std::process::id()));
        info!(path = %path.display(), "creating log file");
        let file = File::create(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn writer(&mut self) -> &mut impl Write {
        &mut self.writer
    }

    /// Flush and close the file, returning its path.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    pub fn finish(self) -> io::Result<PathBuf> {
        let Self { path, mut writer } = self;
        writer.flush()?;
        Ok(path)
    }
}

/// File name of the report written by process `pid`.
#[must_use]
pub fn report_file_name(client_name: &str, pid: u32) -> String {
    format!("{client_name}.{pid}.out")
}
