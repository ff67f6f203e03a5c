use crate::domain::ports::ProgressLog;
use crate::utils::error::Result;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Appends `YYYY-MM-DD HH:MM:SS : <message>` lines to a text file.
#[derive(Debug, Clone)]
pub struct FileProgressLog {
    path: PathBuf,
}

impl FileProgressLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

pub fn format_entry(message: &str) -> String {
    let time_stamp = chrono::Local::now().format(TIMESTAMP_FORMAT);
    format!("{} : {}\n", time_stamp, message)
}

impl ProgressLog for FileProgressLog {
    fn append(&self, message: &str) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        // Single write per entry.
        file.write_all(format_entry(message).as_bytes())?;
        Ok(())
    }
}
