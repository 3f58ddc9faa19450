//! Output formatting and writing modules

pub mod formats;

use std::fs::{File, OpenOptions};
use std::io::{self, Write};

use crate::config::{OutputConfig, OutputFormat};
use crate::monitor::Snapshot;

pub use formats::{format_json, format_status, format_text, sparkline};

/// Output writer that handles multiple destinations
pub struct OutputWriter {
    config: OutputConfig,
    file: Option<File>,
    written: u64,
    /// A console status line is waiting to be overwritten
    line_open: bool,
}

impl OutputWriter {
    /// Create a new output writer
    pub fn new(config: OutputConfig) -> io::Result<Self> {
        let file = if let Some(ref path) = config.output_path {
            // Ensure parent directory exists
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }

            Some(OpenOptions::new().create(true).append(true).open(path)?)
        } else {
            None
        };

        Ok(Self {
            config,
            file,
            written: 0,
            line_open: false,
        })
    }

    /// Write one snapshot
    pub fn write(&mut self, snapshot: &Snapshot) -> io::Result<()> {
        self.written += 1;

        let formatted = self.format(snapshot);

        if self.config.enable_console {
            self.write_console(&formatted)?;
        }

        if let Some(ref mut file) = self.file {
            writeln!(file, "{}", formatted)?;
        }

        Ok(())
    }

    /// Format the snapshot according to configured format
    fn format(&self, snapshot: &Snapshot) -> String {
        match self.config.format {
            OutputFormat::Text => format_text(snapshot),
            OutputFormat::Json => format_json(snapshot, self.config.include_history),
        }
    }

    fn write_console(&mut self, text: &str) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        match self.config.format {
            // text updates in place
            OutputFormat::Text => {
                write!(stdout, "\r{}\x1b[K", text)?;
                self.line_open = true;
            }
            OutputFormat::Json => writeln!(stdout, "{}", text)?,
        }
        stdout.flush()
    }

    /// Close the status line and flush the file
    pub fn finish(&mut self) -> io::Result<()> {
        if self.line_open {
            println!();
            self.line_open = false;
        }
        self.flush()
    }

    /// Flush any buffered output
    pub fn flush(&mut self) -> io::Result<()> {
        if let Some(ref mut file) = self.file {
            file.flush()?;
        }
        Ok(())
    }

    /// Snapshots written so far
    pub fn written(&self) -> u64 {
        self.written
    }
}

/// Format milliseconds as HH:MM:SS.mmm
pub fn format_timestamp(ms: i64) -> String {
    let total_seconds = ms / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    let millis = ms % 1000;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
    } else {
        format!("{:02}:{:02}.{:03}", minutes, seconds, millis)
    }
}
