use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;

pub struct Logger {
  file: Option<Mutex<std::fs::File>>,
  echo: bool,
}

impl Logger {
  pub fn new(path: &Path) -> anyhow::Result<Self> {
    if let Some(parent) = path.parent() {
      if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent)?;
      }
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Self {
      file: Some(Mutex::new(file)),
      echo: true,
    })
  }

  /// Logger that only writes to stderr.
  pub fn console() -> Self {
    Self { file: None, echo: true }
  }

  #[cfg(test)]
  pub fn silent() -> Self {
    Self { file: None, echo: false }
  }

  pub fn log(&self, level: &str, message: &str) {
    let line = format_line(level, message);
    if self.echo {
      eprint!("{line}");
    }
    if let Some(file) = &self.file {
      if let Ok(mut file) = file.lock() {
        let _ = file.write_all(line.as_bytes());
      }
    }
  }

  pub fn info(&self, message: &str) {
    self.log("INFO", message);
  }

  pub fn warn(&self, message: &str) {
    self.log("WARN", message);
  }

  pub fn error(&self, message: &str) {
    self.log("ERROR", message);
  }
}

fn format_line(level: &str, message: &str) -> String {
  let ts = Utc::now().to_rfc3339();
  format!("[{ts}] {level}: {message}\n")
}
