use async_trait::async_trait;
use newapi_sidecar::{LogExport, Notifier};
use newapi_types::{Diagnosis, UserChoice, APP_NAME};
use parking_lot::Mutex;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Terminal stand-in for the crash dialogs. Answers every prompt with the
/// choice given on the command line.
pub struct ConsoleNotifier {
    choice: UserChoice,
    export_dir: PathBuf,
    last_export: Mutex<Option<PathBuf>>,
}

impl ConsoleNotifier {
    pub fn new(choice: UserChoice, export_dir: impl Into<PathBuf>) -> Self {
        Self {
            choice,
            export_dir: export_dir.into(),
            last_export: Mutex::new(None),
        }
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    pub fn last_export(&self) -> Option<PathBuf> {
        self.last_export.lock().clone()
    }
}

fn write_diagnosis(out: &mut String, diagnosis: Option<&Diagnosis>) {
    match diagnosis {
        Some(d) => {
            let _ = writeln!(out, "  \x1b[1m{}\x1b[0m", d.title);
            let _ = writeln!(out, "  {}", d.message);
            let _ = writeln!(out, "  \x1b[38;5;245m{}\x1b[0m", d.remediation);
        }
        None => {
            let _ = writeln!(out, "  The server stopped unexpectedly. The cause could not be determined.");
        }
    }
}

pub fn render_crash(exit_code: Option<i32>, diagnosis: Option<&Diagnosis>, recent_lines: &[String]) -> String {
    let mut out = String::new();
    let code = exit_code.map(|c| c.to_string()).unwrap_or_else(|| "null".into());
    let _ = writeln!(out, "\x1b[38;5;196m{} server crashed (exit code {})\x1b[0m", APP_NAME, code);
    write_diagnosis(&mut out, diagnosis);

    if !recent_lines.is_empty() {
        let _ = writeln!(out, "\n  Recent output:");
        for line in recent_lines {
            let _ = writeln!(out, "    {}", line);
        }
    }
    out
}

pub fn render_startup_failure(message: &str, diagnosis: Option<&Diagnosis>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\x1b[38;5;196m{} server failed to start\x1b[0m", APP_NAME);
    let _ = writeln!(out, "  {}", message);
    write_diagnosis(&mut out, diagnosis);
    out
}

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn notify_crash(
        &self,
        exit_code: Option<i32>,
        diagnosis: Option<&Diagnosis>,
        recent_lines: &[String],
    ) -> UserChoice {
        eprintln!("{}", render_crash(exit_code, diagnosis, recent_lines));
        self.choice
    }

    async fn notify_startup_failure(&self, message: &str, diagnosis: Option<&Diagnosis>) -> UserChoice {
        eprintln!("{}", render_startup_failure(message, diagnosis));
        self.choice
    }

    async fn deliver_log_export(&self, export: LogExport) {
        if let Err(e) = tokio::fs::create_dir_all(&self.export_dir).await {
            error!("Failed to create log directory {:?}: {}", self.export_dir, e);
            return;
        }

        let path = self.export_dir.join(&export.file_name);
        match tokio::fs::write(&path, export.contents.as_bytes()).await {
            Ok(()) => {
                info!("Crash log written to {:?}", path);
                eprintln!("Full log: {}", path.display());
                *self.last_export.lock() = Some(path);
            }
            Err(e) => error!("Failed to write crash log {:?}: {}", path, e),
        }
    }
}
