use async_trait::async_trait;
use newapi_types::{Diagnosis, UserChoice};

use crate::export::LogExport;

/// Presentation side of the supervisor, implemented by the UI layer.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_crash(
        &self,
        exit_code: Option<i32>,
        diagnosis: Option<&Diagnosis>,
        recent_lines: &[String],
    ) -> UserChoice;

    async fn notify_startup_failure(
        &self,
        message: &str,
        diagnosis: Option<&Diagnosis>,
    ) -> UserChoice;

    /// Called after the user chose [`UserChoice::ViewFullLog`].
    async fn deliver_log_export(&self, export: LogExport);
}
