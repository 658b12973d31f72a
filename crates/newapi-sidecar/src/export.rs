use chrono::{DateTime, Local};
use newapi_types::{APP_NAME, BACKEND_BINARY_NAME};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HostInfo {
    pub app_version: String,
    pub platform: &'static str,
    pub arch: &'static str,
}

impl HostInfo {
    pub fn current(app_version: impl Into<String>) -> Self {
        Self {
            app_version: app_version.into(),
            platform: std::env::consts::OS,
            arch: std::env::consts::ARCH,
        }
    }
}

/// Text artifact handed to the UI layer, which decides where to store it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LogExport {
    pub file_name: String,
    pub contents: String,
}

pub fn build_export(host: &HostInfo, entries: &[String], now: DateTime<Local>) -> LogExport {
    let file_name = format!(
        "{}-crash-{}.log",
        BACKEND_BINARY_NAME,
        now.format("%Y%m%d-%H%M%S-%3f")
    );

    let mut contents = String::new();
    contents.push_str(&format!("{} Crash Log\n", APP_NAME));
    contents.push_str(&format!("Timestamp: {}\n", now.to_rfc3339()));
    contents.push_str(&format!("Platform: {} ({})\n", host.platform, host.arch));
    contents.push_str(&format!("App Version: {}\n", host.app_version));
    contents.push_str(&format!("\n--- Server error output ({} lines) ---\n", entries.len()));
    for entry in entries {
        contents.push_str(entry);
        contents.push('\n');
    }

    LogExport {
        file_name,
        contents,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 10, 15, 9, 30, 5).unwrap()
    }

    #[test]
    fn test_export_contents() {
        let host = HostInfo {
            app_version: "1.2.3".into(),
            platform: "linux",
            arch: "x86_64",
        };
        let entries = vec!["first".to_string(), "second".to_string()];

        let export = build_export(&host, &entries, fixed_time());

        assert!(export.contents.contains("Platform: linux (x86_64)"));
        assert!(export.contents.contains("App Version: 1.2.3"));
        assert!(export.contents.contains("Timestamp: 2026-10-15T09:30:05"));
        let first = export.contents.find("first").unwrap();
        let second = export.contents.find("second").unwrap();
        assert!(first < second);
        assert!(export.contents.ends_with("second\n"));
    }

    #[test]
    fn test_file_name() {
        let host = HostInfo::current("0.1.0");
        let export = build_export(&host, &[], fixed_time());
        assert_eq!(export.file_name, "new-api-crash-20261015-093005-000.log");
    }
}
