use newapi_types::{Diagnosis, ErrorCategory};
use serde::{Deserialize, Serialize};

const PORT_PLACEHOLDER: &str = "{port}";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Zh,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiagnosisTemplate {
    pub title: &'static str,
    pub message: &'static str,
    pub remediation: &'static str,
}

impl DiagnosisTemplate {
    pub fn render(&self, category: ErrorCategory, port: u16) -> Diagnosis {
        Diagnosis {
            category,
            title: self.title.to_string(),
            message: self.message.to_string(),
            remediation: self.remediation.replace(PORT_PLACEHOLDER, &port.to_string()),
        }
    }
}

pub fn template(category: ErrorCategory, locale: Locale) -> DiagnosisTemplate {
    match locale {
        Locale::En => english(category),
        Locale::Zh => chinese(category),
    }
}

fn english(category: ErrorCategory) -> DiagnosisTemplate {
    match category {
        ErrorCategory::PortInUse => DiagnosisTemplate {
            title: "Port already in use",
            message: "The server could not listen on its port because another program is using it.",
            remediation: "Close the application using port {port}, or configure a different port, then restart.",
        },
        ErrorCategory::DatabaseLocked => DiagnosisTemplate {
            title: "Database is locked",
            message: "The database file is locked by another process.",
            remediation: "Make sure no other instance of the application is running, then restart.",
        },
        ErrorCategory::PermissionDenied => DiagnosisTemplate {
            title: "Permission denied",
            message: "The server was denied access to a file or resource it needs.",
            remediation: "Check that the data directory is writable by your user account, or run the application with sufficient privileges.",
        },
        ErrorCategory::NetworkUnreachable => DiagnosisTemplate {
            title: "Network unreachable",
            message: "The server could not reach a required network service.",
            remediation: "Check your network connection, proxy and firewall settings, then restart.",
        },
        ErrorCategory::InvalidConfiguration => DiagnosisTemplate {
            title: "Invalid configuration",
            message: "The server rejected its configuration.",
            remediation: "Review the environment variables and configuration files for invalid values.",
        },
        ErrorCategory::OutOfMemory => DiagnosisTemplate {
            title: "Out of memory",
            message: "The server ran out of memory.",
            remediation: "Close other applications to free memory, then restart.",
        },
        ErrorCategory::MissingFile => DiagnosisTemplate {
            title: "Missing file",
            message: "A file required by the server could not be found.",
            remediation: "Reinstall the application to restore missing files.",
        },
    }
}

fn chinese(category: ErrorCategory) -> DiagnosisTemplate {
    match category {
        ErrorCategory::PortInUse => DiagnosisTemplate {
            title: "端口被占用",
            message: "服务器无法监听端口，该端口已被其他程序占用。",
            remediation: "请关闭占用端口 {port} 的程序，或更换端口后重新启动。",
        },
        ErrorCategory::DatabaseLocked => DiagnosisTemplate {
            title: "数据库被锁定",
            message: "数据库文件被其他进程锁定。",
            remediation: "请确认没有其他应用实例正在运行，然后重新启动。",
        },
        ErrorCategory::PermissionDenied => DiagnosisTemplate {
            title: "权限不足",
            message: "服务器无法访问所需的文件或资源。",
            remediation: "请检查数据目录是否可写，或以足够的权限运行应用。",
        },
        ErrorCategory::NetworkUnreachable => DiagnosisTemplate {
            title: "网络不可达",
            message: "服务器无法连接到所需的网络服务。",
            remediation: "请检查网络连接、代理及防火墙设置，然后重新启动。",
        },
        ErrorCategory::InvalidConfiguration => DiagnosisTemplate {
            title: "配置无效",
            message: "服务器拒绝了当前配置。",
            remediation: "请检查环境变量和配置文件中的无效值。",
        },
        ErrorCategory::OutOfMemory => DiagnosisTemplate {
            title: "内存不足",
            message: "服务器内存耗尽。",
            remediation: "请关闭其他应用以释放内存，然后重新启动。",
        },
        ErrorCategory::MissingFile => DiagnosisTemplate {
            title: "文件缺失",
            message: "找不到服务器所需的文件。",
            remediation: "请重新安装应用以恢复缺失的文件。",
        },
    }
}
