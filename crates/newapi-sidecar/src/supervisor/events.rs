use newapi_types::Diagnosis;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SupervisorEvent {
    Ready {
        base_url: String,
    },
    StartupFailed {
        message: String,
        diagnosis: Option<Diagnosis>,
    },
    Crashed {
        exit_code: Option<i32>,
        diagnosis: Option<Diagnosis>,
    },
    NormalExit {
        exit_code: Option<i32>,
    },
    Stopped,
}

impl SupervisorEvent {
    /// Events after which the host should close.
    pub fn requests_host_exit(&self) -> bool {
        matches!(
            self,
            SupervisorEvent::StartupFailed { .. }
                | SupervisorEvent::Crashed { .. }
                | SupervisorEvent::NormalExit { .. }
        )
    }
}
