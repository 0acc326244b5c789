//! Unbound (unsaved) TurboIntegrator processes.

use serde::Deserialize;
use serde_json::{json, Value};
use strum::{Display, EnumString};
use tm1_core::url::format_url;
use tracing::{debug, info};

use crate::{service::CellService, CellResult};

const EXECUTE_WITH_RETURN_URL: &str = "/api/v1/ExecuteProcessWithReturn?$expand=*";
const UI_DATA: &str = "CubeAction=1511\u{c}DataAction=1503\u{c}CubeLogChanges=0\u{c}";

/// A process that exists only for the duration of one execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnboundProcess {
    prolog: String,
    metadata: String,
    data: String,
    epilog: String,
}

impl UnboundProcess {
    /// An empty process.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the prolog.
    #[must_use]
    pub fn with_prolog(mut self, prolog: impl Into<String>) -> Self {
        self.prolog = prolog.into();
        self
    }

    /// Replaces the epilog.
    #[must_use]
    pub fn with_epilog(mut self, epilog: impl Into<String>) -> Self {
        self.epilog = epilog.into();
        self
    }

    /// Prolog code.
    pub fn prolog(&self) -> &str {
        &self.prolog
    }

    /// Epilog code.
    pub fn epilog(&self) -> &str {
        &self.epilog
    }

    /// Request body of `ExecuteProcessWithReturn`.
    pub fn body(&self) -> Value {
        json!({
            "Process": {
                "Name": "",
                "PrologProcedure": self.prolog,
                "MetadataProcedure": self.metadata,
                "DataProcedure": self.data,
                "EpilogProcedure": self.epilog,
                "HasSecurityAccess": false,
                "DataSource": {"Type": "None"},
                "Parameters": [],
                "Variables": [],
                "UIData": UI_DATA,
            }
        })
    }
}

/// `ProcessExecuteStatusCode` reported by the server.
///
/// Codes this client does not know parse into [`ProcessExecuteStatus::Other`],
/// which displays the code unchanged.
#[derive(Debug, Clone, PartialEq, Eq, EnumString, Display)]
pub enum ProcessExecuteStatus {
    /// The process ran to the end without errors.
    CompletedSuccessfully,
    /// Some records raised errors, written to the error log.
    HasMinorErrors,
    /// The process stopped on an error.
    Aborted,
    /// The process called `ProcessQuit`.
    QuitCalled,
    /// The process completed and logged messages.
    CompletedWithMessages,
    /// The process called `ProcessRollback`.
    RollbackCalled,
    /// Any other status code.
    #[strum(default)]
    Other(String),
}

impl ProcessExecuteStatus {
    /// `true` only for [`ProcessExecuteStatus::CompletedSuccessfully`].
    pub fn is_success(&self) -> bool {
        matches!(self, Self::CompletedSuccessfully)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorLogFile {
    filename: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ExecuteWithReturn {
    process_execute_status_code: String,
    #[serde(default)]
    error_log_file: Option<ErrorLogFile>,
}

/// Outcome of one process run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExecution {
    /// Status reported by the server.
    pub status: ProcessExecuteStatus,
    /// Error log written by the run, if any.
    pub error_log_file: Option<String>,
}

impl ProcessExecution {
    /// `true` when the run completed without errors.
    pub fn success(&self) -> bool {
        self.status.is_success()
    }
}

impl CellService {
    /// Runs `process` without saving it and reports its status.
    pub fn execute_unbound_process(
        &self,
        process: &UnboundProcess,
    ) -> CellResult<ProcessExecution> {
        let response = self
            .transport()
            .post(EXECUTE_WITH_RETURN_URL, Some(&process.body()))?;
        let raw: ExecuteWithReturn = response.json()?;
        let code = raw.process_execute_status_code;
        let status = code
            .parse()
            .unwrap_or_else(|_| ProcessExecuteStatus::Other(code));
        let execution = ProcessExecution {
            status,
            error_log_file: raw.error_log_file.map(|log| log.filename),
        };
        if execution.success() {
            debug!("unbound process completed");
        } else {
            info!(
                status = %execution.status,
                error_log = execution.error_log_file.as_deref().unwrap_or(""),
                "unbound process did not complete successfully"
            );
        }
        Ok(execution)
    }

    /// Runs `lines` as the prolog of an unbound process.
    pub fn execute_ti_code<S: AsRef<str>>(&self, lines: &[S]) -> CellResult<ProcessExecution> {
        let prolog = lines
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join("\r\n");
        self.execute_unbound_process(&UnboundProcess::new().with_prolog(prolog))
    }

    /// Text of the server error log `file_name`.
    pub fn error_log_file_content(&self, file_name: &str) -> CellResult<String> {
        let url = format_url("/api/v1/ErrorLogFiles('{}')/Content", &[file_name]);
        Ok(self.transport().get(&url)?.text().to_string())
    }
}
