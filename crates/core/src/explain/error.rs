use crate::explain::Provider;
use serde_json::Value;
use std::fmt;

/// Carries enough raw material to debug a failed rewrite without re-running
/// it: the stage that failed and the model's actual output.
#[derive(Debug, Clone)]
pub struct ExplainDiagnosticsError {
    pub provider: Provider,
    pub stage: &'static str,
    pub detail: String,
    pub raw_output: Option<String>,
    pub raw_response_json: Option<Value>,
}

impl fmt::Display for ExplainDiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "explanation rewrite error (provider={:?}, stage={}): {}",
            self.provider, self.stage, self.detail
        )
    }
}

impl std::error::Error for ExplainDiagnosticsError {}
