//! Data model of spec.md §3: cluster, executor token, API key, command,
//! result, capability record, and the stream event sum type of DESIGN NOTES
//! §9.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque cluster identifier, `[a-z0-9][a-z0-9-]*`, 1-253 chars.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(String);

impl ClusterId {
    pub fn parse(s: &str) -> Result<Self, String> {
        if s.is_empty() || s.len() > 253 {
            return Err("cluster id must be 1-253 characters".into());
        }
        let mut chars = s.chars();
        let first = chars.next().unwrap();
        if !(first.is_ascii_lowercase() || first.is_ascii_digit()) {
            return Err("cluster id must start with [a-z0-9]".into());
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err("cluster id must match [a-z0-9][a-z0-9-]*".into());
        }
        Ok(ClusterId(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A service identity an `ApiKey` is bound to, used for audit attribution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceIdentity(pub String);

impl fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl ServiceIdentity {
    /// Any identity named `admin` in the `API_KEYS` mapping carries admin
    /// scope (mint/revoke executor tokens). A richer scope model is out of
    /// scope for the core fabric.
    pub fn is_admin(&self) -> bool {
        self.0 == "admin"
    }
}

/// Per-cluster security posture advertised by an executor (§4.6).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SecurityMode {
    ReadOnly,
    ExtendedReadOnly,
    ReadWrite,
}

/// The built-in minimum verb policy used when a cluster has no capability
/// record (spec.md §4.4).
pub const DEFAULT_ALLOWED_VERBS: &[&str] = &["get", "describe", "logs", "events", "top"];

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CapabilityRecord {
    pub security_mode: SecurityMode,
    pub allowed_verbs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_restrictions: Option<serde_json::Value>,
    #[serde(default)]
    pub features: std::collections::HashMap<String, bool>,
    pub executor_version: String,
    pub timestamp: i64,
}

pub const CAPABILITY_LIST_CAP: usize = 200;

/// One kubectl invocation as published to `executor-commands:{cluster_id}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommandPayload {
    pub id: String,
    pub args: Vec<String>,
    pub deadline_unix_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

pub const MAX_ARGS: usize = 64;
pub const MAX_ARG_LEN: usize = 256;

/// The in-process `StreamEvent` sum type (DESIGN NOTES §9). Rendered over
/// SSE as a named `event:` field plus JSON `data:`, never through serde's
/// internal tagging — see `fabric::server::executor::stream`.
#[derive(Clone, Debug)]
pub enum StreamEvent {
    Connected { session_id: String },
    Command(CommandPayload),
    Keepalive,
    Error { message: String },
}

/// Outcome of one command execution, as produced by the executor and
/// consumed by the dispatcher.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CommandResult {
    Success {
        output: Vec<u8>,
        #[serde(default)]
        truncated: bool,
        execution_time_ms: u64,
        executed_at: i64,
    },
    Failure {
        error: String,
        execution_time_ms: u64,
        executed_at: i64,
    },
    Timeout,
}

impl CommandResult {
    pub fn status_str(&self) -> &'static str {
        match self {
            CommandResult::Success { .. } => "success",
            CommandResult::Failure { .. } => "failure",
            CommandResult::Timeout => "timeout",
        }
    }
}

/// Result delivered by an executor to `POST /executor/results`, prior to
/// being keyed by `command_id` and stored at `command:result:{id}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResultSubmission {
    pub command_id: String,
    pub status: String,
    #[serde(default)]
    pub output: Option<Vec<u8>>,
    #[serde(default)]
    pub error: Option<String>,
    pub execution_time_ms: u64,
    pub executed_at: i64,
}

/// The uniform dispatcher response envelope (spec.md §7).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DispatchEnvelope {
    pub command_id: String,
    pub cluster_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

impl DispatchEnvelope {
    pub fn from_result(command_id: String, cluster_id: String, result: CommandResult) -> Self {
        match result {
            CommandResult::Success {
                output,
                truncated,
                execution_time_ms,
                ..
            } => DispatchEnvelope {
                command_id,
                cluster_id,
                status: "success".into(),
                output: Some(String::from_utf8_lossy(&output).into_owned()),
                truncated: Some(truncated),
                error: None,
                execution_time_ms: Some(execution_time_ms),
            },
            CommandResult::Failure {
                error,
                execution_time_ms,
                ..
            } => DispatchEnvelope {
                command_id,
                cluster_id,
                status: "failure".into(),
                output: None,
                truncated: None,
                error: Some(error),
                execution_time_ms: Some(execution_time_ms),
            },
            CommandResult::Timeout => DispatchEnvelope {
                command_id,
                cluster_id,
                status: "timeout".into(),
                output: None,
                truncated: None,
                error: Some("Command execution timeout".into()),
                execution_time_ms: None,
            },
        }
    }
}

/// An audit event appended to `auth:audit` on every credential-store
/// outcome (spec.md §4.1).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEvent {
    pub ts: i64,
    pub identity: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    pub outcome: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_id_accepts_valid() {
        assert!(ClusterId::parse("prod").is_ok());
        assert!(ClusterId::parse("prod-west-1").is_ok());
        assert!(ClusterId::parse("a").is_ok());
        assert!(ClusterId::parse("0-staging").is_ok());
    }

    #[test]
    fn cluster_id_rejects_invalid() {
        assert!(ClusterId::parse("").is_err());
        assert!(ClusterId::parse("-prod").is_err());
        assert!(ClusterId::parse("Prod").is_err());
        assert!(ClusterId::parse("prod_west").is_err());
        assert!(ClusterId::parse(&"a".repeat(254)).is_err());
    }

    #[test]
    fn envelope_from_timeout() {
        let env =
            DispatchEnvelope::from_result("cmd-1".into(), "prod".into(), CommandResult::Timeout);
        assert_eq!(env.status, "timeout");
        assert_eq!(env.error.as_deref(), Some("Command execution timeout"));
        assert!(env.execution_time_ms.is_none());
    }
}
