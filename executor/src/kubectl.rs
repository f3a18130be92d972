//! Bounded kubectl subprocess invocation (spec.md §4.5 step 3), grounded in
//! the `tokio::process::Command` + piped `Stdio` + `tokio::time::timeout`
//! pattern used throughout `wseaton-dagrun`'s task executor.

use std::process::Stdio;
use std::time::Duration;

use chrono::Utc;
use kubently_common::args::ExecutorArgs;
use kubently_common::types::{CommandPayload, ResultSubmission};
use tokio::process::Command;
use tokio::time::timeout;

use crate::command::verb_allowed_local;

/// Runs one command payload to completion (or timeout) and builds the
/// `ResultSubmission` the executor posts back to the fabric. Never returns
/// `Err`: every failure mode, including a rejected verb, a spawn error, or a
/// wall-clock timeout, is folded into a `status = "failure"` submission so
/// the caller always has something to POST.
pub async fn run(args: &ExecutorArgs, allow_list: &[String], payload: &CommandPayload) -> ResultSubmission {
    let started = std::time::Instant::now();

    let Some(verb) = payload.args.first() else {
        return failure(payload, started, "command has no verb".into());
    };
    if !verb_allowed_local(verb, allow_list) {
        return failure(
            payload,
            started,
            format!("verb {verb:?} is not in this executor's local allow-list"),
        );
    }

    let deadline_remaining_ms = payload.deadline_unix_ms - Utc::now().timestamp_millis();
    if deadline_remaining_ms <= 0 {
        return failure(payload, started, "command deadline already elapsed".into());
    }
    let budget = Duration::from_millis(deadline_remaining_ms as u64)
        .min(Duration::from_secs(args.command_timeout_seconds));

    let spawn = Command::new(&args.kubectl_path)
        .args(&payload.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let child = match spawn {
        Ok(child) => child,
        Err(e) => return failure(payload, started, format!("failed to spawn kubectl: {e}")),
    };

    match timeout(budget, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let execution_time_ms = started.elapsed().as_millis() as u64;
            let executed_at = Utc::now().timestamp_millis();
            if output.status.success() {
                let (bytes, truncated) = cap(output.stdout, args.command_output_cap_bytes);
                ResultSubmission {
                    command_id: payload.id.clone(),
                    status: "success".into(),
                    output: Some(bytes),
                    error: None,
                    execution_time_ms,
                    executed_at,
                }
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                let message = if stderr.trim().is_empty() {
                    format!("kubectl exited with {}", output.status)
                } else {
                    stderr
                };
                ResultSubmission {
                    command_id: payload.id.clone(),
                    status: "failure".into(),
                    output: None,
                    error: Some(truncate_str(message, args.command_output_cap_bytes)),
                    execution_time_ms,
                    executed_at,
                }
            }
        }
        Ok(Err(e)) => failure(payload, started, format!("kubectl wait failed: {e}")),
        Err(_) => failure(
            payload,
            started,
            format!("command exceeded {}s wall-clock limit", budget.as_secs()),
        ),
    }
}

fn failure(payload: &CommandPayload, started: std::time::Instant, error: String) -> ResultSubmission {
    ResultSubmission {
        command_id: payload.id.clone(),
        status: "failure".into(),
        output: None,
        error: Some(error),
        execution_time_ms: started.elapsed().as_millis() as u64,
        executed_at: Utc::now().timestamp_millis(),
    }
}

fn cap(mut bytes: Vec<u8>, cap_bytes: usize) -> (Vec<u8>, bool) {
    if bytes.len() > cap_bytes {
        bytes.truncate(cap_bytes);
        (bytes, true)
    } else {
        (bytes, false)
    }
}

fn truncate_str(mut s: String, cap_bytes: usize) -> String {
    if s.len() > cap_bytes {
        s.truncate(cap_bytes);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(verb_line: &[&str], deadline_ms_from_now: i64) -> CommandPayload {
        CommandPayload {
            id: "cmd-test".into(),
            args: verb_line.iter().map(|s| s.to_string()).collect(),
            deadline_unix_ms: Utc::now().timestamp_millis() + deadline_ms_from_now,
            correlation_id: None,
        }
    }

    fn args() -> ExecutorArgs {
        ExecutorArgs {
            cluster_id: "prod".into(),
            executor_token: "t".into(),
            api_base_url: "http://localhost".into(),
            kubectl_path: "kubectl".into(),
            command_timeout_seconds: 20,
            command_output_cap_bytes: 1024,
            heartbeat_interval_seconds: 300,
            disable_capability_reporter: false,
        }
    }

    #[tokio::test]
    async fn rejects_verb_outside_local_allow_list() {
        let allow = vec!["get".to_string()];
        let p = payload(&["exec", "pod/x"], 5_000);
        let result = run(&args(), &allow, &p).await;
        assert_eq!(result.status, "failure");
        assert!(result.error.unwrap().contains("allow-list"));
    }

    #[tokio::test]
    async fn rejects_already_elapsed_deadline() {
        let allow = vec!["get".to_string()];
        let p = payload(&["get", "pods"], -1_000);
        let result = run(&args(), &allow, &p).await;
        assert_eq!(result.status, "failure");
        assert!(result.error.unwrap().contains("deadline"));
    }

    #[test]
    fn cap_marks_truncation() {
        let (bytes, truncated) = cap(vec![0u8; 10], 4);
        assert_eq!(bytes.len(), 4);
        assert!(truncated);
        let (bytes, truncated) = cap(vec![0u8; 3], 4);
        assert_eq!(bytes.len(), 3);
        assert!(!truncated);
    }
}
