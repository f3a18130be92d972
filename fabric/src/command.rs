//! Pure command validation (spec.md §3, §4.4). Kept free of Redis/network so
//! it is unit-testable without a live fabric.

use kubently_common::error::FabricError;
use kubently_common::types::{DEFAULT_ALLOWED_VERBS, MAX_ARG_LEN, MAX_ARGS};

/// Flag prefixes that would let a caller alter credentials or target a
/// different API server (spec.md §3, §4.4).
const FORBIDDEN_FLAG_PREFIXES: &[&str] = &[
    "--kubeconfig",
    "--server",
    "--token",
    "--as-group",
    "--as",
    "--certificate-authority",
];

/// A validated request to run one kubectl verb against a cluster.
#[derive(Clone, Debug)]
pub struct CommandSpec {
    pub verb: String,
    pub args: Vec<String>,
    pub namespace: Option<String>,
    pub extra_args: Vec<String>,
}

/// Request body shape for `POST /debug/execute` before validation.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct ExecuteRequest {
    pub cluster_id: String,
    pub command_type: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

/// Builds the final `args = [verb, *args, "-n", namespace?, *extra_args]`
/// vector and validates every entry against the forbidden-flag and
/// allow-list rules. `allowed_verbs` is the capability-gated policy (or the
/// built-in default when no capability record exists).
pub fn build_and_validate(
    req: &ExecuteRequest,
    allowed_verbs: &[String],
) -> Result<Vec<String>, FabricError> {
    if !allowed_verbs
        .iter()
        .any(|v| v.eq_ignore_ascii_case(&req.command_type))
    {
        return Err(FabricError::InvalidArgument(format!(
            "verb {:?} not permitted by capability policy",
            req.command_type
        )));
    }

    let mut args = Vec::with_capacity(req.args.len() + 3);
    args.push(req.command_type.clone());
    args.extend(req.args.iter().cloned());
    if let Some(ns) = &req.namespace {
        args.push("-n".to_string());
        args.push(ns.clone());
    }

    if args.len() > MAX_ARGS {
        return Err(FabricError::InvalidArgument(format!(
            "command has {} args, limit is {MAX_ARGS}",
            args.len()
        )));
    }
    for arg in &args {
        if arg.len() > MAX_ARG_LEN {
            return Err(FabricError::InvalidArgument(format!(
                "arg exceeds {MAX_ARG_LEN} bytes"
            )));
        }
    }

    reject_forbidden_flags(&args)?;
    Ok(args)
}

/// Rejects any argument that begins with a credential-altering flag,
/// whether written as `--flag` or `--flag=value`.
pub fn reject_forbidden_flags(args: &[String]) -> Result<(), FabricError> {
    for arg in args {
        for prefix in FORBIDDEN_FLAG_PREFIXES {
            if arg == prefix || arg.starts_with(&format!("{prefix}=")) {
                return Err(FabricError::InvalidArgument(format!(
                    "argument {arg:?} is not permitted"
                )));
            }
        }
    }
    Ok(())
}

/// `args[0]` must be in the executor's own local allow-list (spec.md §4.5
/// step 3); independent of — and the authoritative gate over — the
/// fabric-side capability check.
pub fn verb_allowed(verb: &str, allow_list: &[String]) -> bool {
    allow_list.iter().any(|v| v.eq_ignore_ascii_case(verb))
}

pub fn default_allowed_verbs() -> Vec<String> {
    DEFAULT_ALLOWED_VERBS.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(command_type: &str, args: Vec<&str>) -> ExecuteRequest {
        ExecuteRequest {
            cluster_id: "prod".into(),
            command_type: command_type.into(),
            args: args.into_iter().map(String::from).collect(),
            namespace: Some("kubently".into()),
            timeout_seconds: Some(5),
            correlation_id: None,
        }
    }

    #[test]
    fn builds_args_with_namespace() {
        let r = req("get", vec!["pods"]);
        let args = build_and_validate(&r, &default_allowed_verbs()).unwrap();
        assert_eq!(args, vec!["get", "pods", "-n", "kubently"]);
    }

    #[test]
    fn rejects_verb_not_in_policy() {
        let r = req("exec", vec!["pod/x", "--", "sh"]);
        let err = build_and_validate(&r, &default_allowed_verbs()).unwrap_err();
        assert!(matches!(err, FabricError::InvalidArgument(_)));
    }

    #[test]
    fn rejects_kubeconfig_flag() {
        let r = req("get", vec!["pods", "--kubeconfig=/tmp/evil"]);
        let err = build_and_validate(&r, &default_allowed_verbs()).unwrap_err();
        assert!(matches!(err, FabricError::InvalidArgument(_)));
    }

    #[test]
    fn rejects_token_flag_bare() {
        let r = req("get", vec!["pods", "--token"]);
        let err = build_and_validate(&r, &default_allowed_verbs()).unwrap_err();
        assert!(matches!(err, FabricError::InvalidArgument(_)));
    }

    #[test]
    fn rejects_oversized_arg_count() {
        let args: Vec<&str> = (0..MAX_ARGS + 1).map(|_| "pods").collect();
        let r = req("get", args);
        let err = build_and_validate(&r, &default_allowed_verbs()).unwrap_err();
        assert!(matches!(err, FabricError::InvalidArgument(_)));
    }

    #[test]
    fn verb_allowed_is_case_sensitive_free() {
        let allow = vec!["get".to_string(), "logs".to_string()];
        assert!(verb_allowed("get", &allow));
        assert!(!verb_allowed("exec", &allow));
    }
}
