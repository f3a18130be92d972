use clap::Parser;

#[derive(Parser, Debug, Clone)]
pub struct RedisArgs {
    #[arg(long, env = "REDIS_HOST", default_value = "127.0.0.1")]
    pub redis_host: String,

    #[arg(long, env = "REDIS_PORT", default_value_t = 6379)]
    pub redis_port: u16,

    #[arg(long, env = "REDIS_USERNAME")]
    pub redis_username: Option<String>,

    #[arg(long, env = "REDIS_PASSWORD")]
    pub redis_password: Option<String>,

    #[arg(long, env = "REDIS_PROTO", default_value = "redis")]
    pub redis_proto: String,
}

impl RedisArgs {
    pub fn url_redacted(&self) -> String {
        format!(
            "{}://{}:{}@{}:{}",
            if self.redis_proto.is_empty() {
                "redis"
            } else {
                &self.redis_proto
            },
            self.redis_username.as_deref().unwrap_or(""),
            self.redis_password.as_deref().map(|_| "****").unwrap_or(""),
            self.redis_host,
            self.redis_port
        )
    }

    pub fn url(&self) -> String {
        let proto = if self.redis_proto.is_empty() {
            "redis"
        } else {
            &self.redis_proto
        };
        let mut url = format!("{}://", proto);
        if let Some(ref username) = self.redis_username {
            url.push_str(username);
            if let Some(ref password) = self.redis_password {
                url.push(':');
                url.push_str(password);
            }
            url.push('@');
        } else if let Some(ref password) = self.redis_password {
            url.push(':');
            url.push_str(password);
            url.push('@');
        }
        url.push_str(&format!("{}:{}/", self.redis_host, self.redis_port));
        url
    }
}

use std::collections::HashMap;

use crate::types::ServiceIdentity;

/// `API_KEYS` on the wire: `service:key,service:key,...` (spec.md §4.1).
#[derive(Parser, Debug, Clone)]
pub struct ApiKeysArgs {
    #[arg(long, env = "API_KEYS", hide_env_values = true)]
    pub api_keys: String,
}

impl ApiKeysArgs {
    /// Parses the `service:key,...` mapping into `key -> identity`, the
    /// direction the credential store actually looks up by.
    pub fn parse_map(&self) -> anyhow::Result<HashMap<String, ServiceIdentity>> {
        let mut map = HashMap::new();
        for entry in self.api_keys.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let (identity, key) = entry
                .split_once(':')
                .ok_or_else(|| anyhow::anyhow!("malformed API_KEYS entry: {entry:?}"))?;
            if key.is_empty() {
                anyhow::bail!("empty key for identity {identity:?} in API_KEYS");
            }
            map.insert(key.to_string(), ServiceIdentity(identity.to_string()));
        }
        Ok(map)
    }
}

/// Shared fabric process configuration (spec.md §6 configuration surface).
#[derive(Parser, Debug, Clone)]
pub struct FabricArgs {
    #[clap(flatten)]
    pub redis: RedisArgs,

    #[clap(flatten)]
    pub api_keys: ApiKeysArgs,

    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    #[arg(long, env = "COMMAND_TIMEOUT_DEFAULT_SECONDS", default_value_t = 10)]
    pub command_timeout_default_seconds: u64,

    #[arg(long, env = "COMMAND_OUTPUT_CAP_BYTES", default_value_t = 1024 * 1024)]
    pub command_output_cap_bytes: usize,

    #[arg(long, env = "SSE_KEEPALIVE_SECONDS", default_value_t = 30)]
    pub sse_keepalive_seconds: u64,
}

/// Executor process configuration (spec.md §4.5, §6).
#[derive(Parser, Debug, Clone)]
pub struct ExecutorArgs {
    #[arg(long, env = "CLUSTER_ID")]
    pub cluster_id: String,

    #[arg(long, env = "EXECUTOR_TOKEN", hide_env_values = true)]
    pub executor_token: String,

    #[arg(long, env = "API_BASE_URL")]
    pub api_base_url: String,

    #[arg(long, env = "KUBECTL_PATH", default_value = "kubectl")]
    pub kubectl_path: String,

    #[arg(long, env = "COMMAND_TIMEOUT_SECONDS", default_value_t = 20)]
    pub command_timeout_seconds: u64,

    #[arg(long, env = "COMMAND_OUTPUT_CAP_BYTES", default_value_t = 1024 * 1024)]
    pub command_output_cap_bytes: usize,

    #[arg(long, env = "HEARTBEAT_INTERVAL_SECONDS", default_value_t = 300)]
    pub heartbeat_interval_seconds: u64,

    /// Disable the capability reporter (§4.6); the executor still enforces
    /// its local allow-list, it just never advertises it.
    #[arg(long, env = "DISABLE_CAPABILITY_REPORTER", default_value_t = false)]
    pub disable_capability_reporter: bool,
}
