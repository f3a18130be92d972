//! Redis key and channel name builders for the dispatch fabric.
//!
//! Centralizing these here keeps the wire-layout (spec.md §6) in one place,
//! mirroring `eosin_common::streams`'s `subjects` module but addressed at
//! Redis keys/pub-sub channels instead of NATS subjects.

use std::fmt::Display;

/// `executor:token:{cluster_id}` — executor credential.
pub fn executor_token<T: Display>(cluster_id: T) -> String {
    format!("executor:token:{cluster_id}")
}

/// `cluster:active:{cluster_id}` — advisory activity hint, TTL ~60s.
pub fn cluster_active<T: Display>(cluster_id: T) -> String {
    format!("cluster:active:{cluster_id}")
}

/// `cluster:{cluster_id}:capabilities` — capability record, TTL ~1h.
pub fn cluster_capabilities<T: Display>(cluster_id: T) -> String {
    format!("cluster:{cluster_id}:capabilities")
}

/// `command:result:{command_id}` — result slot, TTL ~60s.
pub fn command_result<T: Display>(command_id: T) -> String {
    format!("command:result:{command_id}")
}

/// `auth:audit` — append-only audit log list.
pub const AUTH_AUDIT: &str = "auth:audit";

/// Pub/sub channel `executor-commands:{cluster_id}` — command fan-out.
pub fn executor_commands<T: Display>(cluster_id: T) -> String {
    format!("executor-commands:{cluster_id}")
}

/// Pub/sub channel `command:result-channel:{command_id}` — result wake-up.
pub fn command_result_channel<T: Display>(command_id: T) -> String {
    format!("command:result-channel:{command_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_match_spec_layout() {
        assert_eq!(executor_token("prod"), "executor:token:prod");
        assert_eq!(cluster_active("prod"), "cluster:active:prod");
        assert_eq!(
            cluster_capabilities("prod"),
            "cluster:prod:capabilities"
        );
        assert_eq!(command_result("abc"), "command:result:abc");
        assert_eq!(
            executor_commands("prod"),
            "executor-commands:prod"
        );
        assert_eq!(
            command_result_channel("abc"),
            "command:result-channel:abc"
        );
    }
}
