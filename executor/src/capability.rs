//! Builds the capability record an executor reports on startup and refreshes
//! via heartbeat (spec.md §4.6). `security_mode` is fixed at `ReadOnly`
//! since the allow-list this executor enforces never admits write verbs.

use kubently_common::types::{CapabilityRecord, SecurityMode};

use crate::command::default_allow_list;

pub fn build() -> CapabilityRecord {
    CapabilityRecord {
        security_mode: SecurityMode::ReadOnly,
        allowed_verbs: default_allow_list(),
        resource_restrictions: None,
        features: Default::default(),
        executor_version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: 0,
    }
}
