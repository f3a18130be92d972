//! The executor's own verb allow-list: the authoritative, local gate that
//! runs regardless of what the fabric's capability policy says (spec.md
//! §4.5 step 3). Mirrors `kubently_fabric::command::verb_allowed` but lives
//! here since the two crates don't share a binary.

use kubently_common::types::DEFAULT_ALLOWED_VERBS;

/// Case-insensitive membership check against the local allow-list.
pub fn verb_allowed_local(verb: &str, allow_list: &[String]) -> bool {
    allow_list.iter().any(|v| v.eq_ignore_ascii_case(verb))
}

pub fn default_allow_list() -> Vec<String> {
    DEFAULT_ALLOWED_VERBS.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_list_permits_read_only_verbs() {
        let allow = default_allow_list();
        assert!(verb_allowed_local("get", &allow));
        assert!(verb_allowed_local("LOGS", &allow));
        assert!(!verb_allowed_local("delete", &allow));
        assert!(!verb_allowed_local("exec", &allow));
    }
}
