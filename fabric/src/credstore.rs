//! Credential Store (C1) — spec.md §4.1.
//!
//! The API key set is parsed once at startup (`ApiKeysArgs::parse_map`,
//! mirroring `eosin_common::rbac`'s module-level Keycloak config turned into
//! an explicit struct field instead) and never touches Redis; executor
//! tokens live in Redis under `executor:token:{cluster_id}` so any replica
//! can validate any cluster's executor.

use std::collections::HashMap;

use chrono::Utc;
use deadpool_redis::Pool;
use kubently_common::channels;
use kubently_common::error::FabricError;
use kubently_common::types::{AuditEvent, ClusterId, ServiceIdentity};
use rand::Rng;
use redis::AsyncCommands;
use subtle::ConstantTimeEq;

#[derive(Clone)]
pub struct CredentialStore {
    redis: Pool,
    api_keys: HashMap<String, ServiceIdentity>,
}

impl CredentialStore {
    pub fn new(redis: Pool, api_keys: HashMap<String, ServiceIdentity>) -> Self {
        Self { redis, api_keys }
    }

    /// Constant-time lookup against the configured key set (§8 invariant 4):
    /// every candidate is compared, none short-circuits on the first
    /// mismatch.
    pub async fn verify_api_key(&self, key: &str) -> Result<ServiceIdentity, FabricError> {
        let key_bytes = key.as_bytes();
        let mut found: Option<&ServiceIdentity> = None;
        for (candidate, identity) in &self.api_keys {
            let matches: bool = candidate.as_bytes().ct_eq(key_bytes).into();
            if matches {
                found = Some(identity);
            }
        }
        match found {
            Some(identity) => {
                self.audit(identity, "verify_api_key", None, "success").await;
                Ok(identity.clone())
            }
            None => {
                self.audit(&ServiceIdentity("unknown".into()), "verify_api_key", None, "failure")
                    .await;
                Err(FabricError::Unauthenticated)
            }
        }
    }

    /// Whether a cluster has a minted executor token (spec.md §3: "a
    /// cluster is registered iff its executor token exists"). Used by the
    /// dispatcher (§4.4 step 2), which authenticates the API-key caller,
    /// not an executor, so it checks registration rather than a token.
    pub async fn verify_executor_registered(
        &self,
        cluster_id: &ClusterId,
    ) -> Result<bool, FabricError> {
        let mut conn = self.conn().await?;
        let exists: bool = conn
            .exists(channels::executor_token(cluster_id))
            .await
            .map_err(|e| FabricError::Unavailable(e.to_string()))?;
        Ok(exists)
    }

    /// Raw pool access for ancillary writes (e.g. the `cluster:active`
    /// advisory hint) that don't belong to the credential store's own API.
    pub fn pool(&self) -> &Pool {
        &self.redis
    }

    /// Never discloses whether the cluster id or the token was wrong: an
    /// unregistered cluster and a wrong token both return `Unauthenticated`.
    pub async fn verify_executor(
        &self,
        cluster_id: &ClusterId,
        token: &str,
    ) -> Result<(), FabricError> {
        let mut conn = self.conn().await?;
        let key = channels::executor_token(cluster_id);
        let stored: Option<String> = conn
            .get(&key)
            .await
            .map_err(|e| FabricError::Unavailable(e.to_string()))?;

        let ok = match &stored {
            Some(stored) => bool::from(stored.as_bytes().ct_eq(token.as_bytes())),
            None => false,
        };

        let identity = ServiceIdentity(format!("executor:{cluster_id}"));
        if ok {
            self.audit(&identity, "verify_executor", Some(cluster_id), "success")
                .await;
            Ok(())
        } else {
            self.audit(&identity, "verify_executor", Some(cluster_id), "failure")
                .await;
            Err(FabricError::Unauthenticated)
        }
    }

    /// Mints (or accepts) a token, writes it atomically, and deletes any
    /// prior capability record for the cluster — token rotation always
    /// invalidates stale capability data (spec.md §3).
    pub async fn mint_executor_token(
        &self,
        identity: &ServiceIdentity,
        cluster_id: &ClusterId,
        token: Option<String>,
    ) -> Result<String, FabricError> {
        let token = match token {
            Some(t) => {
                if t.len() < 16 || t.len() > 128 || !t.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
                    return Err(FabricError::InvalidArgument(
                        "token must be 16-128 chars of [A-Za-z0-9-_]".into(),
                    ));
                }
                t
            }
            None => generate_token(),
        };

        let mut conn = self.conn().await?;
        let () = redis::pipe()
            .atomic()
            .set(channels::executor_token(cluster_id), &token)
            .del(channels::cluster_capabilities(cluster_id))
            .query_async(&mut conn)
            .await
            .map_err(|e| FabricError::Unavailable(e.to_string()))?;

        self.audit(identity, "mint_executor_token", Some(cluster_id), "success")
            .await;
        Ok(token)
    }

    /// Deletes the token and capability record. Does not forcibly close
    /// live streams — the next command attempt fails authentication when
    /// the executor reconnects (spec.md §4.1).
    pub async fn revoke_executor(
        &self,
        identity: &ServiceIdentity,
        cluster_id: &ClusterId,
    ) -> Result<bool, FabricError> {
        let mut conn = self.conn().await?;
        let existed: i64 = conn
            .exists(channels::executor_token(cluster_id))
            .await
            .map_err(|e| FabricError::Unavailable(e.to_string()))?;
        let () = redis::pipe()
            .atomic()
            .del(channels::executor_token(cluster_id))
            .del(channels::cluster_capabilities(cluster_id))
            .query_async(&mut conn)
            .await
            .map_err(|e| FabricError::Unavailable(e.to_string()))?;
        self.audit(identity, "revoke_executor", Some(cluster_id), "success")
            .await;
        Ok(existed > 0)
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, FabricError> {
        self.redis
            .get()
            .await
            .map_err(|e| FabricError::Unavailable(e.to_string()))
    }

    async fn audit(
        &self,
        identity: &ServiceIdentity,
        action: &str,
        cluster_id: Option<&ClusterId>,
        outcome: &str,
    ) {
        let event = AuditEvent {
            ts: Utc::now().timestamp_millis(),
            identity: identity.0.clone(),
            action: action.to_string(),
            cluster_id: cluster_id.map(|c| c.as_str().to_string()),
            outcome: outcome.to_string(),
        };
        let Ok(mut conn) = self.redis.get().await else {
            tracing::warn!(action, outcome, "failed to get redis connection for audit event");
            return;
        };
        let Ok(json) = serde_json::to_string(&event) else {
            return;
        };
        if let Err(e) = conn.rpush::<_, _, ()>(channels::AUTH_AUDIT, json).await {
            tracing::warn!(%e, action, outcome, "failed to append audit event");
        }
    }
}

/// Recommended 32-128 char, alphanumeric plus `-_` (spec.md §3). Generates
/// 48 URL-safe base62 characters, comfortably within range and high-entropy.
fn generate_token() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..48)
        .map(|_| {
            let idx = rng.random_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_in_range_and_charset() {
        let t = generate_token();
        assert_eq!(t.len(), 48);
        assert!(t.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
