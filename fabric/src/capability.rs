//! Capability Registry (C6) — spec.md §4.6.

use chrono::Utc;
use deadpool_redis::Pool;
use kubently_common::channels;
use kubently_common::error::FabricError;
use kubently_common::types::{CAPABILITY_LIST_CAP, CapabilityRecord, ClusterId};
use redis::AsyncCommands;

const CAPABILITY_TTL_SECONDS: i64 = 3600;

#[derive(Clone)]
pub struct CapabilityRegistry {
    redis: Pool,
}

impl CapabilityRegistry {
    pub fn new(redis: Pool) -> Self {
        Self { redis }
    }

    pub async fn put(
        &self,
        cluster_id: &ClusterId,
        mut record: CapabilityRecord,
    ) -> Result<(), FabricError> {
        if record.allowed_verbs.len() > CAPABILITY_LIST_CAP {
            return Err(FabricError::InvalidArgument(format!(
                "allowed_verbs exceeds {CAPABILITY_LIST_CAP} entries"
            )));
        }
        if record.features.len() > CAPABILITY_LIST_CAP {
            return Err(FabricError::InvalidArgument(format!(
                "features exceeds {CAPABILITY_LIST_CAP} entries"
            )));
        }
        record.timestamp = Utc::now().timestamp_millis();

        let mut conn = self.conn().await?;
        let json = serde_json::to_string(&record)
            .map_err(|e| FabricError::InvalidArgument(e.to_string()))?;
        let _: () = conn
            .set_ex(
                channels::cluster_capabilities(cluster_id),
                json,
                CAPABILITY_TTL_SECONDS as u64,
            )
            .await
            .map_err(|e| FabricError::Unavailable(e.to_string()))?;
        Ok(())
    }

    /// Refreshes the TTL without touching the stored payload.
    pub async fn heartbeat(&self, cluster_id: &ClusterId) -> Result<bool, FabricError> {
        let mut conn = self.conn().await?;
        let key = channels::cluster_capabilities(cluster_id);
        let refreshed: bool = conn
            .expire(&key, CAPABILITY_TTL_SECONDS)
            .await
            .map_err(|e| FabricError::Unavailable(e.to_string()))?;
        Ok(refreshed)
    }

    pub async fn get(&self, cluster_id: &ClusterId) -> Result<Option<CapabilityRecord>, FabricError> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn
            .get(channels::cluster_capabilities(cluster_id))
            .await
            .map_err(|e| FabricError::Unavailable(e.to_string()))?;
        match raw {
            Some(raw) => {
                let record = serde_json::from_str(&raw)
                    .map_err(|e| FabricError::Unavailable(format!("corrupt capability record: {e}")))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Verbs permitted for dispatch: the capability record's `allowed_verbs`
    /// if one exists, else the built-in default minimum (spec.md §4.4).
    pub async fn allowed_verbs(&self, cluster_id: &ClusterId) -> Result<Vec<String>, FabricError> {
        match self.get(cluster_id).await? {
            Some(record) => Ok(record.allowed_verbs),
            None => Ok(crate::command::default_allowed_verbs()),
        }
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, FabricError> {
        self.redis
            .get()
            .await
            .map_err(|e| FabricError::Unavailable(e.to_string()))
    }
}
