//! Command Bus (C2) — spec.md §4.2.
//!
//! `publish`/`subscribe` are a thin wrapper over Redis pub/sub;
//! `deliver_result`/`await_result` compose the generic
//! `kubently_common::wait_registry::DirectWaitRegistry` with the
//! `command:result:{id}` result slot so a blocked dispatcher wakes the
//! instant a result lands, and never misses one that arrived between its
//! `GET` and its `SUBSCRIBE` (§8 invariant 2).

use std::time::Duration;

use deadpool_redis::Pool;
use kubently_common::channels;
use kubently_common::types::{ClusterId, CommandPayload, CommandResult};
use kubently_common::wait_registry::DirectWaitRegistry;
use redis::{AsyncCommands, aio::PubSub};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

const RESULT_TTL_SECONDS: i64 = 60;

#[derive(Clone)]
pub struct CommandBus {
    redis: Pool,
    redis_url: String,
    waiters: DirectWaitRegistry,
}

/// A live subscription to one cluster's command channel. Dropping it closes
/// the underlying Redis connection, which Redis itself treats as an
/// unsubscribe — the scoped-acquisition guarantee of spec.md §5 falls out
/// of ordinary RAII rather than an explicit release call.
pub struct ClusterSubscription {
    pubsub: PubSub,
}

impl ClusterSubscription {
    /// Blocks until the next command payload arrives or `cancel` fires.
    /// Returns `None` on cancellation or if the connection is lost.
    pub async fn next(&mut self, cancel: &CancellationToken) -> Option<CommandPayload> {
        let mut stream = self.pubsub.on_message();
        tokio::select! {
            _ = cancel.cancelled() => None,
            msg = stream.next() => {
                let msg = msg?;
                let payload: String = msg.get_payload().ok()?;
                serde_json::from_str(&payload).ok()
            }
        }
    }
}

impl CommandBus {
    pub fn new(redis: Pool, redis_url: String, cancel: CancellationToken) -> Self {
        Self {
            waiters: DirectWaitRegistry::new(redis_url.clone(), redis.clone(), cancel),
            redis,
            redis_url,
        }
    }

    pub async fn publish(
        &self,
        cluster_id: &ClusterId,
        payload: &CommandPayload,
    ) -> anyhow::Result<()> {
        let mut conn = self.redis.get().await?;
        let json = serde_json::to_string(payload)?;
        let _: i64 = conn
            .publish(channels::executor_commands(cluster_id), json)
            .await?;
        Ok(())
    }

    pub async fn subscribe(&self, cluster_id: &ClusterId) -> anyhow::Result<ClusterSubscription> {
        let client = redis::Client::open(self.redis_url.clone())?;
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(channels::executor_commands(cluster_id)).await?;
        Ok(ClusterSubscription { pubsub })
    }

    /// Advisory count of active subscribers, used only for the optional
    /// `ClusterOffline` fast-path (spec.md §4.4) — never a correctness
    /// requirement.
    pub async fn subscriber_count(&self, cluster_id: &ClusterId) -> anyhow::Result<u64> {
        let mut conn = self.redis.get().await?;
        let channel = channels::executor_commands(cluster_id);
        let reply: redis::Value = redis::cmd("PUBSUB")
            .arg("NUMSUB")
            .arg(&channel)
            .query_async(&mut conn)
            .await?;
        if let redis::Value::Array(items) = reply
            && let Some(redis::Value::Int(n)) = items.get(1)
        {
            return Ok(*n as u64);
        }
        Ok(0)
    }

    /// Stores the result slot with `SET ... NX` so a command id is
    /// single-use at ingestion (§8's "second is 404" law): returns `false`
    /// without publishing if a result for this `command_id` already
    /// exists.
    pub async fn deliver_result(
        &self,
        command_id: &str,
        result: &CommandResult,
    ) -> anyhow::Result<bool> {
        let mut conn = self.redis.get().await?;
        let json = serde_json::to_vec(result)?;
        let set: Option<String> = redis::cmd("SET")
            .arg(channels::command_result(command_id))
            .arg(json)
            .arg("EX")
            .arg(RESULT_TTL_SECONDS)
            .arg("NX")
            .query_async(&mut conn)
            .await?;
        if set.is_none() {
            return Ok(false);
        }
        let _: i64 = conn
            .publish(channels::command_result_channel(command_id), "1")
            .await?;
        Ok(true)
    }

    /// Blocks up to `timeout`; re-checks the stored result key both before
    /// subscribing and after the subscription is live, so a result that
    /// lands in the gap is never missed. Returns `None` on timeout.
    ///
    /// Always unregisters its waiter subscription before returning,
    /// regardless of outcome: `wait_for_message` only cleans itself up
    /// once a message arrives, so a command that never gets a result (an
    /// offline cluster, a crashed executor) would otherwise park its
    /// background task and Redis connection forever — spec.md §5 requires
    /// releasing the result-wait when the deadline fires either way.
    pub async fn await_result(
        &self,
        command_id: &str,
        timeout: Duration,
    ) -> anyhow::Result<Option<CommandResult>> {
        let key = channels::command_result(command_id);
        let channel = channels::command_result_channel(command_id);

        let result = self.await_result_inner(&key, channel.clone(), timeout).await;
        self.waiters.unregister(&channel).await;
        result
    }

    async fn await_result_inner(
        &self,
        key: &str,
        channel: String,
        timeout: Duration,
    ) -> anyhow::Result<Option<CommandResult>> {
        let subscription = self.waiters.register_waiter(channel).await?;
        if let Some(bytes) = self.waiters.get_value(key).await? {
            return Ok(serde_json::from_slice(&bytes).ok());
        }

        let mut receiver = subscription.receiver;
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            match tokio::time::timeout(remaining, receiver.recv()).await {
                Err(_) => return Ok(None),
                Ok(Err(_)) => return Ok(None),
                Ok(Ok(_signal)) => {
                    if let Some(bytes) = self.waiters.get_value(key).await? {
                        return Ok(serde_json::from_slice(&bytes).ok());
                    }
                    // Woken without a stored value yet (unlikely race
                    // between PUBLISH and SET); keep waiting for the
                    // deadline rather than returning a false timeout.
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_ttl_matches_spec() {
        assert_eq!(RESULT_TTL_SECONDS, 60);
    }
}
