//! In-process result-waiter multiplexer, backed by Redis pub/sub.
//!
//! Mirrors `eosin_common::wait_registry`'s `DirectWaitRegistry`: many local
//! callers can await the same subject without opening a Redis `SUBSCRIBE`
//! connection each — the first caller for a subject opens the real
//! subscription and fans it out to later callers over a local broadcast
//! channel. Here the subject is `command:result-channel:{command_id}`
//! (spec.md §4.2) rather than a NATS subject, and the registry is also the
//! home of the "already delivered" pre-check so a result that lands between
//! a caller's Redis `GET` and its `SUBSCRIBE` is never missed.

use anyhow::{Context, Result};
use bytes::Bytes;
use redis::AsyncCommands;
use std::{collections::HashMap, ops::Deref, sync::Arc};
use tokio::sync::{Mutex, broadcast};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

struct DirectWaitSubscription {
    sender: broadcast::Sender<BroadcastResult>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

pub struct DirectWaitRegistryInner {
    cancel: CancellationToken,
    redis_url: String,
    redis: deadpool_redis::Pool,
    inner: Mutex<HashMap<String, DirectWaitSubscription>>,
}

#[derive(Clone)]
pub struct DirectWaitRegistry {
    inner: Arc<DirectWaitRegistryInner>,
}

impl Deref for DirectWaitRegistry {
    type Target = DirectWaitRegistryInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

pub struct WaitSubscription {
    pub receiver: broadcast::Receiver<BroadcastResult>,
}

#[derive(Clone)]
pub struct BroadcastResult(Result<Bytes, String>);

impl Deref for BroadcastResult {
    type Target = Result<Bytes, String>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl BroadcastResult {
    pub fn from_err(e: String) -> Self {
        BroadcastResult(Err(e))
    }

    pub fn from_value(res: Bytes) -> Self {
        BroadcastResult(Ok(res))
    }

    pub fn inner(self) -> Result<Bytes> {
        self.0.map_err(|e| anyhow::anyhow!(e))
    }
}

/// Forwards at most one message, then returns — each subject here is
/// `command:result-channel:{command_id}`, published to exactly once, so
/// there is nothing further to wait for. Returning lets the spawned
/// task's caller (`register_waiter`) remove this subject's entry from
/// `inner` once the task exits, matching `eosin_common::wait_registry`'s
/// `wait_for_reply`; looping past the first message would park this task,
/// its dedicated Redis connection, and its `HashMap` entry forever.
async fn wait_for_message(
    cancel: CancellationToken,
    mut pubsub: redis::aio::PubSub,
    tx: broadcast::Sender<BroadcastResult>,
) {
    let mut stream = pubsub.on_message();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            msg = stream.next() => match msg {
                None => {
                    let _ = tx.send(BroadcastResult::from_err(
                        "redis pub/sub connection closed".to_string(),
                    ));
                    return;
                }
                Some(msg) => {
                    let payload: Vec<u8> = match msg.get_payload() {
                        Ok(p) => p,
                        Err(e) => {
                            let _ = tx.send(BroadcastResult::from_err(e.to_string()));
                            continue;
                        }
                    };
                    let _ = tx.send(BroadcastResult::from_value(Bytes::from(payload)));
                    return;
                }
            }
        }
    }
}

impl DirectWaitRegistry {
    pub fn new(redis_url: String, redis: deadpool_redis::Pool, cancel: CancellationToken) -> Self {
        Self {
            inner: Arc::new(DirectWaitRegistryInner {
                cancel,
                redis_url,
                redis,
                inner: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Tears down the background subscription for `subject`, if one is
    /// still running. Callers that stop waiting on their own account (a
    /// dispatcher deadline firing with no message ever published, e.g. an
    /// offline cluster) must call this explicitly — `wait_for_message`
    /// only cleans itself up once a message actually arrives, and a
    /// subject nothing ever publishes to would otherwise park its task and
    /// Redis connection for the rest of the process's life. A no-op if the
    /// subject already removed itself (the message-arrived path).
    pub async fn unregister(&self, subject: &str) {
        let mut map = self.inner.inner.lock().await;
        if let Some(mut sub) = map.remove(subject)
            && let Some(handle) = sub.handle.take()
        {
            handle.abort();
        }
    }

    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let mut lock = self.inner.inner.lock().await;
        for (_subject, sub) in lock.iter_mut() {
            if let Some(handle) = sub.handle.take() {
                handle.abort();
                let _ = handle.await;
            }
        }
        lock.clear();
    }

    /// Whether `key` already holds a value (used to pre-check a result slot
    /// before subscribing, and to re-check after waking — the lost-wakeup
    /// guard required by spec.md §4.2).
    pub async fn key_exists(&self, key: &str) -> Result<bool> {
        let mut conn = self
            .redis
            .get()
            .await
            .context("failed to get redis connection")?;
        let exists: bool = conn
            .exists(key)
            .await
            .context("failed to check result key")?;
        Ok(exists)
    }

    pub async fn get_value(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self
            .redis
            .get()
            .await
            .context("failed to get redis connection")?;
        let value: Option<Vec<u8>> = conn.get(key).await.context("failed to read result key")?;
        Ok(value)
    }

    /// Registers a waiter on `subject` (a Redis pub/sub channel name). If
    /// another local waiter already subscribed to the same subject, this
    /// call joins the existing broadcast fan-out instead of opening a
    /// second Redis connection.
    pub async fn register_waiter(&self, subject: String) -> Result<WaitSubscription> {
        let mut map = self.inner.inner.lock().await;
        if let Some(sub) = map.get(&subject) {
            return Ok(WaitSubscription {
                receiver: sub.sender.subscribe(),
            });
        }

        let client = redis::Client::open(self.redis_url.clone())
            .context("failed to build redis client for pub/sub")?;
        let mut pubsub = client
            .get_async_pubsub()
            .await
            .context("failed to open redis pub/sub connection")?;
        pubsub
            .subscribe(&subject)
            .await
            .context("failed to subscribe to result channel")?;

        let (tx, rx) = broadcast::channel(16);
        let cancel = self.cancel.child_token();
        let tx_clone = tx.clone();
        let inner_clone = self.inner.clone();
        let subject_clone = subject.clone();
        let handle = tokio::spawn(async move {
            wait_for_message(cancel, pubsub, tx_clone).await;
            inner_clone.inner.lock().await.remove(&subject_clone);
        });

        map.insert(
            subject,
            DirectWaitSubscription {
                sender: tx,
                handle: Some(handle),
            },
        );
        Ok(WaitSubscription { receiver: rx })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_result_roundtrips_value() {
        let r = BroadcastResult::from_value(Bytes::from_static(b"hello"));
        assert_eq!(r.inner().unwrap(), Bytes::from_static(b"hello"));
    }

    #[test]
    fn broadcast_result_roundtrips_err() {
        let r = BroadcastResult::from_err("boom".to_string());
        assert!(r.inner().is_err());
    }
}
