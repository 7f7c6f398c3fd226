//! Explicit in-process request bus: string-addressed consumers with
//! request/reply semantics and a bounded reply wait.
//!
//! The bus is built once at startup, handlers are registered on it, and the
//! routing layer holds it behind an `Arc`. There is no hidden global
//! registry; the address space stays inspectable through
//! [`RequestBus::addresses`].

use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Failure reply carried over the bus: an integer code plus a human-readable
/// message. The code carries no taxonomy and is always `0`; the message is
/// the whole story.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct BusFailure {
    pub code: i32,
    pub message: String,
}

impl BusFailure {
    pub fn new(message: impl Into<String>) -> Self {
        BusFailure {
            code: 0,
            message: message.into(),
        }
    }
}

/// Outcome of one bus request: a JSON reply or a failure.
pub type Reply = Result<Value, BusFailure>;

type BoxReplyFuture = Pin<Box<dyn Future<Output = Reply> + Send>>;
type Consumer = Arc<dyn Fn(Value) -> BoxReplyFuture + Send + Sync>;

struct Delivery {
    body: Value,
    reply_tx: oneshot::Sender<Reply>,
}

const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// In-process request router keyed by address strings such as `get_expense`.
pub struct RequestBus {
    consumers: HashMap<String, mpsc::UnboundedSender<Delivery>>,
    reply_timeout: Duration,
}

impl RequestBus {
    /// Bus with the default 30-second reply timeout.
    pub fn new() -> Self {
        Self::with_reply_timeout(DEFAULT_REPLY_TIMEOUT)
    }

    /// Bus whose requesters give up after `timeout`. An elapsed timeout fails
    /// the requester only; the handler still runs to completion.
    pub fn with_reply_timeout(timeout: Duration) -> Self {
        RequestBus {
            consumers: HashMap::new(),
            reply_timeout: timeout,
        }
    }

    /// Register the consumer for one address, replacing any previous one.
    ///
    /// Deliveries to an address are dequeued one at a time, but each request
    /// runs on its own task, so requests to the same address still race and
    /// complete in no guaranteed order. Must be called inside a tokio
    /// runtime: the consumer loop is spawned here.
    pub fn register<F, Fut>(&mut self, address: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Reply> + Send + 'static,
    {
        let address = address.into();
        let consumer: Consumer = Arc::new(move |body| Box::pin(handler(body)));
        let (tx, mut rx) = mpsc::unbounded_channel::<Delivery>();
        tokio::spawn(async move {
            while let Some(delivery) = rx.recv().await {
                let consumer = consumer.clone();
                tokio::spawn(async move {
                    let reply = consumer(delivery.body).await;
                    // Requester may have timed out and dropped its receiver.
                    let _ = delivery.reply_tx.send(reply);
                });
            }
        });
        if self.consumers.insert(address.clone(), tx).is_some() {
            tracing::warn!(address = %address, "replaced existing bus consumer");
        } else {
            tracing::debug!(address = %address, "bus consumer registered");
        }
    }

    /// Send one request to `address` and wait for its reply.
    pub async fn request(&self, address: &str, body: Value) -> Reply {
        let Some(tx) = self.consumers.get(address) else {
            return Err(BusFailure::new(format!(
                "no handler registered for address {address}"
            )));
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        if tx.send(Delivery { body, reply_tx }).is_err() {
            return Err(BusFailure::new(format!(
                "consumer for address {address} is gone"
            )));
        }
        match tokio::time::timeout(self.reply_timeout, reply_rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(BusFailure::new(format!("no reply from address {address}"))),
            Err(_) => Err(BusFailure::new(format!(
                "request to address {address} timed out after {:?}",
                self.reply_timeout
            ))),
        }
    }

    /// Registered addresses, sorted. Startup code and tests can inspect the
    /// address space instead of probing it with requests.
    pub fn addresses(&self) -> Vec<String> {
        let mut out: Vec<String> = self.consumers.keys().cloned().collect();
        out.sort();
        out
    }

    /// True if `address` currently has a consumer.
    pub fn is_registered(&self, address: &str) -> bool {
        self.consumers.contains_key(address)
    }
}

impl Default for RequestBus {
    fn default() -> Self {
        Self::new()
    }
}
