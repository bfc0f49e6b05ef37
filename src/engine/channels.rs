//! Two-phase channel startup: bind a handler, then start.
//!
//! `UnboundChannel::bind` is the only way to get a `BoundChannel`, and only
//! a `BoundChannel` can be started, so a channel can never deliver before
//! its handler exists or have its handler swapped after start.
//!
//! Delivery stays gated until the caller opens the returned
//! `StartedChannel`, so no handler runs before `start` has returned.

use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::SdkError;
use crate::venue::EventChannel;

pub type Handler<T> = Arc<dyn Fn(T) + Send + Sync>;

pub struct UnboundChannel<T: Send + 'static> {
    channel: Box<dyn EventChannel<T>>,
}

impl<T: Send + 'static> UnboundChannel<T> {
    pub fn new(channel: Box<dyn EventChannel<T>>) -> Self {
        Self { channel }
    }

    pub fn name(&self) -> &'static str {
        self.channel.name()
    }

    pub fn bind<F>(self, handler: F) -> BoundChannel<T>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        BoundChannel {
            channel: self.channel,
            handler: Arc::new(handler),
        }
    }
}

pub struct BoundChannel<T: Send + 'static> {
    channel: Box<dyn EventChannel<T>>,
    handler: Handler<T>,
}

impl<T: Send + 'static> BoundChannel<T> {
    pub fn name(&self) -> &'static str {
        self.channel.name()
    }

    /// Subscribe and spawn the delivery task.
    ///
    /// Messages queue up until `StartedChannel::open` is called, then are
    /// handled one at a time in arrival order.
    pub async fn start(self) -> Result<StartedChannel, SdkError> {
        let name = self.channel.name();
        let mut inbound = self.channel.subscribe().await?;
        let handler = self.handler;
        let (open_tx, open_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            if open_rx.await.is_err() {
                return;
            }
            let mut delivered: u64 = 0;
            while let Some(message) = inbound.recv().await {
                handler(message);
                delivered += 1;
            }
            debug!(channel = name, delivered, "Channel stream ended");
        });

        info!(channel = name, "Channel started");
        Ok(StartedChannel {
            name,
            task,
            gate: Some(open_tx),
        })
    }
}

/// A running subscription. Dropping it stops delivery.
#[derive(Debug)]
pub struct StartedChannel {
    name: &'static str,
    task: JoinHandle<()>,
    gate: Option<oneshot::Sender<()>>,
}

impl StartedChannel {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Let queued and future messages reach the handler. Idempotent.
    pub fn open(&mut self) {
        if let Some(gate) = self.gate.take() {
            debug!(channel = self.name, "Channel delivery opened");
            let _ = gate.send(());
        }
    }

    pub fn is_open(&self) -> bool {
        self.gate.is_none()
    }

    /// True once the venue side has closed the stream.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for StartedChannel {
    fn drop(&mut self) {
        self.task.abort();
    }
}
