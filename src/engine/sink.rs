//! Ordered record sink.
//!
//! Every console-visible status line is a `Record` pushed onto one bounded
//! queue. A single writer thread drains it, so each record lands as one
//! whole line no matter how many tasks emit concurrently. `emit` never
//! blocks: when the queue is full the record is dropped and counted. The
//! control loop instead reserves a slot first and never loses a record.

use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::types::{ActiveOrders, ActiveTrade, ConfirmedOrder, Portfolio, SessionMessage};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Category tag printed in front of each record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    SessionStatus,
    Portfolio,
    Trades,
    Orders,
    OrderPlaced,
    OrderError,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::SessionStatus => write!(f, "SESSION"),
            RecordKind::Portfolio => write!(f, "PORTFOLIO"),
            RecordKind::Trades => write!(f, "TRADES"),
            RecordKind::Orders => write!(f, "ORDERS"),
            RecordKind::OrderPlaced => write!(f, "ORDER_PLACED"),
            RecordKind::OrderError => write!(f, "ORDER_ERROR"),
        }
    }
}

/// One logical output record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Record {
    SessionStatus(SessionMessage),
    Portfolio(Portfolio),
    Trade(ActiveTrade),
    Orders(ActiveOrders),
    OrderPlaced {
        order_id: String,
        order: ConfirmedOrder,
    },
    OrderError {
        market_id: String,
        attempt: u32,
        message: String,
    },
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::SessionStatus(_) => RecordKind::SessionStatus,
            Record::Portfolio(_) => RecordKind::Portfolio,
            Record::Trade(_) => RecordKind::Trades,
            Record::Orders(_) => RecordKind::Orders,
            Record::OrderPlaced { .. } => RecordKind::OrderPlaced,
            Record::OrderError { .. } => RecordKind::OrderError,
        }
    }

    /// `[KIND] {json}` plus a trailing newline.
    pub fn render(&self) -> String {
        let payload = serde_json::to_string(self)
            .unwrap_or_else(|e| format!("{{\"serialize_error\":\"{e}\"}}"));
        format!("[{}] {payload}\n", self.kind())
    }
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// Cloneable handle for emitting records.
#[derive(Debug, Clone)]
pub struct RecordSink {
    tx: mpsc::Sender<Record>,
    dropped: Arc<AtomicU64>,
}

impl RecordSink {
    /// Queue a record without waiting.
    pub fn emit(&self, record: Record) {
        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(record)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(kind = %record.kind(), dropped, "Record queue full, dropping record");
            }
            Err(TrySendError::Closed(record)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(kind = %record.kind(), "Record writer gone, dropping record");
            }
        }
    }

    /// Wait until the queue has room. The returned slot is filled with
    /// `RecordSlot::emit`, which never blocks.
    pub async fn reserve(&self) -> RecordSlot<'_> {
        RecordSlot {
            permit: self.tx.reserve().await.ok(),
            dropped: &self.dropped,
        }
    }

    /// Records dropped so far because the queue was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Queue space held for exactly one record.
pub struct RecordSlot<'a> {
    permit: Option<mpsc::Permit<'a, Record>>,
    dropped: &'a AtomicU64,
}

impl RecordSlot<'_> {
    pub fn emit(self, record: Record) {
        match self.permit {
            Some(permit) => permit.send(record),
            None => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(kind = %record.kind(), "Record writer gone, dropping record");
            }
        }
    }
}

/// Spawn the single writer thread draining into `writer`.
///
/// The thread ends once every `RecordSink` clone is dropped and the queue
/// is empty; the join handle yields the first I/O error, if any.
pub fn spawn_record_writer<W>(capacity: usize, mut writer: W) -> (RecordSink, JoinHandle<std::io::Result<()>>)
where
    W: Write + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<Record>(capacity.max(1));
    let sink = RecordSink {
        tx,
        dropped: Arc::new(AtomicU64::new(0)),
    };

    let handle = tokio::task::spawn_blocking(move || {
        while let Some(record) = rx.blocking_recv() {
            writer.write_all(record.render().as_bytes())?;
            writer.flush()?;
        }
        Ok(())
    });

    (sink, handle)
}

/// Sink whose records go nowhere but the returned receiver. Used by tests
/// that want to inspect records instead of rendered text.
pub fn channel_sink(capacity: usize) -> (RecordSink, mpsc::Receiver<Record>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        RecordSink {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        rx,
    )
}
