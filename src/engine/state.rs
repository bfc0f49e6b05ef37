//! State shared between the control loop and the channel handlers.
//!
//! The only mutable cross-task value is the id of the most recently
//! confirmed order. It sits behind one mutex, and every record emission
//! happens while holding that same mutex, so "update id + print" from the
//! loop and "read id + print" from the trades handler never interleave.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::sink::{Record, RecordSink};
use crate::types::ConfirmedOrder;

pub struct SharedState {
    placed_order_id: Mutex<Option<String>>,
    /// Set once the first order id is stored; lets readers skip the lock
    /// while nothing has been placed.
    has_placed_order: AtomicBool,
    lock_acquisitions: AtomicU64,
    sink: RecordSink,
}

impl SharedState {
    pub fn new(sink: RecordSink) -> Self {
        Self {
            placed_order_id: Mutex::new(None),
            has_placed_order: AtomicBool::new(false),
            lock_acquisitions: AtomicU64::new(0),
            sink,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<String>> {
        self.lock_acquisitions.fetch_add(1, Ordering::Relaxed);
        self.placed_order_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock-free check used for early exits.
    pub fn has_placed_order(&self) -> bool {
        self.has_placed_order.load(Ordering::Acquire)
    }

    /// Store the new order id and print it in one critical section.
    ///
    /// Waits for queue space before taking the lock, so the placement record
    /// is never dropped and the lock is never held across an await.
    pub async fn record_placed_order(&self, confirmed: ConfirmedOrder) {
        let order_id = confirmed.order_id().to_string();
        let queued = self.sink.reserve().await;
        let mut slot = self.lock();
        *slot = Some(order_id.clone());
        self.has_placed_order.store(true, Ordering::Release);
        queued.emit(Record::OrderPlaced {
            order_id,
            order: confirmed,
        });
    }

    /// Emit one record under the lock. Drops it if the queue is full.
    pub fn emit(&self, record: Record) {
        let _guard = self.lock();
        self.sink.emit(record);
    }

    /// Like `emit`, but waits for queue space instead of dropping.
    pub async fn emit_waiting(&self, record: Record) {
        let queued = self.sink.reserve().await;
        let _guard = self.lock();
        queued.emit(record);
    }

    /// Run `f` with the current order id while holding the lock. Whatever
    /// `f` returns is emitted before the lock is released.
    pub fn emit_with_placed_order<F>(&self, f: F)
    where
        F: FnOnce(Option<&str>) -> Option<Record>,
    {
        let slot = self.lock();
        if let Some(record) = f(slot.as_deref()) {
            self.sink.emit(record);
        }
    }

    pub fn placed_order_id(&self) -> Option<String> {
        self.lock().clone()
    }

    /// How many times the lock has been taken. Diagnostic only.
    pub fn lock_acquisitions(&self) -> u64 {
        self.lock_acquisitions.load(Ordering::Relaxed)
    }
}
