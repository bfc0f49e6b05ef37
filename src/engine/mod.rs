//! Worker core: startup, the cancel-then-place loop, and channel handling.
//!
//! - `worker`: startup sequence and control loop
//! - `channels`: bind-then-start wrapper around venue subscriptions
//! - `handlers`: callbacks for session and channel events
//! - `state`: the placed-order id shared between loop and handlers
//! - `sink`: ordered, line-atomic record output
//! - `ticker`: per-cycle delay

pub mod channels;
pub mod handlers;
pub mod sink;
pub mod state;
pub mod ticker;
pub mod worker;

pub use sink::{spawn_record_writer, Record, RecordKind, RecordSink};
pub use worker::{CycleReport, RunningWorker, Venue, VenueChannels, Worker};
