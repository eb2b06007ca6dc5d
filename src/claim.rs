//! Module with claim strategies for allocating ring buffer slots to producers.
//!
//! A producer claims one or more sequences, writes the payload for each claimed slot in
//! the storage and then publishes the sequences, making them visible to consumers.
//! Claiming blocks (or fails, for the `try_` variants) while the slowest registered claim
//! barrier is a full buffer length behind, which is how consumer progress exerts
//! backpressure on producers.
//!
//! Two strategies are provided:
//! * [`single::SingleProducerClaimStrategy`] for pipelines with exactly one publishing
//!   thread. It avoids all synchronization on the claim path.
//! * [`multi::MultiProducerClaimStrategy`] for any number of concurrent publishing
//!   threads. Claiming is a single atomic fetch-add and producers can publish out of
//!   order without coordinating with each other.

use thiserror::Error;

pub mod multi;
pub mod single;

/// Error indicating that the ring buffer is full.
///
/// Returned by the non-blocking claim variants when the slowest claim barrier is a full
/// buffer length behind. This means the consumers cannot keep up with the ingestion rate;
/// client code can discard data, retry later or treat it as fatal as appropriate.
#[derive(Error, Copy, Clone, Debug, PartialEq, Eq)]
#[error("Ring buffer is full.")]
pub struct RingBufferFull;

/// Error indicating that a timed claim reached its deadline before any slot became free.
#[derive(Error, Copy, Clone, Debug, PartialEq, Eq)]
#[error("Timed out while claiming a ring buffer slot.")]
pub struct ClaimTimedOut;
