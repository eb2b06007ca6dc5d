//! Low latency coordination of producers and consumers over a sequenced ring buffer.
//!
//! Use it as the synchronization substrate of pipelines that move small, fixed-layout
//! records between threads at very high rates: all coordination happens through 64-bit
//! sequence numbers addressing the slots of a power-of-two [`RingBuffer`], with no
//! per-item allocation and no locks on the fast path.
//!
//! # General Usage
//!
//! Using the crate divides into three stages:
//! 1. **Setup:** Pick a wait strategy, create a claim strategy and storage, and register
//!    the consumers' progress barriers as claim barriers.
//! 2. **Publish:** Producers claim sequences, write the payload for each claimed slot and
//!    publish.
//! 3. **Consume:** Consumers wait for published sequences, read the slots and publish
//!    their own progress so that producers may reuse them.
//!
//! Producers and consumers never hand payload to each other; they only exchange sequence
//! numbers through barriers. Payload writes performed between claim and publish
//! happen-before payload reads performed after the corresponding wait returns.
//!
//! A single wait strategy instance - [`SpinWaitStrategy`] for the lowest latency,
//! [`BlockingWaitStrategy`] to trade latency for idle CPUs - is shared by every barrier
//! and claim strategy of one pipeline.
//!
//! Sequence numbers wrap modulo `2^64`. Never compare them with `<`; compare the sign of
//! [`difference`] instead.
//!
//! # Examples
//! ```
//! use seqring::*;
//! use std::sync::Arc;
//! use std::thread;
//!
//! // The data entity stored in the ring buffer.
//! struct Event {
//!     price: f64,
//! }
//!
//! // *** Phase SETUP ***
//!
//! // One wait strategy instance for the entire pipeline.
//! let wait_strategy    = Arc::new(SpinWaitStrategy);
//! let mut claim        = SingleProducerClaimStrategy::new(8, Arc::clone(&wait_strategy));
//! // The consumer publishes its reading progress here; registering it as a claim barrier
//! // stops the producer from claiming a slot that is still being read.
//! let finished_reading = Arc::new(SequenceBarrier::new(Arc::clone(&wait_strategy)));
//! claim.add_claim_barrier(Arc::clone(&finished_reading));
//! let read_barrier     = claim.read_barrier();
//! let buffer           = RingBuffer::new(8, || Event { price: 0.0 });
//!
//! thread::scope(|s| {
//!     // *** Phase CONSUME ***
//!     s.spawn(|| {
//!         let mut next_to_read: Sequence = 0;
//!         let mut read = 0;
//!         while read < 10 {
//!             let available = read_barrier.wait_until_published(next_to_read);
//!             while difference(next_to_read, available) <= 0 {
//!                 // SAFETY: `next_to_read` has been published so shared reads are race free.
//!                 let event = unsafe { &*buffer.get(next_to_read) };
//!                 assert_eq!(event.price, next_to_read as f64);
//!                 next_to_read = next_to_read.wrapping_add(1);
//!                 read += 1;
//!             }
//!             finished_reading.publish(available);
//!         }
//!     });
//!
//!     // *** Phase PUBLISH ***
//!     s.spawn(|| {
//!         for i in 0..10 {
//!             let sequence = claim.claim_one();
//!             // SAFETY: The slot at `sequence` is claimed exclusively by this producer.
//!             unsafe { (*buffer.get(sequence)).price = i as f64 };
//!             claim.publish(sequence);
//!         }
//!     });
//! });
//! ```
//!
//! For publication from many threads, use [`MultiProducerClaimStrategy`]: claiming is a
//! single atomic fetch-add and producers publish out of order without coordinating with
//! each other, while each consumer still observes a contiguous prefix of sequences.

#![deny(rustdoc::broken_intra_doc_links)]
#![warn(missing_docs)]

/// The type for sequence numbers addressing slots in the ring buffer.
///
/// Sequence numbers wrap modulo `2^64`; compare them with [`difference`], never with `<`.
pub type Sequence = u64;

/// The signed difference between two [`Sequence`] values.
pub type SequenceDiff = i64;

mod barrier;
mod claim;
mod range;
mod ringbuffer;
mod sequence;
mod spin_wait;
pub mod wait_strategies;

pub use crate::barrier::{SequenceBarrier, SequenceBarrierGroup};
pub use crate::claim::multi::MultiProducerClaimStrategy;
pub use crate::claim::single::SingleProducerClaimStrategy;
pub use crate::claim::{ClaimTimedOut, RingBufferFull};
pub use crate::range::{SequenceRange, SequenceRangeIter};
pub use crate::ringbuffer::RingBuffer;
pub use crate::sequence::{difference, minimum_sequence, minimum_sequence_after, AtomicSequence, NONE};
pub use crate::spin_wait::SpinWait;
pub use crate::wait_strategies::{BlockingWaitStrategy, SpinWaitStrategy, WaitStrategy};
