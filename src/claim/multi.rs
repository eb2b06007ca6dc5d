//! Module with the claim strategy for concurrent publishing threads.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_utils::CachePadded;

use crate::barrier::{SequenceBarrier, SequenceBarrierGroup};
use crate::claim::{ClaimTimedOut, RingBufferFull};
use crate::range::SequenceRange;
use crate::sequence::{difference, AtomicSequence};
use crate::wait_strategies::WaitStrategy;
use crate::Sequence;

/// Claim strategy for pipelines where multiple threads publish into the ring buffer
/// concurrently.
///
/// A writer claims slots by atomically advancing a counter, waits until the slots are
/// clear of the slowest claim barrier, writes the payload and publishes. Publication
/// stores the sequence number itself into the `published` slot for its buffer index, so a
/// reader scanning contiguous sequences detects "published" by equality alone. Writers
/// therefore never coordinate with each other and can publish out of order: one slow
/// writer does not hold back the publications of faster ones until the buffer fills up.
///
/// Claim and publish operations take `&self`; share the strategy across producer threads
/// with [`Arc`] or borrows. Registering claim barriers is setup-only and takes `&mut self`.
pub struct MultiProducerClaimStrategy<W> {
	buffer_size:    usize,
	index_mask:     Sequence,
	wait_strategy:  Arc<W>,
	claim_barrier:  SequenceBarrierGroup<W>,
	/// `published[i]` holds the last sequence published into slot `i`. Initialized to one
	/// lap before the first sequence that will land in the slot, so that "cell equals its
	/// sequence" is false for every sequence that has not been published yet and the cell
	/// holds `sequence - buffer_size` between claim and publish from startup on.
	published:      Box<[AtomicSequence]>,
	// Hot: every claim of every producer writes this cell. Padded on both sides so it
	// shares no cache line with the fields around it.
	next_claimable: CachePadded<AtomicSequence>,
}

impl<W: WaitStrategy> MultiProducerClaimStrategy<W> {
	/// Creates a new strategy for a ring buffer of `buffer_size` slots, claiming from
	/// sequence `0`.
	///
	/// # Panics
	///
	/// If `buffer_size` is not a power of 2.
	pub fn new(buffer_size: usize, wait_strategy: Arc<W>) -> Self {
		Self::with_initial_sequence(buffer_size, wait_strategy, 0)
	}

	/// Creates a strategy whose first claimed sequence will be `first`.
	///
	/// Claim barriers registered afterwards must have published `first - 1` initially
	/// (see [`SequenceBarrier::with_initial_sequence`]), and consumers start reading with
	/// `last_known` of `first - 1`.
	///
	/// # Panics
	///
	/// If `buffer_size` is not a power of 2.
	pub fn with_initial_sequence(buffer_size: usize, wait_strategy: Arc<W>, first: Sequence) -> Self {
		if !buffer_size.is_power_of_two() { panic!("Size must be power of 2.") }

		let published: Box<[AtomicSequence]> = (0..buffer_size)
			.map(|_i| AtomicSequence::new(0))
			.collect();
		for offset in 0..buffer_size as Sequence {
			let sequence = first.wrapping_add(offset);
			let index    = (sequence & (buffer_size - 1) as Sequence) as usize;
			published[index].store(sequence.wrapping_sub(buffer_size as Sequence), Ordering::Relaxed);
		}

		Self {
			buffer_size,
			index_mask:     (buffer_size - 1) as Sequence,
			claim_barrier:  SequenceBarrierGroup::new(Arc::clone(&wait_strategy)),
			wait_strategy,
			published,
			next_claimable: CachePadded::new(AtomicSequence::new(first)),
		}
	}

	/// Number of slots in the coordinated ring buffer.
	pub fn buffer_size(&self) -> usize {
		self.buffer_size
	}

	/// Registers a downstream barrier that gates claiming: claimed sequences never advance
	/// more than a buffer length ahead of any registered barrier.
	///
	/// Setup-only: must be called before the strategy is shared across threads, which the
	/// `&mut self` receiver enforces.
	///
	/// # Panics
	///
	/// If `barrier` was not created with this pipeline's wait strategy instance.
	pub fn add_claim_barrier(&mut self, barrier: Arc<SequenceBarrier<W>>) {
		self.claim_barrier.add(barrier);
	}

	/// Registers all barriers of `group` as claim barriers.
	///
	/// Setup-only, as [`add_claim_barrier`](Self::add_claim_barrier).
	pub fn add_claim_barrier_group(&mut self, group: &SequenceBarrierGroup<W>) {
		self.claim_barrier.add_group(group);
	}

	/// Claims a single slot, blocking until it is clear of all claim barriers.
	///
	/// The caller may write to the returned slot in the storage and must then make it
	/// visible to readers with [`publish`](Self::publish).
	pub fn claim_one(&self) -> Sequence {
		let sequence = self.next_claimable.fetch_add(1, Ordering::Relaxed);
		self.claim_barrier
			.wait_until_published(sequence.wrapping_sub(self.buffer_size as Sequence));
		sequence
	}

	/// Claims up to `count` consecutive slots (at most a full buffer), blocking until they
	/// are clear of all claim barriers.
	///
	/// Once written, make the slots visible with [`publish_range`](Self::publish_range).
	pub fn claim(&self, count: usize) -> SequenceRange {
		let count    = count.min(self.buffer_size);
		let sequence = self.next_claimable.fetch_add(count as Sequence, Ordering::Relaxed);
		let range    = SequenceRange::new(sequence, count);
		self.claim_barrier
			.wait_until_published(range.last().wrapping_sub(self.buffer_size as Sequence));
		range
	}

	/// Attempts to claim up to `count` slots without blocking.
	///
	/// Returns a non-empty range of at most `count` slots, or [`RingBufferFull`] if no
	/// slot is currently free.
	pub fn try_claim(&self, count: usize) -> Result<SequenceRange, RingBufferFull> {
		// The acquire load of the barriers makes all slots up to `claimable` safe to hand
		// out; the CAS below only has to order the counter itself.
		let claimable    = self.claim_barrier.last_published().wrapping_add(self.buffer_size as Sequence);
		let mut sequence = self.next_claimable.load(Ordering::Relaxed);
		let mut claimed;
		loop {
			let diff = difference(claimable, sequence);
			if diff < 0 {
				return Err(RingBufferFull);
			}
			claimed = count.min(diff as usize + 1);

			match self.next_claimable.compare_exchange_weak(
				sequence,
				sequence.wrapping_add(claimed as Sequence),
				Ordering::Relaxed,
				Ordering::Relaxed,
			) {
				Ok(_)        => break,
				Err(current) => sequence = current,
			}
		}
		Ok(SequenceRange::new(sequence, claimed))
	}

	/// Attempts to claim up to `count` slots, waiting up to `timeout` for room.
	pub fn try_claim_for(&self, count: usize, timeout: Duration) -> Result<SequenceRange, ClaimTimedOut> {
		self.try_claim_until(count, Instant::now() + timeout)
	}

	/// Attempts to claim up to `count` slots, waiting until `deadline` for room.
	///
	/// The claimable bound is only refreshed (with a timed wait on the claim barriers)
	/// when the claim counter has moved past it, so the operation can overshoot the
	/// deadline by one wait-strategy quantum.
	pub fn try_claim_until(&self, count: usize, deadline: Instant) -> Result<SequenceRange, ClaimTimedOut> {
		let mut claimable = self.claim_barrier.last_published().wrapping_add(self.buffer_size as Sequence);
		let mut sequence  = self.next_claimable.load(Ordering::Relaxed);
		let mut claimed;
		loop {
			let mut diff = difference(claimable, sequence);
			if diff < 0 {
				claimable = self
					.claim_barrier
					.wait_until_published_until(
						sequence.wrapping_sub(self.buffer_size as Sequence),
						deadline,
					)
					.wrapping_add(self.buffer_size as Sequence);
				diff = difference(claimable, sequence);
				if diff < 0 {
					return Err(ClaimTimedOut);
				}
			}
			claimed = count.min(diff as usize + 1);

			match self.next_claimable.compare_exchange_weak(
				sequence,
				sequence.wrapping_add(claimed as Sequence),
				Ordering::Relaxed,
				Ordering::Relaxed,
			) {
				Ok(_)        => break,
				Err(current) => sequence = current,
			}
		}
		Ok(SequenceRange::new(sequence, claimed))
	}

	/// Publishes the slot at `sequence`, making it readable once all preceding sequences
	/// are also published.
	///
	/// Must be called exactly once for a claimed sequence, after the payload write.
	pub fn publish(&self, sequence: Sequence) {
		self.set_published(sequence);
		self.wait_strategy.signal_all_when_blocking();
	}

	/// Publishes every slot of `range` with a single wake-up of blocked waiters.
	pub fn publish_range(&self, range: SequenceRange) {
		for sequence in range {
			self.set_published(sequence);
		}
		self.wait_strategy.signal_all_when_blocking();
	}

	fn set_published(&self, sequence: Sequence) {
		let cell = &self.published[(sequence & self.index_mask) as usize];
		debug_assert_eq!(
			cell.load(Ordering::Relaxed),
			sequence.wrapping_sub(self.buffer_size as Sequence),
			"Slot must be claimed and unpublished."
		);
		cell.store(sequence, Ordering::Release);
	}

	fn is_published(&self, sequence: Sequence) -> bool {
		self.published[(sequence & self.index_mask) as usize].load(Ordering::Acquire) == sequence
	}

	/// Gets the highest sequence published after `last_known`, which the caller has
	/// already observed as published (initially `first - 1`, i.e. [`NONE`] when claiming
	/// from zero).
	///
	/// Returns `last_known` itself if no further contiguous sequence is published.
	///
	/// [`NONE`]: crate::sequence::NONE
	pub fn last_published_after(&self, last_known: Sequence) -> Sequence {
		let mut last_known = last_known;
		let mut sequence   = last_known.wrapping_add(1);
		while self.is_published(sequence) {
			last_known = sequence;
			sequence   = sequence.wrapping_add(1);
		}
		last_known
	}

	/// Blocks until `sequence` has been published.
	///
	/// `last_known` is the sequence the caller has already observed as published and must
	/// precede `sequence`. Returns the highest contiguously published sequence, which is
	/// equal to or after the requested one.
	pub fn wait_until_published(&self, sequence: Sequence, last_known: Sequence) -> Sequence {
		debug_assert!(difference(sequence, last_known) > 0);

		let mut seq = last_known.wrapping_add(1);
		while difference(seq, sequence) <= 0 {
			if !self.is_published(seq) {
				let cell = [&self.published[(seq & self.index_mask) as usize]];
				self.wait_strategy.wait_until_published(seq, &cell);
			}
			seq = seq.wrapping_add(1);
		}
		self.last_published_after(sequence)
	}

	/// As [`wait_until_published`](Self::wait_until_published) but gives up after `timeout`.
	///
	/// On timeout the returned sequence precedes the requested one.
	pub fn wait_until_published_for(&self, sequence: Sequence, last_known: Sequence, timeout: Duration) -> Sequence {
		self.wait_until_published_until(sequence, last_known, Instant::now() + timeout)
	}

	/// As [`wait_until_published`](Self::wait_until_published) but gives up at `deadline`.
	///
	/// On timeout the returned sequence precedes the requested one.
	pub fn wait_until_published_until(&self, sequence: Sequence, last_known: Sequence, deadline: Instant) -> Sequence {
		debug_assert!(difference(sequence, last_known) > 0);

		let mut seq = last_known.wrapping_add(1);
		while difference(seq, sequence) <= 0 {
			if !self.is_published(seq) {
				let cell   = [&self.published[(seq & self.index_mask) as usize]];
				let result = self.wait_strategy.wait_until_published_until(seq, &cell, deadline);
				if difference(result, seq) < 0 {
					// Timed out: `seq` is the first sequence not published in time.
					return seq.wrapping_sub(1);
				}
			}
			seq = seq.wrapping_add(1);
		}
		self.last_published_after(sequence)
	}
}
