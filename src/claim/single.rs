//! Module with the claim strategy for a single publishing thread.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::barrier::{SequenceBarrier, SequenceBarrierGroup};
use crate::claim::{ClaimTimedOut, RingBufferFull};
use crate::range::SequenceRange;
use crate::sequence::difference;
use crate::wait_strategies::WaitStrategy;
use crate::Sequence;

/// Claim strategy for pipelines where only a single thread publishes into the ring buffer.
///
/// Avoids the overhead of synchronizing multiple claiming threads: the next sequence to
/// claim lives in a plain field owned by the producer, which the `&mut self` receivers on
/// the claim operations enforce.
///
/// The producer claims slots, writes to them in the storage and publishes the last written
/// sequence. Consumers learn about producer progress through the strategy's *read barrier*
/// (see [`read_barrier`](Self::read_barrier)) and report their own progress by publishing
/// to a barrier registered here as a *claim barrier*. The producer never claims more than
/// a buffer length ahead of the slowest claim barrier.
pub struct SingleProducerClaimStrategy<W> {
	buffer_size:          usize,
	/// The next sequence to be claimed (may not yet be claimable).
	next_to_claim:        Sequence,
	/// Cache of the last sequence known to be claimable. Consumers advance rarely compared
	/// to the producer's claim rate, so this skips the contended loads on the fast path.
	last_known_claimable: Sequence,
	claim_barrier:        SequenceBarrierGroup<W>,
	read_barrier:         Arc<SequenceBarrier<W>>,
}

impl<W: WaitStrategy> SingleProducerClaimStrategy<W> {
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
	/// (see [`SequenceBarrier::with_initial_sequence`]).
	///
	/// # Panics
	///
	/// If `buffer_size` is not a power of 2.
	pub fn with_initial_sequence(buffer_size: usize, wait_strategy: Arc<W>, first: Sequence) -> Self {
		if !buffer_size.is_power_of_two() { panic!("Size must be power of 2.") }

		let previous = first.wrapping_sub(1);
		Self {
			buffer_size,
			next_to_claim:        first,
			last_known_claimable: previous.wrapping_add(buffer_size as Sequence),
			claim_barrier:        SequenceBarrierGroup::new(Arc::clone(&wait_strategy)),
			read_barrier:         Arc::new(SequenceBarrier::with_initial_sequence(wait_strategy, previous)),
		}
	}

	/// Number of slots in the coordinated ring buffer.
	pub fn buffer_size(&self) -> usize {
		self.buffer_size
	}

	/// The barrier this strategy publishes producer progress to.
	///
	/// Consumers wait on it (directly or via the forwarding methods on this strategy) to
	/// learn the highest readable sequence.
	pub fn read_barrier(&self) -> Arc<SequenceBarrier<W>> {
		Arc::clone(&self.read_barrier)
	}

	/// Registers a downstream barrier that gates claiming.
	///
	/// Setup-only: must be called before the producer starts claiming.
	///
	/// # Panics
	///
	/// If `barrier` was not created with this pipeline's wait strategy instance.
	pub fn add_claim_barrier(&mut self, barrier: Arc<SequenceBarrier<W>>) {
		self.claim_barrier.add(barrier);
		self.refresh_claimable_from_barriers();
	}

	/// Registers all barriers of `group` as claim barriers.
	///
	/// Setup-only, as [`add_claim_barrier`](Self::add_claim_barrier).
	pub fn add_claim_barrier_group(&mut self, group: &SequenceBarrierGroup<W>) {
		self.claim_barrier.add_group(group);
		self.refresh_claimable_from_barriers();
	}

	fn refresh_claimable_from_barriers(&mut self) {
		self.last_known_claimable = self
			.claim_barrier
			.last_published()
			.wrapping_add(self.buffer_size as Sequence);
	}

	/// Claims a single slot, blocking until one is free.
	///
	/// The caller may write to the returned slot in the storage and must then make it
	/// visible to readers with [`publish`](Self::publish).
	pub fn claim_one(&mut self) -> Sequence {
		self.claim(1).first()
	}

	/// Claims up to `count` slots, blocking until at least one is free.
	///
	/// The returned range may contain fewer slots than requested but never none. Once
	/// written, the slots are made visible by publishing the last sequence of the range.
	pub fn claim(&mut self, count: usize) -> SequenceRange {
		if let Ok(range) = self.try_claim(count) {
			return range;
		}

		let claimable = self
			.claim_barrier
			.wait_until_published(self.next_to_claim.wrapping_sub(self.buffer_size as Sequence))
			.wrapping_add(self.buffer_size as Sequence);
		let diff = difference(claimable, self.next_to_claim);
		debug_assert!(diff >= 0);

		let count = count.min(diff as usize + 1);
		let range = SequenceRange::new(self.next_to_claim, count);
		self.next_to_claim        = self.next_to_claim.wrapping_add(count as Sequence);
		self.last_known_claimable = claimable;
		range
	}

	/// Attempts to claim up to `count` slots without blocking.
	///
	/// Returns a non-empty range of at most `count` slots, or [`RingBufferFull`] if no
	/// slot is currently free.
	pub fn try_claim(&mut self, count: usize) -> Result<SequenceRange, RingBufferFull> {
		let mut diff = difference(self.last_known_claimable, self.next_to_claim);
		if diff < 0 {
			let claimable = self
				.claim_barrier
				.last_published()
				.wrapping_add(self.buffer_size as Sequence);
			diff = difference(claimable, self.next_to_claim);
			if diff < 0 {
				return Err(RingBufferFull);
			}

			// Only update the cache when something will actually be claimed. A stale value
			// already says to check the barriers again next time.
			self.last_known_claimable = claimable;
		}

		let count = count.min(diff as usize + 1);
		let range = SequenceRange::new(self.next_to_claim, count);
		self.next_to_claim = self.next_to_claim.wrapping_add(count as Sequence);
		Ok(range)
	}

	/// Attempts to claim up to `count` slots, waiting up to `timeout` for one to free up.
	pub fn try_claim_for(&mut self, count: usize, timeout: Duration) -> Result<SequenceRange, ClaimTimedOut> {
		match self.try_claim(count) {
			Ok(range)           => Ok(range),
			Err(RingBufferFull) => self.claim_with_deadline(count, Instant::now() + timeout),
		}
	}

	/// Attempts to claim up to `count` slots, waiting until `deadline` for one to free up.
	pub fn try_claim_until(&mut self, count: usize, deadline: Instant) -> Result<SequenceRange, ClaimTimedOut> {
		match self.try_claim(count) {
			Ok(range)           => Ok(range),
			Err(RingBufferFull) => self.claim_with_deadline(count, deadline),
		}
	}

	fn claim_with_deadline(&mut self, count: usize, deadline: Instant) -> Result<SequenceRange, ClaimTimedOut> {
		let claimable = self
			.claim_barrier
			.wait_until_published_until(
				self.next_to_claim.wrapping_sub(self.buffer_size as Sequence),
				deadline,
			)
			.wrapping_add(self.buffer_size as Sequence);
		let diff = difference(claimable, self.next_to_claim);
		if diff < 0 {
			return Err(ClaimTimedOut);
		}

		let count = count.min(diff as usize + 1);
		let range = SequenceRange::new(self.next_to_claim, count);
		self.next_to_claim        = self.next_to_claim.wrapping_add(count as Sequence);
		self.last_known_claimable = claimable;
		Ok(range)
	}

	/// Publishes `sequence`, flagging that all claimed sequences up to and including it
	/// have been written and are now readable.
	///
	/// By the single-producer discipline, `sequence` is the last sequence of the claimed,
	/// not yet published run.
	pub fn publish(&mut self, sequence: Sequence) {
		self.read_barrier.publish(sequence);
	}

	/// The last sequence published to readers.
	pub fn last_published(&self) -> Sequence {
		self.read_barrier.last_published()
	}

	/// Blocks until the producer has published `sequence`.
	///
	/// Returns the last published sequence, which may be after the requested one.
	pub fn wait_until_published(&self, sequence: Sequence) -> Sequence {
		self.read_barrier.wait_until_published(sequence)
	}

	/// As [`wait_until_published`](Self::wait_until_published) but gives up after `timeout`,
	/// returning a sequence preceding the requested one.
	pub fn wait_until_published_for(&self, sequence: Sequence, timeout: Duration) -> Sequence {
		self.read_barrier.wait_until_published_for(sequence, timeout)
	}

	/// As [`wait_until_published`](Self::wait_until_published) but gives up at `deadline`,
	/// returning a sequence preceding the requested one.
	pub fn wait_until_published_until(&self, sequence: Sequence, deadline: Instant) -> Sequence {
		self.read_barrier.wait_until_published_until(sequence, deadline)
	}
}
