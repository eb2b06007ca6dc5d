//! Module with the sequence barrier and barrier groups.
//!
//! A [`SequenceBarrier`] holds the highest sequence its owner has published. Consumers
//! publish their reading progress through a barrier so that producers can avoid claiming
//! slots that are still being read, and producers publish their writing progress so that
//! consumers know which slots are readable.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_utils::CachePadded;
use std::sync::atomic::Ordering;

use crate::sequence::{difference, minimum_sequence, minimum_sequence_after, AtomicSequence, NONE};
use crate::wait_strategies::WaitStrategy;
use crate::Sequence;

/// A single published sequence, written by one owner and read by any number of threads.
///
/// The assumption is that when a sequence number is published, that sequence and all
/// sequences preceding it are available for downstream threads.
///
/// The barrier starts at the sequence immediately preceding zero, i.e. the next sequence
/// to be published is `0`.
pub struct SequenceBarrier<W> {
	wait_strategy:  Arc<W>,
	// Padded on both sides so readers polling this cell never contend with neighbouring data.
	last_published: CachePadded<AtomicSequence>,
}

impl<W: WaitStrategy> SequenceBarrier<W> {
	/// Creates a new barrier that has published nothing yet.
	///
	/// The `wait_strategy` must be the instance shared by the entire pipeline.
	pub fn new(wait_strategy: Arc<W>) -> Self {
		Self::with_initial_sequence(wait_strategy, NONE)
	}

	/// Creates a barrier whose last published sequence is `initial`.
	///
	/// Escape hatch for pipelines that do not start at sequence `0`, e.g. when resuming
	/// from a well-known position. The first sequence published through this barrier must
	/// be `initial + 1`.
	pub fn with_initial_sequence(wait_strategy: Arc<W>, initial: Sequence) -> Self {
		Self {
			wait_strategy,
			last_published: CachePadded::new(AtomicSequence::new(initial)),
		}
	}

	/// Gets the sequence last published to this barrier, with `Acquire` ordering.
	#[inline]
	pub fn last_published(&self) -> Sequence {
		self.last_published.load(Ordering::Acquire)
	}

	/// Publishes `sequence`, making it and all preceding sequences visible to waiters.
	///
	/// Only one thread may publish to a barrier and it must publish non-decreasing
	/// sequences (under the wrap-around ordering). The store has `Release` ordering.
	#[inline]
	pub fn publish(&self, sequence: Sequence) {
		self.last_published.store(sequence, Ordering::Release);
		self.wait_strategy.signal_all_when_blocking();
	}

	/// Blocks until `sequence` has been published.
	///
	/// Returns the last published sequence, guaranteed to be equal to or after the
	/// requested one.
	pub fn wait_until_published(&self, sequence: Sequence) -> Sequence {
		let current = self.last_published();
		if difference(current, sequence) >= 0 {
			return current;
		}
		self.wait_strategy.wait_until_published(sequence, &[self.cell()])
	}

	/// As [`wait_until_published`](Self::wait_until_published) but gives up after `timeout`.
	///
	/// On timeout the returned sequence precedes the requested one.
	pub fn wait_until_published_for(&self, sequence: Sequence, timeout: Duration) -> Sequence {
		let current = self.last_published();
		if difference(current, sequence) >= 0 {
			return current;
		}
		self.wait_strategy.wait_until_published_for(sequence, &[self.cell()], timeout)
	}

	/// As [`wait_until_published`](Self::wait_until_published) but gives up at `deadline`.
	///
	/// On timeout the returned sequence precedes the requested one.
	pub fn wait_until_published_until(&self, sequence: Sequence, deadline: Instant) -> Sequence {
		let current = self.last_published();
		if difference(current, sequence) >= 0 {
			return current;
		}
		self.wait_strategy.wait_until_published_until(sequence, &[self.cell()], deadline)
	}

	#[inline]
	pub(crate) fn cell(&self) -> &AtomicSequence {
		&self.last_published
	}

	pub(crate) fn wait_strategy(&self) -> &Arc<W> {
		&self.wait_strategy
	}
}

/// An ordered collection of [`SequenceBarrier`]s that is waited on as a unit: the group has
/// published a sequence once *all* of its members have.
///
/// Used when a producer (or a downstream consumer) must wait for several prior threads,
/// e.g. a producer gated on the slowest of its consumers.
///
/// Mutation is setup-only: barriers are added before the group is shared across threads,
/// which the `&mut self` receiver enforces.
pub struct SequenceBarrierGroup<W> {
	wait_strategy: Arc<W>,
	barriers:      Vec<Arc<SequenceBarrier<W>>>,
}

impl<W: WaitStrategy> SequenceBarrierGroup<W> {
	/// Creates an empty group.
	///
	/// Barriers must be added before the group is read or waited on.
	pub fn new(wait_strategy: Arc<W>) -> Self {
		Self {
			wait_strategy,
			barriers: vec![],
		}
	}

	/// Adds a barrier to the group.
	///
	/// # Panics
	///
	/// If `barrier` was not created with the same wait strategy instance as this group.
	pub fn add(&mut self, barrier: Arc<SequenceBarrier<W>>) {
		assert!(
			Arc::ptr_eq(barrier.wait_strategy(), &self.wait_strategy),
			"All barriers of a pipeline must share one wait strategy instance."
		);
		self.barriers.push(barrier);
	}

	/// Adds all barriers currently in `group` to this group.
	pub fn add_group(&mut self, group: &SequenceBarrierGroup<W>) {
		assert!(
			Arc::ptr_eq(&group.wait_strategy, &self.wait_strategy),
			"All barriers of a pipeline must share one wait strategy instance."
		);
		self.barriers.extend(group.barriers.iter().map(Arc::clone));
	}

	/// Whether any barriers have been added yet.
	pub fn is_empty(&self) -> bool {
		self.barriers.is_empty()
	}

	/// Gets the sequence of the least-advanced barrier in the group.
	///
	/// # Panics
	///
	/// If the group is empty.
	pub fn last_published(&self) -> Sequence {
		assert!(!self.barriers.is_empty(), "Barrier group must not be empty.");
		minimum_sequence(self.cells())
	}

	/// Blocks until all barriers in the group have published at least `sequence`.
	///
	/// Returns the sequence of the least-advanced member, guaranteed to be equal to or
	/// after the requested one.
	///
	/// # Panics
	///
	/// If the group is empty.
	pub fn wait_until_published(&self, sequence: Sequence) -> Sequence {
		assert!(!self.barriers.is_empty(), "Barrier group must not be empty.");
		let current = minimum_sequence_after(sequence, self.cells());
		if difference(current, sequence) >= 0 {
			return current;
		}
		let cells: Vec<&AtomicSequence> = self.cells().collect();
		self.wait_strategy.wait_until_published(sequence, &cells)
	}

	/// As [`wait_until_published`](Self::wait_until_published) but gives up after `timeout`.
	pub fn wait_until_published_for(&self, sequence: Sequence, timeout: Duration) -> Sequence {
		self.wait_until_published_until(sequence, Instant::now() + timeout)
	}

	/// As [`wait_until_published`](Self::wait_until_published) but gives up at `deadline`.
	pub fn wait_until_published_until(&self, sequence: Sequence, deadline: Instant) -> Sequence {
		assert!(!self.barriers.is_empty(), "Barrier group must not be empty.");
		let current = minimum_sequence_after(sequence, self.cells());
		if difference(current, sequence) >= 0 {
			return current;
		}
		let cells: Vec<&AtomicSequence> = self.cells().collect();
		self.wait_strategy.wait_until_published_until(sequence, &cells, deadline)
	}

	fn cells(&self) -> impl Iterator<Item = &AtomicSequence> {
		self.barriers.iter().map(|barrier| barrier.cell())
	}
}

#[cfg(test)]
mod tests {
	use std::thread;

	use super::*;
	use crate::wait_strategies::{BlockingWaitStrategy, SpinWaitStrategy};

	#[test]
	fn starts_before_sequence_zero() {
		let barrier = SequenceBarrier::new(Arc::new(SpinWaitStrategy));
		assert_eq!(barrier.last_published(), NONE);
		assert!(difference(barrier.last_published(), 0) < 0);
	}

	#[test]
	fn publish_is_observed_by_readers() {
		let barrier = SequenceBarrier::new(Arc::new(SpinWaitStrategy));
		barrier.publish(0);
		barrier.publish(1);
		assert_eq!(barrier.last_published(), 1);
		assert_eq!(barrier.wait_until_published(1), 1);
	}

	#[test]
	fn wait_returns_later_sequence_when_available() {
		let barrier = SequenceBarrier::new(Arc::new(SpinWaitStrategy));
		barrier.publish(10);
		assert_eq!(barrier.wait_until_published(3), 10);
	}

	#[test]
	fn timed_wait_returns_sentinel() {
		let barrier = SequenceBarrier::new(Arc::new(SpinWaitStrategy));
		let result  = barrier.wait_until_published_for(0, Duration::from_millis(2));
		assert!(difference(result, 0) < 0);
	}

	#[test]
	fn wait_across_threads_with_blocking_strategy() {
		let wait_strategy = Arc::new(BlockingWaitStrategy::new());
		let barrier       = Arc::new(SequenceBarrier::new(Arc::clone(&wait_strategy)));
		thread::scope(|s| {
			let publisher = Arc::clone(&barrier);
			s.spawn(move || {
				for sequence in 0..10 {
					publisher.publish(sequence);
				}
			});
			assert_eq!(difference(barrier.wait_until_published(9), 9), 0);
		});
	}

	#[test]
	fn group_reports_slowest_member() {
		let wait_strategy = Arc::new(SpinWaitStrategy);
		let fast          = Arc::new(SequenceBarrier::new(Arc::clone(&wait_strategy)));
		let slow          = Arc::new(SequenceBarrier::new(Arc::clone(&wait_strategy)));
		let mut group     = SequenceBarrierGroup::new(Arc::clone(&wait_strategy));
		group.add(Arc::clone(&fast));
		group.add(Arc::clone(&slow));

		fast.publish(9);
		slow.publish(2);
		assert_eq!(group.last_published(), 2);
		assert_eq!(group.wait_until_published(1), 2);
	}

	#[test]
	fn group_of_groups_waits_on_all_members() {
		let wait_strategy = Arc::new(SpinWaitStrategy);
		let a             = Arc::new(SequenceBarrier::new(Arc::clone(&wait_strategy)));
		let b             = Arc::new(SequenceBarrier::new(Arc::clone(&wait_strategy)));
		let mut inner     = SequenceBarrierGroup::new(Arc::clone(&wait_strategy));
		inner.add(Arc::clone(&a));
		let mut outer     = SequenceBarrierGroup::new(Arc::clone(&wait_strategy));
		outer.add_group(&inner);
		outer.add(Arc::clone(&b));

		a.publish(5);
		b.publish(3);
		assert_eq!(outer.last_published(), 3);
	}

	#[test]
	#[should_panic(expected = "share one wait strategy")]
	fn rejects_barrier_with_foreign_wait_strategy() {
		let barrier   = Arc::new(SequenceBarrier::new(Arc::new(SpinWaitStrategy)));
		let mut group = SequenceBarrierGroup::new(Arc::new(SpinWaitStrategy));
		group.add(barrier);
	}

	#[test]
	#[should_panic(expected = "must not be empty")]
	fn empty_group_cannot_be_read() {
		let group: SequenceBarrierGroup<SpinWaitStrategy> = SequenceBarrierGroup::new(Arc::new(SpinWaitStrategy));
		group.last_published();
	}
}
