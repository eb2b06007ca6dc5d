//! Module with different strategies for waiting for a sequence to be published.
//!
//! The lowest latency possible is the [`SpinWaitStrategy`].
//!
//! To "waste" less CPU time and power, use the [`BlockingWaitStrategy`] which has higher
//! latency but parks waiting threads on a condition variable.
//!
//! A single wait strategy instance must be shared (via [`Arc`](std::sync::Arc)) by all
//! barriers and claim strategies of one pipeline - otherwise a publisher's signal cannot
//! reach the threads blocked on another instance.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::sequence::{difference, minimum_sequence_after, AtomicSequence};
use crate::spin_wait::SpinWait;
use crate::Sequence;

/// Wait strategies are used by barriers and claim strategies when a desired sequence is not
/// yet published by all of the `dependencies` cells.
///
/// The timed variants return a sentinel on timeout: a sequence `r` with
/// `difference(r, sequence) < 0`. They never fail with an error.
pub trait WaitStrategy: Send + Sync {
	/// Waits until all `dependencies` have published at least `sequence`.
	///
	/// Returns the value of the least-advanced dependency, which is guaranteed to be equal
	/// to or after `sequence`. Establishes `Acquire` ordering on all cells.
	fn wait_until_published(&self, sequence: Sequence, dependencies: &[&AtomicSequence]) -> Sequence;

	/// As [`wait_until_published`](Self::wait_until_published) but gives up after `timeout`.
	///
	/// On timeout the returned sequence precedes `sequence` (by [`difference`]).
	fn wait_until_published_for(&self, sequence: Sequence, dependencies: &[&AtomicSequence], timeout: Duration) -> Sequence {
		self.wait_until_published_until(sequence, dependencies, Instant::now() + timeout)
	}

	/// As [`wait_until_published`](Self::wait_until_published) but gives up once `deadline`
	/// has passed.
	///
	/// On timeout the returned sequence precedes `sequence` (by [`difference`]).
	fn wait_until_published_until(&self, sequence: Sequence, dependencies: &[&AtomicSequence], deadline: Instant) -> Sequence;

	/// Wakes all threads that may be blocked inside one of the wait methods.
	///
	/// Called by publishers after every publication.
	fn signal_all_when_blocking(&self);
}

/// Busy-spin wait strategy with adaptive back-off. Lowest possible latency.
///
/// Polls the dependency cells in a loop, using a [`SpinWait`] between polls so that long
/// waits degrade from CPU idle hints to yields and short sleeps.
#[derive(Copy, Clone, Default)]
pub struct SpinWaitStrategy;

impl WaitStrategy for SpinWaitStrategy {
	fn wait_until_published(&self, sequence: Sequence, dependencies: &[&AtomicSequence]) -> Sequence {
		debug_assert!(!dependencies.is_empty());
		let mut spinner = SpinWait::new();
		let mut result  = minimum_sequence_after(sequence, dependencies.iter().copied());
		while difference(result, sequence) < 0 {
			spinner.spin_once();
			result = minimum_sequence_after(sequence, dependencies.iter().copied());
		}
		result
	}

	fn wait_until_published_until(&self, sequence: Sequence, dependencies: &[&AtomicSequence], deadline: Instant) -> Sequence {
		debug_assert!(!dependencies.is_empty());
		let mut spinner = SpinWait::new();
		let mut result  = minimum_sequence_after(sequence, dependencies.iter().copied());
		while difference(result, sequence) < 0 {
			// Only consult the clock when the spinner is about to be rescheduled anyway:
			// reading the clock on every iteration would dominate short waits.
			if spinner.next_spin_will_yield() && Instant::now() > deadline {
				return result;
			}
			spinner.spin_once();
			result = minimum_sequence_after(sequence, dependencies.iter().copied());
		}
		result
	}

	fn signal_all_when_blocking(&self) {
		// Nothing to do: waiting threads are continuously polling the cells.
	}
}

/// Wait strategy that blocks waiting threads on a condition variable.
///
/// All currently blocked threads are woken whenever any barrier of the pipeline publishes,
/// regardless of which cells they wait on; each re-evaluates its own predicate.
#[derive(Default)]
pub struct BlockingWaitStrategy {
	mutex:   Mutex<()>,
	condvar: Condvar,
}

impl BlockingWaitStrategy {
	/// Creates a new `BlockingWaitStrategy`.
	pub fn new() -> Self {
		Self::default()
	}
}

impl WaitStrategy for BlockingWaitStrategy {
	fn wait_until_published(&self, sequence: Sequence, dependencies: &[&AtomicSequence]) -> Sequence {
		debug_assert!(!dependencies.is_empty());
		let mut guard = self.mutex.lock().unwrap();
		loop {
			// The predicate must be evaluated under the lock: a publisher signals while
			// holding the mutex, so a publication cannot slip in between this check and
			// the wait below.
			let result = minimum_sequence_after(sequence, dependencies.iter().copied());
			if difference(result, sequence) >= 0 {
				return result;
			}
			guard = self.condvar.wait(guard).unwrap();
		}
	}

	fn wait_until_published_until(&self, sequence: Sequence, dependencies: &[&AtomicSequence], deadline: Instant) -> Sequence {
		debug_assert!(!dependencies.is_empty());
		let mut guard = self.mutex.lock().unwrap();
		loop {
			let result = minimum_sequence_after(sequence, dependencies.iter().copied());
			if difference(result, sequence) >= 0 {
				return result;
			}
			let now = Instant::now();
			if now >= deadline {
				return result;
			}
			let (new_guard, _) = self.condvar.wait_timeout(guard, deadline - now).unwrap();
			guard = new_guard;
		}
	}

	fn signal_all_when_blocking(&self) {
		// Take the lock so we do not notify while a waiter is between checking the cells
		// and entering the wait on the condition variable.
		let _guard = self.mutex.lock().unwrap();
		self.condvar.notify_all();
	}
}
