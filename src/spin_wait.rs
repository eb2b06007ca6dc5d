//! Module with a helper for implementing spin-wait loops.

use std::hint;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

/// Number of [`spin_once`](SpinWait::spin_once) calls before the helper starts yielding the thread.
const YIELD_THRESHOLD: u32 = 10;
/// Every this many escalated calls, one sleeps instead of yielding.
const SLEEP_EVERY: u32 = 20;

/// A helper for implementing spin-wait loops with adaptive back-off.
///
/// Call [`spin_once`](Self::spin_once) each time through the loop. The first calls execute
/// exponentially longer sequences of CPU idle hints (allowing e.g. the other hyper-thread on
/// the core to run), later calls yield the rest of the time slice and occasionally put the
/// thread to sleep for a short while. This keeps latency low for short waits and CPU usage
/// low for long ones.
///
/// On machines with a single hardware thread the CPU idling phase is skipped entirely.
///
/// # Examples
/// ```
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use seqring::SpinWait;
///
/// let flag        = AtomicBool::new(true);
/// let mut spinner = SpinWait::new();
/// while !flag.load(Ordering::Acquire) {
///     spinner.spin_once();
/// }
/// ```
pub struct SpinWait {
	counter: u32,
}

fn is_multi_core() -> bool {
	static MULTI_CORE: OnceLock<bool> = OnceLock::new();
	*MULTI_CORE.get_or_init(|| {
		thread::available_parallelism().map_or(true, |n| n.get() > 1)
	})
}

impl SpinWait {
	/// Creates a new `SpinWait` in its initial state.
	pub fn new() -> Self {
		let mut spin_wait = Self { counter: 0 };
		spin_wait.reset();
		spin_wait
	}

	/// Resets the `SpinWait` back to its initial state.
	pub fn reset(&mut self) {
		self.counter = if is_multi_core() { 0 } else { YIELD_THRESHOLD };
	}

	/// Waits for a short period of time.
	///
	/// Call this each time through a spin-wait loop.
	pub fn spin_once(&mut self) {
		if self.next_spin_will_yield() {
			let count = self.counter - YIELD_THRESHOLD;
			if count % SLEEP_EVERY == SLEEP_EVERY - 1 {
				thread::sleep(Duration::from_millis(1));
			}
			else {
				thread::yield_now();
			}
		}
		else {
			let mut count = 4u32 << self.counter;
			while count != 0 {
				hint::spin_loop();
				count -= 1;
			}
		}
		self.counter = if self.counter == u32::MAX { YIELD_THRESHOLD } else { self.counter + 1 };
	}

	/// Whether the next call to [`spin_once`](Self::spin_once) will yield the remainder of the
	/// thread's time slice (or sleep) instead of busy-waiting.
	///
	/// Callers can check this to perform alternative logic (e.g. reading the clock) only when
	/// the thread is about to be rescheduled anyway.
	pub fn next_spin_will_yield(&self) -> bool {
		self.counter >= YIELD_THRESHOLD
	}
}

impl Default for SpinWait {
	fn default() -> Self {
		Self::new()
	}
}
