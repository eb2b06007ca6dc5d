use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use crossbeam::channel::bounded;
use seqring::*;

const BUFFER_SIZE: usize = 256;
const SHUTDOWN: i64 = i64::MIN;

struct Event {
	data: i64,
}

pub fn base_benchmark(c: &mut Criterion) {
	let sink     = Arc::new(AtomicI64::new(0));
	let sink2    = Arc::clone(&sink);
	let mut data = 0;
	c.bench_function("base", move |b| {
		b.iter(|| {
			data += 1;
			sink.store(black_box(data), Ordering::Release);
			let expected = black_box(data);
			while sink2.load(Ordering::Acquire) != expected {}
		})
	});
}

pub fn seqring_benchmark(c: &mut Criterion) {
	let wait_strategy    = Arc::new(SpinWaitStrategy);
	let mut claim        = SingleProducerClaimStrategy::new(BUFFER_SIZE, Arc::clone(&wait_strategy));
	let finished_reading = Arc::new(SequenceBarrier::new(wait_strategy));
	claim.add_claim_barrier(Arc::clone(&finished_reading));
	let read_barrier     = claim.read_barrier();
	let buffer           = Arc::new(RingBuffer::new(BUFFER_SIZE, || Event { data: 0 }));

	// The consumer mirrors every published value into `sink` so the bench thread can
	// observe the full producer-to-consumer round trip.
	let sink     = Arc::new(AtomicI64::new(0));
	let consumer = {
		let buffer = Arc::clone(&buffer);
		let sink   = Arc::clone(&sink);
		thread::spawn(move || {
			let mut next_to_read: Sequence = 0;
			loop {
				let available = read_barrier.wait_until_published(next_to_read);
				while difference(next_to_read, available) <= 0 {
					// SAFETY: `next_to_read` has been published.
					let data = unsafe { (*buffer.get(next_to_read)).data };
					if data == SHUTDOWN {
						return;
					}
					sink.store(data, Ordering::Release);
					next_to_read = next_to_read.wrapping_add(1);
				}
				finished_reading.publish(available);
			}
		})
	};

	let mut data = 0;
	c.bench_function("spsc_seqring", |b| {
		b.iter(|| {
			data += 1;
			let sequence = claim.claim_one();
			// SAFETY: The slot at `sequence` is claimed exclusively by this producer.
			unsafe { (*buffer.get(sequence)).data = black_box(data) };
			claim.publish(sequence);
			let expected = black_box(data);
			while sink.load(Ordering::Acquire) != expected {}
		})
	});

	let sequence = claim.claim_one();
	// SAFETY: The slot at `sequence` is claimed exclusively by this producer.
	unsafe { (*buffer.get(sequence)).data = SHUTDOWN };
	claim.publish(sequence);
	consumer.join().expect("Consumer should not panic.");
}

pub fn crossbeam_benchmark(c: &mut Criterion) {
	let (s, r)   = bounded(BUFFER_SIZE);
	let sink     = Arc::new(AtomicI64::new(0));
	let receiver = {
		let sink = Arc::clone(&sink);
		thread::spawn(move || {
			while let Ok(data) = r.recv() {
				sink.store(data, Ordering::Release);
			}
		})
	};

	let mut data = 0;
	c.bench_function("spsc_crossbeam_channel", |b| {
		b.iter(|| {
			data += 1;
			s.send(black_box(data)).expect("Should be able to send.");
			let expected = black_box(data);
			while sink.load(Ordering::Acquire) != expected {}
		})
	});

	drop(s);
	receiver.join().expect("Receiver should not panic.");
}

criterion_group!(spsc, base_benchmark, seqring_benchmark, crossbeam_benchmark);
criterion_main!(spsc);
