use num_traits::ToPrimitive;
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// The time spent in each phase of bin sums across every call in this process.
pub static TIMING: Lazy<Timing> = Lazy::new(Timing::new);

#[derive(Debug)]
pub struct Timing {
	pub bin_sums_zero_dimensions: TimingDuration,
	pub bin_sums_bit_packed: TimingDuration,
	pub bin_sums_parallel: TimingDuration,
	pub merge: TimingDuration,
}

pub struct TimingDuration(AtomicU64);

impl Timing {
	pub fn new() -> Timing {
		Timing {
			bin_sums_zero_dimensions: TimingDuration::new(),
			bin_sums_bit_packed: TimingDuration::new(),
			bin_sums_parallel: TimingDuration::new(),
			merge: TimingDuration::new(),
		}
	}
}

impl Default for Timing {
	fn default() -> Self {
		Self::new()
	}
}

impl TimingDuration {
	pub fn new() -> Self {
		Self(AtomicU64::new(0))
	}
	pub fn get(&self) -> Duration {
		Duration::from_nanos(self.0.load(Ordering::Relaxed))
	}
	pub fn inc(&self, value: Duration) -> u64 {
		self.0
			.fetch_add(value.as_nanos().to_u64().unwrap_or(u64::MAX), Ordering::Relaxed)
	}
}

impl Default for TimingDuration {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Debug for TimingDuration {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{:?}", self.get())
	}
}
