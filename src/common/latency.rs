//! Latency benchmarks for hot-path inference
//!
//! Inference entry points are expected to stay well under a millisecond on
//! average. Tests use these helpers to hold that line.
//!
//! ```
//! use setup_decision_core::common::latency::LatencyBench;
//! use std::time::Duration;
//!
//! let stats = LatencyBench::benchmark("sum", 100, || {
//!     let _: u64 = (0..64u64).sum();
//! });
//! assert!(stats.average_is_under(Duration::from_secs(1)));
//! ```

use std::fmt;
use std::time::{Duration, Instant};

/// Result of a single timed call
#[derive(Debug, Clone)]
pub struct Timed<T> {
    pub name: String,
    pub duration: Duration,
    pub result: T,
}

impl<T> Timed<T> {
    pub fn micros(&self) -> u128 {
        self.duration.as_micros()
    }
}

/// Aggregate timings over repeated calls
#[derive(Debug, Clone)]
pub struct LatencyStats {
    pub name: String,
    pub iterations: usize,
    pub total: Duration,
    pub average: Duration,
    pub min: Duration,
    pub max: Duration,
    pub median: Duration,
    pub p95: Duration,
    pub p99: Duration,
}

impl LatencyStats {
    pub fn average_is_under(&self, limit: Duration) -> bool {
        self.average < limit
    }

    pub fn p95_is_under(&self, limit: Duration) -> bool {
        self.p95 < limit
    }

    pub fn ops_per_second(&self) -> f64 {
        if self.total.is_zero() {
            return f64::INFINITY;
        }
        self.iterations as f64 / self.total.as_secs_f64()
    }
}

impl fmt::Display for LatencyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[Latency] {}", self.name)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Average:    {:?}", self.average)?;
        writeln!(f, "  Median:     {:?}", self.median)?;
        writeln!(f, "  Min/Max:    {:?} / {:?}", self.min, self.max)?;
        write!(f, "  P95/P99:    {:?} / {:?}", self.p95, self.p99)
    }
}

/// Timing helpers
pub struct LatencyBench;

impl LatencyBench {
    /// Time a single call
    pub fn time<T, F>(name: &str, f: F) -> Timed<T>
    where
        F: FnOnce() -> T,
    {
        let started = Instant::now();
        let result = f();
        Timed {
            name: name.to_string(),
            duration: started.elapsed(),
            result,
        }
    }

    /// Run `f` repeatedly after one warmup call and collect stats.
    /// Zero iterations is treated as one.
    pub fn benchmark<F>(name: &str, iterations: usize, mut f: F) -> LatencyStats
    where
        F: FnMut(),
    {
        let iterations = iterations.max(1);
        f();

        let mut durations = Vec::with_capacity(iterations);
        let total_start = Instant::now();
        for _ in 0..iterations {
            let start = Instant::now();
            f();
            durations.push(start.elapsed());
        }
        let total = total_start.elapsed();

        Self::stats(name, durations, total)
    }

    fn stats(name: &str, mut durations: Vec<Duration>, total: Duration) -> LatencyStats {
        durations.sort();
        let n = durations.len();
        let pick = |q: f64| durations[((n as f64 * q) as usize).min(n - 1)];
        let total_nanos: u128 = durations.iter().map(|d| d.as_nanos()).sum();

        LatencyStats {
            name: name.to_string(),
            iterations: n,
            total,
            average: Duration::from_nanos((total_nanos / n as u128) as u64),
            min: durations[0],
            max: durations[n - 1],
            median: durations[n / 2],
            p95: pick(0.95),
            p99: pick(0.99),
        }
    }

    /// Benchmark and panic if the average exceeds `max_average`
    pub fn assert_average_under<F>(
        name: &str,
        iterations: usize,
        max_average: Duration,
        f: F,
    ) -> LatencyStats
    where
        F: FnMut(),
    {
        let stats = Self::benchmark(name, iterations, f);
        assert!(
            stats.average_is_under(max_average),
            "[Latency FAILED] {} average {:?} exceeded {:?}\n{}",
            name,
            stats.average,
            max_average,
            stats
        );
        stats
    }
}
