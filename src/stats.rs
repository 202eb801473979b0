//! Running-statistics service.
//!
//! Every adaptive threshold in [`crate::thresholds`] is a pure function of
//! a [`RunningStats`] snapshot. Updates are O(1) via Welford's online
//! algorithm; nothing here ever looks at a hardcoded constant for a
//! learning rate or cutoff — those live one layer up.

use serde::{Deserialize, Serialize};

/// The four tracked quantities, each with its own Welford accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Activation,
    Confidence,
    Error,
    PathLength,
}

/// A single Welford (mean, M2, count) accumulator.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Welford {
    pub mean: f64,
    pub m2: f64,
    pub count: u64,
}

impl Welford {
    fn update(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = x - self.mean;
        self.m2 += delta * delta2;
    }

    fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count as f64 - 1.0)
        }
    }

    fn stddev(&self) -> f64 {
        self.variance().sqrt()
    }
}

/// Bootstrap defaults returned while a stream has fewer than
/// `bootstrap_count` samples. Chosen to be mid-range and non-degenerate so
/// early-life thresholds don't collapse to zero or blow up.
struct Bootstrap {
    mean: f64,
    stddev: f64,
}

fn bootstrap_for(stream: Stream) -> Bootstrap {
    match stream {
        Stream::Activation => Bootstrap { mean: 0.5, stddev: 0.25 },
        Stream::Confidence => Bootstrap { mean: 0.5, stddev: 0.25 },
        Stream::Error => Bootstrap { mean: 0.1, stddev: 0.1 },
        Stream::PathLength => Bootstrap { mean: 5.0, stddev: 2.0 },
    }
}

/// Graph-wide running statistics. Carried on the graph object, updated
/// incrementally at well-defined recording points, never reset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunningStats {
    activation: Welford,
    confidence: Welford,
    error: Welford,
    path_length: Welford,

    /// Total ingests observed by this graph across its lifetime. Used by
    /// [`crate::thresholds::graph_maturity`].
    pub(crate) total_ingests: u64,

    /// Count of numerical-error containments: a NaN/Inf weight or
    /// activation was reset to its stream mean. Diagnostic only, never
    /// surfaced to the caller.
    pub(crate) numerical_resets: u64,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn welford(&self, stream: Stream) -> &Welford {
        match stream {
            Stream::Activation => &self.activation,
            Stream::Confidence => &self.confidence,
            Stream::Error => &self.error,
            Stream::PathLength => &self.path_length,
        }
    }

    fn welford_mut(&mut self, stream: Stream) -> &mut Welford {
        match stream {
            Stream::Activation => &mut self.activation,
            Stream::Confidence => &mut self.confidence,
            Stream::Error => &mut self.error,
            Stream::PathLength => &mut self.path_length,
        }
    }

    /// Bootstrap threshold below which queries fall back to configured
    /// defaults rather than the raw accumulator.
    pub fn update(&mut self, stream: Stream, x: f64, bootstrap_count: u64) {
        let _ = bootstrap_count; // bootstrap only gates *reads*, not accumulation
        if !x.is_finite() {
            self.numerical_resets += 1;
            return;
        }
        self.welford_mut(stream).update(x);
    }

    pub fn count(&self, stream: Stream) -> u64 {
        self.welford(stream).count
    }

    pub fn mean(&self, stream: Stream, bootstrap_count: u64) -> f64 {
        let w = self.welford(stream);
        if w.count < bootstrap_count {
            bootstrap_for(stream).mean
        } else {
            w.mean
        }
    }

    pub fn stddev(&self, stream: Stream, bootstrap_count: u64) -> f64 {
        let w = self.welford(stream);
        if w.count < bootstrap_count {
            bootstrap_for(stream).stddev
        } else {
            // A single sample has zero sample variance by Bessel's
            // correction; fall back to the bootstrap spread rather than
            // claiming perfect certainty from one observation.
            let sd = w.stddev();
            if sd <= f64::EPSILON {
                bootstrap_for(stream).stddev
            } else {
                sd
            }
        }
    }

    /// Approximates the value at percentile `p` (0..1) assuming the stream
    /// is normally distributed: `mean + z(p) * stddev`.
    pub fn percentile(&self, stream: Stream, p: f64, bootstrap_count: u64) -> f64 {
        let z = inverse_normal_cdf(p.clamp(0.0001, 0.9999));
        self.mean(stream, bootstrap_count) + z * self.stddev(stream, bootstrap_count)
    }

    pub fn record_ingest(&mut self) {
        self.total_ingests += 1;
    }

    /// Total ingests observed by this graph across its lifetime. Doubles
    /// as the logical, replay-deterministic timestamp handed to edges as
    /// they're created or strengthened — deterministic ordering, not a
    /// wall-clock read, is what makes identical training traces replayable.
    pub fn total_ingests(&self) -> u64 {
        self.total_ingests
    }

    pub fn numerical_resets(&self) -> u64 {
        self.numerical_resets
    }

    /// Raw Welford triple for `stream`, bypassing the bootstrap policy —
    /// used only by [`crate::persistence`], which must round-trip the
    /// accumulator exactly rather than a bootstrapped read.
    pub(crate) fn raw_welford(&self, stream: Stream) -> Welford {
        *self.welford(stream)
    }

    pub(crate) fn set_raw_welford(&mut self, stream: Stream, w: Welford) {
        *self.welford_mut(stream) = w;
    }
}

/// Peter Acklam's rational approximation of the inverse standard normal
/// CDF. Good to ~1e-9 relative error over (0, 1), plenty for threshold
/// derivation.
fn inverse_normal_cdf(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];

    const P_LOW: f64 = 0.02425;
    let p_high = 1.0 - P_LOW;

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= p_high {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_defaults_below_threshold() {
        let mut stats = RunningStats::new();
        stats.update(Stream::Activation, 0.9, 10);
        // Only one sample; below bootstrap_count=10, so mean() returns bootstrap.
        assert_eq!(stats.mean(Stream::Activation, 10), 0.5);
    }

    #[test]
    fn converges_after_bootstrap() {
        let mut stats = RunningStats::new();
        for _ in 0..50 {
            stats.update(Stream::Activation, 0.8, 10);
        }
        assert!((stats.mean(Stream::Activation, 10) - 0.8).abs() < 1e-9);
        assert!(stats.stddev(Stream::Activation, 10) < 0.01);
    }

    #[test]
    fn percentile_monotonic_in_p() {
        let mut stats = RunningStats::new();
        for i in 0..100 {
            stats.update(Stream::Confidence, i as f64 / 100.0, 10);
        }
        let p10 = stats.percentile(Stream::Confidence, 0.1, 10);
        let p50 = stats.percentile(Stream::Confidence, 0.5, 10);
        let p90 = stats.percentile(Stream::Confidence, 0.9, 10);
        assert!(p10 < p50);
        assert!(p50 < p90);
    }

    #[test]
    fn nan_is_contained_not_propagated() {
        let mut stats = RunningStats::new();
        stats.update(Stream::Error, f64::NAN, 10);
        assert_eq!(stats.count(Stream::Error), 0);
        assert_eq!(stats.numerical_resets(), 1);
    }

    #[test]
    fn count_is_monotonic() {
        let mut stats = RunningStats::new();
        let mut last = 0;
        for i in 0..20 {
            stats.update(Stream::PathLength, i as f64, 10);
            let c = stats.count(Stream::PathLength);
            assert!(c >= last);
            last = c;
        }
    }
}
