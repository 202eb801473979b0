use std::path::PathBuf;

/// Engine-wide tunables. All have sensible bootstraps; nothing here is a
/// learning-rate or a threshold in the adaptive sense — those are derived
/// by [`crate::thresholds`] from running statistics, never hardcoded.
#[derive(Debug, Clone)]
pub struct Config {
    /// Minimum Welford sample count before adaptive formulas are trusted.
    pub bootstrap_count: u64,

    /// Number of recently emitted output nodes penalised by habituation.
    pub habituation_window: usize,

    /// Hard upper bound on REFINE iterations regardless of convergence.
    pub max_refine_iterations: usize,

    /// Absolute ceiling on generated length, expressed as a multiplier of
    /// input length (before the decoder's maturity/connectivity adjustment
    /// is applied).
    pub output_cap_multiplier: usize,

    /// On-disk location for [`crate::persistence`]. `None` means the graph
    /// is purely in-memory (useful for tests); `open`/`close` require it.
    pub persistence_path: Option<PathBuf>,

    /// Seeds the decoder's PRNG. `None` draws from OS entropy once at
    /// construction (the normal, non-replay case); `Some(seed)` makes
    /// decode sampling fully reproducible across runs, since the
    /// pseudo-random source is parameterised rather than fixed.
    pub rng_seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bootstrap_count: 10,
            habituation_window: 8,
            max_refine_iterations: 8,
            output_cap_multiplier: 16,
            persistence_path: None,
            rng_seed: None,
        }
    }
}

impl Config {
    pub fn with_persistence_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.persistence_path = Some(path.into());
        self
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }
}
