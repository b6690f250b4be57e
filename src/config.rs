/// Runtime configuration for a `Machine`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Evaluation steps between collections.
    pub gc_threshold: usize,
    /// Load the Lisp prelude when seeding the global environment.
    pub prelude: bool,
}

pub const DEFAULT_GC_THRESHOLD: usize = 100_000;

impl Default for Config {
    fn default() -> Self {
        Config {
            gc_threshold: DEFAULT_GC_THRESHOLD,
            prelude: true,
        }
    }
}

impl Config {
    /// Defaults overlaid with `LISP_GC_THRESHOLD` when it is set.
    pub fn from_env() -> Self {
        let mut config = Config::default();
        if let Ok(raw) = std::env::var("LISP_GC_THRESHOLD") {
            config.apply_gc_threshold(&raw);
        }
        config
    }

    /// Parse and apply a collection threshold. Invalid input leaves the
    /// current value in place.
    pub fn apply_gc_threshold(&mut self, raw: &str) -> bool {
        match raw.trim().parse::<usize>() {
            Ok(n) => {
                self.gc_threshold = n.max(1);
                true
            }
            Err(_) => {
                tracing::warn!(value = raw, "ignoring invalid gc threshold");
                false
            }
        }
    }
}
