use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Run-wide knobs for a single simulation. Mirrors the engine's own
/// builder-style config objects: small, serializable, safe to log verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Use the per-AS pseudo-random bit instead of the tiny-hash tiebreak
    /// when two candidate routes have equal priority.
    pub random_tiebreak: bool,
    /// Where block-by-block announcement feed staging files are written.
    pub staging_dir: PathBuf,
    /// Keep each AS's second-best (depref) route in the result set.
    pub store_depref: bool,
    /// Keep each installed route's full AS path in the result set, not just
    /// the immediate received-from neighbor.
    pub store_full_path: bool,
}

impl SimulationConfig {
    pub fn new() -> Self {
        SimulationConfig {
            random_tiebreak: false,
            staging_dir: default_staging_dir(),
            store_depref: false,
            store_full_path: false,
        }
    }

    pub fn with_random_tiebreak(mut self, random_tiebreak: bool) -> Self {
        self.random_tiebreak = random_tiebreak;
        self
    }

    pub fn with_staging_dir(mut self, staging_dir: PathBuf) -> Self {
        self.staging_dir = staging_dir;
        self
    }

    pub fn with_store_depref(mut self, store_depref: bool) -> Self {
        self.store_depref = store_depref;
        self
    }

    pub fn with_store_full_path(mut self, store_full_path: bool) -> Self {
        self.store_full_path = store_full_path;
        self
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "random_tiebreak": self.random_tiebreak,
            "staging_dir": self.staging_dir,
            "store_depref": self.store_depref,
            "store_full_path": self.store_full_path,
        })
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn default_staging_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("route-extrapolator")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_apply() {
        let cfg = SimulationConfig::new()
            .with_random_tiebreak(true)
            .with_store_depref(true);
        assert!(cfg.random_tiebreak);
        assert!(cfg.store_depref);
        assert!(!cfg.store_full_path);
    }

    #[test]
    fn round_trips_through_json() {
        let cfg = SimulationConfig::new().with_store_full_path(true);
        let json = serde_json::to_string(&cfg).unwrap();
        let back: SimulationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.store_full_path, cfg.store_full_path);
    }
}
