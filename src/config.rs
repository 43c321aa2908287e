//! Runtime configuration (§6): registry layout and per-library symbol names.

use std::path::PathBuf;

/// Every configurable identifier the runtime needs, threaded explicitly
/// rather than held in hidden global state — the only process-wide globals
/// this crate has are the three mutex-guarded singletons (§5).
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Root of the on-disk class registry.
    pub registry_root: PathBuf,
    /// In-proc-server subspace directory name, relative to `registry_root`.
    pub inproc_servers_dir: String,
    /// In-proc-handler subspace directory name, relative to `registry_root`.
    pub inproc_handlers_dir: String,
    /// Treat-as subspace directory name, relative to `registry_root`.
    pub treat_as_dir: String,
    /// Per-library optional init entry point name.
    pub init_symbol: String,
    /// Per-library optional teardown entry point name.
    pub teardown_symbol: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            registry_root: PathBuf::from("/andromeda"),
            inproc_servers_dir: "InprocServers".to_string(),
            inproc_handlers_dir: "InprocHandlers".to_string(),
            treat_as_dir: "TreatAs".to_string(),
            init_symbol: "__init_com_".to_string(),
            teardown_symbol: "__expunge_com_".to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn with_registry_root(root: impl Into<PathBuf>) -> Self {
        RuntimeConfig {
            registry_root: root.into(),
            ..RuntimeConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_subspace_names() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.inproc_servers_dir, "InprocServers");
        assert_eq!(cfg.inproc_handlers_dir, "InprocHandlers");
        assert_eq!(cfg.treat_as_dir, "TreatAs");
        assert_eq!(cfg.init_symbol, "__init_com_");
        assert_eq!(cfg.teardown_symbol, "__expunge_com_");
    }
}
