//! Configuration types and path resolution for kiri.
//!
//! Kiri stores its settings as TOML at the platform's XDG config path
//! (e.g. `~/.config/kiri/config.toml` on Linux) and session data under the
//! XDG data directory (`~/.local/share/kiri/`). A `kiri.toml` in the project
//! overrides the global file field by field.

mod loader;
mod paths;
mod resolve;
mod types;

pub use types::{AgentOverride, Config, ProviderConfig, ProviderEntry, RuntimeConfig};

use anyhow::Result;

impl Config {
    /// Load config with precedence: project > global > defaults.
    /// Creates default config file if none exists.
    pub fn load() -> Result<Self> {
        let global = Self::load_global()?;
        let project = Self::load_project_from(&std::env::current_dir()?)?;

        let mut config = global;
        if let Some(proj) = project {
            config = Self::merge(config, proj);
        }

        config.resolve_substitutions();
        Ok(config)
    }
}
