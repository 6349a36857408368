use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::AtendoConfig};

/// Standard config file name.
const CONFIG_FILENAME: &str = "atendo.toml";

/// Load config from the given path.
pub fn load_config(path: &Path) -> anyhow::Result<AtendoConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    Ok(toml::from_str(&raw)?)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./atendo.toml` (project-local)
/// 2. `~/.config/atendo/atendo.toml` (user-global)
///
/// Returns `AtendoConfig::default()` if no config file is found.
pub fn discover_and_load() -> AtendoConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    AtendoConfig::default()
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILENAME);
    if local.exists() {
        return Some(local);
    }

    if let Some(dir) = config_dir() {
        let p = dir.join(CONFIG_FILENAME);
        if p.exists() {
            return Some(p);
        }
    }

    None
}

/// Returns the user-global config directory (`~/.config/atendo/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "atendo").map(|d| d.config_dir().to_path_buf())
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_config_parses_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atendo.toml");
        std::fs::write(&path, "[gateway]\nbind = \"0.0.0.0\"\nport = 9000\n").unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.gateway.bind, "0.0.0.0");
        assert_eq!(cfg.gateway.port, 9000);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_config(Path::new("/nonexistent/atendo.toml")).is_err());
    }
}
