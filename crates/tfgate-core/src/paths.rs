use crate::error::{Result, TfgateError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Layout constants
// ---------------------------------------------------------------------------

/// Virtual namespace used by discovery imports when no configuration
/// name is given.
pub const DISCOVERY_CONFIG: &str = "discovery";

pub const LOG_DIR: &str = "logs";
pub const STATE_FILE: &str = "terraform.tfstate";
pub const ACTIONS_DB: &str = "actions.redb";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Directory holding one configuration's files.
pub fn config_dir(root: &Path, config_name: &str) -> PathBuf {
    root.join(config_name)
}

/// The state snapshot location for one configuration.
pub fn state_file(root: &Path, config_name: &str) -> PathBuf {
    config_dir(root, config_name).join(STATE_FILE)
}

/// Directory where log artifacts are written.
pub fn log_dir(root: &Path) -> PathBuf {
    root.join(LOG_DIR)
}

/// The action store database file.
pub fn actions_db(root: &Path) -> PathBuf {
    root.join(ACTIONS_DB)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn config_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9_-]*$").unwrap())
}

/// Validate a configuration name. Rejects anything that could escape the
/// data root when joined as a path component.
pub fn validate_config_name(name: &str) -> Result<()> {
    if name.len() > 64 || !config_name_re().is_match(name) {
        return Err(TfgateError::InvalidConfigName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_simple_names() {
        for name in ["demo", "discovery", "my-config_2"] {
            validate_config_name(name).unwrap();
        }
    }

    #[test]
    fn rejects_traversal_and_empty() {
        for name in ["", "..", "../etc", "a/b", "UPPER", "-leading"] {
            assert!(validate_config_name(name).is_err(), "accepted {name:?}");
        }
    }

    #[test]
    fn state_file_lives_under_config_dir() {
        let p = state_file(Path::new("/data"), "demo");
        assert_eq!(p, PathBuf::from("/data/demo/terraform.tfstate"));
    }
}
