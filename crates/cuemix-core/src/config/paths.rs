//! Standard configuration locations

use std::path::PathBuf;

/// Name of the engine configuration file
pub const CONFIG_FILE_NAME: &str = "cuemix.yaml";

/// Per-user configuration directory, `~/.config/cuemix` on Linux
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cuemix")
}

/// `<config dir>/cuemix.yaml`
pub fn default_config_path() -> PathBuf {
    default_config_dir().join(CONFIG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_ends_with_cuemix() {
        assert!(default_config_dir().ends_with("cuemix"));
    }

    #[test]
    fn test_config_path_includes_filename() {
        let path = default_config_path();
        assert!(path.ends_with("cuemix/cuemix.yaml"));
    }
}
