use std::path::PathBuf;

pub const HOME_ENV: &str = "PRIA_HOME";

pub fn default_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(HOME_ENV) {
        return PathBuf::from(dir);
    }

    match std::env::var_os("HOME") {
        Some(home) => {
            let base = PathBuf::from(home);
            if cfg!(target_os = "macos") {
                base.join("Library").join("Application Support").join("pria")
            } else {
                base.join(".local").join("share").join("pria")
            }
        }
        None => PathBuf::from("."),
    }
}

pub fn default_config_path() -> PathBuf {
    default_data_dir().join("pria.toml")
}
