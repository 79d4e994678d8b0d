use crate::engine::{
    DEFAULT_IDLE_INTERVAL, DEFAULT_IDLE_PROBABILITY, DEFAULT_SPAWN_PROBABILITY, EngineConfig,
};
use crate::geometry::WorkArea;
use crate::scheduler::TimerSchedule;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Host configuration loaded from `pria.toml`. Relative paths resolve
/// against the directory holding the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: PathBuf,
    pub assets_dir: PathBuf,
    pub resource_root: PathBuf,
    pub timing: TimingSection,
    pub work_area: WorkArea,
    #[serde(skip)]
    base_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingSection {
    pub idle_interval_ms: u64,
    pub spawn_probability: f64,
    pub idle_probability: f64,
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            idle_interval_ms: DEFAULT_IDLE_INTERVAL.as_millis() as u64,
            spawn_probability: DEFAULT_SPAWN_PROBABILITY,
            idle_probability: DEFAULT_IDLE_PROBABILITY,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("pria.json"),
            assets_dir: PathBuf::from("assets"),
            resource_root: PathBuf::from("."),
            timing: TimingSection::default(),
            work_area: WorkArea::default(),
            base_dir: PathBuf::from("."),
        }
    }
}

impl AppConfig {
    /// Load `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let base_dir = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        if !path.exists() {
            return Ok(Self {
                base_dir,
                ..Self::default()
            });
        }

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut config: AppConfig = toml::from_str(&text).with_context(|| {
            format!("failed to parse config {} (expected TOML)", path.display())
        })?;
        config.base_dir = base_dir;
        config.engine_config(None).map(|_| config)
    }

    pub fn database_path(&self) -> PathBuf {
        self.resolve(&self.database)
    }

    pub fn assets_path(&self) -> PathBuf {
        self.resolve(&self.assets_dir)
    }

    pub fn resource_root_path(&self) -> PathBuf {
        self.resolve(&self.resource_root)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn engine_config(&self, run_for: Option<Duration>) -> Result<EngineConfig> {
        let idle = TimerSchedule {
            every: Duration::from_millis(self.timing.idle_interval_ms),
            probability: self.timing.idle_probability,
        };
        idle.validate()
            .map_err(anyhow::Error::msg)
            .context("invalid [timing] idle settings")?;
        if !(0.0..=1.0).contains(&self.timing.spawn_probability) {
            anyhow::bail!(
                "invalid [timing] spawn_probability {}: must be within [0, 1]",
                self.timing.spawn_probability
            );
        }

        Ok(EngineConfig {
            work_area: self.work_area,
            idle,
            spawn_probability: self.timing.spawn_probability,
            run_for,
        })
    }
}

pub fn ensure_sample_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).with_context(|| {
            format!(
                "failed to create config parent directory {}",
                parent.display()
            )
        })?;
    }

    let sample = r#"# PRIA configuration (TOML)
#
# Relative paths are resolved against the directory holding this file.

# Document store holding settings, media catalog and user profile.
database = "pria.json"

# Scanned for media on first run. Files under a `standard` directory are
# tagged as standard content; everything else is advanced.
assets_dir = "assets"

# Catalog paths are recorded relative to this directory.
resource_root = "."

[timing]
idle_interval_ms = 2000
spawn_probability = 0.6
idle_probability = 0.5

# Usable area of the primary display, used to place popups.
[work_area]
x = 0
y = 0
width = 1920
height = 1080
"#;

    std::fs::write(path, sample)
        .with_context(|| format!("failed to write sample config {}", path.display()))?;
    Ok(())
}
