use serde::{Deserialize, Deserializer, Serialize};

pub const DEFAULT_VOLUME: u32 = 100;
pub const DEFAULT_INTENSITY: u32 = 2;
pub const DEFAULT_POPUPS: u8 = 2;
pub const FALLBACK_NAME: &str = "USERNAME";

/// The persisted settings record. Field names match the stored document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Settings {
    #[serde(default)]
    pub volume: u32,
    #[serde(default)]
    pub intensity: u32,
    #[serde(
        default,
        deserialize_with = "lenient_frequency",
        skip_serializing_if = "Option::is_none"
    )]
    pub popups: Option<u8>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub standard_mode: bool,
    #[serde(default)]
    pub intensive_mode: bool,
}

impl Settings {
    /// Record written on first run.
    pub fn first_run(name: impl Into<String>) -> Self {
        Self {
            volume: DEFAULT_VOLUME,
            intensity: DEFAULT_INTENSITY,
            popups: Some(DEFAULT_POPUPS),
            name: name.into(),
            standard_mode: true,
            intensive_mode: false,
        }
    }

    /// Merge `patch` onto this record; absent fields stay untouched.
    pub fn apply(&mut self, patch: &SettingsPatch) {
        if let Some(volume) = patch.volume {
            self.volume = volume;
        }
        if let Some(intensity) = patch.intensity {
            self.intensity = intensity;
        }
        if let Some(popups) = patch.popups {
            self.popups = Some(popups);
        }
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(standard_mode) = patch.standard_mode {
            self.standard_mode = standard_mode;
        }
        if let Some(intensive_mode) = patch.intensive_mode {
            self.intensive_mode = intensive_mode;
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::first_run(FALLBACK_NAME)
    }
}

/// A partial settings update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub popups: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensive_mode: Option<bool>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Stored frequencies come from other writers too; anything that is not a
/// small non-negative integer reads as unset.
fn lenient_frequency<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(serde_json::Value::as_u64)
        .and_then(|n| u8::try_from(n).ok()))
}

/// Name of the current OS user, falling back to a placeholder.
pub fn current_user_name() -> String {
    ["USER", "USERNAME", "LOGNAME"]
        .iter()
        .find_map(|key| std::env::var(key).ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_NAME.to_string())
}
