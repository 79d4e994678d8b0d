use crate::catalog::{MediaFilter, MediaKind};
use crate::settings::Settings;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    Intensive,
    Standard,
    Advanced,
}

impl Mode {
    /// Intensive wins over standard; neither flag means advanced. No record
    /// at all resolves to standard.
    pub fn resolve(settings: Option<&Settings>) -> Self {
        match settings {
            None => Mode::Standard,
            Some(s) if s.intensive_mode => Mode::Intensive,
            Some(s) if s.standard_mode => Mode::Standard,
            Some(_) => Mode::Advanced,
        }
    }

    pub fn code(self) -> char {
        match self {
            Mode::Intensive => 'I',
            Mode::Standard => 'S',
            Mode::Advanced => 'A',
        }
    }

    pub fn dims_screen(self) -> bool {
        matches!(self, Mode::Intensive)
    }

    /// Catalog filter for popup content.
    pub fn popup_filter(self) -> MediaFilter {
        match self {
            Mode::Intensive => MediaFilter {
                kind: Some(MediaKind::Image),
                standard: Some(false),
            },
            Mode::Advanced => MediaFilter::default(),
            Mode::Standard => MediaFilter {
                kind: None,
                standard: Some(true),
            },
        }
    }

    /// Catalog filter for idle speech lines.
    pub fn idle_filter(self) -> MediaFilter {
        let standard = match self {
            Mode::Intensive => Some(false),
            Mode::Standard => Some(true),
            Mode::Advanced => None,
        };
        MediaFilter {
            kind: Some(MediaKind::Text),
            standard,
        }
    }

    /// Flags that select this mode when written to settings.
    pub fn as_flags(self) -> (bool, bool) {
        match self {
            Mode::Intensive => (true, false),
            Mode::Standard => (false, true),
            Mode::Advanced => (false, false),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Intensive => "intensive",
            Mode::Standard => "standard",
            Mode::Advanced => "advanced",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "i" | "intensive" => Ok(Mode::Intensive),
            "s" | "standard" => Ok(Mode::Standard),
            "a" | "advanced" => Ok(Mode::Advanced),
            other => Err(format!(
                "unknown mode '{other}' (expected intensive, standard or advanced)"
            )),
        }
    }
}
