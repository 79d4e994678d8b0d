//! Decides what the pet shows: popup content and idle speech lines.

use crate::catalog::{MediaCatalog, MediaItem, MediaKind};
use crate::mode::Mode;
use crate::random::RandomSource;
use crate::resources::ResourceLoader;
use crate::store::{SettingsStore, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_MESSAGES: [&str; 7] = [
    "Warning: Unauthorized content detected.",
    "Access violation in progress.",
    "Filtering prohibited material...",
    "PRIA is monitoring your activity.",
    "Content blocked by PRIA protocol.",
    "System anomaly detected.",
    "Your actions are being observed.",
];

/// Spoken when the pet itself is poked.
pub const POKE_LINE: &str = "Unauthorized physical contact.";

const EXPLICIT_IMAGE_PROBABILITY: f64 = 0.5;

/// Content for a single popup. At least one field is always set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupDecision {
    pub text: Option<String>,
    pub image: Option<String>,
}

pub fn default_message(rng: &mut dyn RandomSource) -> String {
    DEFAULT_MESSAGES[rng.index(DEFAULT_MESSAGES.len())].to_string()
}

#[derive(Clone)]
pub struct PopupPolicy {
    settings: Arc<dyn SettingsStore>,
    catalog: Arc<dyn MediaCatalog>,
    loader: Arc<dyn ResourceLoader>,
}

impl PopupPolicy {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        catalog: Arc<dyn MediaCatalog>,
        loader: Arc<dyn ResourceLoader>,
    ) -> Self {
        Self {
            settings,
            catalog,
            loader,
        }
    }

    pub fn loader(&self) -> &Arc<dyn ResourceLoader> {
        &self.loader
    }

    pub fn current_mode(&self) -> Result<Mode, StoreError> {
        let settings = self.settings.get_settings()?;
        Ok(Mode::resolve(settings.as_ref()))
    }

    pub fn eligible_media(&self, mode: Mode) -> Result<Vec<MediaItem>, StoreError> {
        self.catalog.find(&mode.popup_filter())
    }

    /// Choose popup content for the current mode. Returns `None` only when the
    /// settings store or catalog cannot be read.
    pub async fn decide_popup(
        &self,
        explicit_message: Option<&str>,
        rng: &mut (dyn RandomSource + '_),
    ) -> Option<PopupDecision> {
        let mode = match self.current_mode() {
            Ok(mode) => mode,
            Err(err) => {
                warn!(error = %err, "settings unavailable, skipping popup");
                return None;
            }
        };
        let eligible = match self.eligible_media(mode) {
            Ok(items) => items,
            Err(err) => {
                warn!(error = %err, "media catalog unavailable, skipping popup");
                return None;
            }
        };

        let pick = if eligible.is_empty() {
            None
        } else {
            Some(&eligible[rng.index(eligible.len())])
        };
        debug!(%mode, eligible = eligible.len(), pick = ?pick.map(|item| &item.id), "popup media picked");

        Some(self.resolve_popup(explicit_message, pick, rng).await)
    }

    /// Turn a picked catalog item (or none) into popup content.
    pub async fn resolve_popup(
        &self,
        explicit_message: Option<&str>,
        pick: Option<&MediaItem>,
        rng: &mut (dyn RandomSource + '_),
    ) -> PopupDecision {
        let explicit = explicit_message.filter(|message| !message.is_empty());
        let mut text = explicit.map(str::to_string);
        let mut image = None;

        match (explicit, pick) {
            (Some(_), pick) => {
                if rng.chance(EXPLICIT_IMAGE_PROBABILITY)
                    && let Some(item) = pick
                    && item.kind == MediaKind::Image
                {
                    image = Some(item.path.clone());
                }
            }
            (None, Some(item)) if item.kind == MediaKind::Text => {
                text = match self.loader.load_text(&item.path).await {
                    Ok(content) if !content.is_empty() => Some(content),
                    Ok(_) => Some(default_message(rng)),
                    Err(err) => {
                        warn!(path = %item.path, error = %err, "failed to read text media");
                        Some(default_message(rng))
                    }
                };
            }
            (None, Some(item)) if item.kind == MediaKind::Image => {
                image = Some(item.path.clone());
            }
            (None, _) => text = Some(default_message(rng)),
        }

        if text.is_none() && image.is_none() {
            text = Some(default_message(rng));
        }

        PopupDecision { text, image }
    }

    /// Every non-empty idle line available in the current mode.
    pub async fn idle_lines(&self) -> Vec<String> {
        let mode = match self.current_mode() {
            Ok(mode) => mode,
            Err(err) => {
                warn!(error = %err, "settings unavailable, no idle lines");
                return Vec::new();
            }
        };
        let eligible = match self.catalog.find(&mode.idle_filter()) {
            Ok(items) => items,
            Err(err) => {
                warn!(error = %err, "media catalog unavailable, no idle lines");
                return Vec::new();
            }
        };

        let mut lines = Vec::with_capacity(eligible.len());
        for item in &eligible {
            match self.loader.load_text(&item.path).await {
                Ok(line) if !line.is_empty() => lines.push(line),
                Ok(_) => {}
                Err(err) => debug!(path = %item.path, error = %err, "skipping unreadable idle line"),
            }
        }
        lines
    }

    /// One random idle line, or `None` when the pool is empty.
    pub async fn pick_idle_line(&self, rng: &mut (dyn RandomSource + '_)) -> Option<String> {
        let mut lines = self.idle_lines().await;
        if lines.is_empty() {
            return None;
        }
        let index = rng.index(lines.len());
        Some(lines.swap_remove(index))
    }
}
