use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Image,
    Text,
    Audio,
}

impl MediaKind {
    /// Classify a file by its extension.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let extension = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "webp" => Some(MediaKind::Image),
            "mp3" | "wav" | "ogg" => Some(MediaKind::Audio),
            "txt" | "md" => Some(MediaKind::Text),
            _ => None,
        }
    }
}

/// One catalog entry as stored in the `media` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Type")]
    pub kind: MediaKind,
    #[serde(rename = "Standard")]
    pub standard: bool,
    #[serde(rename = "Path")]
    pub path: String,
}

/// Conjunction of equality constraints; an empty filter matches everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaFilter {
    pub kind: Option<MediaKind>,
    pub standard: Option<bool>,
}

impl MediaFilter {
    pub fn matches(&self, item: &MediaItem) -> bool {
        self.kind.is_none_or(|kind| item.kind == kind)
            && self.standard.is_none_or(|standard| item.standard == standard)
    }
}

pub trait MediaCatalog: Send + Sync {
    fn find(&self, filter: &MediaFilter) -> Result<Vec<MediaItem>, StoreError>;
}

/// A fixed in-memory catalog.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    items: Vec<MediaItem>,
}

impl StaticCatalog {
    pub fn new(items: Vec<MediaItem>) -> Self {
        Self { items }
    }
}

impl MediaCatalog for StaticCatalog {
    fn find(&self, filter: &MediaFilter) -> Result<Vec<MediaItem>, StoreError> {
        Ok(filter_items(&self.items, filter))
    }
}

pub(crate) fn filter_items(items: &[MediaItem], filter: &MediaFilter) -> Vec<MediaItem> {
    items
        .iter()
        .filter(|item| filter.matches(item))
        .cloned()
        .collect()
}

/// Walk `root` and build catalog entries for every recognised media file.
///
/// Paths are recorded relative to `resource_base` with forward slashes. A
/// file counts as standard content when any directory on its path is named
/// `standard`.
pub fn scan_assets(root: &Path, resource_base: &Path) -> Vec<MediaItem> {
    let mut results = Vec::new();
    walk(root, resource_base, &mut results);
    results.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(root = %root.display(), count = results.len(), "scanned media assets");
    results
}

fn walk(dir: &Path, resource_base: &Path, results: &mut Vec<MediaItem>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(dir = %dir.display(), error = %err, "failed to read media directory");
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            walk(&path, resource_base, results);
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(kind) = MediaKind::from_file_name(&name) else {
            continue;
        };

        let relative = path.strip_prefix(resource_base).unwrap_or(path.as_path());
        results.push(MediaItem {
            standard: in_standard_dir(relative),
            path: to_resource_path(relative),
            id: name,
            kind,
        });
    }
}

fn in_standard_dir(path: &Path) -> bool {
    let Some(parent) = path.parent() else {
        return false;
    };
    parent.components().any(|component| match component {
        Component::Normal(part) => part.to_string_lossy().eq_ignore_ascii_case("standard"),
        _ => false,
    })
}

fn to_resource_path(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::RootDir => Some(String::new()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
