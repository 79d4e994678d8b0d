use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Reads the files that catalog entries point at.
#[async_trait]
pub trait ResourceLoader: Send + Sync {
    /// Trimmed text content of the resource at `path`.
    async fn load_text(&self, path: &str) -> Result<String>;

    /// Native pixel size of an image resource, if it can be determined.
    fn image_size(&self, path: &str) -> Option<(u32, u32)>;
}

/// Resolves catalog paths against a root directory.
#[derive(Debug, Clone)]
pub struct FsResourceLoader {
    root: PathBuf,
}

impl FsResourceLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        }
    }
}

#[async_trait]
impl ResourceLoader for FsResourceLoader {
    async fn load_text(&self, path: &str) -> Result<String> {
        let full_path = self.resolve(path);
        let content = tokio::fs::read_to_string(&full_path)
            .await
            .with_context(|| format!("failed to load media text from {}", full_path.display()))?;
        Ok(content.trim().to_string())
    }

    fn image_size(&self, path: &str) -> Option<(u32, u32)> {
        image::image_dimensions(self.resolve(path)).ok()
    }
}

/// In-memory resources keyed by catalog path.
#[derive(Debug, Clone, Default)]
pub struct MemoryResources {
    texts: HashMap<String, String>,
    images: HashMap<String, (u32, u32)>,
}

impl MemoryResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, path: &str, content: &str) -> Self {
        self.texts.insert(path.to_string(), content.to_string());
        self
    }

    pub fn with_image(mut self, path: &str, width: u32, height: u32) -> Self {
        self.images.insert(path.to_string(), (width, height));
        self
    }
}

#[async_trait]
impl ResourceLoader for MemoryResources {
    async fn load_text(&self, path: &str) -> Result<String> {
        match self.texts.get(path) {
            Some(content) => Ok(content.trim().to_string()),
            None => bail!("no such resource: {path}"),
        }
    }

    fn image_size(&self, path: &str) -> Option<(u32, u32)> {
        self.images.get(path).copied()
    }
}
