//! Image loading seam.
//!
//! Board construction only needs pixel dimensions: the background image
//! determines the grid size and token images must merely exist. Loading
//! suspends, so the trait is async; everything after it is synchronous.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures_util::future::try_join_all;

use crate::error::ImageLoadError;

/// Prefix marking an image stored by the board server.
pub const SERVER_PREFIX: &str = "server@";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedImage {
    pub source: String,
    pub width: u32,
    pub height: u32,
}

impl LoadedImage {
    pub fn new(source: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            source: source.into(),
            width,
            height,
        }
    }
}

#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn load(&self, source: &str) -> Result<LoadedImage, ImageLoadError>;
}

/// Loads images from a local directory, the way the board server stores
/// uploads: `server@/retrieve_image/cave.png` resolves to `<root>/cave.png`.
#[derive(Debug, Clone)]
pub struct FsImageLoader {
    root: PathBuf,
}

impl FsImageLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path on disk for `source`, or `None` when it names no file.
    pub fn resolve(&self, source: &str) -> Option<PathBuf> {
        let key = source.strip_prefix(SERVER_PREFIX).unwrap_or(source);
        let file_name = Path::new(key).file_name()?;
        Some(self.root.join(file_name))
    }
}

#[async_trait]
impl ImageLoader for FsImageLoader {
    async fn load(&self, source: &str) -> Result<LoadedImage, ImageLoadError> {
        let path = self
            .resolve(source)
            .ok_or_else(|| ImageLoadError::new(source, "no file name in source"))?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| ImageLoadError::new(source, format!("{}: {e}", path.display())))?;

        let (width, height) = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| ImageLoadError::new(source, e.to_string()))?
            .into_dimensions()
            .map_err(|e| ImageLoadError::new(source, e.to_string()))?;

        log::trace!("Loaded {} ({}x{})", source, width, height);
        Ok(LoadedImage::new(source, width, height))
    }
}

/// Fixed table of image dimensions, for headless clients and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticImageLoader {
    images: HashMap<String, (u32, u32)>,
}

impl StaticImageLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, source: impl Into<String>, width: u32, height: u32) -> Self {
        self.images.insert(source.into(), (width, height));
        self
    }
}

#[async_trait]
impl ImageLoader for StaticImageLoader {
    async fn load(&self, source: &str) -> Result<LoadedImage, ImageLoadError> {
        self.images
            .get(source)
            .map(|&(width, height)| LoadedImage::new(source, width, height))
            .ok_or_else(|| ImageLoadError::new(source, "unknown image"))
    }
}

/// Load every distinct source concurrently. Fails on the first error.
pub async fn load_images<'a, I>(
    loader: &dyn ImageLoader,
    sources: I,
) -> Result<HashMap<String, LoadedImage>, ImageLoadError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut distinct: Vec<&str> = sources.into_iter().collect();
    distinct.sort_unstable();
    distinct.dedup();

    let loaded = try_join_all(distinct.into_iter().map(|source| loader.load(source))).await?;
    Ok(loaded
        .into_iter()
        .map(|image| (image.source.clone(), image))
        .collect())
}
