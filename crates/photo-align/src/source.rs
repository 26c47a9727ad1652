use std::collections::HashMap;
use std::path::PathBuf;

use photo_align_core::Image;

use crate::project::ImageRecord;

#[derive(thiserror::Error, Debug)]
pub enum ImageLoadError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{}: cannot decode image: {source}", .path.display())]
    Decode {
        path: PathBuf,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("{}: no such image", .path.display())]
    NotFound { path: PathBuf },
}

/// Provides the pixels of project images to the pipeline.
///
/// Implementations are shared across worker threads.
pub trait ImageSource: Sync {
    fn load(&self, record: &ImageRecord) -> Result<Image, ImageLoadError>;
}

/// Images held in memory, keyed by project path.
#[derive(Clone, Debug, Default)]
pub struct MemoryImageSource {
    images: HashMap<String, Image>,
}

impl MemoryImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, image: Image) -> Option<Image> {
        self.images.insert(path.into(), image)
    }

    pub fn with(mut self, path: impl Into<String>, image: Image) -> Self {
        self.insert(path, image);
        self
    }
}

impl ImageSource for MemoryImageSource {
    fn load(&self, record: &ImageRecord) -> Result<Image, ImageLoadError> {
        self.images
            .get(&record.path)
            .cloned()
            .ok_or_else(|| ImageLoadError::NotFound {
                path: PathBuf::from(&record.path),
            })
    }
}
