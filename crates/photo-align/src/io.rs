//! File-system image loading and output writing through the `image` crate.

use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use ::image::{DynamicImage, GrayImage, ImageFormat, ImageReader, RgbImage, RgbaImage};
use log::debug;
use photo_align_core::Image;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::pipeline::AlignmentResult;
use crate::project::ImageRecord;
use crate::source::{ImageLoadError, ImageSource};

#[derive(thiserror::Error, Debug)]
pub enum OutputError {
    #[error("cannot create output directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot encode {}: {source}", .path.display())]
    Encode {
        path: PathBuf,
        source: ::image::ImageError,
    },
    #[error("cannot write an image with {0} channel(s)")]
    UnsupportedChannels(usize),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Png,
    Jpeg,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::Jpeg => ImageFormat::Jpeg,
        }
    }
}

/// Convert a decoded image into an 8-bit RGB raster.
pub fn from_dynamic(img: DynamicImage) -> Image {
    let rgb = img.into_rgb8();
    let (w, h) = (rgb.width() as usize, rgb.height() as usize);
    Image {
        width: w,
        height: h,
        channels: 3,
        data: rgb.into_raw(),
    }
}

/// Wrap a raster for encoding. Gray, RGB and RGBA are supported.
pub fn to_dynamic(img: &Image) -> Result<DynamicImage, OutputError> {
    let unsupported = || OutputError::UnsupportedChannels(img.channels);
    let w = u32::try_from(img.width).map_err(|_| unsupported())?;
    let h = u32::try_from(img.height).map_err(|_| unsupported())?;
    let data = img.data.clone();
    let dynamic = match img.channels {
        1 => GrayImage::from_raw(w, h, data).map(DynamicImage::ImageLuma8),
        3 => RgbImage::from_raw(w, h, data).map(DynamicImage::ImageRgb8),
        4 => RgbaImage::from_raw(w, h, data).map(DynamicImage::ImageRgba8),
        _ => None,
    };
    dynamic.ok_or_else(unsupported)
}

/// Decode the image at `path` as RGB.
pub fn load_image(path: impl AsRef<Path>) -> Result<Image, ImageLoadError> {
    let path = path.as_ref();
    let io_err = |source| ImageLoadError::Io {
        path: path.to_path_buf(),
        source,
    };
    let decoded = ImageReader::open(path)
        .map_err(io_err)?
        .with_guessed_format()
        .map_err(io_err)?
        .decode()
        .map_err(|e| ImageLoadError::Decode {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;
    Ok(from_dynamic(decoded))
}

/// Loads project images from disk; relative paths are resolved against
/// `base_dir` (usually the directory of the project file).
#[derive(Clone, Debug, Default)]
pub struct FsImageSource {
    base_dir: PathBuf,
}

impl FsImageSource {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Source rooted at the directory containing `project_file`.
    pub fn for_project_file(project_file: impl AsRef<Path>) -> Self {
        let dir = project_file
            .as_ref()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self::new(dir)
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.base_dir.join(p)
        }
    }
}

impl ImageSource for FsImageSource {
    fn load(&self, record: &ImageRecord) -> Result<Image, ImageLoadError> {
        let path = self.resolve(&record.path);
        debug!("loading {}", path.display());
        load_image(path)
    }
}

/// File name of output `index`: `aligned_000.png`, `aligned_001.png`, ...
pub fn output_file_name(index: usize, format: OutputFormat) -> String {
    format!("aligned_{index:03}.{}", format.extension())
}

/// Write every aligned image into `out_dir`, creating it if needed.
///
/// Each file is encoded into a temporary file in `out_dir` and renamed into
/// place, so readers never see a partially written image.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(n = result.images.len()))
)]
pub fn write_outputs(
    result: &AlignmentResult,
    out_dir: impl AsRef<Path>,
    format: OutputFormat,
) -> Result<Vec<PathBuf>, OutputError> {
    let out_dir = out_dir.as_ref();
    fs::create_dir_all(out_dir).map_err(|source| OutputError::CreateDir {
        path: out_dir.to_path_buf(),
        source,
    })?;

    result
        .images
        .par_iter()
        .enumerate()
        .map(|(i, img)| {
            let path = out_dir.join(output_file_name(i, format));
            write_atomic(img, &path, out_dir, format)?;
            Ok(path)
        })
        .collect()
}

fn write_atomic(
    img: &Image,
    path: &Path,
    dir: &Path,
    format: OutputFormat,
) -> Result<(), OutputError> {
    let write_err = |source| OutputError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dynamic = to_dynamic(img)?;
    let tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    let mut writer = BufWriter::new(tmp);
    dynamic
        .write_to(&mut writer, format.image_format())
        .map_err(|source| OutputError::Encode {
            path: path.to_path_buf(),
            source,
        })?;
    let tmp = writer.into_inner().map_err(|e| write_err(e.into_error()))?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    debug!("wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use photo_align_core::BoundingRect;

    #[test]
    fn output_names_are_numbered() {
        assert_eq!(output_file_name(0, OutputFormat::Png), "aligned_000.png");
        assert_eq!(output_file_name(12, OutputFormat::Jpeg), "aligned_012.jpg");
    }

    #[test]
    fn relative_paths_resolve_against_project_dir() {
        let src = FsImageSource::for_project_file("/data/shoot/project.json");
        assert_eq!(src.resolve("a.png"), PathBuf::from("/data/shoot/a.png"));
        assert_eq!(src.resolve("/abs/b.png"), PathBuf::from("/abs/b.png"));
    }

    #[test]
    fn written_images_decode_back() {
        let dir = tempfile::tempdir().unwrap();
        let img = Image::from_fn(6, 4, 3, |x, y, c| (x * 40 + y * 10 + c) as u8);
        let result = AlignmentResult {
            images: vec![img.clone(), img.clone()],
            bounding: BoundingRect::full(6, 4),
            bounding_history: vec![BoundingRect::full(6, 4)],
            outcomes: Vec::new(),
            dimensions: Vec::new(),
        };
        let out = dir.path().join("out");
        let paths = write_outputs(&result, &out, OutputFormat::Png).unwrap();
        assert_eq!(paths.len(), 2);
        assert_eq!(load_image(&paths[1]).unwrap(), img);
        // only the two outputs, no leftover temporaries
        assert_eq!(fs::read_dir(&out).unwrap().count(), 2);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_image(dir.path().join("nope.png")),
            Err(ImageLoadError::Io { .. })
        ));
    }

    #[test]
    fn two_channel_images_are_rejected() {
        let img = Image::new(2, 2, 2);
        assert!(matches!(
            to_dynamic(&img),
            Err(OutputError::UnsupportedChannels(2))
        ));
    }
}
