use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use crate::shared::frame::Frame;
use crate::video::domain::image_writer::{ImageWriter, WriteError};

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Writes captured frames to image files using the `image` crate.
///
/// The encoding follows the file extension. Each frame is written to a
/// sibling `.part` file first and renamed into place, so folder listings
/// never pick up a half-written snapshot.
pub struct ImageFileWriter {
    jpeg_quality: u8,
}

impl ImageFileWriter {
    pub fn new() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    fn encode(&self, img: &RgbImage, path: &Path) -> Result<(), WriteError> {
        let is_jpeg = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "jpg" | "jpeg"))
            .unwrap_or(false);

        let staging = path.with_extension("part");
        if is_jpeg {
            let mut out = BufWriter::new(File::create(&staging)?);
            JpegEncoder::new_with_quality(&mut out, self.jpeg_quality).encode_image(img)?;
            out.flush()?;
        } else {
            let format = image::ImageFormat::from_path(path)?;
            img.save_with_format(&staging, format)?;
        }
        fs::rename(&staging, path)?;
        Ok(())
    }
}

impl Default for ImageFileWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageWriter for ImageFileWriter {
    fn write(
        &self,
        path: &Path,
        frame: &Frame,
        size: Option<(u32, u32)>,
    ) -> Result<(), WriteError> {
        if frame.is_empty() {
            return Err("cannot write an empty frame".into());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let img = RgbImage::from_raw(frame.width(), frame.height(), frame.pixels().to_vec())
            .ok_or("frame data does not match its dimensions")?;

        let img = match size {
            Some((w, h)) if (w, h) != (img.width(), img.height()) => {
                image::imageops::resize(&img, w, h, image::imageops::FilterType::Triangle)
            }
            _ => img,
        };

        self.encode(&img, path)
    }
}
