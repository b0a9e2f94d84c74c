//! Derived-image generation for freshly uploaded photos.
//!
//! Two copies are produced from the original upload:
//! - the "cropped" copy: the image re-encoded at maximum quality in the
//!   format named by its own file extension. Dimensions are left untouched;
//!   despite the name no cropping happens.
//! - the alternate copy: the same pixels encoded as WebP, with the file
//!   extension rewritten to `.webp`.
//!
//! Everything here is CPU bound and synchronous; async callers should run it
//! through `spawn_blocking`.

use image::{
    DynamicImage, ImageError, ImageFormat,
    codecs::{jpeg::JpegEncoder, webp::WebPEncoder},
};
use std::{io::Cursor, path::Path};
use thiserror::Error;

/// Extension given to the alternate-format copy.
pub const ALTERNATE_EXTENSION: &str = "webp";

/// Quality used wherever an encoder takes one.
const MAX_QUALITY: u8 = 100;

/// Extension tokens that differ from the encoder name they stand for.
const FORMAT_NAME_OVERRIDES: &[(&str, &str)] = &[("JPG", "JPEG"), ("TIF", "TIFF")];

#[derive(Debug, Error)]
pub enum ImagingError {
    #[error("file name `{0}` has no extension")]
    MissingExtension(String),
    #[error("image format `{0}` is not supported")]
    UnsupportedFormat(String),
    #[error("upload is not a readable image: {0}")]
    Decode(#[source] ImageError),
    #[error("failed to encode {format} image: {source}")]
    Encode {
        format: &'static str,
        #[source]
        source: ImageError,
    },
}

/// The two derived blobs for one upload.
#[derive(Debug, Clone)]
pub struct DerivedImages {
    pub cropped: Vec<u8>,
    pub alternate: Vec<u8>,
    /// File name for `alternate`, e.g. `sunset.webp` for `sunset.jpg`.
    pub alternate_name: String,
}

/// Decode `original` and build its derived copies.
///
/// The target format of the cropped copy comes from `filename`'s extension,
/// so an unknown extension is rejected even when the bytes decode fine.
pub fn generate(original: &[u8], filename: &str) -> Result<DerivedImages, ImagingError> {
    let format_name = format_name_for(filename)?;
    let format = encoder_format(&format_name)
        .ok_or_else(|| ImagingError::UnsupportedFormat(format_name.clone()))?;

    let image = image::load_from_memory(original).map_err(ImagingError::Decode)?;

    let cropped = encode(&image, format)?;
    let alternate = encode(&image, ImageFormat::WebP)?;

    Ok(DerivedImages {
        cropped,
        alternate,
        alternate_name: change_extension(filename, ALTERNATE_EXTENSION),
    })
}

/// Uppercased extension of `filename`, passed through the override table.
pub fn format_name_for(filename: &str) -> Result<String, ImagingError> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ImagingError::MissingExtension(filename.to_string()))?
        .to_ascii_uppercase();

    let name = FORMAT_NAME_OVERRIDES
        .iter()
        .find(|(token, _)| *token == ext)
        .map(|(_, encoder)| (*encoder).to_string())
        .unwrap_or(ext);

    Ok(name)
}

fn encoder_format(name: &str) -> Option<ImageFormat> {
    match name {
        "JPEG" => Some(ImageFormat::Jpeg),
        "PNG" => Some(ImageFormat::Png),
        "GIF" => Some(ImageFormat::Gif),
        "BMP" => Some(ImageFormat::Bmp),
        "TIFF" => Some(ImageFormat::Tiff),
        "WEBP" => Some(ImageFormat::WebP),
        _ => None,
    }
}

/// Replace (or add) the extension of `filename`.
pub fn change_extension(filename: &str, extension: &str) -> String {
    Path::new(filename)
        .with_extension(extension)
        .to_string_lossy()
        .into_owned()
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, ImagingError> {
    let label = format.extensions_str().first().copied().unwrap_or("image");
    let mut out = Cursor::new(Vec::new());

    let result = match format {
        ImageFormat::Jpeg => {
            // JPEG has no alpha channel.
            let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, MAX_QUALITY))
        }
        ImageFormat::WebP => {
            // The bundled WebP encoder is lossless, which is as good as it gets.
            let normalized = if image.color().has_alpha() {
                DynamicImage::ImageRgba8(image.to_rgba8())
            } else {
                DynamicImage::ImageRgb8(image.to_rgb8())
            };
            normalized.write_with_encoder(WebPEncoder::new_lossless(&mut out))
        }
        other => image.write_to(&mut out, other),
    };

    result.map_err(|source| ImagingError::Encode {
        format: label,
        source,
    })?;

    Ok(out.into_inner())
}
