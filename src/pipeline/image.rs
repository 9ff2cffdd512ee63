//! Image embedding: one PNG or JPEG → a one-page PDF of exactly its size.
//!
//! The page's MediaBox is the image's pixel dimensions and the image is
//! drawn full-bleed at the origin. JPEG data is embedded as-is under
//! `DCTDecode`; PNG data is decoded to 8-bit samples and re-compressed with
//! zlib, with any alpha channel carried as a soft mask.

use crate::error::StrategyError;
use crate::pipeline::classify::{classify, extension_of, ImageFormat, InputKind};
use crate::pipeline::pdf::{op_int, PdfBuilder};
use crate::store;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::{DynamicImage, ImageDecoder};
use lopdf::content::Operation;
use lopdf::{dictionary, Dictionary, Object, Stream};
use std::io::{Cursor, Write};
use std::path::Path;
use tracing::debug;

const IMAGE_RESOURCE: &str = "Im0";

/// The two formats the embedder understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Codec {
    Png,
    Jpeg,
}

impl Codec {
    fn name(self) -> &'static str {
        match self {
            Codec::Png => "PNG",
            Codec::Jpeg => "JPEG",
        }
    }
}

/// Pick the codec for `input`, rejecting everything but PNG and JPEG.
fn codec_for(input: &Path) -> Result<Codec, StrategyError> {
    match classify(input) {
        InputKind::Image(ImageFormat::Png) => Ok(Codec::Png),
        InputKind::Image(ImageFormat::Jpeg) => Ok(Codec::Jpeg),
        _ => Err(StrategyError::UnsupportedImageFormat {
            format: extension_of(input),
        }),
    }
}

/// An image XObject ready to be placed, plus its optional soft mask.
struct EmbeddedImage {
    width: u32,
    height: u32,
    dict: Dictionary,
    data: Vec<u8>,
    soft_mask: Option<Stream>,
}

fn decode_failure(codec: Codec, detail: impl ToString) -> StrategyError {
    StrategyError::DecodeFailure {
        format: codec.name().to_string(),
        detail: detail.to_string(),
    }
}

fn deflate(samples: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(samples)?;
    encoder.finish()
}

fn image_dict(width: u32, height: u32, color_space: &str, filter: &str) -> Dictionary {
    dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => Object::Integer(width as i64),
        "Height" => Object::Integer(height as i64),
        "ColorSpace" => color_space,
        "BitsPerComponent" => Object::Integer(8),
        "Filter" => filter,
    }
}

/// Split interleaved `channels`-wide pixels into colour samples and alpha.
fn split_alpha(raw: &[u8], channels: usize) -> (Vec<u8>, Vec<u8>) {
    let pixels = raw.len() / channels;
    let mut color = Vec::with_capacity(pixels * (channels - 1));
    let mut alpha = Vec::with_capacity(pixels);
    for px in raw.chunks_exact(channels) {
        color.extend_from_slice(&px[..channels - 1]);
        alpha.push(px[channels - 1]);
    }
    (color, alpha)
}

fn embed_png(bytes: &[u8], output: &Path) -> Result<EmbeddedImage, StrategyError> {
    let img = image::load_from_memory_with_format(bytes, image::ImageFormat::Png)
        .map_err(|e| decode_failure(Codec::Png, e))?;
    let (width, height) = (img.width(), img.height());

    let (color_space, samples, alpha) = match &img {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageLuma16(_) => {
            ("DeviceGray", img.to_luma8().into_raw(), None)
        }
        DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLumaA16(_) => {
            let (gray, alpha) = split_alpha(&img.to_luma_alpha8().into_raw(), 2);
            ("DeviceGray", gray, Some(alpha))
        }
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgb16(_) => {
            ("DeviceRGB", img.to_rgb8().into_raw(), None)
        }
        _ => {
            let (rgb, alpha) = split_alpha(&img.to_rgba8().into_raw(), 4);
            ("DeviceRGB", rgb, Some(alpha))
        }
    };

    let compress = |data: &[u8]| {
        deflate(data).map_err(|e| StrategyError::io("Failed to compress image", output, e))
    };

    let soft_mask = match alpha {
        Some(alpha) => Some(Stream::new(
            image_dict(width, height, "DeviceGray", "FlateDecode"),
            compress(&alpha)?,
        )),
        None => None,
    };

    Ok(EmbeddedImage {
        width,
        height,
        dict: image_dict(width, height, color_space, "FlateDecode"),
        data: compress(&samples)?,
        soft_mask,
    })
}

/// Colour component count from the first start-of-frame marker.
fn jpeg_components(bytes: &[u8]) -> Option<u8> {
    let mut i = 2;
    while i + 4 <= bytes.len() {
        if bytes[i] != 0xFF {
            return None;
        }
        let marker = bytes[i + 1];
        if marker == 0xFF {
            i += 1;
            continue;
        }
        let len = u16::from_be_bytes([bytes[i + 2], bytes[i + 3]]) as usize;
        let is_sof = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            // FF Cx len(2) precision(1) height(2) width(2) components(1)
            return bytes.get(i + 9).copied();
        }
        i += 2 + len;
    }
    None
}

fn embed_jpeg(bytes: &[u8]) -> Result<EmbeddedImage, StrategyError> {
    let decoder = image::codecs::jpeg::JpegDecoder::new(Cursor::new(bytes))
        .map_err(|e| decode_failure(Codec::Jpeg, e))?;
    let (width, height) = decoder.dimensions();

    let dict = match jpeg_components(bytes) {
        Some(1) => image_dict(width, height, "DeviceGray", "DCTDecode"),
        Some(4) => {
            let mut d = image_dict(width, height, "DeviceCMYK", "DCTDecode");
            // Adobe CMYK JPEGs store inverted samples.
            d.set(
                "Decode",
                (0..4)
                    .flat_map(|_| [Object::Integer(1), Object::Integer(0)])
                    .collect::<Vec<_>>(),
            );
            d
        }
        _ => image_dict(width, height, "DeviceRGB", "DCTDecode"),
    };

    Ok(EmbeddedImage {
        width,
        height,
        dict,
        data: bytes.to_vec(),
        soft_mask: None,
    })
}

fn render(image: EmbeddedImage) -> std::io::Result<Vec<u8>> {
    let mut builder = PdfBuilder::new();
    let (w, h) = (image.width as i64, image.height as i64);

    let mut dict = image.dict;
    if let Some(mask) = image.soft_mask {
        let mask_id = builder.add_object(mask.with_compression(false));
        dict.set("SMask", mask_id);
    }
    // Already-encoded data: stop lopdf from compressing it a second time.
    let stream = Stream::new(dict, image.data).with_compression(false);
    let image_id = builder.add_object(stream);

    let resources = dictionary! {
        "XObject" => dictionary! { IMAGE_RESOURCE => image_id },
    };
    let ops = vec![
        Operation::new("q", vec![]),
        op_int("cm", &[w, 0, 0, h, 0, 0]),
        Operation::new("Do", vec![IMAGE_RESOURCE.into()]),
        Operation::new("Q", vec![]),
    ];
    builder.add_page(w, h, resources, ops)?;
    builder.finish()
}

/// Image strategy: embed `input` on a single page sized to the image.
///
/// GIF and BMP fail with [`StrategyError::UnsupportedImageFormat`] before the
/// file is read.
pub fn embed_image(input: &Path, output: &Path) -> Result<(), StrategyError> {
    let codec = codec_for(input)?;
    let bytes = std::fs::read(input)
        .map_err(|e| StrategyError::io("Failed to read input", input, e))?;

    let image = match codec {
        Codec::Png => embed_png(&bytes, output)?,
        Codec::Jpeg => embed_jpeg(&bytes)?,
    };
    debug!(
        "Embedding {}×{} {} from {}",
        image.width,
        image.height,
        codec.name(),
        input.display()
    );

    let pdf = render(image).map_err(|e| StrategyError::io("Failed to build PDF", output, e))?;
    store::persist_bytes(output, &pdf)
}
