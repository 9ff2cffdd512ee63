//! Input classification: file extension → [`InputKind`] → [`Strategy`].
//!
//! Classification looks only at the extension, case-insensitively. Content
//! sniffing is deliberately absent: an upload named `.pdf` is trusted as a
//! PDF, and an upload named `.png` is decoded as PNG (failing loudly if it
//! is not). Admission policy lives upstream in the upload layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Raster formats admitted under [`InputKind::Image`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Bmp,
}

/// What an uploaded file is, as far as conversion is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Image(ImageFormat),
    Text,
    Office,
    Pdf,
    Unsupported,
}

/// The four conversion procedures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    ImageEmbed,
    TextLayout,
    OfficeDelegate,
    PassthroughCopy,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Strategy::ImageEmbed => "image-embed",
            Strategy::TextLayout => "text-layout",
            Strategy::OfficeDelegate => "office-delegate",
            Strategy::PassthroughCopy => "passthrough-copy",
        })
    }
}

impl InputKind {
    /// Classify a lowercase or mixed-case extension, with or without the dot.
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        match ext.as_str() {
            "png" => InputKind::Image(ImageFormat::Png),
            "jpg" | "jpeg" => InputKind::Image(ImageFormat::Jpeg),
            "gif" => InputKind::Image(ImageFormat::Gif),
            "bmp" => InputKind::Image(ImageFormat::Bmp),
            "txt" => InputKind::Text,
            "doc" | "docx" | "xls" | "xlsx" | "ppt" | "pptx" => InputKind::Office,
            "pdf" => InputKind::Pdf,
            _ => InputKind::Unsupported,
        }
    }

    /// The one strategy responsible for this kind; `None` for unsupported.
    ///
    /// Adding a kind without deciding its strategy fails to compile.
    pub fn strategy(self) -> Option<Strategy> {
        match self {
            InputKind::Image(_) => Some(Strategy::ImageEmbed),
            InputKind::Text => Some(Strategy::TextLayout),
            InputKind::Office => Some(Strategy::OfficeDelegate),
            InputKind::Pdf => Some(Strategy::PassthroughCopy),
            InputKind::Unsupported => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            InputKind::Image(_) => "image",
            InputKind::Text => "text",
            InputKind::Office => "office",
            InputKind::Pdf => "pdf",
            InputKind::Unsupported => "unsupported",
        }
    }
}

/// Lowercased extension of `path` including the leading dot, or `""`.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_ascii_lowercase()))
        .unwrap_or_default()
}

/// Classify a path by its extension.
pub fn classify(path: &Path) -> InputKind {
    InputKind::from_extension(&extension_of(path))
}
