//! Media type resolution for book files and cover images.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Supported book formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookFormat {
    /// EPUB format (Electronic Publication).
    Epub,
    /// PDF format (Portable Document Format).
    Pdf,
    /// CBZ format (Comic Book ZIP archive).
    Cbz,
    /// CBR format (Comic Book RAR archive).
    Cbr,
    /// CB7 format (Comic Book 7-Zip archive).
    Cb7,
    /// MOBI format (Mobipocket eBook).
    Mobi,
    /// FB2 format (FictionBook).
    Fb2,
    /// Plain text format.
    Txt,
    /// HTML format.
    Html,
    /// Markdown format.
    Md,
}

impl BookFormat {
    /// Get the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            BookFormat::Epub => "application/epub+zip",
            BookFormat::Pdf => "application/pdf",
            BookFormat::Cbz => "application/vnd.comicbook+zip",
            BookFormat::Cbr => "application/vnd.comicbook-rar",
            BookFormat::Cb7 => "application/x-cb7",
            BookFormat::Mobi => "application/x-mobipocket-ebook",
            BookFormat::Fb2 => "application/x-fictionbook+xml",
            BookFormat::Txt => "text/plain",
            BookFormat::Html => "text/html",
            BookFormat::Md => "text/markdown",
        }
    }

    /// Try to detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "epub" => Some(BookFormat::Epub),
            "pdf" => Some(BookFormat::Pdf),
            "cbz" => Some(BookFormat::Cbz),
            "cbr" => Some(BookFormat::Cbr),
            "cb7" => Some(BookFormat::Cb7),
            "mobi" | "azw" | "azw3" => Some(BookFormat::Mobi),
            "fb2" => Some(BookFormat::Fb2),
            "txt" => Some(BookFormat::Txt),
            "html" | "htm" => Some(BookFormat::Html),
            "md" | "markdown" => Some(BookFormat::Md),
            _ => None,
        }
    }

    /// Detect format from a file path.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

/// Supported cover image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    /// JPEG image.
    Jpeg,
    /// PNG image.
    Png,
    /// GIF image.
    Gif,
    /// WebP image.
    Webp,
}

impl ImageFormat {
    /// Get the MIME type for this image format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Webp => "image/webp",
        }
    }

    /// Canonical file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
            ImageFormat::Webp => "webp",
        }
    }

    /// Try to detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "png" => Some(ImageFormat::Png),
            "gif" => Some(ImageFormat::Gif),
            "webp" => Some(ImageFormat::Webp),
            _ => None,
        }
    }

    /// Detect format from a MIME type such as an EPUB manifest's `media-type`.
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime.trim().to_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
            "image/png" => Some(ImageFormat::Png),
            "image/gif" => Some(ImageFormat::Gif),
            "image/webp" => Some(ImageFormat::Webp),
            _ => None,
        }
    }

    /// Detect format from a file path.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

/// Resolve the media type of a file from its extension.
///
/// Returns `None` for unknown extensions, so callers can omit links
/// rather than advertise an empty type.
pub fn media_type_for_path(path: &Path) -> Option<&'static str> {
    BookFormat::from_path(path)
        .map(|f| f.mime_type())
        .or_else(|| ImageFormat::from_path(path).map(|f| f.mime_type()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_for_known_extensions() {
        assert_eq!(
            media_type_for_path(Path::new("/books/Dune.EPUB")),
            Some("application/epub+zip")
        );
        assert_eq!(
            media_type_for_path(Path::new("/covers/1.jpeg")),
            Some("image/jpeg")
        );
        assert_eq!(
            media_type_for_path(Path::new("/covers/1.webp")),
            Some("image/webp")
        );
    }

    #[test]
    fn test_media_type_for_unknown_extension() {
        assert_eq!(media_type_for_path(Path::new("/books/notes.xyz")), None);
        assert_eq!(media_type_for_path(Path::new("/books/README")), None);
    }

    #[test]
    fn test_image_format_from_mime() {
        assert_eq!(
            ImageFormat::from_mime_type("image/JPEG"),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(ImageFormat::from_mime_type("text/html"), None);
    }
}
