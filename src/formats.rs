mod cbz;
mod epub;

pub use cbz::CbzHandler;
pub use epub::EpubHandler;

use crate::error::Result;
use crate::media::{BookFormat, ImageFormat};
use std::path::Path;

/// Metadata read from inside a book file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookMetadata {
    /// Title, when the file carries one.
    pub title: Option<String>,
    /// Description or summary.
    pub description: Option<String>,
    /// Publisher name.
    pub publisher: Option<String>,
    /// Language code.
    pub language: Option<String>,
    /// Subjects, used as genres.
    pub subjects: Vec<String>,
}

/// An embedded cover image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverImage {
    /// Image format.
    pub format: ImageFormat,
    /// Raw image bytes.
    pub data: Vec<u8>,
}

/// Trait for format-specific book handlers.
pub trait FormatHandler: Send + Sync {
    /// Extract metadata from a book file.
    fn extract_metadata(&self, path: &Path) -> Result<BookMetadata>;

    /// Extract the embedded cover image, if any.
    fn extract_cover(&self, path: &Path) -> Result<Option<CoverImage>>;
}

/// Get the appropriate handler for a book format.
pub fn get_handler(format: BookFormat) -> Box<dyn FormatHandler> {
    match format {
        BookFormat::Epub => Box::new(EpubHandler),
        BookFormat::Cbz => Box::new(CbzHandler),
        // Everything else is indexed from the filename alone
        _ => Box::new(MinimalHandler),
    }
}

/// Minimal handler for formats without special metadata.
struct MinimalHandler;

impl FormatHandler for MinimalHandler {
    fn extract_metadata(&self, _path: &Path) -> Result<BookMetadata> {
        Ok(BookMetadata::default())
    }

    fn extract_cover(&self, _path: &Path) -> Result<Option<CoverImage>> {
        Ok(None)
    }
}

/// Identify image bytes by their signature, falling back to the file name.
pub fn detect_image_format(data: &[u8], name: &str) -> Option<ImageFormat> {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(ImageFormat::Jpeg)
    } else if data.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some(ImageFormat::Png)
    } else if data.starts_with(b"GIF8") {
        Some(ImageFormat::Gif)
    } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        Some(ImageFormat::Webp)
    } else {
        ImageFormat::from_path(Path::new(name))
    }
}

/// Trimmed text of an element, `None` when empty.
fn node_text(node: roxmltree::Node<'_, '_>) -> Option<String> {
    node.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
}

/// Write a zip archive with the given entries (test fixtures).
#[cfg(test)]
pub(crate) fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    use std::io::Write;

    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    for (name, data) in entries {
        zip.start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_image_format_by_signature() {
        assert_eq!(
            detect_image_format(&[0xFF, 0xD8, 0xFF, 0xE0], "x.bin"),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(
            detect_image_format(b"\x89PNG\r\n\x1a\n", "cover.jpg"),
            Some(ImageFormat::Png)
        );
        assert_eq!(
            detect_image_format(b"RIFF\0\0\0\0WEBPVP8 ", ""),
            Some(ImageFormat::Webp)
        );
    }

    #[test]
    fn test_detect_image_format_falls_back_to_name() {
        assert_eq!(
            detect_image_format(b"????", "images/cover.gif"),
            Some(ImageFormat::Gif)
        );
        assert_eq!(detect_image_format(b"????", "cover.tiff"), None);
    }

    #[test]
    fn test_minimal_handler_for_plain_formats() {
        let handler = get_handler(BookFormat::Pdf);
        let meta = handler
            .extract_metadata(Path::new("/does/not/matter.pdf"))
            .unwrap();
        assert_eq!(meta, BookMetadata::default());
    }
}
