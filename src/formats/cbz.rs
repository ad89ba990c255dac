//! CBZ (Comic Book ZIP) format handler.

use crate::error::Result;
use crate::formats::{BookMetadata, CoverImage, FormatHandler, detect_image_format, node_text};
use crate::media::ImageFormat;
use roxmltree::Document;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

/// Handler for CBZ files.
pub struct CbzHandler;

impl CbzHandler {
    /// Get sorted list of page images in archive.
    fn get_image_files(archive: &ZipArchive<File>) -> Vec<String> {
        let mut images: Vec<String> = archive
            .file_names()
            .filter(|name| ImageFormat::from_path(Path::new(name)).is_some())
            .filter(|name| !name.contains("__MACOSX")) // Skip macOS metadata
            .map(String::from)
            .collect();

        // Sort naturally (so page2 comes before page10)
        images.sort_by(|a, b| natord_compare(a, b));

        images
    }

    /// Parse a ComicInfo.xml document.
    fn parse_comic_info(content: &str) -> Result<BookMetadata> {
        let doc = Document::parse(content)?;
        let mut meta = BookMetadata::default();

        for node in doc.root_element().children().filter(|n| n.is_element()) {
            match node.tag_name().name() {
                "Title" => meta.title = node_text(node),
                "Summary" => meta.description = node_text(node),
                "Publisher" => meta.publisher = node_text(node),
                "LanguageISO" => meta.language = node_text(node),
                "Genre" => {
                    if let Some(genres) = node_text(node) {
                        meta.subjects.extend(
                            genres
                                .split(',')
                                .map(str::trim)
                                .filter(|g| !g.is_empty())
                                .map(String::from),
                        );
                    }
                }
                _ => {}
            }
        }

        Ok(meta)
    }
}

impl FormatHandler for CbzHandler {
    fn extract_metadata(&self, path: &Path) -> Result<BookMetadata> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file)?;

        let Some(name) = archive
            .file_names()
            .find(|n| n.eq_ignore_ascii_case("ComicInfo.xml"))
            .map(String::from)
        else {
            return Ok(BookMetadata::default());
        };

        let mut content = String::new();
        archive.by_name(&name)?.read_to_string(&mut content)?;
        Self::parse_comic_info(&content)
    }

    fn extract_cover(&self, path: &Path) -> Result<Option<CoverImage>> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file)?;

        let images = Self::get_image_files(&archive);
        let first_image = match images.first() {
            Some(name) => name,
            None => return Ok(None),
        };

        let mut data = Vec::new();
        archive.by_name(first_image)?.read_to_end(&mut data)?;

        Ok(detect_image_format(&data, first_image).map(|format| CoverImage { format, data }))
    }
}

/// Natural string comparison for sorting.
fn natord_compare(a: &str, b: &str) -> std::cmp::Ordering {
    let mut a_chars = a.chars().peekable();
    let mut b_chars = b.chars().peekable();

    loop {
        match (a_chars.peek(), b_chars.peek()) {
            (None, None) => return std::cmp::Ordering::Equal,
            (None, Some(_)) => return std::cmp::Ordering::Less,
            (Some(_), None) => return std::cmp::Ordering::Greater,
            (Some(&ac), Some(&bc)) => {
                if ac.is_ascii_digit() && bc.is_ascii_digit() {
                    let a_num = take_number(&mut a_chars);
                    let b_num = take_number(&mut b_chars);

                    match a_num.cmp(&b_num) {
                        std::cmp::Ordering::Equal => continue,
                        other => return other,
                    }
                } else {
                    a_chars.next();
                    b_chars.next();

                    match ac.to_lowercase().cmp(bc.to_lowercase()) {
                        std::cmp::Ordering::Equal => continue,
                        other => return other,
                    }
                }
            }
        }
    }
}

/// Consume a run of ASCII digits, leaving the next character in place.
fn take_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> u64 {
    let mut value: u64 = 0;
    while let Some(digit) = chars.peek().and_then(|c| c.to_digit(10)) {
        value = value.saturating_mul(10).saturating_add(u64::from(digit));
        chars.next();
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::write_zip;

    #[test]
    fn test_natord_compare() {
        assert_eq!(natord_compare("page1", "page2"), std::cmp::Ordering::Less);
        assert_eq!(natord_compare("page2", "page10"), std::cmp::Ordering::Less);
        assert_eq!(
            natord_compare("page10", "page2"),
            std::cmp::Ordering::Greater
        );
        assert_eq!(natord_compare("p2a", "p2b"), std::cmp::Ordering::Less);
    }

    #[test]
    fn test_parse_comic_info() {
        let xml = r#"<?xml version="1.0"?>
<ComicInfo>
  <Title>The Long Halloween</Title>
  <Summary>A year of murders.</Summary>
  <Publisher>DC</Publisher>
  <Genre>Crime, Superhero,</Genre>
  <LanguageISO>en</LanguageISO>
</ComicInfo>"#;
        let meta = CbzHandler::parse_comic_info(xml).unwrap();
        assert_eq!(meta.title.as_deref(), Some("The Long Halloween"));
        assert_eq!(meta.description.as_deref(), Some("A year of murders."));
        assert_eq!(meta.publisher.as_deref(), Some("DC"));
        assert_eq!(meta.language.as_deref(), Some("en"));
        assert_eq!(meta.subjects, vec!["Crime", "Superhero"]);
    }

    #[test]
    fn test_first_page_is_cover() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("issue.cbz");
        let png = b"\x89PNG\r\n\x1a\n-page1";
        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0];
        write_zip(
            &path,
            &[
                ("page10.jpg", &jpeg[..]),
                ("__MACOSX/page0.png", &png[..]),
                ("page1.png", &png[..]),
                ("notes.txt", &b"hello"[..]),
            ],
        );

        let cover = CbzHandler.extract_cover(&path).unwrap().unwrap();
        assert_eq!(cover.format, ImageFormat::Png);
        assert_eq!(cover.data, png.to_vec());

        // No ComicInfo.xml: nothing beyond the filename is known
        let meta = CbzHandler.extract_metadata(&path).unwrap();
        assert_eq!(meta, BookMetadata::default());
    }

    #[test]
    fn test_archive_without_images_has_no_cover() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.cbz");
        write_zip(&path, &[("readme.txt", &b"nothing"[..])]);

        assert!(CbzHandler.extract_cover(&path).unwrap().is_none());
    }
}
