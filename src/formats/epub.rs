//! EPUB format handler.

use crate::error::{AppError, Result};
use crate::formats::{BookMetadata, CoverImage, FormatHandler, detect_image_format, node_text};
use crate::media::ImageFormat;
use roxmltree::Document;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

/// Handler for EPUB files.
pub struct EpubHandler;

/// Manifest entry of the cover image.
struct CoverRef {
    href: String,
    media_type: Option<String>,
}

impl EpubHandler {
    /// Find the OPF file path from container.xml.
    fn find_opf_path(archive: &mut ZipArchive<File>) -> Result<String> {
        let mut container = archive.by_name("META-INF/container.xml")?;
        let mut content = String::new();
        container.read_to_string(&mut content)?;

        let doc = Document::parse(&content)?;

        doc.descendants()
            .find(|n| n.has_tag_name("rootfile"))
            .and_then(|n| n.attribute("full-path"))
            .map(String::from)
            .ok_or_else(|| AppError::Internal("No rootfile in container.xml".into()))
    }

    fn read_opf(archive: &mut ZipArchive<File>) -> Result<(String, String)> {
        let opf_path = Self::find_opf_path(archive)?;
        let mut opf_content = String::new();
        archive
            .by_name(&opf_path)?
            .read_to_string(&mut opf_content)?;
        Ok((opf_path, opf_content))
    }

    /// Parse the metadata block of the OPF file.
    fn parse_metadata(content: &str) -> Result<BookMetadata> {
        let doc = Document::parse(content)?;
        let mut meta = BookMetadata::default();

        for node in doc.descendants().filter(|n| n.is_element()) {
            match node.tag_name().name() {
                "title" if meta.title.is_none() => meta.title = node_text(node),
                "description" => meta.description = node_text(node),
                "publisher" => meta.publisher = node_text(node),
                "language" if meta.language.is_none() => meta.language = node_text(node),
                "subject" => {
                    if let Some(subject) = node_text(node)
                        && !meta.subjects.contains(&subject)
                    {
                        meta.subjects.push(subject);
                    }
                }
                _ => {}
            }
        }

        Ok(meta)
    }

    /// Locate the cover image in the manifest.
    ///
    /// EPUB 3 `cover-image` property first, then the EPUB 2 `cover` meta,
    /// then any image whose href mentions "cover".
    fn find_cover(content: &str) -> Result<Option<CoverRef>> {
        let doc = Document::parse(content)?;
        let items: Vec<_> = doc
            .descendants()
            .filter(|n| n.has_tag_name("item"))
            .collect();

        let to_ref = |node: &roxmltree::Node<'_, '_>| {
            node.attribute("href").map(|href| CoverRef {
                href: href.to_string(),
                media_type: node.attribute("media-type").map(String::from),
            })
        };

        if let Some(item) = items.iter().find(|n| {
            n.attribute("properties")
                .is_some_and(|p| p.split_whitespace().any(|p| p == "cover-image"))
        }) {
            return Ok(to_ref(item));
        }

        let cover_id = doc
            .descendants()
            .find(|n| n.has_tag_name("meta") && n.attribute("name") == Some("cover"))
            .and_then(|n| n.attribute("content"));
        if let Some(cover_id) = cover_id
            && let Some(item) = items.iter().find(|n| n.attribute("id") == Some(cover_id))
        {
            return Ok(to_ref(item));
        }

        Ok(items
            .iter()
            .find(|n| {
                n.attribute("href").is_some_and(|href| {
                    let lower = href.to_lowercase();
                    lower.contains("cover") && ImageFormat::from_path(Path::new(&lower)).is_some()
                })
            })
            .and_then(to_ref))
    }

    /// Read the cover bytes, resolving the href against the OPF directory.
    fn read_cover(
        archive: &mut ZipArchive<File>,
        opf_dir: &str,
        cover: &CoverRef,
    ) -> Result<Option<CoverImage>> {
        let href = urlencoding::decode(&cover.href)
            .map(|h| h.into_owned())
            .unwrap_or_else(|_| cover.href.clone());
        let cover_path = if opf_dir.is_empty() {
            href.clone()
        } else {
            format!("{}/{}", opf_dir.trim_end_matches('/'), href)
        };

        let actual_path = if archive.index_for_name(&cover_path).is_some() {
            cover_path
        } else if archive.index_for_name(&href).is_some() {
            href
        } else {
            tracing::debug!(href = %cover.href, "Cover listed in manifest but missing from archive");
            return Ok(None);
        };

        let mut data = Vec::new();
        archive.by_name(&actual_path)?.read_to_end(&mut data)?;

        let format = detect_image_format(&data, &actual_path).or_else(|| {
            cover
                .media_type
                .as_deref()
                .and_then(ImageFormat::from_mime_type)
        });

        Ok(format.map(|format| CoverImage { format, data }))
    }
}

impl FormatHandler for EpubHandler {
    fn extract_metadata(&self, path: &Path) -> Result<BookMetadata> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file)?;

        let (_, opf_content) = Self::read_opf(&mut archive)?;
        Self::parse_metadata(&opf_content)
    }

    fn extract_cover(&self, path: &Path) -> Result<Option<CoverImage>> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file)?;

        let (opf_path, opf_content) = Self::read_opf(&mut archive)?;
        let opf_dir = opf_path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");

        match Self::find_cover(&opf_content)? {
            Some(cover) => Self::read_cover(&mut archive, opf_dir, &cover),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::write_zip;

    const CONTAINER: &[u8] = br#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

    const OPF: &str = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Dune</dc:title>
    <dc:creator>Frank Herbert</dc:creator>
    <dc:description> Spice must flow. </dc:description>
    <dc:publisher>Chilton</dc:publisher>
    <dc:language>en</dc:language>
    <dc:subject>Science Fiction</dc:subject>
    <dc:subject>Classics</dc:subject>
    <dc:subject>Science Fiction</dc:subject>
    <meta name="cover" content="cover-img"/>
  </metadata>
  <manifest>
    <item id="chapter" href="text/ch1.xhtml" media-type="application/xhtml+xml"/>
    <item id="cover-img" href="images/front%20cover.jpg" media-type="image/jpeg"/>
  </manifest>
</package>"#;

    #[test]
    fn test_parse_metadata() {
        let meta = EpubHandler::parse_metadata(OPF).unwrap();
        assert_eq!(meta.title.as_deref(), Some("Dune"));
        assert_eq!(meta.description.as_deref(), Some("Spice must flow."));
        assert_eq!(meta.publisher.as_deref(), Some("Chilton"));
        assert_eq!(meta.language.as_deref(), Some("en"));
        assert_eq!(meta.subjects, vec!["Science Fiction", "Classics"]);
    }

    #[test]
    fn test_find_cover_prefers_cover_image_property() {
        let opf = r#"<package><manifest>
            <item id="a" href="cover.png" media-type="image/png"/>
            <item id="b" href="art.jpg" media-type="image/jpeg" properties="cover-image"/>
        </manifest></package>"#;
        let cover = EpubHandler::find_cover(opf).unwrap().unwrap();
        assert_eq!(cover.href, "art.jpg");
    }

    #[test]
    fn test_find_cover_falls_back_to_href() {
        let opf = r#"<package><manifest>
            <item id="x" href="img/Cover.PNG" media-type="image/png"/>
        </manifest></package>"#;
        let cover = EpubHandler::find_cover(opf).unwrap().unwrap();
        assert_eq!(cover.href, "img/Cover.PNG");

        let none = r#"<package><manifest><item id="x" href="a.xhtml"/></manifest></package>"#;
        assert!(EpubHandler::find_cover(none).unwrap().is_none());
    }

    #[test]
    fn test_extract_from_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dune.epub");
        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
        write_zip(
            &path,
            &[
                ("META-INF/container.xml", CONTAINER),
                ("OEBPS/content.opf", OPF.as_bytes()),
                ("OEBPS/images/front cover.jpg", &jpeg[..]),
            ],
        );

        let meta = EpubHandler.extract_metadata(&path).unwrap();
        assert_eq!(meta.title.as_deref(), Some("Dune"));

        let cover = EpubHandler.extract_cover(&path).unwrap().unwrap();
        assert_eq!(cover.format, ImageFormat::Jpeg);
        assert_eq!(cover.data, jpeg);
    }

    #[test]
    fn test_missing_container_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.epub");
        write_zip(&path, &[("mimetype", &b"application/epub+zip"[..])]);

        assert!(EpubHandler.extract_metadata(&path).is_err());
    }
}
