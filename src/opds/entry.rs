//! Book and navigation entries.

use super::model::{Content, Entry, Link, Person, Relation};
use crate::library::BookItem;
use crate::media::{ImageFormat, media_type_for_path};
use chrono::{DateTime, Utc};

/// URL of the cover endpoint for a book.
pub fn cover_url(base_url: &str, book_id: &str) -> String {
    format!("{}/opds/cover/{}", base_url, book_id)
}

/// URL of the download endpoint for a book.
pub fn download_url(base_url: &str, book_id: &str) -> String {
    format!("{}/opds/download/{}", base_url, book_id)
}

/// Build the entry for one book.
///
/// Links are emitted in a fixed order: image, thumbnail, acquisition.
/// A link whose media type cannot be resolved is left out.
pub fn book_entry(book: &BookItem, base_url: &str) -> Entry {
    let mut entry = Entry::new(&book.name, &book.id, book.date_modified);
    entry.author = book.parent_name.as_ref().map(Person::named);
    entry.publisher = book.publisher.as_ref().map(Person::named);
    entry.language = book.language.clone();
    entry.summary = book.overview.clone();

    let image_type = book
        .image_path
        .as_deref()
        .and_then(ImageFormat::from_path)
        .map(|f| f.mime_type());
    if let Some(image_type) = image_type {
        let href = cover_url(base_url, &book.id);
        entry
            .links
            .push(Link::new(Relation::Image, href.clone(), image_type));
        entry
            .links
            .push(Link::new(Relation::Thumbnail, href, image_type));
    }

    if let Some(file_type) = book.path.as_deref().and_then(media_type_for_path) {
        entry.links.push(
            Link::new(
                Relation::Acquisition,
                download_url(base_url, &book.id),
                file_type,
            )
            .with_file_info(book.size, book.date_modified),
        );
    }

    entry
}

/// Build a navigation entry pointing at a sub-feed.
pub fn navigation_entry(
    title: &str,
    id: &str,
    href: String,
    media_type: &str,
    content: Option<&str>,
    updated: DateTime<Utc>,
) -> Entry {
    let mut entry = Entry::new(title, id, updated);
    entry.content = content.map(Content::text);
    entry
        .links
        .push(Link::new(Relation::Subsection, href, media_type));
    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::path::PathBuf;

    fn book() -> BookItem {
        let mut book = BookItem::new(PathBuf::from("/lib/Herbert/Dune.epub"), "lib-1");
        book.id = "book-1".to_string();
        book.parent_name = Some("Frank Herbert".to_string());
        book.overview = Some("Spice.".to_string());
        book.size = Some(4096);
        book.date_modified = Utc.with_ymd_and_hms(2023, 5, 4, 3, 2, 1).unwrap();
        book
    }

    #[test]
    fn test_book_with_cover_and_file_has_three_links_in_order() {
        let mut book = book();
        book.image_path = Some(PathBuf::from("/covers/book-1.png"));

        let entry = book_entry(&book, "/jf");
        let rels: Vec<_> = entry.links.iter().map(|l| l.rel.clone()).collect();
        assert_eq!(
            rels,
            vec![Relation::Image, Relation::Thumbnail, Relation::Acquisition]
        );

        assert_eq!(entry.links[0].href, "/jf/opds/cover/book-1");
        assert_eq!(entry.links[0].media_type, "image/png");
        assert_eq!(entry.links[1].media_type, "image/png");

        let acquisition = &entry.links[2];
        assert_eq!(acquisition.href, "/jf/opds/download/book-1");
        assert_eq!(acquisition.media_type, "application/epub+zip");
        assert_eq!(acquisition.length, Some(4096));
        assert_eq!(acquisition.mtime, Some(book.date_modified));
    }

    #[test]
    fn test_book_without_image_or_known_type_has_no_links() {
        let mut book = book();
        book.image_path = None;
        book.path = Some(PathBuf::from("/lib/Herbert/Dune.unknown"));

        assert!(book_entry(&book, "").links.is_empty());
    }

    #[test]
    fn test_unknown_image_type_omits_both_image_links() {
        let mut book = book();
        book.image_path = Some(PathBuf::from("/covers/book-1.tiff"));

        let entry = book_entry(&book, "");
        assert_eq!(entry.links.len(), 1);
        assert_eq!(entry.links[0].rel, Relation::Acquisition);
    }

    #[test]
    fn test_entry_fields_come_from_item() {
        let entry = book_entry(&book(), "");
        assert_eq!(entry.title, "Dune");
        assert_eq!(entry.id, "book-1");
        assert_eq!(entry.author, Some(Person::named("Frank Herbert")));
        assert_eq!(entry.summary.as_deref(), Some("Spice."));
        assert!(entry.publisher.is_none());
        assert!(entry.content.is_none());
    }

    #[test]
    fn test_navigation_entry_has_single_subsection_link() {
        let entry = navigation_entry(
            "A",
            "/opds/books/letter/A",
            "/opds/books/letter/A".to_string(),
            "application/atom+xml",
            None,
            Utc::now(),
        );
        assert_eq!(entry.links.len(), 1);
        assert_eq!(entry.links[0].rel, Relation::Subsection);
    }
}
