//! Incremental filesystem scanner feeding the library index.

use crate::db::{Database, ItemStamp, Library, now_timestamp, timestamp_to_datetime};
use crate::error::{AppError, Result};
use crate::formats::{self, BookMetadata};
use crate::library::book::{BookItem, FolderItem, Genre, item_id_for_path};
use crate::media::{BookFormat, ImageFormat};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Image names shared by every book in a directory.
const FOLDER_IMAGE_STEMS: [&str; 2] = ["cover", "folder"];

/// Counters reported after a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Books seen for the first time.
    pub new: usize,
    /// Books whose file changed.
    pub updated: usize,
    /// Books skipped because size and mtime matched.
    pub unchanged: usize,
    /// Items removed because their file is gone.
    pub removed: usize,
}

impl ScanSummary {
    fn add(&mut self, other: ScanSummary) {
        self.new += other.new;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.removed += other.removed;
    }
}

/// A book file found on disk.
struct FileEntry {
    path: PathBuf,
    format: BookFormat,
    size: u64,
    mtime: i64,
    parent_id: String,
    parent_name: String,
}

/// Walks library directories and keeps the items table in step with them.
#[derive(Clone)]
pub struct LibraryScanner {
    db: Database,
    workers: usize,
    covers_dir: PathBuf,
    scanning: Arc<AtomicBool>,
}

impl LibraryScanner {
    /// Create a scanner writing to `db` and caching embedded covers in `covers_dir`.
    pub fn new(db: Database, workers: usize, covers_dir: PathBuf) -> Self {
        Self {
            db,
            workers: workers.max(1),
            covers_dir,
            scanning: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a scan is currently running.
    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Relaxed)
    }

    /// Scan every registered library. A scan already in progress makes
    /// this a no-op.
    pub fn scan_all(&self) -> Result<ScanSummary> {
        // Prevent concurrent scans
        if self.scanning.swap(true, Ordering::SeqCst) {
            tracing::info!("Scan already in progress, skipping");
            return Ok(ScanSummary::default());
        }

        let result = self.scan_libraries();
        self.scanning.store(false, Ordering::SeqCst);
        result
    }

    fn scan_libraries(&self) -> Result<ScanSummary> {
        let start = std::time::Instant::now();
        let mut total = ScanSummary::default();

        for library in self.db.list_libraries()? {
            total.add(self.scan_library(&library)?);
        }

        let pruned = self.db.prune_genres()?;
        tracing::info!(
            new = total.new,
            updated = total.updated,
            unchanged = total.unchanged,
            removed = total.removed,
            pruned_genres = pruned,
            elapsed = ?start.elapsed(),
            "Full scan complete"
        );

        Ok(total)
    }

    /// Scan one library incrementally.
    pub fn scan_library(&self, library: &Library) -> Result<ScanSummary> {
        let root = PathBuf::from(&library.path);
        if !root.is_dir() {
            // An unmounted share must not empty the index
            tracing::warn!(library = %library.name, path = %library.path, "Library path does not exist");
            return Ok(ScanSummary::default());
        }

        tracing::info!(library = %library.name, "Scanning library (incremental)");

        let (folders, files) = collect_entries(&root, library);
        let stamps = self.db.book_stamps(&library.id)?;

        let mut keep_ids: Vec<String> = Vec::with_capacity(folders.len() + files.len());
        for folder in &folders {
            self.db.save_folder(folder)?;
            keep_ids.push(folder.id.clone());
        }

        let mut summary = ScanSummary::default();
        let mut to_process = Vec::new();
        for file in files {
            let id = item_id_for_path(&file.path);
            let stamp = stamps.get(&id).copied();
            keep_ids.push(id);

            match stamp {
                Some(s) if s.size == Some(file.size) && s.modified == file.mtime => {
                    summary.unchanged += 1;
                }
                _ => to_process.push((file, stamp)),
            }
        }

        let (new, updated) = self.process_files(library, &to_process)?;
        summary.new = new;
        summary.updated = updated;

        let removed = self.db.delete_items_not_in(&library.id, &keep_ids)?;
        summary.removed = removed;
        if removed > 0 {
            tracing::info!(library = %library.name, removed = removed, "Removed deleted items");
        }

        tracing::info!(
            library = %library.name,
            new = summary.new,
            updated = summary.updated,
            unchanged = summary.unchanged,
            "Library scan complete"
        );

        Ok(summary)
    }

    /// Extract and store new or changed books on a bounded worker pool.
    fn process_files(
        &self,
        library: &Library,
        to_process: &[(FileEntry, Option<ItemStamp>)],
    ) -> Result<(usize, usize)> {
        if to_process.is_empty() {
            return Ok((0, 0));
        }

        let total = to_process.len();
        tracing::info!(to_process = total, workers = self.workers, "Processing new/updated files");

        let new_count = AtomicUsize::new(0);
        let updated_count = AtomicUsize::new(0);
        let processed = AtomicUsize::new(0);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build scan pool: {}", e)))?;

        pool.install(|| {
            to_process.par_iter().for_each(|(file, stamp)| {
                let (book, genres) = self.build_book(library, file, *stamp);
                match self.db.save_book(&book, &genres) {
                    Ok(()) if stamp.is_some() => {
                        updated_count.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(()) => {
                        new_count.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        tracing::warn!(path = %file.path.display(), error = %e, "Failed to save book");
                    }
                }

                let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
                if done.is_multiple_of(100) || done == total {
                    tracing::info!("Processing... {}/{} ({}%)", done, total, done * 100 / total);
                }
            });
        });

        Ok((
            new_count.load(Ordering::Relaxed),
            updated_count.load(Ordering::Relaxed),
        ))
    }

    /// Build the catalog item for one file. Extraction failures leave the
    /// filename-derived defaults in place.
    fn build_book(
        &self,
        library: &Library,
        file: &FileEntry,
        stamp: Option<ItemStamp>,
    ) -> (BookItem, Vec<Genre>) {
        let mut book = BookItem::new(file.path.clone(), &library.id);
        book.parent_id = Some(file.parent_id.clone());
        book.parent_name = Some(file.parent_name.clone());
        book.size = Some(file.size);
        book.date_modified = timestamp_to_datetime(file.mtime);
        book.date_created = timestamp_to_datetime(stamp.map_or_else(now_timestamp, |s| s.created));

        let handler = formats::get_handler(file.format);
        let metadata = handler.extract_metadata(&file.path).unwrap_or_else(|e| {
            tracing::debug!(path = %file.path.display(), error = %e, "Failed to extract metadata");
            BookMetadata::default()
        });

        if let Some(title) = metadata.title {
            book.set_name(title);
        }
        book.overview = metadata.description;
        book.publisher = metadata.publisher;
        book.language = metadata.language;

        book.image_path = sidecar_image(&file.path).or_else(|| {
            match handler.extract_cover(&file.path) {
                Ok(Some(cover)) => self.store_cover(&book.id, cover.format, &cover.data),
                Ok(None) => None,
                Err(e) => {
                    tracing::debug!(path = %file.path.display(), error = %e, "Failed to extract cover");
                    None
                }
            }
        });

        let mut genres: Vec<Genre> = Vec::new();
        for subject in &metadata.subjects {
            let genre = Genre::new(subject);
            if !genre.name.is_empty() && !genres.iter().any(|g| g.id == genre.id) {
                genres.push(genre);
            }
        }

        (book, genres)
    }

    /// Write an embedded cover to the cache and return its path.
    fn store_cover(&self, book_id: &str, format: ImageFormat, data: &[u8]) -> Option<PathBuf> {
        let path = self
            .covers_dir
            .join(format!("{}.{}", book_id, format.extension()));

        let written = std::fs::create_dir_all(&self.covers_dir)
            .and_then(|_| std::fs::write(&path, data));
        match written {
            Ok(()) => Some(path),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to cache cover");
                None
            }
        }
    }
}

/// Walk a library, returning its folders and book files.
fn collect_entries(root: &Path, library: &Library) -> (Vec<FolderItem>, Vec<FileEntry>) {
    let mut folders = Vec::new();
    let mut files = Vec::new();

    let walker = walkdir::WalkDir::new(root)
        .follow_links(true)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| !is_hidden(e.file_name()));

    for entry in walker.filter_map(|e| e.ok()) {
        let path = entry.path();
        let Some(parent) = path.parent() else {
            continue;
        };
        let (parent_id, parent_name) = if parent == root {
            (library.id.clone(), library.name.clone())
        } else {
            (item_id_for_path(parent), file_name(parent))
        };

        if entry.file_type().is_dir() {
            folders.push(FolderItem::new(
                path.to_path_buf(),
                &library.id,
                Some(parent_id),
            ));
            continue;
        }

        let Some(format) = BookFormat::from_path(path) else {
            continue;
        };
        let Ok(metadata) = entry.metadata() else {
            continue;
        };

        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        files.push(FileEntry {
            path: path.to_path_buf(),
            format,
            size: metadata.len(),
            mtime,
            parent_id,
            parent_name,
        });
    }

    tracing::info!(folders = folders.len(), files = files.len(), "Found library entries");
    (folders, files)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|n| n.starts_with('.'))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("Unknown")
        .to_string()
}

/// Find a sidecar image for a book: `<stem>.<ext>` first, then a
/// `cover.<ext>` or `folder.<ext>` in the same directory.
fn sidecar_image(book_path: &Path) -> Option<PathBuf> {
    let dir = book_path.parent()?;
    let stem = book_path.file_stem()?.to_str()?;

    std::iter::once(stem)
        .chain(FOLDER_IMAGE_STEMS)
        .flat_map(|stem| {
            ["jpg", "jpeg", "png", "webp", "gif"]
                .into_iter()
                .map(move |ext| dir.join(format!("{}.{}", stem, ext)))
        })
        .find(|candidate| candidate.is_file() && ImageFormat::from_path(candidate).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::write_zip;
    use crate::library::{CatalogItem, ItemQuery, LibraryIndex};

    fn library(db: &Database, root: &Path) -> Library {
        let library = Library {
            id: "lib-1".to_string(),
            name: "Books".to_string(),
            path: root.to_string_lossy().to_string(),
            is_public: true,
            created_at: now_timestamp(),
        };
        db.create_library(&library).unwrap();
        library
    }

    fn books(db: &Database) -> Vec<BookItem> {
        db.query_items(&ItemQuery::books_under(Vec::new()))
            .unwrap()
            .into_iter()
            .filter_map(CatalogItem::into_book)
            .collect()
    }

    #[test]
    fn test_sidecar_image_lookup_order() {
        let dir = tempfile::tempdir().unwrap();
        let book = dir.path().join("Dune.pdf");
        std::fs::write(&book, b"%PDF").unwrap();
        assert_eq!(sidecar_image(&book), None);

        std::fs::write(dir.path().join("folder.png"), b"x").unwrap();
        assert_eq!(sidecar_image(&book), Some(dir.path().join("folder.png")));

        std::fs::write(dir.path().join("Dune.jpg"), b"x").unwrap();
        assert_eq!(sidecar_image(&book), Some(dir.path().join("Dune.jpg")));
    }

    #[test]
    fn test_scan_indexes_books_and_folders() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("books");
        let author = root.join("Frank Herbert");
        std::fs::create_dir_all(&author).unwrap();
        std::fs::create_dir_all(root.join(".hidden")).unwrap();
        std::fs::write(author.join("Dune.pdf"), b"%PDF-1.4").unwrap();
        std::fs::write(author.join("Dune.jpg"), [0xFF, 0xD8, 0xFF]).unwrap();
        std::fs::write(root.join("notes.xyz"), b"ignored").unwrap();
        std::fs::write(root.join(".hidden").join("Secret.pdf"), b"%PDF").unwrap();
        std::fs::write(root.join("Loose.txt"), b"text").unwrap();

        let db = Database::open_memory().unwrap();
        let lib = library(&db, &root);
        let scanner = LibraryScanner::new(db.clone(), 2, dir.path().join("covers"));

        let summary = scanner.scan_library(&lib).unwrap();
        assert_eq!(summary.new, 2);
        assert_eq!(summary.removed, 0);

        let books = books(&db);
        assert_eq!(books.len(), 2);

        let dune = books.iter().find(|b| b.name == "Dune").unwrap();
        assert_eq!(dune.parent_name.as_deref(), Some("Frank Herbert"));
        assert_eq!(dune.size, Some(8));
        assert_eq!(dune.image_path, Some(author.join("Dune.jpg")));

        let loose = books.iter().find(|b| b.name == "Loose").unwrap();
        assert_eq!(loose.parent_id.as_deref(), Some("lib-1"));
        assert_eq!(loose.parent_name.as_deref(), Some("Books"));

        let folder = db.get_item(&item_id_for_path(&author)).unwrap().unwrap();
        assert!(matches!(folder, CatalogItem::Folder(_)));
    }

    #[test]
    fn test_rescan_is_incremental_and_removes_vanished_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("books");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("A.pdf"), b"one").unwrap();
        std::fs::write(root.join("B.pdf"), b"two").unwrap();

        let db = Database::open_memory().unwrap();
        let lib = library(&db, &root);
        let scanner = LibraryScanner::new(db.clone(), 1, dir.path().join("covers"));

        scanner.scan_library(&lib).unwrap();
        let created = books(&db)
            .into_iter()
            .find(|b| b.name == "A")
            .unwrap()
            .date_created;

        std::fs::remove_file(root.join("B.pdf")).unwrap();
        std::fs::write(root.join("A.pdf"), b"one, longer now").unwrap();

        let summary = scanner.scan_library(&lib).unwrap();
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.new, 0);
        assert_eq!(summary.removed, 1);

        let books = books(&db);
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].size, Some(15));
        assert_eq!(books[0].date_created, created);

        let summary = scanner.scan_library(&lib).unwrap();
        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.updated, 0);
    }

    #[test]
    fn test_epub_metadata_cover_and_genres() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("books");
        std::fs::create_dir_all(&root).unwrap();

        let container = br#"<container><rootfiles><rootfile full-path="content.opf"/></rootfiles></container>"#;
        let opf = br#"<package><metadata>
            <title>The Left Hand of Darkness</title>
            <description>Winter.</description>
            <subject>Science Fiction</subject>
            <meta name="cover" content="c"/>
        </metadata><manifest><item id="c" href="cover.png" media-type="image/png"/></manifest></package>"#;
        let png = b"\x89PNG\r\n\x1a\ncover";
        write_zip(
            &root.join("lhod.epub"),
            &[
                ("META-INF/container.xml", &container[..]),
                ("content.opf", &opf[..]),
                ("cover.png", &png[..]),
            ],
        );

        let db = Database::open_memory().unwrap();
        let lib = library(&db, &root);
        let covers = dir.path().join("covers");
        let scanner = LibraryScanner::new(db.clone(), 1, covers.clone());
        scanner.scan_library(&lib).unwrap();

        let books = books(&db);
        assert_eq!(books[0].name, "The Left Hand of Darkness");
        assert_eq!(books[0].sort_name, "left hand of darkness");
        assert_eq!(books[0].overview.as_deref(), Some("Winter."));

        let cover = books[0].image_path.clone().unwrap();
        assert!(cover.starts_with(&covers));
        assert_eq!(std::fs::read(cover).unwrap(), png.to_vec());

        let genres = db
            .query_genres(&crate::library::GenreQuery {
                parent_ids: vec!["lib-1".to_string()],
                include_kinds: Vec::new(),
            })
            .unwrap();
        assert_eq!(genres.len(), 1);
        assert_eq!(genres[0].name, "Science Fiction");
    }

    #[test]
    fn test_missing_root_keeps_index() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("books");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("A.pdf"), b"one").unwrap();

        let db = Database::open_memory().unwrap();
        let lib = library(&db, &root);
        let scanner = LibraryScanner::new(db.clone(), 1, dir.path().join("covers"));
        scanner.scan_library(&lib).unwrap();

        std::fs::remove_dir_all(&root).unwrap();
        assert_eq!(scanner.scan_library(&lib).unwrap(), ScanSummary::default());
        assert_eq!(books(&db).len(), 1);
    }
}
