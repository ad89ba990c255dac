//! OPDS catalog generation.
//!
//! [`model`] holds the wire documents, [`entry`] turns books into entries,
//! [`feed`] assembles the catalog views, [`search`] builds the OpenSearch
//! description and [`serializer`] renders everything to XML.

pub mod entry;
pub mod feed;
pub mod model;
pub mod search;
pub mod serializer;

pub use feed::{CatalogSettings, FeedProvider};
pub use model::{Content, Entry, Feed, Link, OpenSearchDescription, OpenSearchUrl, Person, Relation};
pub use serializer::{XmlDocument, from_xml, to_xml};

/// Atom namespace declared on every feed.
pub const ATOM_NAMESPACE: &str = "http://www.w3.org/2005/Atom";

/// OpenSearch 1.1 namespace declared on the search description.
pub const OPENSEARCH_NAMESPACE: &str = "http://a9.com/-/spec/opensearch/1.1/";

/// Link type for navigation feeds.
pub const NAVIGATION_TYPE: &str = "application/atom+xml;profile=opds-catalog;kind=navigation";

/// Link type for acquisition feeds.
pub const ACQUISITION_TYPE: &str = "application/atom+xml;profile=opds-catalog;kind=acquisition";

/// Link type of the OpenSearch description.
pub const OPENSEARCH_TYPE: &str = "application/opensearchdescription+xml";

/// Plain Atom link type, used by the templated search link.
pub const ATOM_TYPE: &str = "application/atom+xml";

/// Content type of every document the server returns.
pub const DOCUMENT_CONTENT_TYPE: &str = "application/atom+xml; charset=utf-8";

/// Title used when the server has no name configured.
pub const DEFAULT_SERVER_NAME: &str = "Jellyfin";

/// Name of the feed author.
pub const PLUGIN_AUTHOR_NAME: &str = "Jellyfin";

/// URI of the feed author.
pub const PLUGIN_AUTHOR_URI: &str = "https://github.com/jellyfin/jellyfin-plugin-opds";
