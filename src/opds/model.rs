//! Feed, entry, link and OpenSearch documents as they appear on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Semantic role of a link.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Relation {
    /// The document itself.
    SelfLink,
    /// The catalog root.
    Start,
    /// The parent view.
    Up,
    /// A search endpoint or description.
    Search,
    /// A child navigation or acquisition feed.
    Subsection,
    /// Full size cover.
    Image,
    /// Cover thumbnail.
    Thumbnail,
    /// The book file itself.
    Acquisition,
    /// Any relation this crate does not produce, kept verbatim when parsing.
    Other(String),
}

impl Relation {
    /// Wire value of the relation.
    pub fn as_str(&self) -> &str {
        match self {
            Relation::SelfLink => "self",
            Relation::Start => "start",
            Relation::Up => "up",
            Relation::Search => "search",
            Relation::Subsection => "subsection",
            Relation::Image => "http://opds-spec.org/image",
            Relation::Thumbnail => "http://opds-spec.org/image/thumbnail",
            Relation::Acquisition => "http://opds-spec.org/acquisition",
            Relation::Other(s) => s,
        }
    }

    /// Parse a wire value.
    pub fn parse(s: &str) -> Self {
        match s {
            "self" => Relation::SelfLink,
            "start" => Relation::Start,
            "up" => Relation::Up,
            "search" => Relation::Search,
            "subsection" => Relation::Subsection,
            "http://opds-spec.org/image" => Relation::Image,
            "http://opds-spec.org/image/thumbnail" => Relation::Thumbnail,
            "http://opds-spec.org/acquisition" => Relation::Acquisition,
            other => Relation::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Relation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Relation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Relation::parse(&raw))
    }
}

/// Typed link out of a feed or entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "link")]
pub struct Link {
    /// Link relation.
    #[serde(rename = "@rel")]
    pub rel: Relation,
    /// Target URI, including the server path prefix.
    #[serde(rename = "@href")]
    pub href: String,
    /// Media type of the target.
    #[serde(rename = "@type")]
    pub media_type: String,
    /// Optional human title.
    #[serde(rename = "@title", default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Size of the target file in bytes.
    #[serde(
        rename = "@length",
        default,
        skip_serializing_if = "Option::is_none",
        with = "scalar::length"
    )]
    pub length: Option<u64>,
    /// Modification time of the target file.
    #[serde(
        rename = "@mtime",
        default,
        skip_serializing_if = "Option::is_none",
        with = "scalar::mtime"
    )]
    pub mtime: Option<DateTime<Utc>>,
}

impl Link {
    /// Create a link without title, length or mtime.
    pub fn new(rel: Relation, href: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self {
            rel,
            href: href.into(),
            media_type: media_type.into(),
            title: None,
            length: None,
            mtime: None,
        }
    }

    /// Set the link title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Attach the byte length and modification time of a file.
    pub fn with_file_info(mut self, length: Option<u64>, mtime: DateTime<Utc>) -> Self {
        self.length = length;
        self.mtime = Some(mtime);
        self
    }
}

/// Author or publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    /// Display name.
    pub name: String,
    /// Optional home page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

impl Person {
    /// Person with a name only.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uri: None,
        }
    }
}

/// Typed text content of an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    /// Content type (`text`, `html`).
    #[serde(rename = "@type")]
    pub content_type: String,
    /// The text.
    #[serde(rename = "$text", default)]
    pub text: String,
}

impl Content {
    /// Plain text content.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content_type: "text".to_string(),
            text: text.into(),
        }
    }
}

/// One catalog entry: a book or a navigation node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "entry")]
pub struct Entry {
    /// Entry title.
    pub title: String,
    /// Item id or synthetic navigation path.
    pub id: String,
    /// Last update timestamp.
    pub updated: DateTime<Utc>,
    /// Descriptive content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    /// Author.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Person>,
    /// Publisher.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<Person>,
    /// Language code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Short summary text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Links, in order.
    #[serde(rename = "link", default)]
    pub links: Vec<Link>,
}

impl Entry {
    /// Entry with only the mandatory fields.
    pub fn new(title: impl Into<String>, id: impl Into<String>, updated: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            id: id.into(),
            updated,
            content: None,
            author: None,
            publisher: None,
            language: None,
            summary: None,
            links: Vec::new(),
        }
    }
}

/// An Atom/OPDS feed.
///
/// The Atom namespace is declared by the serializer, not carried here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "feed")]
pub struct Feed {
    /// Feed id, fresh for every response.
    pub id: String,
    /// Feed title.
    pub title: String,
    /// Last update timestamp.
    pub updated: DateTime<Utc>,
    /// Feed author.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Person>,
    /// Feed-level links.
    #[serde(rename = "link", default)]
    pub links: Vec<Link>,
    /// Entries, in order.
    #[serde(rename = "entry", default)]
    pub entries: Vec<Entry>,
}

impl Feed {
    /// Empty feed.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            updated: Utc::now(),
            author: None,
            links: Vec::new(),
            entries: Vec::new(),
        }
    }

    /// First link with the given relation.
    pub fn link(&self, rel: &Relation) -> Option<&Link> {
        self.links.iter().find(|l| &l.rel == rel)
    }
}

/// Search URL template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenSearchUrl {
    /// Response media type.
    #[serde(rename = "@type")]
    pub media_type: String,
    /// Template with a `{searchTerms}` placeholder.
    #[serde(rename = "@template")]
    pub template: String,
}

/// OpenSearch description document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "OpenSearchDescription")]
pub struct OpenSearchDescription {
    /// Short name.
    #[serde(rename = "ShortName", default, skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    /// Long name.
    #[serde(rename = "LongName", default, skip_serializing_if = "Option::is_none")]
    pub long_name: Option<String>,
    /// Description.
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Developer.
    #[serde(rename = "Developer", default, skip_serializing_if = "Option::is_none")]
    pub developer: Option<String>,
    /// Contact.
    #[serde(rename = "Contact", default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    /// Search URL templates.
    #[serde(rename = "Url", default)]
    pub urls: Vec<OpenSearchUrl>,
    /// Syndication right.
    #[serde(
        rename = "SyndicationRight",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub syndication_right: Option<String>,
    /// Language.
    #[serde(rename = "Language", default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Output encoding.
    #[serde(rename = "OutputEncoding", default, skip_serializing_if = "Option::is_none")]
    pub output_encoding: Option<String>,
    /// Input encoding.
    #[serde(rename = "InputEncoding", default, skip_serializing_if = "Option::is_none")]
    pub input_encoding: Option<String>,
}

/// String renderings of scalar attributes.
///
/// Length and mtime are written as plain strings; unparseable values read
/// back as absent.
mod scalar {
    pub mod length {
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &Option<u64>, s: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => s.serialize_str(&v.to_string()),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
            let raw: Option<String> = Option::deserialize(d)?;
            Ok(raw.and_then(|s| s.trim().parse().ok()))
        }
    }

    pub mod mtime {
        use chrono::{DateTime, SecondsFormat, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(t) => s.serialize_str(&t.to_rfc3339_opts(SecondsFormat::Secs, true)),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            let raw: Option<String> = Option::deserialize(d)?;
            Ok(raw.and_then(|s| {
                DateTime::parse_from_rfc3339(s.trim())
                    .ok()
                    .map(|t| t.with_timezone(&Utc))
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_round_trips_wire_values() {
        for rel in [
            Relation::SelfLink,
            Relation::Start,
            Relation::Up,
            Relation::Search,
            Relation::Subsection,
            Relation::Image,
            Relation::Thumbnail,
            Relation::Acquisition,
        ] {
            assert_eq!(Relation::parse(rel.as_str()), rel);
        }
        assert_eq!(
            Relation::parse("related"),
            Relation::Other("related".to_string())
        );
    }

    #[test]
    fn test_feed_new_is_empty() {
        let feed = Feed::new("id", "title");
        assert_eq!(feed.title, "title");
        assert!(feed.entries.is_empty());
        assert!(feed.links.is_empty());
        assert!(feed.author.is_none());
    }
}
