//! XML rendering and parsing of catalog documents.

use super::model::{Feed, OpenSearchDescription};
use super::{ATOM_NAMESPACE, OPENSEARCH_NAMESPACE};
use crate::error::{AppError, Result};
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n";

/// Indentation width of rendered documents.
const INDENT: usize = 2;

/// A document with a fixed root element and default namespace.
pub trait XmlDocument: Serialize + DeserializeOwned {
    /// Root element name.
    const ROOT: &'static str;
    /// Namespace declared on the root element.
    const NAMESPACE: &'static str;
}

impl XmlDocument for Feed {
    const ROOT: &'static str = "feed";
    const NAMESPACE: &'static str = ATOM_NAMESPACE;
}

impl XmlDocument for OpenSearchDescription {
    const ROOT: &'static str = "OpenSearchDescription";
    const NAMESPACE: &'static str = OPENSEARCH_NAMESPACE;
}

/// Rendering settings for one document type.
#[derive(Debug, PartialEq, Eq)]
pub struct DocumentFormat {
    /// Root element name.
    pub root: &'static str,
    /// Namespace of the root element.
    pub namespace: &'static str,
    /// Indentation width.
    pub indent: usize,
}

type FormatKey = (&'static str, &'static str);

type FormatCache = RwLock<HashMap<FormatKey, Arc<DocumentFormat>>>;

/// Formats keyed by (type name, namespace). Entries are never replaced.
static FORMATS: OnceLock<FormatCache> = OnceLock::new();

fn formats() -> &'static FormatCache {
    FORMATS.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Get the cached format for a document type, creating it on first use.
pub fn format_for<T: XmlDocument>() -> Arc<DocumentFormat> {
    let key = (std::any::type_name::<T>(), T::NAMESPACE);

    if let Some(format) = formats().read().get(&key) {
        return Arc::clone(format);
    }

    let mut formats = formats().write();
    Arc::clone(formats.entry(key).or_insert_with(|| {
        tracing::trace!(root = T::ROOT, namespace = T::NAMESPACE, "Registered document format");
        Arc::new(DocumentFormat {
            root: T::ROOT,
            namespace: T::NAMESPACE,
            indent: INDENT,
        })
    }))
}

/// Render a document as indented XML with a declaration.
///
/// The root element carries the default namespace of the document format.
pub fn to_xml<T: XmlDocument>(doc: &T) -> Result<String> {
    let format = format_for::<T>();

    let mut body = String::new();
    let mut serializer = quick_xml::se::Serializer::with_root(&mut body, Some(format.root))?;
    serializer.indent(' ', format.indent);
    doc.serialize(serializer)?;

    // Serializer output opens with `<{root}`; the declaration goes right after
    let open_tag = format!("<{}", format.root);
    let rest = body.strip_prefix(&open_tag).ok_or_else(|| {
        AppError::Serialization(format!("Document does not start with {}", open_tag))
    })?;

    let mut out = String::with_capacity(XML_DECLARATION.len() + body.len() + 64);
    out.push_str(XML_DECLARATION);
    out.push_str(&open_tag);
    out.push_str(" xmlns=\"");
    out.push_str(&quick_xml::escape::escape(format.namespace));
    out.push('"');
    out.push_str(rest);
    out.push('\n');

    Ok(out)
}

/// Parse a document back from XML.
pub fn from_xml<T: XmlDocument>(xml: &str) -> Result<T> {
    Ok(quick_xml::de::from_str(xml)?)
}
