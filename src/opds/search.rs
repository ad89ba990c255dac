//! OpenSearch description of the catalog search.

use super::model::{OpenSearchDescription, OpenSearchUrl};
use super::{ATOM_TYPE, PLUGIN_AUTHOR_NAME, PLUGIN_AUTHOR_URI};

const DESCRIPTION: &str = "Jellyfin eBook Catalog";
const SYNDICATION_RIGHT: &str = "open";
const LANGUAGE: &str = "en-EN";
const ENCODING: &str = "UTF-8";

/// Path-style search template (`/opds/search/{searchTerms}`).
pub fn path_search_template(base_url: &str) -> String {
    format!("{}/opds/search/{{searchTerms}}", base_url)
}

/// Query-string search template (`/opds/search?query={searchTerms}`).
pub fn query_search_template(base_url: &str) -> String {
    format!("{}/opds/search?query={{searchTerms}}", base_url)
}

/// Build the search description for a server.
pub fn search_description(server_name: &str, base_url: &str) -> OpenSearchDescription {
    OpenSearchDescription {
        short_name: Some(server_name.to_string()),
        long_name: Some(server_name.to_string()),
        description: Some(DESCRIPTION.to_string()),
        developer: Some(PLUGIN_AUTHOR_NAME.to_string()),
        contact: Some(PLUGIN_AUTHOR_URI.to_string()),
        urls: vec![
            OpenSearchUrl {
                media_type: "text/html".to_string(),
                template: path_search_template(base_url),
            },
            OpenSearchUrl {
                media_type: ATOM_TYPE.to_string(),
                template: query_search_template(base_url),
            },
        ],
        syndication_right: Some(SYNDICATION_RIGHT.to_string()),
        language: Some(LANGUAGE.to_string()),
        output_encoding: Some(ENCODING.to_string()),
        input_encoding: Some(ENCODING.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opds::{from_xml, to_xml};

    #[test]
    fn test_descriptor_templates() {
        let desc = search_description("Home", "/jf");
        assert_eq!(desc.short_name.as_deref(), Some("Home"));
        assert_eq!(desc.long_name.as_deref(), Some("Home"));
        assert_eq!(desc.urls.len(), 2);
        assert_eq!(desc.urls[0].media_type, "text/html");
        assert_eq!(desc.urls[0].template, "/jf/opds/search/{searchTerms}");
        assert_eq!(desc.urls[1].media_type, "application/atom+xml");
        assert_eq!(desc.urls[1].template, "/jf/opds/search?query={searchTerms}");
    }

    #[test]
    fn test_descriptor_xml() {
        let xml = to_xml(&search_description("Home", "")).unwrap();
        assert!(xml.contains("<ShortName>Home</ShortName>"));
        assert!(xml.contains("<InputEncoding>UTF-8</InputEncoding>"));
        assert!(xml.contains("template=\"/opds/search?query={searchTerms}\""));

        let parsed: OpenSearchDescription = from_xml(&xml).unwrap();
        assert_eq!(parsed.urls, search_description("Home", "").urls);
        assert_eq!(parsed.syndication_right.as_deref(), Some("open"));
    }
}
