//! Value shapes runners hand back to the host.
//!
//! Decoding is lenient about optional fields and strict about the ones the
//! host relies on; mismatches surface as `DecodeFailed` with the field path.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    pub title: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub additional_titles: Vec<String>,
    #[serde(default)]
    pub creators: Vec<String>,
    #[serde(default)]
    pub status: Option<i64>,
    #[serde(default, rename = "isNSFW")]
    pub is_nsfw: bool,
    #[serde(default)]
    pub web_url: Option<String>,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub chapters: Option<Vec<Chapter>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub chapter_id: String,
    pub number: f64,
    #[serde(default)]
    pub index: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub language: Option<String>,
    /// ISO-8601 date.
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub web_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChapterData {
    #[serde(default)]
    pub pages: Option<Vec<ChapterPage>>,
    /// Novel-style chapters carry text instead of pages.
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterPage {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub raw: Option<String>,
}

/// Lightweight listing entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlight {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub info: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResult<T> {
    pub results: Vec<T>,
    #[serde(default)]
    pub is_last_page: bool,
    #[serde(default)]
    pub total_result_count: Option<u64>,
}

/// Arguments for directory queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryRequest {
    pub page: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryConfig {
    #[serde(default)]
    pub filters: Vec<Value>,
    #[serde(default)]
    pub sort: Option<Value>,
    #[serde(default)]
    pub search_fields: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLink {
    pub label: String,
    pub link: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub info: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub web_url: Option<String>,
    /// Current tracking state; shape is tracker-defined.
    #[serde(default)]
    pub entry: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginAction {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use serde_json::json;

    #[test]
    fn content_needs_only_a_title() {
        let content: Content = codec::decode_value(json!({ "id": "42", "title": "T" })).unwrap();
        assert_eq!(content.title, "T");
        assert_eq!(content.id.as_deref(), Some("42"));
        assert!(content.chapters.is_none());
    }

    #[test]
    fn bad_chapter_reports_path() {
        let err = codec::decode_value::<Vec<Chapter>>(json!([
            { "chapterId": "a", "number": 1 },
            { "chapterId": "b", "number": "two" }
        ]))
        .unwrap_err();
        match err {
            crate::error::SandboxError::DecodeFailed { path, .. } => assert_eq!(path, "[1].number"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn directory_request_omits_unset_fields() {
        let request = DirectoryRequest {
            page: 1,
            query: Some("one piece".into()),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&request).unwrap(), json!({ "page": 1, "query": "one piece" }));
    }
}
