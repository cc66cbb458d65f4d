use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One page of `/api/v1/book/<id>/chapter/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterPage {
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub results: Vec<ChapterRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterRecord {
    pub filename: String,
    pub title: String,
    /// URL of the chapter's HTML fragment.
    pub content: String,
    #[serde(default)]
    pub asset_base_url: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub stylesheets: Vec<StylesheetRef>,
    #[serde(default)]
    pub site_styles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StylesheetRef {
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVersion {
    V1,
    V2,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub filename: String,
    pub title: String,
    pub content_url: String,
    pub asset_base_url: String,
    pub api_version: ApiVersion,
    pub image_refs: Vec<String>,
    pub stylesheet_refs: Vec<StylesheetRef>,
    pub site_style_refs: Vec<String>,
}

impl From<ChapterRecord> for Chapter {
    fn from(record: ChapterRecord) -> Self {
        let api_version = if record.content.contains("v2") {
            ApiVersion::V2
        } else {
            ApiVersion::V1
        };
        Self {
            filename: record.filename,
            title: record.title,
            content_url: record.content,
            asset_base_url: record.asset_base_url,
            api_version,
            image_refs: record.images,
            stylesheet_refs: record.stylesheets,
            site_style_refs: record.site_styles,
        }
    }
}

impl Chapter {
    /// A chapter that only exists locally, such as the generated cover page.
    pub fn local(filename: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            title: title.into(),
            content_url: String::new(),
            asset_base_url: String::new(),
            api_version: ApiVersion::V1,
            image_refs: Vec::new(),
            stylesheet_refs: Vec::new(),
            site_style_refs: Vec::new(),
        }
    }

    pub fn is_cover_candidate(&self) -> bool {
        self.filename.contains("cover") || self.title.contains("cover")
    }

    /// Name of the XHTML file this chapter is written to.
    pub fn xhtml_filename(&self) -> String {
        self.filename.replace(".html", ".xhtml")
    }

    /// Declared stylesheets followed by site-wide styles, in API order.
    pub fn stylesheet_urls(&self) -> Vec<String> {
        self.stylesheet_refs
            .iter()
            .map(|s| s.url.clone())
            .chain(self.site_style_refs.iter().cloned())
            .collect()
    }
}

/// A node of `/api/v1/book/<id>/toc/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocNode {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub fragment: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub href: String,
    #[serde(deserialize_with = "depth_from_number_or_string")]
    pub depth: u32,
    #[serde(default)]
    pub children: Vec<TocNode>,
}

fn depth_from_number_or_string<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Depth {
        Number(u32),
        Text(String),
    }

    match Depth::deserialize(deserializer)? {
        Depth::Number(depth) => Ok(depth),
        Depth::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

const MISSING_VALUE: &str = "n/a";

/// Book information as returned by `/api/v1/book/<id>/`.
///
/// `null` values are replaced by `"n/a"` and the reader's progress
/// (`last_chapter_read`) is dropped.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BookMetadata {
    fields: Map<String, Value>,
}

impl BookMetadata {
    pub fn from_api(value: Value) -> anyhow::Result<Self> {
        let Value::Object(mut fields) = value else {
            anyhow::bail!("API: unexpected book info payload");
        };
        if fields.len() == 1 {
            anyhow::bail!(api_error_message(&Value::Object(fields)));
        }

        fields.remove("last_chapter_read");
        for value in fields.values_mut() {
            if value.is_null() {
                *value = Value::String(MISSING_VALUE.to_owned());
            }
        }

        Ok(Self { fields })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Scalar field rendered as text (numbers included).
    pub fn text_field(&self, key: &str) -> Option<String> {
        match self.fields.get(key)? {
            Value::String(text) => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            Value::Bool(flag) => Some(flag.to_string()),
            _ => None,
        }
    }

    pub fn title(&self) -> &str {
        self.str_field("title").unwrap_or(MISSING_VALUE)
    }

    pub fn web_url(&self) -> Option<&str> {
        self.str_field("web_url")
    }

    /// Cover image URL, when the API provided one.
    pub fn cover(&self) -> Option<&str> {
        self.str_field("cover")
            .filter(|url| !url.is_empty() && *url != MISSING_VALUE)
    }

    /// ISBN when present, otherwise the book id.
    pub fn identifier(&self, book_id: &str) -> String {
        self.text_field("isbn")
            .unwrap_or_else(|| book_id.to_owned())
    }

    /// `name` of each object in a list field (`authors`, `subjects`, ...).
    pub fn names(&self, key: &str, missing: &str) -> Vec<String> {
        let Some(Value::Array(items)) = self.fields.get(key) else {
            return Vec::new();
        };
        items
            .iter()
            .map(|item| {
                item.get("name")
                    .and_then(Value::as_str)
                    .unwrap_or(missing)
                    .to_owned()
            })
            .collect()
    }
}

/// Message for an API error envelope such as `{"detail": "Not found."}`.
pub fn api_error_message(value: &Value) -> String {
    match value.get("detail").and_then(Value::as_str) {
        Some(detail) => format!("API: {detail}"),
        None => format!("API: unexpected response: {value}"),
    }
}

/// True for the single-key objects the API returns instead of a payload.
pub fn is_api_error(value: &Value) -> bool {
    value.as_object().is_some_and(|object| object.len() == 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn book_metadata_normalizes_nulls_and_drops_progress() -> anyhow::Result<()> {
        let book = BookMetadata::from_api(serde_json::json!({
            "title": "Test Book",
            "isbn": null,
            "last_chapter_read": "ch07.html",
            "authors": [{"name": "A. Author"}, {}],
        }))?;

        assert_eq!(book.str_field("isbn"), Some("n/a"));
        assert_eq!(book.identifier("123"), "n/a");
        assert!(book.get("last_chapter_read").is_none());
        assert_eq!(book.names("authors", "n/d"), vec!["A. Author", "n/d"]);
        assert!(book.names("subjects", "n/d").is_empty());
        Ok(())
    }

    #[test]
    fn book_metadata_rejects_error_envelopes() {
        let err = BookMetadata::from_api(serde_json::json!({"detail": "Not found."}))
            .expect_err("error envelope");
        assert_eq!(err.to_string(), "API: Not found.");
    }

    #[test]
    fn identifier_falls_back_to_book_id() -> anyhow::Result<()> {
        let book = BookMetadata::from_api(serde_json::json!({"title": "T", "web_url": "u"}))?;
        assert_eq!(book.identifier("9781"), "9781");
        assert_eq!(book.cover(), None);
        Ok(())
    }

    #[test]
    fn toc_depth_accepts_numbers_and_strings() -> anyhow::Result<()> {
        let nodes: Vec<TocNode> = serde_json::from_value(serde_json::json!([
            {"id": "a", "fragment": "", "label": "A", "href": "a.html", "depth": 1, "children": [
                {"id": "b", "fragment": "b", "label": "B", "href": "a.html#b", "depth": "2", "children": []}
            ]}
        ]))?;
        assert_eq!(nodes[0].depth, 1);
        assert_eq!(nodes[0].children[0].depth, 2);
        Ok(())
    }

    #[test]
    fn chapter_detects_api_version_and_stylesheets() -> anyhow::Result<()> {
        let record: ChapterRecord = serde_json::from_value(serde_json::json!({
            "filename": "ch01.html",
            "title": "Intro",
            "content": "https://learning.oreilly.com/api/v2/epubs/urn:orm:book:1/files/ch01.html",
            "stylesheets": [{"url": "https://x/a.css"}],
            "site_styles": ["https://x/site.css"],
        }))?;
        let chapter = Chapter::from(record);
        assert_eq!(chapter.api_version, ApiVersion::V2);
        assert_eq!(chapter.xhtml_filename(), "ch01.xhtml");
        assert_eq!(
            chapter.stylesheet_urls(),
            vec!["https://x/a.css", "https://x/site.css"]
        );
        Ok(())
    }
}
