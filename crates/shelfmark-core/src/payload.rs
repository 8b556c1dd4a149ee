//! Typed view of a proposed product edit.
//!
//! Product payloads arrive from an editing UI and carry the same facts in
//! several places: a top-level field, a nested `summary`, or a copy of the
//! catalog's own GraphQL product under `raw`. [`ProductPayload`] names each
//! shape that validation and sync actually read. Scalars are accepted as
//! either JSON numbers or strings; unrecognized or mistyped fields are
//! dropped during parsing rather than failing the request.
//!
//! Parsing happens once, at ingress, through [`ProductPayload::from_value`].
//! The only rejected input is a payload that is not a JSON object.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{ShelfError, ShelfResult};

/// Width and height of one product image, as reported by the source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    #[serde(default, deserialize_with = "lenient_string")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub width: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub height: Option<i64>,
}

impl ImageRef {
    /// `(width, height)` when both sides are present.
    pub fn dims(&self) -> Option<(i64, i64)> {
        Some((self.width?, self.height?))
    }
}

/// The `summary` block produced by the editing UI.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "tag_list")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub tags_title: Option<String>,
    #[serde(default, deserialize_with = "image_list")]
    pub images: Vec<ImageRef>,
}

/// One product metafield as sent to the catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metafield {
    #[serde(default, deserialize_with = "lenient_string")]
    pub namespace: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub key: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "lenient_string")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub value: Option<String>,
}

impl Metafield {
    /// Namespace, key and type are present and non-blank. The value may be
    /// empty.
    pub fn is_well_formed(&self) -> bool {
        [&self.namespace, &self.key, &self.kind]
            .iter()
            .all(|p| p.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }
}

/// A GraphQL connection edge: `{ "node": ImageRef }`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageEdge {
    #[serde(default)]
    pub node: Option<ImageRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageConnection {
    #[serde(default)]
    pub edges: Vec<ImageEdge>,
}

/// The catalog's product object as returned by its GraphQL API.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProduct {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "tag_list")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub images: Option<ImageConnection>,
}

impl RawProduct {
    pub fn images(&self) -> Vec<ImageRef> {
        self.images
            .iter()
            .flat_map(|c| c.edges.iter())
            .filter_map(|e| e.node.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawData {
    #[serde(default)]
    pub product: Option<RawProduct>,
}

/// `{ "data": { "product": ... } }`, the envelope of a product query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEnvelope {
    #[serde(default)]
    pub data: Option<RawData>,
}

impl RawEnvelope {
    pub fn product(&self) -> Option<&RawProduct> {
        self.data.as_ref()?.product.as_ref()
    }
}

/// A proposed product edit.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPayload {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub product_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub account_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub category_id: Option<i64>,
    #[serde(default, deserialize_with = "tag_list")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub tags_title: Option<String>,
    #[serde(default, deserialize_with = "image_list")]
    pub images: Vec<ImageRef>,
    #[serde(default, deserialize_with = "lenient_object")]
    pub featured_image: Option<ImageRef>,
    #[serde(default, deserialize_with = "lenient_object")]
    pub summary: Option<Summary>,
    #[serde(default, deserialize_with = "lenient_object")]
    pub raw: Option<RawEnvelope>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub vendor: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub product_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description_html: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "metafield_list")]
    pub metafields: Vec<Metafield>,
}

impl ProductPayload {
    /// Parse an inbound JSON value. Anything but an object is rejected.
    pub fn from_value(value: &Value) -> ShelfResult<Self> {
        if !value.is_object() {
            return Err(ShelfError::input("product payload must be a JSON object"));
        }
        ProductPayload::deserialize(value)
            .map_err(|e| ShelfError::input(format!("invalid product payload: {}", e)))
    }

    /// `title`, else `summary.title`; blank values count as absent.
    pub fn display_title(&self) -> Option<String> {
        non_blank(self.title.as_deref())
            .or_else(|| non_blank(self.summary.as_ref()?.title.as_deref()))
            .map(str::to_string)
    }

    /// `id`, else `productId`.
    pub fn product_ref(&self) -> Option<&str> {
        non_blank(self.id.as_deref()).or_else(|| non_blank(self.product_id.as_deref()))
    }

    /// Numeric category ids embedded in `tagsTitle`, `tags`,
    /// `summary.tagsTitle` and `summary.tags`, deduped in first-seen order.
    pub fn embedded_category_ids(&self) -> Vec<i64> {
        let mut texts: Vec<&str> = Vec::new();
        texts.extend(self.tags_title.as_deref());
        texts.extend(self.tags.iter().map(String::as_str));
        if let Some(s) = &self.summary {
            texts.extend(s.tags_title.as_deref());
            texts.extend(s.tags.iter().map(String::as_str));
        }
        category_ids_in(texts)
    }

    /// Every image the payload carries: `images`, `featuredImage`,
    /// `summary.images` and the embedded catalog product, in that order.
    pub fn all_images(&self) -> Vec<ImageRef> {
        let mut out = self.images.clone();
        out.extend(self.featured_image.clone());
        if let Some(s) = &self.summary {
            out.extend(s.images.iter().cloned());
        }
        if let Some(p) = self.raw.as_ref().and_then(RawEnvelope::product) {
            out.extend(p.images());
        }
        out
    }
}

/// Numbers of 9 to 15 digits standing alone in the given texts, deduped.
pub fn category_ids_in<'a>(texts: impl IntoIterator<Item = &'a str>) -> Vec<i64> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| Regex::new(r"\b(\d{9,15})\b").expect("literal pattern"));

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for text in texts {
        for cap in re.captures_iter(text) {
            if let Ok(id) = cap[1].parse::<i64>() {
                if seen.insert(id) {
                    out.push(id);
                }
            }
        }
    }
    out
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(scalar_string(&Value::deserialize(d)?))
}

fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// A list of scalars, or a single comma-separated string.
fn tag_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items.iter().filter_map(scalar_string).collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    })
}

fn lenient_object<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: for<'a> Deserialize<'a>,
{
    let v = Value::deserialize(d)?;
    if !v.is_object() {
        return Ok(None);
    }
    Ok(serde_json::from_value(v).ok())
}

fn objects_of<T: for<'a> Deserialize<'a>>(v: Value) -> Vec<T> {
    match v {
        Value::Array(items) => items
            .into_iter()
            .filter(Value::is_object)
            .filter_map(|i| serde_json::from_value(i).ok())
            .collect(),
        _ => Vec::new(),
    }
}

fn image_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<ImageRef>, D::Error> {
    Ok(objects_of(Value::deserialize(d)?))
}

fn metafield_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Metafield>, D::Error> {
    Ok(objects_of(Value::deserialize(d)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rejects_non_object() {
        assert!(ProductPayload::from_value(&json!([1, 2])).unwrap_err().is_input());
        assert!(ProductPayload::from_value(&json!("x")).unwrap_err().is_input());
    }

    #[test]
    fn test_lenient_scalars_and_mistyped_fields() {
        let p = ProductPayload::from_value(&json!({
            "id": 8123456789u64,
            "accountId": "7",
            "categoryId": "350123456",
            "title": "  ",
            "summary": { "title": "Pacific Tides" },
            "images": "not-a-list",
            "featuredImage": 42,
            "tags": "travel, 350123456 ,  pacific"
        }))
        .unwrap();
        assert_eq!(p.product_ref(), Some("8123456789"));
        assert_eq!(p.account_id, Some(7));
        assert_eq!(p.category_id, Some(350123456));
        assert_eq!(p.display_title().as_deref(), Some("Pacific Tides"));
        assert!(p.images.is_empty());
        assert!(p.featured_image.is_none());
        assert_eq!(p.tags, vec!["travel", "350123456", "pacific"]);
    }

    #[test]
    fn test_embedded_category_ids_dedup_in_order() {
        let p = ProductPayload::from_value(&json!({
            "tagsTitle": "cat 0350000001 / 12345678",
            "tags": ["900000002", "0350000001"],
            "summary": { "tagsTitle": "x 1234567890123456", "tags": ["777777777"] }
        }))
        .unwrap();
        // 8 and 16 digit numbers are not category ids.
        assert_eq!(p.embedded_category_ids(), vec![350000001, 900000002, 777777777]);
    }

    #[test]
    fn test_all_images_collects_every_source() {
        let p = ProductPayload::from_value(&json!({
            "images": [{ "width": 800, "height": "600" }, "junk"],
            "featuredImage": { "url": "https://img/f.jpg", "width": 1000, "height": 1000 },
            "summary": { "images": [{ "width": 300 }] },
            "raw": { "data": { "product": { "images": { "edges": [
                { "node": { "width": 640, "height": 480 } }
            ] } } } }
        }))
        .unwrap();
        let imgs = p.all_images();
        assert_eq!(imgs.len(), 4);
        assert_eq!(imgs[0].dims(), Some((800, 600)));
        assert_eq!(imgs[2].dims(), None);
        assert_eq!(imgs[3].dims(), Some((640, 480)));
    }

    #[test]
    fn test_metafield_well_formed() {
        let m: Metafield = serde_json::from_value(json!({
            "namespace": "custom", "key": "isbn", "type": "single_line_text_field", "value": "978"
        }))
        .unwrap();
        assert!(m.is_well_formed());
        let m: Metafield = serde_json::from_value(json!({
            "namespace": "custom", "key": "isbn", "type": "single_line_text_field"
        }))
        .unwrap();
        assert!(m.is_well_formed());
        let m: Metafield = serde_json::from_value(json!({ "namespace": "custom", "key": "" })).unwrap();
        assert!(!m.is_well_formed());
    }
}
