use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::domain::{parse_page_number, to_local};
use crate::error::MirrorError;

/// Relation type signalling that more pages follow.
pub const NEXT_PAGE_RELATION: &str = "GreaterThanOrEqualToRelation";

/// One page of the feed as served by the origin.
///
/// Only the pagination block is modelled; every other member is carried verbatim
/// so the page converts to the same RDF it arrived as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedPage {
    #[serde(rename = "@context", default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<ViewMember>,
    #[serde(flatten)]
    pub members: Map<String, Value>,
}

/// The `view` member. A value that is not a pagination block (an IRI, an array)
/// is kept as-is and leaves the page without relations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ViewMember {
    Block(View),
    Other(Value),
}

impl ViewMember {
    pub fn block(&self) -> Option<&View> {
        match self {
            ViewMember::Block(view) => Some(view),
            ViewMember::Other(_) => None,
        }
    }

    fn block_mut(&mut self) -> Option<&mut View> {
        match self {
            ViewMember::Block(view) => Some(view),
            ViewMember::Other(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Option::is_none"
    )]
    pub relation: Option<Vec<Relation>>,
    #[serde(flatten)]
    pub members: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    #[serde(
        rename = "@type",
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Option::is_none"
    )]
    pub kinds: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(flatten)]
    pub members: Map<String, Value>,
}

impl Relation {
    pub fn is_kind(&self, kind: &str) -> bool {
        self.kinds
            .as_deref()
            .is_some_and(|kinds| kinds.iter().any(|value| value == kind))
    }
}

impl FeedPage {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn to_value(&self) -> Result<Value, MirrorError> {
        serde_json::to_value(self).map_err(|err| MirrorError::Conversion(err.to_string()))
    }

    pub fn relations(&self) -> &[Relation] {
        self.view
            .as_ref()
            .and_then(ViewMember::block)
            .and_then(|view| view.relation.as_deref())
            .unwrap_or_default()
    }

    /// A page is terminal unless one of its relations announces a following page.
    pub fn has_next_page(&self) -> bool {
        self.relations()
            .iter()
            .any(|relation| relation.is_kind(NEXT_PAGE_RELATION))
    }

    /// Returns a copy whose relation targets point at sibling archive files
    /// (`./{local}`) instead of origin URLs. Pages without a usable `view` or
    /// without relations come back unchanged.
    pub fn with_relative_links(&self) -> Result<FeedPage, MirrorError> {
        let mut page = self.clone();
        let Some(relations) = page
            .view
            .as_mut()
            .and_then(ViewMember::block_mut)
            .and_then(|view| view.relation.as_mut())
        else {
            return Ok(page);
        };

        for relation in relations.iter_mut() {
            let target = relation.node.as_deref().unwrap_or_default();
            let url = Url::parse(target)
                .map_err(|_| MirrorError::InvalidRelation(target.to_string()))?;
            let origin = url
                .query_pairs()
                .find(|(key, _)| key == "pageNumber")
                .and_then(|(_, value)| parse_page_number(&value));
            relation.node = Some(to_local(origin).relative_ref());
        }
        Ok(page)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

fn one_or_many<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let value = Option::<OneOrMany<T>>::deserialize(deserializer)?;
    Ok(value.map(|value| match value {
        OneOrMany::Many(items) => items,
        OneOrMany::One(item) => vec![item],
    }))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn page(value: Value) -> FeedPage {
        FeedPage::from_value(value).unwrap()
    }

    #[test]
    fn rewrites_relation_targets() {
        let original = page(json!({
            "@context": ["https://example.org/context.jsonld"],
            "@id": "https://ipdc.example/doc/instantiesnapshot?limit=25&pageNumber=4",
            "view": {
                "@id": "https://ipdc.example/doc/instantiesnapshot?limit=25&pageNumber=4",
                "relation": [
                    {
                        "@type": "GreaterThanOrEqualToRelation",
                        "node": "https://ipdc.example/doc/instantiesnapshot?limit=25&pageNumber=5"
                    },
                    {
                        "@type": "LessThanOrEqualToRelation",
                        "node": "https://ipdc.example/doc/instantiesnapshot?limit=25&pageNumber=3"
                    }
                ]
            }
        }));

        let rewritten = original.with_relative_links().unwrap();
        let targets: Vec<_> = rewritten
            .relations()
            .iter()
            .map(|relation| relation.node.clone().unwrap())
            .collect();
        assert_eq!(targets, vec!["./6", "./4"]);
        // the caller's copy keeps the origin URLs
        assert!(original.relations()[0].node.as_deref().unwrap().starts_with("https://"));
    }

    #[test]
    fn missing_page_number_maps_to_first_file() {
        let original = page(json!({
            "view": {
                "relation": {
                    "@type": "GreaterThanOrEqualToRelation",
                    "node": "https://ipdc.example/doc/instantiesnapshot?limit=25"
                }
            }
        }));
        let rewritten = original.with_relative_links().unwrap();
        assert_eq!(rewritten.relations()[0].node.as_deref(), Some("./1"));
    }

    #[test]
    fn page_without_view_is_untouched() {
        let original = page(json!({"@id": "https://ipdc.example/x", "title": "no view"}));
        assert_eq!(original.with_relative_links().unwrap(), original);
        assert!(!original.has_next_page());

        let empty_view = page(json!({"view": {"@id": "https://ipdc.example/v"}}));
        assert_eq!(empty_view.with_relative_links().unwrap(), empty_view);
    }

    #[test]
    fn non_object_view_is_kept_and_terminal() {
        for view in [
            json!("https://ipdc.example/doc/instantiesnapshot?pageNumber=0"),
            json!([{"@id": "https://ipdc.example/v"}]),
            json!({"relation": "https://ipdc.example/doc/instantiesnapshot?pageNumber=1"}),
        ] {
            let original = page(json!({"@id": "https://ipdc.example/x", "view": view.clone()}));
            assert_matches!(&original.view, Some(ViewMember::Other(_)));
            assert!(!original.has_next_page());

            let rewritten = original.with_relative_links().unwrap();
            assert_eq!(rewritten.to_value().unwrap()["view"], view);
        }
    }

    #[test]
    fn relative_target_is_rejected() {
        let original = page(json!({
            "view": {"relation": [{"@type": "GreaterThanOrEqualToRelation", "node": "./3"}]}
        }));
        assert_matches!(
            original.with_relative_links(),
            Err(MirrorError::InvalidRelation(_))
        );
    }

    #[test]
    fn next_page_detection() {
        let more = page(json!({
            "view": {"relation": [
                {"@type": ["tree:Relation", "GreaterThanOrEqualToRelation"], "node": "https://a/?pageNumber=1"}
            ]}
        }));
        assert!(more.has_next_page());

        let last = page(json!({
            "view": {"relation": [{"@type": "LessThanOrEqualToRelation", "node": "https://a/?pageNumber=0"}]}
        }));
        assert!(!last.has_next_page());
    }
}
