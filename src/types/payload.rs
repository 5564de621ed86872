//! JSON:API resource linkage payloads.
//!
//! `data` distinguishes three states, which is why it is wrapped in an
//! extra `Option`: absent (`None`), `null` (`Some(Linkage::Empty)`), and a
//! value.

use serde::{Deserialize, Deserializer, Serialize};

use super::identifier::Identifier;

/// Deserialize a field that is present, including an explicit `null`.
///
/// Paired with `#[serde(default)]` so that an absent field stays `None`.
pub(crate) fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// A `{type, id}` (or `{type, lid}`) reference to a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceIdentifierObject {
    /// Resource type.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Server id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Client-side local id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lid: Option<String>,
}

impl ResourceIdentifierObject {
    /// Reference a persisted resource.
    pub fn new(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id: Some(id.into()),
            lid: None,
        }
    }
}

/// Value of the `data` member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Linkage {
    /// To-many linkage.
    Many(Vec<ResourceIdentifierObject>),
    /// To-one linkage.
    One(ResourceIdentifierObject),
    /// Explicit `null`.
    Empty(()),
}

impl Linkage {
    /// True for `null` and `[]`.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Many(items) => items.is_empty(),
            Self::One(_) => false,
            Self::Empty(()) => true,
        }
    }
}

/// A link value: either a bare URL or a link object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Link {
    /// Bare URL.
    Href(String),
    /// Link object with metadata.
    Object {
        /// Target URL.
        href: String,
        /// Link metadata.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meta: Option<serde_json::Value>,
    },
}

impl Link {
    /// Target URL of the link.
    pub fn href(&self) -> &str {
        match self {
            Self::Href(href) => href,
            Self::Object { href, .. } => href,
        }
    }
}

/// The `links` member of a relationship.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationshipLinks {
    /// Link that fetches the related resources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related: Option<Link>,
    /// Link to the relationship itself.
    #[serde(rename = "self", default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<Link>,
}

/// A relationship object as it arrives from the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationshipPayload {
    /// Resource linkage; `None` when the member is absent.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub data: Option<Linkage>,
    /// Relationship links.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<RelationshipLinks>,
    /// Free-form relationship metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl RelationshipPayload {
    /// Payload with to-one linkage.
    pub fn one(value: Option<ResourceIdentifierObject>) -> Self {
        Self {
            data: Some(value.map_or(Linkage::Empty(()), Linkage::One)),
            ..Self::default()
        }
    }

    /// Payload with to-many linkage.
    pub fn many(values: Vec<ResourceIdentifierObject>) -> Self {
        Self {
            data: Some(Linkage::Many(values)),
            ..Self::default()
        }
    }

    /// Payload that only carries a related link.
    pub fn related_link(href: impl Into<String>) -> Self {
        Self {
            links: Some(RelationshipLinks {
                related: Some(Link::Href(href.into())),
                self_link: None,
            }),
            ..Self::default()
        }
    }

    /// Parse a relationship object from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Relationship data resolved to identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelatedData {
    /// To-one value.
    One(Option<Identifier>),
    /// To-many value, in order.
    Many(Vec<Identifier>),
}

/// Consumer-facing view of one relationship.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationshipData {
    /// Current value; `None` while nothing is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<RelatedData>,
    /// Links from the last payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<RelationshipLinks>,
    /// Meta from the last payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_absent_vs_null() {
        let absent = RelationshipPayload::from_json(r#"{"links":{"related":"/posts/1/author"}}"#).unwrap();
        assert_eq!(absent.data, None);
        assert_eq!(absent.links.unwrap().related.unwrap().href(), "/posts/1/author");

        let null = RelationshipPayload::from_json(r#"{"data":null}"#).unwrap();
        assert_eq!(null.data, Some(Linkage::Empty(())));
        assert!(null.data.unwrap().is_empty());
    }

    #[test]
    fn test_linkage_shapes() {
        let one = RelationshipPayload::from_json(r#"{"data":{"type":"user","id":"7"}}"#).unwrap();
        assert_eq!(one.data, Some(Linkage::One(ResourceIdentifierObject::new("user", "7"))));

        let many = RelationshipPayload::from_json(
            r#"{"data":[{"type":"comment","id":"1"},{"type":"comment","lid":"@lid:x"}],"meta":{"total":2}}"#,
        )
        .unwrap();
        match many.data {
            Some(Linkage::Many(items)) => {
                assert_eq!(items.len(), 2);
                assert_eq!(items[1].lid.as_deref(), Some("@lid:x"));
            }
            other => panic!("unexpected linkage: {:?}", other),
        }
        assert_eq!(many.meta.unwrap()["total"], 2);
    }

    #[test]
    fn test_link_object() {
        let payload = RelationshipPayload::from_json(
            r#"{"links":{"related":{"href":"/a","meta":{"count":3}}}}"#,
        )
        .unwrap();
        assert_eq!(payload.links.unwrap().related.unwrap().href(), "/a");
    }
}
