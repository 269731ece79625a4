//! Facet attribute types shared by every catalog hierarchy.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The closed set of facet dimensions a node may be tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacetDimension {
    Region,
    Incident,
}

impl FacetDimension {
    pub const ALL: [FacetDimension; 2] = [FacetDimension::Region, FacetDimension::Incident];

    pub fn as_str(&self) -> &'static str {
        match self {
            FacetDimension::Region => "region",
            FacetDimension::Incident => "incident",
        }
    }
}

impl fmt::Display for FacetDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a dimension name outside [`FacetDimension`] is referenced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown facet dimension '{0}'")]
pub struct UnknownFacetDimension(pub String);

impl FromStr for FacetDimension {
    type Err = UnknownFacetDimension;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "region" => Ok(FacetDimension::Region),
            "incident" => Ok(FacetDimension::Incident),
            _ => Err(UnknownFacetDimension(s.to_string())),
        }
    }
}

/// Facet values carried by a single node, keyed by dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes(BTreeMap<FacetDimension, String>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds attributes from string-keyed pairs, rejecting unknown dimensions.
    pub fn try_from_pairs<I, K, V>(pairs: I) -> Result<Self, UnknownFacetDimension>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut attributes = Self::new();
        for (key, value) in pairs {
            let dimension = key.as_ref().parse::<FacetDimension>()?;
            attributes.insert(dimension, value);
        }
        Ok(attributes)
    }

    pub fn with(mut self, dimension: FacetDimension, value: impl Into<String>) -> Self {
        self.insert(dimension, value);
        self
    }

    pub fn insert(&mut self, dimension: FacetDimension, value: impl Into<String>) -> Option<String> {
        self.0.insert(dimension, value.into())
    }

    pub fn get(&self, dimension: FacetDimension) -> Option<&str> {
        self.0.get(&dimension).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FacetDimension, &str)> {
        self.0.iter().map(|(dimension, value)| (*dimension, value.as_str()))
    }
}

/// Provides read-only access to an entity's facet attributes.
pub trait AttributeContainer {
    fn attributes(&self) -> &Attributes;

    /// Fetches the value for a single dimension if present.
    fn attribute(&self, dimension: FacetDimension) -> Option<&str> {
        self.attributes().get(dimension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestContainer {
        attributes: Attributes,
    }

    impl AttributeContainer for TestContainer {
        fn attributes(&self) -> &Attributes {
            &self.attributes
        }
    }

    fn fixture_container() -> TestContainer {
        let attributes = Attributes::new()
            .with(FacetDimension::Region, "gulf-coast")
            .with(FacetDimension::Incident, "bayou-dularge");

        TestContainer { attributes }
    }

    #[test]
    fn attribute_returns_value_when_present() {
        let container = fixture_container();

        assert_eq!(container.attribute(FacetDimension::Region), Some("gulf-coast"));
        assert_eq!(
            container.attribute(FacetDimension::Incident),
            Some("bayou-dularge")
        );
    }

    #[test]
    fn attribute_returns_none_when_missing() {
        let container = TestContainer {
            attributes: Attributes::new(),
        };

        assert!(container.attribute(FacetDimension::Region).is_none());
    }

    #[test]
    fn dimension_names_parse_case_insensitively() {
        assert_eq!("Region".parse::<FacetDimension>(), Ok(FacetDimension::Region));
        assert_eq!(" incident ".parse::<FacetDimension>(), Ok(FacetDimension::Incident));
    }

    #[test]
    fn try_from_pairs_rejects_unknown_dimension() {
        let err = Attributes::try_from_pairs([("region", "gulf-coast"), ("severity", "high")])
            .expect_err("severity is not a facet");

        assert_eq!(err, UnknownFacetDimension("severity".into()));
    }

    #[test]
    fn attributes_serialize_with_dimension_names() {
        let attributes = Attributes::new().with(FacetDimension::Region, "mid-atlantic");

        let json = serde_json::to_string(&attributes).expect("serialize attributes");

        assert_eq!(json, r#"{"region":"mid-atlantic"}"#);
    }
}
