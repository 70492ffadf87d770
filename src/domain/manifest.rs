//! Data parcel manifests and subscription criteria

use serde::{Deserialize, Serialize};

/// Direction a parcel travels relative to the integration platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParcelDirection {
    /// Arriving from an external system
    Inbound,
    /// Leaving towards an external system
    Outbound,
    /// Moving between internal participants
    #[default]
    Internal,
}

impl std::fmt::Display for ParcelDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inbound => write!(f, "inbound"),
            Self::Outbound => write!(f, "outbound"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Descriptor of a produced payload
///
/// The core never looks past the manifest into the payload itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataParcelManifest {
    /// Broad category (e.g. "patient", "observation")
    pub category: String,

    /// Concrete data type within the category
    #[serde(rename = "data-type")]
    pub data_type: String,

    pub direction: ParcelDirection,

    /// System the parcel originated from
    #[serde(rename = "source-system", default)]
    pub source_system: Option<String>,

    /// Participant the parcel is meant for, if any
    #[serde(rename = "intended-target", default)]
    pub intended_target: Option<String>,
}

impl DataParcelManifest {
    /// Create a manifest with no source system and no intended target
    pub fn new(category: impl Into<String>, data_type: impl Into<String>, direction: ParcelDirection) -> Self {
        Self {
            category: category.into(),
            data_type: data_type.into(),
            direction,
            source_system: None,
            intended_target: None,
        }
    }

    /// Builder method to set the source system
    pub fn with_source_system(mut self, source: impl Into<String>) -> Self {
        self.source_system = Some(source.into());
        self
    }

    /// Builder method to set the intended target participant
    pub fn with_intended_target(mut self, target: impl Into<String>) -> Self {
        self.intended_target = Some(target.into());
        self
    }

    /// Check the fields every manifest must carry
    pub fn is_well_formed(&self) -> bool {
        !self.category.trim().is_empty() && !self.data_type.trim().is_empty()
    }
}

/// Subscription pattern matched against manifests
///
/// A `None` field matches any value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ManifestCriteria {
    #[serde(default)]
    pub category: Option<String>,

    #[serde(rename = "data-type", default)]
    pub data_type: Option<String>,

    #[serde(default)]
    pub direction: Option<ParcelDirection>,

    #[serde(rename = "source-system", default)]
    pub source_system: Option<String>,
}

impl ManifestCriteria {
    /// Criteria matching every manifest
    pub fn any() -> Self {
        Self::default()
    }

    /// Criteria for a category/data type pair in any direction
    pub fn for_type(category: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            data_type: Some(data_type.into()),
            ..Self::default()
        }
    }

    pub fn with_direction(mut self, direction: ParcelDirection) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn with_source_system(mut self, source: impl Into<String>) -> Self {
        self.source_system = Some(source.into());
        self
    }

    /// Whether a manifest satisfies every constrained field
    pub fn matches(&self, manifest: &DataParcelManifest) -> bool {
        fn field_ok(want: &Option<String>, have: &str) -> bool {
            want.as_deref().is_none_or(|w| w == have)
        }

        field_ok(&self.category, &manifest.category)
            && field_ok(&self.data_type, &manifest.data_type)
            && self.direction.is_none_or(|d| d == manifest.direction)
            && match (&self.source_system, &manifest.source_system) {
                (None, _) => true,
                (Some(want), Some(have)) => want == have,
                (Some(_), None) => false,
            }
    }
}

impl std::fmt::Display for ManifestCriteria {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let part = |v: &Option<String>| v.clone().unwrap_or_else(|| "*".to_string());
        write!(
            f,
            "{}/{}/{}/{}",
            part(&self.category),
            part(&self.data_type),
            self.direction.map(|d| d.to_string()).unwrap_or_else(|| "*".to_string()),
            part(&self.source_system)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lab_result() -> DataParcelManifest {
        DataParcelManifest::new("observation", "lab-result", ParcelDirection::Inbound).with_source_system("lis")
    }

    #[test]
    fn test_any_matches_everything() {
        assert!(ManifestCriteria::any().matches(&lab_result()));
    }

    #[test]
    fn test_type_criteria() {
        assert!(ManifestCriteria::for_type("observation", "lab-result").matches(&lab_result()));
        assert!(!ManifestCriteria::for_type("observation", "vital-sign").matches(&lab_result()));
        assert!(!ManifestCriteria::for_type("patient", "lab-result").matches(&lab_result()));
    }

    #[test]
    fn test_direction_and_source_constraints() {
        let inbound = ManifestCriteria::for_type("observation", "lab-result").with_direction(ParcelDirection::Inbound);
        let outbound = ManifestCriteria::for_type("observation", "lab-result").with_direction(ParcelDirection::Outbound);
        assert!(inbound.matches(&lab_result()));
        assert!(!outbound.matches(&lab_result()));

        let from_lis = ManifestCriteria::any().with_source_system("lis");
        let from_ris = ManifestCriteria::any().with_source_system("ris");
        assert!(from_lis.matches(&lab_result()));
        assert!(!from_ris.matches(&lab_result()));

        let no_source = DataParcelManifest::new("observation", "lab-result", ParcelDirection::Inbound);
        assert!(!from_lis.matches(&no_source));
    }

    #[test]
    fn test_well_formed() {
        assert!(lab_result().is_well_formed());
        assert!(!DataParcelManifest::new("", "x", ParcelDirection::Internal).is_well_formed());
        assert!(!DataParcelManifest::new("x", "  ", ParcelDirection::Internal).is_well_formed());
    }

    #[test]
    fn test_criteria_display() {
        let c = ManifestCriteria::for_type("patient", "admit").with_direction(ParcelDirection::Outbound);
        assert_eq!(c.to_string(), "patient/admit/outbound/*");
    }

    #[test]
    fn test_manifest_serde_uses_kebab_keys() {
        let m = lab_result().with_intended_target("archive");
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("data-type"));
        assert!(json.contains("intended-target"));
    }
}
