use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The upstream a descriptor was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Vanilla,
    Paper,
    Forge,
}

impl ProviderType {
    /// All known provider types, in the order a full run visits them.
    pub const ALL: [ProviderType; 3] = [Self::Vanilla, Self::Paper, Self::Forge];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vanilla => "vanilla",
            Self::Paper => "paper",
            Self::Forge => "forge",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "vanilla" | "mojang" => Some(Self::Vanilla),
            "paper" | "papermc" => Some(Self::Paper),
            "forge" => Some(Self::Forge),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown provider type: {0}")]
pub struct UnknownProviderType(pub String);

impl FromStr for ProviderType {
    type Err = UnknownProviderType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| UnknownProviderType(s.to_owned()))
    }
}

/// An upstream-native reference to one version, as returned by listing.
///
/// `detail_url` is wherever detail resolution starts for that upstream:
/// a per-version manifest, a build list, or the artifact itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub version: String,
    pub detail_url: String,
    pub released_at: Option<DateTime<Utc>>,
    pub stable: bool,
}

impl Candidate {
    pub fn new(version: impl Into<String>, detail_url: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            detail_url: detail_url.into(),
            released_at: None,
            stable: true,
        }
    }
}

/// Normalized record describing one version from one provider.
///
/// Identity is `(provider_type, version)`. `active`, `created_at` and
/// `updated_at` belong to the catalog lifecycle and are assigned by the
/// store; adapters leave them at their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDescriptor {
    pub provider_type: ProviderType,
    pub version: String,
    pub download_url: String,
    pub released_at: Option<DateTime<Utc>>,
    pub stable: bool,
    pub build_number: Option<u32>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VersionDescriptor {
    /// A descriptor as an adapter produces it: active, stable, no build number.
    pub fn resolved(
        provider_type: ProviderType,
        version: impl Into<String>,
        download_url: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            provider_type,
            version: version.into(),
            download_url: download_url.into(),
            released_at: None,
            stable: true,
            build_number: None,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_stable(mut self, stable: bool) -> Self {
        self.stable = stable;
        self
    }

    pub fn with_build_number(mut self, build_number: u32) -> Self {
        self.build_number = Some(build_number);
        self
    }

    pub fn with_released_at(mut self, released_at: Option<DateTime<Utc>>) -> Self {
        self.released_at = released_at;
        self
    }

    /// Whether any upstream-derived field differs from `other`.
    /// Identity and lifecycle fields are not compared.
    pub fn metadata_differs(&self, other: &VersionDescriptor) -> bool {
        self.download_url != other.download_url
            || self.stable != other.stable
            || self.build_number != other.build_number
            || self.released_at.map(|t| t.timestamp_millis())
                != other.released_at.map(|t| t.timestamp_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_type_round_trips_through_strings() {
        for provider in ProviderType::ALL {
            assert_eq!(ProviderType::parse(provider.as_str()), Some(provider));
            assert_eq!(provider.to_string().parse::<ProviderType>(), Ok(provider));
        }
    }

    #[test]
    fn provider_type_parse_accepts_aliases_and_case() {
        assert_eq!(ProviderType::parse("Mojang"), Some(ProviderType::Vanilla));
        assert_eq!(ProviderType::parse(" PAPER "), Some(ProviderType::Paper));
        assert_eq!(ProviderType::parse("fabric"), None);
    }

    #[test]
    fn provider_type_serializes_lowercase() {
        let json = serde_json::to_string(&ProviderType::Forge).unwrap();
        assert_eq!(json, "\"forge\"");
    }

    #[test]
    fn metadata_differs_ignores_lifecycle_fields() {
        let a = VersionDescriptor::resolved(ProviderType::Paper, "1.21.4", "https://x/1");
        let mut b = a.clone();
        b.active = false;
        b.updated_at = a.updated_at + chrono::Duration::hours(3);
        assert!(!a.metadata_differs(&b));

        let c = a.clone().with_build_number(12);
        assert!(a.metadata_differs(&c));

        let d = a.clone().with_stable(false);
        assert!(a.metadata_differs(&d));
    }
}
