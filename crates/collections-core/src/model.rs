//! The package collection data model.
//!
//! A [`Collection`] is the unit of persistence: a bundle of [`Package`] metadata
//! fetched from a single source and stamped with when it was produced and last
//! refreshed. Everything here is pure data — encoding and identity derivation
//! live in [`crate::encoding`] and [`crate::identifier`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::identifier::{CollectionIdentifier, CollectionSource, PackageIdentity};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub identifier: CollectionIdentifier,
    pub source: CollectionSource,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
    pub packages: Vec<Package>,
    pub created_at: DateTime<Utc>,
    pub last_processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRepository {
    pub url: Url,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub repository: PackageRepository,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub readme_url: Option<Url>,
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
    pub versions: Vec<Version>,
}

impl Package {
    /// The package's identity, derived from its repository URL — not a
    /// stored field, since it is a pure function of `repository`.
    pub fn identity(&self) -> PackageIdentity {
        PackageIdentity::from_repository_url(&self.repository.url)
    }

    /// Lower-cased haystack fields used by fallback substring search (§4.F).
    pub fn keywords_iter(&self) -> impl Iterator<Item = &str> {
        self.keywords.iter().flatten().map(String::as_str)
    }

    /// The union of target names across all of this package's versions, as
    /// written verbatim (trie entries are lower-cased by the caller, per the
    /// Trie's contract of not normalizing on its own).
    pub fn target_names(&self) -> impl Iterator<Item = &str> {
        self.versions
            .iter()
            .flat_map(|v| v.targets.iter().map(|t| t.name.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub version: String,
    pub package_name: String,
    pub tools_version: String,
    #[serde(default)]
    pub verified_platforms: Option<Vec<Platform>>,
    #[serde(default)]
    pub verified_swift_versions: Option<Vec<String>>,
    #[serde(default)]
    pub license: Option<License>,
    pub targets: Vec<Target>,
    pub products: Vec<Product>,
}

impl Version {
    /// Best-effort semver for ordering; falls back to lexicographic order
    /// when the stored string does not parse (collections are not required
    /// to carry strict semver).
    pub fn parsed_semver(&self) -> Option<semver::Version> {
        semver::Version::parse(&self.version).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Platform {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct License {
    #[serde(default)]
    pub name: Option<String>,
    pub url: Url,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub name: String,
    #[serde(default)]
    pub module_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub name: String,
    #[serde(rename = "type")]
    pub product_type: String,
    pub target_names: Vec<String>,
}

/// Order versions descending by semver, falling back to lexicographic order
/// for versions that fail to parse (§4.F: "sorted descending by semver").
pub fn sort_versions_descending(versions: &mut [Version]) {
    versions.sort_by(|a, b| match (a.parsed_semver(), b.parsed_semver()) {
        (Some(va), Some(vb)) => vb.cmp(&va),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => b.version.cmp(&a.version),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(v: &str) -> Version {
        Version {
            version: v.to_string(),
            package_name: "lib".to_string(),
            tools_version: "5.5".to_string(),
            verified_platforms: None,
            verified_swift_versions: None,
            license: None,
            targets: vec![],
            products: vec![],
        }
    }

    #[test]
    fn sorts_parseable_semver_descending() {
        let mut versions = vec![version("1.0.0"), version("2.1.0"), version("1.5.0")];
        sort_versions_descending(&mut versions);
        let ordered: Vec<_> = versions.iter().map(|v| v.version.as_str()).collect();
        assert_eq!(ordered, vec!["2.1.0", "1.5.0", "1.0.0"]);
    }

    #[test]
    fn unparseable_versions_sort_after_parseable_ones() {
        let mut versions = vec![version("not-semver"), version("1.0.0")];
        sort_versions_descending(&mut versions);
        assert_eq!(versions[0].version, "1.0.0");
        assert_eq!(versions[1].version, "not-semver");
    }
}
