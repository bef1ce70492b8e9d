//! Tagged identifier and source types
//!
//! Modeled as sum types with an explicit `_case` discriminator, matching the
//! on-disk `{_case, url}` shape the collection format uses.

use serde::{Deserialize, Serialize};
use url::Url;

/// Identifies a collection. The only variant today is a JSON collection
/// addressed by the URL it was fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "_case", rename_all = "lowercase")]
pub enum CollectionIdentifier {
    Json { url: Url },
}

impl CollectionIdentifier {
    pub fn json(url: Url) -> Self {
        CollectionIdentifier::Json { url }
    }

    /// The primary-table key: the URL in canonical string form.
    pub fn database_key(&self) -> String {
        match self {
            CollectionIdentifier::Json { url } => url.to_string(),
        }
    }

    pub fn url(&self) -> &Url {
        match self {
            CollectionIdentifier::Json { url } => url,
        }
    }
}

/// The kind of remote a collection's `source` points at. Enumerated; only
/// `json` exists today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionSourceType {
    Json,
}

/// Where a collection came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSource {
    #[serde(rename = "type")]
    pub source_type: CollectionSourceType,
    pub url: Url,
}

/// Identity of a package, derived from its repository URL. Used as the trie
/// and cache's per-package key and as the FTS `id` column.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PackageIdentity(pub String);

impl PackageIdentity {
    pub fn from_repository_url(url: &Url) -> Self {
        PackageIdentity(url.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_key_is_canonical_url_string() {
        let url = Url::parse("https://example.org/c1.json").unwrap();
        let id = CollectionIdentifier::json(url.clone());
        assert_eq!(id.database_key(), url.to_string());
    }

    #[test]
    fn package_identity_derives_from_repository_url() {
        let url = Url::parse("https://github.com/acme/lib").unwrap();
        let identity = PackageIdentity::from_repository_url(&url);
        assert_eq!(identity.as_str(), "https://github.com/acme/lib");
    }
}
