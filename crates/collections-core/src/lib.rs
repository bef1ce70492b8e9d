//! Data model and canonical JSON encoding for package collections.
//!
//! This crate carries no I/O and no SQL dependency — it defines the wire
//! shape that `collections-index` persists, caches, and searches over.

pub mod encoding;
pub mod error;
pub mod identifier;
pub mod model;

pub use encoding::{decode_collection, encode_collection, identifier_base64};
pub use error::{CoreError, Result};
pub use identifier::{CollectionIdentifier, CollectionSource, CollectionSourceType, PackageIdentity};
pub use model::{
    sort_versions_descending, Collection, License, Package, PackageRepository, Platform, Product,
    Target, Version,
};
