//! Concrete rule kinds.
//!
//! Three rule families exercise the full engine surface: plain file
//! export ([`ExportFileRule`]), compiled-class manifests with ABI keys
//! ([`ClassManifestRule`]), and packaging with the ABI-based skip
//! ([`PackageRule`]).

pub mod export;
pub mod manifest;
pub mod package;

pub use export::ExportFileRule;
pub use manifest::ClassManifestRule;
pub use package::PackageRule;
