// src/lib.rs

//! vanillarepack
//!
//! Provisions, deobfuscates and repackages the game's compiled artifacts
//! into deterministic, content-addressed derived artifacts that downstream
//! tooling can depend on by coordinate.
//!
//! # Architecture
//!
//! - Content-addressed: every stage's output location is derived from a
//!   digest of its inputs, so re-runs short-circuit and the pipeline is
//!   idempotent and safely re-entrant.
//! - Atomic: every published file goes through a scratch file and an atomic
//!   rename; concurrent readers and cross-process writers never observe a
//!   partial file.
//! - Deterministic: archives are written entry-sorted with fixed timestamps
//!   and mapping replay has a fixed call order, so identical inputs give
//!   byte-identical outputs across machines.
//!
//! Data flows acquisition → split → mapping resolution → transform:
//!
//! ```text
//! VersionProvider ── GameJarProvider::provide_raw ──> RawArtifacts
//!                    GameJarProvider::provide_split ─> SplitArtifacts
//! MappingProvider::resolve ─> ResolvedMappings ─ MappingStore::save ─> snapshot
//! TransformedProvider::provide {split, snapshot, rules} ─> TransformedJars
//! ```

pub mod archive;
pub mod download;
mod error;
pub mod fsutil;
pub mod hash;
pub mod inputs;
pub mod manifest;
pub mod mappings;
pub mod maven;
pub mod provision;
pub mod remap;
pub mod transform;
pub mod unpick;
pub mod widener;

pub use download::{DownloadScope, FileDownload, FileDownloader, HttpDownloader};
pub use error::{Error, Result};
pub use inputs::{BuildInput, Derivation, FileFingerprint, FingerprintProvider, InputCollector};
pub use manifest::VersionProvider;
pub use mappings::{MappingContext, MappingProvider, MappingStore, ResolvedMappings};
pub use maven::{MavenArtifact, MavenRelease};
pub use provision::{GameJar, GameJarProvider, RawArtifacts, SplitArtifacts};
pub use transform::{TransformedJar, TransformedJars, TransformedProvider};
