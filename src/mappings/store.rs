// src/mappings/store.rs

//! Persists resolved mappings in a derivation-addressed cache.
//!
//! Mappings are cheap to recompute, but downstream consumers (the
//! decompiler, the constant-uninlining tool) run out of process and want the
//! table as a file. Snapshots are stored as gzipped tiny v2 under
//! `<cache>/<version>/mappings/<digest>.tiny.gz`, with a companion
//! `<digest>.log` input trace for debugging. Persistence is purely an
//! optimization: resolution is correct even if nothing is ever written.

use super::provider::ResolvedMappings;
use super::tiny::{self, TinyWriter};
use super::tree::MemoryMappingTree;
use super::visitor::MappingVisitor;
use crate::error::{Error, Result};
use crate::fsutil::{self, ScratchFile};
use crate::inputs::{FileFingerprint, InputCollector};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct MappingStore {
    cache: PathBuf,
}

impl MappingStore {
    pub fn new(cache: impl Into<PathBuf>) -> Self {
        Self {
            cache: cache.into(),
        }
    }

    /// Save a resolved snapshot, returning the fingerprint of the stored
    /// file. The file name is the snapshot's own derivation digest, so a
    /// present file is always current and the write is skipped.
    pub fn save(&self, version: &str, mappings: &ResolvedMappings) -> Result<FileFingerprint> {
        let mut collector = InputCollector::new("Mappings");
        collector.add_input(mappings);
        let derivation = collector.finish();

        let dir = self.cache.join(version).join("mappings");
        let path = dir.join(format!("{}.tiny.gz", derivation.digest));

        if path.exists() {
            debug!("mappings {} already stored", derivation.digest);
        } else {
            let mut tree = MemoryMappingTree::new();
            mappings.accept(&mut tree)?;

            fsutil::create_dir_all(&dir)?;
            let scratch = ScratchFile::new(&path)?;
            write_mappings(scratch.path(), &tree)?;
            scratch.commit()?;

            let log = ScratchFile::new(dir.join(format!("{}.log", derivation.digest)))?;
            std::fs::write(log.path(), &derivation.trace)
                .map_err(|e| Error::cache("cannot write mapping trace", e))?;
            log.commit()?;
        }

        Ok(FileFingerprint::new(path, derivation.digest))
    }
}

/// Write a mapping tree as a gzipped tiny v2 file.
pub fn write_mappings(path: &Path, tree: &MemoryMappingTree) -> Result<()> {
    let file = File::create(path)
        .map_err(|e| Error::cache(format!("cannot write mappings to {}", path.display()), e))?;
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut writer = TinyWriter::new(BufWriter::new(encoder));
    tree.accept(&mut writer)
}

/// Read a gzipped tiny v2 file into a visitor.
pub fn read_mappings(path: &Path, visitor: &mut dyn MappingVisitor) -> Result<()> {
    let file = File::open(path)
        .map_err(|e| Error::cache(format!("cannot read mappings from {}", path.display()), e))?;
    let decoder = flate2::read::GzDecoder::new(file);
    tiny::read(BufReader::new(decoder), path, visitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mappings::provider::{MappingContext, MappingProvider};
    use crate::mappings::tree::Namespace;

    static SNAPSHOT: fn(&Path) -> Result<FileFingerprint> =
        |path| FileFingerprint::snapshot(path).map_err(Into::into);

    fn resolve_official(table: &Path) -> ResolvedMappings {
        let context = MappingContext {
            builtin: vec![FileFingerprint::snapshot(table).unwrap()],
            fingerprint: &SNAPSHOT,
        };
        MappingProvider::Official.resolve(&context).unwrap()
    }

    #[test]
    fn save_round_trips_through_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("client.txt");
        std::fs::write(&table, "net.Foo -> a:\n    int someField -> b\n").unwrap();

        let store = MappingStore::new(dir.path().join("cache"));
        let resolved = resolve_official(&table);
        let stored = store.save("1.20.4", &resolved).unwrap();

        assert!(stored.path().exists());
        assert!(stored
            .path()
            .to_string_lossy()
            .ends_with(&format!("{}.tiny.gz", stored.digest())));

        // The companion trace exists and is readable text.
        let log = stored.path().with_file_name(format!("{}.log", stored.digest()));
        let trace = std::fs::read_to_string(log).unwrap();
        assert!(trace.contains("client.txt"));

        let mut tree = MemoryMappingTree::new();
        read_mappings(stored.path(), &mut tree).unwrap();
        let class = tree.class("net/Foo").unwrap();
        assert_eq!(class.name(Namespace::Dst(0)), Some("a"));
    }

    #[test]
    fn save_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("client.txt");
        std::fs::write(&table, "net.Foo -> a:\n").unwrap();

        let store = MappingStore::new(dir.path().join("cache"));
        let resolved = resolve_official(&table);

        let first = store.save("1.20.4", &resolved).unwrap();
        let before = std::fs::metadata(first.path()).unwrap().modified().unwrap();

        let second = store.save("1.20.4", &resolved).unwrap();
        assert_eq!(first.path(), second.path());
        assert_eq!(first.digest(), second.digest());
        let after = std::fs::metadata(second.path()).unwrap().modified().unwrap();
        assert_eq!(before, after);
    }
}
