// src/archive/mod.rs

//! Splitting and merging of the game's class-file archives.
//!
//! The server archive's contents are (almost) a subset of the client's, so
//! the two can be partitioned into a "common" archive (everything the server
//! ships) and a "client-only" archive (the rest). Output archives are
//! written deterministically: entries sorted by path, a synthetic manifest
//! first, and a fixed zero timestamp on every entry, so byte-identical
//! inputs always produce byte-identical outputs.

use crate::error::{Error, Result};
use crate::fsutil::{self, ScratchFile};
use crate::hash::{self, HashAlgorithm};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;
use tracing::{info, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// The reserved metadata directory, excluded from splitting entirely.
const METADATA_DIR: &str = "META-INF/";

const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";
const MANIFEST_CONTENT: &[u8] = b"Manifest-Version: 1.0\r\n\r\n";

/// Paths that are allowed to differ between the client and server archives.
///
/// Some platform metadata files legitimately diverge in later releases; a
/// digest mismatch on any of these is downgraded to a warning. A mismatch on
/// any other path is a modeling violation and fails the split.
const KNOWN_DIVERGENT_PATHS: &[&str] = &[
    "version.json",
    "pack.mcmeta",
    "assets/.mcassetsroot",
    "data/.mcassetsroot",
];

fn deterministic_options() -> FileOptions {
    FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
}

fn open(path: &Path) -> Result<ZipArchive<BufReader<File>>> {
    let file = File::open(path)
        .map_err(|e| Error::cache(format!("cannot open archive {}", path.display()), e))?;
    Ok(ZipArchive::new(BufReader::new(file))?)
}

/// Digest every non-directory entry outside the metadata directory.
fn entry_digests(path: &Path) -> Result<BTreeMap<String, String>> {
    let mut archive = open(path)?;
    let mut digests = BTreeMap::new();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() || entry.name().starts_with(METADATA_DIR) {
            continue;
        }
        let name = entry.name().to_string();

        let mut content = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut content)?;
        digests.insert(name, hash::hash_bytes(HashAlgorithm::Xxh128, &content));
    }

    Ok(digests)
}

/// Check the archives can be partitioned at all.
///
/// Server-exclusive content cannot be classified, so a path present only on
/// the server side is fatal. Shared paths must have matching digests, except
/// for the explicit known-divergent files.
fn check_consistent(
    server: &BTreeMap<String, String>,
    client: &BTreeMap<String, String>,
) -> Result<()> {
    for (path, server_digest) in server {
        match client.get(path) {
            None => {
                return Err(Error::InconsistentArchives(format!(
                    "{path} appears in the server archive, but not the client archive"
                )));
            }
            Some(client_digest) if client_digest != server_digest => {
                if KNOWN_DIVERGENT_PATHS.contains(&path.as_str()) {
                    warn!("client and server have different contents for {path}");
                } else {
                    return Err(Error::InconsistentArchives(format!(
                        "client and server have different contents for {path}"
                    )));
                }
            }
            Some(_) => {}
        }
    }

    Ok(())
}

/// Read one named entry out of an archive.
pub fn read_entry(path: &Path, name: &str) -> Result<Vec<u8>> {
    let mut archive = open(path)?;
    let mut entry = archive
        .by_name(name)
        .map_err(|_| Error::malformed(path, format!("missing archive entry {name}")))?;
    let mut content = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut content)?;
    Ok(content)
}

/// Copy the named entries from `source` into a new deterministic archive at
/// `destination`.
fn copy_entries(source: &Path, destination: &Path, names: &BTreeSet<String>) -> Result<()> {
    let mut archive = open(source)?;
    let scratch = ScratchFile::new(destination)?;

    {
        let file = File::create(scratch.path())
            .map_err(|e| Error::cache(format!("cannot write {}", destination.display()), e))?;
        let mut writer = ZipWriter::new(file);
        let options = deterministic_options();

        writer.start_file(MANIFEST_PATH, options)?;
        writer.write_all(MANIFEST_CONTENT)?;

        // BTreeSet iteration gives the sorted order that makes output bytes
        // reproducible.
        for name in names {
            let mut entry = archive.by_name(name)?;
            let mut content = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut content)?;
            drop(entry);

            writer.start_file(name.as_str(), options)?;
            writer.write_all(&content)?;
        }

        writer.finish()?;
    }

    scratch.commit()?;
    fsutil::update_sha1(destination)?;
    Ok(())
}

/// Copy the union of entries, preferring the client archive's bytes.
fn copy_union(
    server: &Path,
    client: &Path,
    destination: &Path,
    names: &BTreeSet<String>,
    client_names: &BTreeSet<String>,
) -> Result<()> {
    let mut server_archive = open(server)?;
    let mut client_archive = open(client)?;
    let scratch = ScratchFile::new(destination)?;

    {
        let file = File::create(scratch.path())
            .map_err(|e| Error::cache(format!("cannot write {}", destination.display()), e))?;
        let mut writer = ZipWriter::new(file);
        let options = deterministic_options();

        writer.start_file(MANIFEST_PATH, options)?;
        writer.write_all(MANIFEST_CONTENT)?;

        for name in names {
            let archive = if client_names.contains(name) {
                &mut client_archive
            } else {
                &mut server_archive
            };
            let mut entry = archive.by_name(name)?;
            let mut content = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut content)?;
            drop(entry);

            writer.start_file(name.as_str(), options)?;
            writer.write_all(&content)?;
        }

        writer.finish()?;
    }

    scratch.commit()?;
    fsutil::update_sha1(destination)?;
    Ok(())
}

/// Split the game archives.
///
/// `common` receives every file that appears in the server archive (copied
/// from the server side); `client_only` receives the files only the client
/// ships.
pub fn split(server: &Path, client: &Path, common: &Path, client_only: &Path) -> Result<()> {
    info!(
        "splitting {} / {}",
        server.display(),
        client.display()
    );

    let server_entries = entry_digests(server)?;
    let client_entries = entry_digests(client)?;
    check_consistent(&server_entries, &client_entries)?;

    let server_names: BTreeSet<String> = server_entries.into_keys().collect();
    let client_only_names: BTreeSet<String> = client_entries
        .into_keys()
        .filter(|name| !server_names.contains(name))
        .collect();

    copy_entries(server, common, &server_names)?;
    copy_entries(client, client_only, &client_only_names)?;
    Ok(())
}

/// Merge the game archives into one, preferring client bytes for shared
/// paths. Shares the split's consistency check.
pub fn merge(server: &Path, client: &Path, merged: &Path) -> Result<()> {
    let server_entries = entry_digests(server)?;
    let client_entries = entry_digests(client)?;
    check_consistent(&server_entries, &client_entries)?;

    let client_names: BTreeSet<String> = client_entries.into_keys().collect();
    let mut all_names = client_names.clone();
    all_names.extend(server_entries.into_keys());

    copy_union(server, client, merged, &all_names, &client_names)
}
