// src/provision/mod.rs

//! Provides the raw and split game archives for one version.
//!
//! The raw stage downloads the four upstream files (client archive, server
//! archive, and their bundled rename tables) in one parallel scope, then
//! extracts the real server archive out of the fat bundle. The split stage
//! derives the "common" and "client-only" archives, keyed by the digest of
//! the two inputs so re-runs are no-ops.

use crate::archive;
use crate::download::{DownloadScope, FileDownloader};
use crate::error::{Error, Result};
use crate::fsutil::{self, ScratchFile};
use crate::hash::{self, HashAlgorithm};
use crate::inputs::{FileFingerprint, InputCollector};
use crate::manifest::{Downloads, Library, ServerBundle};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

/// One game archive plus what is needed to consume it.
#[derive(Debug, Clone)]
pub struct GameJar {
    /// The archive itself.
    pub jar: FileFingerprint,
    /// The bundled rename table for this archive.
    pub mappings: FileFingerprint,
    /// Dependency coordinates (`group:name:version`) this archive needs.
    pub dependencies: Vec<String>,
}

/// The artifacts as downloaded: one jar per side.
#[derive(Debug, Clone)]
pub struct RawArtifacts {
    pub server: GameJar,
    pub client: GameJar,
}

/// The artifacts after splitting: the common jar carries everything the
/// server ships, the client jar only the remainder.
#[derive(Debug, Clone)]
pub struct SplitArtifacts {
    pub common: GameJar,
    pub client_only: GameJar,
}

impl SplitArtifacts {
    /// The rename tables used to deobfuscate the pair.
    pub fn mappings(&self) -> [&FileFingerprint; 2] {
        [&self.common.mappings, &self.client_only.mappings]
    }
}

/// Downloads and derives the game archives.
pub struct GameJarProvider<'a> {
    downloader: &'a dyn FileDownloader,
}

impl<'a> GameJarProvider<'a> {
    pub fn new(downloader: &'a dyn FileDownloader) -> Self {
        Self { downloader }
    }

    /// Download the vanilla archives into `target` and extract their
    /// dependencies.
    pub fn provide_raw(
        &self,
        target: &Path,
        downloads: &Downloads,
        client_libraries: &[Library],
    ) -> Result<RawArtifacts> {
        let mut scope = DownloadScope::new(self.downloader);
        let client_jar = downloads
            .client
            .download_to(downloads.client.cached_path(target, "client", "jar"))?
            .enqueue(&mut scope);
        let client_mappings = downloads
            .client_mappings
            .download_to(downloads.client_mappings.cached_path(target, "client", "txt"))?
            .enqueue(&mut scope);
        let fat_server_jar = downloads
            .server
            .download_to(downloads.server.cached_path(target, "server", "jar"))?
            .enqueue(&mut scope);
        let server_mappings = downloads
            .server_mappings
            .download_to(downloads.server_mappings.cached_path(target, "server", "txt"))?
            .enqueue(&mut scope);
        scope.close()?;

        // The downloadable server jar is a bundle; pull the real one out.
        let server_jar =
            target.join(format!("server-extracted-{}.jar", downloads.server.sha1));
        let server_libraries = extract_bundled_server(&fat_server_jar, &server_jar)?;

        let client_library_names = client_libraries
            .iter()
            .filter(|library| library.is_unconditional())
            .map(|library| library.name.clone())
            .collect();

        Ok(RawArtifacts {
            server: GameJar {
                jar: FileFingerprint::snapshot_immutable(&server_jar)?,
                mappings: FileFingerprint::new(server_mappings, &downloads.server_mappings.sha1),
                dependencies: server_libraries,
            },
            client: GameJar {
                jar: FileFingerprint::new(client_jar, &downloads.client.sha1),
                mappings: FileFingerprint::new(client_mappings, &downloads.client_mappings.sha1),
                dependencies: client_library_names,
            },
        })
    }

    /// Split the vanilla archives into common and client-only jars.
    ///
    /// The outputs are keyed by the derivation digest of both inputs;
    /// existing outputs short-circuit the split unless `refresh` is set.
    pub fn provide_split(
        &self,
        target: &Path,
        raw: &RawArtifacts,
        refresh: bool,
    ) -> Result<SplitArtifacts> {
        let mut inputs = InputCollector::new("Split jars");
        inputs.add_input(&raw.client.jar);
        inputs.add_input(&raw.server.jar);
        let derivation = inputs.finish();

        let common_jar = target.join(format!("common-{}.jar", derivation.digest));
        let client_only_jar = target.join(format!("client-only-{}.jar", derivation.digest));

        if refresh || !common_jar.exists() || !client_only_jar.exists() {
            archive::split(
                raw.server.jar.path(),
                raw.client.jar.path(),
                &common_jar,
                &client_only_jar,
            )?;

            let log = ScratchFile::new(target.join(format!("{}.log", derivation.digest)))?;
            std::fs::write(log.path(), &derivation.trace)
                .map_err(|e| Error::cache("cannot write split trace", e))?;
            log.commit()?;
        } else {
            info!("split archives for {} already present", derivation.digest);
        }

        // The common jar only depends on what both sides agree on.
        let client_set: HashSet<&String> = raw.client.dependencies.iter().collect();
        let common_dependencies = raw
            .server
            .dependencies
            .iter()
            .filter(|dep| client_set.contains(dep))
            .cloned()
            .collect();

        Ok(SplitArtifacts {
            common: GameJar {
                jar: FileFingerprint::snapshot_immutable(&common_jar)?,
                mappings: raw.server.mappings.clone(),
                dependencies: common_dependencies,
            },
            client_only: GameJar {
                jar: FileFingerprint::snapshot_immutable(&client_only_jar)?,
                mappings: raw.client.mappings.clone(),
                dependencies: raw.client.dependencies.clone(),
            },
        })
    }
}

/// Extract the inner server jar from the fat bundle, verifying it against
/// the bundle's own checksum list. Returns the bundled library coordinates.
fn extract_bundled_server(fat_jar: &Path, destination: &Path) -> Result<Vec<String>> {
    let metadata = ServerBundle::parse(fat_jar)?;

    let [version] = metadata.versions.as_slice() else {
        return Err(Error::malformed(
            fat_jar,
            format!(
                "expected exactly one bundled version, got {}",
                metadata.versions.len()
            ),
        ));
    };

    copy_bundled_if_needed(fat_jar, version, destination)?;

    Ok(metadata
        .libraries
        .iter()
        .map(|library| library.id.clone())
        .collect())
}

fn copy_bundled_if_needed(
    fat_jar: &Path,
    file: &crate::manifest::IncludedFile,
    destination: &Path,
) -> Result<()> {
    // Cheap hit: the extracted jar from a previous run is still valid.
    if destination.exists() {
        if let Ok(Ok(())) =
            hash::verify_file(HashAlgorithm::Sha256, destination, &file.sha256)
        {
            return Ok(());
        }
    }

    let content = archive::read_entry(fat_jar, &format!("META-INF/{}", file.path))?;
    let actual = hash::hash_bytes(HashAlgorithm::Sha256, &content);
    if actual != file.sha256 {
        return Err(Error::ChecksumMismatch {
            expected: file.sha256.clone(),
            actual,
        });
    }

    let scratch = ScratchFile::new(destination)?;
    std::fs::write(scratch.path(), &content)
        .map_err(|e| Error::cache("cannot write extracted server jar", e))?;
    scratch.commit()?;
    fsutil::update_sha1(destination)?;
    Ok(())
}
