// src/manifest/mod.rs

//! Upstream version metadata: the published version manifest, per-version
//! descriptors and the metadata bundled inside the fat server archive.

use crate::download::{FileDownload, FileDownloadBuilder, FileDownloader};
use crate::error::{Error, Result};
use crate::fsutil;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// The published list of available game versions.
pub const VERSION_MANIFEST_URL: &str =
    "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json";

/// The upstream maven repository hosting the game's libraries.
pub const LIBRARIES_URL: &str = "https://libraries.minecraft.net/";

/// The contents of the version manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionManifest {
    pub latest: Latest,
    pub versions: Vec<ManifestVersion>,
}

/// The latest release and snapshot version ids.
#[derive(Debug, Clone, Deserialize)]
pub struct Latest {
    pub release: String,
    pub snapshot: String,
}

/// One version as listed in the manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestVersion {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// URL of the full version descriptor.
    pub url: String,
    pub sha1: String,
    #[serde(default)]
    pub compliance_level: i32,
}

/// The full descriptor for one game version. Fields we have no use for
/// (launch arguments, asset indices, logging config) are not modeled.
#[derive(Debug, Clone, Deserialize)]
pub struct GameVersion {
    pub id: String,
    pub downloads: Downloads,
    #[serde(default)]
    pub libraries: Vec<Library>,
}

/// The main downloads for a version.
#[derive(Debug, Clone, Deserialize)]
pub struct Downloads {
    pub client: DownloadInfo,
    pub client_mappings: DownloadInfo,
    pub server: DownloadInfo,
    pub server_mappings: DownloadInfo,
}

/// A single downloadable file with its expected hash.
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadInfo {
    pub sha1: String,
    pub size: u64,
    pub url: String,
}

impl DownloadInfo {
    /// A download of this file to `destination`, verified against the
    /// published hash.
    pub fn download_to(&self, destination: impl Into<PathBuf>) -> Result<FileDownloadBuilder> {
        Ok(FileDownload::builder(&self.url, destination)?.expect_sha1(&self.sha1))
    }

    /// The content-addressed cache location for this file: the published
    /// hash is part of the name, so a new upstream build never collides with
    /// a stale cached copy.
    pub fn cached_path(&self, dir: &Path, name: &str, ext: &str) -> PathBuf {
        dir.join(format!("{name}-{}.{ext}", self.sha1))
    }
}

/// A library needed to run the game.
#[derive(Debug, Clone, Deserialize)]
pub struct Library {
    pub name: String,
    #[serde(default)]
    pub rules: Option<Vec<Rule>>,
}

impl Library {
    /// Whether this library applies unconditionally (no platform rules).
    pub fn is_unconditional(&self) -> bool {
        self.rules.as_ref().map_or(true, |rules| rules.is_empty())
    }
}

/// A predicate controlling whether a library is needed on some platform.
#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    pub action: String,
    #[serde(default)]
    pub os: Option<Os>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Os {
    #[serde(default)]
    pub name: Option<String>,
}

/// Metadata about the fat server archive: the inner version jars and
/// libraries it bundles, read from `META-INF/versions.list` and
/// `META-INF/libraries.list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerBundle {
    pub versions: Vec<IncludedFile>,
    pub libraries: Vec<IncludedFile>,
}

/// A file included in the server bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludedFile {
    pub sha256: String,
    /// For versions this is the version name; for libraries the maven
    /// coordinate.
    pub id: String,
    /// Path of the file inside the bundle, relative to `META-INF`.
    pub path: String,
}

impl ServerBundle {
    /// Parse the bundle metadata out of a fat server archive.
    pub fn parse(archive: &Path) -> Result<Self> {
        Ok(Self {
            versions: parse_file_list(archive, "META-INF/versions.list")?,
            libraries: parse_file_list(archive, "META-INF/libraries.list")?,
        })
    }
}

fn parse_file_list(archive: &Path, entry: &str) -> Result<Vec<IncludedFile>> {
    let content = crate::archive::read_entry(archive, entry)?;
    let content = String::from_utf8(content)
        .map_err(|_| Error::malformed(archive, format!("{entry} is not UTF-8")))?;

    let mut files = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split('\t').collect();
        let [sha256, id, path] = parts.as_slice() else {
            return Err(Error::malformed(
                archive,
                format!("cannot parse included file {line:?} in {entry}"),
            ));
        };

        files.push(IncludedFile {
            sha256: sha256.to_string(),
            id: id.to_string(),
            path: path.to_string(),
        });
    }

    Ok(files)
}

/// Fetches metadata about a specific game version.
pub struct VersionProvider<'a> {
    cache: PathBuf,
    manifest_path: PathBuf,
    downloader: &'a dyn FileDownloader,
}

impl<'a> VersionProvider<'a> {
    pub fn new(cache: impl Into<PathBuf>, downloader: &'a dyn FileDownloader) -> Self {
        let cache = cache.into();
        let manifest_path = cache.join("manifest.json");
        Self {
            cache,
            manifest_path,
            downloader,
        }
    }

    /// Get or download the descriptor for `version`.
    ///
    /// The cached manifest is consulted first; when the version is unknown
    /// (or `refresh` is set) the manifest is re-downloaded once before
    /// giving up. The descriptor itself is cached by its published hash.
    pub fn version(&self, version: &str, refresh: bool) -> Result<GameVersion> {
        let info = self
            .manifest_version(version, refresh)?
            .ok_or_else(|| Error::UnknownVersion(version.to_string()))?;

        let descriptor_path = self
            .cache
            .join(version)
            .join(format!("version-{}.json", info.sha1));
        FileDownload::builder(&info.url, &descriptor_path)?
            .expect_sha1(&info.sha1)
            .download(self.downloader)?;

        fsutil::read_json(&descriptor_path)
    }

    fn manifest_version(&self, version: &str, refresh: bool) -> Result<Option<ManifestVersion>> {
        if !refresh && self.manifest_path.exists() {
            if let Some(info) = self.find_in_manifest(version)? {
                return Ok(Some(info));
            }
        }

        // Unknown (or stale) version: re-download the manifest and try again.
        FileDownload::builder(VERSION_MANIFEST_URL, &self.manifest_path)?
            .force()
            .download(self.downloader)?;
        self.find_in_manifest(version)
    }

    fn find_in_manifest(&self, version: &str) -> Result<Option<ManifestVersion>> {
        let manifest: VersionManifest = fsutil::read_json(&self.manifest_path)?;
        Ok(manifest.versions.into_iter().find(|v| v.id == version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn parse_version_manifest() {
        let json = r#"{
            "latest": {"release": "1.20.4", "snapshot": "24w07a"},
            "versions": [
                {"id": "1.20.4", "type": "release",
                 "url": "https://example.invalid/1.20.4.json",
                 "time": "2023-12-07T12:56:20+00:00",
                 "releaseTime": "2023-12-07T12:56:20+00:00",
                 "sha1": "aaaabbbbccccddddeeeeffff0000111122223333",
                 "complianceLevel": 1}
            ]
        }"#;

        let manifest: VersionManifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.latest.release, "1.20.4");
        assert_eq!(manifest.versions[0].id, "1.20.4");
        assert_eq!(manifest.versions[0].kind, "release");
        assert_eq!(manifest.versions[0].compliance_level, 1);
    }

    #[test]
    fn parse_game_version() {
        let json = r#"{
            "id": "1.20.4",
            "downloads": {
                "client": {"sha1": "1111", "size": 10, "url": "https://example.invalid/client.jar"},
                "client_mappings": {"sha1": "2222", "size": 10, "url": "https://example.invalid/client.txt"},
                "server": {"sha1": "3333", "size": 10, "url": "https://example.invalid/server.jar"},
                "server_mappings": {"sha1": "4444", "size": 10, "url": "https://example.invalid/server.txt"}
            },
            "libraries": [
                {"name": "com.example:always:1.0"},
                {"name": "com.example:mac-only:1.0", "rules": [{"action": "allow", "os": {"name": "osx"}}]}
            ],
            "mainClass": "net.minecraft.client.main.Main"
        }"#;

        let version: GameVersion = serde_json::from_str(json).unwrap();
        assert_eq!(version.downloads.client.sha1, "1111");
        assert!(version.libraries[0].is_unconditional());
        assert!(!version.libraries[1].is_unconditional());
    }

    #[test]
    fn cached_path_embeds_hash() {
        let info = DownloadInfo {
            sha1: "abcd".into(),
            size: 1,
            url: "https://example.invalid/client.jar".into(),
        };
        assert_eq!(
            info.cached_path(Path::new("/cache/1.20.4"), "client", "jar"),
            Path::new("/cache/1.20.4/client-abcd.jar")
        );
    }

    /// Serves canned bytes per URL, recording each request.
    struct CannedDownloader {
        responses: Vec<(String, Vec<u8>)>,
        requests: Mutex<Vec<String>>,
    }

    impl FileDownloader for CannedDownloader {
        fn download(&self, download: &FileDownload) -> crate::Result<()> {
            self.requests
                .lock()
                .unwrap()
                .push(download.uri().to_string());
            let body = self
                .responses
                .iter()
                .find(|(url, _)| url == download.uri().as_str())
                .map(|(_, body)| body.clone())
                .ok_or_else(|| Error::download(download.uri(), "got status code 404"))?;
            fsutil::create_dir_all(download.destination().parent().unwrap())?;
            std::fs::write(download.destination(), body)?;
            Ok(())
        }
    }

    fn manifest_json() -> String {
        r#"{
            "latest": {"release": "1.20.4", "snapshot": "1.20.4"},
            "versions": [
                {"id": "1.20.4", "type": "release",
                 "url": "https://example.invalid/1.20.4.json",
                 "sha1": "aaaa"}
            ]
        }"#
        .to_string()
    }

    fn version_json() -> String {
        r#"{
            "id": "1.20.4",
            "downloads": {
                "client": {"sha1": "1111", "size": 10, "url": "https://example.invalid/client.jar"},
                "client_mappings": {"sha1": "2222", "size": 10, "url": "https://example.invalid/client.txt"},
                "server": {"sha1": "3333", "size": 10, "url": "https://example.invalid/server.jar"},
                "server_mappings": {"sha1": "4444", "size": 10, "url": "https://example.invalid/server.txt"}
            }
        }"#
        .to_string()
    }

    #[test]
    fn resolves_version_through_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = CannedDownloader {
            responses: vec![
                (VERSION_MANIFEST_URL.to_string(), manifest_json().into_bytes()),
                (
                    "https://example.invalid/1.20.4.json".to_string(),
                    version_json().into_bytes(),
                ),
            ],
            requests: Mutex::new(Vec::new()),
        };

        let provider = VersionProvider::new(dir.path(), &downloader);
        let version = provider.version("1.20.4", false).unwrap();
        assert_eq!(version.id, "1.20.4");
        assert_eq!(version.downloads.server.sha1, "3333");

        let err = provider.version("0.0.0", false).unwrap_err();
        assert!(matches!(err, Error::UnknownVersion(_)));
    }

    #[test]
    fn unknown_version_refreshes_manifest_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("manifest.json"),
            r#"{"latest": {"release": "old", "snapshot": "old"}, "versions": []}"#,
        )
        .unwrap();

        let downloader = CannedDownloader {
            responses: vec![
                (VERSION_MANIFEST_URL.to_string(), manifest_json().into_bytes()),
                (
                    "https://example.invalid/1.20.4.json".to_string(),
                    version_json().into_bytes(),
                ),
            ],
            requests: Mutex::new(Vec::new()),
        };

        let provider = VersionProvider::new(dir.path(), &downloader);
        provider.version("1.20.4", false).unwrap();

        let requests = downloader.requests.lock().unwrap();
        assert_eq!(
            requests
                .iter()
                .filter(|r| r.as_str() == VERSION_MANIFEST_URL)
                .count(),
            1
        );
    }
}
