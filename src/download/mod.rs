// src/download/mod.rs

//! Resilient file acquisition.
//!
//! A [`FileDownload`] describes one file to fetch: URI, destination, optional
//! expected SHA-1 and a force flag. Downloads with an expected hash are
//! idempotent: when the destination already matches, no network I/O happens
//! at all. The actual fetch streams into a scratch file and atomically
//! renames it over the destination, so a partially-written file is never
//! visible, even to concurrent processes.
//!
//! [`DownloadScope`] batches several downloads and runs them in parallel,
//! surfacing every failure as one aggregate error when closed.

use crate::error::{Error, Result};
use crate::fsutil::{self, ScratchFile};
use crate::hash::{self, HashAlgorithm};
use rayon::prelude::*;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const MAX_ATTEMPTS: u32 = 3;
const TIMEOUT: Duration = Duration::from_secs(60);

/// A file to be downloaded.
#[derive(Debug, Clone)]
pub struct FileDownload {
    uri: Url,
    destination: PathBuf,
    sha1: Option<String>,
    force: bool,
}

impl FileDownload {
    /// Start building a download from a URL string.
    pub fn builder(url: &str, destination: impl Into<PathBuf>) -> Result<FileDownloadBuilder> {
        let uri = Url::parse(url)
            .map_err(|e| Error::malformed(url, format!("cannot parse URL: {e}")))?;
        Ok(FileDownloadBuilder {
            uri,
            destination: destination.into(),
            sha1: None,
            force: false,
        })
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Whether the destination already satisfies this download.
    ///
    /// With an expected hash, the (sidecar-cached) hash of the destination
    /// decides. Without one, mere existence is enough. A forced download is
    /// never skipped.
    fn can_skip(&self) -> bool {
        if self.force {
            return false;
        }

        match &self.sha1 {
            Some(expected) => match fsutil::try_get_sha1(&self.destination) {
                Some(actual) => actual == *expected,
                None => false,
            },
            None => self.destination.exists(),
        }
    }
}

/// Builder for [`FileDownload`]s.
#[derive(Debug)]
pub struct FileDownloadBuilder {
    uri: Url,
    destination: PathBuf,
    sha1: Option<String>,
    force: bool,
}

impl FileDownloadBuilder {
    /// Expect the file to have a specific SHA-1, enabling the idempotence
    /// check and post-download verification.
    pub fn expect_sha1(mut self, sha1: impl Into<String>) -> Self {
        self.sha1 = Some(sha1.into().to_lowercase());
        self
    }

    /// Always download, even when the destination already matches.
    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn build(self) -> FileDownload {
        FileDownload {
            uri: self.uri,
            destination: self.destination,
            sha1: self.sha1,
            force: self.force,
        }
    }

    /// Build and download immediately.
    pub fn download(self, downloader: &dyn FileDownloader) -> Result<()> {
        downloader.download(&self.build())
    }

    /// Build and enqueue on a scope for parallel downloading. Returns the
    /// destination path for convenience.
    pub fn enqueue(self, scope: &mut DownloadScope<'_>) -> PathBuf {
        let download = self.build();
        let destination = download.destination.clone();
        scope.enqueue(download);
        destination
    }
}

/// Downloads files to particular locations.
///
/// A trait so that tests (and offline mirrors) can substitute the transport
/// while keeping the scheduling and idempotence behavior.
pub trait FileDownloader: Sync {
    fn download(&self, download: &FileDownload) -> Result<()>;
}

/// A scope for scheduling several parallel downloads.
///
/// Downloads are queued by [`enqueue`](DownloadScope::enqueue) and run when
/// the scope is [`close`](DownloadScope::close)d. Every failure is collected;
/// the aggregate error covers all of them.
pub struct DownloadScope<'a> {
    downloader: &'a dyn FileDownloader,
    queued: Vec<FileDownload>,
}

impl<'a> DownloadScope<'a> {
    pub fn new(downloader: &'a dyn FileDownloader) -> Self {
        Self {
            downloader,
            queued: Vec::new(),
        }
    }

    /// Enqueue a file to be downloaded when the scope closes.
    pub fn enqueue(&mut self, download: FileDownload) {
        self.queued.push(download);
    }

    /// Run all queued downloads in parallel and wait for completion.
    pub fn close(self) -> Result<()> {
        let errors: Vec<Error> = self
            .queued
            .par_iter()
            .filter_map(|download| self.downloader.download(download).err())
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::DownloadScope { errors })
        }
    }
}

/// The concrete [`FileDownloader`] backed by an HTTP client.
///
/// Redirects are followed transparently and a connect/response timeout
/// applies per attempt. Transient failures (network errors, non-2xx other
/// than 404, hash mismatches) are retried up to a small fixed bound; a 404
/// is terminal.
pub struct HttpDownloader {
    client: reqwest::blocking::Client,
}

impl HttpDownloader {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(TIMEOUT)
            .timeout(TIMEOUT)
            .build()
            .map_err(|e| {
                Error::cache(
                    "cannot create HTTP client",
                    io::Error::new(io::ErrorKind::Other, e),
                )
            })?;
        Ok(Self { client })
    }

    fn fetch(&self, download: &FileDownload, scratch: &ScratchFile) -> Result<FetchOutcome> {
        info!(
            "downloading {} to {}",
            download.uri,
            scratch.destination().display()
        );

        let mut attempt = 0;
        loop {
            attempt += 1;

            match self.try_fetch_once(download, scratch.path()) {
                Ok(()) => return Ok(FetchOutcome::Downloaded),
                Err(FetchFailure::NotFound(status)) => {
                    return Err(Error::download(
                        &download.uri,
                        format!("got status code {status}"),
                    ));
                }
                Err(failure) if attempt >= MAX_ATTEMPTS => return Err(failure.into_error(download)),
                Err(failure) => {
                    // Another process may have produced a valid destination
                    // while we were failing; prefer that over re-downloading.
                    // The scratch file must then be discarded, not committed.
                    if download.can_skip() {
                        return Ok(FetchOutcome::AlreadyPresent);
                    }
                    debug!(
                        "download of {} failed ({}), retrying",
                        download.uri,
                        failure.describe()
                    );
                }
            }
        }
    }

    fn try_fetch_once(
        &self,
        download: &FileDownload,
        scratch_path: &Path,
    ) -> std::result::Result<(), FetchFailure> {
        let mut response = self
            .client
            .get(download.uri.as_str())
            .send()
            .map_err(FetchFailure::Transport)?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchFailure::NotFound(status.as_u16()));
        }
        if !status.is_success() {
            return Err(FetchFailure::Status(status.as_u16()));
        }

        let mut file = File::create(scratch_path).map_err(FetchFailure::Io)?;
        io::copy(&mut response, &mut file).map_err(FetchFailure::Io)?;

        if let Some(expected) = &download.sha1 {
            match hash::verify_file(HashAlgorithm::Sha1, scratch_path, expected)
                .map_err(FetchFailure::Io)?
            {
                Ok(()) => {}
                Err(mismatch) => return Err(FetchFailure::Checksum(mismatch)),
            }
        }

        Ok(())
    }
}

impl FileDownloader for HttpDownloader {
    fn download(&self, download: &FileDownload) -> Result<()> {
        if download.can_skip() {
            debug!("{} already present, skipping", download.destination.display());
            return Ok(());
        }

        let parent = download.destination.parent().ok_or_else(|| {
            Error::download(&download.uri, "destination has no parent directory")
        })?;
        fsutil::create_dir_all(parent)?;

        let scratch = ScratchFile::new(&download.destination)?;
        match self.fetch(download, &scratch)? {
            FetchOutcome::Downloaded => {
                scratch.commit()?;
                // Seed the sidecar cache so later idempotence checks are
                // cheap.
                if let Some(sha1) = &download.sha1 {
                    fsutil::set_sha1(&download.destination, sha1);
                }
            }
            // A concurrent acquirer produced a valid destination; dropping
            // the scratch guard discards our partial file.
            FetchOutcome::AlreadyPresent => {}
        }

        Ok(())
    }
}

enum FetchOutcome {
    Downloaded,
    AlreadyPresent,
}

enum FetchFailure {
    Transport(reqwest::Error),
    Status(u16),
    NotFound(u16),
    Checksum(hash::VerifyError),
    Io(io::Error),
}

impl FetchFailure {
    fn describe(&self) -> String {
        match self {
            FetchFailure::Transport(e) => e.to_string(),
            FetchFailure::Status(code) | FetchFailure::NotFound(code) => {
                format!("status code {code}")
            }
            FetchFailure::Checksum(e) => e.to_string(),
            FetchFailure::Io(e) => e.to_string(),
        }
    }

    fn into_error(self, download: &FileDownload) -> Error {
        match self {
            FetchFailure::Transport(e) => {
                Error::download_caused(&download.uri, "download failed", e)
            }
            FetchFailure::Status(code) | FetchFailure::NotFound(code) => {
                Error::download(&download.uri, format!("got status code {code}"))
            }
            FetchFailure::Checksum(e) => Error::ChecksumMismatch {
                expected: e.expected,
                actual: e.actual,
            },
            FetchFailure::Io(e) => Error::download_caused(&download.uri, "I/O failure", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Downloader that records requested URIs and writes fixed content.
    struct RecordingDownloader {
        requests: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    impl RecordingDownloader {
        fn new() -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                fail_on: None,
            }
        }
    }

    impl FileDownloader for RecordingDownloader {
        fn download(&self, download: &FileDownload) -> Result<()> {
            if download.can_skip() {
                return Ok(());
            }
            self.requests
                .lock()
                .unwrap()
                .push(download.uri().to_string());
            if self.fail_on.as_deref() == Some(download.uri().as_str()) {
                return Err(Error::download(download.uri(), "simulated failure"));
            }
            std::fs::write(download.destination(), b"payload").unwrap();
            Ok(())
        }
    }

    #[test]
    fn matching_destination_performs_no_requests() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.bin");
        std::fs::write(&dest, b"hello world").unwrap();

        let download = FileDownload::builder("https://example.invalid/a.bin", &dest)
            .unwrap()
            .expect_sha1("2aae6c35c94fcfb415dbe95f408b9ce91ee846ed")
            .build();

        // The skip check fires before any transport is touched, so even the
        // HTTP downloader never opens a connection here.
        let downloader = HttpDownloader::new().unwrap();
        downloader.download(&download).unwrap();
        downloader.download(&download).unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"hello world");
    }

    #[test]
    fn force_redownloads_even_when_matching() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.bin");
        std::fs::write(&dest, b"payload").unwrap();
        let sha = hash::hash_bytes(HashAlgorithm::Sha1, b"payload");

        let downloader = RecordingDownloader::new();
        let download = FileDownload::builder("https://example.invalid/a.bin", &dest)
            .unwrap()
            .expect_sha1(sha)
            .force()
            .build();

        downloader.download(&download).unwrap();
        assert_eq!(downloader.requests.lock().unwrap().len(), 1);
    }

    #[test]
    fn mismatched_destination_downloads() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.bin");
        std::fs::write(&dest, b"stale").unwrap();

        let downloader = RecordingDownloader::new();
        let download = FileDownload::builder("https://example.invalid/a.bin", &dest)
            .unwrap()
            .expect_sha1(hash::hash_bytes(HashAlgorithm::Sha1, b"payload"))
            .build();

        downloader.download(&download).unwrap();
        assert_eq!(downloader.requests.lock().unwrap().len(), 1);
        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
    }

    #[test]
    fn scope_runs_all_and_aggregates_failures() {
        let dir = tempfile::tempdir().unwrap();

        let mut downloader = RecordingDownloader::new();
        downloader.fail_on = Some("https://example.invalid/bad.bin".to_string());

        let mut scope = DownloadScope::new(&downloader);
        for name in ["one.bin", "two.bin", "bad.bin", "three.bin"] {
            FileDownload::builder(
                &format!("https://example.invalid/{name}"),
                dir.path().join(name),
            )
            .unwrap()
            .enqueue(&mut scope);
        }

        let err = scope.close().unwrap_err();
        match err {
            Error::DownloadScope { errors } => {
                assert_eq!(errors.len(), 1);
                assert!(errors[0].to_string().contains("bad.bin"));
            }
            other => panic!("unexpected error: {other}"),
        }

        // The failing download does not prevent the others.
        assert!(dir.path().join("one.bin").exists());
        assert!(dir.path().join("two.bin").exists());
        assert!(dir.path().join("three.bin").exists());
        assert_eq!(downloader.requests.lock().unwrap().len(), 4);
    }

    #[test]
    fn unparseable_url_is_rejected() {
        assert!(FileDownload::builder("not a url", "/tmp/x").is_err());
    }
}
