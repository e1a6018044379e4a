// src/inputs/mod.rs

//! Inputs to a processing step, and the collector that reduces them to a
//! derivation digest.
//!
//! Each pipeline stage binds its inputs (file fingerprints, nested
//! computations) into an [`InputCollector`]. The collector folds every digest
//! into one rolling hash, giving a single derivation digest that keys the
//! stage's content-addressed output. It also keeps a named trace tree so the
//! derivation can be logged and debugged; the trace never participates in
//! the digest.

use crate::error::Result;
use crate::fsutil;
use crate::hash::{self, HashAlgorithm, Hasher};
use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// An input to some processing step.
pub trait BuildInput {
    /// Register this input's digests and children with the collector.
    ///
    /// Call [`InputCollector::add_input`] rather than invoking this directly,
    /// so the trace frame for this input is pushed and popped correctly.
    fn add_inputs(&self, collector: &mut InputCollector);

    /// A short human-readable label for the trace tree.
    fn describe(&self) -> String;
}

/// A path to a file along with a digest of its content.
///
/// Fingerprints bind a path into a cache key. They are never mutated; when
/// the underlying file changes, a new fingerprint supersedes the old one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFingerprint {
    path: PathBuf,
    digest: String,
}

impl FileFingerprint {
    /// Create a fingerprint from an already-known digest.
    pub fn new(path: impl Into<PathBuf>, digest: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            digest: digest.into(),
        }
    }

    /// Fingerprint a file by hashing its bytes now.
    pub fn snapshot(path: &Path) -> io::Result<Self> {
        let digest = hash::hash_file(HashAlgorithm::Md5, path)?;
        Ok(Self::new(path, digest))
    }

    /// Fingerprint an immutable file, trusting the cached sidecar hash and
    /// computing it only if missing.
    pub fn snapshot_immutable(path: &Path) -> io::Result<Self> {
        let digest = fsutil::get_sha1(path)?;
        Ok(Self::new(path, digest))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl BuildInput for FileFingerprint {
    fn add_inputs(&self, collector: &mut InputCollector) {
        collector.add_digest(&self.digest);
    }

    fn describe(&self) -> String {
        format!("{} ({})", self.path.display(), self.digest)
    }
}

/// A function that captures a file fingerprint from a path.
///
/// Mapping providers take this as a parameter so the caller decides whether
/// external sources are fingerprinted fresh or via the immutable cache.
pub trait FingerprintProvider {
    fn fingerprint(&self, path: &Path) -> Result<FileFingerprint>;
}

impl<F> FingerprintProvider for F
where
    F: Fn(&Path) -> Result<FileFingerprint>,
{
    fn fingerprint(&self, path: &Path) -> Result<FileFingerprint> {
        self(path)
    }
}

/// The result of reducing a collector: the derivation digest plus its
/// advisory trace.
pub struct Derivation {
    /// Hex digest summarizing every input, in registration order.
    pub digest: String,
    /// Readable rendering of the input tree. Never hashed.
    pub trace: String,
}

#[derive(Debug)]
struct TraceFrame {
    name: String,
    digests: Vec<String>,
    children: Vec<TraceFrame>,
}

impl TraceFrame {
    fn new(name: String) -> Self {
        Self {
            name,
            digests: Vec::new(),
            children: Vec::new(),
        }
    }

    fn render(&self, out: &mut String, indent: usize) {
        let pad = " ".repeat(indent);
        if self.children.is_empty() && self.digests.is_empty() {
            let _ = writeln!(out, "{}{} - (empty)", pad, self.name);
        } else if self.children.is_empty() && self.digests.len() == 1 {
            let _ = writeln!(out, "{}{} - {}", pad, self.name, self.digests[0]);
        } else {
            let _ = writeln!(out, "{}{}:", pad, self.name);
            for digest in &self.digests {
                let _ = writeln!(out, "{} - {}", pad, digest);
            }
            for child in &self.children {
                child.render(out, indent + 2);
            }
        }
    }
}

/// Accumulates inputs as a rolling hash plus a named trace tree.
///
/// Digests are folded in registration order: callers add sources in a fixed
/// logical sequence, and that order (not any content ordering) defines the
/// derivation digest.
pub struct InputCollector {
    name: String,
    hasher: Hasher,
    // Invariant: never empty; element 0 is the root frame.
    stack: Vec<TraceFrame>,
}

impl InputCollector {
    /// Construct a collector named for the computation being keyed.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            stack: vec![TraceFrame::new(name.clone())],
            hasher: Hasher::new(HashAlgorithm::Md5),
            name,
        }
    }

    /// Add an input, recording it as a child frame of the current one.
    pub fn add_input(&mut self, input: &dyn BuildInput) {
        debug!("adding {} as input to {}", input.describe(), self.name);

        self.stack.push(TraceFrame::new(input.describe()));
        let depth = self.stack.len();

        input.add_inputs(self);

        // A mismatched stack means an `add_inputs` implementation pushed or
        // popped frames itself; the digest would silently cover the wrong
        // tree, so fail loudly instead.
        assert_eq!(
            self.stack.len(),
            depth,
            "mismatched trace stack while collecting inputs for {}",
            self.name
        );
        let frame = self.stack.pop().expect("trace stack underflow");
        self.stack
            .last_mut()
            .expect("trace stack underflow")
            .children
            .push(frame);
    }

    /// Feed a digest into the rolling hash, recording it under the current
    /// trace frame.
    pub fn add_digest(&mut self, digest: &str) {
        self.hasher.update(digest.as_bytes());
        self.stack
            .last_mut()
            .expect("trace stack underflow")
            .digests
            .push(digest.to_string());
    }

    /// Reduce the collector to its derivation digest and trace.
    ///
    /// Consuming `self` makes the digest single-shot: no input can be added
    /// after the digest has been read.
    pub fn finish(self) -> Derivation {
        assert_eq!(
            self.stack.len(),
            1,
            "unbalanced trace stack at finish for {}",
            self.name
        );

        let mut trace = String::new();
        self.stack[0].render(&mut trace, 2);

        Derivation {
            digest: self.hasher.finalize(),
            trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nested {
        label: String,
        leaves: Vec<FileFingerprint>,
    }

    impl BuildInput for Nested {
        fn add_inputs(&self, collector: &mut InputCollector) {
            for leaf in &self.leaves {
                collector.add_input(leaf);
            }
        }

        fn describe(&self) -> String {
            self.label.clone()
        }
    }

    fn fp(name: &str, digest: &str) -> FileFingerprint {
        FileFingerprint::new(name, digest)
    }

    #[test]
    fn identical_inputs_identical_digest() {
        let build = || {
            let mut collector = InputCollector::new("test");
            collector.add_input(&fp("a.jar", "1111"));
            collector.add_input(&fp("b.jar", "2222"));
            collector.finish().digest
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn digest_depends_on_order() {
        let mut forward = InputCollector::new("test");
        forward.add_input(&fp("a.jar", "1111"));
        forward.add_input(&fp("b.jar", "2222"));

        let mut reversed = InputCollector::new("test");
        reversed.add_input(&fp("b.jar", "2222"));
        reversed.add_input(&fp("a.jar", "1111"));

        assert_ne!(forward.finish().digest, reversed.finish().digest);
    }

    #[test]
    fn nesting_does_not_change_digest() {
        // The trace tree structure is advisory; only the digest sequence
        // feeds the hash.
        let mut flat = InputCollector::new("test");
        flat.add_input(&fp("a.jar", "1111"));
        flat.add_input(&fp("b.jar", "2222"));

        let mut nested = InputCollector::new("test");
        nested.add_input(&Nested {
            label: "pair".into(),
            leaves: vec![fp("a.jar", "1111"), fp("b.jar", "2222")],
        });

        assert_eq!(flat.finish().digest, nested.finish().digest);
    }

    #[test]
    fn trace_names_every_frame() {
        let mut collector = InputCollector::new("Split jars");
        collector.add_input(&Nested {
            label: "mapping: base".into(),
            leaves: vec![fp("client.txt", "abcd")],
        });
        collector.add_digest("f00d");

        let derivation = collector.finish();
        assert!(derivation.trace.contains("Split jars"));
        assert!(derivation.trace.contains("mapping: base"));
        assert!(derivation.trace.contains("abcd"));
        assert!(derivation.trace.contains("f00d"));
    }

    #[test]
    fn snapshot_uses_current_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.txt");
        std::fs::write(&path, b"one").unwrap();
        let first = FileFingerprint::snapshot(&path).unwrap();

        std::fs::write(&path, b"two").unwrap();
        let second = FileFingerprint::snapshot(&path).unwrap();

        assert_ne!(first.digest(), second.digest());
    }
}
