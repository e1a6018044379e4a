// src/maven/mod.rs

//! Maven-style coordinates and repository layout.
//!
//! Derived artifacts are published into a local maven repository so that
//! downstream tooling can depend on them by exact coordinate. The version
//! string of a derived artifact embeds a truncated derivation digest, which
//! makes the coordinate itself a cache key.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// A single version of a module, such as `org.example:module:1.0.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MavenRelease {
    group: String,
    module: String,
    version: String,
}

impl MavenRelease {
    pub fn new(
        group: impl Into<String>,
        module: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            module: module.into(),
            version: version.into(),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// This release's coordinate, suitable to be used as a dependency string.
    pub fn coordinate(&self) -> String {
        format!("{}:{}:{}", self.group, self.module, self.version)
    }

    /// The directory holding this release's files, under `root`.
    pub fn directory(&self, root: &Path) -> PathBuf {
        let mut dir = root.to_path_buf();
        for part in self.group.split('.') {
            dir.push(part);
        }
        dir.push(&self.module);
        dir.push(&self.version);
        dir
    }

    /// The path of this release's main jar.
    pub fn jar_location(&self, root: &Path) -> PathBuf {
        self.file_location(root, "", "jar")
    }

    /// The path of an arbitrary file belonging to this release.
    pub fn file_location(&self, root: &Path, classifier: &str, ext: &str) -> PathBuf {
        let classifier = if classifier.is_empty() {
            String::new()
        } else {
            format!("-{classifier}")
        };
        self.directory(root)
            .join(format!("{}-{}{}.{}", self.module, self.version, classifier, ext))
    }
}

/// A single file in a maven repository: a release plus an optional
/// classifier and extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MavenArtifact {
    release: MavenRelease,
    classifier: Option<String>,
    extension: Option<String>,
}

impl MavenArtifact {
    pub fn new(
        release: MavenRelease,
        classifier: Option<String>,
        extension: Option<String>,
    ) -> Self {
        Self {
            release,
            classifier,
            extension,
        }
    }

    /// The main jar of a release.
    pub fn main(release: MavenRelease) -> Self {
        Self::new(release, None, None)
    }

    pub fn release(&self) -> &MavenRelease {
        &self.release
    }

    pub fn classifier(&self) -> Option<&str> {
        self.classifier.as_deref()
    }

    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    /// Parse a dependency string of the form
    /// `group:name:version[:classifier][@ext]`.
    pub fn parse(dependency: &str) -> Result<Self> {
        let (body, extension) = match dependency.rfind('@') {
            Some(at) if at > dependency.rfind(':').unwrap_or(0) => (
                &dependency[..at],
                Some(dependency[at + 1..].to_string()),
            ),
            _ => (dependency, None),
        };

        let parts: Vec<&str> = body.split(':').collect();
        match parts.as_slice() {
            [group, name, version] => Ok(Self::new(
                MavenRelease::new(*group, *name, *version),
                None,
                extension,
            )),
            [group, name, version, classifier] => Ok(Self::new(
                MavenRelease::new(*group, *name, *version),
                Some(classifier.to_string()),
                extension,
            )),
            _ => Err(Error::malformed(
                dependency,
                "expected group:name:version[:classifier][@ext]",
            )),
        }
    }

    /// Convert back to a dependency string.
    pub fn to_dependency_string(&self) -> String {
        let mut dependency = self.release.coordinate();
        if let Some(classifier) = &self.classifier {
            dependency.push(':');
            dependency.push_str(classifier);
        }
        if let Some(extension) = &self.extension {
            dependency.push('@');
            dependency.push_str(extension);
        }
        dependency
    }

    /// The path of this artifact's file under `root`.
    pub fn file_location(&self, root: &Path) -> PathBuf {
        self.release.file_location(
            root,
            self.classifier.as_deref().unwrap_or(""),
            self.extension.as_deref().unwrap_or("jar"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain() {
        let artifact = MavenArtifact::parse("com.example:thing:1.0").unwrap();
        assert_eq!(artifact.release().coordinate(), "com.example:thing:1.0");
        assert_eq!(artifact.classifier(), None);
        assert_eq!(artifact.extension(), None);
    }

    #[test]
    fn parse_classifier_and_extension() {
        let artifact = MavenArtifact::parse("com.example:thing:1.0:natives@zip").unwrap();
        assert_eq!(artifact.classifier(), Some("natives"));
        assert_eq!(artifact.extension(), Some("zip"));
        assert_eq!(
            artifact.to_dependency_string(),
            "com.example:thing:1.0:natives@zip"
        );
    }

    #[test]
    fn parse_extension_only() {
        let artifact = MavenArtifact::parse("com.example:thing:1.0@zip").unwrap();
        assert_eq!(artifact.classifier(), None);
        assert_eq!(artifact.extension(), Some("zip"));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(MavenArtifact::parse("only:two").is_err());
        assert!(MavenArtifact::parse("a:b:c:d:e").is_err());
    }

    #[test]
    fn repository_layout() {
        let release = MavenRelease::new("net.minecraft", "minecraft-common", "1.20.4-abcdef0123456789");
        let jar = release.jar_location(Path::new("/repo"));
        assert_eq!(
            jar,
            Path::new("/repo/net/minecraft/minecraft-common/1.20.4-abcdef0123456789/minecraft-common-1.20.4-abcdef0123456789.jar")
        );

        let log = release.file_location(Path::new("/repo"), "inputs", "log");
        assert!(log.ends_with(
            "minecraft-common/1.20.4-abcdef0123456789/minecraft-common-1.20.4-abcdef0123456789-inputs.log"
        ));
    }
}
