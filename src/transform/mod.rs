// src/transform/mod.rs

//! The final stage: renamed, visibility-adjusted archives published under
//! content-addressed maven coordinates.
//!
//! The derivation digest covers both input archives, the mapping snapshot
//! and every widening rule file, in that fixed order. Its first 16 hex
//! characters become the version suffix, so the coordinate itself is the
//! cache key: when both outputs already exist at that coordinate the whole
//! transform is skipped.

use crate::error::{Error, Result};
use crate::fsutil::{self, ScratchFile};
use crate::inputs::{FileFingerprint, InputCollector};
use crate::mappings::store;
use crate::mappings::{MemoryMappingTree, OFFICIAL, WORKSPACE};
use crate::maven::MavenRelease;
use crate::provision::SplitArtifacts;
use crate::remap::classfile::ClassFile;
use crate::remap::{MappingSet, RemapOptions, Remapper};
use crate::widener::{self, AccessRules};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// The maven group derived game artifacts are published under.
pub const GROUP: &str = "net.minecraft";
/// The module name of the common artifact.
pub const COMMON_MODULE: &str = "minecraft-common";
/// The module name of the client-only artifact.
pub const CLIENT_ONLY_MODULE: &str = "minecraft-clientOnly";

/// A single transformed jar and the coordinate it is published at.
#[derive(Debug, Clone)]
pub struct TransformedJar {
    pub path: PathBuf,
    pub release: MavenRelease,
}

/// Both transformed jars, suitable for a development environment.
#[derive(Debug, Clone)]
pub struct TransformedJars {
    pub common: TransformedJar,
    pub client_only: TransformedJar,
}

/// Produces transformed jars into a maven repository layout.
pub struct TransformedProvider {
    maven_root: PathBuf,
}

impl TransformedProvider {
    pub fn new(maven_root: impl Into<PathBuf>) -> Self {
        Self {
            maven_root: maven_root.into(),
        }
    }

    /// Deobfuscate and widen the split artifacts.
    ///
    /// `mappings` is the persisted mapping snapshot; `access_rules` the
    /// widening rule files. Outputs land at
    /// `net.minecraft:minecraft-{common,clientOnly}:<version>-<digest16>`.
    pub fn provide(
        &self,
        version: &str,
        artifacts: &SplitArtifacts,
        mappings: &FileFingerprint,
        access_rules: &[FileFingerprint],
        refresh: bool,
    ) -> Result<TransformedJars> {
        let mut inputs = InputCollector::new(format!("Minecraft {version}"));
        inputs.add_input(&artifacts.common.jar);
        inputs.add_input(&artifacts.client_only.jar);
        inputs.add_input(mappings);
        for rule in access_rules {
            inputs.add_input(rule);
        }
        let derivation = inputs.finish();
        let hash16 = &derivation.digest[..16];

        let common = release(version, COMMON_MODULE, hash16);
        let client_only = release(version, CLIENT_ONLY_MODULE, hash16);
        let common_jar = common.jar_location(&self.maven_root);
        let client_only_jar = client_only.jar_location(&self.maven_root);

        if refresh || !common_jar.exists() || !client_only_jar.exists() {
            transform_jars(
                mappings.path(),
                access_rules,
                &[artifacts.common.jar.path(), artifacts.client_only.jar.path()],
                &[common_jar.as_path(), client_only_jar.as_path()],
            )?;
        } else {
            info!("transformed jars for {} already present", common.coordinate());
        }

        // Keep a readable trace of what produced these jars.
        let trace = common.file_location(&self.maven_root, "inputs", "log");
        if !trace.exists() {
            fsutil::create_dir_all(trace.parent().expect("maven path has parent"))?;
            let scratch = ScratchFile::new(&trace)?;
            std::fs::write(scratch.path(), &derivation.trace)
                .map_err(|e| Error::cache("cannot write input trace", e))?;
            scratch.commit()?;
        }

        Ok(TransformedJars {
            common: TransformedJar {
                path: common_jar,
                release: common,
            },
            client_only: TransformedJar {
                path: client_only_jar,
                release: client_only,
            },
        })
    }
}

fn release(version: &str, module: &str, hash16: &str) -> MavenRelease {
    MavenRelease::new(GROUP, module, format!("{version}-{hash16}"))
}

/// Deobfuscate and widen a set of jars: one output per input, same order.
pub fn transform_jars(
    mappings_path: &Path,
    access_rules: &[FileFingerprint],
    inputs: &[&Path],
    outputs: &[&Path],
) -> Result<()> {
    assert_eq!(
        inputs.len(),
        outputs.len(),
        "every input jar needs exactly one output"
    );

    // Read all rule files into one combined set and precompute which
    // pre-rename class files they touch.
    let rules = widener::read_all(access_rules.iter().map(|rule| rule.path()))?;
    let widened_paths = rules.target_paths();

    // Load the persisted snapshot and flatten it for renaming.
    let mut tree = MemoryMappingTree::new();
    store::read_mappings(mappings_path, &mut tree)?;
    let mapping_set = MappingSet::from_tree(&tree, OFFICIAL, WORKSPACE)?;

    // Rules name pre-rename symbols but apply to renamed bytes.
    let remapped_rules = rules.remap(&mapping_set);

    let mut remapper = Remapper::new(mapping_set, RemapOptions::standard());

    // Register everything before renaming anything, so cross-archive
    // references resolve consistently.
    let tags = inputs
        .iter()
        .map(|input| remapper.register_input(input))
        .collect::<Result<Vec<_>>>()?;

    for (tag, output) in tags.into_iter().zip(outputs) {
        let start = Instant::now();
        let input = remapper.tag_path(tag).to_path_buf();
        info!("remapping {} to {}", input.display(), output.display());
        transform_jar(&remapper, &remapped_rules, &widened_paths, &input, output)?;
        debug!("remapping took {:.2?}", start.elapsed());
    }

    Ok(())
}

/// Transform a single jar: class entries are renamed (and widened when
/// targeted), everything else is copied verbatim. Entries are written in
/// sorted order with fixed timestamps so output bytes are reproducible.
fn transform_jar(
    remapper: &Remapper,
    rules: &AccessRules,
    widened_paths: &std::collections::BTreeSet<String>,
    input: &Path,
    output: &Path,
) -> Result<()> {
    let file = File::open(input)
        .map_err(|e| Error::cache(format!("cannot open archive {}", input.display()), e))?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;

    // Collect and sort first: the output ordering must not depend on input
    // entry order.
    let mut entries: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let mut content = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut content)?;
        entries.insert(name, content);
    }

    fsutil::create_dir_all(output.parent().ok_or_else(|| {
        Error::cache(
            format!("{} has no parent directory", output.display()),
            std::io::Error::from(std::io::ErrorKind::InvalidInput),
        )
    })?)?;

    let scratch = ScratchFile::new(output)?;
    {
        let file = File::create(scratch.path())
            .map_err(|e| Error::cache(format!("cannot write {}", output.display()), e))?;
        let mut writer = ZipWriter::new(file);
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default());

        for (name, content) in &entries {
            if name.ends_with(".class") {
                let (new_name, mut bytes) = remapper.remap_class(name, content)?;

                // Widening keys off the pre-rename path.
                if widened_paths.contains(name) {
                    let mut class = ClassFile::parse(&new_name, &bytes)?;
                    if rules.apply(&mut class)? {
                        bytes = class.write();
                    }
                }

                writer.start_file(new_name.as_str(), options)?;
                writer.write_all(&bytes)?;
            } else {
                writer.start_file(name.as_str(), options)?;
                writer.write_all(content)?;
            }
        }

        writer.finish()?;
    }
    scratch.commit()?;
    fsutil::update_sha1(output)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_embed_the_digest() {
        let release = release("1.20.4", COMMON_MODULE, "0123456789abcdef");
        assert_eq!(
            release.coordinate(),
            "net.minecraft:minecraft-common:1.20.4-0123456789abcdef"
        );
    }
}
