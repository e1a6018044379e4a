// src/mappings/provider.rs

//! Mapping providers and their resolved snapshots.
//!
//! A [`MappingProvider`] is a declarative description of where the rename
//! table comes from. Resolving it snapshots every input (file fingerprints,
//! layered sources) into a [`ResolvedMappings`], which is immutable,
//! fingerprintable via [`BuildInput`], and replayable: `accept` produces the
//! same visitor call sequence every time it is invoked.

use super::proguard;
use super::supplement::SupplementData;
use super::visitor::MappingVisitor;
use super::{OFFICIAL, WORKSPACE};
use crate::error::Result;
use crate::inputs::{BuildInput, FileFingerprint, FingerprintProvider, InputCollector};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

/// A declarative description of a rename-table source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingProvider {
    /// Use the rename tables bundled with the game.
    Official,
    /// Layer supplementary metadata (documentation, parameter names) over
    /// the bundled tables.
    Layered { supplement: PathBuf },
}

/// The context providers are resolved under.
pub struct MappingContext<'a> {
    /// The bundled rename tables, already fingerprinted by the caller.
    pub builtin: Vec<FileFingerprint>,
    /// How to fingerprint external sources.
    pub fingerprint: &'a dyn FingerprintProvider,
}

impl MappingProvider {
    /// Resolve this provider to an immutable snapshot.
    ///
    /// Bundled tables are taken from the context as-is; external sources are
    /// fingerprinted on demand. No mapping content is read here - that is
    /// deferred to replay.
    pub fn resolve(&self, context: &MappingContext<'_>) -> Result<ResolvedMappings> {
        match self {
            MappingProvider::Official => Ok(ResolvedMappings::Official {
                tables: context.builtin.clone(),
            }),
            MappingProvider::Layered { supplement } => {
                let base = MappingProvider::Official.resolve(context)?;
                let overlay = context.fingerprint.fingerprint(supplement)?;
                Ok(ResolvedMappings::Layered {
                    base: Box::new(base),
                    overlay,
                })
            }
        }
    }
}

/// An immutable, replayable snapshot of a rename table's sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedMappings {
    Official {
        tables: Vec<FileFingerprint>,
    },
    Layered {
        base: Box<ResolvedMappings>,
        overlay: FileFingerprint,
    },
}

impl ResolvedMappings {
    /// Replay this snapshot into a visitor: the base renames first, then any
    /// overlay enrichments.
    pub fn accept(&self, visitor: &mut dyn MappingVisitor) -> Result<()> {
        match self {
            ResolvedMappings::Official { tables } => {
                for table in tables {
                    let file = File::open(table.path()).map_err(|e| {
                        crate::Error::cache(
                            format!("cannot open mapping table {}", table.path().display()),
                            e,
                        )
                    })?;
                    proguard::read(
                        BufReader::new(file),
                        table.path(),
                        WORKSPACE,
                        OFFICIAL,
                        visitor,
                    )?;
                }
                Ok(())
            }
            ResolvedMappings::Layered { base, overlay } => {
                base.accept(visitor)?;
                let data = SupplementData::from_archive(overlay.path())?;
                data.visit(visitor, WORKSPACE)
            }
        }
    }
}

impl BuildInput for ResolvedMappings {
    fn add_inputs(&self, collector: &mut InputCollector) {
        match self {
            ResolvedMappings::Official { tables } => {
                for table in tables {
                    collector.add_input(table);
                }
            }
            ResolvedMappings::Layered { base, overlay } => {
                collector.add_input(base.as_ref());
                collector.add_input(overlay);
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            ResolvedMappings::Official { .. } => "mapping: official".to_string(),
            ResolvedMappings::Layered { .. } => "mapping: layered supplement".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mappings::testing::RecordingVisitor;

    static SNAPSHOT: fn(&std::path::Path) -> Result<FileFingerprint> =
        |path| FileFingerprint::snapshot(path).map_err(Into::into);

    fn context_with(builtin: Vec<FileFingerprint>) -> MappingContext<'static> {
        MappingContext {
            builtin,
            fingerprint: &SNAPSHOT,
        }
    }

    #[test]
    fn official_resolves_to_builtin_tables() {
        let builtin = vec![
            FileFingerprint::new("client.txt", "1111"),
            FileFingerprint::new("server.txt", "2222"),
        ];
        let resolved = MappingProvider::Official
            .resolve(&context_with(builtin.clone()))
            .unwrap();

        match &resolved {
            ResolvedMappings::Official { tables } => assert_eq!(*tables, builtin),
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn layered_fingerprints_overlay_and_orders_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let supplement = dir.path().join("supplement.zip");
        std::fs::write(&supplement, b"overlay-bytes").unwrap();

        let builtin = vec![FileFingerprint::new("client.txt", "1111")];
        let provider = MappingProvider::Layered {
            supplement: supplement.clone(),
        };
        let resolved = provider.resolve(&context_with(builtin)).unwrap();

        // Inputs must be base first, then overlay; layering on top must
        // change the digest.
        let mut layered = InputCollector::new("test");
        layered.add_input(&resolved);
        let layered = layered.finish();

        let mut base_only = InputCollector::new("test");
        base_only.add_input(
            &MappingProvider::Official
                .resolve(&context_with(vec![FileFingerprint::new(
                    "client.txt",
                    "1111",
                )]))
                .unwrap(),
        );
        let base_only = base_only.finish();

        assert_ne!(layered.digest, base_only.digest);
        assert!(layered.trace.contains("supplement.zip"));
    }

    #[test]
    fn layered_replay_emits_renames_and_annotations_once() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("client.txt");
        std::fs::write(&table, "net.Foo -> a.b.C:\n    void run(int) -> m\n").unwrap();

        let supplement = dir.path().join("supplement.zip");
        {
            use std::io::Write as _;
            let file = std::fs::File::create(&supplement).unwrap();
            let mut writer = zip::ZipWriter::new(file);
            writer
                .start_file("supplement.json", zip::write::FileOptions::default())
                .unwrap();
            writer
                .write_all(
                    br#"{"version": "1.0", "classes": [{"name": "net/Foo", "methods": [
                        {"name": "run", "descriptor": "(I)V",
                         "parameters": [{"index": 1, "name": "amount"}]}]}]}"#,
                )
                .unwrap();
            writer.finish().unwrap();
        }

        let resolved = MappingProvider::Layered {
            supplement: supplement.clone(),
        }
        .resolve(&context_with(vec![FileFingerprint::snapshot(&table).unwrap()]))
        .unwrap();

        let mut first = RecordingVisitor::default();
        resolved.accept(&mut first).unwrap();
        let mut second = RecordingVisitor::default();
        resolved.accept(&mut second).unwrap();
        assert_eq!(first.calls, second.calls);

        // Exactly one class-rename visit and one parameter annotation, no
        // matter how often replay runs.
        let renames = first
            .calls
            .iter()
            .filter(|call| call.starts_with("dst Class "))
            .count();
        assert_eq!(renames, 1);
        assert_eq!(
            first
                .calls
                .iter()
                .filter(|c| c.as_str() == "dst Class 0 a/b/C")
                .count(),
            1
        );
        let parameters = first
            .calls
            .iter()
            .filter(|call| call.starts_with("parameter "))
            .count();
        assert_eq!(parameters, 1);
        assert!(first.calls.contains(&"parameter 1 amount".to_string()));
    }

    #[test]
    fn replay_reads_base_tables() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("client.txt");
        std::fs::write(&table, "net.Foo -> a:\n    int x -> b\n").unwrap();

        let resolved = MappingProvider::Official
            .resolve(&context_with(vec![
                FileFingerprint::snapshot(&table).unwrap()
            ]))
            .unwrap();

        let mut first = RecordingVisitor::default();
        resolved.accept(&mut first).unwrap();
        let mut second = RecordingVisitor::default();
        resolved.accept(&mut second).unwrap();

        assert_eq!(first.calls, second.calls);
        assert!(first.calls.contains(&"class net/Foo".to_string()));
        assert!(first.calls.contains(&"dst Class 0 a".to_string()));
    }
}
