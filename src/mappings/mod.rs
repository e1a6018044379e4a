// src/mappings/mod.rs

//! Rename tables: how they are described, resolved, merged and persisted.
//!
//! The flow is a two-step state machine. A [`MappingProvider`] declares
//! where the table comes from; [`MappingProvider::resolve`] snapshots all of
//! its inputs into an immutable [`ResolvedMappings`], which can then be
//! fingerprinted (for cache keys) and replayed into any [`MappingVisitor`]
//! (to build trees, write snapshot files, or drive the rename engine).

pub mod proguard;
pub mod provider;
pub mod store;
pub mod supplement;
pub mod tiny;
pub mod tree;
pub mod visitor;

pub use provider::{MappingContext, MappingProvider, ResolvedMappings};
pub use store::MappingStore;
pub use supplement::SupplementData;
pub use tree::{ClassMapping, MemberMapping, MemoryMappingTree, Namespace, ParameterMapping};
pub use visitor::{ElementKind, MappingVisitor, MemberKind};

/// The namespace of the obfuscated names the game ships with.
pub const OFFICIAL: &str = "official";

/// The namespace of the readable names used in a development workspace.
pub const WORKSPACE: &str = "workspace";

#[cfg(test)]
pub(crate) mod testing {
    use super::visitor::{ElementKind, MappingVisitor, MemberKind};
    use crate::error::Result;

    /// Records every visitor call as a line of text, for asserting on exact
    /// call sequences.
    #[derive(Default)]
    pub struct RecordingVisitor {
        pub calls: Vec<String>,
    }

    impl MappingVisitor for RecordingVisitor {
        fn visit_namespaces(&mut self, src: &str, dst: &[&str]) -> Result<()> {
            self.calls.push(format!("namespaces {src} [{}]", dst.join(", ")));
            Ok(())
        }

        fn visit_class(&mut self, src_name: &str) -> Result<bool> {
            self.calls.push(format!("class {src_name}"));
            Ok(true)
        }

        fn visit_member(
            &mut self,
            kind: MemberKind,
            src_name: &str,
            src_desc: &str,
        ) -> Result<bool> {
            self.calls
                .push(format!("member {kind:?} {src_name} {src_desc}"));
            Ok(true)
        }

        fn visit_parameter(&mut self, lv_index: u32, src_name: &str) -> Result<bool> {
            self.calls.push(format!("parameter {lv_index} {src_name}"));
            Ok(true)
        }

        fn visit_dst_name(
            &mut self,
            element: ElementKind,
            namespace: usize,
            name: &str,
        ) -> Result<()> {
            self.calls
                .push(format!("dst {element:?} {namespace} {name}"));
            Ok(())
        }

        fn visit_comment(&mut self, element: ElementKind, comment: &str) -> Result<()> {
            self.calls.push(format!("comment {element:?} {comment}"));
            Ok(())
        }

        fn visit_end(&mut self) -> Result<()> {
            self.calls.push("end".to_string());
            Ok(())
        }
    }
}
