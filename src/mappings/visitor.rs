// src/mappings/visitor.rs

//! The streaming visitor protocol for populating rename tables.
//!
//! Every mapping source (the bundled tables, supplementary metadata, the
//! persisted snapshot format) is expressed as a sequence of visitor calls
//! with a fixed order, because that order affects the determinism of
//! everything derived from it:
//!
//! 1. `visit_namespaces`, exactly once, before any content.
//! 2. `visit_class` per class, in source order. Returning `false` skips the
//!    class's content.
//! 3. Within a class: `visit_dst_name`/`visit_comment` for the class itself,
//!    then `visit_member` per field and method.
//! 4. Within a member: `visit_dst_name`/`visit_comment`, then
//!    `visit_parameter` per parameter (methods only), each followed by its
//!    own names and comment.
//! 5. `visit_end`, exactly once.

use crate::error::Result;

/// The element a destination name or comment attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Class,
    Field,
    Method,
    Parameter,
}

/// Which kind of class member is being visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Field,
    Method,
}

impl MemberKind {
    pub fn element(self) -> ElementKind {
        match self {
            MemberKind::Field => ElementKind::Field,
            MemberKind::Method => ElementKind::Method,
        }
    }
}

/// Receives a rename table as a stream of calls.
pub trait MappingVisitor {
    /// Declare the source namespace and the destination namespaces.
    fn visit_namespaces(&mut self, src: &str, dst: &[&str]) -> Result<()>;

    /// Start a class, named in the source namespace (internal `a/b/C` form).
    /// Returning `false` skips the class's names, comment and members.
    fn visit_class(&mut self, src_name: &str) -> Result<bool>;

    /// Start a member of the current class. Descriptors are JVM descriptors
    /// in source-namespace types. Returning `false` skips the member.
    fn visit_member(&mut self, kind: MemberKind, src_name: &str, src_desc: &str) -> Result<bool>;

    /// Start a parameter of the current method, identified by its local
    /// variable index.
    fn visit_parameter(&mut self, lv_index: u32, src_name: &str) -> Result<bool>;

    /// Name the current element in destination namespace `namespace`.
    fn visit_dst_name(&mut self, element: ElementKind, namespace: usize, name: &str) -> Result<()>;

    /// Attach documentation to the current element.
    fn visit_comment(&mut self, element: ElementKind, comment: &str) -> Result<()>;

    /// Finish the table.
    fn visit_end(&mut self) -> Result<()>;
}
