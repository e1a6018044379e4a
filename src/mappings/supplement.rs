// src/mappings/supplement.rs

//! Supplementary mapping metadata: documentation and parameter names layered
//! on top of the base rename table.
//!
//! The data ships as a zip archive containing a single `supplement.json`,
//! keyed by workspace names. Visiting it enriches an existing tree without
//! altering any renames.

use super::visitor::{ElementKind, MappingVisitor, MemberKind};
use crate::archive;
use crate::error::Result;
use serde::Deserialize;
use std::path::Path;

/// The archive entry holding the metadata.
const DATA_ENTRY: &str = "supplement.json";

/// The contents of a supplementary metadata file.
#[derive(Debug, Clone, Deserialize)]
pub struct SupplementData {
    pub version: String,
    #[serde(default)]
    pub packages: Vec<PackageInfo>,
    #[serde(default)]
    pub classes: Vec<ClassInfo>,
}

/// Documentation for a package. Parsed for completeness; packages have no
/// counterpart in the rename table, so visiting skips them.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageInfo {
    pub name: String,
    #[serde(default)]
    pub javadoc: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassInfo {
    pub name: String,
    #[serde(default)]
    pub javadoc: Vec<String>,
    #[serde(default)]
    pub fields: Vec<FieldInfo>,
    #[serde(default)]
    pub methods: Vec<MethodInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    pub descriptor: String,
    #[serde(default)]
    pub javadoc: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MethodInfo {
    pub name: String,
    pub descriptor: String,
    #[serde(default)]
    pub javadoc: Vec<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParameterInfo {
    pub index: u32,
    pub name: String,
    #[serde(default)]
    pub javadoc: Option<String>,
}

impl SupplementData {
    /// Read the metadata out of its archive.
    pub fn from_archive(path: &Path) -> Result<Self> {
        let content = archive::read_entry(path, DATA_ENTRY)?;
        serde_json::from_slice(&content)
            .map_err(|e| crate::Error::malformed(path, e.to_string()))
    }

    /// Visit the enrichments on top of an existing table.
    ///
    /// `namespace` is the namespace the data is keyed by (the tree's source
    /// namespace). No destination names are visited: renames are the base
    /// layer's job.
    pub fn visit(&self, visitor: &mut dyn MappingVisitor, namespace: &str) -> Result<()> {
        visitor.visit_namespaces(namespace, &[])?;

        for class in &self.classes {
            if !visitor.visit_class(&class.name)? {
                continue;
            }
            visit_javadoc(visitor, ElementKind::Class, &class.javadoc)?;

            for field in &class.fields {
                if !visitor.visit_member(MemberKind::Field, &field.name, &field.descriptor)? {
                    continue;
                }
                visit_javadoc(visitor, ElementKind::Field, &field.javadoc)?;
            }

            for method in &class.methods {
                if !visitor.visit_member(MemberKind::Method, &method.name, &method.descriptor)? {
                    continue;
                }
                visit_javadoc(visitor, ElementKind::Method, &method.javadoc)?;

                for parameter in &method.parameters {
                    if !visitor.visit_parameter(parameter.index, &parameter.name)? {
                        continue;
                    }
                    if let Some(javadoc) = &parameter.javadoc {
                        visitor.visit_comment(ElementKind::Parameter, javadoc)?;
                    }
                }
            }
        }

        visitor.visit_end()
    }
}

fn visit_javadoc(
    visitor: &mut dyn MappingVisitor,
    element: ElementKind,
    javadoc: &[String],
) -> Result<()> {
    if !javadoc.is_empty() {
        visitor.visit_comment(element, &javadoc.join("\n"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mappings::tree::{MemoryMappingTree, Namespace};
    use crate::mappings::WORKSPACE;

    pub(crate) const SAMPLE_JSON: &str = r#"{
        "version": "1.0",
        "packages": [{"name": "net/minecraft", "javadoc": ["The root package."]}],
        "classes": [{
            "name": "net/Foo",
            "javadoc": ["A thing that runs.", "Carefully."],
            "fields": [{"name": "someField", "descriptor": "I", "javadoc": ["A counter."]}],
            "methods": [{
                "name": "run",
                "descriptor": "(I)V",
                "parameters": [{"index": 1, "name": "amount", "javadoc": "How much."}]
            }]
        }]
    }"#;

    #[test]
    fn enriches_existing_tree_without_renames() {
        let mut tree = MemoryMappingTree::new();
        tree.visit_namespaces(WORKSPACE, &["official"]).unwrap();
        tree.visit_class("net/Foo").unwrap();
        tree.visit_dst_name(ElementKind::Class, 0, "a").unwrap();
        tree.visit_member(MemberKind::Method, "run", "(I)V").unwrap();
        tree.visit_dst_name(ElementKind::Method, 0, "b").unwrap();
        tree.visit_end().unwrap();

        let data: SupplementData = serde_json::from_str(SAMPLE_JSON).unwrap();
        data.visit(&mut tree, WORKSPACE).unwrap();

        let class = tree.class("net/Foo").unwrap();
        // Rename untouched, documentation layered on.
        assert_eq!(class.name(Namespace::Dst(0)), Some("a"));
        assert_eq!(class.comment(), Some("A thing that runs.\nCarefully."));

        let method = class.method("run", "(I)V").unwrap();
        assert_eq!(method.name(Namespace::Dst(0)), Some("b"));
        let parameter = method.parameters().next().unwrap();
        assert_eq!(parameter.name(Namespace::Src), Some("amount"));
        assert_eq!(parameter.comment(), Some("How much."));

        // The field was only known to the supplement; it merges in with no
        // destination name.
        let field = class.field_by_name("someField", Namespace::Src).unwrap();
        assert_eq!(field.name(Namespace::Dst(0)), None);
    }
}
