// src/mappings/tree.rs

//! An in-memory rename table, built by visiting and replayed by visiting.
//!
//! The tree is the merge point for layered sources: each source is visited
//! into the same tree, with classes matched by source-namespace name and
//! members by (name, descriptor). Insertion order is preserved so that
//! [`MemoryMappingTree::accept`] replays an identical call sequence every
//! time.

use super::visitor::{ElementKind, MappingVisitor, MemberKind};
use crate::error::{Error, Result};
use std::collections::HashMap;

/// Identifies one namespace of a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    /// The namespace source names are written in.
    Src,
    /// The n-th destination namespace.
    Dst(usize),
}

#[derive(Debug, Default)]
pub struct MemoryMappingTree {
    src_namespace: Option<String>,
    dst_namespaces: Vec<String>,
    classes: Vec<ClassMapping>,
    class_index: HashMap<String, usize>,

    // State for the visit in progress.
    ns_map: Vec<usize>,
    cursor: Cursor,
}

#[derive(Debug, Default)]
struct Cursor {
    class: Option<usize>,
    member: Option<(MemberKind, usize)>,
    parameter: Option<usize>,
}

/// One class and its members.
#[derive(Debug)]
pub struct ClassMapping {
    src_name: String,
    dst_names: Vec<Option<String>>,
    comment: Option<String>,
    fields: Vec<MemberMapping>,
    methods: Vec<MemberMapping>,
}

/// One field or method.
#[derive(Debug)]
pub struct MemberMapping {
    src_name: String,
    src_desc: String,
    dst_names: Vec<Option<String>>,
    comment: Option<String>,
    parameters: Vec<ParameterMapping>,
}

/// One method parameter, identified by local-variable index.
#[derive(Debug)]
pub struct ParameterMapping {
    lv_index: u32,
    src_name: String,
    dst_names: Vec<Option<String>>,
    comment: Option<String>,
}

fn set_dst(names: &mut Vec<Option<String>>, index: usize, name: &str) {
    if names.len() <= index {
        names.resize(index + 1, None);
    }
    names[index] = Some(name.to_string());
}

impl MemoryMappingTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn src_namespace(&self) -> Option<&str> {
        self.src_namespace.as_deref()
    }

    pub fn dst_namespaces(&self) -> &[String] {
        &self.dst_namespaces
    }

    /// Resolve a namespace by name.
    pub fn namespace(&self, name: &str) -> Option<Namespace> {
        if self.src_namespace.as_deref() == Some(name) {
            return Some(Namespace::Src);
        }
        self.dst_namespaces
            .iter()
            .position(|ns| ns == name)
            .map(Namespace::Dst)
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassMapping> {
        self.classes.iter()
    }

    /// Look up a class by source-namespace name.
    pub fn class(&self, src_name: &str) -> Option<&ClassMapping> {
        self.class_index.get(src_name).map(|&i| &self.classes[i])
    }

    /// Look up a class by its name in any namespace (linear for destination
    /// namespaces; rename engines flatten the tree instead of calling this
    /// in a loop).
    pub fn class_by_name(&self, name: &str, ns: Namespace) -> Option<&ClassMapping> {
        match ns {
            Namespace::Src => self.class(name),
            Namespace::Dst(_) => self.classes.iter().find(|c| c.name(ns) == Some(name)),
        }
    }

    /// Replay this tree into a visitor. The call sequence is identical on
    /// every invocation.
    pub fn accept(&self, visitor: &mut dyn MappingVisitor) -> Result<()> {
        let src = self
            .src_namespace
            .as_deref()
            .ok_or_else(|| Error::Mapping("cannot replay an empty mapping tree".into()))?;
        let dst: Vec<&str> = self.dst_namespaces.iter().map(String::as_str).collect();
        visitor.visit_namespaces(src, &dst)?;

        for class in &self.classes {
            if !visitor.visit_class(&class.src_name)? {
                continue;
            }
            replay_names(visitor, ElementKind::Class, &class.dst_names)?;
            if let Some(comment) = &class.comment {
                visitor.visit_comment(ElementKind::Class, comment)?;
            }

            for field in &class.fields {
                if !visitor.visit_member(MemberKind::Field, &field.src_name, &field.src_desc)? {
                    continue;
                }
                replay_names(visitor, ElementKind::Field, &field.dst_names)?;
                if let Some(comment) = &field.comment {
                    visitor.visit_comment(ElementKind::Field, comment)?;
                }
            }

            for method in &class.methods {
                if !visitor.visit_member(MemberKind::Method, &method.src_name, &method.src_desc)? {
                    continue;
                }
                replay_names(visitor, ElementKind::Method, &method.dst_names)?;
                if let Some(comment) = &method.comment {
                    visitor.visit_comment(ElementKind::Method, comment)?;
                }

                for parameter in &method.parameters {
                    if !visitor.visit_parameter(parameter.lv_index, &parameter.src_name)? {
                        continue;
                    }
                    replay_names(visitor, ElementKind::Parameter, &parameter.dst_names)?;
                    if let Some(comment) = &parameter.comment {
                        visitor.visit_comment(ElementKind::Parameter, comment)?;
                    }
                }
            }
        }

        visitor.visit_end()
    }

    fn current_class(&mut self) -> Result<&mut ClassMapping> {
        let index = self
            .cursor
            .class
            .ok_or_else(|| Error::Mapping("visited a member outside a class".into()))?;
        Ok(&mut self.classes[index])
    }

    fn current_member(&mut self) -> Result<&mut MemberMapping> {
        let (kind, index) = self
            .cursor
            .member
            .ok_or_else(|| Error::Mapping("visited an element outside a member".into()))?;
        let class = self.current_class()?;
        Ok(match kind {
            MemberKind::Field => &mut class.fields[index],
            MemberKind::Method => &mut class.methods[index],
        })
    }

    fn current_parameter(&mut self) -> Result<&mut ParameterMapping> {
        let index = self
            .cursor
            .parameter
            .ok_or_else(|| Error::Mapping("visited an element outside a parameter".into()))?;
        let member = self.current_member()?;
        Ok(&mut member.parameters[index])
    }
}

fn replay_names(
    visitor: &mut dyn MappingVisitor,
    element: ElementKind,
    names: &[Option<String>],
) -> Result<()> {
    for (i, name) in names.iter().enumerate() {
        if let Some(name) = name {
            visitor.visit_dst_name(element, i, name)?;
        }
    }
    Ok(())
}

impl MappingVisitor for MemoryMappingTree {
    fn visit_namespaces(&mut self, src: &str, dst: &[&str]) -> Result<()> {
        match &self.src_namespace {
            None => self.src_namespace = Some(src.to_string()),
            Some(existing) if existing == src => {}
            Some(existing) => {
                return Err(Error::Mapping(format!(
                    "cannot merge mappings with source namespace {src} into a tree keyed by {existing}"
                )));
            }
        }

        self.ns_map = dst
            .iter()
            .map(|name| {
                if let Some(i) = self.dst_namespaces.iter().position(|ns| ns == name) {
                    i
                } else {
                    self.dst_namespaces.push(name.to_string());
                    self.dst_namespaces.len() - 1
                }
            })
            .collect();

        self.cursor = Cursor::default();
        Ok(())
    }

    fn visit_class(&mut self, src_name: &str) -> Result<bool> {
        let index = match self.class_index.get(src_name) {
            Some(&i) => i,
            None => {
                self.classes.push(ClassMapping {
                    src_name: src_name.to_string(),
                    dst_names: Vec::new(),
                    comment: None,
                    fields: Vec::new(),
                    methods: Vec::new(),
                });
                let i = self.classes.len() - 1;
                self.class_index.insert(src_name.to_string(), i);
                i
            }
        };

        self.cursor = Cursor {
            class: Some(index),
            member: None,
            parameter: None,
        };
        Ok(true)
    }

    fn visit_member(&mut self, kind: MemberKind, src_name: &str, src_desc: &str) -> Result<bool> {
        let class = self.current_class()?;
        let members = match kind {
            MemberKind::Field => &mut class.fields,
            MemberKind::Method => &mut class.methods,
        };

        let index = match members
            .iter()
            .position(|m| m.src_name == src_name && m.src_desc == src_desc)
        {
            Some(i) => i,
            None => {
                members.push(MemberMapping {
                    src_name: src_name.to_string(),
                    src_desc: src_desc.to_string(),
                    dst_names: Vec::new(),
                    comment: None,
                    parameters: Vec::new(),
                });
                members.len() - 1
            }
        };

        self.cursor.member = Some((kind, index));
        self.cursor.parameter = None;
        Ok(true)
    }

    fn visit_parameter(&mut self, lv_index: u32, src_name: &str) -> Result<bool> {
        let member = self.current_member()?;
        let index = match member
            .parameters
            .iter()
            .position(|p| p.lv_index == lv_index)
        {
            Some(i) => {
                if !src_name.is_empty() {
                    member.parameters[i].src_name = src_name.to_string();
                }
                i
            }
            None => {
                member.parameters.push(ParameterMapping {
                    lv_index,
                    src_name: src_name.to_string(),
                    dst_names: Vec::new(),
                    comment: None,
                });
                member.parameters.len() - 1
            }
        };

        self.cursor.parameter = Some(index);
        Ok(true)
    }

    fn visit_dst_name(&mut self, element: ElementKind, namespace: usize, name: &str) -> Result<()> {
        let mapped = *self.ns_map.get(namespace).ok_or_else(|| {
            Error::Mapping(format!("destination namespace {namespace} was never declared"))
        })?;

        match element {
            ElementKind::Class => set_dst(&mut self.current_class()?.dst_names, mapped, name),
            ElementKind::Field | ElementKind::Method => {
                set_dst(&mut self.current_member()?.dst_names, mapped, name)
            }
            ElementKind::Parameter => {
                set_dst(&mut self.current_parameter()?.dst_names, mapped, name)
            }
        }
        Ok(())
    }

    fn visit_comment(&mut self, element: ElementKind, comment: &str) -> Result<()> {
        let slot = match element {
            ElementKind::Class => &mut self.current_class()?.comment,
            ElementKind::Field | ElementKind::Method => &mut self.current_member()?.comment,
            ElementKind::Parameter => &mut self.current_parameter()?.comment,
        };
        *slot = Some(comment.to_string());
        Ok(())
    }

    fn visit_end(&mut self) -> Result<()> {
        self.cursor = Cursor::default();
        Ok(())
    }
}

impl ClassMapping {
    pub fn src_name(&self) -> &str {
        &self.src_name
    }

    /// This class's name in the given namespace, if mapped.
    pub fn name(&self, ns: Namespace) -> Option<&str> {
        match ns {
            Namespace::Src => Some(&self.src_name),
            Namespace::Dst(i) => self.dst_names.get(i).and_then(|n| n.as_deref()),
        }
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn fields(&self) -> impl Iterator<Item = &MemberMapping> {
        self.fields.iter()
    }

    pub fn methods(&self) -> impl Iterator<Item = &MemberMapping> {
        self.methods.iter()
    }

    /// Find a field by its name in some namespace, ignoring the descriptor.
    pub fn field_by_name(&self, name: &str, ns: Namespace) -> Option<&MemberMapping> {
        self.fields.iter().find(|f| f.name(ns) == Some(name))
    }

    /// Find a method by name and source descriptor.
    pub fn method(&self, src_name: &str, src_desc: &str) -> Option<&MemberMapping> {
        self.methods
            .iter()
            .find(|m| m.src_name == src_name && m.src_desc == src_desc)
    }
}

impl MemberMapping {
    pub fn src_name(&self) -> &str {
        &self.src_name
    }

    pub fn src_desc(&self) -> &str {
        &self.src_desc
    }

    pub fn name(&self, ns: Namespace) -> Option<&str> {
        match ns {
            Namespace::Src => Some(&self.src_name),
            Namespace::Dst(i) => self.dst_names.get(i).and_then(|n| n.as_deref()),
        }
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn parameters(&self) -> impl Iterator<Item = &ParameterMapping> {
        self.parameters.iter()
    }
}

impl ParameterMapping {
    pub fn lv_index(&self) -> u32 {
        self.lv_index
    }

    pub fn name(&self, ns: Namespace) -> Option<&str> {
        match ns {
            Namespace::Src => {
                if self.src_name.is_empty() {
                    None
                } else {
                    Some(&self.src_name)
                }
            }
            Namespace::Dst(i) => self.dst_names.get(i).and_then(|n| n.as_deref()),
        }
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mappings::testing::RecordingVisitor;

    fn sample_tree() -> MemoryMappingTree {
        let mut tree = MemoryMappingTree::new();
        tree.visit_namespaces("workspace", &["official"]).unwrap();
        assert!(tree.visit_class("net/Foo").unwrap());
        tree.visit_dst_name(ElementKind::Class, 0, "a").unwrap();
        assert!(tree
            .visit_member(MemberKind::Method, "doThing", "(I)V")
            .unwrap());
        tree.visit_dst_name(ElementKind::Method, 0, "b").unwrap();
        assert!(tree.visit_parameter(1, "amount").unwrap());
        tree.visit_end().unwrap();
        tree
    }

    #[test]
    fn replay_is_deterministic() {
        let tree = sample_tree();

        let mut first = RecordingVisitor::default();
        tree.accept(&mut first).unwrap();
        let mut second = RecordingVisitor::default();
        tree.accept(&mut second).unwrap();

        assert!(!first.calls.is_empty());
        assert_eq!(first.calls, second.calls);
    }

    #[test]
    fn merging_by_src_name_enriches_in_place() {
        let mut tree = sample_tree();

        // A second source with no destination namespaces, adding a comment
        // and a parameter name.
        tree.visit_namespaces("workspace", &[]).unwrap();
        assert!(tree.visit_class("net/Foo").unwrap());
        tree.visit_comment(ElementKind::Class, "A thing.").unwrap();
        assert!(tree
            .visit_member(MemberKind::Method, "doThing", "(I)V")
            .unwrap());
        assert!(tree.visit_parameter(1, "count").unwrap());
        tree.visit_end().unwrap();

        assert_eq!(tree.classes().count(), 1);
        let class = tree.class("net/Foo").unwrap();
        assert_eq!(class.name(Namespace::Dst(0)), Some("a"));
        assert_eq!(class.comment(), Some("A thing."));

        let method = class.method("doThing", "(I)V").unwrap();
        let parameters: Vec<_> = method.parameters().collect();
        assert_eq!(parameters.len(), 1);
        assert_eq!(parameters[0].name(Namespace::Src), Some("count"));
    }

    #[test]
    fn mismatched_source_namespace_is_rejected() {
        let mut tree = sample_tree();
        let err = tree.visit_namespaces("intermediary", &[]).unwrap_err();
        assert!(matches!(err, Error::Mapping(_)));
    }

    #[test]
    fn member_outside_class_is_rejected() {
        let mut tree = MemoryMappingTree::new();
        tree.visit_namespaces("workspace", &["official"]).unwrap();
        let err = tree
            .visit_member(MemberKind::Field, "x", "I")
            .unwrap_err();
        assert!(matches!(err, Error::Mapping(_)));
    }

    #[test]
    fn lookup_by_destination_name() {
        let tree = sample_tree();
        let class = tree.class_by_name("a", Namespace::Dst(0)).unwrap();
        assert_eq!(class.src_name(), "net/Foo");
        assert!(tree.class_by_name("net/Foo", Namespace::Src).is_some());
        assert!(tree.class_by_name("missing", Namespace::Dst(0)).is_none());
    }
}
