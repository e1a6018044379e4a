// src/remap/mod.rs

//! The rename engine: applies a resolved mapping table to class files.
//!
//! The engine is seeded with a flattened [`MappingSet`] and a class
//! hierarchy index. Input archives are registered as tags *before* any
//! renaming so that member lookups can walk superclasses and interfaces
//! across archive boundaries; once the first class is remapped the engine is
//! sealed and further registration fails. Sealing aside, remapping is a
//! read-only operation and independent archives may be streamed
//! concurrently.

pub mod classfile;

use crate::error::{Error, Result};
use crate::mappings::MemoryMappingTree;
use classfile::{ClassFile, NameMaps};
use regex::Regex;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Local variables the obfuscator left unnameable, e.g. `$$2`.
pub const INVALID_LOCAL_PATTERN: &str = r"^\$\$\d+$";

type MemberKey = (String, String, String);

/// A flattened rename table: direct lookups from one namespace to another.
///
/// Built once from a [`MemoryMappingTree`]; descriptors are converted into
/// the `from` namespace so they compare equal to what class files contain.
#[derive(Debug, Default)]
pub struct MappingSet {
    classes: HashMap<String, String>,
    fields: HashMap<MemberKey, String>,
    methods: HashMap<MemberKey, String>,
    method_params: HashMap<MemberKey, Vec<(u32, String)>>,
}

impl MappingSet {
    /// Flatten `tree` into lookups from namespace `from` to namespace `to`.
    pub fn from_tree(tree: &MemoryMappingTree, from: &str, to: &str) -> Result<Self> {
        let from_ns = tree
            .namespace(from)
            .ok_or_else(|| Error::Mapping(format!("tree has no namespace {from}")))?;
        let to_ns = tree
            .namespace(to)
            .ok_or_else(|| Error::Mapping(format!("tree has no namespace {to}")))?;

        // Member descriptors are stored in the tree's source namespace;
        // convert them to `from` so lookups match class-file constants.
        let mut src_to_from: HashMap<String, String> = HashMap::new();
        for class in tree.classes() {
            if let Some(name) = class.name(from_ns) {
                src_to_from.insert(class.src_name().to_string(), name.to_string());
            }
        }
        let desc_to_from =
            |desc: &str| remap_descriptor(desc, &|name| src_to_from.get(name).cloned());

        let mut set = MappingSet::default();
        for class in tree.classes() {
            let Some(from_name) = class.name(from_ns) else {
                continue;
            };
            let to_name = class.name(to_ns).unwrap_or(from_name);
            set.classes
                .insert(from_name.to_string(), to_name.to_string());

            for field in class.fields() {
                let (Some(f), Some(t)) = (field.name(from_ns), field.name(to_ns)) else {
                    continue;
                };
                let key = (
                    from_name.to_string(),
                    f.to_string(),
                    desc_to_from(field.src_desc()),
                );
                set.fields.insert(key, t.to_string());
            }

            for method in class.methods() {
                let Some(f) = method.name(from_ns) else {
                    continue;
                };
                let key = (
                    from_name.to_string(),
                    f.to_string(),
                    desc_to_from(method.src_desc()),
                );

                if let Some(t) = method.name(to_ns) {
                    set.methods.insert(key.clone(), t.to_string());
                }

                let params: Vec<(u32, String)> = method
                    .parameters()
                    .filter_map(|p| {
                        p.name(to_ns).map(|name| (p.lv_index(), name.to_string()))
                    })
                    .collect();
                if !params.is_empty() {
                    set.method_params.insert(key, params);
                }
            }
        }

        Ok(set)
    }

    pub fn map_class(&self, name: &str) -> Option<&str> {
        self.classes.get(name).map(String::as_str)
    }

    pub fn map_field(&self, owner: &str, name: &str, desc: &str) -> Option<&str> {
        self.fields
            .get(&(owner.to_string(), name.to_string(), desc.to_string()))
            .map(String::as_str)
    }

    pub fn map_method(&self, owner: &str, name: &str, desc: &str) -> Option<&str> {
        self.methods
            .get(&(owner.to_string(), name.to_string(), desc.to_string()))
            .map(String::as_str)
    }

    pub fn param_names(&self, owner: &str, name: &str, desc: &str) -> Option<&[(u32, String)]> {
        self.method_params
            .get(&(owner.to_string(), name.to_string(), desc.to_string()))
            .map(Vec::as_slice)
    }

    pub fn map_descriptor(&self, desc: &str) -> String {
        remap_descriptor(desc, &|name| self.classes.get(name).cloned())
    }

    pub fn map_signature(&self, signature: &str) -> String {
        remap_signature(signature, &|name| self.classes.get(name).cloned())
    }
}

/// Rewrite the class names inside a field or method descriptor.
pub fn remap_descriptor(desc: &str, map: &dyn Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(desc.len());
    let mut rest = desc;
    while let Some(at) = rest.find('L') {
        let Some(end) = rest[at..].find(';') else {
            break;
        };
        out.push_str(&rest[..=at]);
        let name = &rest[at + 1..at + end];
        match map(name) {
            Some(mapped) => out.push_str(&mapped),
            None => out.push_str(name),
        }
        out.push(';');
        rest = &rest[at + end + 1..];
    }
    out.push_str(rest);
    out
}

/// Rewrite the class names inside a generic signature. A signature that does
/// not parse is returned unchanged rather than corrupted.
pub fn remap_signature(signature: &str, map: &dyn Fn(&str) -> Option<String>) -> String {
    // The scanner works on bytes; non-ASCII identifiers are possible in
    // principle and are passed through untouched rather than risked.
    if !signature.is_ascii() {
        return signature.to_string();
    }

    let mut parser = SignatureParser {
        bytes: signature.as_bytes(),
        pos: 0,
        out: String::with_capacity(signature.len()),
    };
    match parser.parse(map) {
        Ok(()) if parser.pos == parser.bytes.len() => parser.out,
        _ => signature.to_string(),
    }
}

struct SignatureParser<'a> {
    bytes: &'a [u8],
    pos: usize,
    out: String,
}

impl SignatureParser<'_> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump_copy(&mut self) -> std::result::Result<(), ()> {
        let c = self.peek().ok_or(())?;
        self.out.push(c as char);
        self.pos += 1;
        Ok(())
    }

    fn expect_copy(&mut self, c: u8) -> std::result::Result<(), ()> {
        if self.peek() != Some(c) {
            return Err(());
        }
        self.bump_copy()
    }

    fn parse(&mut self, map: &dyn Fn(&str) -> Option<String>) -> std::result::Result<(), ()> {
        if self.peek() == Some(b'<') {
            self.formal_params(map)?;
        }

        if self.peek() == Some(b'(') {
            // Method signature.
            self.bump_copy()?;
            while self.peek() != Some(b')') {
                self.type_sig(map)?;
            }
            self.bump_copy()?;
            if self.peek() == Some(b'V') {
                self.bump_copy()?;
            } else {
                self.type_sig(map)?;
            }
            while self.peek() == Some(b'^') {
                self.bump_copy()?;
                self.type_sig(map)?;
            }
        } else {
            // Field signature (one type) or class signature (superclass plus
            // interfaces).
            self.type_sig(map)?;
            while self.pos < self.bytes.len() {
                self.type_sig(map)?;
            }
        }
        Ok(())
    }

    fn formal_params(&mut self, map: &dyn Fn(&str) -> Option<String>) -> std::result::Result<(), ()> {
        self.expect_copy(b'<')?;
        while self.peek() != Some(b'>') {
            // Identifier up to the first bound.
            loop {
                match self.peek() {
                    Some(b':') => break,
                    Some(_) => self.bump_copy()?,
                    None => return Err(()),
                }
            }
            self.expect_copy(b':')?;
            // The class bound may be empty.
            if matches!(self.peek(), Some(b'L' | b'[' | b'T')) {
                self.type_sig(map)?;
            }
            while self.peek() == Some(b':') {
                self.bump_copy()?;
                self.type_sig(map)?;
            }
        }
        self.expect_copy(b'>')
    }

    fn type_sig(&mut self, map: &dyn Fn(&str) -> Option<String>) -> std::result::Result<(), ()> {
        match self.peek() {
            Some(b'[') => {
                self.bump_copy()?;
                self.type_sig(map)
            }
            Some(b'L') => self.class_type_sig(map),
            Some(b'T') => {
                self.bump_copy()?;
                loop {
                    match self.peek() {
                        Some(b';') => break self.bump_copy(),
                        Some(_) => self.bump_copy()?,
                        None => return Err(()),
                    }
                }
            }
            Some(c) if b"BCDFIJSZ".contains(&c) => self.bump_copy(),
            _ => Err(()),
        }
    }

    fn class_type_sig(&mut self, map: &dyn Fn(&str) -> Option<String>) -> std::result::Result<(), ()> {
        if self.peek() != Some(b'L') {
            return Err(());
        }
        self.pos += 1;
        self.out.push('L');

        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, b'<' | b';' | b'.') {
                break;
            }
            self.pos += 1;
        }
        let name = std::str::from_utf8(&self.bytes[start..self.pos]).map_err(|_| ())?;
        match map(name) {
            Some(mapped) => self.out.push_str(&mapped),
            None => self.out.push_str(name),
        }

        if self.peek() == Some(b'<') {
            self.type_args(map)?;
        }
        while self.peek() == Some(b'.') {
            // Inner-class suffix; the simple name itself is not remapped.
            self.bump_copy()?;
            while let Some(c) = self.peek() {
                if matches!(c, b'<' | b';' | b'.') {
                    break;
                }
                self.bump_copy()?;
            }
            if self.peek() == Some(b'<') {
                self.type_args(map)?;
            }
        }
        self.expect_copy(b';')
    }

    fn type_args(&mut self, map: &dyn Fn(&str) -> Option<String>) -> std::result::Result<(), ()> {
        self.expect_copy(b'<')?;
        while self.peek() != Some(b'>') {
            match self.peek() {
                Some(b'*') => self.bump_copy()?,
                Some(b'+' | b'-') => {
                    self.bump_copy()?;
                    self.type_sig(map)?;
                }
                _ => self.type_sig(map)?,
            }
        }
        self.expect_copy(b'>')
    }
}

/// Configuration for the rename engine.
#[derive(Debug, Default)]
pub struct RemapOptions {
    /// Replace local-variable names the obfuscator mangled with stable
    /// synthetic ones.
    pub rename_invalid_locals: bool,
    /// What counts as a mangled local name.
    pub invalid_local_pattern: Option<Regex>,
    /// Rewrite `SourceFile` attributes to match the renamed class.
    pub rebuild_source_filenames: bool,
}

impl RemapOptions {
    /// The options the transform stage uses.
    pub fn standard() -> Self {
        Self {
            rename_invalid_locals: true,
            invalid_local_pattern: Some(
                Regex::new(INVALID_LOCAL_PATTERN).expect("constant pattern parses"),
            ),
            rebuild_source_filenames: true,
        }
    }
}

/// Identifies one registered input archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputTag(usize);

struct ClassDecl {
    super_class: Option<String>,
    interfaces: Vec<String>,
}

/// The rename engine.
pub struct Remapper {
    mappings: MappingSet,
    options: RemapOptions,
    hierarchy: HashMap<String, ClassDecl>,
    tags: Vec<PathBuf>,
    sealed: AtomicBool,
}

impl Remapper {
    pub fn new(mappings: MappingSet, options: RemapOptions) -> Self {
        Self {
            mappings,
            options,
            hierarchy: HashMap::new(),
            tags: Vec::new(),
            sealed: AtomicBool::new(false),
        }
    }

    /// Register an input archive, indexing the hierarchy of every class it
    /// contains. All archives must be registered before any remapping so
    /// cross-archive member lookups resolve consistently.
    pub fn register_input(&mut self, path: &Path) -> Result<InputTag> {
        if self.sealed.load(Ordering::Acquire) {
            return Err(Error::Mapping(
                "inputs cannot be registered once remapping has started".into(),
            ));
        }

        let file = std::fs::File::open(path)
            .map_err(|e| Error::cache(format!("cannot open archive {}", path.display()), e))?;
        let mut archive = zip::ZipArchive::new(std::io::BufReader::new(file))?;

        let mut count = 0usize;
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if entry.is_dir() || !entry.name().ends_with(".class") {
                continue;
            }
            let name = entry.name().to_string();

            let mut bytes = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut bytes)?;
            let class = ClassFile::parse(&name, &bytes)?;

            self.hierarchy.insert(
                class.this_class_name()?.to_string(),
                ClassDecl {
                    super_class: class.super_class_name()?.map(str::to_string),
                    interfaces: class
                        .interface_names()?
                        .into_iter()
                        .map(str::to_string)
                        .collect(),
                },
            );
            count += 1;
        }

        debug!("registered {} classes from {}", count, path.display());
        self.tags.push(path.to_path_buf());
        Ok(InputTag(self.tags.len() - 1))
    }

    /// The archive a tag was registered from.
    pub fn tag_path(&self, tag: InputTag) -> &Path {
        &self.tags[tag.0]
    }

    /// Remap one class file, returning its new entry path and bytes.
    pub fn remap_class(&self, name: &str, bytes: &[u8]) -> Result<(String, Vec<u8>)> {
        self.sealed.store(true, Ordering::Release);

        let mut class = ClassFile::parse(name, bytes)?;
        let new_name = class.remap(self)?;
        Ok((format!("{new_name}.class"), class.write()))
    }

    /// Look up a member mapping, walking up the class hierarchy when the
    /// owner itself declares no mapping for it.
    fn lookup_member<'a>(
        &'a self,
        owner: &str,
        name: &str,
        desc: &str,
        kind: MemberLookup,
    ) -> Option<&'a str> {
        let mut queue = vec![owner.to_string()];
        let mut seen = std::collections::HashSet::new();

        while let Some(current) = queue.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }

            let found = match kind {
                MemberLookup::Field => self.mappings.map_field(&current, name, desc),
                MemberLookup::Method => self.mappings.map_method(&current, name, desc),
            };
            if found.is_some() {
                return found;
            }

            if let Some(decl) = self.hierarchy.get(&current) {
                if let Some(super_class) = &decl.super_class {
                    queue.push(super_class.clone());
                }
                queue.extend(decl.interfaces.iter().cloned());
            }
        }
        None
    }
}

#[derive(Clone, Copy)]
enum MemberLookup {
    Field,
    Method,
}

impl NameMaps for Remapper {
    fn map_class<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        self.mappings.map_class(name)
    }

    fn map_field<'a>(&'a self, owner: &str, name: &'a str, desc: &str) -> Option<&'a str> {
        self.lookup_member(owner, name, desc, MemberLookup::Field)
    }

    fn map_method<'a>(&'a self, owner: &str, name: &'a str, desc: &str) -> Option<&'a str> {
        self.lookup_member(owner, name, desc, MemberLookup::Method)
    }

    fn map_descriptor(&self, desc: &str) -> String {
        self.mappings.map_descriptor(desc)
    }

    fn map_signature(&self, signature: &str) -> String {
        self.mappings.map_signature(signature)
    }

    fn local_variable_name(
        &self,
        owner: &str,
        method_name: &str,
        method_desc: &str,
        slot: u16,
        current: &str,
    ) -> Option<String> {
        // A mapped parameter name wins over anything in the table.
        if let Some(params) = self.mappings.param_names(owner, method_name, method_desc) {
            if let Some((_, name)) = params.iter().find(|(lv, _)| *lv == u32::from(slot)) {
                return Some(name.clone());
            }
        }

        if self.options.rename_invalid_locals {
            let invalid = current.is_empty()
                || self
                    .options
                    .invalid_local_pattern
                    .as_ref()
                    .is_some_and(|p| p.is_match(current));
            if invalid {
                return Some(format!("var{slot}"));
            }
        }

        None
    }

    fn rebuild_source_file(&self) -> bool {
        self.options.rebuild_source_filenames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_map(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn descriptor_remapping() {
        let map = simple_map(&[("a", "net/Foo"), ("b", "net/Bar")]);
        assert_eq!(remap_descriptor("(ILa;)Lb;", &map), "(ILnet/Foo;)Lnet/Bar;");
        assert_eq!(remap_descriptor("[[La;", &map), "[[Lnet/Foo;");
        assert_eq!(remap_descriptor("(JZ)V", &map), "(JZ)V");
        assert_eq!(remap_descriptor("Lc;", &map), "Lc;");
    }

    #[test]
    fn signature_remapping() {
        let map = simple_map(&[("a", "net/Foo"), ("b", "net/Bar")]);
        assert_eq!(
            remap_signature("Ljava/util/List<La;>;", &map),
            "Ljava/util/List<Lnet/Foo;>;"
        );
        assert_eq!(
            remap_signature("<T:La;>(TT;[Lb;)TT;", &map),
            "<T:Lnet/Foo;>(TT;[Lnet/Bar;)TT;"
        );
        assert_eq!(
            remap_signature("La<Lb;>.Inner<+Lb;>;", &map),
            "Lnet/Foo<Lnet/Bar;>.Inner<+Lnet/Bar;>;"
        );
        // Wildcards and empty class bounds.
        assert_eq!(
            remap_signature("<K::Lb;>(Ljava/util/Map<*TK;>;)V", &map),
            "<K::Lnet/Bar;>(Ljava/util/Map<*TK;>;)V"
        );
    }

    #[test]
    fn malformed_signature_is_left_alone() {
        let map = simple_map(&[("a", "net/Foo")]);
        assert_eq!(remap_signature("La<oops", &map), "La<oops");
        assert_eq!(remap_signature("", &map), "");
    }

    #[test]
    fn invalid_local_pattern_matches_obfuscated_names() {
        let pattern = Regex::new(INVALID_LOCAL_PATTERN).unwrap();
        assert!(pattern.is_match("$$1"));
        assert!(pattern.is_match("$$42"));
        assert!(!pattern.is_match("count"));
        assert!(!pattern.is_match("x$$1"));
    }
}
