// tests/common/mod.rs

//! Shared test utilities: synthesizing class files and jars.

use std::io::Write;
use std::path::Path;
use zip::write::FileOptions;
use zip::ZipWriter;

/// A member declaration for [`class_bytes`].
pub struct TestMember {
    pub name: &'static str,
    pub descriptor: &'static str,
    pub access_flags: u16,
}

/// Build the bytes of a minimal but well-formed class file extending
/// `java/lang/Object`, with a `SourceFile` attribute and no member
/// attributes.
pub fn class_bytes(
    name: &str,
    access_flags: u16,
    fields: &[TestMember],
    methods: &[TestMember],
) -> Vec<u8> {
    class_bytes_extending(name, "java/lang/Object", access_flags, fields, methods)
}

/// As [`class_bytes`], with an explicit superclass.
pub fn class_bytes_extending(
    name: &str,
    super_name: &str,
    access_flags: u16,
    fields: &[TestMember],
    methods: &[TestMember],
) -> Vec<u8> {
    let mut pool = PoolBuilder::default();
    let this_name = pool.utf8(name);
    let this_class = pool.class(this_name);
    let super_name = pool.utf8(super_name);
    let super_class = pool.class(super_name);

    let member_indices = |members: &[TestMember], pool: &mut PoolBuilder| -> Vec<(u16, u16, u16)> {
        members
            .iter()
            .map(|member| {
                let n = pool.utf8(member.name);
                let d = pool.utf8(member.descriptor);
                (member.access_flags, n, d)
            })
            .collect()
    };
    let field_entries = member_indices(fields, &mut pool);
    let method_entries = member_indices(methods, &mut pool);

    let source_attr_name = pool.utf8("SourceFile");
    let simple = name.rsplit('/').next().unwrap_or(name);
    let source_name = pool.utf8(&format!("{simple}.java"));

    let mut out = Vec::new();
    out.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes()); // minor
    out.extend_from_slice(&52u16.to_be_bytes()); // major (Java 8)

    out.extend_from_slice(&(pool.count()).to_be_bytes());
    out.extend_from_slice(&pool.bytes);

    out.extend_from_slice(&access_flags.to_be_bytes());
    out.extend_from_slice(&this_class.to_be_bytes());
    out.extend_from_slice(&super_class.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes()); // interfaces

    for entries in [&field_entries, &method_entries] {
        out.extend_from_slice(&(entries.len() as u16).to_be_bytes());
        for (access, name_index, descriptor_index) in entries {
            out.extend_from_slice(&access.to_be_bytes());
            out.extend_from_slice(&name_index.to_be_bytes());
            out.extend_from_slice(&descriptor_index.to_be_bytes());
            out.extend_from_slice(&0u16.to_be_bytes()); // attributes
        }
    }

    // Class attributes: SourceFile only.
    out.extend_from_slice(&1u16.to_be_bytes());
    out.extend_from_slice(&source_attr_name.to_be_bytes());
    out.extend_from_slice(&2u32.to_be_bytes());
    out.extend_from_slice(&source_name.to_be_bytes());

    out
}

#[derive(Default)]
struct PoolBuilder {
    bytes: Vec<u8>,
    entries: u16,
}

impl PoolBuilder {
    fn count(&self) -> u16 {
        self.entries + 1
    }

    fn utf8(&mut self, content: &str) -> u16 {
        self.bytes.push(1);
        self.bytes
            .extend_from_slice(&(content.len() as u16).to_be_bytes());
        self.bytes.extend_from_slice(content.as_bytes());
        self.entries += 1;
        self.entries
    }

    fn class(&mut self, name_index: u16) -> u16 {
        self.bytes.push(7);
        self.bytes.extend_from_slice(&name_index.to_be_bytes());
        self.entries += 1;
        self.entries
    }
}

/// Write a jar containing the given entries.
pub fn write_jar(path: &Path, entries: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = ZipWriter::new(file);
    for (name, content) in entries {
        writer.start_file(*name, FileOptions::default()).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap();
}

/// Read one entry out of a jar.
pub fn read_jar_entry(path: &Path, name: &str) -> Option<Vec<u8>> {
    use std::io::Read;
    let file = std::fs::File::open(path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut entry = archive.by_name(name).ok()?;
    let mut content = Vec::new();
    entry.read_to_end(&mut content).unwrap();
    Some(content)
}

/// List a jar's entry names in archive order.
pub fn jar_entries(path: &Path) -> Vec<String> {
    let file = std::fs::File::open(path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}
