// src/remap/classfile.rs

//! Minimal class-file reader/writer built for renaming.
//!
//! The rewrite strategy keeps every existing constant-pool index stable:
//! renamed strings are appended as new pool entries and the structures that
//! reference them (class infos, member refs, name-and-type pairs, member
//! declarations, known attributes) are repointed. Existing entries are never
//! edited, so raw attribute bytes - bytecode included - remain valid without
//! being parsed. The only in-place patches are u2 indices inside attributes
//! whose layout is fixed, which never changes an attribute's length.

use crate::error::{Error, Result};
use std::collections::HashMap;

const MAGIC: u32 = 0xCAFE_BABE;

/// A constant-pool entry.
#[derive(Debug, Clone)]
pub enum Constant {
    /// Stored as raw bytes: class files use modified UTF-8, which must
    /// round-trip untouched for entries we do not rewrite.
    Utf8(Vec<u8>),
    Integer(u32),
    Float(u32),
    Long(u64),
    Double(u64),
    Class { name: u16 },
    Str { utf8: u16 },
    FieldRef { class: u16, nat: u16 },
    MethodRef { class: u16, nat: u16 },
    InterfaceMethodRef { class: u16, nat: u16 },
    NameAndType { name: u16, desc: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType { desc: u16 },
    Dynamic { bootstrap: u16, nat: u16 },
    InvokeDynamic { bootstrap: u16, nat: u16 },
    Module { name: u16 },
    Package { name: u16 },
    /// The phantom second slot of a Long or Double.
    Placeholder,
}

/// A field or method declaration.
#[derive(Debug)]
pub struct Member {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<Attribute>,
}

/// An attribute with unparsed payload.
#[derive(Debug)]
pub struct Attribute {
    pub name_index: u16,
    pub info: Vec<u8>,
}

/// A parsed class file.
#[derive(Debug)]
pub struct ClassFile {
    minor: u16,
    major: u16,
    pool: Vec<Constant>,
    pub access_flags: u16,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    pub fields: Vec<Member>,
    pub methods: Vec<Member>,
    attributes: Vec<Attribute>,
    /// Content of utf8 entries already in (or appended to) the pool, for
    /// reuse. Content-equal sharing is always safe.
    utf8_lookup: HashMap<Vec<u8>, u16>,
    nat_lookup: HashMap<(u16, u16), u16>,
}

struct Reader<'a> {
    name: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn fail(&self, message: &str) -> Error {
        Error::MalformedClass {
            name: self.name.to_string(),
            message: format!("{message} at offset {}", self.pos),
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.bytes.len() {
            return Err(self.fail("unexpected end of file"));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u1(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u2(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u4(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u8v(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }
}

impl ClassFile {
    pub fn parse(name: &str, bytes: &[u8]) -> Result<ClassFile> {
        let mut r = Reader {
            name,
            bytes,
            pos: 0,
        };

        if r.u4()? != MAGIC {
            return Err(r.fail("bad magic number"));
        }
        let minor = r.u2()?;
        let major = r.u2()?;

        let pool_count = r.u2()? as usize;
        // Slot 0 is unused; represent it with a placeholder so indices line up.
        let mut pool = Vec::with_capacity(pool_count);
        pool.push(Constant::Placeholder);
        while pool.len() < pool_count {
            let tag = r.u1()?;
            let constant = match tag {
                1 => {
                    let len = r.u2()? as usize;
                    Constant::Utf8(r.take(len)?.to_vec())
                }
                3 => Constant::Integer(r.u4()?),
                4 => Constant::Float(r.u4()?),
                5 => Constant::Long(r.u8v()?),
                6 => Constant::Double(r.u8v()?),
                7 => Constant::Class { name: r.u2()? },
                8 => Constant::Str { utf8: r.u2()? },
                9 => Constant::FieldRef {
                    class: r.u2()?,
                    nat: r.u2()?,
                },
                10 => Constant::MethodRef {
                    class: r.u2()?,
                    nat: r.u2()?,
                },
                11 => Constant::InterfaceMethodRef {
                    class: r.u2()?,
                    nat: r.u2()?,
                },
                12 => Constant::NameAndType {
                    name: r.u2()?,
                    desc: r.u2()?,
                },
                15 => Constant::MethodHandle {
                    kind: r.u1()?,
                    reference: r.u2()?,
                },
                16 => Constant::MethodType { desc: r.u2()? },
                17 => Constant::Dynamic {
                    bootstrap: r.u2()?,
                    nat: r.u2()?,
                },
                18 => Constant::InvokeDynamic {
                    bootstrap: r.u2()?,
                    nat: r.u2()?,
                },
                19 => Constant::Module { name: r.u2()? },
                20 => Constant::Package { name: r.u2()? },
                other => return Err(r.fail(&format!("unknown constant tag {other}"))),
            };

            let wide = matches!(constant, Constant::Long(_) | Constant::Double(_));
            pool.push(constant);
            if wide {
                pool.push(Constant::Placeholder);
            }
        }

        let access_flags = r.u2()?;
        let this_class = r.u2()?;
        let super_class = r.u2()?;

        let interface_count = r.u2()? as usize;
        let mut interfaces = Vec::with_capacity(interface_count);
        for _ in 0..interface_count {
            interfaces.push(r.u2()?);
        }

        let fields = parse_members(&mut r)?;
        let methods = parse_members(&mut r)?;
        let attributes = parse_attributes(&mut r)?;

        if r.pos != bytes.len() {
            return Err(r.fail("trailing bytes after class file"));
        }

        let mut utf8_lookup = HashMap::new();
        let mut nat_lookup = HashMap::new();
        for (i, constant) in pool.iter().enumerate() {
            match constant {
                Constant::Utf8(content) => {
                    utf8_lookup.entry(content.clone()).or_insert(i as u16);
                }
                Constant::NameAndType { name, desc } => {
                    nat_lookup.entry((*name, *desc)).or_insert(i as u16);
                }
                _ => {}
            }
        }

        Ok(ClassFile {
            minor,
            major,
            pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
            utf8_lookup,
            nat_lookup,
        })
    }

    /// Serialize back to bytes.
    pub fn write(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC.to_be_bytes());
        out.extend_from_slice(&self.minor.to_be_bytes());
        out.extend_from_slice(&self.major.to_be_bytes());

        out.extend_from_slice(&(self.pool.len() as u16).to_be_bytes());
        for constant in self.pool.iter().skip(1) {
            match constant {
                Constant::Utf8(content) => {
                    out.push(1);
                    out.extend_from_slice(&(content.len() as u16).to_be_bytes());
                    out.extend_from_slice(content);
                }
                Constant::Integer(v) => {
                    out.push(3);
                    out.extend_from_slice(&v.to_be_bytes());
                }
                Constant::Float(v) => {
                    out.push(4);
                    out.extend_from_slice(&v.to_be_bytes());
                }
                Constant::Long(v) => {
                    out.push(5);
                    out.extend_from_slice(&v.to_be_bytes());
                }
                Constant::Double(v) => {
                    out.push(6);
                    out.extend_from_slice(&v.to_be_bytes());
                }
                Constant::Class { name } => {
                    out.push(7);
                    out.extend_from_slice(&name.to_be_bytes());
                }
                Constant::Str { utf8 } => {
                    out.push(8);
                    out.extend_from_slice(&utf8.to_be_bytes());
                }
                Constant::FieldRef { class, nat } => {
                    out.push(9);
                    out.extend_from_slice(&class.to_be_bytes());
                    out.extend_from_slice(&nat.to_be_bytes());
                }
                Constant::MethodRef { class, nat } => {
                    out.push(10);
                    out.extend_from_slice(&class.to_be_bytes());
                    out.extend_from_slice(&nat.to_be_bytes());
                }
                Constant::InterfaceMethodRef { class, nat } => {
                    out.push(11);
                    out.extend_from_slice(&class.to_be_bytes());
                    out.extend_from_slice(&nat.to_be_bytes());
                }
                Constant::NameAndType { name, desc } => {
                    out.push(12);
                    out.extend_from_slice(&name.to_be_bytes());
                    out.extend_from_slice(&desc.to_be_bytes());
                }
                Constant::MethodHandle { kind, reference } => {
                    out.push(15);
                    out.push(*kind);
                    out.extend_from_slice(&reference.to_be_bytes());
                }
                Constant::MethodType { desc } => {
                    out.push(16);
                    out.extend_from_slice(&desc.to_be_bytes());
                }
                Constant::Dynamic { bootstrap, nat } => {
                    out.push(17);
                    out.extend_from_slice(&bootstrap.to_be_bytes());
                    out.extend_from_slice(&nat.to_be_bytes());
                }
                Constant::InvokeDynamic { bootstrap, nat } => {
                    out.push(18);
                    out.extend_from_slice(&bootstrap.to_be_bytes());
                    out.extend_from_slice(&nat.to_be_bytes());
                }
                Constant::Module { name } => {
                    out.push(19);
                    out.extend_from_slice(&name.to_be_bytes());
                }
                Constant::Package { name } => {
                    out.push(20);
                    out.extend_from_slice(&name.to_be_bytes());
                }
                Constant::Placeholder => {}
            }
        }

        out.extend_from_slice(&self.access_flags.to_be_bytes());
        out.extend_from_slice(&self.this_class.to_be_bytes());
        out.extend_from_slice(&self.super_class.to_be_bytes());

        out.extend_from_slice(&(self.interfaces.len() as u16).to_be_bytes());
        for interface in &self.interfaces {
            out.extend_from_slice(&interface.to_be_bytes());
        }

        write_members(&mut out, &self.fields);
        write_members(&mut out, &self.methods);
        write_attributes(&mut out, &self.attributes);
        out
    }

    // ------------------------------------------------------------------
    // Pool access
    // ------------------------------------------------------------------

    fn constant(&self, index: u16) -> Result<&Constant> {
        self.pool.get(index as usize).ok_or_else(|| {
            Error::MalformedClass {
                name: String::new(),
                message: format!("constant index {index} out of range"),
            }
        })
    }

    /// The content of a utf8 entry, when it is valid UTF-8.
    pub fn utf8(&self, index: u16) -> Result<&str> {
        match self.constant(index)? {
            Constant::Utf8(content) => std::str::from_utf8(content).map_err(|_| {
                Error::MalformedClass {
                    name: String::new(),
                    message: format!("utf8 constant {index} is not valid UTF-8"),
                }
            }),
            _ => Err(Error::MalformedClass {
                name: String::new(),
                message: format!("constant {index} is not a utf8 entry"),
            }),
        }
    }

    fn class_name_at(&self, class_index: u16) -> Result<&str> {
        match self.constant(class_index)? {
            Constant::Class { name } => self.utf8(*name),
            _ => Err(Error::MalformedClass {
                name: String::new(),
                message: format!("constant {class_index} is not a class entry"),
            }),
        }
    }

    /// The internal name of this class.
    pub fn this_class_name(&self) -> Result<&str> {
        self.class_name_at(self.this_class)
    }

    /// The internal name of the superclass, absent only for `java/lang/Object`.
    pub fn super_class_name(&self) -> Result<Option<&str>> {
        if self.super_class == 0 {
            return Ok(None);
        }
        self.class_name_at(self.super_class).map(Some)
    }

    /// The internal names of directly implemented interfaces.
    pub fn interface_names(&self) -> Result<Vec<&str>> {
        self.interfaces
            .iter()
            .map(|&i| self.class_name_at(i))
            .collect()
    }

    pub fn member_name(&self, member: &Member) -> Result<&str> {
        self.utf8(member.name_index)
    }

    pub fn member_descriptor(&self, member: &Member) -> Result<&str> {
        self.utf8(member.descriptor_index)
    }

    /// Get or append a utf8 entry with the given content.
    pub fn utf8_index(&mut self, content: &str) -> u16 {
        if let Some(&index) = self.utf8_lookup.get(content.as_bytes()) {
            return index;
        }
        self.pool.push(Constant::Utf8(content.as_bytes().to_vec()));
        let index = (self.pool.len() - 1) as u16;
        self.utf8_lookup.insert(content.as_bytes().to_vec(), index);
        index
    }

    fn nat_index(&mut self, name: u16, desc: u16) -> u16 {
        if let Some(&index) = self.nat_lookup.get(&(name, desc)) {
            return index;
        }
        self.pool.push(Constant::NameAndType { name, desc });
        let index = (self.pool.len() - 1) as u16;
        self.nat_lookup.insert((name, desc), index);
        index
    }

    fn attribute_name(&self, attribute: &Attribute) -> Result<&str> {
        self.utf8(attribute.name_index)
    }

    // ------------------------------------------------------------------
    // Renaming
    // ------------------------------------------------------------------

    /// Rename every symbol in this class according to `names`.
    ///
    /// Returns the class's new internal name.
    pub fn remap(&mut self, names: &dyn NameMaps) -> Result<String> {
        let old_name = self.this_class_name()?.to_string();

        // Class entries: repoint names. Array class entries hold
        // descriptors and are remapped as such. Collect the updates first
        // so owner lookups below still see the original pool.
        let mut class_updates: Vec<(usize, String)> = Vec::new();
        let mut ref_updates: Vec<(usize, String, String)> = Vec::new();
        let mut type_updates: Vec<(usize, String)> = Vec::new();

        for (index, constant) in self.pool.iter().enumerate() {
            match constant {
                Constant::Class { name } => {
                    let content = self.utf8(*name)?;
                    let mapped = if content.starts_with('[') {
                        names.map_descriptor(content)
                    } else {
                        names.map_class(content).unwrap_or(content).to_string()
                    };
                    if mapped != content {
                        class_updates.push((index, mapped));
                    }
                }
                Constant::FieldRef { class, nat }
                | Constant::MethodRef { class, nat }
                | Constant::InterfaceMethodRef { class, nat } => {
                    let owner = self.class_name_at(*class)?;
                    let (name_idx, desc_idx) = self.nat_parts(*nat)?;
                    let name = self.utf8(name_idx)?;
                    let desc = self.utf8(desc_idx)?;

                    let is_field = matches!(constant, Constant::FieldRef { .. });
                    let mapped_name = if is_field {
                        names.map_field(owner, name, desc)
                    } else {
                        names.map_method(owner, name, desc)
                    }
                    .unwrap_or(name)
                    .to_string();
                    let mapped_desc = names.map_descriptor(desc);

                    if mapped_name != name || mapped_desc != desc {
                        ref_updates.push((index, mapped_name, mapped_desc));
                    }
                }
                Constant::Dynamic { nat, .. } | Constant::InvokeDynamic { nat, .. } => {
                    // The owner of a dynamic call site's name is not recorded
                    // in the pool; only its descriptor can be remapped safely.
                    let (name_idx, desc_idx) = self.nat_parts(*nat)?;
                    let name = self.utf8(name_idx)?;
                    let desc = self.utf8(desc_idx)?;
                    let mapped_desc = names.map_descriptor(desc);
                    if mapped_desc != desc {
                        ref_updates.push((index, name.to_string(), mapped_desc));
                    }
                }
                Constant::MethodType { desc } => {
                    let content = self.utf8(*desc)?;
                    let mapped = names.map_descriptor(content);
                    if mapped != content {
                        type_updates.push((index, mapped));
                    }
                }
                _ => {}
            }
        }

        for (index, mapped) in class_updates {
            let utf8 = self.utf8_index(&mapped);
            self.pool[index] = Constant::Class { name: utf8 };
        }
        for (index, mapped_name, mapped_desc) in ref_updates {
            let name = self.utf8_index(&mapped_name);
            let desc = self.utf8_index(&mapped_desc);
            let nat = self.nat_index(name, desc);
            match &mut self.pool[index] {
                Constant::FieldRef { nat: slot, .. }
                | Constant::MethodRef { nat: slot, .. }
                | Constant::InterfaceMethodRef { nat: slot, .. }
                | Constant::Dynamic { nat: slot, .. }
                | Constant::InvokeDynamic { nat: slot, .. } => *slot = nat,
                _ => unreachable!("ref update targets a ref constant"),
            }
        }
        for (index, mapped) in type_updates {
            let utf8 = self.utf8_index(&mapped);
            self.pool[index] = Constant::MethodType { desc: utf8 };
        }

        // Declared members: repoint names and descriptors, then fix the
        // attributes that carry symbol text.
        let new_name = names.map_class(&old_name).unwrap_or(&old_name).to_string();

        self.remap_declared_members(&old_name, names)?;
        self.remap_class_attributes(&new_name, names)?;

        Ok(new_name)
    }

    fn nat_parts(&self, index: u16) -> Result<(u16, u16)> {
        match self.constant(index)? {
            Constant::NameAndType { name, desc } => Ok((*name, *desc)),
            _ => Err(Error::MalformedClass {
                name: String::new(),
                message: format!("constant {index} is not a name-and-type entry"),
            }),
        }
    }

    fn remap_declared_members(&mut self, owner: &str, names: &dyn NameMaps) -> Result<()> {
        for member_list in [MemberList::Fields, MemberList::Methods] {
            let count = match member_list {
                MemberList::Fields => self.fields.len(),
                MemberList::Methods => self.methods.len(),
            };

            for i in 0..count {
                let (name_index, descriptor_index) = {
                    let member = member_list.get(self, i);
                    (member.name_index, member.descriptor_index)
                };
                let name = self.utf8(name_index)?.to_string();
                let desc = self.utf8(descriptor_index)?.to_string();

                let mapped_name = match member_list {
                    MemberList::Fields => names.map_field(owner, &name, &desc),
                    MemberList::Methods => names.map_method(owner, &name, &desc),
                }
                .unwrap_or(&name)
                .to_string();
                let mapped_desc = names.map_descriptor(&desc);

                let new_name_index = self.utf8_index(&mapped_name);
                let new_desc_index = self.utf8_index(&mapped_desc);
                {
                    let member = member_list.get_mut(self, i);
                    member.name_index = new_name_index;
                    member.descriptor_index = new_desc_index;
                }

                self.remap_member_attributes(member_list, i, owner, &name, &desc, names)?;
            }
        }
        Ok(())
    }

    fn remap_member_attributes(
        &mut self,
        member_list: MemberList,
        member_index: usize,
        owner: &str,
        original_name: &str,
        original_desc: &str,
        names: &dyn NameMaps,
    ) -> Result<()> {
        let attribute_count = member_list.get(self, member_index).attributes.len();
        for a in 0..attribute_count {
            let attr_name = {
                let member = member_list.get(self, member_index);
                self.attribute_name(&member.attributes[a])?.to_string()
            };

            match attr_name.as_str() {
                "Signature" => {
                    let info = member_list.get(self, member_index).attributes[a].info.clone();
                    let patched = self.remap_signature_attribute(&info, names)?;
                    member_list.get_mut(self, member_index).attributes[a].info = patched;
                }
                "Code" if member_list == MemberList::Methods => {
                    let info = member_list.get(self, member_index).attributes[a].info.clone();
                    let patched =
                        self.remap_code_attribute(info, owner, original_name, original_desc, names)?;
                    member_list.get_mut(self, member_index).attributes[a].info = patched;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn remap_signature_attribute(
        &mut self,
        info: &[u8],
        names: &dyn NameMaps,
    ) -> Result<Vec<u8>> {
        if info.len() != 2 {
            return Ok(info.to_vec());
        }
        let index = u16::from_be_bytes([info[0], info[1]]);
        let signature = self.utf8(index)?.to_string();
        let mapped = names.map_signature(&signature);
        if mapped == signature {
            return Ok(info.to_vec());
        }
        let new_index = self.utf8_index(&mapped);
        Ok(new_index.to_be_bytes().to_vec())
    }

    /// Patch local-variable tables inside a `Code` attribute. Only fixed-size
    /// u2 slots are rewritten, so every length stays valid.
    fn remap_code_attribute(
        &mut self,
        mut info: Vec<u8>,
        owner: &str,
        method_name: &str,
        method_desc: &str,
        names: &dyn NameMaps,
    ) -> Result<Vec<u8>> {
        let read_u2 = |bytes: &[u8], at: usize| u16::from_be_bytes([bytes[at], bytes[at + 1]]);
        let too_short = || Error::MalformedClass {
            name: owner.to_string(),
            message: "truncated Code attribute".to_string(),
        };

        if info.len() < 8 {
            return Err(too_short());
        }
        let code_length = u32::from_be_bytes([info[4], info[5], info[6], info[7]]) as usize;
        let mut pos = 8 + code_length;
        if info.len() < pos + 2 {
            return Err(too_short());
        }
        let exception_count = read_u2(&info, pos) as usize;
        pos += 2 + exception_count * 8;
        if info.len() < pos + 2 {
            return Err(too_short());
        }
        let attribute_count = read_u2(&info, pos) as usize;
        pos += 2;

        for _ in 0..attribute_count {
            if info.len() < pos + 6 {
                return Err(too_short());
            }
            let name_index = read_u2(&info, pos);
            let length =
                u32::from_be_bytes([info[pos + 2], info[pos + 3], info[pos + 4], info[pos + 5]])
                    as usize;
            let body = pos + 6;
            if info.len() < body + length {
                return Err(too_short());
            }

            let attr_name = self.utf8(name_index)?.to_string();
            if attr_name == "LocalVariableTable" || attr_name == "LocalVariableTypeTable" {
                let is_type_table = attr_name == "LocalVariableTypeTable";
                let entry_count = read_u2(&info, body) as usize;

                for e in 0..entry_count {
                    let entry = body + 2 + e * 10;
                    if info.len() < entry + 10 {
                        return Err(too_short());
                    }
                    let name_at = entry + 4;
                    let desc_at = entry + 6;
                    let slot = read_u2(&info, entry + 8);

                    // Type tables carry a generic signature, plain tables a
                    // descriptor.
                    let desc_index = read_u2(&info, desc_at);
                    let desc = self.utf8(desc_index)?.to_string();
                    let mapped_desc = if is_type_table {
                        names.map_signature(&desc)
                    } else {
                        names.map_descriptor(&desc)
                    };
                    if mapped_desc != desc {
                        let new_index = self.utf8_index(&mapped_desc);
                        info[desc_at..desc_at + 2].copy_from_slice(&new_index.to_be_bytes());
                    }

                    let lv_name_index = read_u2(&info, name_at);
                    let lv_name = self.utf8(lv_name_index)?.to_string();
                    if let Some(new_name) =
                        names.local_variable_name(owner, method_name, method_desc, slot, &lv_name)
                    {
                        if new_name != lv_name {
                            let new_index = self.utf8_index(&new_name);
                            info[name_at..name_at + 2].copy_from_slice(&new_index.to_be_bytes());
                        }
                    }
                }
            }

            pos = body + length;
        }

        Ok(info)
    }

    fn remap_class_attributes(&mut self, new_name: &str, names: &dyn NameMaps) -> Result<()> {
        for a in 0..self.attributes.len() {
            let attr_name = self.attribute_name(&self.attributes[a])?.to_string();
            match attr_name.as_str() {
                "Signature" => {
                    let info = self.attributes[a].info.clone();
                    let patched = self.remap_signature_attribute(&info, names)?;
                    self.attributes[a].info = patched;
                }
                "SourceFile" if names.rebuild_source_file() => {
                    // Attribute the class to the source file its new name
                    // implies.
                    let simple = new_name
                        .rsplit('/')
                        .next()
                        .unwrap_or(new_name)
                        .split('$')
                        .next()
                        .unwrap_or(new_name);
                    let index = self.utf8_index(&format!("{simple}.java"));
                    self.attributes[a].info = index.to_be_bytes().to_vec();
                }
                "InnerClasses" => {
                    let mut info = self.attributes[a].info.clone();
                    if info.len() < 2 {
                        continue;
                    }
                    let count = u16::from_be_bytes([info[0], info[1]]) as usize;
                    for e in 0..count {
                        let entry = 2 + e * 8;
                        if info.len() < entry + 8 {
                            break;
                        }
                        // inner_class_info is a Class entry, already
                        // remapped; keep the simple name in sync with it.
                        let inner_info =
                            u16::from_be_bytes([info[entry], info[entry + 1]]);
                        let inner_name_at = entry + 4;
                        let inner_name_index =
                            u16::from_be_bytes([info[inner_name_at], info[inner_name_at + 1]]);
                        if inner_name_index == 0 {
                            continue;
                        }

                        let full = self.class_name_at(inner_info)?.to_string();
                        let simple = full.rsplit('$').next().unwrap_or(&full).to_string();
                        let new_index = self.utf8_index(&simple);
                        info[inner_name_at..inner_name_at + 2]
                            .copy_from_slice(&new_index.to_be_bytes());
                    }
                    self.attributes[a].info = info;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Selects one of the two member lists without borrowing the whole class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemberList {
    Fields,
    Methods,
}

impl MemberList {
    fn get<'a>(&self, class: &'a ClassFile, index: usize) -> &'a Member {
        match self {
            MemberList::Fields => &class.fields[index],
            MemberList::Methods => &class.methods[index],
        }
    }

    fn get_mut<'a>(&self, class: &'a mut ClassFile, index: usize) -> &'a mut Member {
        match self {
            MemberList::Fields => &mut class.fields[index],
            MemberList::Methods => &mut class.methods[index],
        }
    }
}

/// The name lookups a class rewrite needs. Implemented by the rename engine.
pub trait NameMaps {
    /// Map an internal class name, `None` when unmapped.
    fn map_class<'a>(&'a self, name: &'a str) -> Option<&'a str>;

    /// Map a field by owner, name and descriptor (all pre-rename).
    fn map_field<'a>(&'a self, owner: &str, name: &'a str, desc: &str) -> Option<&'a str>;

    /// Map a method by owner, name and descriptor (all pre-rename).
    fn map_method<'a>(&'a self, owner: &str, name: &'a str, desc: &str) -> Option<&'a str>;

    /// Rewrite a type or method descriptor.
    fn map_descriptor(&self, desc: &str) -> String;

    /// Rewrite a generic signature.
    fn map_signature(&self, signature: &str) -> String;

    /// The replacement for a local-variable name, or `None` to keep it.
    fn local_variable_name(
        &self,
        owner: &str,
        method_name: &str,
        method_desc: &str,
        slot: u16,
        current: &str,
    ) -> Option<String>;

    /// Whether `SourceFile` attributes are rewritten to match renamed classes.
    fn rebuild_source_file(&self) -> bool;
}

fn parse_members(r: &mut Reader<'_>) -> Result<Vec<Member>> {
    let count = r.u2()? as usize;
    let mut members = Vec::with_capacity(count);
    for _ in 0..count {
        let access_flags = r.u2()?;
        let name_index = r.u2()?;
        let descriptor_index = r.u2()?;
        let attributes = parse_attributes(r)?;
        members.push(Member {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        });
    }
    Ok(members)
}

fn parse_attributes(r: &mut Reader<'_>) -> Result<Vec<Attribute>> {
    let count = r.u2()? as usize;
    let mut attributes = Vec::with_capacity(count);
    for _ in 0..count {
        let name_index = r.u2()?;
        let length = r.u4()? as usize;
        let info = r.take(length)?.to_vec();
        attributes.push(Attribute { name_index, info });
    }
    Ok(attributes)
}

fn write_members(out: &mut Vec<u8>, members: &[Member]) {
    out.extend_from_slice(&(members.len() as u16).to_be_bytes());
    for member in members {
        out.extend_from_slice(&member.access_flags.to_be_bytes());
        out.extend_from_slice(&member.name_index.to_be_bytes());
        out.extend_from_slice(&member.descriptor_index.to_be_bytes());
        write_attributes(out, &member.attributes);
    }
}

fn write_attributes(out: &mut Vec<u8>, attributes: &[Attribute]) {
    out.extend_from_slice(&(attributes.len() as u16).to_be_bytes());
    for attribute in attributes {
        out.extend_from_slice(&attribute.name_index.to_be_bytes());
        out.extend_from_slice(&(attribute.info.len() as u32).to_be_bytes());
        out.extend_from_slice(&attribute.info);
    }
}
