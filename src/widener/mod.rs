// src/widener/mod.rs

//! Visibility widening: selectively loosening access modifiers on classes
//! and members per externally supplied rule files.
//!
//! Rule files are plain text with a header and one directive per line,
//! naming symbols in the namespace of the input archives (pre-rename):
//!
//! ```text
//! widener v1 official
//! accessible class a
//! extendable method a b (I)V
//! mutable field a c I
//! ```
//!
//! The combined rule set exposes which class-file paths it targets; the
//! transform checks an entry's pre-rename path against that set and applies
//! the flag rewrite to the renamed bytes, remapping the rule keys through
//! the same mapping set.

use crate::error::{Error, Result};
use crate::remap::classfile::ClassFile;
use crate::remap::MappingSet;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;

const HEADER_PREFIX: &str = "widener";

// Access flag bits, as defined by the class file format.
const ACC_PUBLIC: u16 = 0x0001;
const ACC_PRIVATE: u16 = 0x0002;
const ACC_PROTECTED: u16 = 0x0004;
const ACC_FINAL: u16 = 0x0010;

/// How far a symbol's visibility is widened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Access {
    /// Make the symbol public. A private method additionally becomes final,
    /// since making it virtual would change dispatch for existing callers.
    Accessible,
    /// Make the symbol overridable: public/protected and non-final.
    Extendable,
    /// Make a field non-final.
    Mutable,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Access::Accessible => "accessible",
            Access::Extendable => "extendable",
            Access::Mutable => "mutable",
        };
        write!(f, "{name}")
    }
}

type MemberKey = (String, String, String);

/// A combined set of widening rules, keyed by pre-rename names.
#[derive(Debug, Default)]
pub struct AccessRules {
    namespace: Option<String>,
    classes: HashMap<String, Vec<Access>>,
    methods: HashMap<MemberKey, Vec<Access>>,
    fields: HashMap<MemberKey, Vec<Access>>,
}

impl AccessRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one rule file into this set. Rule files may be combined freely
    /// as long as they agree on the namespace.
    pub fn read(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::cache(format!("cannot read rules from {}", path.display()), e))?;
        self.parse(&content, path)
    }

    fn parse(&mut self, content: &str, origin: &Path) -> Result<()> {
        let mut lines = content.lines().enumerate();

        let header = loop {
            let (_, line) = lines
                .next()
                .ok_or_else(|| Error::malformed(origin, "missing widener header"))?;
            let line = strip_comment(line);
            if !line.is_empty() {
                break line.to_string();
            }
        };

        let header_fields: Vec<&str> = header.split_whitespace().collect();
        let [HEADER_PREFIX, "v1", namespace] = header_fields[..] else {
            return Err(Error::malformed(
                origin,
                format!("bad widener header {header:?}"),
            ));
        };
        match &self.namespace {
            None => self.namespace = Some(namespace.to_string()),
            Some(existing) if existing == namespace => {}
            Some(existing) => {
                return Err(Error::malformed(
                    origin,
                    format!("widener namespace {namespace} does not match {existing}"),
                ));
            }
        }

        for (number, line) in lines {
            let line = strip_comment(line);
            if line.is_empty() {
                continue;
            }
            let malformed = |message: String| {
                Error::malformed(origin, format!("line {}: {message}", number + 1))
            };

            let fields: Vec<&str> = line.split_whitespace().collect();
            let (access, target, rest) = match fields.as_slice() {
                [access, target, rest @ ..] => (*access, *target, rest),
                _ => return Err(malformed(format!("cannot parse rule {line:?}"))),
            };

            let access = match access {
                "accessible" => Access::Accessible,
                "extendable" => Access::Extendable,
                "mutable" => Access::Mutable,
                other => return Err(malformed(format!("unknown access kind {other:?}"))),
            };

            match (target, rest) {
                ("class", [owner]) => {
                    if access == Access::Mutable {
                        return Err(malformed("classes cannot be made mutable".into()));
                    }
                    self.classes.entry(owner.to_string()).or_default().push(access);
                }
                ("method", [owner, name, desc]) => {
                    if access == Access::Mutable {
                        return Err(malformed("methods cannot be made mutable".into()));
                    }
                    self.methods
                        .entry((owner.to_string(), name.to_string(), desc.to_string()))
                        .or_default()
                        .push(access);
                }
                ("field", [owner, name, desc]) => {
                    if access == Access::Extendable {
                        return Err(malformed("fields cannot be made extendable".into()));
                    }
                    self.fields
                        .entry((owner.to_string(), name.to_string(), desc.to_string()))
                        .or_default()
                        .push(access);
                }
                _ => return Err(malformed(format!("cannot parse rule {line:?}"))),
            }
        }

        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.methods.is_empty() && self.fields.is_empty()
    }

    /// The class-file paths (in the rules' own namespace) that any rule
    /// targets, including owners of member rules.
    pub fn target_paths(&self) -> BTreeSet<String> {
        let mut targets = BTreeSet::new();
        for owner in self.classes.keys() {
            targets.insert(format!("{owner}.class"));
        }
        for (owner, _, _) in self.methods.keys().chain(self.fields.keys()) {
            targets.insert(format!("{owner}.class"));
        }
        targets
    }

    /// Translate every rule key through a mapping set, producing rules that
    /// apply to renamed class files.
    pub fn remap(&self, mappings: &MappingSet) -> AccessRules {
        let map_class =
            |name: &str| mappings.map_class(name).unwrap_or(name).to_string();

        let map_member = |rules: &HashMap<MemberKey, Vec<Access>>, method: bool| {
            rules
                .iter()
                .map(|((owner, name, desc), accesses)| {
                    let mapped_name = if method {
                        mappings.map_method(owner, name, desc)
                    } else {
                        mappings.map_field(owner, name, desc)
                    }
                    .unwrap_or(name)
                    .to_string();
                    (
                        (map_class(owner), mapped_name, mappings.map_descriptor(desc)),
                        accesses.clone(),
                    )
                })
                .collect()
        };

        AccessRules {
            namespace: self.namespace.clone(),
            classes: self
                .classes
                .iter()
                .map(|(owner, accesses)| (map_class(owner), accesses.clone()))
                .collect(),
            methods: map_member(&self.methods, true),
            fields: map_member(&self.fields, false),
        }
    }

    /// Rewrite the access flags of a parsed class per this rule set.
    /// Returns whether anything changed.
    pub fn apply(&self, class: &mut ClassFile) -> Result<bool> {
        let name = class.this_class_name()?.to_string();
        let mut changed = false;

        if let Some(accesses) = self.classes.get(&name) {
            for access in accesses {
                let flags = class.access_flags;
                class.access_flags = match access {
                    Access::Accessible => make_public(flags),
                    Access::Extendable => make_public(flags) & !ACC_FINAL,
                    Access::Mutable => flags,
                };
                changed |= class.access_flags != flags;
            }
        }

        for i in 0..class.methods.len() {
            let key = (
                name.clone(),
                class.member_name(&class.methods[i])?.to_string(),
                class.member_descriptor(&class.methods[i])?.to_string(),
            );
            let Some(accesses) = self.methods.get(&key) else {
                continue;
            };
            for access in accesses {
                let flags = class.methods[i].access_flags;
                class.methods[i].access_flags = match access {
                    Access::Accessible => {
                        let mut new = make_public(flags);
                        if flags & ACC_PRIVATE != 0 {
                            new |= ACC_FINAL;
                        }
                        new
                    }
                    Access::Extendable => {
                        // Private methods widen to protected here, public
                        // stays public; either way the method loses final.
                        let new = if flags & ACC_PUBLIC != 0 {
                            flags
                        } else {
                            (flags & !(ACC_PRIVATE | ACC_PROTECTED)) | ACC_PROTECTED
                        };
                        new & !ACC_FINAL
                    }
                    Access::Mutable => flags,
                };
                changed |= class.methods[i].access_flags != flags;
            }
        }

        for i in 0..class.fields.len() {
            let key = (
                name.clone(),
                class.member_name(&class.fields[i])?.to_string(),
                class.member_descriptor(&class.fields[i])?.to_string(),
            );
            let Some(accesses) = self.fields.get(&key) else {
                continue;
            };
            for access in accesses {
                let flags = class.fields[i].access_flags;
                class.fields[i].access_flags = match access {
                    Access::Accessible => make_public(flags),
                    Access::Mutable => flags & !ACC_FINAL,
                    Access::Extendable => flags,
                };
                changed |= class.fields[i].access_flags != flags;
            }
        }

        Ok(changed)
    }
}

fn make_public(flags: u16) -> u16 {
    (flags & !(ACC_PRIVATE | ACC_PROTECTED)) | ACC_PUBLIC
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(at) => line[..at].trim(),
        None => line.trim(),
    }
}

/// Parse and combine several rule files.
pub fn read_all(paths: impl IntoIterator<Item = impl AsRef<Path>>) -> Result<AccessRules> {
    let mut rules = AccessRules::new();
    for path in paths {
        rules.read(path.as_ref())?;
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> AccessRules {
        let mut rules = AccessRules::new();
        rules.parse(content, Path::new("test.widener")).unwrap();
        rules
    }

    #[test]
    fn parses_rules_and_targets() {
        let rules = parse(
            "widener v1 official\n\
             # widen the config holder\n\
             accessible class a\n\
             extendable method b c (I)V\n\
             mutable field a d I  # trailing comment\n",
        );

        let targets = rules.target_paths();
        assert!(targets.contains("a.class"));
        assert!(targets.contains("b.class"));
        assert_eq!(targets.len(), 2);
    }

    #[test]
    fn header_is_required() {
        let mut rules = AccessRules::new();
        let err = rules
            .parse("accessible class a\n", Path::new("test.widener"))
            .unwrap_err();
        assert!(matches!(err, Error::MalformedFile { .. }));
    }

    #[test]
    fn namespaces_must_agree() {
        let mut rules = AccessRules::new();
        rules
            .parse("widener v1 official\n", Path::new("a.widener"))
            .unwrap();
        let err = rules
            .parse("widener v1 workspace\n", Path::new("b.widener"))
            .unwrap_err();
        assert!(err.to_string().contains("workspace"));
    }

    #[test]
    fn nonsense_directives_are_rejected() {
        let mut rules = AccessRules::new();
        assert!(rules
            .parse("widener v1 official\nmutable class a\n", Path::new("t"))
            .is_err());
        let mut rules = AccessRules::new();
        assert!(rules
            .parse("widener v1 official\naccessible method a\n", Path::new("t"))
            .is_err());
        let mut rules = AccessRules::new();
        assert!(rules
            .parse("widener v1 official\nshiny class a\n", Path::new("t"))
            .is_err());
    }

    #[test]
    fn flag_math() {
        assert_eq!(make_public(ACC_PRIVATE | ACC_FINAL), ACC_PUBLIC | ACC_FINAL);
        assert_eq!(make_public(ACC_PROTECTED), ACC_PUBLIC);
        assert_eq!(make_public(ACC_PUBLIC), ACC_PUBLIC);
        assert_eq!(make_public(0), ACC_PUBLIC);
    }
}
