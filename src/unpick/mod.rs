// src/unpick/mod.rs

//! Namespace-remapping of constant-uninlining definition files.
//!
//! The constant-uninlining tool consumes a small text file describing
//! constant groups and target methods. Those definitions ship named in one
//! namespace, while the tool runs against workspace-named classes, so the
//! definitions are rewritten through the same mapping tree the rename
//! engine uses. Only symbol names change; the file's structure is copied
//! through untouched. The tool invocation itself is out of scope here.

use crate::error::{Error, Result};
use crate::mappings::{MemoryMappingTree, Namespace};
use crate::remap::remap_descriptor;
use std::collections::HashMap;
use std::path::Path;

/// Remap a v2 definitions file from namespace `from` to namespace `to`.
pub fn remap_definitions(
    tree: &MemoryMappingTree,
    from: &str,
    to: &str,
    input: &str,
    origin: &Path,
) -> Result<String> {
    let from_ns = tree
        .namespace(from)
        .ok_or_else(|| Error::Mapping(format!("tree has no namespace {from}")))?;
    let to_ns = tree
        .namespace(to)
        .ok_or_else(|| Error::Mapping(format!("tree has no namespace {to}")))?;

    // Class names in `from`, for descriptor rewriting.
    let mut class_map: HashMap<String, String> = HashMap::new();
    for class in tree.classes() {
        if let (Some(f), Some(t)) = (class.name(from_ns), class.name(to_ns)) {
            class_map.insert(f.to_string(), t.to_string());
        }
    }
    let map_desc = |desc: &str| remap_descriptor(desc, &|name| class_map.get(name).cloned());

    let mut lines = input.lines();
    let header = lines
        .next()
        .ok_or_else(|| Error::malformed(origin, "empty definitions file"))?;
    if header.trim() != "v2" {
        return Err(Error::malformed(
            origin,
            format!("unknown definitions format {header:?}"),
        ));
    }

    let mut out = String::with_capacity(input.len());
    out.push_str(header);
    out.push('\n');

    for (number, line) in lines.enumerate() {
        let trimmed = line.trim_start();
        // Comments, blanks and indented continuation lines (`param`,
        // `return`) carry no symbol names.
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed != line {
            out.push_str(line);
            out.push('\n');
            continue;
        }

        let malformed =
            |message: String| Error::malformed(origin, format!("line {}: {message}", number + 2));

        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [kw @ ("constant" | "flag"), group, owner, name, rest @ ..] => {
                let (owner, name, desc) = remap_field(
                    tree,
                    from_ns,
                    to_ns,
                    owner,
                    name,
                    rest.get(1).copied(),
                    &map_desc,
                );

                out.push_str(kw);
                out.push(' ');
                out.push_str(group);
                out.push(' ');
                out.push_str(&owner);
                out.push(' ');
                out.push_str(&name);
                if let Some(value) = rest.first() {
                    out.push(' ');
                    out.push_str(value);
                }
                if let Some(desc) = desc {
                    out.push(' ');
                    out.push_str(&desc);
                }
                out.push('\n');
            }
            ["target_method", owner, name, desc] => {
                let (owner, name, desc) =
                    remap_method(tree, from_ns, to_ns, owner, name, desc, &map_desc);
                out.push_str(&format!("target_method {owner} {name} {desc}\n"));
            }
            _ => return Err(malformed(format!("cannot parse definition {line:?}"))),
        }
    }

    Ok(out)
}

fn remap_field(
    tree: &MemoryMappingTree,
    from_ns: Namespace,
    to_ns: Namespace,
    owner: &str,
    name: &str,
    desc: Option<&str>,
    map_desc: &dyn Fn(&str) -> String,
) -> (String, String, Option<String>) {
    let mapped_desc = desc.map(|d| map_desc(d));

    let Some(class) = tree.class_by_name(owner, from_ns) else {
        return (owner.to_string(), name.to_string(), mapped_desc);
    };
    let mapped_owner = class.name(to_ns).unwrap_or(owner).to_string();

    let mapped_name = class
        .field_by_name(name, from_ns)
        .and_then(|field| field.name(to_ns))
        .unwrap_or(name)
        .to_string();

    (mapped_owner, mapped_name, mapped_desc)
}

fn remap_method(
    tree: &MemoryMappingTree,
    from_ns: Namespace,
    to_ns: Namespace,
    owner: &str,
    name: &str,
    desc: &str,
    map_desc: &dyn Fn(&str) -> String,
) -> (String, String, String) {
    let mapped_desc = map_desc(desc);

    let Some(class) = tree.class_by_name(owner, from_ns) else {
        return (owner.to_string(), name.to_string(), mapped_desc);
    };
    let mapped_owner = class.name(to_ns).unwrap_or(owner).to_string();

    // Match the method by its name and descriptor as written in `from`.
    let mapped_name = class
        .methods()
        .find(|method| {
            method.name(from_ns) == Some(name) && {
                // Descriptors are stored in the tree's source namespace;
                // compare in `from`.
                let stored = match from_ns {
                    Namespace::Src => method.src_desc().to_string(),
                    Namespace::Dst(_) => desc_in(tree, method.src_desc(), from_ns),
                };
                stored == desc
            }
        })
        .and_then(|method| method.name(to_ns))
        .unwrap_or(name)
        .to_string();

    (mapped_owner, mapped_name, mapped_desc)
}

fn desc_in(tree: &MemoryMappingTree, src_desc: &str, ns: Namespace) -> String {
    remap_descriptor(src_desc, &|name| {
        tree.class(name)
            .and_then(|class| class.name(ns))
            .map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mappings::visitor::{ElementKind, MappingVisitor, MemberKind};
    use crate::mappings::{OFFICIAL, WORKSPACE};

    fn sample_tree() -> MemoryMappingTree {
        let mut tree = MemoryMappingTree::new();
        tree.visit_namespaces(WORKSPACE, &[OFFICIAL]).unwrap();
        tree.visit_class("net/Flags").unwrap();
        tree.visit_dst_name(ElementKind::Class, 0, "a").unwrap();
        tree.visit_member(MemberKind::Field, "SHINY", "I").unwrap();
        tree.visit_dst_name(ElementKind::Field, 0, "b").unwrap();
        tree.visit_class("net/Widget").unwrap();
        tree.visit_dst_name(ElementKind::Class, 0, "c").unwrap();
        tree.visit_member(MemberKind::Method, "setFlags", "(ILnet/Flags;)V")
            .unwrap();
        tree.visit_dst_name(ElementKind::Method, 0, "d").unwrap();
        tree.visit_end().unwrap();
        tree
    }

    #[test]
    fn remaps_official_definitions_to_workspace() {
        let tree = sample_tree();
        let input = "\
v2
# flags for widgets
flag widget_flags a b
target_method c d (ILa;)V
    param 0 widget_flags
";

        let output = remap_definitions(
            &tree,
            OFFICIAL,
            WORKSPACE,
            input,
            Path::new("defs.unpick"),
        )
        .unwrap();

        assert_eq!(
            output,
            "\
v2
# flags for widgets
flag widget_flags net/Flags SHINY
target_method net/Widget setFlags (ILnet/Flags;)V
    param 0 widget_flags
"
        );
    }

    #[test]
    fn unknown_symbols_pass_through() {
        let tree = sample_tree();
        let input = "v2\nconstant group x y\n";
        let output =
            remap_definitions(&tree, OFFICIAL, WORKSPACE, input, Path::new("defs.unpick"))
                .unwrap();
        assert_eq!(output, "v2\nconstant group x y\n");
    }

    #[test]
    fn unknown_header_is_rejected() {
        let tree = sample_tree();
        let err = remap_definitions(&tree, OFFICIAL, WORKSPACE, "v9\n", Path::new("defs.unpick"))
            .unwrap_err();
        assert!(matches!(err, Error::MalformedFile { .. }));
    }
}
