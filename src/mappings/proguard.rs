// src/mappings/proguard.rs

//! Reader for ProGuard-format rename tables, the format the bundled tables
//! ship in.
//!
//! The format lists classes by their readable (workspace) name with the
//! obfuscated name after an arrow, and indents members below them:
//!
//! ```text
//! net.minecraft.Example -> a:
//!     int someField -> b
//!     1:4:void run(int,java.lang.String[]) -> c
//! ```
//!
//! Member types are Java source types and are converted to JVM descriptors
//! (in workspace types, since that is the source namespace of the file).

use super::visitor::{ElementKind, MappingVisitor, MemberKind};
use crate::error::{Error, Result};
use std::io::BufRead;
use std::path::Path;

/// Read a ProGuard table from `reader`, feeding `visitor` with
/// `src_namespace` source names and `dst_namespace` destination names.
///
/// `origin` is only used to name the file in parse errors.
pub fn read(
    reader: impl BufRead,
    origin: &Path,
    src_namespace: &str,
    dst_namespace: &str,
    visitor: &mut dyn MappingVisitor,
) -> Result<()> {
    visitor.visit_namespaces(src_namespace, &[dst_namespace])?;

    let mut in_class = false;
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let malformed =
            |message: String| Error::malformed(origin, format!("line {}: {message}", number + 1));

        if line.starts_with(' ') || line.starts_with('\t') {
            // Member line.
            if !in_class {
                return Err(malformed("member outside a class".into()));
            }

            let (signature, obf_name) = split_arrow(trimmed)
                .ok_or_else(|| malformed(format!("expected `signature -> name` in {trimmed:?}")))?;
            // Strip the optional `from:to:` line-number prefix.
            let signature = signature
                .rsplit_once(':')
                .map(|(_, rest)| rest)
                .unwrap_or(signature);

            let (return_type, rest) = signature
                .split_once(' ')
                .ok_or_else(|| malformed(format!("expected `type name` in {signature:?}")))?;

            if let Some(open) = rest.find('(') {
                let name = &rest[..open];
                let args = rest[open + 1..]
                    .strip_suffix(')')
                    .ok_or_else(|| malformed(format!("unterminated argument list in {rest:?}")))?;

                let mut desc = String::from("(");
                if !args.is_empty() {
                    for arg in args.split(',') {
                        desc.push_str(&java_type_to_descriptor(arg.trim()));
                    }
                }
                desc.push(')');
                desc.push_str(&java_type_to_descriptor(return_type));

                if visitor.visit_member(MemberKind::Method, name, &desc)? {
                    visitor.visit_dst_name(ElementKind::Method, 0, obf_name)?;
                }
            } else {
                let desc = java_type_to_descriptor(return_type);
                if visitor.visit_member(MemberKind::Field, rest, &desc)? {
                    visitor.visit_dst_name(ElementKind::Field, 0, obf_name)?;
                }
            }
        } else {
            // Class line: `full.Name -> obf:`.
            let body = trimmed
                .strip_suffix(':')
                .ok_or_else(|| malformed(format!("expected class line to end with `:`: {trimmed:?}")))?;
            let (name, obf_name) = split_arrow(body)
                .ok_or_else(|| malformed(format!("expected `name -> name` in {body:?}")))?;

            in_class = visitor.visit_class(&name.replace('.', "/"))?;
            if in_class {
                visitor.visit_dst_name(ElementKind::Class, 0, &obf_name.replace('.', "/"))?;
            }
        }
    }

    visitor.visit_end()
}

fn split_arrow(s: &str) -> Option<(&str, &str)> {
    let (left, right) = s.split_once("->")?;
    Some((left.trim(), right.trim()))
}

/// Convert a Java source type (`int`, `java.lang.String[]`) to a JVM
/// descriptor (`I`, `[Ljava/lang/String;`).
fn java_type_to_descriptor(ty: &str) -> String {
    let mut base = ty;
    let mut dimensions = 0;
    while let Some(stripped) = base.strip_suffix("[]") {
        base = stripped;
        dimensions += 1;
    }

    let element = match base {
        "void" => "V".to_string(),
        "boolean" => "Z".to_string(),
        "byte" => "B".to_string(),
        "char" => "C".to_string(),
        "short" => "S".to_string(),
        "int" => "I".to_string(),
        "long" => "J".to_string(),
        "float" => "F".to_string(),
        "double" => "D".to_string(),
        class => format!("L{};", class.replace('.', "/")),
    };

    format!("{}{}", "[".repeat(dimensions), element)
}
