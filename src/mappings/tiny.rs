// src/mappings/tiny.rs

//! The persisted snapshot format: tab-separated, namespace-tagged rename
//! tables ("tiny v2").
//!
//! ```text
//! tiny	2	0	workspace	official
//! c	net/Foo	a
//! 	c	A class comment.
//! 	f	I	someField	b
//! 	m	(I)V	run	d
//! 		p	1	amount
//! 		c	A method comment.
//! ```
//!
//! Comments are escaped (`\n`, `\t`, `\r`, `\\`) so the format stays
//! line-oriented.

use super::visitor::{ElementKind, MappingVisitor, MemberKind};
use crate::error::{Error, Result};
use std::io::{BufRead, Write};
use std::path::Path;

/// A [`MappingVisitor`] that writes the tiny v2 representation of whatever
/// visits it.
pub struct TinyWriter<W: Write> {
    out: W,
    dst_count: usize,
    // Pending destination names for the currently open element.
    element: Option<PendingElement>,
}

struct PendingElement {
    depth: usize,
    prefix: String,
    dst_names: Vec<Option<String>>,
}

impl<W: Write> TinyWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            dst_count: 0,
            element: None,
        }
    }

    /// Write out the line for the currently open element, if any.
    fn flush_element(&mut self) -> Result<()> {
        let Some(element) = self.element.take() else {
            return Ok(());
        };

        let mut line = String::new();
        line.push_str(&"\t".repeat(element.depth));
        line.push_str(&element.prefix);
        for i in 0..self.dst_count {
            line.push('\t');
            if let Some(name) = element.dst_names.get(i).and_then(|n| n.as_deref()) {
                line.push_str(name);
            }
        }
        writeln!(self.out, "{line}")?;
        Ok(())
    }

    fn open_element(&mut self, depth: usize, prefix: String) -> Result<()> {
        self.flush_element()?;
        self.element = Some(PendingElement {
            depth,
            prefix,
            dst_names: Vec::new(),
        });
        Ok(())
    }

    fn comment_depth(element: ElementKind) -> usize {
        match element {
            ElementKind::Class => 1,
            ElementKind::Field | ElementKind::Method => 2,
            ElementKind::Parameter => 3,
        }
    }
}

impl<W: Write> MappingVisitor for TinyWriter<W> {
    fn visit_namespaces(&mut self, src: &str, dst: &[&str]) -> Result<()> {
        self.dst_count = dst.len();
        let mut header = format!("tiny\t2\t0\t{src}");
        for ns in dst {
            header.push('\t');
            header.push_str(ns);
        }
        writeln!(self.out, "{header}")?;
        Ok(())
    }

    fn visit_class(&mut self, src_name: &str) -> Result<bool> {
        self.open_element(0, format!("c\t{src_name}"))?;
        Ok(true)
    }

    fn visit_member(&mut self, kind: MemberKind, src_name: &str, src_desc: &str) -> Result<bool> {
        let tag = match kind {
            MemberKind::Field => 'f',
            MemberKind::Method => 'm',
        };
        self.open_element(1, format!("{tag}\t{src_desc}\t{src_name}"))?;
        Ok(true)
    }

    fn visit_parameter(&mut self, lv_index: u32, src_name: &str) -> Result<bool> {
        self.open_element(2, format!("p\t{lv_index}\t{src_name}"))?;
        Ok(true)
    }

    fn visit_dst_name(&mut self, _element: ElementKind, namespace: usize, name: &str) -> Result<()> {
        let element = self
            .element
            .as_mut()
            .ok_or_else(|| Error::Mapping("destination name with no open element".into()))?;
        if element.dst_names.len() <= namespace {
            element.dst_names.resize(namespace + 1, None);
        }
        element.dst_names[namespace] = Some(name.to_string());
        Ok(())
    }

    fn visit_comment(&mut self, element: ElementKind, comment: &str) -> Result<()> {
        self.flush_element()?;
        let depth = Self::comment_depth(element);
        writeln!(
            self.out,
            "{}c\t{}",
            "\t".repeat(depth),
            escape(comment)
        )?;
        Ok(())
    }

    fn visit_end(&mut self) -> Result<()> {
        self.flush_element()?;
        self.out.flush()?;
        Ok(())
    }
}

/// Read a tiny v2 table, replaying it into `visitor`.
pub fn read(reader: impl BufRead, origin: &Path, visitor: &mut dyn MappingVisitor) -> Result<()> {
    let mut lines = reader.lines();

    let header = lines
        .next()
        .ok_or_else(|| Error::malformed(origin, "empty mapping file"))??;
    let fields: Vec<&str> = header.split('\t').collect();
    let ["tiny", "2", _, src, dst @ ..] = fields.as_slice() else {
        return Err(Error::malformed(origin, format!("bad header {header:?}")));
    };
    visitor.visit_namespaces(src, dst)?;
    let dst_count = dst.len();

    // Whether content of the current class/member/parameter is skipped.
    let mut skip_class = false;
    let mut skip_member = false;
    let mut in_method = false;

    for (number, line) in lines.enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let malformed =
            |message: String| Error::malformed(origin, format!("line {}: {message}", number + 2));

        let depth = line.bytes().take_while(|&b| b == b'\t').count();
        let fields: Vec<&str> = line[depth..].split('\t').collect();

        match (depth, fields.as_slice()) {
            (0, ["c", src_name, dst_names @ ..]) => {
                skip_class = !visitor.visit_class(src_name)?;
                skip_member = false;
                in_method = false;
                if !skip_class {
                    emit_dst_names(visitor, ElementKind::Class, dst_names, dst_count)?;
                }
            }
            (1, ["c", comment]) if !skip_class => {
                visitor.visit_comment(ElementKind::Class, &unescape(comment))?;
            }
            (1, [tag @ ("f" | "m"), src_desc, src_name, dst_names @ ..]) if !skip_class => {
                let kind = if *tag == "f" {
                    MemberKind::Field
                } else {
                    MemberKind::Method
                };
                in_method = kind == MemberKind::Method;
                skip_member = !visitor.visit_member(kind, src_name, src_desc)?;
                if !skip_member {
                    emit_dst_names(visitor, kind.element(), dst_names, dst_count)?;
                }
            }
            (2, ["c", comment]) if !skip_class && !skip_member => {
                let element = if in_method {
                    ElementKind::Method
                } else {
                    ElementKind::Field
                };
                visitor.visit_comment(element, &unescape(comment))?;
            }
            (2, ["p", lv_index, src_name, dst_names @ ..])
                if !skip_class && !skip_member && in_method =>
            {
                let lv_index: u32 = lv_index
                    .parse()
                    .map_err(|_| malformed(format!("bad parameter index {lv_index:?}")))?;
                if visitor.visit_parameter(lv_index, src_name)? {
                    emit_dst_names(visitor, ElementKind::Parameter, dst_names, dst_count)?;
                }
            }
            (3, ["c", comment]) if !skip_class && !skip_member => {
                visitor.visit_comment(ElementKind::Parameter, &unescape(comment))?;
            }
            _ if skip_class || skip_member => {}
            _ => return Err(malformed(format!("unrecognized line {line:?}"))),
        }
    }

    visitor.visit_end()
}

fn emit_dst_names(
    visitor: &mut dyn MappingVisitor,
    element: ElementKind,
    names: &[&str],
    dst_count: usize,
) -> Result<()> {
    for (i, name) in names.iter().take(dst_count).enumerate() {
        if !name.is_empty() {
            visitor.visit_dst_name(element, i, name)?;
        }
    }
    Ok(())
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}
