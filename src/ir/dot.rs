//! Graphviz rendering of IR blocks.
//!
//! Output can be rendered with `dot -Tsvg`. Virtual blocks are drawn filled, native blocks
//! plain; branch targets outside the function become separate address nodes.

use std::{collections::BTreeSet, fmt::Write};

use crate::ir::{BranchTarget, IrBlock};

/// Escapes a string for use inside a quoted DOT label.
///
/// # Examples
///
/// ```rust,ignore
/// let escaped = escape_label("mov eax, [rsp+0x10]");
/// assert_eq!(escaped, "mov eax, \\[rsp+0x10\\]");
/// ```
#[must_use]
pub fn escape_label(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\l"),
            '\r' => {}
            '<' | '>' | '{' | '}' | '|' | '[' | ']' => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Incremental builder for a DOT digraph.
#[derive(Debug)]
pub struct DotWriter {
    out: String,
    addresses: BTreeSet<u64>,
    clusters: usize,
}

impl DotWriter {
    /// Starts a new digraph.
    #[must_use]
    pub fn new(name: &str) -> Self {
        let mut out = String::new();
        let _ = writeln!(out, "digraph \"{}\" {{", escape_label(name));
        let _ = writeln!(out, "  node [shape=box, fontname=\"monospace\"];");
        DotWriter {
            out,
            addresses: BTreeSet::new(),
            clusters: 0,
        }
    }

    /// Opens a labelled cluster; every node until [`DotWriter::end_cluster`] belongs to it.
    pub fn begin_cluster(&mut self, label: &str) {
        let _ = writeln!(self.out, "  subgraph cluster_{} {{", self.clusters);
        let _ = writeln!(self.out, "    label=\"{}\";", escape_label(label));
        self.clusters += 1;
    }

    /// Closes the current cluster.
    pub fn end_cluster(&mut self) {
        let _ = writeln!(self.out, "  }}");
    }

    /// Emits a node for `block`, labelled with its commands.
    pub fn block(&mut self, block: &IrBlock, role: &str) {
        let mut label = format!("{} [{role}]\n", block.id());
        for command in block.commands() {
            let _ = writeln!(label, "{command}");
        }
        let style = if block.is_virtual() {
            ", style=filled, fillcolor=\"#dde8f8\""
        } else {
            ""
        };
        let _ = writeln!(
            self.out,
            "    {} [label=\"{}\"{style}];",
            block.id(),
            escape_label(&label)
        );
    }

    /// Emits edges from `block` to every target of its commands.
    pub fn edges(&mut self, block: &IrBlock) {
        for target in block.targets() {
            match target {
                BranchTarget::Block(to) => {
                    let _ = writeln!(self.out, "  {} -> {};", block.id(), to);
                }
                BranchTarget::Address(rva) => {
                    self.addresses.insert(rva);
                    let _ = writeln!(self.out, "  {} -> addr_{rva:x};", block.id());
                }
            }
        }
    }

    /// Finishes the graph and returns the DOT source.
    #[must_use]
    pub fn finish(mut self) -> String {
        for rva in &self.addresses {
            let _ = writeln!(
                self.out,
                "  addr_{rva:x} [label=\"0x{rva:x}\", shape=ellipse];"
            );
        }
        self.out.push_str("}\n");
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BlockId, BlockState, Branch, Command, CommandId, CommandKind};

    #[test]
    fn test_escape_label() {
        assert_eq!(escape_label("hello"), "hello");
        assert_eq!(escape_label("say \"hi\""), "say \\\"hi\\\"");
        assert_eq!(escape_label("[rsp+0x10]"), "\\[rsp+0x10\\]");
        assert_eq!(escape_label("a\r\nb"), "a\\lb");
        assert_eq!(escape_label("x|y"), "x\\|y");
    }

    #[test]
    fn test_writer() {
        let mut block = IrBlock::new(BlockId::new(1), BlockState::Virtual);
        block
            .push(Command::new(
                CommandId(0),
                CommandKind::Branch(Branch::jump(BranchTarget::Address(0x500), true)),
            ))
            .unwrap();

        let mut writer = DotWriter::new("fn");
        writer.begin_cluster("unit 0");
        writer.block(&block, "body");
        writer.end_cluster();
        writer.edges(&block);
        let dot = writer.finish();

        assert!(dot.starts_with("digraph \"fn\" {"));
        assert!(dot.contains("subgraph cluster_0"));
        assert!(dot.contains("block_1 -> addr_500;"));
        assert!(dot.contains("addr_500 [label=\"0x500\", shape=ellipse];"));
        assert!(dot.contains("fillcolor"));
        assert!(dot.trim_end().ends_with('}'));
    }
}
