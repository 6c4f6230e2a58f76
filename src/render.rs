use std::collections::BTreeSet;

use crate::{
    cfg::{BasicBlock, Edge, CFG},
    config::Config,
    store::InstructionStore,
    util::count_digits,
    Addr,
};

/// A basic block, ready to be drawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub addr:  Addr,
    /// one entry per line, without line terminators.
    pub label: Vec<String>,
    /// index into the color scheme, from 1 (cold) up to the configured number of colors (hot).
    pub fill:  u32,
}

/// The annotated CFG, in the shape that graphviz wants.
#[derive(Debug, Clone)]
pub struct Graph {
    pub colorscheme: String,
    pub nodes:       Vec<Node>,
    pub edges:       Vec<Edge>,
}

/// width of a frequency bucket, in powers of two.
fn color_step(global_max_frequency: u64, colors: u32) -> u32 {
    let log = global_max_frequency.saturating_add(1).ilog2();
    (log / colors.max(1)).max(1)
}

/// `floor(log2(max_frequency) / step) + 1`, limited to the available colors.
fn fill_weight(max_frequency: u64, step: u32, colors: u32) -> u32 {
    let log = max_frequency.max(1).ilog2();
    (log / step + 1).clamp(1, colors.max(1))
}

/// render the lines of a basic block:
/// source annotations, then `address: text  frequency` per instruction,
/// with the columns aligned within the block.
fn block_label(store: &InstructionStore, bb: &BasicBlock, config: &Config) -> Vec<String> {
    let insns: Vec<_> = bb.insns.iter().filter_map(|&addr| store.get(addr)).collect();

    let addr_digits = insns.iter().map(|insn| count_digits(insn.addr)).max().unwrap_or(0);
    let insn_chars = insns.iter().map(|insn| insn.text.chars().count()).max().unwrap_or(0);
    let insn_padding = insn_chars + config.text_padding;

    let mut lines = vec![];
    for insn in insns.iter() {
        if let Some(source) = &insn.source {
            lines.push(source.clone());
        }
        lines.push(format!(
            "{:>addr_digits$}: {:<insn_padding$} {}",
            insn.addr,
            insn.text,
            insn.frequency,
            addr_digits = addr_digits,
            insn_padding = insn_padding,
        ));
    }
    lines
}

impl Graph {
    pub fn from_cfg(
        store: &InstructionStore,
        cfg: &CFG,
        back_edges: &BTreeSet<(Addr, Addr)>,
        config: &Config,
    ) -> Graph {
        let global_max_frequency = cfg
            .basic_blocks
            .values()
            .map(|bb| bb.max_frequency)
            .max()
            .unwrap_or(0);
        let step = color_step(global_max_frequency, config.colors);

        let nodes = cfg
            .basic_blocks
            .values()
            .map(|bb| Node {
                addr:  bb.address,
                label: block_label(store, bb, config),
                fill:  fill_weight(bb.max_frequency, step, config.colors),
            })
            .collect();

        Graph {
            colorscheme: config.colorscheme.clone(),
            nodes,
            edges: cfg.edges(back_edges),
        }
    }
}

/// escape text for use inside a quoted DOT string.
fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// quote a string as a DOT ID.
fn quote(s: &str) -> String {
    format!("\"{}\"", escape(s))
}

impl std::fmt::Display for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "digraph G {{")?;
        writeln!(
            f,
            "node [shape=box, fontname=monospace, colorscheme={}, style=filled];",
            quote(&self.colorscheme)
        )?;

        for node in self.nodes.iter() {
            // `\l` ends a left-justified line.
            let label: String = node
                .label
                .iter()
                .map(|line| format!("{}\\l", escape(&line.replace("\\n", ""))))
                .collect();
            writeln!(f, "{} [label=\"{}\", fillcolor={}];", node.addr, label, node.fill)?;
        }

        // edges to dead code are still drawn; graphviz adds a bare node for the target.
        for edge in self.edges.iter() {
            let mut attrs = vec![];
            if edge.is_secondary_branch {
                attrs.push("color=blue");
            }
            if edge.is_back_edge {
                attrs.push("penwidth=5");
            }

            if attrs.is_empty() {
                writeln!(f, "{} -> {};", edge.from, edge.to)?;
            } else {
                writeln!(f, "{} -> {} [{}];", edge.from, edge.to, attrs.join(", "))?;
            }
        }

        writeln!(f, "}}")
    }
}
