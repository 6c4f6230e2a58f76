use std::collections::{BTreeMap, BTreeSet};

use crate::{insn::Successors, Addr};

mod blocks;
pub use blocks::build_cfg;

pub mod loops;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    /// order in which the block was discovered, scanning by address.
    pub index: usize,

    /// address of the first instruction.
    pub address: Addr,

    /// addresses of the instructions found in this basic block, ascending.
    /// look them up in the `InstructionStore`.
    pub insns: Vec<Addr>,

    /// the largest execution count of any instruction in the block.
    pub max_frequency: u64,

    /// addresses of basic blocks that flow from here: fallthrough, then branch target.
    /// an address may have no basic block, when the target was never executed.
    pub successors: Successors,
}

/// A control flow edge between two basic blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Edge {
    pub from:                Addr,
    pub to:                  Addr,
    /// the branch target of a conditional jump, rather than its fallthrough.
    pub is_secondary_branch: bool,
    /// closes a loop.
    pub is_back_edge:        bool,
}

pub struct CFG {
    // we use a btree so that we can conveniently iterate in order.
    pub basic_blocks: BTreeMap<Addr, BasicBlock>,
}

impl CFG {
    /// all edges, ordered by source block and then by successor position.
    pub fn edges(&self, back_edges: &BTreeSet<(Addr, Addr)>) -> Vec<Edge> {
        self.basic_blocks
            .values()
            .flat_map(|bb| {
                bb.successors.iter().enumerate().map(move |(i, &to)| Edge {
                    from: bb.address,
                    to,
                    is_secondary_branch: i == 1,
                    is_back_edge: back_edges.contains(&(bb.address, to)),
                })
            })
            .collect()
    }
}
