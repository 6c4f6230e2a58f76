use std::collections::BTreeSet;

use log::trace;

use crate::{cfg::CFG, Addr};

enum Visit {
    /// visit the block and queue up its successors.
    Explore(Addr),
    /// the block's sub-graph is done, so it leaves the spine.
    Pop(Addr),
}

/// find the edges `(from, to)` that close a loop.
///
/// this is a depth first search using an explicit stack, since real traces
/// can have very long chains of blocks.
/// the search is seeded from every block, in address order,
/// because dead code may not be reachable from the entry block.
/// successors are explored in order (fallthrough before branch target),
/// which decides which edge of a cycle is reported.
pub fn find_back_edges(cfg: &CFG) -> BTreeSet<(Addr, Addr)> {
    let mut visited: BTreeSet<Addr> = Default::default();
    let mut back_edges: BTreeSet<(Addr, Addr)> = Default::default();

    for &root in cfg.basic_blocks.keys() {
        let mut stack = vec![Visit::Explore(root)];
        // blocks whose sub-graph is currently being explored.
        let mut spine: BTreeSet<Addr> = Default::default();

        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Explore(addr) => {
                    if !visited.insert(addr) {
                        continue;
                    }

                    let bb = match cfg.basic_blocks.get(&addr) {
                        Some(bb) => bb,
                        None => continue,
                    };

                    spine.insert(addr);
                    stack.push(Visit::Pop(addr));

                    // pushed in reverse, so the first successor is explored first.
                    for &succ in bb.successors.iter().rev() {
                        if spine.contains(&succ) {
                            trace!("loops: back edge {} -> {}", addr, succ);
                            back_edges.insert((addr, succ));
                            continue;
                        }

                        // dead code has no basic block.
                        if cfg.basic_blocks.contains_key(&succ) {
                            stack.push(Visit::Explore(succ));
                        }
                    }
                }
                Visit::Pop(addr) => {
                    spine.remove(&addr);
                }
            }
        }
    }

    back_edges
}
