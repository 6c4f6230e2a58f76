use std::collections::{BTreeMap, BTreeSet};

use log::{debug, trace};

use crate::{
    cfg::{BasicBlock, CFG},
    config::Config,
    insn::Instruction,
    store::InstructionStore,
    Addr,
};

/// the execution count changes across the flow from `insn` to one of its successors.
///
/// this catches boundaries that jump analysis misses,
/// such as the fallthrough out of a loop body into code that runs once.
fn has_frequency_boundary(store: &InstructionStore, insn: &Instruction) -> bool {
    insn.successors
        .iter()
        .filter_map(|&succ| store.get(succ))
        .any(|succ| succ.frequency != insn.frequency)
}

/// find all the basic block end addresses.
///
/// scan through all instructions, looking for:
///  1. instructions that don't fall through (jumps, exit), or
///  2. instructions that flow to the start of a basic block, or
///  3. instructions that flow somewhere with a different execution count.
fn compute_block_ends(store: &InstructionStore, config: &Config) -> BTreeSet<Addr> {
    let mut ends = store.block_ends.clone();

    for insn in store.iter() {
        if insn.successors.iter().any(|succ| store.block_starts.contains(succ)) {
            ends.insert(insn.addr);
            continue;
        }

        if config.split_at_frequency_boundary && has_frequency_boundary(store, insn) {
            trace!("cfg: {}: frequency boundary", insn.addr);
            ends.insert(insn.addr);
        }
    }

    ends
}

/// partition the instructions into basic blocks, in a single pass by address.
///
/// a block left open when the log runs out (or when a new block starts
/// without the prior one ending) has no successors.
pub fn build_cfg(store: &InstructionStore, config: &Config) -> CFG {
    let ends = compute_block_ends(store, config);

    let mut basic_blocks: BTreeMap<Addr, BasicBlock> = Default::default();
    let mut current: Option<BasicBlock> = None;

    for insn in store.iter() {
        if store.block_starts.contains(&insn.addr) {
            if let Some(bb) = current.take() {
                trace!("cfg: {}: unterminated basic block", bb.address);
                basic_blocks.insert(bb.address, bb);
            }
        }

        let bb = current.get_or_insert_with(|| BasicBlock {
            index:         basic_blocks.len(),
            address:       insn.addr,
            insns:         Default::default(),
            max_frequency: 0,
            successors:    Default::default(),
        });

        bb.insns.push(insn.addr);
        bb.max_frequency = bb.max_frequency.max(insn.frequency);

        if ends.contains(&insn.addr) {
            bb.successors = insn.successors.clone();
            if let Some(bb) = current.take() {
                basic_blocks.insert(bb.address, bb);
            }
        }
    }

    if let Some(bb) = current.take() {
        trace!("cfg: {}: unterminated basic block", bb.address);
        basic_blocks.insert(bb.address, bb);
    }

    debug!("cfg: {} basic blocks", basic_blocks.len());

    CFG { basic_blocks }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use crate::{cfg::*, config::Config, test::*};
    use anyhow::Result;

    fn layout(cfg: &CFG) -> Vec<(Addr, Vec<Addr>, Vec<Addr>)> {
        cfg.basic_blocks
            .values()
            .map(|bb| (bb.address, bb.insns.clone(), bb.successors.to_vec()))
            .collect()
    }

    #[test]
    fn test_loop() -> Result<()> {
        init_logging();
        let (_, cfg) = build(LOOP_LOG)?;

        assert_eq!(
            layout(&cfg),
            vec![
                (0, vec![0, 1], vec![2]),
                (2, vec![2, 3, 4], vec![5, 2]),
                (5, vec![5], vec![]),
            ]
        );

        let bb = &cfg.basic_blocks[&2];
        assert_eq!(bb.index, 1);
        assert_eq!(bb.max_frequency, 3);
        Ok(())
    }

    #[test]
    fn test_partition_is_disjoint_cover() -> Result<()> {
        for log in [LOOP_LOG, CYCLE_LOG, DEAD_CODE_LOG] {
            let (store, cfg) = build(log)?;

            let mut seen: BTreeSet<Addr> = Default::default();
            for bb in cfg.basic_blocks.values() {
                assert_eq!(bb.insns.first(), Some(&bb.address));
                for &addr in bb.insns.iter() {
                    assert!(seen.insert(addr), "{} is in two blocks", addr);
                }
            }

            let all: BTreeSet<Addr> = store.iter().map(|insn| insn.addr).collect();
            assert_eq!(seen, all);

            // address 0 always starts a block.
            assert!(cfg.basic_blocks.contains_key(&0));
        }
        Ok(())
    }

    #[test]
    fn test_index_is_discovery_order() -> Result<()> {
        let (_, cfg) = build(CYCLE_LOG)?;
        let indexes: Vec<usize> = cfg.basic_blocks.values().map(|bb| bb.index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        Ok(())
    }

    #[test]
    fn test_dead_code() -> Result<()> {
        let (_, cfg) = build(DEAD_CODE_LOG)?;

        // the fallthrough at 2 was never executed, so it has no block.
        assert_eq!(layout(&cfg), vec![(0, vec![0, 1], vec![2, 4]), (4, vec![4], vec![])]);
        assert!(!cfg.basic_blocks.contains_key(&2));
        Ok(())
    }

    #[test]
    fn test_frequency_boundary() -> Result<()> {
        // nothing jumps to 3, but it runs once while 1-2 run twice.
        let log = "\
0: (b7) r0 = 0
1: (07) r0 += 1
2: (07) r0 += 1
1: (07) r0 += 1
2: (07) r0 += 1
3: (95) exit
";
        let store = load_log(log)?;

        let cfg = build_cfg(&store, &Config::default());
        assert_eq!(
            layout(&cfg),
            vec![
                (0, vec![0], vec![1]),
                (1, vec![1, 2], vec![3]),
                (3, vec![3], vec![]),
            ]
        );

        let cfg = build_cfg(&store, &Config::default().with_split_at_frequency_boundary(false));
        assert_eq!(layout(&cfg), vec![(0, vec![0, 1, 2, 3], vec![])]);
        Ok(())
    }

    #[test]
    fn test_wide_immediate() -> Result<()> {
        let (store, cfg) = build("0: (18) r1 = 0x5\n2: (95) exit\n")?;
        assert_eq!(store.get(0).unwrap().successors.as_slice(), &[2]);
        assert_eq!(layout(&cfg), vec![(0, vec![0, 2], vec![])]);
        Ok(())
    }

    #[test]
    fn test_unterminated() -> Result<()> {
        // the log ends inside a block, so it never records successors.
        let (_, cfg) = build("0: (b7) r0 = 0\n1: (07) r0 += 1\n")?;
        assert_eq!(layout(&cfg), vec![(0, vec![0, 1], vec![])]);
        Ok(())
    }
}
