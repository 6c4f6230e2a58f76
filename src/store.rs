use std::{
    collections::{BTreeMap, BTreeSet},
    io::BufRead,
};

use anyhow::Result;
use log::{debug, trace};

use crate::{
    insn::{self, Instruction},
    line::{self, Line},
    Addr,
};

/// A source annotation waiting for the instruction on the next log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSource {
    /// zero-based log line that the annotation applies to.
    pub line: usize,
    pub text: String,
}

/// Instructions seen in a log, merged by address.
pub struct InstructionStore {
    // we use a btree so that we can conveniently iterate in address order.
    insns: BTreeMap<Addr, Instruction>,

    /// addresses known to begin a basic block (always includes 0).
    pub block_starts: BTreeSet<Addr>,

    /// addresses known to end a basic block.
    pub block_ends: BTreeSet<Addr>,
}

impl Default for InstructionStore {
    fn default() -> Self {
        InstructionStore {
            insns:        Default::default(),
            block_starts: [0].into_iter().collect(),
            block_ends:   Default::default(),
        }
    }
}

impl InstructionStore {
    pub fn new() -> InstructionStore {
        Default::default()
    }

    /// account for one log line that references `addr`.
    ///
    /// the instruction is decoded on its first sighting only;
    /// later lines just bump the frequency.
    /// `source` is attached when it targets `line_num` and nothing was attached before.
    pub fn record(
        &mut self,
        addr: Addr,
        liveregs: Option<&str>,
        text: &str,
        line_num: usize,
        source: Option<&PendingSource>,
    ) -> &Instruction {
        let block_starts = &mut self.block_starts;
        let block_ends = &mut self.block_ends;

        let insn = self.insns.entry(addr).or_insert_with(|| {
            let (insn, hints) = insn::decode(addr, liveregs, text);
            trace!("store: {}: new {:?} -> {:?}", addr, insn.kind, insn.successors);
            block_starts.extend(hints.starts);
            block_ends.extend(hints.end);
            insn
        });

        insn.frequency += 1;

        if let Some(source) = source {
            if source.line == line_num && insn.source.is_none() {
                insn.source = Some(source.text.clone());
            }
        }

        insn
    }

    pub fn get(&self, addr: Addr) -> Option<&Instruction> {
        self.insns.get(&addr)
    }

    /// instructions in increasing address order.
    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.insns.values()
    }

    pub fn len(&self) -> usize {
        self.insns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }
}

/// consume an entire verifier log.
///
/// lines that are neither instructions nor source annotations are skipped,
/// including lines that aren't valid UTF-8.
/// the final line is read even when it has no trailing newline.
pub fn read_log<R: BufRead>(mut reader: R) -> Result<InstructionStore> {
    let mut store = InstructionStore::new();
    let mut pending: Option<PendingSource> = None;
    let mut skipped = 0usize;

    let mut buf: Vec<u8> = Vec::new();
    let mut line_num = 0usize;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }

        let raw = match std::str::from_utf8(&buf) {
            Ok(raw) => raw,
            Err(e) => {
                trace!("log: line {}: skipped: {}", line_num + 1, e);
                skipped += 1;
                line_num += 1;
                continue;
            }
        };

        match line::parse_line(raw) {
            Ok(Line::Source(text)) => {
                pending = Some(PendingSource {
                    line: line_num + 1,
                    text: text.to_string(),
                });
            }
            Ok(Line::Insn(i)) => {
                store.record(i.addr, i.liveregs, i.text, line_num, pending.as_ref());
            }
            Err(e) => {
                trace!("log: line {}: skipped: {}", line_num + 1, e);
                skipped += 1;
            }
        }

        line_num += 1;
    }

    debug!("log: {} instructions, {} lines skipped", store.len(), skipped);

    Ok(store)
}

#[cfg(test)]
mod tests {
    use crate::{store::*, test::*};
    use anyhow::Result;

    #[test]
    fn test_frequency() -> Result<()> {
        let store = read_log(
            "\
0: (b7) r1 = 0x5
2: (bf) r2 = r1
processed 2 insns
5: (95) exit
2: (bf) r2 = r1
5: (95) exit
2: (bf) r2 = r1
"
            .as_bytes(),
        )?;

        assert_eq!(store.len(), 3);
        assert_eq!(store.get(0).unwrap().frequency, 1);
        assert_eq!(store.get(2).unwrap().frequency, 3);
        assert_eq!(store.get(5).unwrap().frequency, 2);
        Ok(())
    }

    #[test]
    fn test_frequency_matches_line_count() -> Result<()> {
        let store = read_log(LOOP_LOG.as_bytes())?;
        for insn in store.iter() {
            let count = LOOP_LOG
                .lines()
                .filter_map(|line| match crate::line::parse_line(line) {
                    Ok(Line::Insn(i)) => Some(i.addr),
                    _ => None,
                })
                .filter(|&addr| addr == insn.addr)
                .count();
            assert_eq!(insn.frequency, count as u64);
        }
        Ok(())
    }

    #[test]
    fn test_first_decode_wins() -> Result<()> {
        let store = read_log("3: (05) goto pc-2\n3: (bf) r2 = r1\n".as_bytes())?;
        let insn = store.get(3).unwrap();
        assert_eq!(insn.text, "goto pc-2");
        assert_eq!(insn.frequency, 2);
        assert_eq!(insn.successors.as_slice(), &[2]);
        Ok(())
    }

    #[test]
    fn test_block_hints() -> Result<()> {
        let store = read_log("3: (05) goto pc-2\n".as_bytes())?;
        assert_eq!(store.block_starts.iter().copied().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(store.block_ends.iter().copied().collect::<Vec<_>>(), vec![3]);
        Ok(())
    }

    #[test]
    fn test_source_applies_to_next_line_only() -> Result<()> {
        let store = read_log(
            "\
; int a = 1; @ prog.c:3
0: (b7) r1 = 0x1
; int b = 2; @ prog.c:4
unrelated noise
2: (b7) r2 = 0x2
; int c = 3; @ prog.c:5
4: (95) exit
"
            .as_bytes(),
        )?;

        assert_eq!(store.get(0).unwrap().source.as_deref(), Some("; int a = 1; @ prog.c:3"));
        assert_eq!(store.get(2).unwrap().source, None);
        assert_eq!(store.get(4).unwrap().source.as_deref(), Some("; int c = 3; @ prog.c:5"));
        Ok(())
    }

    #[test]
    fn test_source_attached_on_later_sighting() -> Result<()> {
        let store = read_log(
            "\
0: (b7) r1 = 0x1
; first @ prog.c:1
0: (b7) r1 = 0x1
; second @ prog.c:2
0: (b7) r1 = 0x1
"
            .as_bytes(),
        )?;

        let insn = store.get(0).unwrap();
        assert_eq!(insn.frequency, 3);
        assert_eq!(insn.source.as_deref(), Some("; first @ prog.c:1"));
        Ok(())
    }

    #[test]
    fn test_final_line_without_newline() -> Result<()> {
        let store = read_log("0: (b7) r1 = 0x1\n2: (95) exit".as_bytes())?;
        assert!(store.get(2).is_some());
        Ok(())
    }

    #[test]
    fn test_invalid_utf8_is_noise() -> Result<()> {
        let store = read_log(&b"0: (b7) r0 = 0\nnoise \xff\xfe ...\n1: (95) exit\n"[..])?;
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(0).unwrap().frequency, 1);
        assert_eq!(store.get(1).unwrap().frequency, 1);
        Ok(())
    }

    #[test]
    fn test_invalid_utf8_counts_as_a_line() -> Result<()> {
        // the annotation is followed by a broken line, so it doesn't reach the instruction.
        let store = read_log(&b"; x = 1; @ prog.c:1\n\xff\n0: (95) exit\n"[..])?;
        assert_eq!(store.get(0).unwrap().source, None);
        Ok(())
    }
}
