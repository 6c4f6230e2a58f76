use log::warn;
use regex::Regex;
use smallvec::{smallvec, SmallVec};

use crate::{util::addr_add_signed, Addr};

/// most instructions have 1-2 successors, so attempt to store them inline.
/// when there are two, the fallthrough comes first and the branch target second.
pub type Successors = SmallVec<[Addr; 2]>;

/// The control flow shape of an instruction, as recognized from its text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsnKind {
    // goto pc-2
    UnconditionalJump { delta: i64 },

    // if r1 > 0x4 goto pc+3
    ConditionalJump { delta: i64 },

    // exit
    Exit,

    // r1 = 0x1234 ll
    // occupies two instruction slots.
    WideImmediate,

    // anything else is assumed to fall through to the next slot.
    Generic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub addr:       Addr,
    pub kind:       InsnKind,
    pub successors: Successors,
    /// instruction text, prefixed with the live registers, if any.
    pub text:       String,
    /// number of log lines that reference this address.
    pub frequency:  u64,
    /// source line that immediately preceded the first annotated occurrence.
    pub source:     Option<String>,
}

/// Block boundaries implied by a single instruction.
/// the caller merges these into the sets used for partitioning.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BlockHints {
    pub starts: SmallVec<[Addr; 2]>,
    pub end:    Option<Addr>,
}

lazy_static! {
    static ref UNCONDITIONAL_JUMP_RE: Regex = Regex::new(r"^goto pc([+-][0-9]+)").unwrap();
    // greedy, so this finds the final `goto` on the line.
    static ref CONDITIONAL_JUMP_RE: Regex = Regex::new(r"^.*goto pc([+-][0-9]+)").unwrap();
    static ref WIDE_IMMEDIATE_RE: Regex = Regex::new(r"^r[0-9] = 0x[0-9a-f]+").unwrap();
}

fn jump_delta(re: &Regex, text: &str) -> Option<i64> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<i64>().ok())
}

fn match_unconditional_jump(text: &str) -> Option<InsnKind> {
    jump_delta(&UNCONDITIONAL_JUMP_RE, text).map(|delta| InsnKind::UnconditionalJump { delta })
}

fn match_conditional_jump(text: &str) -> Option<InsnKind> {
    jump_delta(&CONDITIONAL_JUMP_RE, text).map(|delta| InsnKind::ConditionalJump { delta })
}

fn match_exit(text: &str) -> Option<InsnKind> {
    if text.trim_end() == "exit" {
        Some(InsnKind::Exit)
    } else {
        None
    }
}

fn match_wide_immediate(text: &str) -> Option<InsnKind> {
    if WIDE_IMMEDIATE_RE.is_match(text) {
        Some(InsnKind::WideImmediate)
    } else {
        None
    }
}

type Matcher = fn(&str) -> Option<InsnKind>;

// order matters: the first match wins.
const MATCHERS: [Matcher; 4] = [
    match_unconditional_jump,
    match_conditional_jump,
    match_exit,
    match_wide_immediate,
];

pub fn classify(text: &str) -> InsnKind {
    MATCHERS
        .iter()
        .find_map(|matcher| matcher(text))
        .unwrap_or(InsnKind::Generic)
}

/// compute `pc + delta + 1`, the landing address of a relative jump.
fn jump_target(addr: Addr, delta: i64) -> Option<Addr> {
    let target = delta.checked_add(1).and_then(|delta| addr_add_signed(addr, delta));
    if target.is_none() {
        warn!("insn: {}: jump target pc{:+} is out of range", addr, delta);
    }
    target
}

/// decode the instruction found at `addr`.
///
/// the returned instruction has not been counted yet (frequency zero).
pub fn decode(addr: Addr, liveregs: Option<&str>, text: &str) -> (Instruction, BlockHints) {
    let kind = classify(text);
    let mut hints: BlockHints = Default::default();

    let successors: Successors = match kind {
        InsnKind::UnconditionalJump { delta } => {
            // only the landing address starts a block; the jump itself ends one.
            hints.end = Some(addr);
            match jump_target(addr, delta) {
                Some(target) => {
                    hints.starts.push(target);
                    smallvec![target]
                }
                None => smallvec![],
            }
        }
        InsnKind::ConditionalJump { delta } => {
            hints.end = Some(addr);
            let mut successors: Successors = smallvec![];
            for succ in [addr.checked_add(1), jump_target(addr, delta)].into_iter().flatten() {
                hints.starts.push(succ);
                successors.push(succ);
            }
            successors
        }
        InsnKind::Exit => {
            hints.end = Some(addr);
            smallvec![]
        }
        InsnKind::WideImmediate => addr.checked_add(2).into_iter().collect(),
        InsnKind::Generic => addr.checked_add(1).into_iter().collect(),
    };

    let text = match liveregs {
        Some(liveregs) => format!(" {} {}", liveregs, text),
        None => text.to_string(),
    };

    (
        Instruction {
            addr,
            kind,
            successors,
            text,
            frequency: 0,
            source: None,
        },
        hints,
    )
}
