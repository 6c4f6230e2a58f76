// the verifier log (LOG_LEVEL2) interleaves source annotations with
// instruction lines, like:
//
//     ; int x = ctx->len; @ prog.bpf.c:12
//     0: (b7) r1 = 0x5
//     1: .1........ (bf) r2 = r1          ; R2_w=5
//     2: (05) goto pc-2
//
// instruction line:
//
//     1: .1........ (bf) r2 = r1          ; R2_w=5
//     ^ address
//        ^^^^^^^^^^ live registers (optional)
//                   ^^^^ opcode
//                        ^^^^^^^ instruction text
//                                         ^^^^^^^^ register state comment (optional)
//
// everything else in the log is noise.

use nom::{
    bytes::complete::{tag, take_while, take_while1},
    character::complete::digit1,
    combinator::opt,
    sequence::{delimited, terminated},
    IResult,
};
use thiserror::Error;

use crate::Addr;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LineError {
    #[error("the line is not an instruction or source annotation")]
    Unrecognized,
    #[error("the instruction address does not fit in 64 bits")]
    AddressOverflow,
}

/// an instruction line, borrowing from the raw log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsnLine<'a> {
    pub addr:     Addr,
    pub liveregs: Option<&'a str>,
    pub text:     &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line<'a> {
    /// source annotation, like `; x = 1; @ prog.c:4`.
    /// applies only to the line that immediately follows.
    Source(&'a str),
    Insn(InsnLine<'a>),
}

fn is_liveregs_char(c: char) -> bool {
    c.is_ascii_digit() || c == '.'
}

fn is_lower_hex_digit(c: char) -> bool {
    c.is_ascii_digit() || ('a'..='f').contains(&c)
}

/// parse the live register field, like `.1..4 `
fn liveregs(input: &str) -> IResult<&str, &str> {
    terminated(take_while1(is_liveregs_char), tag(" "))(input)
}

/// parse the opcode field, like `(b7) `
fn opcode(input: &str) -> IResult<&str, &str> {
    delimited(tag("("), take_while1(is_lower_hex_digit), tag(") "))(input)
}

/// parse everything up to the instruction text:
/// the address and the optional live registers.
fn insn_prefix(input: &str) -> IResult<&str, (&str, Option<&str>)> {
    let (input, _) = take_while(|c| c == ' ')(input)?;
    let (input, addr) = digit1(input)?;
    let (input, _) = tag(": ")(input)?;
    let (input, liveregs) = opt(liveregs)(input)?;
    let (input, _) = opcode(input)?;

    Ok((input, (addr, liveregs)))
}

/// split off a trailing ` ; ...` comment.
///
/// the comment must be separated from the instruction by at least one space,
/// and exactly one separating space is dropped from the text.
/// a `;` glued to the instruction text makes the line unrecognizable.
fn insn_text(input: &str) -> Result<&str, LineError> {
    match input.find(';') {
        None => Ok(input),
        Some(pos) => match input[..pos].strip_suffix(' ') {
            Some(text) => Ok(text),
            None => Err(LineError::Unrecognized),
        },
    }
}

fn parse_insn(line: &str) -> Result<InsnLine, LineError> {
    let (rest, (addr, liveregs)) = insn_prefix(line).map_err(|_| LineError::Unrecognized)?;
    let addr = addr.parse::<Addr>().map_err(|_| LineError::AddressOverflow)?;
    let text = insn_text(rest)?;

    Ok(InsnLine { addr, liveregs, text })
}

/// classify a single raw log line.
///
/// the line may still carry its line terminator.
pub fn parse_line(line: &str) -> Result<Line, LineError> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let line = line.strip_suffix('\r').unwrap_or(line);

    if let Some(rest) = line.strip_prefix("; ") {
        if rest.contains(" @ ") {
            return Ok(Line::Source(line));
        }
    }

    parse_insn(line).map(Line::Insn)
}
