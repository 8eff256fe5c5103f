//! This module provides the parser for program text, utilizing the `pest` crate.
//! The grammar lives in `grammar.pest`; this module walks the parse tree and builds
//! the instruction table, initial tape, head position and assembly listing.

use crate::{
    assembly::AssemblySourceLine,
    types::{
        AsmStatus, Direction, EngineError, Instruction, InstructionTable, Symbol,
        MAX_PROGRAM_SIZE,
    },
};
use pest::{
    error::{Error, ErrorVariant},
    iterators::{Pair, Pairs},
    Parser as PestParser, Span,
};
use pest_derive::Parser as PestParser;

/// Derives a `PestParser` for the program grammar defined in `grammar.pest`.
#[derive(PestParser)]
#[grammar = "grammar.pest"]
pub struct ProgramParser;

/// A fully parsed program, ready to be installed into a machine.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    /// Initial tape contents.
    pub tape: Vec<Symbol>,
    /// Initial head position (the `!`-prefixed token, or 0).
    pub head: usize,
    /// Transition table keyed by `(state, read)`.
    pub instructions: InstructionTable,
    /// One entry per `#asm` directive, in file order.
    pub assembly: Vec<AssemblySourceLine>,
    /// Concatenation of every `#program` fragment, newline-terminated.
    pub source: String,
}

/// Parses the given input string into a `Program`.
///
/// The first line is always the tape. Every other line is blank, an `#asm` or
/// `#program` directive, a comment, or a five-field instruction. Malformed
/// instructions are rejected here rather than surfacing later as missing transitions.
///
/// # Arguments
///
/// * `input` - A string slice containing the program text.
///
/// # Returns
///
/// * `Ok(Program)` if the input is successfully parsed.
/// * `Err(EngineError::ParseError)` if there are any syntax errors.
/// * `Err(EngineError::MalformedProgramLine)` if a line parses but cannot be loaded.
pub fn parse(input: &str) -> Result<Program, EngineError> {
    if input.len() > MAX_PROGRAM_SIZE {
        return Err(EngineError::MalformedProgramLine {
            line: 0,
            message: format!(
                "program is {} bytes, the limit is {} bytes",
                input.len(),
                MAX_PROGRAM_SIZE
            ),
        });
    }

    let root = ProgramParser::parse(Rule::program, input)
        .map_err(|e| EngineError::ParseError(e.into()))?
        .next()
        .ok_or_else(|| EngineError::MalformedProgramLine {
            line: 0,
            message: "empty parse tree".to_string(),
        })?;

    parse_program(root)
}

/// Walks the top-level `program` pair in file order.
///
/// The `#asm` counter is threaded through so every instruction is tagged with the
/// ordinal of the directive that precedes it.
fn parse_program(pair: Pair<Rule>) -> Result<Program, EngineError> {
    let mut tape = Vec::new();
    let mut head = 0;
    let mut instructions = InstructionTable::new();
    let mut assembly = Vec::new();
    let mut source = String::new();
    let mut asm_count = 0;

    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::tape => (tape, head) = parse_tape(p)?,
            Rule::asm => {
                let status = if asm_count == 0 {
                    AsmStatus::Current
                } else {
                    AsmStatus::Pending
                };
                assembly.push(AssemblySourceLine::new(
                    parse_text(p).trim().to_string(),
                    status,
                ));
                asm_count += 1;
            }
            Rule::source => {
                source.push_str(strip_delimiter(&parse_text(p)).trim_end());
                source.push('\n');
            }
            Rule::instruction => {
                let line = line_of(&p.as_span());
                let (key, instruction) = parse_instruction(p, asm_count)?;
                if instructions.insert(key.clone(), instruction).is_some() {
                    log::warn!("line {}: redefinition of state {} read {}", line, key.0, key.1);
                }
            }
            _ => {} // Skip EOI
        }
    }

    Ok(Program {
        tape,
        head,
        instructions,
        assembly,
        source,
    })
}

/// Parses the tape line, returning the symbols and the head position.
///
/// At most one cell may carry the `!` head marker.
fn parse_tape(pair: Pair<Rule>) -> Result<(Vec<Symbol>, usize), EngineError> {
    let mut tape = Vec::new();
    let mut head: Option<usize> = None;

    // Rule: tape > [cell > head? symbol]
    for cell in pair.into_inner() {
        let span = cell.as_span();
        for item in cell.into_inner() {
            match item.as_rule() {
                Rule::head => {
                    if head.is_some() {
                        return Err(malformed(&span, "more than one head marker on the tape"));
                    }
                    head = Some(tape.len());
                }
                Rule::symbol => tape.push(parse_symbol(item)?),
                _ => {}
            }
        }
    }

    Ok((tape, head.unwrap_or(0)))
}

/// Parses a five-field instruction into its table key and value.
fn parse_instruction(
    pair: Pair<Rule>,
    source_index: usize,
) -> Result<((String, Symbol), Instruction), EngineError> {
    let mut pairs = pair.into_inner();

    let state = parse_string(&mut pairs)?;
    let read = parse_symbol_from_pairs(&mut pairs)?;
    let write = parse_symbol_from_pairs(&mut pairs)?;
    let direction = parse_direction(next_pair(&mut pairs)?)?;
    let next_state = parse_string(&mut pairs)?;

    Ok((
        (state, read),
        Instruction {
            write,
            direction,
            next_state,
            source_index,
        },
    ))
}

/// Parses a single direction from a `Pair<Rule::direction>`.
fn parse_direction(pair: Pair<Rule>) -> Result<Direction, EngineError> {
    match pair.as_str() {
        "L" => Ok(Direction::Left),
        "R" => Ok(Direction::Right),
        "S" => Ok(Direction::Stay),
        other => Err(parse_error(
            &format!("Unsupported direction: {other}"),
            pair.as_span(),
        )),
    }
}

/// Parses a symbol, rejecting values that do not fit a `Symbol`.
fn parse_symbol(pair: Pair<Rule>) -> Result<Symbol, EngineError> {
    let text = pair.as_str();
    text.parse::<Symbol>()
        .map_err(|e| malformed(&pair.as_span(), &format!("invalid symbol '{text}': {e}")))
}

fn parse_symbol_from_pairs(pairs: &mut Pairs<Rule>) -> Result<Symbol, EngineError> {
    parse_symbol(next_pair(pairs)?)
}

/// Extracts the directive remainder from an `asm` or `source` pair.
fn parse_text(pair: Pair<Rule>) -> String {
    pair.into_inner()
        .next()
        .map(|text| text.as_str().to_string())
        .unwrap_or_default()
}

fn parse_string(pairs: &mut Pairs<Rule>) -> Result<String, EngineError> {
    Ok(next_pair(pairs)?.as_str().into())
}

fn next_pair<'i>(pairs: &mut Pairs<'i, Rule>) -> Result<Pair<'i, Rule>, EngineError> {
    pairs.next().ok_or_else(|| EngineError::MalformedProgramLine {
        line: 0,
        message: "unexpected end of instruction".to_string(),
    })
}

/// Drops the single whitespace character separating a directive from its text,
/// keeping any further indentation.
fn strip_delimiter(text: &str) -> &str {
    text.strip_prefix([' ', '\t']).unwrap_or(text)
}

/// Creates an `EngineError::ParseError` from a message and a `Span`.
fn parse_error(msg: &str, span: Span) -> EngineError {
    EngineError::ParseError(Box::new(Error::new_from_span(
        ErrorVariant::CustomError {
            message: msg.to_string(),
        },
        span,
    )))
}

fn malformed(span: &Span, message: &str) -> EngineError {
    EngineError::MalformedProgramLine {
        line: line_of(span),
        message: message.to_string(),
    }
}

fn line_of(span: &Span) -> usize {
    span.start_pos().line_col().0
}
