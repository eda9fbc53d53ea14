//! Parser for the Syno notation
//!
//! Strips `#` comments per line, splits the rest into whitespace-delimited
//! tokens, and parses each token independently with a small recursive
//! descent over its characters. Token order is declaration order: it
//! governs implicit buffer numbering and display order, never audible
//! ordering.
//!
//! Grammar per token:
//! - `master v<number>` (whole line) sets the master bus volume.
//! - `[start]{bN}?<tag><freq?>v<ramp>?p<ramp>?h<n>?r<n>?f<ramp>?\<ramp>?e<dddd>?`
//!   where `<tag>` is one of `s q a t n b` and `<ramp>` is
//!   `start(>mid)?(>end)?('dur)?`.
//! - `bN=<token>` defines buffer slot N from a nested generator token.
//! - `bN\start>end'dur` replays a captured slot with a rate ramp.
//!
//! A token matching neither shape is a per-token failure: logged, dropped,
//! parsing continues.

use tracing::{debug, warn};

use crate::ast::{AstNode, GeneratorKind, MasterNode, Param, SynthNode, Transition};
use crate::defaults::REGISTRY;
use crate::error::SynoError;

/// Result of one `parse()` call: the ordered AST plus every per-token
/// failure encountered along the way.
#[derive(Debug, Default)]
pub struct ParseReport {
    pub nodes: Vec<AstNode>,
    pub errors: Vec<SynoError>,
}

#[derive(Debug, Default)]
pub struct Parser;

impl Parser {
    pub fn new() -> Self {
        Self
    }

    /// Parse raw text into an ordered AST. Stateless: every call rebuilds
    /// from scratch.
    pub fn parse(&self, input: &str) -> ParseReport {
        let mut report = ParseReport::default();

        for raw_line in input.lines() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let mut tokens = line;
            if line.starts_with("master") {
                match parse_master(line) {
                    Ok((node, rest)) => {
                        report.nodes.push(AstNode::Master(node));
                        tokens = rest;
                    }
                    Err(e) => {
                        warn!(token = line, "dropped: {e}");
                        report.errors.push(e);
                        continue;
                    }
                }
            }
            for token in tokens.split_whitespace() {
                match parse_token(token) {
                    Ok(node) => {
                        debug!(token, ?node, "parsed");
                        report.nodes.push(AstNode::Synth(node));
                    }
                    Err(e) => {
                        warn!(token, "dropped: {e}");
                        report.errors.push(e);
                    }
                }
            }
        }

        tag_implicit_buffer(&mut report.nodes);
        report
    }
}

/// The first generator in a parse() call that is neither a buffer
/// reference nor a buffer definition is implicitly tagged to populate slot
/// b0, so later `{b0}` references work without an explicit `b0=`.
fn tag_implicit_buffer(nodes: &mut [AstNode]) {
    for node in nodes.iter_mut() {
        if let AstNode::Synth(s) = node {
            if s.kind == GeneratorKind::BufferRef || s.capture_only {
                continue;
            }
            if s.buffer.is_none() {
                s.buffer = Some(0);
            }
            return;
        }
    }
}

/// Parse the `master v<number>` prefix of a line, handing the untouched
/// remainder back so ordinary tokens can share the line.
fn parse_master(line: &str) -> Result<(MasterNode, &str), SynoError> {
    let rest = line["master".len()..].trim_start();
    let mut cur = Cursor::new(rest);
    if !cur.eat('v') {
        return Err(SynoError::Grammar(line.to_string()));
    }
    let volume = cur
        .try_number(false)
        .ok_or_else(|| SynoError::Grammar(line.to_string()))?;
    match cur.peek() {
        Some(c) if !c.is_ascii_whitespace() => Err(SynoError::Grammar(line.to_string())),
        _ => Ok((MasterNode { volume }, cur.remainder())),
    }
}

fn parse_token(token: &str) -> Result<SynthNode, SynoError> {
    // Buffer definition: bN=<nested token>.
    if let Some((slot, nested)) = split_buffer_definition(token) {
        let mut node = parse_token(nested)?;
        node.buffer = Some(slot);
        node.capture_only = true;
        return Ok(node);
    }

    let mut cur = Cursor::new(token);

    // Optional leading start time.
    let start_time = cur.try_number(false).unwrap_or(0.0);

    // Optional {bN} modulator-buffer prefix.
    let mut modulator_slot = None;
    if cur.eat('{') {
        if !cur.eat('b') {
            return Err(SynoError::Grammar(token.to_string()));
        }
        let slot = require_slot(&mut cur, token)?;
        if !cur.eat('}') {
            return Err(SynoError::Grammar(token.to_string()));
        }
        modulator_slot = Some(slot);
    }

    let tag = cur.bump().ok_or_else(|| SynoError::Grammar(token.to_string()))?;
    let kind = match GeneratorKind::from_tag(tag) {
        Some(kind) => kind,
        None if tag.is_ascii_alphabetic() => return Err(SynoError::UnknownGenerator(tag)),
        None => return Err(SynoError::Grammar(token.to_string())),
    };

    let defaults = REGISTRY.generator(kind);
    let mut node = SynthNode {
        kind,
        start_time,
        freq: Param::Fixed(defaults.freq),
        volume: Param::Fixed(defaults.volume),
        pan: Param::Fixed(defaults.pan),
        filter: None,
        chop: None,
        reverb: None,
        envelope: defaults.envelope.to_string(),
        glissando: None,
        recursion: Vec::new(),
        buffer: None,
        capture_only: false,
    };

    // The number directly after the tag: a buffer slot for `b`, the
    // frequency (or noise variant) for everything else.
    if kind == GeneratorKind::BufferRef {
        node.buffer = Some(require_slot(&mut cur, token)?);
    } else if let Some(param) = try_ramp(&mut cur, token, false)? {
        node.freq = param;
    }

    while let Some(c) = cur.peek() {
        match c {
            'v' => {
                cur.bump();
                node.volume = require_ramp(&mut cur, token, false)?;
            }
            'p' => {
                cur.bump();
                node.pan = require_ramp(&mut cur, token, true)?;
            }
            'h' => {
                cur.bump();
                node.chop = Some(require_number(&mut cur, token, false)?);
            }
            'r' => {
                cur.bump();
                node.reverb = Some(require_number(&mut cur, token, false)?);
            }
            'f' => {
                cur.bump();
                node.filter = Some(require_ramp(&mut cur, token, false)?);
            }
            '\\' => {
                if kind != GeneratorKind::BufferRef {
                    // Glissando rides the playback rate; oscillators have none.
                    return Err(SynoError::Grammar(token.to_string()));
                }
                cur.bump();
                node.glissando = Some(match require_ramp(&mut cur, token, false)? {
                    Param::Ramp(t) => t,
                    Param::Fixed(v) => Transition {
                        start: v,
                        middle: None,
                        end: v,
                        duration: REGISTRY.transitions.duration,
                    },
                });
            }
            'e' => {
                cur.bump();
                let mut code = String::with_capacity(4);
                for _ in 0..4 {
                    match cur.peek() {
                        Some(d) if d.is_ascii_digit() => {
                            code.push(d);
                            cur.bump();
                        }
                        _ => return Err(SynoError::Grammar(token.to_string())),
                    }
                }
                node.envelope = code;
            }
            _ => return Err(SynoError::Grammar(token.to_string())),
        }
    }

    if let Some(slot) = modulator_slot {
        let d = REGISTRY.generator(GeneratorKind::BufferRef);
        node.recursion.push(SynthNode {
            kind: GeneratorKind::BufferRef,
            start_time: 0.0,
            freq: Param::Fixed(d.freq),
            volume: Param::Fixed(d.volume),
            pan: Param::Fixed(d.pan),
            filter: None,
            chop: None,
            reverb: None,
            envelope: d.envelope.to_string(),
            glissando: None,
            recursion: Vec::new(),
            buffer: Some(slot),
            capture_only: false,
        });
    }

    Ok(node)
}

/// Match `bN=` at the start of a token, returning the slot and the nested
/// token text.
fn split_buffer_definition(token: &str) -> Option<(u8, &str)> {
    let rest = token.strip_prefix('b')?;
    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let after = &rest[digits..];
    let nested = after.strip_prefix('=')?;
    let slot: u8 = rest[..digits].parse().ok()?;
    Some((slot, nested))
}

/// Slot numbers are byte-sized; anything wider is a grammar error, never
/// a truncation onto some other slot.
fn require_slot(cur: &mut Cursor, token: &str) -> Result<u8, SynoError> {
    cur.try_integer()
        .and_then(|slot| u8::try_from(slot).ok())
        .ok_or_else(|| SynoError::Grammar(token.to_string()))
}

fn require_number(cur: &mut Cursor, token: &str, negative: bool) -> Result<f64, SynoError> {
    cur.try_number(negative)
        .ok_or_else(|| SynoError::Grammar(token.to_string()))
}

fn require_ramp(cur: &mut Cursor, token: &str, negative: bool) -> Result<Param, SynoError> {
    try_ramp(cur, token, negative)?.ok_or_else(|| SynoError::Grammar(token.to_string()))
}

/// Parse `start(>mid)?(>end)?('dur)?` into a fixed value or a transition.
fn try_ramp(cur: &mut Cursor, token: &str, negative: bool) -> Result<Option<Param>, SynoError> {
    let Some(start) = cur.try_number(negative) else {
        return Ok(None);
    };
    if !cur.eat('>') {
        return Ok(Some(Param::Fixed(start)));
    }
    let second = require_number(cur, token, negative)?;
    let third = if cur.eat('>') {
        Some(require_number(cur, token, negative)?)
    } else {
        None
    };
    let duration = if cur.eat('\'') {
        require_number(cur, token, false)?
    } else {
        REGISTRY.transitions.duration
    };
    let transition = match third {
        Some(end) => Transition {
            start,
            middle: Some(second),
            end,
            duration,
        },
        None => Transition {
            start,
            middle: None,
            end: second,
            duration,
        },
    };
    Ok(Some(Param::Ramp(transition)))
}

/// Character cursor over one token. The grammar is pure ASCII.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.bytes.get(self.pos).map(|b| *b as char)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn remainder(&self) -> &'a str {
        std::str::from_utf8(&self.bytes[self.pos..]).unwrap_or("")
    }

    /// Parse `-?\d*\.?\d+` without consuming anything on failure. A
    /// trailing dot with no fraction digits is left unconsumed.
    fn try_number(&mut self, negative: bool) -> Option<f64> {
        let start = self.pos;
        let mut p = self.pos;
        if negative && self.bytes.get(p) == Some(&b'-') {
            p += 1;
        }
        let int_start = p;
        while self.bytes.get(p).is_some_and(|b| b.is_ascii_digit()) {
            p += 1;
        }
        let int_digits = p - int_start;
        let mut end = p;
        if self.bytes.get(p) == Some(&b'.') {
            let mut q = p + 1;
            while self.bytes.get(q).is_some_and(|b| b.is_ascii_digit()) {
                q += 1;
            }
            if q > p + 1 {
                end = q;
            }
        }
        if int_digits == 0 && end == p {
            return None;
        }
        let text = std::str::from_utf8(&self.bytes[start..end]).ok()?;
        let value = text.parse::<f64>().ok()?;
        self.pos = end;
        Some(value)
    }

    /// Parse a plain unsigned integer.
    fn try_integer(&mut self) -> Option<u32> {
        let start = self.pos;
        let mut p = self.pos;
        while self.bytes.get(p).is_some_and(|b| b.is_ascii_digit()) {
            p += 1;
        }
        if p == start {
            return None;
        }
        let text = std::str::from_utf8(&self.bytes[start..p]).ok()?;
        let value = text.parse::<u32>().ok()?;
        self.pos = p;
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> ParseReport {
        Parser::new().parse(input)
    }

    fn only_synth(report: &ParseReport) -> &SynthNode {
        assert_eq!(report.nodes.len(), 1, "expected exactly one node");
        report.nodes[0].as_synth().expect("expected a synth node")
    }

    #[test]
    fn bare_tag_gets_registry_defaults() {
        let report = parse("s");
        assert!(report.errors.is_empty());
        let node = only_synth(&report);
        let d = REGISTRY.generator(GeneratorKind::Sine);
        assert_eq!(node.kind, GeneratorKind::Sine);
        assert_eq!(node.freq, Param::Fixed(d.freq));
        assert_eq!(node.volume, Param::Fixed(d.volume));
        assert_eq!(node.pan, Param::Fixed(d.pan));
        assert_eq!(node.envelope, d.envelope);
        assert_eq!(node.start_time, 0.0);
    }

    #[test]
    fn volume_ramp_with_duration() {
        let report = parse("sv2>8'3");
        let node = only_synth(&report);
        assert_eq!(
            node.volume,
            Param::Ramp(Transition {
                start: 2.0,
                middle: None,
                end: 8.0,
                duration: 3.0,
            })
        );
    }

    #[test]
    fn three_point_volume_ramp() {
        let report = parse("sv0>5>0'2");
        let node = only_synth(&report);
        assert_eq!(
            node.volume,
            Param::Ramp(Transition {
                start: 0.0,
                middle: Some(5.0),
                end: 0.0,
                duration: 2.0,
            })
        );
    }

    #[test]
    fn ramp_without_duration_uses_registry_default() {
        let report = parse("s100>300");
        let node = only_synth(&report);
        assert_eq!(
            node.freq,
            Param::Ramp(Transition {
                start: 100.0,
                middle: None,
                end: 300.0,
                duration: REGISTRY.transitions.duration,
            })
        );
    }

    #[test]
    fn full_field_chain() {
        let report = parse("0.5q220v7p-0.5h3r2f5e1234");
        let node = only_synth(&report);
        assert_eq!(node.kind, GeneratorKind::Square);
        assert_eq!(node.start_time, 0.5);
        assert_eq!(node.freq, Param::Fixed(220.0));
        assert_eq!(node.volume, Param::Fixed(7.0));
        assert_eq!(node.pan, Param::Fixed(-0.5));
        assert_eq!(node.chop, Some(3.0));
        assert_eq!(node.reverb, Some(2.0));
        assert_eq!(node.filter, Some(Param::Fixed(5.0)));
        assert_eq!(node.envelope, "1234");
    }

    #[test]
    fn bad_tokens_are_dropped_not_fatal() {
        let report = parse("s q5v9 !!!bad!!! a2");
        assert_eq!(report.nodes.len(), 3);
        assert_eq!(report.errors.len(), 1);
        assert!(matches!(report.errors[0], SynoError::Grammar(_)));
        let kinds: Vec<_> = report
            .nodes
            .iter()
            .filter_map(|n| n.as_synth())
            .map(|s| s.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                GeneratorKind::Sine,
                GeneratorKind::Square,
                GeneratorKind::Sawtooth
            ]
        );
    }

    #[test]
    fn unknown_tag_reports_unknown_generator() {
        let report = parse("x5");
        assert!(report.nodes.is_empty());
        assert_eq!(report.errors, vec![SynoError::UnknownGenerator('x')]);
    }

    #[test]
    fn comments_are_stripped() {
        let report = parse("# full comment line\ns440 # trailing comment q9\n");
        assert_eq!(report.nodes.len(), 1);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn master_directive() {
        let report = parse("master v7");
        assert_eq!(report.nodes.len(), 1);
        assert_eq!(
            report.nodes[0],
            AstNode::Master(MasterNode { volume: 7.0 })
        );
        // Spacing between the keyword and the field is optional.
        let report = parse("masterv2.5");
        assert_eq!(
            report.nodes[0],
            AstNode::Master(MasterNode { volume: 2.5 })
        );
    }

    #[test]
    fn master_directive_shares_the_line_with_tokens() {
        let report = parse("master v7 s440");
        assert!(report.errors.is_empty());
        assert_eq!(report.nodes.len(), 2);
        assert_eq!(
            report.nodes[0],
            AstNode::Master(MasterNode { volume: 7.0 })
        );
        assert_eq!(
            report.nodes[1].as_synth().unwrap().kind,
            GeneratorKind::Sine
        );
    }

    #[test]
    fn buffer_slots_wider_than_a_byte_are_rejected() {
        for token in ["b260\\1>2'1", "b300=s330", "{b400}t300"] {
            let report = parse(token);
            assert!(report.nodes.is_empty(), "{token} must not produce a node");
            assert_eq!(report.errors.len(), 1, "{token} must be a grammar error");
        }
    }

    #[test]
    fn buffer_definition_is_capture_only() {
        let report = parse("b2=s440v9");
        let node = only_synth(&report);
        assert_eq!(node.kind, GeneratorKind::Sine);
        assert_eq!(node.buffer, Some(2));
        assert!(node.capture_only);
    }

    #[test]
    fn buffer_replay_with_rate_ramp() {
        let report = parse("b1\\0.5>2'4");
        let node = only_synth(&report);
        assert_eq!(node.kind, GeneratorKind::BufferRef);
        assert_eq!(node.buffer, Some(1));
        assert_eq!(
            node.glissando,
            Some(Transition {
                start: 0.5,
                middle: None,
                end: 2.0,
                duration: 4.0,
            })
        );
    }

    #[test]
    fn glissando_rejected_on_oscillators() {
        let report = parse("s440\\1>2'3");
        assert!(report.nodes.is_empty());
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn modulator_prefix_becomes_recursion_child() {
        let report = parse("{b0}t300");
        let node = only_synth(&report);
        assert_eq!(node.kind, GeneratorKind::Triangle);
        assert_eq!(node.recursion.len(), 1);
        let child = &node.recursion[0];
        assert_eq!(child.kind, GeneratorKind::BufferRef);
        assert_eq!(child.buffer, Some(0));
    }

    #[test]
    fn first_plain_token_is_tagged_for_slot_zero() {
        let report = parse("s440 q220");
        let first = report.nodes[0].as_synth().unwrap();
        let second = report.nodes[1].as_synth().unwrap();
        assert_eq!(first.buffer, Some(0));
        assert_eq!(second.buffer, None);
    }

    #[test]
    fn implicit_tagging_skips_buffer_tokens() {
        let report = parse("b1=s100 b1\\1>2'1 q220");
        let tagged = report.nodes[2].as_synth().unwrap();
        assert_eq!(tagged.kind, GeneratorKind::Square);
        assert_eq!(tagged.buffer, Some(0));
    }

    #[test]
    fn start_time_prefix_schedules_later() {
        let report = parse("2.5a110");
        let node = only_synth(&report);
        assert_eq!(node.start_time, 2.5);
        assert_eq!(node.freq, Param::Fixed(110.0));
    }

    #[test]
    fn envelope_requires_four_digits() {
        let report = parse("s440e12");
        assert!(report.nodes.is_empty());
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn parse_is_stateless_across_calls() {
        let parser = Parser::new();
        let first = parser.parse("s440");
        let second = parser.parse("s440");
        assert_eq!(first.nodes, second.nodes);
    }
}
