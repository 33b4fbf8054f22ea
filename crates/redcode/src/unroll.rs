//! Text-level expansion: `EQU` constant substitution and `FOR`/`ROF`
//! loop unrolling.
//!
//! Both run before line parsing. Constant substitution is longest-match on
//! identifier tokens and iterates so a constant may expand to other
//! constants; loop bodies are captured verbatim and re-fed through the line
//! queue once per iteration, with the loop variable substituted textually.

use std::collections::HashMap;
use std::collections::VecDeque;

use mars_core::SimConfig;

/// One queued source line with its original line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    /// Line text.
    pub text: String,
    /// 1-indexed line number in the original file.
    pub line: usize,
}

/// Substitution passes applied before giving up on a cyclic definition.
const MAX_SUBSTITUTION_PASSES: usize = 8;

/// The `EQU` constant table.
///
/// Values are raw replacement text; substitution replaces whole identifier
/// tokens only, so a constant never fires inside a longer name.
#[derive(Debug, Clone, Default)]
pub struct ConstantTable {
    map: HashMap<String, String>,
}

impl ConstantTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table preloaded with the standard symbols derived from the
    /// simulation configuration.
    #[must_use]
    pub fn with_standard_symbols(config: &SimConfig) -> Self {
        let mut table = Self::new();
        for (name, value) in [
            ("CORESIZE", config.core_size),
            ("MAXCYCLES", config.max_cycles),
            ("MAXPROCESSES", config.max_processes),
            ("MAXLENGTH", config.max_length),
            ("MINDISTANCE", config.min_distance),
        ] {
            table.map.insert(name.to_string(), value.to_string());
        }
        table
    }

    /// Returns true when `name` is defined.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    /// Defines a constant; returns false when the name already exists.
    pub fn define(&mut self, name: &str, rhs: &str) -> bool {
        if self.map.contains_key(name) {
            return false;
        }
        self.map.insert(name.to_string(), rhs.to_string());
        true
    }

    /// Substitutes constants in `line` until a fixpoint.
    ///
    /// Returns `None` when the text still changes after the pass cap,
    /// which indicates a cyclic definition.
    #[must_use]
    pub fn substitute(&self, line: &str) -> Option<String> {
        let mut current = line.to_string();
        for _ in 0..MAX_SUBSTITUTION_PASSES {
            let next = self.substitute_once(&current);
            if next == current {
                return Some(current);
            }
            current = next;
        }
        (self.substitute_once(&current) == current).then_some(current)
    }

    fn substitute_once(&self, line: &str) -> String {
        let mut out = String::with_capacity(line.len());
        let mut rest = line;
        while let Some((prefix, identifier, after)) = split_identifier(rest) {
            out.push_str(prefix);
            // An identifier right after `&` is a loop-variable reference.
            let shielded = prefix.ends_with('&');
            match self.map.get(identifier) {
                Some(replacement) if !shielded => out.push_str(replacement),
                _ => out.push_str(identifier),
            }
            rest = after;
        }
        out.push_str(rest);
        out
    }
}

/// Splits off the next identifier token: `(before, identifier, after)`.
fn split_identifier(text: &str) -> Option<(&str, &str, &str)> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < bytes.len() && ((bytes[i] as char).is_ascii_alphanumeric() || bytes[i] == b'_')
            {
                i += 1;
            }
            return Some((&text[..start], &text[start..i], &text[i..]));
        }
        // Skip whole tokens that merely start with a digit (e.g. `2dr`
        // never exists in Redcode, but digits must not open an identifier).
        if c.is_ascii_digit() {
            while i < bytes.len() && ((bytes[i] as char).is_ascii_alphanumeric() || bytes[i] == b'_')
            {
                i += 1;
            }
            continue;
        }
        i += 1;
    }
    None
}

/// Substitutes the loop variable for one iteration (1-based).
///
/// `&var` becomes the zero-padded two-digit iteration; a bare `var`
/// identifier becomes the decimal iteration.
#[must_use]
pub fn substitute_loop_var(line: &str, var: &str, iteration: u32) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some((prefix, identifier, after)) = split_identifier(rest) {
        if identifier == var {
            if let Some(shortened) = prefix.strip_suffix('&') {
                out.push_str(shortened);
                out.push_str(&format!("{iteration:02}"));
            } else {
                out.push_str(prefix);
                out.push_str(&iteration.to_string());
            }
        } else {
            out.push_str(prefix);
            out.push_str(identifier);
        }
        rest = after;
    }
    out.push_str(rest);
    out
}

/// Loop delimiters recognized textually during body capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMarker {
    /// A `FOR` header (named or not).
    For,
    /// A `ROF` terminator.
    Rof,
}

/// Detects `FOR`/`ROF` lines without a full parse.
///
/// The keyword may stand alone or follow a single leading label.
#[must_use]
pub fn loop_marker(text: &str) -> Option<LoopMarker> {
    let stripped = text.find(';').map_or(text, |pos| &text[..pos]);
    let mut words = stripped.split_whitespace();
    let first = words.next()?;
    let keyword = |word: &str| match word.to_ascii_uppercase().as_str() {
        "FOR" => Some(LoopMarker::For),
        "ROF" => Some(LoopMarker::Rof),
        _ => None,
    };
    keyword(first).or_else(|| words.next().and_then(keyword))
}

/// Pops the body of an open loop from the queue, up to and including the
/// matching `ROF` (which is consumed but not returned).
///
/// Returns `None` when the queue runs out before the loop closes.
#[must_use]
pub fn capture_loop_body(queue: &mut VecDeque<SourceLine>) -> Option<Vec<SourceLine>> {
    let mut body = Vec::new();
    let mut depth = 1_usize;
    while let Some(line) = queue.pop_front() {
        match loop_marker(&line.text) {
            Some(LoopMarker::For) => depth += 1,
            Some(LoopMarker::Rof) => {
                depth -= 1;
                if depth == 0 {
                    return Some(body);
                }
            }
            None => {}
        }
        body.push(line);
    }
    None
}
