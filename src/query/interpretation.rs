// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Turns a wildcard search string into every logtype/variable reading of it.
//!
//! The search string is split into tokens the same way messages are. A token
//! without wildcards is classified exactly like the encoder would classify it.
//! A token with a leading or trailing `*` may stand for a longer message token,
//! so every kind it could have been encoded as is kept as an alternative.

use super::wildcard::escape_wildcards;
use crate::{
    encoding::{could_be_float, could_be_integer, encode_float, encode_integer},
    logtype::{append_constant, VariableKind},
    parser::{is_token_byte, is_variable_token},
};
use std::collections::BTreeSet;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum QueryChar {
    Literal(char),
    Any,
    One,
}

impl QueryChar {
    fn is_wildcard(self) -> bool {
        !matches!(self, Self::Literal(_))
    }

    fn is_token_char(self) -> bool {
        match self {
            Self::Literal(c) => u8::try_from(c).is_ok_and(is_token_byte),
            Self::Any | Self::One => true,
        }
    }
}

/// Parses a search string, wraps it in `*` and collapses repeated `*`.
fn parse(search: &str) -> Vec<QueryChar> {
    let mut chars = vec![QueryChar::Any];
    let mut input = search.chars();

    while let Some(c) = input.next() {
        let c = match c {
            '*' => QueryChar::Any,
            '?' => QueryChar::One,
            '\\' => QueryChar::Literal(input.next().unwrap_or('\\')),
            c => QueryChar::Literal(c),
        };

        if !(c == QueryChar::Any && chars.last() == Some(&QueryChar::Any)) {
            chars.push(c);
        }
    }

    if chars.last() != Some(&QueryChar::Any) {
        chars.push(QueryChar::Any);
    }

    chars
}

/// Renders query chars back into a normalized wildcard pattern.
fn render(chars: &[QueryChar], out: &mut String) {
    for c in chars {
        match c {
            QueryChar::Any => out.push('*'),
            QueryChar::One => out.push('?'),
            QueryChar::Literal(c) => escape_wildcards(c.encode_utf8(&mut [0; 4]), out),
        }
    }
}

/// Renders literal chars the way they appear in a logtype, as a wildcard pattern.
fn render_logtype_constant(chars: &[QueryChar], out: &mut String) {
    let mut constant = String::new();

    for c in chars {
        match c {
            QueryChar::Literal(c) => {
                let mut escaped = String::new();
                append_constant(&mut escaped, c.encode_utf8(&mut [0; 4]));
                escape_wildcards(&escaped, &mut constant);
            }
            QueryChar::Any => constant.push('*'),
            QueryChar::One => constant.push('?'),
        }
    }

    out.push_str(&constant);
}

/// Normalized form of a search string, as matched against decompressed messages
#[must_use]
pub fn normalize(search: &str) -> String {
    let mut out = String::new();
    render(&parse(search), &mut out);
    out
}

/// One reading of a query token
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum InterpretationToken {
    /// Logtype pattern text (already escaped)
    Static(String),

    /// Variable placeholder
    Variable {
        /// Kind of the variable
        kind: VariableKind,

        /// Literal value, or wildcard pattern if `has_wildcards`
        pattern: String,

        /// Whether `pattern` contains a `*`
        has_wildcards: bool,
    },
}

/// One way to read a whole query
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct QueryInterpretation {
    pub(crate) tokens: Vec<InterpretationToken>,

    /// Some query text could not be mapped to logtype or variables exactly
    pub(crate) wildcard_match_required: bool,
}

impl Ord for QueryInterpretation {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.tokens.len(), &self.tokens, self.wildcard_match_required).cmp(&(
            other.tokens.len(),
            &other.tokens,
            other.wildcard_match_required,
        ))
    }
}

impl PartialOrd for QueryInterpretation {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl QueryInterpretation {
    fn push_static(&mut self, text: &str) {
        if let Some(InterpretationToken::Static(last)) = self.tokens.last_mut() {
            last.push_str(text);
        } else {
            self.tokens.push(InterpretationToken::Static(text.into()));
        }
    }

    /// Tokens of the interpretation
    #[must_use]
    pub fn tokens(&self) -> &[InterpretationToken] {
        &self.tokens
    }

    /// Whether matching messages have to be confirmed by a wildcard match
    #[must_use]
    pub fn wildcard_match_required(&self) -> bool {
        self.wildcard_match_required
    }

    /// Wildcard pattern matched against logtypes
    #[must_use]
    pub fn logtype_pattern(&self) -> String {
        let mut pattern = String::new();

        for token in &self.tokens {
            match token {
                InterpretationToken::Static(text) => pattern.push_str(text),
                InterpretationToken::Variable { kind, pattern: text, .. } => {
                    if text.starts_with('*') {
                        pattern.push('*');
                    }
                    pattern.push(kind.placeholder());
                    if text.len() > 1 && text.ends_with('*') {
                        pattern.push('*');
                    }
                }
            }
        }

        // Collapse runs of `*`, which don't change what is matched
        let mut collapsed = String::with_capacity(pattern.len());
        let mut escaped = false;
        let mut last_was_star = false;

        for c in pattern.chars() {
            if escaped {
                escaped = false;
                last_was_star = false;
            } else if c == '*' {
                if last_was_star {
                    continue;
                }
                last_was_star = true;
            } else {
                escaped = c == '\\';
                last_was_star = false;
            }
            collapsed.push(c);
        }

        collapsed
    }

    /// Returns `true` if the interpretation matches every message.
    #[must_use]
    pub fn matches_everything(&self) -> bool {
        !self.wildcard_match_required
            && matches!(self.tokens.as_slice(), [InterpretationToken::Static(text)] if text == "*")
    }
}

/// Alternatives for one query token
enum TokenReading {
    /// Delimiter text or an unambiguous constant
    Static(String),

    /// Token with `?` or an interior `*`
    Complex,

    /// Several possible readings
    Alternatives(Vec<InterpretationToken>),
}

fn classify_token(chars: &[QueryChar], preceded_by_equals: bool) -> TokenReading {
    let mut text = String::new();
    render(chars, &mut text);

    if chars.iter().all(|c| *c == QueryChar::Any) {
        return TokenReading::Static("*".into());
    }

    let prefix = chars.first() == Some(&QueryChar::Any);
    let suffix = chars.last() == Some(&QueryChar::Any);

    let core_begin = usize::from(prefix);
    let core_end = chars.len() - usize::from(suffix);
    let core = chars.get(core_begin..core_end).unwrap_or_default();

    if core.iter().any(|c| c.is_wildcard()) {
        return TokenReading::Complex;
    }

    let core_text: String = core
        .iter()
        .filter_map(|c| match c {
            QueryChar::Literal(c) => Some(*c),
            _ => None,
        })
        .collect();

    if !prefix && !suffix {
        if !is_variable_token(&core_text, preceded_by_equals) {
            let mut constant = String::new();
            render_logtype_constant(chars, &mut constant);
            return TokenReading::Static(constant);
        }

        // Same order of attempts as the encoder
        let kind = if encode_integer::<i64>(&core_text).is_some() {
            VariableKind::Integer
        } else if encode_float::<i64>(&core_text).is_some() {
            VariableKind::Float
        } else {
            VariableKind::Dictionary
        };

        return TokenReading::Alternatives(vec![InterpretationToken::Variable {
            kind,
            pattern: core_text,
            has_wildcards: false,
        }]);
    }

    let is_variable = core_text.bytes().any(|b| b.is_ascii_digit())
        || (!prefix && preceded_by_equals && core_text.bytes().any(|b| b.is_ascii_alphabetic()));

    let mut alternatives = Vec::with_capacity(4);

    if !is_variable {
        let mut constant = String::new();
        render_logtype_constant(chars, &mut constant);
        alternatives.push(InterpretationToken::Static(constant));
    }

    let variable = |kind| InterpretationToken::Variable {
        kind,
        pattern: text.clone(),
        has_wildcards: true,
    };

    if could_be_integer(&core_text) {
        alternatives.push(variable(VariableKind::Integer));
    }
    if could_be_float(&core_text) {
        alternatives.push(variable(VariableKind::Float));
    }
    alternatives.push(variable(VariableKind::Dictionary));

    TokenReading::Alternatives(alternatives)
}

/// Upper bound on the interpretations of one search string
///
/// Once reached, further variable-like tokens only match as `*` in the
/// logtype, and are confirmed by the wildcard match.
pub const MAX_INTERPRETATIONS: usize = 256;

/// Builds all interpretations of a search string.
#[must_use]
pub fn interpret(search: &str) -> BTreeSet<QueryInterpretation> {
    let chars = parse(search);

    let mut readings = Vec::new();
    let mut pos = 0;

    while let Some(c) = chars.get(pos) {
        if c.is_token_char() {
            let begin = pos;
            while chars.get(pos).is_some_and(|c| c.is_token_char()) {
                pos += 1;
            }

            let preceded_by_equals = begin
                .checked_sub(1)
                .and_then(|ix| chars.get(ix))
                .is_some_and(|c| *c == QueryChar::Literal('='));

            readings.push(classify_token(
                chars.get(begin..pos).unwrap_or_default(),
                preceded_by_equals,
            ));
        } else {
            let begin = pos;
            while chars.get(pos).is_some_and(|c| !c.is_token_char()) {
                pos += 1;
            }

            let mut constant = String::new();
            render_logtype_constant(chars.get(begin..pos).unwrap_or_default(), &mut constant);
            readings.push(TokenReading::Static(constant));
        }
    }

    let mut interpretations = vec![QueryInterpretation {
        tokens: Vec::new(),
        wildcard_match_required: false,
    }];

    for reading in &readings {
        match reading {
            TokenReading::Static(text) => {
                for interpretation in &mut interpretations {
                    interpretation.push_static(text);
                }
            }
            TokenReading::Complex => {
                for interpretation in &mut interpretations {
                    interpretation.push_static("*");
                    interpretation.wildcard_match_required = true;
                }
            }
            TokenReading::Alternatives(alternatives)
                if interpretations.len() * alternatives.len() > MAX_INTERPRETATIONS =>
            {
                log::trace!("Too many interpretations of {search:?}, matching a token as `*`");

                for interpretation in &mut interpretations {
                    interpretation.push_static("*");
                    interpretation.wildcard_match_required = true;
                }
            }
            TokenReading::Alternatives(alternatives) => {
                let mut next = Vec::with_capacity(interpretations.len() * alternatives.len());

                for interpretation in &interpretations {
                    for alternative in alternatives {
                        let mut interpretation = interpretation.clone();
                        match alternative {
                            InterpretationToken::Static(text) => interpretation.push_static(text),
                            variable @ InterpretationToken::Variable { .. } => {
                                interpretation.tokens.push(variable.clone());
                                interpretation.wildcard_match_required = true;
                            }
                        }
                        next.push(interpretation);
                    }
                }

                next.sort();
                next.dedup();
                interpretations = next;
            }
        }
    }

    interpretations.into_iter().collect()
}
