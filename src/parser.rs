// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Tokenization of messages into constant text and variable candidates

/// A piece of a log message
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Token<'a> {
    /// Text that becomes part of the logtype
    Constant(&'a str),

    /// Text that is stored as an encoded variable
    Variable(&'a str),
}

/// Splits a message into constant text and variables
pub trait VariableParser {
    /// Appends the tokens of `message` to `tokens`.
    ///
    /// Concatenating the token texts must reproduce `message`.
    fn tokenize<'a>(&self, message: &'a str, tokens: &mut Vec<Token<'a>>);
}

/// Returns `true` for bytes that can be part of a variable token.
#[must_use]
pub fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.' | b'/' | b'_')
}

/// Returns `true` if a token is classified as a variable.
///
/// `preceded_by_equals` is whether the byte right before the token is `=`.
#[must_use]
pub fn is_variable_token(token: &str, preceded_by_equals: bool) -> bool {
    token.bytes().any(|b| b.is_ascii_digit())
        || (preceded_by_equals && token.bytes().any(|b| b.is_ascii_alphabetic()))
}

/// Default tokenizer
///
/// Tokens are maximal runs of `[+\-./0-9A-Za-z_]`. A token is a variable if it
/// contains a decimal digit, or if it directly follows `=` and contains a letter.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeuristicParser;

impl VariableParser for HeuristicParser {
    fn tokenize<'a>(&self, message: &'a str, tokens: &mut Vec<Token<'a>>) {
        let bytes = message.as_bytes();

        let mut constant_begin = 0;
        let mut pos = 0;

        while pos < bytes.len() {
            if !bytes.get(pos).copied().is_some_and(is_token_byte) {
                pos += 1;
                continue;
            }

            let token_begin = pos;
            while bytes.get(pos).copied().is_some_and(is_token_byte) {
                pos += 1;
            }

            // NOTE: Token bytes are ASCII, so both ends are char boundaries
            let (Some(token), Some(constant)) = (
                message.get(token_begin..pos),
                message.get(constant_begin..token_begin),
            ) else {
                continue;
            };

            let preceded_by_equals = token_begin > 0 && bytes.get(token_begin - 1) == Some(&b'=');

            if is_variable_token(token, preceded_by_equals) {
                if !constant.is_empty() {
                    tokens.push(Token::Constant(constant));
                }
                tokens.push(Token::Variable(token));
                constant_begin = pos;
            }
        }

        if let Some(constant) = message.get(constant_begin..) {
            if !constant.is_empty() {
                tokens.push(Token::Constant(constant));
            }
        }
    }
}
