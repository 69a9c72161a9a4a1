// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Conversion between message text and its logtype plus encoded variables

use crate::{
    encoding::{
        decode_dictionary_id, decode_float, decode_integer, encode_dictionary_id, encode_float,
        encode_integer, EncodedVariable,
    },
    id::VariableId,
    logtype::{append_constant, append_placeholder, LogtypeElement, LogtypeEntry, VariableKind},
    parser::{Token, VariableParser},
    Error,
};

/// Classifies a variable token and encodes it.
///
/// `add_dictionary_variable` is only called for tokens that are neither an
/// integer nor a float.
///
/// # Errors
///
/// Will return `Err` if the dictionary fails or its id does not fit `E`.
pub fn encode_variable<E, F>(text: &str, add_dictionary_variable: F) -> crate::Result<(VariableKind, E)>
where
    E: EncodedVariable,
    F: FnOnce(&str) -> crate::Result<VariableId>,
{
    if let Some(value) = encode_integer(text) {
        return Ok((VariableKind::Integer, value));
    }

    if let Some(value) = encode_float(text) {
        return Ok((VariableKind::Float, value));
    }

    let id = add_dictionary_variable(text)?;
    Ok((VariableKind::Dictionary, encode_dictionary_id(id)?))
}

/// Builds the logtype and variable column of a tokenized message.
///
/// `logtype` and `variables` are cleared first.
///
/// # Errors
///
/// Will return `Err` if `add_dictionary_variable` fails.
pub fn encode_tokens<E, F>(
    tokens: &[Token<'_>],
    logtype: &mut String,
    variables: &mut Vec<E>,
    mut add_dictionary_variable: F,
) -> crate::Result<()>
where
    E: EncodedVariable,
    F: FnMut(&str) -> crate::Result<VariableId>,
{
    logtype.clear();
    variables.clear();

    for token in tokens {
        match token {
            Token::Constant(text) => append_constant(logtype, text),
            Token::Variable(text) => {
                let (kind, value) = encode_variable(text, &mut add_dictionary_variable)?;
                append_placeholder(logtype, kind);
                variables.push(value);
            }
        }
    }

    Ok(())
}

/// Tokenizes and encodes a message.
///
/// # Errors
///
/// Will return `Err` if `add_dictionary_variable` fails.
pub fn encode_message<E, F>(
    parser: &dyn VariableParser,
    message: &str,
    logtype: &mut String,
    variables: &mut Vec<E>,
    add_dictionary_variable: F,
) -> crate::Result<()>
where
    E: EncodedVariable,
    F: FnMut(&str) -> crate::Result<VariableId>,
{
    let mut tokens = Vec::new();
    parser.tokenize(message, &mut tokens);
    encode_tokens(&tokens, logtype, variables, add_dictionary_variable)
}

/// Appends the text of one encoded variable.
///
/// # Errors
///
/// Will return `Err` if a float is malformed or a dictionary id is unknown.
pub fn decode_variable<'d, E, F>(
    kind: VariableKind,
    value: E,
    lookup_dictionary_variable: F,
    out: &mut String,
) -> crate::Result<()>
where
    E: EncodedVariable,
    F: FnOnce(VariableId) -> crate::Result<&'d str>,
{
    match kind {
        VariableKind::Integer => decode_integer(value, out),
        VariableKind::Float => decode_float(value, out)?,
        VariableKind::Dictionary => {
            out.push_str(lookup_dictionary_variable(decode_dictionary_id(value))?);
        }
    }
    Ok(())
}

/// Reconstructs the original message text.
///
/// # Errors
///
/// Returns [`Error::Corrupt`] if the number of variables does not match the logtype.
pub fn decode_message<'d, E, F>(
    logtype: &LogtypeEntry,
    variables: &[E],
    mut lookup_dictionary_variable: F,
    out: &mut String,
) -> crate::Result<()>
where
    E: EncodedVariable,
    F: FnMut(VariableId) -> crate::Result<&'d str>,
{
    if logtype.num_variables() != variables.len() {
        return Err(Error::Corrupt(format!(
            "logtype {} has {} placeholders, but {} variables were given",
            logtype.id(),
            logtype.num_variables(),
            variables.len()
        )));
    }

    let mut variables = variables.iter();

    for element in logtype.elements() {
        match element {
            LogtypeElement::Constant(text) => out.push_str(text),
            LogtypeElement::Variable(kind) => {
                let Some(value) = variables.next() else {
                    return Err(Error::Corrupt("variable column ended early".into()));
                };
                decode_variable(*kind, *value, &mut lookup_dictionary_variable, out)?;
            }
        }
    }

    Ok(())
}
