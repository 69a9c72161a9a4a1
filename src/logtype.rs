// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Logtype strings: constant text with one placeholder byte per variable

use crate::{id::LogtypeId, Error};

/// Escape character inside logtypes
pub const ESCAPE: char = '\\';

/// Kind of a variable placeholder
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum VariableKind {
    /// Directly encoded integer
    Integer,

    /// Variable dictionary id
    Dictionary,

    /// Directly encoded float
    Float,
}

impl VariableKind {
    /// The placeholder character standing for this kind of variable.
    #[must_use]
    pub const fn placeholder(self) -> char {
        match self {
            Self::Integer => '\u{11}',
            Self::Dictionary => '\u{12}',
            Self::Float => '\u{13}',
        }
    }

    /// Maps a placeholder character back to its kind.
    #[must_use]
    pub const fn from_placeholder(c: char) -> Option<Self> {
        match c {
            '\u{11}' => Some(Self::Integer),
            '\u{12}' => Some(Self::Dictionary),
            '\u{13}' => Some(Self::Float),
            _ => None,
        }
    }
}

/// Returns `true` if `c` must be escaped when it appears in constant text.
#[must_use]
pub fn needs_escape(c: char) -> bool {
    c == ESCAPE || VariableKind::from_placeholder(c).is_some()
}

/// Appends constant text to a logtype, escaping placeholder and escape characters.
pub fn append_constant(logtype: &mut String, constant: &str) {
    logtype.reserve(constant.len());

    for c in constant.chars() {
        if needs_escape(c) {
            logtype.push(ESCAPE);
        }
        logtype.push(c);
    }
}

/// Appends a variable placeholder to a logtype.
pub fn append_placeholder(logtype: &mut String, kind: VariableKind) {
    logtype.push(kind.placeholder());
}

/// One element of a parsed logtype
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LogtypeElement {
    /// Unescaped constant text
    Constant(String),

    /// Variable slot
    Variable(VariableKind),
}

/// Logtype dictionary entry, parsed into constants and variable slots
#[derive(Clone, Debug)]
pub struct LogtypeEntry {
    id: LogtypeId,
    value: String,
    elements: Vec<LogtypeElement>,
    num_variables: usize,
}

impl LogtypeEntry {
    /// Parses a logtype as stored in the dictionary.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] if the logtype ends with a dangling escape.
    pub fn parse(id: LogtypeId, value: String) -> crate::Result<Self> {
        let mut elements = Vec::new();
        let mut constant = String::new();
        let mut num_variables = 0;

        let mut chars = value.chars();

        while let Some(c) = chars.next() {
            if c == ESCAPE {
                let escaped = chars.next().ok_or_else(|| {
                    Error::Corrupt(format!("logtype {id} ends with a dangling escape"))
                })?;
                constant.push(escaped);
            } else if let Some(kind) = VariableKind::from_placeholder(c) {
                if !constant.is_empty() {
                    elements.push(LogtypeElement::Constant(std::mem::take(&mut constant)));
                }
                elements.push(LogtypeElement::Variable(kind));
                num_variables += 1;
            } else {
                constant.push(c);
            }
        }

        if !constant.is_empty() {
            elements.push(LogtypeElement::Constant(constant));
        }

        Ok(Self {
            id,
            value,
            elements,
            num_variables,
        })
    }

    /// Dictionary id
    #[must_use]
    pub fn id(&self) -> LogtypeId {
        self.id
    }

    /// Escaped logtype text, as stored in the dictionary
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Constants and variable slots in message order
    #[must_use]
    pub fn elements(&self) -> &[LogtypeElement] {
        &self.elements
    }

    /// Number of variable slots
    #[must_use]
    pub fn num_variables(&self) -> usize {
        self.num_variables
    }

    /// Kinds of the variable slots in message order.
    pub fn variable_kinds(&self) -> impl Iterator<Item = VariableKind> + '_ {
        self.elements.iter().filter_map(|element| match element {
            LogtypeElement::Variable(kind) => Some(*kind),
            LogtypeElement::Constant(_) => None,
        })
    }
}
