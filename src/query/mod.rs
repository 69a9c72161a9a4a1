// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Wildcard search over an archive
//!
//! A search string is read in every way it could match the encoded form of a
//! message (see [`interpretation`]). Each reading becomes a [`SubQuery`]
//! against one archive's dictionaries: the logtypes matching its pattern,
//! constraints on its variables, and the segments that can hold a match.

pub mod grep;
pub mod interpretation;
pub mod wildcard;

use crate::{
    dictionary::{LogtypeDictionaryReader, VariableDictionaryReader},
    encoding::{decode_dictionary_id, decode_float, decode_integer, encode_float, encode_integer},
    id::{LogtypeId, SegmentId, VariableId},
    logtype::VariableKind,
    timestamp::Timestamp,
};
use interpretation::{interpret, normalize, InterpretationToken, QueryInterpretation};
use std::collections::BTreeSet;
use wildcard::wildcard_match;

/// Search parameters besides the search string
#[derive(Clone, Debug)]
pub struct SearchOptions {
    /// Lowest timestamp of matching messages
    pub begin_ts: Timestamp,

    /// Highest timestamp of matching messages
    pub end_ts: Timestamp,

    /// Whether to compare case-insensitively
    pub ignore_case: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            begin_ts: Timestamp::MIN,
            end_ts: Timestamp::MAX,
            ignore_case: false,
        }
    }
}

/// Constraint on one variable of a message
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum QueryVar {
    /// Exact encoded value
    ExactEncoded {
        /// Kind of the variable
        kind: VariableKind,

        /// Encoded value
        value: i64,
    },

    /// Directly encoded value matching a wildcard pattern
    WildcardEncoded {
        /// Kind of the variable, integer or float
        kind: VariableKind,

        /// Wildcard pattern
        pattern: String,
    },

    /// One of a set of dictionary entries
    Dictionary {
        /// Matching dictionary IDs
        ids: BTreeSet<VariableId>,
    },
}

impl QueryVar {
    fn kind(&self) -> VariableKind {
        match self {
            Self::ExactEncoded { kind, .. } | Self::WildcardEncoded { kind, .. } => *kind,
            Self::Dictionary { .. } => VariableKind::Dictionary,
        }
    }

    /// Returns `true` if an encoded variable satisfies the constraint.
    #[must_use]
    pub fn matches(&self, kind: VariableKind, value: i64, ignore_case: bool) -> bool {
        if kind != self.kind() {
            return false;
        }

        match self {
            Self::ExactEncoded { value: expected, .. } => *expected == value,
            Self::WildcardEncoded { pattern, .. } => {
                let mut text = String::new();
                match kind {
                    VariableKind::Integer => decode_integer(value, &mut text),
                    VariableKind::Float => {
                        if decode_float(value, &mut text).is_err() {
                            return false;
                        }
                    }
                    VariableKind::Dictionary => return false,
                }
                wildcard_match(&text, pattern, !ignore_case)
            }
            Self::Dictionary { ids } => ids.contains(&decode_dictionary_id(value)),
        }
    }
}

/// One concrete reading of a search string against an archive
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubQuery {
    /// Logtypes matching the logtype pattern
    pub(crate) logtype_ids: BTreeSet<LogtypeId>,

    /// Constraints on the variables, in placeholder order
    pub(crate) vars: Vec<QueryVar>,

    /// Whether candidates must be confirmed against the decompressed text
    pub(crate) wildcard_match_required: bool,

    /// Segments that may hold a match
    pub(crate) segment_ids: BTreeSet<SegmentId>,
}

impl SubQuery {
    /// Logtype IDs that can match
    #[must_use]
    pub fn logtype_ids(&self) -> &BTreeSet<LogtypeId> {
        &self.logtype_ids
    }

    /// Variable constraints
    #[must_use]
    pub fn vars(&self) -> &[QueryVar] {
        &self.vars
    }

    /// Whether candidates must be confirmed against the decompressed text
    #[must_use]
    pub fn wildcard_match_required(&self) -> bool {
        self.wildcard_match_required
    }

    /// Segments that can hold a match
    #[must_use]
    pub fn segment_ids(&self) -> &BTreeSet<SegmentId> {
        &self.segment_ids
    }

    /// Returns `true` if the encoded message satisfies the logtype and variable constraints.
    ///
    /// Variable constraints have to be met by message variables of the same
    /// kind, in order, but not necessarily adjacent.
    pub fn matches_encoded<I>(&self, logtype_id: LogtypeId, vars: I, ignore_case: bool) -> bool
    where
        I: IntoIterator<Item = (VariableKind, i64)>,
    {
        if !self.logtype_ids.contains(&logtype_id) {
            return false;
        }

        let mut vars = vars.into_iter();

        self.vars.iter().all(|constraint| {
            vars.by_ref()
                .any(|(kind, value)| constraint.matches(kind, value, ignore_case))
        })
    }

    fn build(
        interpretation: &QueryInterpretation,
        ignore_case: bool,
        logtype_dict: &LogtypeDictionaryReader,
        var_dict: &VariableDictionaryReader,
    ) -> Option<Self> {
        let mut vars = Vec::new();
        let mut segment_ids: Option<BTreeSet<SegmentId>> = None;

        for token in interpretation.tokens() {
            let InterpretationToken::Variable {
                kind,
                pattern,
                has_wildcards,
            } = token
            else {
                continue;
            };

            let var = match (kind, has_wildcards) {
                (VariableKind::Integer, false) => QueryVar::ExactEncoded {
                    kind: *kind,
                    value: encode_integer(pattern)?,
                },
                (VariableKind::Float, false) => QueryVar::ExactEncoded {
                    kind: *kind,
                    value: encode_float(pattern)?,
                },
                (VariableKind::Integer | VariableKind::Float, true) => QueryVar::WildcardEncoded {
                    kind: *kind,
                    pattern: pattern.clone(),
                },
                (VariableKind::Dictionary, has_wildcards) => {
                    let ids = if *has_wildcards {
                        var_dict.get_ids_matching_wildcard(pattern, ignore_case)
                    } else {
                        var_dict.get_ids_matching_value(pattern, ignore_case)
                    };

                    if ids.is_empty() {
                        return None;
                    }

                    let segments = var_dict.get_segments_containing_entries(&ids);
                    segment_ids = Some(match segment_ids {
                        Some(acc) => acc.intersection(&segments).copied().collect(),
                        None => segments,
                    });

                    QueryVar::Dictionary { ids }
                }
            };

            vars.push(var);
        }

        let pattern = interpretation.logtype_pattern();
        let logtype_ids = logtype_dict.get_ids_matching_wildcard(&pattern, ignore_case);
        if logtype_ids.is_empty() {
            return None;
        }

        let logtype_segments = logtype_dict.get_segments_containing_entries(&logtype_ids);
        let segment_ids = match segment_ids {
            Some(acc) => acc.intersection(&logtype_segments).copied().collect(),
            None => logtype_segments,
        };

        Some(Self {
            logtype_ids,
            vars,
            wildcard_match_required: interpretation.wildcard_match_required(),
            segment_ids,
        })
    }
}

/// How a message matched a query
#[derive(Clone, Copy, Debug)]
pub enum QueryMatch<'q> {
    /// The query matches every message
    Everything,

    /// The message satisfies this sub-query
    SubQuery(&'q SubQuery),
}

impl QueryMatch<'_> {
    /// Whether the match has to be confirmed against the decompressed text
    #[must_use]
    pub fn wildcard_match_required(&self) -> bool {
        match self {
            Self::Everything => false,
            Self::SubQuery(sub_query) => sub_query.wildcard_match_required,
        }
    }
}

/// A search string resolved against one archive's dictionaries
#[derive(Clone, Debug)]
pub struct Query {
    /// Normalized search string
    pub(crate) search_string: String,

    pub(crate) options: SearchOptions,

    pub(crate) sub_queries: Vec<SubQuery>,

    /// The search string matches every message
    pub(crate) matches_everything: bool,
}

impl Query {
    /// Builds a query against an archive's dictionaries.
    ///
    /// Readings of the search string that can't match anything in the
    /// archive are dropped. If none is left, [`Query::is_empty`] is `true`.
    #[must_use]
    pub fn build(
        search: &str,
        options: SearchOptions,
        logtype_dict: &LogtypeDictionaryReader,
        var_dict: &VariableDictionaryReader,
    ) -> Self {
        let search_string = normalize(search);
        let interpretations = interpret(search);

        if interpretations.iter().any(QueryInterpretation::matches_everything) {
            log::trace!("Query {search_string:?} matches every message");

            return Self {
                search_string,
                options,
                sub_queries: Vec::new(),
                matches_everything: true,
            };
        }

        let sub_queries: Vec<_> = interpretations
            .iter()
            .filter_map(|x| SubQuery::build(x, options.ignore_case, logtype_dict, var_dict))
            .collect();

        log::trace!(
            "Query {search_string:?}: {} interpretations, {} sub-queries",
            interpretations.len(),
            sub_queries.len()
        );

        Self {
            search_string,
            options,
            sub_queries,
            matches_everything: false,
        }
    }

    /// Normalized search string
    #[must_use]
    pub fn search_string(&self) -> &str {
        &self.search_string
    }

    /// Search options
    #[must_use]
    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// Sub-queries
    #[must_use]
    pub fn sub_queries(&self) -> &[SubQuery] {
        &self.sub_queries
    }

    /// Returns `true` if every message in the time range matches.
    #[must_use]
    pub fn matches_everything(&self) -> bool {
        self.matches_everything
    }

    /// Returns `true` if no message can match.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.matches_everything && self.sub_queries.is_empty()
    }

    /// Returns `true` if `ts` is in the search time range.
    #[must_use]
    pub fn timestamp_in_range(&self, ts: Timestamp) -> bool {
        self.options.begin_ts <= ts && ts <= self.options.end_ts
    }

    /// Segments that can hold a match, `None` if every segment has to be searched.
    #[must_use]
    pub fn matching_segments(&self) -> Option<BTreeSet<SegmentId>> {
        if self.matches_everything {
            return None;
        }

        Some(
            self.sub_queries
                .iter()
                .flat_map(|x| x.segment_ids.iter().copied())
                .collect(),
        )
    }

    /// Sub-queries that can match a message in the given segment
    pub fn relevant_sub_queries(&self, segment_id: SegmentId) -> impl Iterator<Item = &SubQuery> {
        self.sub_queries
            .iter()
            .filter(move |x| x.segment_ids.contains(&segment_id))
    }

    /// Confirms a candidate against its decompressed text.
    #[must_use]
    pub fn matches_text(&self, message: &str) -> bool {
        wildcard_match(message, &self.search_string, !self.options.ignore_case)
    }
}
