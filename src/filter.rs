//! Filter expression rewriting using nom.
//!
//! A projection `<filter>` is written in the calculation-view expression
//! language, where double-quoted tokens name view columns:
//!
//! ```text
//! "today" <= "DATBI" and "ChartOfAccounts" = 'INT'
//! ──┬────    ───┬───      ───────┬───────    ──┬──
//!   │           │                │             └── string literal, kept
//!   │           └────────────────┴── column references, rewritten
//!   └── date placeholder
//! ```
//!
//! The filter is split into tokens and only whole quoted references are
//! substituted. Everything else is copied through unchanged and is expected
//! to already be valid SQL.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{is_not, tag, take_while},
    character::complete::char,
    combinator::{map, recognize},
    multi::many0,
    sequence::delimited,
};

/// Quoted reference replaced by the configured date function.
pub const TODAY: &str = "today";

/// A lexical piece of a filter expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterToken<'a> {
    /// `"name"`, holding the text between the quotes.
    Reference(&'a str),
    /// `'text'` including its quotes.
    Literal(&'a str),
    /// Anything else: operators, keywords, numbers, whitespace.
    Text(&'a str),
}

/// Split a filter into tokens. Never fails: an unterminated quote and
/// everything after it come back as a single [`FilterToken::Text`].
pub fn tokenize(input: &str) -> Vec<FilterToken<'_>> {
    match many0(alt((reference, literal, text)))(input) {
        Ok((rest, mut tokens)) => {
            if !rest.is_empty() {
                tokens.push(FilterToken::Text(rest));
            }
            tokens
        }
        Err(_) => vec![FilterToken::Text(input)],
    }
}

fn reference(input: &str) -> IResult<&str, FilterToken<'_>> {
    map(
        delimited(char('"'), take_while(|c| c != '"'), char('"')),
        FilterToken::Reference,
    )(input)
}

/// Single-quoted SQL string, `''` being an escaped quote.
fn literal(input: &str) -> IResult<&str, FilterToken<'_>> {
    map(
        recognize(delimited(
            char('\''),
            many0(alt((tag("''"), is_not("'")))),
            char('\''),
        )),
        FilterToken::Literal,
    )(input)
}

fn text(input: &str) -> IResult<&str, FilterToken<'_>> {
    map(is_not("\"'"), FilterToken::Text)(input)
}

/// Target column to source column, in mapping order.
///
/// Lookups return the last mapping for a target, so a repeated target
/// shadows the earlier one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnLookup {
    entries: Vec<(String, String)>,
}

impl ColumnLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mapping. Returns `true` if the target was already mapped.
    pub fn insert(&mut self, target: impl Into<String>, source: impl Into<String>) -> bool {
        let target = target.into();
        let duplicate = self.entries.iter().any(|(t, _)| *t == target);
        self.entries.push((target, source.into()));
        duplicate
    }

    pub fn get(&self, target: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(t, _)| t == target)
            .map(|(_, s)| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of rewriting one filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenFilter {
    pub sql: String,
    /// Quoted references with no mapping, in first-seen order.
    pub unresolved: Vec<String>,
}

/// Rewrites quoted references of a filter into aliased SQL columns.
#[derive(Debug, Clone, Copy)]
pub struct FilterRewriter<'a> {
    date_function: &'a str,
    alias: &'a str,
    columns: &'a ColumnLookup,
}

impl<'a> FilterRewriter<'a> {
    pub fn new(date_function: &'a str, alias: &'a str, columns: &'a ColumnLookup) -> Self {
        Self {
            date_function,
            alias,
            columns,
        }
    }

    pub fn rewrite(&self, filter: &str) -> RewrittenFilter {
        let mut sql = String::with_capacity(filter.len());
        let mut unresolved: Vec<String> = Vec::new();

        for token in tokenize(filter) {
            match token {
                FilterToken::Reference(name) if name == TODAY => sql.push_str(self.date_function),
                FilterToken::Reference(name) => match self.columns.get(name) {
                    Some(source) => {
                        sql.push_str(self.alias);
                        sql.push('.');
                        sql.push_str(source);
                    }
                    None => {
                        if !name.is_empty() && !unresolved.iter().any(|u| u == name) {
                            unresolved.push(name.to_string());
                        }
                        sql.push('"');
                        sql.push_str(name);
                        sql.push('"');
                    }
                },
                FilterToken::Literal(s) | FilterToken::Text(s) => sql.push_str(s),
            }
        }

        RewrittenFilter {
            sql: sql.trim().to_string(),
            unresolved,
        }
    }
}
