//! Tagged text serialization for curve trees.
//!
//! Every level writes a short type tag, a child count, then
//! `(index, child)` pairs. Tokens are separated by whitespace and each
//! token is followed by a single space, so dumps of nested levels can be
//! concatenated without extra framing:
//!
//! ```text
//! SCurve 2 0.25 SCE 3 7 0.5 SCE 9 1
//! ```
//!
//! Restoring parses into a fresh value and only replaces the target once
//! the whole structure has been read, so malformed input never leaves a
//! half-restored tree behind.

use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::io::{Read, Write};
use std::iter::Peekable;
use std::str::{FromStr, SplitAsciiWhitespace};

/// Whitespace tokenizer over dump text.
pub struct TokenReader<'a> {
    tokens: Peekable<SplitAsciiWhitespace<'a>>,
}

impl<'a> TokenReader<'a> {
    /// Creates a reader over the given text.
    #[must_use]
    pub fn new(input: &'a str) -> Self {
        Self {
            tokens: input.split_ascii_whitespace().peekable(),
        }
    }

    /// Returns the next token, failing if the input is exhausted.
    ///
    /// # Errors
    /// Returns [`Error::Format`] at end of input.
    pub fn next_token(&mut self, what: &str) -> Result<&'a str> {
        self.tokens
            .next()
            .ok_or_else(|| Error::Format(format!("unexpected end of input while reading {what}")))
    }

    /// Consumes a type tag and checks it.
    ///
    /// # Errors
    /// Returns [`Error::TagMismatch`] if the token differs from `tag`.
    pub fn expect_tag(&mut self, tag: &'static str) -> Result<()> {
        let found = self.next_token(tag)?;
        if found == tag {
            Ok(())
        } else {
            Err(Error::TagMismatch {
                expected: tag,
                found: found.to_string(),
            })
        }
    }

    /// Consumes and parses the next token.
    ///
    /// # Errors
    /// Returns [`Error::Format`] at end of input or if the token does not parse.
    pub fn parse<T: FromStr>(&mut self, what: &str) -> Result<T> {
        let token = self.next_token(what)?;
        token
            .parse()
            .map_err(|_| Error::Format(format!("invalid {what}: {token:?}")))
    }

    /// Returns true when no tokens remain.
    pub fn is_exhausted(&mut self) -> bool {
        self.tokens.peek().is_none()
    }
}

/// A value with a tagged text representation.
pub trait Dump: Sized {
    /// Type tag written in front of this level.
    const TAG: &'static str;

    /// Appends the text representation to `out`.
    ///
    /// # Errors
    /// Propagates errors from the underlying formatter.
    fn write_dump<W: fmt::Write>(&self, out: &mut W) -> fmt::Result;

    /// Parses one value of this level from `tokens`.
    ///
    /// # Errors
    /// Returns a format error for a wrong tag, a malformed number, or
    /// truncated input.
    fn read_dump(tokens: &mut TokenReader<'_>) -> Result<Self>;

    /// Returns the text representation.
    fn to_dump(&self) -> String {
        let mut out = String::new();
        // Formatting into a String does not fail.
        self.write_dump(&mut out).map(|()| out).unwrap_or_default()
    }

    /// Writes the text representation to an I/O sink.
    ///
    /// # Errors
    /// Returns an I/O error if the sink rejects the write.
    fn dump_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(self.to_dump().as_bytes())?;
        Ok(())
    }

    /// Parses a value from the start of `input`. Trailing tokens are ignored.
    ///
    /// # Errors
    /// See [`read_dump`](Self::read_dump).
    fn from_dump(input: &str) -> Result<Self> {
        let mut tokens = TokenReader::new(input);
        Self::read_dump(&mut tokens)
    }

    /// Replaces `self` with the value parsed from `input`.
    ///
    /// `self` is untouched if parsing fails.
    ///
    /// # Errors
    /// See [`read_dump`](Self::read_dump).
    fn restore(&mut self, input: &str) -> Result<()> {
        *self = Self::from_dump(input)?;
        Ok(())
    }

    /// Replaces `self` with the value read from an I/O source.
    ///
    /// # Errors
    /// Returns an I/O error if the source cannot be read, or a format error
    /// as for [`restore`](Self::restore).
    fn restore_from<R: Read>(&mut self, reader: &mut R) -> Result<()> {
        let mut input = String::new();
        reader.read_to_string(&mut input)?;
        self.restore(&input)
    }
}

/// Writes `tag count (index child)*` for an index-keyed level.
pub(crate) fn write_indexed<T: Dump, W: fmt::Write>(
    out: &mut W,
    tag: &str,
    children: &BTreeMap<usize, T>,
) -> fmt::Result {
    write!(out, "{tag} {} ", children.len())?;
    for (index, child) in children {
        write!(out, "{index} ")?;
        child.write_dump(out)?;
    }
    Ok(())
}

/// Reads an index-keyed level written by [`write_indexed`].
///
/// Indices at or above `limit` and repeated indices are rejected.
pub(crate) fn read_indexed<T: Dump>(
    tokens: &mut TokenReader<'_>,
    tag: &'static str,
    limit: Option<usize>,
) -> Result<BTreeMap<usize, T>> {
    tokens.expect_tag(tag)?;
    let count: usize = tokens.parse("child count")?;
    let mut children = BTreeMap::new();
    for _ in 0..count {
        let index: usize = tokens.parse("index")?;
        if let Some(limit) = limit {
            if index >= limit {
                return Err(Error::Format(format!(
                    "index {index} in {tag} exceeds limit {limit}"
                )));
            }
        }
        let child = T::read_dump(tokens)?;
        if children.insert(index, child).is_some() {
            return Err(Error::Format(format!("duplicate index {index} in {tag}")));
        }
    }
    Ok(children)
}
