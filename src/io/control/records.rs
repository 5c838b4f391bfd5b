//! io::control::records — line filtering and typed field access.
//!
//! Purpose
//! -------
//! Turn control-file text into numbered, comment-free lines and offer typed
//! positional access to the whitespace-delimited fields of one record, with
//! every failure carrying the physical line number and the field name.
//!
//! Conventions
//! -----------
//! - Blank lines and lines starting with `#` or `++` are comments.
//! - Floating fields accept Fortran exponent markers (`1.0d-3`, `2D5`).
//! - Line numbers are 1-based physical line numbers.
use std::str::FromStr;

use crate::errors::{PestError, PestResult};

/// One non-comment line together with its 1-based physical line number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Line<'a> {
    pub number: usize,
    pub text: &'a str,
}

impl<'a> Line<'a> {
    /// True when the line opens a section (`* ...`).
    pub fn is_tag(&self) -> bool {
        self.text.trim_start().starts_with('*')
    }

    /// True when the line continues the previous prior-information record.
    pub fn is_continuation(&self) -> bool {
        self.text.trim_start().starts_with('&')
    }
}

/// Collect the non-comment lines of `text`.
pub(crate) fn content_lines(text: &str) -> Vec<Line<'_>> {
    text.lines()
        .enumerate()
        .filter(|(_, l)| !is_comment(l))
        .map(|(i, l)| Line { number: i + 1, text: l.trim_end() })
        .collect()
}

fn is_comment(line: &str) -> bool {
    let t = line.trim();
    t.is_empty() || t.starts_with('#') || t.starts_with("++")
}

/// Parse a floating field, accepting `d`/`D` as the exponent marker.
pub(crate) fn parse_f64(token: &str) -> Option<f64> {
    if let Ok(v) = token.parse::<f64>() {
        return Some(v);
    }
    token.replace(['d', 'D'], "e").parse::<f64>().ok()
}

/// Whitespace-split fields of one record.
#[derive(Debug, Clone)]
pub(crate) struct Record<'a> {
    line: usize,
    section: &'static str,
    tokens: Vec<&'a str>,
}

impl<'a> Record<'a> {
    pub fn new(line: Line<'a>, section: &'static str) -> Self {
        Record { line: line.number, section, tokens: line.text.split_whitespace().collect() }
    }

    /// Build a record from tokens spanning several physical lines.
    pub fn from_tokens(line: usize, section: &'static str, tokens: Vec<&'a str>) -> Self {
        Record { line, section, tokens }
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn tokens(&self) -> &[&'a str] {
        &self.tokens
    }

    /// Fail with `FieldCount` unless at least `n` fields are present.
    pub fn require(&self, n: usize) -> PestResult<()> {
        if self.tokens.len() < n {
            return Err(PestError::FieldCount {
                line: self.line,
                section: self.section,
                expected: n,
                found: self.tokens.len(),
            });
        }
        Ok(())
    }

    pub fn raw(&self, i: usize) -> Option<&'a str> {
        self.tokens.get(i).copied()
    }

    /// Lowercased field `i`; the caller has already checked the count.
    pub fn lower(&self, i: usize) -> String {
        self.tokens.get(i).map(|t| t.to_lowercase()).unwrap_or_default()
    }

    /// Integer-like field `i`.
    pub fn int<T: FromStr>(&self, i: usize, field: &'static str) -> PestResult<T> {
        self.require(i + 1)?;
        let tok = self.tokens[i];
        tok.parse::<T>().map_err(|_| self.type_error(field, tok))
    }

    /// Floating field `i`.
    pub fn float(&self, i: usize, field: &'static str) -> PestResult<f64> {
        self.require(i + 1)?;
        let tok = self.tokens[i];
        parse_f64(tok).ok_or_else(|| self.type_error(field, tok))
    }

    /// Optional integer-like field `i`; absent is `None`, malformed is an error.
    pub fn opt_int<T: FromStr>(&self, i: usize, field: &'static str) -> PestResult<Option<T>> {
        match self.tokens.get(i) {
            None => Ok(None),
            Some(tok) => tok.parse::<T>().map(Some).map_err(|_| self.type_error(field, tok)),
        }
    }

    /// Optional floating field `i`.
    pub fn opt_float(&self, i: usize, field: &'static str) -> PestResult<Option<f64>> {
        match self.tokens.get(i) {
            None => Ok(None),
            Some(tok) => parse_f64(tok).map(Some).ok_or_else(|| self.type_error(field, tok)),
        }
    }

    /// True when any field from `start` onward equals `keyword` (case-insensitive).
    pub fn has_keyword(&self, start: usize, keyword: &str) -> bool {
        self.tokens.iter().skip(start).any(|t| t.eq_ignore_ascii_case(keyword))
    }

    pub fn type_error(&self, field: &'static str, value: &str) -> PestError {
        PestError::FieldType { line: self.line, field, value: value.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_lines_skips_comments_and_keeps_physical_numbers() {
        let text = "pcf\n\n# note\n++ pest++ option\n* control data\n";

        let lines = content_lines(text);

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], Line { number: 5, text: "* control data" });
        assert!(lines[1].is_tag());
    }

    #[test]
    fn parse_f64_accepts_fortran_exponents() {
        assert_eq!(parse_f64("1.5d-3"), Some(1.5e-3));
        assert_eq!(parse_f64("2D2"), Some(200.0));
        assert_eq!(parse_f64("abc"), None);
    }

    #[test]
    fn typed_fields_report_line_and_field_name() {
        let rec = Record::new(Line { number: 7, text: "hk1 log x" }, "parameter data");

        let err = rec.float(2, "PARVAL1").unwrap_err();

        assert_eq!(err, PestError::FieldType { line: 7, field: "PARVAL1", value: "x".into() });
        assert_eq!(
            rec.require(4).unwrap_err(),
            PestError::FieldCount { line: 7, section: "parameter data", expected: 4, found: 3 }
        );
        assert_eq!(rec.opt_int::<i32>(5, "DERCOM").unwrap(), None);
    }
}
