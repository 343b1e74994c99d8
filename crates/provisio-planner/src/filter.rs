//! LDAP-style environment filters.
//!
//! Units and requirements carry filter expressions like
//! `(&(osgi.os=linux)(!(osgi.arch=arm*)))` that gate their applicability on
//! environment properties. Evaluation is a pure function of the parsed
//! expression and a property map; there is no reflective lookup. Callers
//! treat a malformed expression as "evaluates false" and flag it.

use std::fmt;

use indexmap::IndexMap;
use thiserror::Error;

use crate::metadata::{InstallableUnit, Requirement};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("unexpected end of filter expression")]
    UnexpectedEnd,

    #[error("expected `{expected}` at position {position}")]
    Expected { expected: char, position: usize },

    #[error("empty attribute name at position {0}")]
    EmptyAttribute(usize),

    #[error("trailing input after filter expression at position {0}")]
    TrailingInput(usize),
}

/// A parsed filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    /// `(attr=value)`; the value may contain `*` wildcards.
    Equal { attr: String, pattern: String },
    /// `(attr>=value)`, numeric-aware.
    GreaterEq { attr: String, value: String },
    /// `(attr<=value)`, numeric-aware.
    LessEq { attr: String, value: String },
    /// `(attr=*)`: the attribute is present, whatever its value.
    Present { attr: String },
}

impl Filter {
    pub fn parse(input: &str) -> Result<Self, FilterError> {
        let mut parser = Parser {
            bytes: input.as_bytes(),
            pos: 0,
        };
        parser.skip_whitespace();
        let filter = parser.parse_filter()?;
        parser.skip_whitespace();
        if parser.pos != parser.bytes.len() {
            return Err(FilterError::TrailingInput(parser.pos));
        }
        Ok(filter)
    }

    /// Evaluate against a property map. Absent attributes never match.
    pub fn matches(&self, properties: &IndexMap<String, String>) -> bool {
        match self {
            Filter::And(children) => children.iter().all(|c| c.matches(properties)),
            Filter::Or(children) => children.iter().any(|c| c.matches(properties)),
            Filter::Not(child) => !child.matches(properties),
            Filter::Equal { attr, pattern } => properties
                .get(attr)
                .is_some_and(|value| wildcard_match(pattern, value)),
            Filter::GreaterEq { attr, value } => properties
                .get(attr)
                .is_some_and(|actual| compare(actual, value) >= std::cmp::Ordering::Equal),
            Filter::LessEq { attr, value } => properties
                .get(attr)
                .is_some_and(|actual| compare(actual, value) <= std::cmp::Ordering::Equal),
            Filter::Present { attr } => properties.contains_key(attr),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(children) => {
                write!(f, "(&")?;
                for child in children {
                    write!(f, "{child}")?;
                }
                write!(f, ")")
            }
            Filter::Or(children) => {
                write!(f, "(|")?;
                for child in children {
                    write!(f, "{child}")?;
                }
                write!(f, ")")
            }
            Filter::Not(child) => write!(f, "(!{child})"),
            Filter::Equal { attr, pattern } => write!(f, "({attr}={pattern})"),
            Filter::GreaterEq { attr, value } => write!(f, "({attr}>={value})"),
            Filter::LessEq { attr, value } => write!(f, "({attr}<={value})"),
            Filter::Present { attr } => write!(f, "({attr}=*)"),
        }
    }
}

/// Compare two values numerically when both parse as numbers, otherwise
/// byte-wise.
fn compare(left: &str, right: &str) -> std::cmp::Ordering {
    match (left.trim().parse::<f64>(), right.trim().parse::<f64>()) {
        (Ok(l), Ok(r)) => l.partial_cmp(&r).unwrap_or(std::cmp::Ordering::Equal),
        _ => left.cmp(right),
    }
}

/// Match a pattern containing `*` wildcards against a value.
fn wildcard_match(pattern: &str, value: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == value;
    }

    let segments: Vec<&str> = pattern.split('*').collect();
    let mut remainder = value;

    // First segment is anchored at the start, last at the end.
    let first = segments[0];
    if !remainder.starts_with(first) {
        return false;
    }
    remainder = &remainder[first.len()..];

    let last = segments[segments.len() - 1];
    for segment in &segments[1..segments.len() - 1] {
        if segment.is_empty() {
            continue;
        }
        match remainder.find(segment) {
            Some(idx) => remainder = &remainder[idx + segment.len()..],
            None => return false,
        }
    }

    remainder.ends_with(last) && (segments.len() == 1 || remainder.len() >= last.len())
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn skip_whitespace(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn expect(&mut self, expected: u8) -> Result<(), FilterError> {
        match self.peek() {
            Some(b) if b == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(_) => Err(FilterError::Expected {
                expected: expected as char,
                position: self.pos,
            }),
            None => Err(FilterError::UnexpectedEnd),
        }
    }

    fn parse_filter(&mut self) -> Result<Filter, FilterError> {
        self.expect(b'(')?;
        self.skip_whitespace();

        let filter = match self.peek() {
            Some(b'&') => {
                self.pos += 1;
                Filter::And(self.parse_children()?)
            }
            Some(b'|') => {
                self.pos += 1;
                Filter::Or(self.parse_children()?)
            }
            Some(b'!') => {
                self.pos += 1;
                self.skip_whitespace();
                Filter::Not(Box::new(self.parse_filter()?))
            }
            Some(_) => self.parse_comparison()?,
            None => return Err(FilterError::UnexpectedEnd),
        };

        self.skip_whitespace();
        self.expect(b')')?;
        Ok(filter)
    }

    fn parse_children(&mut self) -> Result<Vec<Filter>, FilterError> {
        let mut children = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b'(') => children.push(self.parse_filter()?),
                Some(b')') => return Ok(children),
                Some(_) => {
                    return Err(FilterError::Expected {
                        expected: '(',
                        position: self.pos,
                    })
                }
                None => return Err(FilterError::UnexpectedEnd),
            }
        }
    }

    fn parse_comparison(&mut self) -> Result<Filter, FilterError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if matches!(b, b'=' | b'<' | b'>' | b'(' | b')') {
                break;
            }
            self.pos += 1;
        }

        let attr = std::str::from_utf8(&self.bytes[start..self.pos])
            .expect("attribute sliced on ascii boundaries")
            .trim()
            .to_string();
        if attr.is_empty() {
            return Err(FilterError::EmptyAttribute(start));
        }

        let make = |attr: String, value: String, op: u8| match op {
            b'>' => Filter::GreaterEq { attr, value },
            b'<' => Filter::LessEq { attr, value },
            _ if value == "*" => Filter::Present { attr },
            _ => Filter::Equal {
                attr,
                pattern: value,
            },
        };

        match self.peek() {
            Some(op @ (b'<' | b'>')) => {
                self.pos += 1;
                self.expect(b'=')?;
                let value = self.parse_value()?;
                Ok(make(attr, value, op))
            }
            Some(b'=') => {
                self.pos += 1;
                let value = self.parse_value()?;
                Ok(make(attr, value, b'='))
            }
            Some(_) => Err(FilterError::Expected {
                expected: '=',
                position: self.pos,
            }),
            None => Err(FilterError::UnexpectedEnd),
        }
    }

    fn parse_value(&mut self) -> Result<String, FilterError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == b')' || b == b'(' {
                break;
            }
            self.pos += 1;
        }
        if self.pos == self.bytes.len() {
            return Err(FilterError::UnexpectedEnd);
        }
        Ok(std::str::from_utf8(&self.bytes[start..self.pos])
            .expect("value sliced on ascii boundaries")
            .trim()
            .to_string())
    }
}

/// The property environment a planning call evaluates filters against:
/// profile properties overlaid with the provisioning context's overrides.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    properties: IndexMap<String, String>,
}

impl Environment {
    pub fn new(properties: IndexMap<String, String>) -> Self {
        Self { properties }
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn matches(&self, expression: &str) -> Result<bool, FilterError> {
        Ok(Filter::parse(expression)?.matches(&self.properties))
    }

    /// Whether a unit's applicability filter passes. `Err` means the
    /// expression is malformed; callers treat that as "does not pass".
    pub fn unit_passes(&self, unit: &InstallableUnit) -> Result<bool, FilterError> {
        match &unit.filter {
            None => Ok(true),
            Some(expr) => self.matches(expr),
        }
    }

    /// Whether a requirement is active in this environment. Inactive
    /// requirements are treated as always satisfied.
    pub fn requirement_active(&self, requirement: &Requirement) -> Result<bool, FilterError> {
        match &requirement.filter {
            None => Ok(true),
            Some(expr) => self.matches(expr),
        }
    }
}
