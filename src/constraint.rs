//! Parse-time constraints and their translation into lattice constraint marks.

use std::ffi::CString;

use regex::Regex;

use crate::constants::{MECAB_INSIDE_TOKEN, MECAB_TOKEN_BOUNDARY};
use crate::encoding::EncodingBridge;
use crate::error::{MecabError, Result};

/// Pattern whose matches are analyzed as single indivisible morphemes.
#[derive(Debug, Clone)]
pub struct BoundaryPattern {
    pattern: Regex,
}

impl BoundaryPattern {
    /// Compiles a regular expression pattern.
    pub fn regex(pattern: &str) -> Result<Self> {
        let compiled = Regex::new(pattern).map_err(|error| {
            MecabError::InvalidConstraint(format!("invalid boundary pattern: {error}"))
        })?;
        Self::from_regex(compiled)
    }

    /// Promotes a literal substring to an exact-match rule.
    pub fn literal(literal: &str) -> Result<Self> {
        if literal.is_empty() {
            return Err(MecabError::InvalidConstraint(
                "boundary literal must not be empty".to_string(),
            ));
        }
        Self::regex(&regex::escape(literal))
    }

    /// Wraps an already compiled regular expression.
    pub fn from_regex(pattern: Regex) -> Result<Self> {
        if pattern.is_match("") {
            return Err(MecabError::InvalidConstraint(format!(
                "boundary pattern {:?} matches the empty string",
                pattern.as_str()
            )));
        }
        Ok(Self { pattern })
    }

    /// Source text of the compiled pattern.
    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }
}

/// Constraint applied to a single `parse_to_nodes` call.
///
/// Boundary and feature constraints are exclusive: a call carries at most one
/// of them.
#[derive(Debug, Clone)]
pub enum Constraint {
    /// Every match of the pattern becomes one morpheme.
    Boundary(BoundaryPattern),
    /// Ordered `(literal, feature)` pairs; earlier pairs win on a tie.
    Features(Vec<(String, String)>),
}

impl Constraint {
    /// Boundary constraint from a regular expression.
    ///
    /// ```
    /// use mecab_rs::Constraint;
    ///
    /// assert!(Constraint::boundary(r"\d+").is_ok());
    /// assert!(Constraint::boundary(r"\d*").is_err());
    /// ```
    pub fn boundary(pattern: &str) -> Result<Self> {
        BoundaryPattern::regex(pattern).map(Self::Boundary)
    }

    /// Boundary constraint from a literal substring.
    pub fn boundary_literal(literal: &str) -> Result<Self> {
        BoundaryPattern::literal(literal).map(Self::Boundary)
    }

    /// Feature constraint from ordered `(literal, feature)` pairs.
    pub fn features<I, L, F>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (L, F)>,
        L: Into<String>,
        F: Into<String>,
    {
        let pairs: Vec<(String, String)> = pairs
            .into_iter()
            .map(|(literal, feature)| (literal.into(), feature.into()))
            .collect();
        validate_features(&pairs)?;
        Ok(Self::Features(pairs))
    }
}

fn validate_features(pairs: &[(String, String)]) -> Result<()> {
    if pairs.is_empty() {
        return Err(MecabError::InvalidConstraint(
            "feature constraint list must not be empty".to_string(),
        ));
    }
    for (literal, feature) in pairs {
        if literal.is_empty() {
            return Err(MecabError::InvalidConstraint(
                "feature constraint literal must not be empty".to_string(),
            ));
        }
        if feature.is_empty() {
            return Err(MecabError::InvalidConstraint(format!(
                "feature for {literal:?} must not be empty"
            )));
        }
    }
    Ok(())
}

/// Span of the constrained sentence forced to carry `feature`.
#[derive(Debug)]
pub(crate) struct FeatureMark {
    pub(crate) begin: usize,
    pub(crate) end: usize,
    pub(crate) feature: CString,
}

/// Encoded sentence plus the lattice constraints to apply before parsing.
///
/// The engine keeps pointers into both the sentence and the feature strings,
/// so the request must outlive the analysis and its node walk.
#[derive(Debug)]
pub(crate) struct ConstrainedRequest {
    sentence: Vec<u8>,
    pub(crate) boundaries: Vec<(usize, i32)>,
    pub(crate) features: Vec<FeatureMark>,
}

enum Span<'t> {
    Plain(&'t str),
    Boundary(&'t str),
    Feature(&'t str, &'t str),
}

impl ConstrainedRequest {
    /// Builds the request for `text`, applying `constraint` when given.
    pub(crate) fn build(
        text: &str,
        constraint: Option<&Constraint>,
        bridge: &EncodingBridge,
    ) -> Result<Self> {
        let spans = match constraint {
            None => vec![Span::Plain(text)],
            Some(Constraint::Boundary(pattern)) => boundary_spans(text, pattern)?,
            Some(Constraint::Features(pairs)) => {
                validate_features(pairs)?;
                feature_spans(text, pairs)
            }
        };

        // Offsets are counted in the dictionary charset, so each span is
        // encoded on its own.
        let mut sentence = Vec::with_capacity(text.len() + 1);
        let mut boundaries = Vec::new();
        let mut features = Vec::new();
        for span in spans {
            match span {
                Span::Plain(chunk) => {
                    sentence.extend_from_slice(&bridge.to_engine_bytes(chunk)?);
                }
                Span::Boundary(chunk) => {
                    let begin = sentence.len();
                    sentence.extend_from_slice(&bridge.to_engine_bytes(chunk)?);
                    let end = sentence.len();
                    boundaries.push((begin, MECAB_TOKEN_BOUNDARY));
                    boundaries.extend((begin + 1..end).map(|pos| (pos, MECAB_INSIDE_TOKEN)));
                    boundaries.push((end, MECAB_TOKEN_BOUNDARY));
                }
                Span::Feature(chunk, feature) => {
                    let begin = sentence.len();
                    sentence.extend_from_slice(&bridge.to_engine_bytes(chunk)?);
                    let end = sentence.len();
                    let feature = CString::new(bridge.to_engine_bytes(feature)?.into_owned())?;
                    features.push(FeatureMark {
                        begin,
                        end,
                        feature,
                    });
                }
            }
        }
        sentence.push(0);

        Ok(Self {
            sentence,
            boundaries,
            features,
        })
    }

    /// Encoded sentence without the trailing terminator.
    pub(crate) fn sentence(&self) -> &[u8] {
        &self.sentence[..self.sentence.len() - 1]
    }

    pub(crate) fn is_constrained(&self) -> bool {
        !self.boundaries.is_empty() || !self.features.is_empty()
    }
}

fn boundary_spans<'t>(text: &'t str, pattern: &BoundaryPattern) -> Result<Vec<Span<'t>>> {
    let mut spans = Vec::new();
    let mut cursor = 0;
    for found in pattern.pattern.find_iter(text) {
        if found.start() == found.end() {
            return Err(MecabError::InvalidConstraint(format!(
                "boundary pattern {:?} matched an empty span at byte {}",
                pattern.as_str(),
                found.start()
            )));
        }
        if cursor < found.start() {
            spans.push(Span::Plain(&text[cursor..found.start()]));
        }
        spans.push(Span::Boundary(found.as_str()));
        cursor = found.end();
    }
    if cursor < text.len() {
        spans.push(Span::Plain(&text[cursor..]));
    }
    Ok(spans)
}

fn feature_spans<'t>(text: &'t str, pairs: &'t [(String, String)]) -> Vec<Span<'t>> {
    let mut spans = Vec::new();
    let mut plain_start = 0;
    let mut cursor = 0;
    while cursor < text.len() {
        let rest = &text[cursor..];
        let hit = pairs
            .iter()
            .find(|(literal, _)| rest.starts_with(literal.as_str()));
        match hit {
            Some((literal, feature)) => {
                if plain_start < cursor {
                    spans.push(Span::Plain(&text[plain_start..cursor]));
                }
                let end = cursor + literal.len();
                spans.push(Span::Feature(&text[cursor..end], feature.as_str()));
                cursor = end;
                plain_start = end;
            }
            None => {
                cursor += rest.chars().next().map_or(1, char::len_utf8);
            }
        }
    }
    if plain_start < text.len() {
        spans.push(Span::Plain(&text[plain_start..]));
    }
    spans
}
