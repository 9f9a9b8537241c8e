//! Name canonicalization seam
//!
//! The normalizer never parses scientific names itself. It asks a
//! [`NameCanonicalizer`] for the authorship-stripped form and falls back to
//! the raw string when the canonicalizer returns `None`.

use dwca_common::Result;
use regex::Regex;

/// Strips authorship and year information from a scientific name
pub trait NameCanonicalizer {
    /// Canonical form of `name`, or `None` if the name cannot be parsed
    fn canonicalize(&self, name: &str) -> Option<String>;
}

impl<F> NameCanonicalizer for F
where
    F: Fn(&str) -> Option<String>,
{
    fn canonicalize(&self, name: &str) -> Option<String> {
        self(name)
    }
}

/// Returns every name unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct VerbatimCanonicalizer;

impl NameCanonicalizer for VerbatimCanonicalizer {
    fn canonicalize(&self, name: &str) -> Option<String> {
        let name = name.trim();
        (!name.is_empty()).then(|| name.to_string())
    }
}

const AUTHOR_PARTICLES: &[&str] = &[
    "d", "da", "de", "del", "della", "den", "der", "des", "di", "dos", "du", "ex", "et", "in", "la",
    "le", "ter", "van", "von", "zu",
];

/// Token-based uninomial, binomial and trinomial extraction
///
/// Keeps the genus (or uninomial) and up to two epithets. Rank markers
/// (`subsp.`, `var.`, ...), hybrid signs and parenthesised subgenera are
/// dropped; the first capitalised or numeric token after the genus starts
/// the authorship and ends the name.
#[derive(Debug, Clone)]
pub struct BasicCanonicalizer {
    genus: Regex,
    subgenus: Regex,
    epithet: Regex,
    rank_marker: Regex,
}

impl BasicCanonicalizer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            genus: Regex::new(r"^\p{Lu}[\p{Ll}\-]+$")?,
            subgenus: Regex::new(r"^\(\p{Lu}[\p{Ll}\-]+\)$")?,
            epithet: Regex::new(r"^\p{Ll}[\p{Ll}\-]+$")?,
            rank_marker: Regex::new(
                r"^(?i:subsp|ssp|var|subvar|f|forma|fo|subf|morph|cv|nothosubsp|nothovar)\.?$",
            )?,
        })
    }

    fn is_hybrid_sign(token: &str) -> bool {
        token == "×" || token == "x"
    }
}

impl NameCanonicalizer for BasicCanonicalizer {
    fn canonicalize(&self, name: &str) -> Option<String> {
        let mut tokens = name.split_whitespace();
        let mut first = tokens.next()?;
        if Self::is_hybrid_sign(first) {
            first = tokens.next()?;
        }
        if !self.genus.is_match(first) {
            return None;
        }

        let mut parts = vec![first];
        for token in tokens {
            if parts.len() == 3 {
                break;
            }
            if self.subgenus.is_match(token)
                || self.rank_marker.is_match(token)
                || Self::is_hybrid_sign(token)
            {
                continue;
            }
            if self.epithet.is_match(token) && !AUTHOR_PARTICLES.contains(&token) {
                parts.push(token);
                continue;
            }
            break;
        }

        Some(parts.join(" "))
    }
}
