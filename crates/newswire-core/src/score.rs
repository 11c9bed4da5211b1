use std::fmt;
use std::str::FromStr;

use snafu::Snafu;

/// Importance score on a 1..=10 scale.
#[cfg_attr(feature = "bincode", derive(::bincode::Encode, ::bincode::Decode))]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Importance(u8);

impl Importance {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;
    /// Used when the model could not produce a score.
    pub const NEUTRAL: Self = Self(5);

    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Self(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Importance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg_attr(feature = "bincode", derive(::bincode::Encode, ::bincode::Decode))]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum Audience {
    Developer,
    Investor,
    #[default]
    General,
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Audience::Developer => "Developer",
            Audience::Investor => "Investor",
            Audience::General => "General",
        })
    }
}

#[derive(Debug, Snafu)]
#[snafu(display("Unknown audience: {value}"))]
pub struct AudienceParseError {
    value: String,
}

impl FromStr for Audience {
    type Err = AudienceParseError;

    /// Accepts the first word of `s`, case-insensitively, ignoring
    /// punctuation around it ("developer.", "**Investor**").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let word = s
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        match word.as_str() {
            "developer" | "developers" => Ok(Audience::Developer),
            "investor" | "investors" => Ok(Audience::Investor),
            "general" => Ok(Audience::General),
            _ => AudienceParseSnafu { value: s.trim() }.fail(),
        }
    }
}

/// Where the importance score of a [`ScoreResult`] came from.
#[cfg_attr(feature = "bincode", derive(::bincode::Encode, ::bincode::Decode))]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ScoreSource {
    /// Returned by the language model.
    Model,
    /// The model call failed; the neutral default was substituted.
    Fallback,
}

#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScoreResult {
    pub importance: Importance,
    pub audience: Audience,
    /// Model-written post body; empty when unavailable.
    pub summary: String,
    pub source: ScoreSource,
}

impl ScoreResult {
    pub fn fallback() -> Self {
        Self {
            importance: Importance::NEUTRAL,
            audience: Audience::General,
            summary: String::new(),
            source: ScoreSource::Fallback,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.source == ScoreSource::Fallback
    }

    pub fn passes(&self, min_score: u8) -> bool {
        min_score <= self.importance.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn importance_range() {
        assert_eq!(Importance::new(0), None);
        assert_eq!(Importance::new(11), None);
        assert_eq!(Importance::new(10).map(Importance::get), Some(10));
    }

    #[test]
    fn audience_parses_loose_model_output() {
        assert_eq!("Developer".parse::<Audience>().ok(), Some(Audience::Developer));
        assert_eq!(" investors.\n".parse::<Audience>().ok(), Some(Audience::Investor));
        assert_eq!("**General** audience".parse::<Audience>().ok(), Some(Audience::General));
        assert!("everyone".parse::<Audience>().is_err());
    }

    #[test]
    fn fallback_is_neutral_and_tagged() {
        let r = ScoreResult::fallback();
        assert_eq!(r.importance, Importance::NEUTRAL);
        assert!(r.is_fallback());
        assert!(r.passes(5));
        assert!(!r.passes(6));
    }
}
