//! Simplification levels and the instruction text each one maps to.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const ELI5_INSTRUCTIONS: &str =
    "Explain this like I'm 5 years old. Use very simple words, fun analogies, and short sentences.";
const ELI10_INSTRUCTIONS: &str =
    "Explain this like I'm 10 years old. Use simple language with relatable examples.";
const ELI15_INSTRUCTIONS: &str =
    "Explain this like I'm 15 years old. Be clear, avoid jargon, but include useful detail.";
const SUMMARY_INSTRUCTIONS: &str = "Provide a short, clear summary of this content.";

/// Audience profile for a generated explanation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimplificationLevel {
    #[default]
    Eli5,
    Eli10,
    Eli15,
    Summary,
}

impl SimplificationLevel {
    /// Resolve a caller-supplied tag. Missing or unrecognized tags fall back to `Eli5`.
    pub fn resolve(tag: Option<&str>) -> Self {
        tag.and_then(|t| t.parse().ok()).unwrap_or_default()
    }

    /// Fixed system instructions for this level.
    pub fn instructions(self) -> &'static str {
        match self {
            SimplificationLevel::Eli5 => ELI5_INSTRUCTIONS,
            SimplificationLevel::Eli10 => ELI10_INSTRUCTIONS,
            SimplificationLevel::Eli15 => ELI15_INSTRUCTIONS,
            SimplificationLevel::Summary => SUMMARY_INSTRUCTIONS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SimplificationLevel::Eli5 => "eli5",
            SimplificationLevel::Eli10 => "eli10",
            SimplificationLevel::Eli15 => "eli15",
            SimplificationLevel::Summary => "summary",
        }
    }
}

impl fmt::Display for SimplificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimplificationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "eli5" => Ok(SimplificationLevel::Eli5),
            "eli10" => Ok(SimplificationLevel::Eli10),
            "eli15" => Ok(SimplificationLevel::Eli15),
            "summary" => Ok(SimplificationLevel::Summary),
            _ => Err(format!("Unknown simplification level: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parsing() {
        assert_eq!("eli10".parse::<SimplificationLevel>().unwrap(), SimplificationLevel::Eli10);
        assert_eq!("SUMMARY".parse::<SimplificationLevel>().unwrap(), SimplificationLevel::Summary);
        assert!("eli99".parse::<SimplificationLevel>().is_err());
    }

    #[test]
    fn test_unrecognized_or_missing_tag_falls_back_to_eli5() {
        assert_eq!(SimplificationLevel::resolve(None), SimplificationLevel::Eli5);
        assert_eq!(SimplificationLevel::resolve(Some("phd")), SimplificationLevel::Eli5);
        assert_eq!(SimplificationLevel::resolve(Some("")), SimplificationLevel::Eli5);
        assert_eq!(SimplificationLevel::resolve(Some("gibberish")).instructions(), ELI5_INSTRUCTIONS);
    }

    #[test]
    fn test_each_level_has_distinct_instructions() {
        let levels = [
            SimplificationLevel::Eli5,
            SimplificationLevel::Eli10,
            SimplificationLevel::Eli15,
            SimplificationLevel::Summary,
        ];
        for (i, a) in levels.iter().enumerate() {
            assert_eq!(SimplificationLevel::resolve(Some(a.as_str())), *a);
            for b in &levels[i + 1..] {
                assert_ne!(a.instructions(), b.instructions());
            }
        }
    }
}
