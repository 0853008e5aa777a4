use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Beginner,
    Easy,
    Intermediate,
    Medium,
    Advanced,
    Hard,
}

impl Difficulty {
    /// Parses a difficulty tag from exercise metadata. Unknown tags fall back
    /// to the default rather than rejecting the exercise.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "beginner" => Difficulty::Beginner,
            "easy" => Difficulty::Easy,
            "intermediate" => Difficulty::Intermediate,
            "medium" => Difficulty::Medium,
            "advanced" => Difficulty::Advanced,
            "hard" => Difficulty::Hard,
            _ => Difficulty::default(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Easy => "easy",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Medium => "medium",
            Difficulty::Advanced => "advanced",
            Difficulty::Hard => "hard",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "Beginner",
            Difficulty::Easy => "Easy",
            Difficulty::Intermediate => "Intermediate",
            Difficulty::Medium => "Medium",
            Difficulty::Advanced => "Advanced",
            Difficulty::Hard => "Hard",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_tags() {
        assert_eq!(Difficulty::from_tag("Advanced"), Difficulty::Advanced);
        assert_eq!(Difficulty::from_tag(" easy "), Difficulty::Easy);
    }

    #[test]
    fn test_unknown_tag_falls_back() {
        assert_eq!(Difficulty::from_tag("legendary"), Difficulty::Beginner);
    }
}
