//! Typed views of the rows stored by each resource.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sign topic a learning video belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "greetings")]
    Greetings,
    #[serde(rename = "alphabets")]
    Alphabets,
    #[serde(rename = "numbers")]
    Numbers,
    #[serde(rename = "colors")]
    Colors,
    #[serde(rename = "animals")]
    Animals,
    #[serde(rename = "emotions")]
    Emotions,
    #[serde(rename = "food")]
    Food,
    #[serde(rename = "transportation")]
    Transportation,
    #[serde(rename = "body parts")]
    BodyParts,
    #[serde(rename = "shapes")]
    Shapes,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Greetings,
        Category::Alphabets,
        Category::Numbers,
        Category::Colors,
        Category::Animals,
        Category::Emotions,
        Category::Food,
        Category::Transportation,
        Category::BodyParts,
        Category::Shapes,
    ];

    /// Stored values, in the order the admin screens list them
    pub const ALL_NAMES: &'static [&'static str] = &[
        "greetings",
        "alphabets",
        "numbers",
        "colors",
        "animals",
        "emotions",
        "food",
        "transportation",
        "body parts",
        "shapes",
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Greetings => "greetings",
            Category::Alphabets => "alphabets",
            Category::Numbers => "numbers",
            Category::Colors => "colors",
            Category::Animals => "animals",
            Category::Emotions => "emotions",
            Category::Food => "food",
            Category::Transportation => "transportation",
            Category::BodyParts => "body parts",
            Category::Shapes => "shapes",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| format!("Unknown category: '{}'", s))
    }
}

/// Which of the two options answers a practice question.
///
/// Persisted as the literal integer 1 or 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum CorrectOption {
    First,
    Second,
}

impl TryFrom<i64> for CorrectOption {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(CorrectOption::First),
            2 => Ok(CorrectOption::Second),
            other => Err(format!("correct answer option must be 1 or 2, got {}", other)),
        }
    }
}

impl From<CorrectOption> for i64 {
    fn from(value: CorrectOption) -> Self {
        match value {
            CorrectOption::First => 1,
            CorrectOption::Second => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningEntry {
    pub id: i64,
    pub category: Category,
    pub label: String,
    pub label_image: Option<String>,
    pub video_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PracticeQuestion {
    pub id: i64,
    pub question: String,
    pub question_video_url: Option<String>,
    pub option1: String,
    pub option1_image: Option<String>,
    pub option2: String,
    pub option2_image: Option<String>,
    pub correct_answer_option: CorrectOption,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub points: i64,
    pub streak: i64,
    pub sings: i64,
    pub practice_score: i64,
}
