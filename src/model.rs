use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    /// Capitalized form used in generated text ("Easy") and in the LeetCode
    /// list filter (after upper-casing).
    pub fn label(&self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty '{}' (expected easy, medium or hard)", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Dynamic Programming")]
    DynamicProgramming,
    #[serde(rename = "Graph Theory")]
    GraphTheory,
    #[serde(rename = "Data Structure")]
    DataStructure,
    Mathematics,
    #[serde(rename = "String Processing")]
    StringProcessing,
    Algorithm,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::DynamicProgramming => "Dynamic Programming",
            Category::GraphTheory => "Graph Theory",
            Category::DataStructure => "Data Structure",
            Category::Mathematics => "Mathematics",
            Category::StringProcessing => "String Processing",
            Category::Algorithm => "Algorithm",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Source {
    Codeforces,
    LeetCode,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Codeforces => "Codeforces",
            Source::LeetCode => "LeetCode",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_submissions: Option<u64>,
    pub accepted_submissions: Option<u64>,
    pub acceptance_rate: Option<f64>,
}

/// The normalized, source-agnostic problem record that gets persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalProblem {
    pub title: String,
    pub description: String,
    pub difficulty: Difficulty,
    pub tags: Vec<String>,
    pub category: Category,
    pub time_limit: u32,
    pub memory_limit: u32,
    pub input_format: String,
    pub output_format: String,
    pub examples: Vec<TestCase>,
    pub visible_test_cases: Vec<TestCase>,
    pub hidden_test_cases: Vec<TestCase>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<Statistics>,
    pub source: Source,
    pub source_url: String,
    pub external_id: String,
    pub is_public: bool,
    pub is_active: bool,
    pub is_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}
