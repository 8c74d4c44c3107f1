use std::fmt;

use crate::model::CanonicalProblem;
use crate::transform::MIN_DESCRIPTION_CHARS;

pub const MAX_TITLE_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    Missing(&'static str),
    DescriptionTooShort(usize),
    TitleTooLong(usize),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Missing(field) => write!(f, "missing {}", field),
            Violation::DescriptionTooShort(n) => write!(
                f,
                "description too short: {} chars (minimum {})",
                n, MIN_DESCRIPTION_CHARS
            ),
            Violation::TitleTooLong(n) => {
                write!(f, "title too long: {} chars (maximum {})", n, MAX_TITLE_CHARS)
            }
        }
    }
}

/// Every rule is checked; the result lists all violations in rule order.
pub fn validate(problem: &CanonicalProblem) -> Vec<Violation> {
    let mut violations = Vec::new();

    for (field, value) in [
        ("title", &problem.title),
        ("description", &problem.description),
        ("externalId", &problem.external_id),
    ] {
        if value.trim().is_empty() {
            violations.push(Violation::Missing(field));
        }
    }

    let description_len = problem.description.chars().count();
    if description_len < MIN_DESCRIPTION_CHARS {
        violations.push(Violation::DescriptionTooShort(description_len));
    }

    let title_len = problem.title.chars().count();
    if title_len > MAX_TITLE_CHARS {
        violations.push(Violation::TitleTooLong(title_len));
    }

    violations
}

pub fn describe(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, Difficulty, Source};

    fn record() -> CanonicalProblem {
        CanonicalProblem {
            title: "Watermelon".into(),
            description: "d".repeat(MIN_DESCRIPTION_CHARS),
            difficulty: Difficulty::Easy,
            tags: vec![],
            category: Category::Algorithm,
            time_limit: 1000,
            memory_limit: 64,
            input_format: String::new(),
            output_format: String::new(),
            examples: vec![],
            visible_test_cases: vec![],
            hidden_test_cases: vec![],
            constraints: vec![],
            hints: vec![],
            statistics: None,
            source: Source::Codeforces,
            source_url: "https://codeforces.com/problemset/problem/4/A".into(),
            external_id: "codeforces_4A".into(),
            is_public: true,
            is_active: true,
            is_verified: false,
            created_by: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn valid_record_has_no_violations() {
        assert!(validate(&record()).is_empty());
    }

    #[test]
    fn accumulates_all_violations() {
        let mut r = record();
        r.title = "t".repeat(MAX_TITLE_CHARS + 1);
        r.description = String::new();
        r.external_id = "  ".into();

        assert_eq!(
            validate(&r),
            vec![
                Violation::Missing("description"),
                Violation::Missing("externalId"),
                Violation::DescriptionTooShort(0),
                Violation::TitleTooLong(201),
            ]
        );
    }

    #[test]
    fn boundary_lengths() {
        let mut r = record();
        r.title = "t".repeat(MAX_TITLE_CHARS);
        r.description = "d".repeat(MIN_DESCRIPTION_CHARS - 1);
        assert_eq!(validate(&r), vec![Violation::DescriptionTooShort(499)]);
    }

    #[test]
    fn messages_are_joined() {
        let text = describe(&[Violation::Missing("title"), Violation::TitleTooLong(300)]);
        assert_eq!(text, "missing title, title too long: 300 chars (maximum 200)");
    }
}
