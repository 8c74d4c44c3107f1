use thiserror::Error;
use tracing::debug;

use crate::model::{CanonicalProblem, Category, Difficulty, Source, Statistics, TestCase};
use crate::parser::codeforces::{ExtractedFields, DEFAULT_MEMORY_LIMIT_MB, DEFAULT_TIME_LIMIT_MS};
use crate::parser::{markdown, segments};
use crate::sources::codeforces::{problem_url as codeforces_url, ApiProblem, ApiStatistics};
use crate::sources::leetcode::{problem_url as leetcode_url, QuestionDetail};

pub const MIN_DESCRIPTION_CHARS: usize = 500;
pub const MAX_EXAMPLES: usize = 3;

const FILLER: &str = "\n\nThis is a programming challenge that tests your problem-solving skills.";
const SEE_CODEFORCES: &str = "See problem on Codeforces";
const SEE_DESCRIPTION: &str = "See problem description";

/// Ordered: the first rule with a matching tag wins.
const CATEGORY_RULES: &[(Category, &[&str])] = &[
    (Category::DynamicProgramming, &["dynamic programming", "dp"]),
    (Category::GraphTheory, &["graph", "tree", "dfs", "bfs"]),
    (
        Category::DataStructure,
        &["array", "hash table", "stack", "queue", "data structures", "dsu", "segment tree"],
    ),
    (Category::Mathematics, &["math", "geometry", "number theory", "combinatorics"]),
    (Category::StringProcessing, &["string", "strings"]),
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Rejected {
    #[error("not a programming problem (type {0})")]
    NotProgramming(String),
    #[error("no stable id (missing contest id, index or slug)")]
    MissingId,
    #[error("paid-only question")]
    PaidOnly,
}

// ── Shared rules ──

pub fn difficulty_for_rating(rating: Option<i32>) -> Difficulty {
    match rating {
        None => Difficulty::Medium,
        Some(r) if r < 1200 => Difficulty::Easy,
        Some(r) if r <= 1600 => Difficulty::Medium,
        Some(_) => Difficulty::Hard,
    }
}

pub fn infer_category(tags: &[String]) -> Category {
    let lowered: Vec<String> = tags.iter().map(|t| t.to_lowercase()).collect();
    CATEGORY_RULES
        .iter()
        .find(|(_, keywords)| {
            lowered
                .iter()
                .any(|tag| keywords.iter().any(|k| tag.contains(k)))
        })
        .map(|(category, _)| *category)
        .unwrap_or(Category::Algorithm)
}

/// Pads a short description to `MIN_DESCRIPTION_CHARS`: a generated header and
/// footer around the text, then filler sentences. Text already long enough is
/// returned unchanged.
pub fn backfill_description(
    text: &str,
    title: &str,
    difficulty: Difficulty,
    source: Source,
    source_url: &str,
) -> String {
    if char_len(text) >= MIN_DESCRIPTION_CHARS {
        return text.to_string();
    }

    let mut out = format!(
        "# {}\n\n**Difficulty**: {}\n\n**Source**: {}\n\n## Problem Statement\n\n{}",
        title,
        difficulty.label(),
        source,
        text
    );
    out.push_str(&format!(
        "\n\n## Notes\n\nThis problem was imported from {src}. For the most up-to-date version \
         and additional test cases, please visit the problem on {src}: {url}",
        src = source,
        url = source_url
    ));
    while char_len(&out) < MIN_DESCRIPTION_CHARS {
        out.push_str(FILLER);
    }
    out
}

/// Drops repeated tags, keeping first occurrences in source order.
pub fn dedup_tags(tags: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim().to_string();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn first_examples(cases: &[TestCase]) -> Vec<TestCase> {
    cases.iter().take(MAX_EXAMPLES).cloned().collect()
}

// ── Codeforces ──

pub fn codeforces_external_id(key: &str) -> String {
    format!("codeforces_{}", key)
}

/// Contest id and index of an importable problem. Checked before the
/// problem page is fetched.
pub fn codeforces_identity(problem: &ApiProblem) -> Result<(i64, &str), Rejected> {
    let kind = problem.kind.as_deref().unwrap_or("PROGRAMMING");
    if kind != "PROGRAMMING" {
        return Err(Rejected::NotProgramming(kind.to_string()));
    }
    match (problem.contest_id, problem.index.as_deref()) {
        (Some(c), Some(i)) if !i.trim().is_empty() => Ok((c, i)),
        _ => Err(Rejected::MissingId),
    }
}

/// Builds the canonical record from API metadata, enriched with the problem
/// page when it was fetched.
pub fn codeforces_problem(
    problem: &ApiProblem,
    stats: Option<&ApiStatistics>,
    page: Option<ExtractedFields>,
) -> Result<CanonicalProblem, Rejected> {
    let (contest_id, index) = codeforces_identity(problem)?;
    let key = format!("{}{}", contest_id, index);
    let source_url = codeforces_url(contest_id, index);

    let rating = problem.rating.or(page.as_ref().and_then(|p| p.rating));
    let difficulty = difficulty_for_rating(rating);
    let api_title = problem.name.trim();

    let (title, raw_tags, description, input_format, output_format, samples, time_ms, memory_mb) =
        match page {
            Some(page) => {
                let title = if api_title.is_empty() {
                    page.title
                } else {
                    api_title.to_string()
                };
                let tags = if problem.tags.is_empty() {
                    page.tags
                } else {
                    problem.tags.clone()
                };
                let description = if page.description.is_empty() {
                    generated_description(&title, &tags, rating, contest_id, index, &source_url)
                } else {
                    page.description
                };
                (
                    title,
                    tags,
                    description,
                    non_empty_or(page.input_format, SEE_CODEFORCES),
                    non_empty_or(page.output_format, SEE_CODEFORCES),
                    page.sample_tests,
                    page.time_limit_ms,
                    page.memory_limit_mb,
                )
            }
            None => {
                let title = if api_title.is_empty() {
                    format!("Problem {}", key)
                } else {
                    api_title.to_string()
                };
                let description = generated_description(
                    &title,
                    &problem.tags,
                    rating,
                    contest_id,
                    index,
                    &source_url,
                );
                (
                    title,
                    problem.tags.clone(),
                    description,
                    SEE_CODEFORCES.to_string(),
                    SEE_CODEFORCES.to_string(),
                    Vec::new(),
                    DEFAULT_TIME_LIMIT_MS,
                    DEFAULT_MEMORY_LIMIT_MB,
                )
            }
        };

    let tags = dedup_tags(raw_tags);
    let category = infer_category(&tags);
    let description =
        backfill_description(&description, &title, difficulty, Source::Codeforces, &source_url);

    debug!("Transformed {}: {} ({}, {})", key, title, difficulty, category.as_str());
    Ok(CanonicalProblem {
        title,
        description,
        difficulty,
        tags,
        category,
        time_limit: time_ms,
        memory_limit: memory_mb,
        input_format,
        output_format,
        examples: first_examples(&samples),
        visible_test_cases: samples,
        hidden_test_cases: Vec::new(),
        constraints: Vec::new(),
        hints: Vec::new(),
        statistics: stats.map(|s| Statistics {
            total_submissions: None,
            accepted_submissions: Some(s.solved_count),
            acceptance_rate: None,
        }),
        source: Source::Codeforces,
        source_url,
        external_id: codeforces_external_id(&key),
        is_public: true,
        is_active: true,
        is_verified: false,
        created_by: None,
        created_at: None,
        updated_at: None,
    })
}

/// Description used when only API metadata is available.
fn generated_description(
    title: &str,
    tags: &[String],
    rating: Option<i32>,
    contest_id: i64,
    index: &str,
    source_url: &str,
) -> String {
    let tag_list = if tags.is_empty() {
        "none".to_string()
    } else {
        tags.join(", ")
    };
    let rating_text = rating.map_or_else(|| "unrated".to_string(), |r| r.to_string());

    let mut parts = vec![
        format!("# {}", title),
        String::new(),
        "## Problem Information".to_string(),
        String::new(),
        format!("- **Source**: Codeforces problem {}{}", contest_id, index),
        format!("- **Difficulty rating**: {}", rating_text),
        format!("- **Tags**: {}", tag_list),
        String::new(),
        "## Problem Statement".to_string(),
        String::new(),
        format!("This is problem {} from Codeforces contest {}.", index, contest_id),
    ];
    if let Some(r) = rating {
        parts.push(String::new());
        parts.push(match difficulty_for_rating(Some(r)) {
            Difficulty::Easy => "It is rated as an **easy** problem, suitable for beginners.",
            Difficulty::Medium => "It is rated as a **medium** difficulty problem.",
            Difficulty::Hard => "It is rated as a **hard** problem for experienced competitors.",
        }
        .to_string());
    }
    parts.extend([
        String::new(),
        "## Full Problem Statement".to_string(),
        String::new(),
        "The complete statement, input/output format, examples and constraints are available \
         on Codeforces:"
            .to_string(),
        String::new(),
        format!("[View problem on Codeforces]({})", source_url),
    ]);
    parts.join("\n")
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

// ── LeetCode ──

pub fn leetcode_external_id(slug: &str) -> String {
    format!("leetcode_{}", slug)
}

pub fn leetcode_problem(detail: &QuestionDetail) -> Result<CanonicalProblem, Rejected> {
    if detail.is_paid_only {
        return Err(Rejected::PaidOnly);
    }
    let slug = detail.title_slug.trim();
    if slug.is_empty() {
        return Err(Rejected::MissingId);
    }
    let source_url = leetcode_url(slug);
    let title = if detail.title.trim().is_empty() {
        slug.to_string()
    } else {
        detail.title.trim().to_string()
    };
    let difficulty = detail.difficulty();

    let content = markdown::convert_html(&detail.content);
    let segments::Segments {
        description,
        examples,
        constraints,
    } = segments::segment(&content);
    let description = if description.is_empty() { content } else { description };
    let description =
        backfill_description(&description, &title, difficulty, Source::LeetCode, &source_url);

    let tags = dedup_tags(detail.topic_tags.iter().map(|t| t.name.clone()));
    let category = infer_category(&tags);
    let hints: Vec<String> = detail
        .hints
        .iter()
        .map(|h| markdown::convert_html(h))
        .filter(|h| !h.is_empty())
        .collect();

    debug!("Transformed {}: {} ({}, {})", slug, title, difficulty, category.as_str());
    Ok(CanonicalProblem {
        title,
        description,
        difficulty,
        tags,
        category,
        time_limit: DEFAULT_TIME_LIMIT_MS,
        memory_limit: DEFAULT_MEMORY_LIMIT_MB,
        input_format: SEE_DESCRIPTION.to_string(),
        output_format: SEE_DESCRIPTION.to_string(),
        examples: first_examples(&examples),
        visible_test_cases: examples,
        hidden_test_cases: Vec::new(),
        constraints,
        hints,
        statistics: detail.statistics(),
        source: Source::LeetCode,
        source_url,
        external_id: leetcode_external_id(slug),
        is_public: true,
        is_active: true,
        is_verified: false,
        created_by: None,
        created_at: None,
        updated_at: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::leetcode::TopicTag;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn api_problem(rating: Option<i32>, tag_list: &[&str]) -> ApiProblem {
        ApiProblem {
            contest_id: Some(4),
            index: Some("A".into()),
            name: "Watermelon".into(),
            kind: Some("PROGRAMMING".into()),
            rating,
            tags: tags(tag_list),
        }
    }

    #[test]
    fn difficulty_boundaries() {
        assert_eq!(difficulty_for_rating(None), Difficulty::Medium);
        assert_eq!(difficulty_for_rating(Some(800)), Difficulty::Easy);
        assert_eq!(difficulty_for_rating(Some(1199)), Difficulty::Easy);
        assert_eq!(difficulty_for_rating(Some(1200)), Difficulty::Medium);
        assert_eq!(difficulty_for_rating(Some(1600)), Difficulty::Medium);
        assert_eq!(difficulty_for_rating(Some(1601)), Difficulty::Hard);
        assert_eq!(difficulty_for_rating(Some(3500)), Difficulty::Hard);
    }

    #[test]
    fn category_first_rule_wins() {
        assert_eq!(infer_category(&tags(&["graph", "dp"])), Category::DynamicProgramming);
        assert_eq!(infer_category(&tags(&["Hash Table", "Math"])), Category::DataStructure);
        assert_eq!(infer_category(&tags(&["Binary Tree"])), Category::GraphTheory);
        assert_eq!(infer_category(&tags(&["number theory"])), Category::Mathematics);
        assert_eq!(infer_category(&tags(&["strings"])), Category::StringProcessing);
        assert_eq!(infer_category(&tags(&["greedy", "sortings"])), Category::Algorithm);
        assert_eq!(infer_category(&[]), Category::Algorithm);
    }

    #[test]
    fn backfill_meets_floor() {
        let out = backfill_description("", "T", Difficulty::Easy, Source::LeetCode, "u");
        assert!(out.chars().count() >= MIN_DESCRIPTION_CHARS);
        assert!(out.starts_with("# T\n\n**Difficulty**: Easy\n\n**Source**: LeetCode"));
        assert!(out.contains("This is a programming challenge"));

        let short = "Find the answer.";
        let out = backfill_description(short, "Sum", Difficulty::Hard, Source::Codeforces, "u");
        assert!(out.contains(short));
        assert!(out.chars().count() >= MIN_DESCRIPTION_CHARS);
    }

    #[test]
    fn backfill_leaves_long_text_alone() {
        let long = "x".repeat(MIN_DESCRIPTION_CHARS);
        let out = backfill_description(&long, "T", Difficulty::Medium, Source::Codeforces, "u");
        assert_eq!(out, long);

        let again = backfill_description(&out, "T", Difficulty::Medium, Source::Codeforces, "u");
        assert_eq!(again, out);
    }

    #[test]
    fn backfill_counts_characters_not_bytes() {
        // 250 two-byte characters: 500 bytes but only 250 chars.
        let text = "é".repeat(250);
        let out = backfill_description(&text, "T", Difficulty::Easy, Source::LeetCode, "u");
        assert_ne!(out, text);
    }

    #[test]
    fn rating_and_tags_drive_difficulty_and_category() {
        let problem = api_problem(Some(1600), &["dp"]);
        let record = codeforces_problem(&problem, None, None).unwrap();
        assert_eq!(record.difficulty, Difficulty::Medium);
        assert_eq!(record.category, Category::DynamicProgramming);
    }

    #[test]
    fn codeforces_without_page_uses_generated_text() {
        let stats = ApiStatistics {
            contest_id: Some(4),
            index: Some("A".into()),
            solved_count: 1000,
        };
        let record =
            codeforces_problem(&api_problem(Some(800), &["math", "math"]), Some(&stats), None)
                .unwrap();
        assert_eq!(record.external_id, "codeforces_4A");
        assert_eq!(record.source_url, "https://codeforces.com/problemset/problem/4/A");
        assert_eq!(record.tags, vec!["math"]);
        assert_eq!(record.input_format, "See problem on Codeforces");
        assert_eq!(record.time_limit, 2000);
        assert!(record.description.contains("contest 4"));
        assert!(record.description.chars().count() >= MIN_DESCRIPTION_CHARS);
        assert!(record.hidden_test_cases.is_empty());
        assert_eq!(record.statistics.unwrap().accepted_submissions, Some(1000));
        assert!(record.is_public && record.is_active && !record.is_verified);
    }

    #[test]
    fn codeforces_page_fields_win() {
        let samples: Vec<TestCase> = (1..=4)
            .map(|i| TestCase {
                input: i.to_string(),
                output: i.to_string(),
                explanation: Some(format!("Sample test {}", i)),
            })
            .collect();
        let page = ExtractedFields {
            title: "Watermelon".into(),
            time_limit_ms: 1000,
            memory_limit_mb: 64,
            description: "Pete and Billy".into(),
            input_format: "One integer w.".into(),
            output_format: String::new(),
            sample_tests: samples,
            tags: tags(&["brute force"]),
            rating: Some(800),
        };
        let record = codeforces_problem(&api_problem(None, &[]), None, Some(page)).unwrap();
        assert_eq!(record.time_limit, 1000);
        assert_eq!(record.memory_limit, 64);
        assert_eq!(record.difficulty, Difficulty::Easy);
        assert_eq!(record.tags, vec!["brute force"]);
        assert_eq!(record.input_format, "One integer w.");
        assert_eq!(record.output_format, "See problem on Codeforces");
        assert_eq!(record.examples.len(), MAX_EXAMPLES);
        assert_eq!(record.visible_test_cases.len(), 4);
        assert!(record.description.contains("Pete and Billy"));
    }

    #[test]
    fn codeforces_rejections() {
        let mut quiz = api_problem(Some(800), &[]);
        quiz.kind = Some("QUESTION".into());
        assert_eq!(
            codeforces_problem(&quiz, None, None),
            Err(Rejected::NotProgramming("QUESTION".into()))
        );

        let mut no_index = api_problem(Some(800), &[]);
        no_index.index = None;
        assert_eq!(codeforces_problem(&no_index, None, None), Err(Rejected::MissingId));
    }

    fn question(content: &str) -> QuestionDetail {
        QuestionDetail {
            question_frontend_id: "1".into(),
            title: "Two Sum".into(),
            title_slug: "two-sum".into(),
            content: content.into(),
            difficulty: "Easy".into(),
            topic_tags: vec![
                TopicTag {
                    name: "Array".into(),
                    slug: "array".into(),
                },
                TopicTag {
                    name: "Hash Table".into(),
                    slug: "hash-table".into(),
                },
            ],
            hints: vec!["Try a <b>map</b>.".into()],
            ..Default::default()
        }
    }

    #[test]
    fn leetcode_content_is_segmented() {
        let detail = question(
            "<p>Find X</p>Example 1:\nInput: [1,2]\nOutput: 3\nConstraints:\n- 1<=n<=100",
        );
        let record = leetcode_problem(&detail).unwrap();
        assert_eq!(record.external_id, "leetcode_two-sum");
        assert_eq!(record.source_url, "https://leetcode.com/problems/two-sum/");
        assert_eq!(record.difficulty, Difficulty::Easy);
        assert_eq!(record.category, Category::DataStructure);
        assert!(record.description.contains("## Problem Statement\n\nFind X\n\n## Notes"));
        assert_eq!(record.examples[0].input, "[1,2]");
        assert_eq!(record.constraints, vec!["1<=n<=100"]);
        assert_eq!(record.hints, vec!["Try a **map**."]);
    }

    #[test]
    fn leetcode_rejections() {
        let mut paid = question("<p>x</p>");
        paid.is_paid_only = true;
        assert_eq!(leetcode_problem(&paid), Err(Rejected::PaidOnly));

        let mut no_slug = question("<p>x</p>");
        no_slug.title_slug = " ".into();
        assert_eq!(leetcode_problem(&no_slug), Err(Rejected::MissingId));
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let out = dedup_tags(tags(&["math", " dp ", "math", "", "dp"]));
        assert_eq!(out, vec!["math", "dp"]);
    }
}
