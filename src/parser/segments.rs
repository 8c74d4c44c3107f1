use std::sync::LazyLock;

use regex::Regex;

use crate::model::TestCase;

// Anchors tolerate Markdown bold around them ("**Example 1:**").
static EXAMPLE_ANCHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\**[ \t]*Example[ \t]*\d+[ \t]*:[ \t]*\**").unwrap());
static CONSTRAINTS_ANCHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\**[ \t]*Constraints?[ \t]*:[ \t]*\**").unwrap());
static FOLLOW_UP_ANCHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\**[ \t]*Follow[- ]?up[ \t]*:?").unwrap());
static FIELD_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\**[ \t]*(Input|Output|Explanation)[ \t]*:[ \t]*\**").unwrap());
static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^[ \t]*```[A-Za-z0-9_+-]*[ \t]*$").unwrap());
static BULLET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*(?:[•*-]\s+|•)").unwrap());

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Segments {
    pub description: String,
    pub examples: Vec<TestCase>,
    pub constraints: Vec<String>,
}

/// Splits a LeetCode statement (already converted to Markdown) into its
/// prose, worked examples and constraint lines. Missing anchors yield empty
/// fields rather than errors.
pub fn segment(text: &str) -> Segments {
    let examples_at: Vec<(usize, usize)> = EXAMPLE_ANCHOR
        .find_iter(text)
        .map(|m| (m.start(), m.end()))
        .collect();
    let constraints_at = CONSTRAINTS_ANCHOR.find(text).map(|m| (m.start(), m.end()));

    let description_end = examples_at
        .first()
        .map(|&(start, _)| start)
        .into_iter()
        .chain(constraints_at.map(|(start, _)| start))
        .min()
        .unwrap_or(text.len());
    let description = text[..description_end].trim().to_string();

    let mut examples = Vec::new();
    for (i, &(_, body_start)) in examples_at.iter().enumerate() {
        let mut body_end = examples_at
            .get(i + 1)
            .map(|&(start, _)| start)
            .unwrap_or(text.len());
        if let Some((c_start, _)) = constraints_at {
            if c_start > body_start && c_start < body_end {
                body_end = c_start;
            }
        }
        if let Some(case) = parse_example(&text[body_start..body_end]) {
            examples.push(case);
        }
    }

    let constraints = match constraints_at {
        Some((_, body_start)) => {
            let rest = &text[body_start..];
            let end = [
                FOLLOW_UP_ANCHOR.find(rest).map(|m| m.start()),
                EXAMPLE_ANCHOR.find(rest).map(|m| m.start()),
            ]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(rest.len());
            split_constraints(&rest[..end])
        }
        None => Vec::new(),
    };

    Segments {
        description,
        examples,
        constraints,
    }
}

/// Input/Output/Explanation fields of one example block. Each value runs to
/// the next label or the end of the block. Blocks without both an input and
/// an output are dropped.
fn parse_example(block: &str) -> Option<TestCase> {
    let labels: Vec<(String, usize, usize)> = FIELD_LABEL
        .captures_iter(block)
        .filter_map(|c| {
            let whole = c.get(0)?;
            Some((c[1].to_lowercase(), whole.start(), whole.end()))
        })
        .collect();

    let mut input = None;
    let mut output = None;
    let mut explanation = None;
    for (i, (label, _, value_start)) in labels.iter().enumerate() {
        let value_end = labels.get(i + 1).map(|l| l.1).unwrap_or(block.len());
        let value = clean_value(&block[*value_start..value_end]);
        if value.is_empty() {
            continue;
        }
        let slot = match label.as_str() {
            "input" => &mut input,
            "output" => &mut output,
            _ => &mut explanation,
        };
        if slot.is_none() {
            *slot = Some(value);
        }
    }

    Some(TestCase {
        input: input?,
        output: output?,
        explanation,
    })
}

fn clean_value(raw: &str) -> String {
    CODE_FENCE.replace_all(raw, "").trim().to_string()
}

fn split_constraints(block: &str) -> Vec<String> {
    block
        .lines()
        .map(|line| BULLET.replace(line, "").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}
