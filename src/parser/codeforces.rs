use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use thiserror::Error;
use tracing::debug;

use super::markdown::{convert_children_except, convert_element};
use crate::model::TestCase;

pub const DEFAULT_TIME_LIMIT_MS: u32 = 2000;
pub const DEFAULT_MEMORY_LIMIT_MB: u32 = 256;

static TIME_LIMIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*second").unwrap());
static MEMORY_LIMIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s*megabyte").unwrap());
static INDEX_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][0-9]?\.\s+").unwrap());
static FIRST_INT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

static STATEMENT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.problem-statement").unwrap());
static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.header > div.title").unwrap());
static TIME: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.time-limit").unwrap());
static MEMORY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.memory-limit").unwrap());
static INPUT_SPEC: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.input-specification").unwrap());
static OUTPUT_SPEC: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.output-specification").unwrap());
static NOTE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.note").unwrap());
static SAMPLE_INPUT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.sample-test div.input pre").unwrap());
static SAMPLE_OUTPUT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.sample-test div.output pre").unwrap());
static TAG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span.tag-box").unwrap());
static RATING: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"span.tag-box[title="Difficulty"], span.ProblemRating"#).unwrap()
});
static EXAMPLE_LINE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.test-example-line").unwrap());

/// Statement children that end the prose part of the description.
const STOP_SECTIONS: &[&str] = &[
    "input-specification",
    "output-specification",
    "sample-tests",
    "sample-test",
    "note",
];

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{field}: {reason}")]
pub struct FieldAbsent {
    pub field: &'static str,
    pub reason: &'static str,
}

impl FieldAbsent {
    fn missing(field: &'static str) -> Self {
        FieldAbsent {
            field,
            reason: "marker not found",
        }
    }

    fn unparsable(field: &'static str) -> Self {
        FieldAbsent {
            field,
            reason: "no value in marker text",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFields {
    pub title: String,
    pub time_limit_ms: u32,
    pub memory_limit_mb: u32,
    pub description: String,
    pub input_format: String,
    pub output_format: String,
    pub sample_tests: Vec<TestCase>,
    pub tags: Vec<String>,
    pub rating: Option<i32>,
}

/// Extracts every field of a Codeforces problem page. Never fails: each
/// absent region falls back to its default.
pub fn extract_page(html: &str, contest_id: i64, index: &str) -> ExtractedFields {
    let doc = Html::parse_document(html);
    let key = format!("{}{}", contest_id, index);

    let mut description = or_default(&key, extract_description(&doc), String::new());
    if let Ok(note) = extract_note(&doc) {
        description = if description.is_empty() {
            format!("## Note\n\n{}", note)
        } else {
            format!("{}\n\n## Note\n\n{}", description, note)
        };
    }

    ExtractedFields {
        title: or_default(&key, extract_title(&doc), format!("Problem {}", key)),
        time_limit_ms: or_default(&key, extract_time_limit(&doc), DEFAULT_TIME_LIMIT_MS),
        memory_limit_mb: or_default(&key, extract_memory_limit(&doc), DEFAULT_MEMORY_LIMIT_MB),
        description,
        input_format: or_default(&key, extract_input_format(&doc), String::new()),
        output_format: or_default(&key, extract_output_format(&doc), String::new()),
        sample_tests: or_default(&key, extract_samples(&doc), Vec::new()),
        tags: or_default(&key, extract_tags(&doc), Vec::new()),
        rating: or_default(&key, extract_rating(&doc).map(Some), None),
    }
}

fn or_default<T>(key: &str, result: Result<T, FieldAbsent>, default: T) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            debug!("{}: using default for {}", key, e);
            default
        }
    }
}

// ── Header fields ──

pub fn extract_title(doc: &Html) -> Result<String, FieldAbsent> {
    let el = doc
        .select(&TITLE)
        .next()
        .ok_or(FieldAbsent::missing("title"))?;
    let text = collapse_text(el);
    let title = INDEX_PREFIX.replace(&text, "").trim().to_string();
    if title.is_empty() {
        return Err(FieldAbsent::unparsable("title"));
    }
    Ok(title)
}

pub fn extract_time_limit(doc: &Html) -> Result<u32, FieldAbsent> {
    let el = doc
        .select(&TIME)
        .next()
        .ok_or(FieldAbsent::missing("time_limit"))?;
    let text: String = el.text().collect();
    let caps = TIME_LIMIT
        .captures(&text)
        .ok_or(FieldAbsent::unparsable("time_limit"))?;
    let seconds: f64 = caps[1]
        .parse()
        .map_err(|_| FieldAbsent::unparsable("time_limit"))?;
    Ok((seconds * 1000.0).round() as u32)
}

pub fn extract_memory_limit(doc: &Html) -> Result<u32, FieldAbsent> {
    let el = doc
        .select(&MEMORY)
        .next()
        .ok_or(FieldAbsent::missing("memory_limit"))?;
    let text: String = el.text().collect();
    MEMORY_LIMIT
        .captures(&text)
        .and_then(|c| c[1].parse().ok())
        .ok_or(FieldAbsent::unparsable("memory_limit"))
}

// ── Statement body ──

pub fn extract_description(doc: &Html) -> Result<String, FieldAbsent> {
    let statement = doc
        .select(&STATEMENT)
        .next()
        .ok_or(FieldAbsent::missing("description"))?;

    let mut parts = Vec::new();
    for child in statement.children().filter_map(ElementRef::wrap) {
        if child.value().name() != "div" || has_class(child, "header") {
            continue;
        }
        if STOP_SECTIONS.iter().any(|cls| has_class(child, cls)) {
            break;
        }
        let md = convert_element(child);
        if !md.is_empty() {
            parts.push(md);
        }
    }

    if parts.is_empty() {
        return Err(FieldAbsent::unparsable("description"));
    }
    Ok(parts.join("\n\n"))
}

fn extract_spec(doc: &Html, selector: &Selector, field: &'static str) -> Result<String, FieldAbsent> {
    let el = doc
        .select(selector)
        .next()
        .ok_or(FieldAbsent::missing(field))?;
    let md = convert_children_except(el, |c| has_class(c, "section-title"));
    if md.is_empty() {
        return Err(FieldAbsent::unparsable(field));
    }
    Ok(md)
}

pub fn extract_input_format(doc: &Html) -> Result<String, FieldAbsent> {
    extract_spec(doc, &INPUT_SPEC, "input_format")
}

pub fn extract_output_format(doc: &Html) -> Result<String, FieldAbsent> {
    extract_spec(doc, &OUTPUT_SPEC, "output_format")
}

pub fn extract_note(doc: &Html) -> Result<String, FieldAbsent> {
    extract_spec(doc, &NOTE, "note")
}

/// Pairs sample inputs with outputs in source order; surplus on either side
/// is dropped.
pub fn extract_samples(doc: &Html) -> Result<Vec<TestCase>, FieldAbsent> {
    let inputs: Vec<String> = doc.select(&SAMPLE_INPUT).map(pre_text).collect();
    let outputs: Vec<String> = doc.select(&SAMPLE_OUTPUT).map(pre_text).collect();
    if inputs.is_empty() && outputs.is_empty() {
        return Err(FieldAbsent::missing("sample_tests"));
    }

    Ok(inputs
        .into_iter()
        .zip(outputs)
        .enumerate()
        .map(|(i, (input, output))| TestCase {
            input,
            output,
            explanation: Some(format!("Sample test {}", i + 1)),
        })
        .collect())
}

/// Text of a sample `<pre>`. Newer pages split lines into
/// `test-example-line` divs, older ones use `<br>`.
fn pre_text(pre: ElementRef) -> String {
    let lines: Vec<String> = pre
        .select(&EXAMPLE_LINE)
        .map(|line| line.text().collect::<String>())
        .collect();
    if !lines.is_empty() {
        return lines.join("\n").trim().to_string();
    }

    let mut out = String::new();
    for child in pre.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) if el.name() == "br" => out.push('\n'),
            Node::Element(_) => {
                if let Some(el) = ElementRef::wrap(child) {
                    out.extend(el.text());
                }
            }
            _ => {}
        }
    }
    out.trim().to_string()
}

// ── Sidebar ──

pub fn extract_tags(doc: &Html) -> Result<Vec<String>, FieldAbsent> {
    let tags: Vec<String> = doc
        .select(&TAG)
        .filter(|el| el.value().attr("title") != Some("Difficulty"))
        .map(collapse_text)
        .filter(|t| !t.is_empty())
        .collect();
    if tags.is_empty() {
        return Err(FieldAbsent::missing("tags"));
    }
    Ok(tags)
}

pub fn extract_rating(doc: &Html) -> Result<i32, FieldAbsent> {
    let el = doc
        .select(&RATING)
        .next()
        .ok_or(FieldAbsent::missing("rating"))?;
    let text: String = el.text().collect();
    FIRST_INT
        .find(&text)
        .and_then(|m| m.as_str().parse().ok())
        .ok_or(FieldAbsent::unparsable("rating"))
}

// ── Helpers ──

fn has_class(el: ElementRef, class: &str) -> bool {
    el.value().classes().any(|c| c == class)
}

fn collapse_text(el: ElementRef) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    #[test]
    fn full_page() {
        let fields = extract_page(&fixture("codeforces_4a"), 4, "A");

        assert_eq!(fields.title, "Watermelon");
        assert_eq!(fields.time_limit_ms, 1000);
        assert_eq!(fields.memory_limit_mb, 64);
        assert_eq!(fields.tags, vec!["brute force", "math"]);
        assert_eq!(fields.rating, Some(800));

        assert!(fields.description.starts_with("One hot summer day Pete"));
        assert!(fields.description.contains("**even**"));
        assert!(!fields.description.contains("time limit per test"));
        assert!(!fields.description.contains("The first (and the only) input line"));
        assert!(fields.description.contains("## Note\n\nFor example, the boys"));

        assert!(fields.input_format.starts_with("The first (and the only) input line"));
        assert!(!fields.input_format.contains("Input\n"));
        assert!(fields.output_format.starts_with("Print YES"));

        assert_eq!(
            fields.sample_tests,
            vec![TestCase {
                input: "8".into(),
                output: "YES".into(),
                explanation: Some("Sample test 1".into()),
            }]
        );
    }

    #[test]
    fn missing_memory_limit_defaults() {
        let fields = extract_page(&fixture("codeforces_partial"), 1850, "B");
        assert_eq!(fields.memory_limit_mb, 256);
        assert_eq!(fields.time_limit_ms, 500);
        assert_eq!(fields.title, "Ten Words of Wisdom");
        assert_eq!(fields.rating, Some(800));
    }

    #[test]
    fn samples_pair_min_of_inputs_and_outputs() {
        let doc = Html::parse_document(&fixture("codeforces_partial"));
        let samples = extract_samples(&doc).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].input, "2\n5\n7 2");
        assert_eq!(samples[0].output, "4\n3");
    }

    #[test]
    fn empty_page_uses_every_default() {
        let fields = extract_page("<html><body><p>maintenance</p></body></html>", 99, "C");
        assert_eq!(fields.title, "Problem 99C");
        assert_eq!(fields.time_limit_ms, DEFAULT_TIME_LIMIT_MS);
        assert_eq!(fields.memory_limit_mb, DEFAULT_MEMORY_LIMIT_MB);
        assert!(fields.description.is_empty());
        assert!(fields.sample_tests.is_empty());
        assert!(fields.tags.is_empty());
        assert_eq!(fields.rating, None);
    }

    #[test]
    fn title_index_prefix_stripped() {
        let doc = Html::parse_document(
            r#"<div class="header"><div class="title">F1. Omkar and Landslide</div></div>"#,
        );
        assert_eq!(extract_title(&doc).unwrap(), "Omkar and Landslide");

        let doc = Html::parse_document(r#"<div class="header"><div class="title">Sum</div></div>"#);
        assert_eq!(extract_title(&doc).unwrap(), "Sum");
    }

    #[test]
    fn absent_fields_reported_per_field() {
        let doc = Html::parse_document("<p>nothing</p>");
        assert_eq!(extract_memory_limit(&doc), Err(FieldAbsent::missing("memory_limit")));
        assert_eq!(extract_rating(&doc), Err(FieldAbsent::missing("rating")));
        assert!(extract_input_format(&doc).is_err());
        assert!(extract_output_format(&doc).is_err());
    }
}
