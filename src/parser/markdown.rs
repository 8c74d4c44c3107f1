use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node};

static EXCESS_BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{4,}").unwrap());

/// How a tag is rendered. One variant per distinct Markdown shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagRule {
    Block,
    Heading(usize),
    Strong,
    Emphasis,
    Code,
    Preformatted,
    BulletList,
    NumberedList,
    LineBreak,
    Link,
    Image,
    Dropped,
    Inline,
}

impl TagRule {
    pub fn for_tag(name: &str) -> TagRule {
        match name {
            "p" | "div" => TagRule::Block,
            "h1" => TagRule::Heading(1),
            "h2" => TagRule::Heading(2),
            "h3" => TagRule::Heading(3),
            "h4" => TagRule::Heading(4),
            "h5" => TagRule::Heading(5),
            "h6" => TagRule::Heading(6),
            "strong" | "b" => TagRule::Strong,
            "em" | "i" => TagRule::Emphasis,
            "code" => TagRule::Code,
            "pre" => TagRule::Preformatted,
            "ul" => TagRule::BulletList,
            "ol" => TagRule::NumberedList,
            "br" => TagRule::LineBreak,
            "a" => TagRule::Link,
            "img" => TagRule::Image,
            "script" | "style" => TagRule::Dropped,
            _ => TagRule::Inline,
        }
    }
}

/// Converts an HTML fragment to normalized Markdown.
pub fn convert_html(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }
    let fragment = Html::parse_fragment(html);
    normalize_whitespace(&convert_children(fragment.root_element()))
}

/// Converts one element (and its subtree) to normalized Markdown.
pub fn convert_element(el: ElementRef) -> String {
    normalize_whitespace(&render(el))
}

/// Like [`convert_element`] but renders only the children of `el`, skipping
/// any direct child for which `skip` returns true.
pub fn convert_children_except(el: ElementRef, skip: impl Fn(ElementRef) -> bool) -> String {
    let mut out = String::new();
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    if !skip(child_el) {
                        out.push_str(&render(child_el));
                    }
                }
            }
            _ => {}
        }
    }
    normalize_whitespace(&out)
}

/// Strips trailing whitespace per line, collapses runs of three or more blank
/// lines to two and trims the result.
pub fn normalize_whitespace(text: &str) -> String {
    let stripped: Vec<&str> = text.lines().map(str::trim_end).collect();
    let joined = stripped.join("\n");
    EXCESS_BLANK_LINES
        .replace_all(&joined, "\n\n\n")
        .trim()
        .to_string()
}

fn convert_children(el: ElementRef) -> String {
    let mut out = String::new();
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    out.push_str(&render(child_el));
                }
            }
            _ => {}
        }
    }
    out
}

fn render(el: ElementRef) -> String {
    let name = el.value().name();
    match TagRule::for_tag(name) {
        TagRule::Block => format!("\n\n{}\n\n", convert_children(el)),
        TagRule::Heading(level) => {
            format!("\n\n{} {}\n\n", "#".repeat(level), convert_children(el).trim())
        }
        TagRule::Strong => format!("**{}**", convert_children(el)),
        TagRule::Emphasis => format!("*{}*", convert_children(el)),
        TagRule::Code => format!("`{}`", convert_children(el)),
        TagRule::Preformatted => {
            let text: String = el.text().collect();
            format!("\n```\n{}\n```\n", text.trim_matches('\n'))
        }
        TagRule::BulletList => {
            let items: Vec<String> = list_items(el)
                .map(|li| format!("- {}", convert_children(li).trim()))
                .collect();
            format!("\n{}\n", items.join("\n"))
        }
        TagRule::NumberedList => {
            let items: Vec<String> = list_items(el)
                .enumerate()
                .map(|(i, li)| format!("{}. {}", i + 1, convert_children(li).trim()))
                .collect();
            format!("\n{}\n", items.join("\n"))
        }
        TagRule::LineBreak => "\n".to_string(),
        TagRule::Link => {
            let href = el.value().attr("href").unwrap_or("");
            format!("[{}]({})", convert_children(el), href)
        }
        TagRule::Image => {
            let alt = el.value().attr("alt").unwrap_or("");
            let src = el.value().attr("src").unwrap_or("");
            format!("![{}]({})", alt, src)
        }
        TagRule::Dropped => String::new(),
        TagRule::Inline => convert_children(el),
    }
}

/// Direct `li` children only; nested lists render inside their item.
fn list_items<'a>(el: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    el.children()
        .filter_map(ElementRef::wrap)
        .filter(|c| c.value().name() == "li")
}
