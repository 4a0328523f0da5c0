//! Parsing of free-text model replies.
//!
//! Models follow the requested formats most of the time, not all of the
//! time. Every parser here degrades instead of failing: a reply without a
//! page list becomes an empty list (which the fetcher reports as
//! `EmptyPrediction`), and a summary that is not JSON is kept as raw text.

use crate::prompts::NOT_FOUND_SENTINEL;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Upper bound on pages produced by expanding a single `A-B` range.
const MAX_RANGE_EXPANSION: usize = 500;

// ── Router / corrector replies ──────────────────────────────────────────────

static RE_PAGES_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*\**pages?\**\s*:\s*(.*)$").unwrap());

static RE_BRACKET_LIST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\s*([\d\s,\-–]*)\]").unwrap());

static RE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

static RE_REASONING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)\**reasoning\**\s*:\s*(.*?)(?:\n\s*\**(?:pages?|decision)\**\s*:|\z)").unwrap()
});

static RE_SECTION_DECISION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)section\s+(\d+)(?:\s*\(\s*pages?\s+(\d+)(?:\s*[-–]\s*(\d+))?\s*\))?")
        .unwrap()
});

static RE_DECISION_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*\**decision\**\s*:\s*(.*)$").unwrap());

/// What a router or corrector reply points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageTarget {
    /// Explicit page numbers, in reply order (may be empty).
    Pages(Vec<usize>),
    /// A section id with no explicit pages.
    Section(usize),
}

/// A parsed router or corrector reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteReply {
    pub target: PageTarget,
    pub reasoning: String,
}

/// Parse a `Reasoning: ... / Pages: [...]` reply.
///
/// Lookup order: the `Pages:` line, then any bracketed number list, then a
/// `Section N` decision, then (only for replies without a `Reasoning:`
/// label) every number in the reply.
pub fn parse_route_reply(reply: &str) -> RouteReply {
    let reasoning = RE_REASONING
        .captures(reply)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_else(|| reply.trim().to_string());

    if let Some(caps) = RE_PAGES_LABEL.captures(reply) {
        let line = &caps[1];
        if let Some(list) = RE_BRACKET_LIST.captures(line) {
            return RouteReply {
                target: PageTarget::Pages(parse_page_items(&list[1])),
                reasoning,
            };
        }
        if RE_NUMBER.is_match(line) {
            return RouteReply {
                target: PageTarget::Pages(parse_page_items(line)),
                reasoning,
            };
        }
    }

    if let Some(list) = RE_BRACKET_LIST.captures(reply) {
        return RouteReply {
            target: PageTarget::Pages(parse_page_items(&list[1])),
            reasoning,
        };
    }

    let decision = RE_DECISION_LABEL
        .captures(reply)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| reply.to_string());
    if let Some(caps) = RE_SECTION_DECISION.captures(&decision) {
        let page = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<usize>().ok());
        let target = match (page(2), page(3)) {
            (Some(first), Some(last)) => PageTarget::Pages(expand_range(first, last)),
            (Some(first), None) => PageTarget::Pages(vec![first]),
            _ => match page(1) {
                Some(id) => PageTarget::Section(id),
                None => PageTarget::Pages(Vec::new()),
            },
        };
        return RouteReply { target, reasoning };
    }

    let pages = if RE_REASONING.is_match(reply) {
        Vec::new()
    } else {
        parse_page_items(reply)
    };
    RouteReply {
        target: PageTarget::Pages(pages),
        reasoning,
    }
}

/// Parse a page list such as `[1, 2, 3]`, `4-6, 9` or `see 12 and 14`.
pub fn parse_page_list(text: &str) -> Vec<usize> {
    match RE_BRACKET_LIST.captures(text) {
        Some(list) => parse_page_items(&list[1]),
        None => parse_page_items(text),
    }
}

fn parse_page_items(text: &str) -> Vec<usize> {
    static RE_ITEM: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(\d+)(?:\s*[-–]\s*(\d+))?").unwrap());

    let mut pages = Vec::new();
    for caps in RE_ITEM.captures_iter(text) {
        let Ok(first) = caps[1].parse::<usize>() else {
            continue;
        };
        match caps.get(2).and_then(|m| m.as_str().parse::<usize>().ok()) {
            Some(last) => pages.extend(expand_range(first, last)),
            None => pages.push(first),
        }
    }
    pages
}

fn expand_range(first: usize, last: usize) -> Vec<usize> {
    if last < first {
        return vec![first, last];
    }
    (first..=last).take(MAX_RANGE_EXPANSION).collect()
}

// ── Section summaries ───────────────────────────────────────────────────────

/// Structured section summary as parsed from the model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedSummary {
    pub summary: String,
    pub keywords: Vec<String>,
    pub insights: Vec<String>,
}

static RE_JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap());

/// Parse a summary reply: direct JSON, a fenced JSON block, the outermost
/// braces, and finally the raw text as the summary.
pub fn parse_summary(reply: &str) -> ParsedSummary {
    let trimmed = reply.trim();
    let value = serde_json::from_str::<Value>(trimmed)
        .ok()
        .filter(Value::is_object)
        .or_else(|| {
            RE_JSON_FENCE
                .captures(trimmed)
                .and_then(|c| serde_json::from_str::<Value>(&c[1]).ok())
        })
        .or_else(|| {
            let start = trimmed.find('{')?;
            let end = trimmed.rfind('}')?;
            (start < end)
                .then(|| serde_json::from_str::<Value>(&trimmed[start..=end]).ok())
                .flatten()
        });

    match value {
        Some(v) if v.is_object() => ParsedSummary {
            summary: text_field(&v["summary"]),
            keywords: list_field(&v["keywords"]),
            insights: list_field(&v["insights"]),
        },
        _ => ParsedSummary {
            summary: trimmed.to_string(),
            ..Default::default()
        },
    }
}

/// A string, or an array of strings joined with `"; "`.
fn text_field(v: &Value) -> String {
    match v {
        Value::String(s) => s.trim().to_string(),
        Value::Array(_) => list_field(v).join("; "),
        _ => String::new(),
    }
}

fn list_field(v: &Value) -> Vec<String> {
    match v {
        Value::Array(items) => items
            .iter()
            .filter_map(|i| match i {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(s) => s
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

// ── Answers ─────────────────────────────────────────────────────────────────

static RE_CITATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\[\s*pages?\s+([\d\s,\-–and]+?)\s*\]").unwrap());

/// Pages cited as `[Page N]` (or `[Pages N, M]`), restricted to `supplied`.
///
/// Falls back to every supplied page when the answer cites none of them.
pub fn parse_citations(answer: &str, supplied: &[usize]) -> Vec<usize> {
    let mut cited = Vec::new();
    for caps in RE_CITATION.captures_iter(answer) {
        for page in parse_page_items(&caps[1]) {
            if supplied.contains(&page) && !cited.contains(&page) {
                cited.push(page);
            }
        }
    }
    if cited.is_empty() {
        supplied.to_vec()
    } else {
        cited
    }
}

/// True when the answer reply is the not-found sentinel.
pub fn is_not_found(reply: &str) -> bool {
    let t = reply
        .trim()
        .trim_matches(|c: char| c == '`' || c == '"' || c == '\'' || c == '.' || c == '*');
    t.eq_ignore_ascii_case(NOT_FOUND_SENTINEL)
}
