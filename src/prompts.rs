//! Prompt templates for indexing, routing, correction and answering.
//!
//! Every prompt that mentions pages starts with [`metadata_context`]: the
//! page count, the valid range and every section boundary. Keeping that
//! block in front of the model is what keeps out-of-range predictions rare
//! instead of systematic.
//!
//! The reply formats requested here are parsed by [`crate::pipeline::parse`];
//! change both together.

use crate::error::ToolError;
use crate::output::{DocumentMetadata, PagePrediction, SectionSummary};
use std::fmt::Write as _;

/// Exact reply the answerer must give when the pages lack the answer.
pub const NOT_FOUND_SENTINEL: &str = "NOT_FOUND";

/// Metadata block injected into every page-related prompt.
pub fn metadata_context(meta: &DocumentMetadata) -> String {
    format!(
        "PDF METADATA\n\
         ------------\n\
         Total Pages: {total}\n\
         Total Sections: {sections}\n\
         Pages Per Section: {chunk}\n\
         Valid Page Range: 1 to {total}\n\
         \n\
         SECTION MAPPING:\n\
         {mapping}\n\
         \n\
         IMPORTANT: Always predict page numbers within the valid range (1 to {total})",
        total = meta.total_pages,
        sections = meta.total_sections,
        chunk = meta.chunk_size,
        mapping = section_breakdown(meta),
    )
}

/// One line per section: `  Section N: Pages A-B`.
pub fn section_breakdown(meta: &DocumentMetadata) -> String {
    meta.section_ranges()
        .map(|(id, first, last)| format!("  Section {id}: Pages {first}-{last}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Summaries as shown to the router, `max_sections == 0` meaning all.
pub fn format_sections(sections: &[SectionSummary], max_sections: usize) -> String {
    let shown = if max_sections == 0 {
        sections
    } else {
        &sections[..sections.len().min(max_sections)]
    };
    if shown.is_empty() {
        return "No sections available".to_string();
    }

    shown
        .iter()
        .map(|s| {
            let keywords = if s.keywords.is_empty() {
                "No keywords".to_string()
            } else {
                s.keywords.join(", ")
            };
            let summary = if s.summary.trim().is_empty() {
                "No summary available"
            } else {
                s.summary.trim()
            };
            let mut block = format!(
                "Section {} (Pages {}-{}):\n  Summary: {}\n  Keywords: {}",
                s.section_id, s.page_range.0, s.page_range.1, summary, keywords
            );
            if !s.insights.is_empty() {
                let _ = write!(block, "\n  Insights: {}", s.insights.join("; "));
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Prompt asking for a structured summary of one section.
pub fn section_summary_prompt(
    content: &str,
    section_id: usize,
    first: usize,
    last: usize,
    meta: &DocumentMetadata,
) -> String {
    format!(
        r#"You are analyzing a section (pages {first}-{last}) from a PDF.

CONTEXT: This is section {section_id} of {total_sections}.

CONTENT:
{content}

Please provide a structured analysis:

1. SUMMARY: 3-5 bullet points covering the main topics discussed in this section
2. KEYWORDS: 5-10 important terms, concepts, formulas, or entities mentioned
3. INSIGHTS: Any notable data points, conclusions, formulas, or unique observations

Respond ONLY with valid JSON:
{{
    "summary": ["bullet 1", "bullet 2"],
    "keywords": ["keyword1", "keyword2"],
    "insights": ["insight1", "insight2"]
}}"#,
        total_sections = meta.total_sections,
    )
}

/// Reply-format instructions shared by router and corrector.
const PAGE_REPLY_FORMAT: &str = "FORMAT:\n\
Reasoning: <why these pages>\n\
Pages: [<page>, <page>, ...]";

/// Router prompt: pick the pages most likely to hold the answer.
pub fn router_prompt(
    question: &str,
    meta: &DocumentMetadata,
    sections: &[SectionSummary],
    max_sections: usize,
) -> String {
    format!(
        "{context}\n\n\
         You are a routing agent. Decide which pages of the PDF contain the answer to a question.\n\n\
         QUESTION: {question}\n\n\
         {sections}\n\n\
         INSTRUCTIONS:\n\
         1. Analyze which section summary best matches the question\n\
         2. Look at keywords and summary points\n\
         3. List the specific pages to read, most relevant first\n\
         4. If unsure, say so in the reasoning but still list your best guess\n\n\
         {format}\n\n\
         Your response:",
        context = metadata_context(meta),
        sections = format_sections(sections, max_sections),
        format = PAGE_REPLY_FORMAT,
    )
}

/// Correction prompt: the previous pages failed; explain the failure and ask again.
pub fn correction_prompt(
    question: &str,
    meta: &DocumentMetadata,
    sections: &[SectionSummary],
    max_sections: usize,
    previous: &PagePrediction,
    error: &ToolError,
) -> String {
    let hint = match &error.nearest_section_hint {
        Some(s) => format!(
            "NEAREST VALID SECTION: Section {} (Pages {}-{}): {}",
            s.section_id,
            s.page_range.0,
            s.page_range.1,
            s.summary.trim()
        ),
        None => "NEAREST VALID SECTION: (none)".to_string(),
    };

    format!(
        "{context}\n\n\
         TOOL ERROR - PLEASE CORRECT\n\n\
         The fetch tool failed with the following error:\n\n\
         ERROR: {message}\n\n\
         YOUR PREVIOUS PREDICTION: {previous:?}\n\
         YOUR PREVIOUS REASONING: {reasoning}\n\n\
         QUESTION: {question}\n\n\
         CONTEXT:\n\
         - Valid page range: {lo} to {hi}\n\
         - Total sections: {total_sections}\n\
         - Each section covers {chunk} pages\n\n\
         {hint}\n\n\
         SECTION SUMMARIES:\n\
         {sections}\n\n\
         Analyze why your prediction failed and provide a corrected prediction.\n\
         Consider:\n\
         1. Which section actually contains the answer based on summaries?\n\
         2. What page range does that section cover?\n\
         3. Pick specific pages within that valid range\n\n\
         {format}\n\n\
         Your corrected prediction:",
        context = metadata_context(meta),
        message = error.message,
        previous = previous.pages,
        reasoning = if previous.reasoning.is_empty() { "(none)" } else { previous.reasoning.as_str() },
        lo = error.valid_range.0,
        hi = error.valid_range.1,
        total_sections = meta.total_sections,
        chunk = meta.chunk_size,
        sections = format_sections(sections, max_sections),
        format = PAGE_REPLY_FORMAT,
    )
}

/// Answer prompt over the fetched pages.
pub fn answer_prompt(question: &str, page_text: &str, pages: &[usize], has_images: bool) -> String {
    let pages_str = pages
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let images_line = if has_images {
        "3. Images of some pages are attached; use visual information when relevant\n"
    } else {
        ""
    };

    format!(
        "You are answering a question based on specific PDF pages.\n\n\
         QUESTION: {question}\n\n\
         CONTENT FROM PAGE(S) {pages_str}:\n\
         {page_text}\n\n\
         INSTRUCTIONS:\n\
         1. Provide a clear, accurate answer using ONLY the information above\n\
         2. Cite every claim with the page it came from: [Page X]\n\
         {images_line}\
         4. If the answer is not in the provided content, reply with exactly {NOT_FOUND_SENTINEL} and nothing else\n\n\
         Your answer:"
    )
}
