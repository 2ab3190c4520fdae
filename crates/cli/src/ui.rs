use std::io::{self, IsTerminal};

use core_model::ArchiveRecord;
use fuzzy_matcher::{FuzzyMatcher, skim::SkimMatcherV2};
use owo_colors::OwoColorize;
use resolve::{FetchError, Source};

pub fn color_enabled() -> bool {
    io::stdout().is_terminal()
        && io::stderr().is_terminal()
        && std::env::var_os("NO_COLOR").is_none()
}

pub fn print_record(record: &ArchiveRecord, source: Option<Source>) {
    let use_color = color_enabled();
    if let Some(source) = source {
        let banner = match source {
            Source::Cache => "loaded from local archive",
            Source::Fresh => "fetched and generated",
        };
        if use_color {
            println!("{}", banner.green());
        } else {
            println!("{banner}");
        }
    }
    if use_color {
        println!("{} {}", record.title.bold(), record.key.dimmed());
        println!("{}", record.media_url.cyan());
    } else {
        println!("{} {}", record.title, record.key);
        println!("{}", record.media_url);
    }
    println!();
    println!("{}", record.generated_brief);
}

pub fn print_record_list(items: &[ArchiveRecord], terms: &[String]) {
    let use_color = color_enabled();
    for item in items {
        let key = highlight_terms(&item.key, terms, use_color);
        let title = highlight_terms(&item.title, terms, use_color);
        let snippet = truncate_text(&first_line(&item.generated_brief), 80);
        let separator = if use_color {
            " | ".dimmed().to_string()
        } else {
            " | ".to_string()
        };
        let key = if use_color { key.cyan().to_string() } else { key };
        let title = if use_color {
            title.bold().to_string()
        } else {
            title
        };
        let snippet = if use_color {
            snippet.dimmed().to_string()
        } else {
            snippet
        };
        println!("{key}{separator}{title}{separator}{snippet}");
    }
}

/// Advice shown next to the error for failures the user can act on.
pub fn failure_hint(err: &FetchError) -> Option<&'static str> {
    match err {
        e if e.is_rate_limited() => {
            Some("the text generator is rate limiting requests; wait a minute and try again")
        }
        FetchError::NotFound { .. } => Some("no picture is available for that date or topic"),
        _ => None,
    }
}

pub fn print_hint(hint: &str) {
    if color_enabled() {
        eprintln!("{}", hint.yellow());
    } else {
        eprintln!("{hint}");
    }
}

pub fn fuzzy_filter_records(items: &[ArchiveRecord], query: &str) -> (Vec<ArchiveRecord>, Vec<String>) {
    let terms: Vec<String> = query.split_whitespace().map(str::to_string).collect();
    if terms.is_empty() {
        return (items.to_vec(), terms);
    }
    let matcher = SkimMatcherV2::default();
    let mut scored: Vec<(i64, ArchiveRecord)> = items
        .iter()
        .filter_map(|item| {
            let match_text = format!("{} {}", item.key, item.title);
            let mut total = 0i64;
            for term in &terms {
                total += matcher.fuzzy_match(&match_text, term)?;
            }
            Some((total, item.clone()))
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    (scored.into_iter().map(|(_, item)| item).collect(), terms)
}

pub fn highlight_terms(text: &str, terms: &[String], use_color: bool) -> String {
    if !use_color || terms.is_empty() {
        return text.to_string();
    }
    let mut ranges = Vec::new();
    let text_lower = text.to_lowercase();
    // Lowercasing can change byte lengths; only highlight when offsets still line up.
    if text_lower.len() != text.len() {
        return text.to_string();
    }
    for term in terms {
        let term_lower = term.to_lowercase();
        if term_lower.is_empty() {
            continue;
        }
        for (start, _) in text_lower.match_indices(&term_lower) {
            ranges.push((start, start + term_lower.len()));
        }
    }
    if ranges.is_empty() {
        return text.to_string();
    }
    ranges.sort_by(|a, b| a.0.cmp(&b.0));
    let mut merged: Vec<(usize, usize)> = Vec::new();
    for (start, end) in ranges {
        if let Some(last) = merged.last_mut()
            && start <= last.1
        {
            last.1 = last.1.max(end);
            continue;
        }
        merged.push((start, end));
    }
    let mut out = String::new();
    let mut cursor = 0;
    for (start, end) in merged {
        if cursor < start {
            out.push_str(&text[cursor..start]);
        }
        let slice = &text[start..end];
        out.push_str(&slice.yellow().bold().to_string());
        cursor = end;
    }
    if cursor < text.len() {
        out.push_str(&text[cursor..]);
    }
    out
}

fn first_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default()
        .to_string()
}

pub fn truncate_text(input: &str, max: usize) -> String {
    let mut out = String::new();
    for (i, ch) in input.chars().enumerate() {
        if i >= max {
            out.push_str("...");
            return out;
        }
        out.push(ch);
    }
    out
}
