use std::path::PathBuf;

use anyhow::Context;
use clap::ValueEnum;
use core_model::ArchiveRecord;
use pulldown_cmark::{Event, Options, Parser, html};
use resolve::Source;
use serde::Serialize;

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Markdown,
    Json,
    Html,
}

impl OutputFormat {
    pub fn extension(self) -> Option<&'static str> {
        match self {
            OutputFormat::Html => Some("html"),
            OutputFormat::Markdown => Some("md"),
            OutputFormat::Text | OutputFormat::Json => None,
        }
    }
}

#[derive(Serialize)]
pub struct JsonRecord<'a> {
    #[serde(flatten)]
    pub record: &'a ArchiveRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<&'static str>,
}

pub fn render_record_json(record: &ArchiveRecord, source: Option<Source>) -> anyhow::Result<String> {
    let view = JsonRecord {
        record,
        source: source.map(|s| match s {
            Source::Cache => "cache",
            Source::Fresh => "fresh",
        }),
    };
    serde_json::to_string_pretty(&view).with_context(|| "serializing record")
}

pub fn render_record_markdown(record: &ArchiveRecord) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", record.title));
    out.push_str(&format!("`{}`\n\n", record.key));
    out.push_str(&format!("![{}]({})\n\n", record.title, record.media_url));
    out.push_str(record.generated_brief.trim());
    out.push_str("\n\n## Original description\n\n");
    out.push_str(record.source_description.trim());
    out.push('\n');
    out
}

/// Standalone page with the image beside the generated caption.
pub fn render_record_html(record: &ArchiveRecord) -> String {
    let title = escape_html(&record.title);
    let mut body = String::new();
    body.push_str("<!doctype html><html><head><meta charset=\"utf-8\">");
    body.push_str(&format!("<title>{title}</title>"));
    body.push_str("<style>body{font-family:system-ui,Arial,sans-serif;max-width:1100px;margin:2rem auto;line-height:1.5}.cols{display:flex;gap:2rem;align-items:flex-start}.cols>div{flex:1}img{max-width:100%;border-radius:8px}figcaption{color:#555;font-size:.9rem}.brief{padding:.8rem 1rem;border:1px solid #e3e3e3;border-radius:8px}.meta{color:#555;font-size:.9rem}details{margin-top:1.5rem}</style></head><body>");
    body.push_str(&format!("<h1>{title}</h1>"));
    body.push_str(&format!("<div class=\"meta\">{}</div>", escape_html(&record.key)));
    body.push_str("<div class=\"cols\"><div><figure>");
    body.push_str(&format!(
        "<img src=\"{}\" alt=\"{title}\"><figcaption>{title}</figcaption>",
        escape_html(&record.media_url)
    ));
    body.push_str("</figure></div>");
    body.push_str(&format!(
        "<div class=\"brief\">{}</div></div>",
        render_markdown_to_html(&record.generated_brief)
    ));
    body.push_str(&format!(
        "<details><summary>Original description</summary><p>{}</p></details>",
        escape_html(&record.source_description)
    ));
    body.push_str("</body></html>");
    body
}

/// Generated text is usually Markdown; raw HTML inside it is shown as text.
fn render_markdown_to_html(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, Options::ENABLE_STRIKETHROUGH).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });
    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}

pub fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

pub fn resolve_output_dir(dir: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    let base = if let Some(dir) = dir {
        dir
    } else {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("spacelog")
            .join("exports")
    };
    std::fs::create_dir_all(&base)
        .with_context(|| format!("creating output dir {}", base.display()))?;
    Ok(base)
}

/// Date keys map to themselves; any key that needs sanitizing also gets a
/// short hash of the raw key so distinct keys never share a file.
pub fn export_file_name(record: &ArchiveRecord, extension: &str) -> String {
    let stem: String = record
        .key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if stem == record.key {
        return format!("spacelog_{stem}.{extension}");
    }
    let hash = blake3::hash(record.key.as_bytes()).to_hex();
    format!("spacelog_{stem}_{}.{extension}", &hash.as_str()[..12])
}
