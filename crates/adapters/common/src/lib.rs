use std::time::Duration;

use reqwest::blocking::{Client, Response};

pub const USER_AGENT: &str = concat!("spacelog/", env!("CARGO_PKG_VERSION"));

const MAX_BODY_CHARS: usize = 2000;

/// Blocking client with both connect and whole-request timeouts so a stalled
/// provider surfaces as an error instead of hanging the caller.
pub fn http_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .timeout(timeout)
        .build()
}

/// Status and (truncated) raw body of a non-success response.
pub fn read_failure(response: Response) -> (u16, String) {
    let status = response.status().as_u16();
    let body = response
        .text()
        .unwrap_or_else(|e| format!("<unreadable body: {}>", error_text(e)));
    tracing::debug!(status, body_len = body.len(), "provider returned failure");
    (status, truncate_body(&body))
}

/// Request URLs carry API keys in the query string; never show them.
pub fn error_text(err: reqwest::Error) -> String {
    truncate_body(&err.without_url().to_string())
}

pub fn truncate_body(input: &str) -> String {
    let mut out = String::new();
    for (i, ch) in input.chars().enumerate() {
        if i >= MAX_BODY_CHARS {
            out.push_str("...");
            return out;
        }
        out.push(ch);
    }
    out
}

/// Base URLs come from config; tolerate a trailing slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_body_keeps_short_input() {
        assert_eq!(truncate_body("short"), "short");
    }

    #[test]
    fn truncate_body_cuts_on_char_boundary() {
        let long = "é".repeat(MAX_BODY_CHARS + 10);
        let out = truncate_body(&long);
        assert!(out.ends_with("..."));
        assert_eq!(out.chars().count(), MAX_BODY_CHARS + 3);
    }

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(
            join_url("https://api.nasa.gov/", "/planetary/apod"),
            "https://api.nasa.gov/planetary/apod"
        );
        assert_eq!(join_url("http://h:1", "search"), "http://h:1/search");
    }

    #[test]
    fn error_text_hides_query_secrets() {
        let client = http_client(Duration::from_secs(2)).unwrap();
        let err = client
            .get("http://127.0.0.1:9/planetary/apod?api_key=SUPERSECRET")
            .send()
            .unwrap_err();
        let text = error_text(err);
        assert!(!text.contains("SUPERSECRET"));
        assert!(!text.contains("api_key"));
    }

    #[test]
    fn client_builds_with_timeout() {
        assert!(http_client(Duration::from_secs(3)).is_ok());
    }
}
