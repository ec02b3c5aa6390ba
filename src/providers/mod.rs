//! Completion providers.
//!
//! Only the OpenAI-compatible chat completion API is wired in; every call is a
//! single attempt bounded by the configured client timeouts.

pub mod openai;
pub mod traits;

pub use openai::OpenAiProvider;
pub use traits::{ChatMessage, ChatResponse, ChatRole, Provider, TokenUsage};

const MAX_API_ERROR_CHARS: usize = 200;

fn is_secret_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')
}

fn token_end(input: &str, from: usize) -> usize {
    let mut end = from;
    for (i, c) in input[from..].char_indices() {
        if is_secret_char(c) {
            end = from + i + c.len_utf8();
        } else {
            break;
        }
    }
    end
}

/// Scrub known secret-like token prefixes from upstream error strings.
///
/// Covers OpenAI-style keys, bearer headers and Telegram bot tokens embedded
/// in Bot API paths (`/bot<token>/method`).
pub fn scrub_secret_patterns(input: &str) -> String {
    const PREFIXES: [(&str, usize); 10] = [
        ("sk-", 1),
        ("/bot", 8),
        ("\"access_token\":\"", 8),
        ("\"token\":\"", 8),
        ("\"api_key\":\"", 8),
        ("access_token=", 8),
        ("token=", 8),
        ("api_key=", 8),
        ("Bearer ", 16),
        ("bearer ", 16),
    ];

    let mut scrubbed = input.to_string();

    for (prefix, min_len) in PREFIXES {
        let mut search_from = 0;
        loop {
            let Some(rel) = scrubbed[search_from..].find(prefix) else {
                break;
            };

            let start = search_from + rel;
            let content_start = start + prefix.len();
            let end = token_end(&scrubbed, content_start);
            let token_len = end.saturating_sub(content_start);

            // Bare prefixes like "sk-" should not stop future scans.
            if token_len < min_len {
                search_from = content_start;
                continue;
            }

            scrubbed.replace_range(content_start..end, "[REDACTED]");
            search_from = content_start + "[REDACTED]".len();
        }
    }

    scrubbed
}

/// Sanitize API error text by scrubbing secrets and truncating length.
pub fn sanitize_api_error(input: &str) -> String {
    let scrubbed = scrub_secret_patterns(input);

    if scrubbed.chars().count() <= MAX_API_ERROR_CHARS {
        return scrubbed;
    }

    let mut end = MAX_API_ERROR_CHARS;
    while end > 0 && !scrubbed.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}...", &scrubbed[..end])
}

/// Build a sanitized provider error from a failed HTTP response.
pub async fn api_error(provider: &str, response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read provider error body>".to_string());
    let sanitized = sanitize_api_error(&body);
    anyhow::anyhow!("{provider} API error ({status}): {sanitized}")
}
