//! Portal response classification

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::{
    config::Settings,
    core::{probe::PORTAL_VENDOR_MARKER, types::ReasonCode},
};

const EXCERPT_LEN: usize = 240;

/// Capture group whose text must not contain a negation
const GAP_GROUP: &str = "gap";

static NEGATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(not|remaining)\b").expect("valid regex"));

/// Classify a portal reply into a reason code and a human readable text
///
/// Error patterns are tried in configuration order and the first match
/// wins. Patterns that do not compile are skipped.
pub fn classify(settings: &Settings, status: u16, url: &str, body: &str) -> (ReasonCode, String) {
    if !(200..400).contains(&status) {
        return (ReasonCode::Unknown, format!("HTTP {}", status));
    }

    let body = body.to_lowercase();

    for (name, pattern) in &settings.login_error_patterns {
        let regex = match RegexBuilder::new(pattern)
            .case_insensitive(true)
            .multi_line(true)
            .build()
        {
            Ok(regex) => regex,
            Err(e) => {
                debug!("Skipping invalid pattern {}: {}", name, e);
                continue;
            }
        };

        if matches_unnegated(&regex, &body) {
            return (ReasonCode::Pattern(name.clone()), title_case(name));
        }
    }

    if body.contains("success") || body.contains("logged in") {
        return (ReasonCode::Ok, "Login success".to_string());
    }

    let gateway_in_url = !settings.gateway_prefix.is_empty() && url.contains(&settings.gateway_prefix);
    if body.contains(PORTAL_VENDOR_MARKER) || gateway_in_url {
        return (ReasonCode::Unknown, "Portal still intercepting".to_string());
    }

    (ReasonCode::Unknown, "Unrecognized response".to_string())
}

/// Find a match whose `gap` group, if the pattern has one, holds no negation
///
/// "quota is not exceeded" must not count as "quota exceeded". A negated
/// candidate is dropped and the search resumes one character later.
fn matches_unnegated(regex: &Regex, body: &str) -> bool {
    let mut start = 0;
    while start <= body.len() {
        let Some(caps) = regex.captures_at(body, start) else {
            return false;
        };
        let Some(gap) = caps.name(GAP_GROUP) else {
            return true;
        };
        let negated = NEGATION
            .find_at(body, gap.start())
            .is_some_and(|m| m.start() < gap.end());
        if !negated {
            return true;
        }

        let whole = caps.get(0).map_or(start, |m| m.start());
        start = whole + body[whole..].chars().next().map_or(1, char::len_utf8);
    }
    false
}

/// `too_many_devices` -> `Too Many Devices`
fn title_case(name: &str) -> String {
    name.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Single-line, truncated copy of a portal page for logging
pub fn excerpt(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() > EXCERPT_LEN {
        let truncated: String = collapsed.chars().take(EXCERPT_LEN).collect();
        format!("{}…", truncated)
    } else {
        collapsed
    }
}
