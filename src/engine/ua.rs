//! User-agent classification.
//!
//! The `User-Agent` header is run through the `woothee` parser to obtain a
//! browser name. Agents the parser does not recognize keep their raw header
//! value as the browser string — tunnel tooling rarely bothers with a
//! believable agent, and the raw product token is exactly what the suspicious
//! set matches against.

use woothee::parser::Parser;

/// Browser strings considered suspicious. An agent is flagged when its
/// browser string occurs inside one of these entries.
pub const SUSPICIOUS_AGENTS: &[&str] = &["Go-http-client/1.1"];

/// Resolves the raw `User-Agent` header value to a browser string.
///
/// Empty or missing headers resolve to the empty string.
pub fn browser_name(parser: &Parser, raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    match parser.parse(raw) {
        Some(result) if result.name != "UNKNOWN" => result.name.to_string(),
        _ => raw.to_string(),
    }
}

/// Whether a browser string hits the suspicious set (substring containment).
pub fn is_suspicious(browser: &str) -> bool {
    !browser.is_empty() && SUSPICIOUS_AGENTS.iter().any(|entry| entry.contains(browser))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_agent_resolves_empty() {
        let parser = Parser::new();
        assert_eq!(browser_name(&parser, ""), "");
        assert_eq!(browser_name(&parser, "   "), "");
    }

    #[test]
    fn go_http_client_is_suspicious() {
        let parser = Parser::new();
        let browser = browser_name(&parser, "Go-http-client/1.1");
        // Whether or not the parser dataset knows this agent, the resulting
        // browser string is contained in the suspicious entry.
        assert!(is_suspicious(&browser));
    }

    #[test]
    fn real_browser_is_not_suspicious() {
        let parser = Parser::new();
        let ua = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                  (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
        let browser = browser_name(&parser, ua);
        assert!(!browser.is_empty());
        assert!(!is_suspicious(&browser));
    }

    #[test]
    fn empty_browser_never_matches_the_set() {
        // Guards against the substring check treating "" as contained.
        assert!(!is_suspicious(""));
    }
}
