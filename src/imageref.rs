//! Embedded image references in question and answer text.
//!
//! Question text may carry `![image](<filename>)` tokens. Display strips the
//! token; the filename resolves to a URL on the static media server.

use std::sync::OnceLock;

use regex::Regex;

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"!\[image\]\((.*?)\)").expect("image token pattern"))
}

/// Splits `text` into the displayable remainder and the referenced image
/// URLs, resolved against `base_url` (e.g. `http://host:8080/images`).
pub fn parse_images(text: &str, base_url: &str) -> (String, Vec<String>) {
    let re = token_re();
    let urls = re
        .captures_iter(text)
        .map(|cap| format!("{}/{}", base_url.trim_end_matches('/'), &cap[1]))
        .collect();
    let cleaned = re.replace_all(text, "").trim().to_string();
    (cleaned, urls)
}
