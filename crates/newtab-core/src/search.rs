use regex::Regex;
use std::sync::OnceLock;

pub const SEARCH_ENDPOINT: &str = "https://www.google.com/search?q=";

/// Where the search bar sends the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Url(String),
    Search(String),
}

impl Navigation {
    pub fn target(&self) -> &str {
        match self {
            Navigation::Url(url) | Navigation::Search(url) => url,
        }
    }
}

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(https?://)?([0-9a-z.-]+)\.([a-z.]{2,6})([/0-9A-Za-z_ .-]*)*/?$")
            .unwrap_or_else(|err| panic!("url pattern: {err}"))
    })
}

pub fn looks_like_url(input: &str) -> bool {
    url_pattern().is_match(input)
}

/// Classifies search-bar input. Blank input navigates nowhere.
pub fn classify(input: &str) -> Option<Navigation> {
    if input.trim().is_empty() {
        return None;
    }
    if looks_like_url(input) {
        let url = if input.starts_with("http") {
            input.to_string()
        } else {
            format!("https://{input}")
        };
        Some(Navigation::Url(url))
    } else {
        // Everything outside `A-Za-z0-9-._~` is escaped, including `!'()*`.
        Some(Navigation::Search(format!(
            "{SEARCH_ENDPOINT}{}",
            urlencoding::encode(input)
        )))
    }
}
