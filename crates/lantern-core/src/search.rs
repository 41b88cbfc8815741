use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters left alone by `encodeURIComponent`.
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub const DEFAULT_SEARCH_ENGINE_ID: &str = "1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchEngine {
    pub id: &'static str,
    pub name: &'static str,
    pub query_url: &'static str,
}

pub const SEARCH_ENGINES: &[SearchEngine] = &[
    SearchEngine {
        id: "1",
        name: "Google",
        query_url: "https://www.google.com/search?q=",
    },
    SearchEngine {
        id: "2",
        name: "Bing",
        query_url: "https://www.bing.com/search?q=",
    },
    SearchEngine {
        id: "3",
        name: "DuckDuckGo",
        query_url: "https://duckduckgo.com/?q=",
    },
];

impl SearchEngine {
    pub fn find(id: &str) -> Option<&'static SearchEngine> {
        SEARCH_ENGINES.iter().find(|engine| engine.id == id)
    }

    pub fn find_or_default(id: &str) -> &'static SearchEngine {
        Self::find(id).unwrap_or(&SEARCH_ENGINES[0])
    }

    pub fn query_url_for(&self, query: &str) -> String {
        format!(
            "{}{}",
            self.query_url,
            utf8_percent_encode(query, QUERY_COMPONENT)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::SearchEngine;

    #[test]
    fn query_is_component_encoded() {
        let google = SearchEngine::find("1").expect("google is built in");
        assert_eq!(
            google.query_url_for("hello world"),
            "https://www.google.com/search?q=hello%20world"
        );
        assert_eq!(
            google.query_url_for("a&b=c/d?(e)"),
            "https://www.google.com/search?q=a%26b%3Dc%2Fd%3F(e)"
        );
    }

    #[test]
    fn unknown_engine_falls_back_to_default() {
        assert_eq!(SearchEngine::find_or_default("42").name, "Google");
        assert_eq!(SearchEngine::find_or_default("3").name, "DuckDuckGo");
    }
}
