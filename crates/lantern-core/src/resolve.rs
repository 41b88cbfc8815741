//! Address-bar input to concrete destination.

use url::Url;

use crate::destination::{Destination, SPECIAL_SCHEME};
use crate::search::SearchEngine;

pub const HOME_SENTINEL: &str = "home";

const NETWORK_SCHEMES: &[&str] = &["http", "https", "ftp", "file", "ws", "wss"];

/// Total: input that is neither a special page, a url nor a bare domain
/// becomes a search query.
pub fn resolve(input: &str, home: &Destination, engine: &SearchEngine) -> Destination {
    let trimmed = input.trim();

    if trimmed == HOME_SENTINEL {
        return home.clone();
    }
    if trimmed.starts_with(SPECIAL_SCHEME) || has_network_scheme(trimmed) {
        return Destination::parse(trimmed);
    }
    if trimmed.contains('.') && !trimmed.contains(char::is_whitespace) {
        return Destination::Web(format!("https://{trimmed}"));
    }
    Destination::Web(engine.query_url_for(trimmed))
}

fn has_network_scheme(input: &str) -> bool {
    match Url::parse(input) {
        Ok(url) => NETWORK_SCHEMES.contains(&url.scheme()),
        Err(_) => false,
    }
}
