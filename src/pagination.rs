//! Next-page discovery for HTML listing pages.
//!
//! Tried in order: page limit, explicit "next" control, numbered link,
//! then a synthesized `page=` increment on the current URL.

use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use url::Url;

static ANCHORS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid anchor selector"));

const NEXT_LABELS: [&str; 2] = ["next", "weiter"];
const NEXT_TEXTS: [&str; 8] = ["weiter", "nächste", "nächste seite", "next", ">", "»", "›", "→"];

/// URL of the listing page after `current_page`, or `None` at the page limit.
pub fn resolve_next_page(
    document: &Html,
    current_url: &Url,
    current_page: u32,
    page_limit: u32,
) -> Option<Url> {
    let next_page = current_page.saturating_add(1);
    if next_page > page_limit {
        return None;
    }

    let anchors: Vec<(ElementRef<'_>, Url)> = document
        .select(&ANCHORS)
        .filter_map(|a| usable_href(a, current_url).map(|url| (a, url)))
        .collect();

    let passes: [fn(ElementRef<'_>) -> bool; 3] = [is_rel_next, has_next_label, has_next_text];
    let explicit = passes
        .iter()
        .find_map(|matches| {
            anchors
                .iter()
                .find(|(a, _)| !is_disabled(*a) && matches(*a))
                .map(|(_, url)| url.clone())
        });
    if explicit.is_some() {
        return explicit;
    }

    let numbered = anchors.iter().find(|(a, url)| {
        trimmed_text(*a) == next_page.to_string() || page_param(url) == Some(next_page)
    });
    if let Some((_, url)) = numbered {
        return Some(url.clone());
    }

    let from_url = page_param(current_url).filter(|p| *p > 0).unwrap_or(current_page);
    Some(with_page(current_url, from_url.saturating_add(1)))
}

fn usable_href(anchor: ElementRef<'_>, base: &Url) -> Option<Url> {
    let href = anchor.value().attr("href")?.trim();
    if href.is_empty() || href == "#" || href.to_ascii_lowercase().starts_with("javascript:") {
        return None;
    }
    base.join(href).ok()
}

fn is_rel_next(anchor: ElementRef<'_>) -> bool {
    anchor
        .value()
        .attr("rel")
        .is_some_and(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("next")))
}

fn has_next_label(anchor: ElementRef<'_>) -> bool {
    anchor.value().attr("aria-label").is_some_and(|label| {
        let label = label.to_lowercase();
        NEXT_LABELS.iter().any(|word| label.contains(word))
    })
}

fn has_next_text(anchor: ElementRef<'_>) -> bool {
    let text = trimmed_text(anchor).to_lowercase();
    NEXT_TEXTS.contains(&text.as_str())
}

fn is_disabled(anchor: ElementRef<'_>) -> bool {
    let el = anchor.value();
    el.classes().any(|c| c == "disabled")
        || el.attr("aria-disabled") == Some("true")
        || el.attr("disabled").is_some()
}

fn trimmed_text(anchor: ElementRef<'_>) -> String {
    anchor.text().collect::<String>().trim().to_string()
}

/// Value of the `page` query parameter, if numeric.
pub fn page_param(url: &Url) -> Option<u32> {
    url.query_pairs()
        .find(|(key, _)| key == "page")
        .and_then(|(_, value)| value.parse().ok())
}

/// Copy of `url` with its `page` parameter set to `page`, other parameters kept in order.
pub fn with_page(url: &Url, page: u32) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "page")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut next = url.clone();
    next.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("page", &page.to_string());
    next
}
