//! Inlining stored critical CSS into served pages
//!
//! The stylesheet tag of a page's configured handle (`<link id="<handle>-css">`)
//! is preceded by a `<style>` block with the stored critical CSS, and its
//! `media="all"` is swapped for a print-then-all swap so the full stylesheet
//! no longer blocks rendering.

use crate::registry::PageConfig;
use crate::storage::{CssStore, StorageResult};
use scraper::{Html, Selector};

const DEFERRED_MEDIA: &str = r#"media="print" onload="this.media='all'; this.onload=null;""#;

/// Prepends `critical_css` to a stylesheet tag and defers the tag itself
///
/// # Example
///
/// ```
/// use critpath::inline::rewrite_tag;
///
/// let tag = r#"<link rel="stylesheet" id="theme-css" href="/style.css" media="all" />"#;
/// let rewritten = rewrite_tag(tag, "body{margin:0}");
/// assert!(rewritten.starts_with("<style>body{margin:0}</style>\n<link"));
/// assert!(rewritten.contains(r#"media="print""#));
/// ```
pub fn rewrite_tag(tag: &str, critical_css: &str) -> String {
    let deferred = tag
        .replace(r#"media="all""#, DEFERRED_MEDIA)
        .replace("media='all'", DEFERRED_MEDIA);
    format!("<style>{}</style>\n{}", critical_css, deferred)
}

/// Handle of a stylesheet `<link>` tag, taken from its `<handle>-css` id
pub fn handle_of(tag: &str) -> Option<String> {
    let fragment = Html::parse_fragment(tag);
    let selector = Selector::parse("link[id]").ok()?;
    let link = fragment.select(&selector).next()?;
    let id = link.value().attr("id")?;
    id.strip_suffix("-css").map(str::to_string)
}

/// Inlines the stored critical CSS for `page` into an HTML document
///
/// Only the first `<link>` whose handle matches the page's handle is
/// rewritten. The document is returned unchanged when the page has no handle,
/// nothing is stored for it, or no tag matches.
pub fn inline_critical_css(
    html: &str,
    page: &PageConfig,
    store: &dyn CssStore,
) -> StorageResult<String> {
    let Some(handle) = page.handle.as_deref() else {
        return Ok(html.to_string());
    };

    let css = match store.get(&page.storage_key)? {
        Some(stored) if !stored.css.is_empty() => stored.css,
        _ => {
            tracing::debug!("No critical CSS stored for {}", page.url);
            return Ok(html.to_string());
        }
    };

    match find_link_tag(html, handle) {
        Some((start, end)) => Ok(format!(
            "{}{}{}",
            &html[..start],
            rewrite_tag(&html[start..end], &css),
            &html[end..]
        )),
        None => {
            tracing::debug!("No stylesheet tag for handle {} on {}", handle, page.url);
            Ok(html.to_string())
        }
    }
}

/// Byte range of the first `<link>` tag carrying `handle`
fn find_link_tag(html: &str, handle: &str) -> Option<(usize, usize)> {
    let lower = html.to_ascii_lowercase();
    let mut offset = 0;

    while let Some(found) = lower[offset..].find("<link") {
        let start = offset + found;
        let end = start + lower[start..].find('>')? + 1;
        if handle_of(&html[start..end]).as_deref() == Some(handle) {
            return Some((start, end));
        }
        offset = end;
    }
    None
}
