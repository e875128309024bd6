use select::document::Document;
use select::predicate::Name;

/// Returns the `src` of the first `<img>` in an HTML fragment.
///
/// Images without a usable `src` are skipped. `None` when the fragment has
/// no image at all.
pub fn first_image(html: &str) -> Option<String> {
    // Skip building a DOM for fragments that cannot contain an image
    if !html.to_ascii_lowercase().contains("<img") {
        return None;
    }

    Document::from(html)
        .find(Name("img"))
        .filter_map(|node| node.attr("src"))
        .map(str::trim)
        .find(|src| !src.is_empty())
        .map(str::to_string)
}
