use std::borrow::Cow;

/// Maximum status length accepted by the publishing service.
pub const MAX_STATUS_CHARS: usize = 280;

/// Every link counts as this many characters once the service wraps it.
pub const LINK_WEIGHT: usize = 23;

const ELLIPSIS: char = '…';

/// Collapses a feed title onto a single line.
///
/// Control characters (newlines, tabs, escape sequences' ESC byte, DEL) are
/// treated as whitespace, runs of whitespace become one space, and the
/// result is trimmed. Returns `Cow::Borrowed` when nothing changes.
///
/// # Examples
///
/// ```
/// use feedbird::util::clean_title;
///
/// assert_eq!(clean_title("  Rust\n 1.80\treleased "), "Rust 1.80 released");
/// assert_eq!(clean_title("Already clean"), "Already clean");
/// ```
pub fn clean_title(s: &str) -> Cow<'_, str> {
    // Clean means: only plain spaces, never leading, trailing or doubled
    let mut prev_space = true;
    let mut needs_clean = false;
    for c in s.chars() {
        if c == ' ' {
            needs_clean |= prev_space;
            prev_space = true;
        } else if c.is_whitespace() || c.is_control() {
            needs_clean = true;
            break;
        } else {
            prev_space = false;
        }
    }
    needs_clean |= prev_space && !s.is_empty();
    if !needs_clean {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    for word in s
        .split(|c: char| c.is_whitespace() || c.is_control())
        .filter(|w| !w.is_empty())
    {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    Cow::Owned(out)
}

/// Truncates to at most `max_chars` characters, ending in an ellipsis when
/// anything was cut.
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    if s.chars().count() <= max_chars {
        return Cow::Borrowed(s);
    }
    if max_chars == 0 {
        return Cow::Borrowed("");
    }

    let kept: String = s.chars().take(max_chars - 1).collect();
    let mut out = kept.trim_end().to_string();
    out.push(ELLIPSIS);
    Cow::Owned(out)
}

/// Builds the status text for an entry: `"<title> <link>"`.
///
/// The title is cleaned and truncated so the status stays within
/// [`MAX_STATUS_CHARS`], counting the link as [`LINK_WEIGHT`].
///
/// # Examples
///
/// ```
/// use feedbird::util::compose_status;
///
/// assert_eq!(
///     compose_status("Hello\nworld", Some("https://example.com/a")),
///     "Hello world https://example.com/a"
/// );
/// assert_eq!(compose_status("No link", None), "No link");
/// ```
pub fn compose_status(title: &str, link: Option<&str>) -> String {
    let title = clean_title(title);
    let link = link.map(str::trim).filter(|l| !l.is_empty());

    match link {
        Some(link) => {
            let budget = MAX_STATUS_CHARS - LINK_WEIGHT - 1;
            let title = truncate_chars(&title, budget);
            if title.is_empty() {
                link.to_string()
            } else {
                format!("{} {}", title, link)
            }
        }
        None => truncate_chars(&title, MAX_STATUS_CHARS).into_owned(),
    }
}
