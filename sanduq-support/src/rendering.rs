//! Text helpers for diagnostics.
//!
//! Resolution errors travel far from the code that caused them, so the
//! messages carry resolution paths, short type names and near-miss
//! suggestions. The helpers here only format; they know nothing about
//! containers or stores.

/// Joins a resolution path with arrows.
///
/// # Examples
/// ```
/// use sanduq_support::rendering::render_chain;
///
/// let path = ["Handler", "Session", "Pool", "Handler"];
/// assert_eq!(render_chain(&path), "Handler → Session → Pool → Handler");
/// ```
pub fn render_chain(chain: &[impl AsRef<str>]) -> String {
    chain
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(" → ")
}

/// Renders one item per line, each prefixed with `indent` and a dash.
///
/// ```
/// use sanduq_support::rendering::render_bullets;
///
/// let out = render_bullets(&["pool: timeout", "cache: refused"], 2);
/// assert_eq!(out, "\n  - pool: timeout\n  - cache: refused");
/// ```
pub fn render_bullets(items: &[impl AsRef<str>], indent: usize) -> String {
    let pad = " ".repeat(indent);
    items
        .iter()
        .map(|item| format!("\n{pad}- {}", item.as_ref()))
        .collect()
}

/// Strips module paths from a fully qualified type name.
///
/// ```
/// use sanduq_support::rendering::shorten_type_name;
///
/// assert_eq!(shorten_type_name("app::db::Pool"), "Pool");
/// assert_eq!(
///     shorten_type_name("alloc::vec::Vec<app::db::Pool>"),
///     "Vec<Pool>",
/// );
/// ```
pub fn shorten_type_name(full_name: &str) -> String {
    let mut out = String::with_capacity(full_name.len());
    let mut segment = String::new();
    let mut chars = full_name.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            ':' if chars.peek() == Some(&':') => {
                chars.next();
                segment.clear();
            }
            '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | ';' | '&' => {
                out.push_str(&segment);
                out.push(ch);
                segment.clear();
            }
            _ => segment.push(ch),
        }
    }

    out.push_str(&segment);
    out
}

/// Picks registered names that look like `requested`, best match first.
///
/// Substring matches on the full path rank highest, then matches on the
/// shortened name, then names sharing a prefix of at least three characters.
pub fn suggest_similar(requested: &str, available: &[&str], max: usize) -> Vec<String> {
    let requested_full = requested.to_lowercase();
    let requested_short = shorten_type_name(requested).to_lowercase();

    let mut scored: Vec<(&str, usize)> = available
        .iter()
        .filter_map(|&candidate| {
            let full = candidate.to_lowercase();
            if full == requested_full {
                return None;
            }
            if full.contains(&requested_full) || requested_full.contains(&full) {
                return Some((candidate, 100));
            }

            let short = shorten_type_name(candidate).to_lowercase();
            if short.contains(&requested_short) || requested_short.contains(&short) {
                return Some((candidate, 80));
            }

            let prefix = short
                .chars()
                .zip(requested_short.chars())
                .take_while(|(a, b)| a == b)
                .count();
            (prefix >= 3).then_some((candidate, prefix * 10))
        })
        .collect();

    scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    scored
        .into_iter()
        .take(max)
        .map(|(name, _)| name.to_string())
        .collect()
}
