//! Maps links found in chapter markup to their location inside the package.

use url::Url;

const IMAGE_PATH_MARKERS: &[&str] = &["cover", "images", "graphics"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];

/// Attributes whose values are treated as links.
pub const LINK_ATTRIBUTES: &[&str] = &[
    "href",
    "src",
    "action",
    "background",
    "cite",
    "codebase",
    "data",
    "longdesc",
    "lowsrc",
    "usemap",
    "poster",
];

/// Rewrites one link for the packaged book.
///
/// Relative image references collapse to `Images/<basename>`, relative page
/// references switch `.html` to `.xhtml`, and absolute links that embed the
/// book id are reduced to the part after the id and rewritten again.
/// Everything else is returned unchanged.
pub fn rewrite(link: &str, book_id: &str) -> String {
    if link.is_empty() || link.starts_with("mailto") {
        return link.to_owned();
    }

    if !has_network_location(link) {
        if IMAGE_PATH_MARKERS.iter().any(|marker| link.contains(marker)) || is_image_link(link) {
            let basename = link.rsplit('/').next().unwrap_or(link);
            return format!("Images/{basename}");
        }
        return link.replace(".html", ".xhtml");
    }

    if !book_id.is_empty()
        && let Some((_, suffix)) = link.rsplit_once(book_id)
    {
        return rewrite(suffix, book_id);
    }

    link.to_owned()
}

/// True when the link carries an authority (`//host`), with or without a scheme.
pub fn has_network_location(link: &str) -> bool {
    match Url::parse(link) {
        Ok(url) => {
            url.host_str().is_some_and(|host| !host.is_empty())
                && link
                    .get(url.scheme().len() + 1..)
                    .is_some_and(|rest| rest.starts_with("//"))
        }
        Err(url::ParseError::RelativeUrlWithoutBase) => link
            .strip_prefix("//")
            .and_then(|authority| authority.chars().next())
            .is_some_and(|c| !matches!(c, '/' | '?' | '#')),
        // A bad port or host still names an authority.
        Err(_) => link.contains("://"),
    }
}

/// Rewrites every `url(...)` reference in a CSS string with [`rewrite`].
///
/// Quoted references keep their quotes.
pub fn rewrite_css_urls(css: &str, book_id: &str) -> String {
    let lowered = css.to_ascii_lowercase();
    let mut out = String::with_capacity(css.len());
    let mut pos = 0;

    while let Some(found) = lowered[pos..].find("url(") {
        let open = pos + found + "url(".len();
        out.push_str(&css[pos..open]);
        let rest = &css[open..];

        let quoted = rest
            .chars()
            .next()
            .filter(|quote| matches!(quote, '"' | '\''))
            .and_then(|quote| {
                let end = rest[1..].find(quote)? + 1;
                rest[end + 1..].starts_with(')').then_some((quote, end))
            });

        match quoted {
            Some((quote, end)) => {
                out.push(quote);
                out.push_str(&rewrite(rest[1..end].trim(), book_id));
                out.push(quote);
                out.push(')');
                pos = open + end + 2;
            }
            None => match rest.find(')') {
                Some(close) => {
                    out.push_str(&rewrite(rest[..close].trim(), book_id));
                    out.push(')');
                    pos = open + close + 1;
                }
                None => {
                    pos = open;
                    break;
                }
            },
        }
    }

    out.push_str(&css[pos..]);
    out
}

fn is_image_link(link: &str) -> bool {
    let name = link
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    match name.rfind('.') {
        Some(dot) if dot > 0 && dot + 1 < name.len() => {
            let extension = name[dot + 1..].to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&extension.as_str())
        }
        _ => false,
    }
}
