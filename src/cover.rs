use crate::dom::Element;

const COVER_TOKEN: &str = "cover";
const CONTAINER_ATTRIBUTES: &[&str] = &["id", "class", "name", "src"];
const IMAGE_ATTRIBUTES: &[&str] = &["id", "class", "name", "src", "alt"];

/// Finds the `<img>` most likely to be the book cover.
///
/// Tiers, in strict priority: an `<img>` whose own attributes mention
/// "cover", then an `<img>` inside such a `<div>`, then one inside such an
/// `<a>`. Within a tier the first match in document order wins.
pub fn find_cover(content: &Element) -> Option<&Element> {
    content
        .find(|element| element.is("img") && mentions_cover(element, IMAGE_ATTRIBUTES))
        .or_else(|| first_img_inside(content, "div", false))
        .or_else(|| first_img_inside(content, "a", false))
}

fn mentions_cover(element: &Element, attributes: &[&str]) -> bool {
    attributes.iter().any(|name| {
        element
            .attr(name)
            .is_some_and(|value| value.to_lowercase().contains(COVER_TOKEN))
    })
}

fn first_img_inside<'a>(
    element: &'a Element,
    container: &str,
    inside_container: bool,
) -> Option<&'a Element> {
    if inside_container && element.is("img") {
        return Some(element);
    }

    let inside_container = inside_container
        || (element.is(container) && mentions_cover(element, CONTAINER_ATTRIBUTES));
    element
        .child_elements()
        .find_map(|child| first_img_inside(child, container, inside_container))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_html;

    fn content(html: &str) -> Element {
        let root = parse_html(&format!(r#"<div id="sbo-rt-content">{html}</div>"#));
        root.find_by_id("div", "sbo-rt-content")
            .cloned()
            .expect("content container")
    }

    fn cover_src(html: &str) -> Option<String> {
        let content = content(html);
        find_cover(&content).and_then(|img| img.attr("src").map(str::to_owned))
    }

    #[test]
    fn image_attributes_win_first() {
        let html = r#"<div class="cover"><img src="a.png"/></div><img alt="The COVER" src="b.png"/>"#;
        assert_eq!(cover_src(html).as_deref(), Some("b.png"));
    }

    #[test]
    fn image_match_is_case_insensitive_on_every_attribute() {
        assert_eq!(cover_src(r#"<img id="BookCover" src="1.png"/>"#).as_deref(), Some("1.png"));
        assert_eq!(cover_src(r#"<img name="cover-art" src="2.png"/>"#).as_deref(), Some("2.png"));
        assert_eq!(cover_src(r#"<img src="Images/Cover.jpg"/>"#).as_deref(), Some("Images/Cover.jpg"));
    }

    #[test]
    fn falls_back_to_div_then_anchor() {
        let html = r#"<a id="cover-link"><img src="a.png"/></a><div id="front-cover"><p><img src="d.png"/></p></div>"#;
        assert_eq!(cover_src(html).as_deref(), Some("d.png"));

        let html = r#"<p><img src="x.png"/></p><a class="Cover"><img src="a.png"/></a>"#;
        assert_eq!(cover_src(html).as_deref(), Some("a.png"));
    }

    #[test]
    fn alt_does_not_count_for_containers() {
        assert_eq!(cover_src(r#"<div alt="cover"><img src="a.png"/></div>"#), None);
    }

    #[test]
    fn no_candidate_returns_none() {
        assert_eq!(cover_src(r#"<p>Preface</p><img src="fig.png"/>"#), None);
    }
}
