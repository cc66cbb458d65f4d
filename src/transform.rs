//! Turns one chapter's HTML fragment into an XHTML body plus the stylesheet
//! declarations its page needs.

use url::Url;

use crate::cover;
use crate::dom::{Element, Node, XmlError};
use crate::links;
use crate::registry::{AssetRegistry, style_href};

pub const CONTENT_ID: &str = "sbo-rt-content";

const COVER_PAGE_CSS: &str = "<style>\
body{display:table;position:absolute;margin:0!important;height:100%;width:100%;}\
#Cover{display:table-cell;vertical-align:middle;text-align:center;}\
img{height:90vh;margin-left:auto;margin-right:auto;}\
</style>";

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error(
        "Parser: the page is behind an access-control check (rate limited?): {filename} ({title})"
    )]
    AccessControl { filename: String, title: String },

    #[error("Parser: book content's corrupted or not present: {filename} ({title})")]
    MissingContent { filename: String, title: String },

    #[error("Parser: error trying to parse HTML of this page: {filename} ({title})")]
    Malformed {
        filename: String,
        title: String,
        source: XmlError,
    },
}

/// Result of transforming one chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFragment {
    pub cover_url: Option<String>,
    /// `<link>` and `<style>` declarations, in discovery order.
    pub page_css: String,
    pub xhtml: String,
}

/// Per-chapter transformation context.
#[derive(Debug, Clone)]
pub struct ChapterTransformer<'a> {
    pub book_id: &'a str,
    /// Relative stylesheet links are resolved against this URL.
    pub base_url: Option<&'a Url>,
    pub filename: &'a str,
    pub title: &'a str,
}

impl ChapterTransformer<'_> {
    pub fn transform(
        &self,
        mut root: Element,
        is_first_page: bool,
        stylesheet_refs: &[String],
        registry: &mut AssetRegistry,
    ) -> Result<ParsedFragment, TransformError> {
        if has_access_control_marker(&root) {
            return Err(TransformError::AccessControl {
                filename: self.filename.to_owned(),
                title: self.title.to_owned(),
            });
        }
        if root.find_by_id("div", CONTENT_ID).is_none() {
            return Err(TransformError::MissingContent {
                filename: self.filename.to_owned(),
                title: self.title.to_owned(),
            });
        }

        let mut page_css = String::new();
        for url in stylesheet_refs {
            push_stylesheet_link(&mut page_css, registry.register(url));
        }

        let linked = root
            .descendants()
            .filter(|element| is_stylesheet_link(element))
            .filter_map(|element| element.attr("href"))
            .map(|href| self.resolve_stylesheet(href))
            .collect::<Vec<_>>();
        for url in &linked {
            push_stylesheet_link(&mut page_css, registry.register(url));
        }

        let mut style_error = None;
        root.visit_mut(&mut |element| {
            if !element.is("style") || style_error.is_some() {
                return;
            }
            let template = element
                .attr("data-template")
                .filter(|template| !template.is_empty())
                .map(str::to_owned);
            if let Some(template) = template {
                element.set_text(template);
                element.remove_attr("data-template");
            }
            match element.to_xml() {
                Ok(xml) => {
                    page_css.push_str(&xml);
                    page_css.push('\n');
                }
                Err(err) => style_error = Some(err),
            }
        });
        if let Some(err) = style_error {
            return Err(self.malformed(err));
        }

        replace_svg_images(&mut root);

        let Some(mut content) = root.find_by_id("div", CONTENT_ID).cloned() else {
            return Err(TransformError::MissingContent {
                filename: self.filename.to_owned(),
                title: self.title.to_owned(),
            });
        };
        rewrite_links(&mut content, self.book_id);

        let mut cover_url = None;
        if is_first_page
            && let Some(src) = cover::find_cover(&content)
                .and_then(|img| img.attr("src"))
                .map(str::to_owned)
        {
            tracing::debug!(filename = self.filename, %src, "found cover image");
            page_css = COVER_PAGE_CSS.to_owned();
            content = Element::new("div")
                .with_attr("id", "Cover")
                .with_child(Element::new("img").with_attr("src", src.as_str()));
            cover_url = Some(src);
        }

        let xhtml = content.to_xml().map_err(|err| self.malformed(err))?;
        Ok(ParsedFragment {
            cover_url,
            page_css,
            xhtml,
        })
    }

    fn malformed(&self, source: XmlError) -> TransformError {
        TransformError::Malformed {
            filename: self.filename.to_owned(),
            title: self.title.to_owned(),
            source,
        }
    }

    fn resolve_stylesheet(&self, href: &str) -> String {
        if let Some(rest) = href.strip_prefix("//") {
            return format!("https://{rest}");
        }
        match self.base_url.map(|base| base.join(href)) {
            Some(Ok(url)) => url.to_string(),
            Some(Err(err)) => {
                tracing::debug!(%href, ?err, "stylesheet href did not resolve; keeping it as-is");
                href.to_owned()
            }
            None => href.to_owned(),
        }
    }
}

fn push_stylesheet_link(page_css: &mut String, index: usize) {
    page_css.push_str(&format!(
        "<link href=\"{}\" rel=\"stylesheet\" type=\"text/css\" />\n",
        style_href(index)
    ));
}

fn is_stylesheet_link(element: &Element) -> bool {
    element.is("link") && element.attr("rel") == Some("stylesheet")
}

/// A `<div class="controls">` holding a labelled `<a>` is served instead of
/// the content when the site suspects automation.
fn has_access_control_marker(root: &Element) -> bool {
    root.descendants().any(|element| {
        element.is("div")
            && element.attr("class") == Some("controls")
            && element
                .child_elements()
                .any(|child| child.is("a") && !child.own_text().is_empty())
    })
}

/// Replaces each element wrapping an SVG `<image>` with a plain `<img>`
/// appended to the wrapper's parent.
fn replace_svg_images(element: &mut Element) {
    let mut sources = Vec::new();
    element.children.retain(|child| {
        let Node::Element(wrapper) = child else {
            return true;
        };
        let found = wrapper
            .child_elements()
            .filter(|image| image.is("image"))
            .filter_map(svg_image_href)
            .map(str::to_owned)
            .collect::<Vec<_>>();
        if found.is_empty() {
            return true;
        }
        sources.extend(found);
        false
    });

    for child in &mut element.children {
        if let Node::Element(child) = child {
            replace_svg_images(child);
        }
    }

    element.children.extend(
        sources
            .into_iter()
            .map(|src| Node::Element(Element::new("img").with_attr("src", src))),
    );
}

fn svg_image_href(image: &Element) -> Option<&str> {
    image
        .attrs
        .iter()
        .find(|(name, _)| name.contains("href"))
        .map(|(_, value)| value.as_str())
}

/// Rewrites link attributes plus CSS `url(...)` references in `style`
/// attributes and `<style>` text.
fn rewrite_links(content: &mut Element, book_id: &str) {
    content.visit_mut(&mut |element| {
        for (name, value) in &mut element.attrs {
            if links::LINK_ATTRIBUTES.contains(&name.as_str()) {
                *value = links::rewrite(value.trim(), book_id);
            } else if name.as_str() == "style" {
                *value = links::rewrite_css_urls(value, book_id);
            }
        }
        if element.is("style") {
            for child in &mut element.children {
                if let Node::Text(css) = child {
                    *css = links::rewrite_css_urls(css, book_id);
                }
            }
        }
    });
}
