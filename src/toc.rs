use crate::dom::escape_html;
use crate::formats::TocNode;

/// Flattened `<navMap>` contents for `toc.ncx`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavMap {
    pub markup: String,
    /// Number of nav points, which is also the last play order.
    pub total: usize,
    /// Declared as `dtb:depth`.
    pub max_depth: u32,
}

pub fn build(nodes: &[TocNode]) -> NavMap {
    let (markup, total, max_depth) = build_from(nodes, 0, 0);
    NavMap {
        markup,
        total,
        max_depth,
    }
}

/// Emits nav points for `nodes` in pre-order.
///
/// `children` is the play order of the last emitted point and `depth` the
/// largest depth seen so far anywhere in the traversal; both are returned
/// updated so that siblings and parents continue from them.
pub fn build_from(nodes: &[TocNode], mut children: usize, mut depth: u32) -> (String, usize, u32) {
    let mut navmap = String::new();
    for node in nodes {
        children += 1;
        depth = depth.max(node.depth);

        let id = if node.fragment.is_empty() {
            &node.id
        } else {
            &node.fragment
        };
        navmap.push_str(&format!(
            "<navPoint id=\"{}\" playOrder=\"{}\"><navLabel><text>{}</text></navLabel><content src=\"{}\"/>",
            escape_html(id),
            children,
            escape_html(&node.label),
            escape_html(&content_src(&node.href)),
        ));

        if !node.children.is_empty() {
            let (nested, nested_children, nested_depth) =
                build_from(&node.children, children, depth);
            navmap.push_str(&nested);
            children = nested_children;
            depth = nested_depth;
        }

        navmap.push_str("</navPoint>\n");
    }

    (navmap, children, depth)
}

fn content_src(href: &str) -> String {
    let href = href.replace(".html", ".xhtml");
    href.rsplit('/').next().unwrap_or_default().to_owned()
}
