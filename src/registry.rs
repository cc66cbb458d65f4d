use std::collections::HashMap;

/// Insertion-ordered set of asset URLs discovered during a run.
///
/// URLs are compared by their literal text. The position a URL was first
/// registered at is its index for the rest of the run and decides the on-disk
/// file name of stylesheets (`Style{index:02}.css`).
#[derive(Debug, Clone, Default)]
pub struct AssetRegistry {
    urls: Vec<String>,
    positions: HashMap<String, usize>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index of `url`, appending it first if it was never seen.
    pub fn register(&mut self, url: &str) -> usize {
        if let Some(&index) = self.positions.get(url) {
            return index;
        }

        let index = self.urls.len();
        self.urls.push(url.to_owned());
        self.positions.insert(url.to_owned(), index);
        tracing::debug!(%url, index, "found new asset");
        index
    }

    pub fn index_of(&self, url: &str) -> Option<usize> {
        self.positions.get(url).copied()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.urls.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.urls.iter().map(String::as_str).enumerate()
    }
}

pub fn style_file_name(index: usize) -> String {
    format!("Style{index:02}.css")
}

/// Chapter-relative href of a registered stylesheet.
pub fn style_href(index: usize) -> String {
    format!("Styles/{}", style_file_name(index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_follow_first_discovery() {
        let mut registry = AssetRegistry::new();
        assert_eq!(registry.register("https://a/x.css"), 0);
        assert_eq!(registry.register("https://a/y.css"), 1);
        assert_eq!(registry.register("https://a/x.css"), 0);
        assert_eq!(registry.register("https://a/z.css"), 2);
        assert_eq!(registry.len(), 3);
        assert_eq!(
            registry.iter().collect::<Vec<_>>(),
            vec![(0, "https://a/x.css"), (1, "https://a/y.css"), (2, "https://a/z.css")]
        );
    }

    #[test]
    fn urls_are_compared_literally() {
        let mut registry = AssetRegistry::new();
        registry.register("https://a/x.css");
        assert_eq!(registry.register("https://a/./x.css"), 1);
        assert_eq!(registry.index_of("https://A/x.css"), None);
    }

    #[test]
    fn style_names_are_zero_padded() {
        assert_eq!(style_file_name(3), "Style03.css");
        assert_eq!(style_file_name(12), "Style12.css");
        assert_eq!(style_href(0), "Styles/Style00.css");
    }
}
