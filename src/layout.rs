use std::path::{Path, PathBuf};

use anyhow::Context as _;

const DIRNAME_RESERVED: &[char] = &[
    '~', '#', '%', '&', '*', '{', '}', '\\', '<', '>', '?', '/', '`', '\'', '"', '|', '+', ':',
];

/// On-disk layout of one book being assembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookLayout {
    pub root: PathBuf,
    pub oebps: PathBuf,
    pub styles: PathBuf,
    pub images: PathBuf,
}

/// Which directories already existed before this run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExistingDirs {
    pub oebps: bool,
    pub styles: bool,
    pub images: bool,
}

impl BookLayout {
    pub fn new(books_dir: &Path, title: &str, book_id: &str) -> Self {
        let root = books_dir.join(book_dir_name(title, book_id));
        let oebps = root.join("OEBPS");
        Self {
            styles: oebps.join("Styles"),
            images: oebps.join("Images"),
            oebps,
            root,
        }
    }

    /// Creates missing directories and reports the ones found in place.
    pub fn create(&self) -> anyhow::Result<ExistingDirs> {
        if self.root.is_dir() {
            tracing::debug!(path = %self.root.display(), "book directory already exists");
        }
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("create book dir: {}", self.root.display()))?;

        let existing = ExistingDirs {
            oebps: self.oebps.is_dir(),
            styles: self.styles.is_dir(),
            images: self.images.is_dir(),
        };
        for dir in [&self.oebps, &self.styles, &self.images] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create book dir: {}", dir.display()))?;
        }
        Ok(existing)
    }

    pub fn chapter_path(&self, xhtml_filename: &str) -> PathBuf {
        self.oebps.join(xhtml_filename)
    }

    pub fn epub_path(&self, book_id: &str) -> PathBuf {
        self.root.join(format!("{book_id}.epub"))
    }
}

/// Directory name for a book: the escaped title cut to its first two
/// comma-separated parts, followed by ` (<book id>)`.
pub fn book_dir_name(title: &str, book_id: &str) -> String {
    let escaped = escape_dirname(title);
    let head = escaped.split(',').take(2).collect::<String>();
    format!("{head} ({book_id})")
}

/// Makes a title safe to use as a directory name.
///
/// A colon past the 15th character ends the title (subtitles are dropped).
pub fn escape_dirname(dirname: &str) -> String {
    let dirname = match dirname.find(':') {
        Some(pos) if pos > 15 => &dirname[..pos],
        _ => dirname,
    };
    dirname.replace(DIRNAME_RESERVED, "_")
}

/// Writes `contents` to `path` unless the file already exists.
///
/// Returns `false` when the existing file was kept.
pub fn write_new_file(path: &Path, contents: &[u8]) -> anyhow::Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    let parent_dir = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("output path must have parent: {}", path.display()))?;
    std::fs::create_dir_all(parent_dir)
        .with_context(|| format!("create parent dir: {}", parent_dir.display()))?;
    std::fs::write(path, contents).with_context(|| format!("write: {}", path.display()))?;
    Ok(true)
}
