use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use zip::write::SimpleFileOptions;

use crate::dom::escape_html;
use crate::formats::{BookMetadata, Chapter};
use crate::layout::BookLayout;
use crate::registry::style_file_name;
use crate::toc::NavMap;

const MIMETYPE: &str = "application/epub+zip";

const CONTAINER_XML: &str = "<?xml version=\"1.0\"?>\
<container version=\"1.0\" xmlns=\"urn:oasis:names:tc:opendocument:xmlns:container\">\
<rootfiles>\
<rootfile full-path=\"OEBPS/content.opf\" media-type=\"application/oebps-package+xml\" />\
</rootfiles>\
</container>";

/// Everything the package documents are generated from.
#[derive(Debug, Clone, Copy)]
pub struct PackageInput<'a> {
    pub book_id: &'a str,
    pub chapters: &'a [Chapter],
    pub metadata: &'a BookMetadata,
    pub toc: &'a NavMap,
    /// Chapter-relative path of the cover image, if one was found.
    pub cover: Option<&'a str>,
}

/// Writes the container files and package documents into `layout`, then zips
/// the whole book directory to `<book id>.epub`.
pub fn assemble(layout: &BookLayout, input: &PackageInput<'_>) -> anyhow::Result<PathBuf> {
    if input.chapters.is_empty() {
        anyhow::bail!("cannot assemble an EPUB without chapters");
    }

    fs::write(layout.root.join("mimetype"), MIMETYPE).context("write mimetype")?;

    let meta_inf = layout.root.join("META-INF");
    if meta_inf.is_dir() {
        tracing::debug!(path = %meta_inf.display(), "META-INF directory already exists");
    }
    fs::create_dir_all(&meta_inf)
        .with_context(|| format!("create META-INF dir: {}", meta_inf.display()))?;
    fs::write(meta_inf.join("container.xml"), CONTAINER_XML).context("write container.xml")?;

    let style_count = list_file_names(&layout.styles)
        .with_context(|| format!("list styles: {}", layout.styles.display()))?
        .len();
    let image_names = list_file_names(&layout.images)
        .with_context(|| format!("list images: {}", layout.images.display()))?;

    let content_opf = render_content_opf(input, style_count, &image_names);
    fs::write(layout.oebps.join("content.opf"), content_opf).context("write content.opf")?;

    let toc_ncx = render_toc_ncx(input);
    fs::write(layout.oebps.join("toc.ncx"), toc_ncx).context("write toc.ncx")?;

    let epub_path = layout.epub_path(input.book_id);
    zip_book_dir(&layout.root, &epub_path).context("zip book directory")?;
    Ok(epub_path)
}

/// Manifest id of a package file: its name without the last extension and
/// without dots.
fn manifest_stem(file_name: &str) -> String {
    let parts = file_name.split('.').collect::<Vec<_>>();
    if parts.len() < 2 {
        return file_name.to_owned();
    }
    parts[..parts.len() - 1].concat()
}

fn image_media_type(file_name: &str) -> String {
    let extension = file_name.rsplit('.').next().unwrap_or_default();
    if extension.contains("jp") {
        "image/jpeg".to_owned()
    } else {
        format!("image/{extension}")
    }
}

fn render_content_opf(input: &PackageInput<'_>, style_count: usize, images: &[String]) -> String {
    let mut manifest = Vec::new();
    let mut spine = Vec::new();
    for chapter in input.chapters {
        let filename = chapter.xhtml_filename();
        let item_id = escape_html(&manifest_stem(&filename));
        manifest.push(format!(
            "<item id=\"{item_id}\" href=\"{}\" media-type=\"application/xhtml+xml\" />",
            escape_html(&filename)
        ));
        spine.push(format!("<itemref idref=\"{item_id}\"/>"));
    }

    for image in images {
        manifest.push(format!(
            "<item id=\"img_{}\" href=\"Images/{}\" media-type=\"{}\" />",
            escape_html(&manifest_stem(image)),
            escape_html(image),
            escape_html(&image_media_type(image))
        ));
    }

    for index in 0..style_count {
        manifest.push(format!(
            "<item id=\"style_{index:02}\" href=\"Styles/{}\" media-type=\"text/css\" />",
            style_file_name(index)
        ));
    }

    let metadata = input.metadata;
    let authors = metadata
        .names("authors", "n/d")
        .iter()
        .map(|name| {
            let name = escape_html(name);
            format!("<dc:creator opf:file-as=\"{name}\" opf:role=\"aut\">{name}</dc:creator>")
        })
        .collect::<Vec<_>>()
        .join("\n");
    let subjects = metadata
        .names("subjects", "n/d")
        .iter()
        .map(|name| format!("<dc:subject>{}</dc:subject>\n", escape_html(name)))
        .collect::<String>();
    let publishers = metadata
        .names("publishers", "")
        .iter()
        .map(|name| escape_html(name))
        .collect::<Vec<_>>()
        .join(", ");
    let text = |key: &str| escape_html(&metadata.text_field(key).unwrap_or_default());

    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str(
        "<package xmlns=\"http://www.idpf.org/2007/opf\" unique-identifier=\"bookid\" version=\"2.0\" >\n",
    );
    out.push_str("<metadata xmlns:dc=\"http://purl.org/dc/elements/1.1/\"  xmlns:opf=\"http://www.idpf.org/2007/opf\">\n");
    out.push_str(&format!("<dc:title>{}</dc:title>\n", escape_html(metadata.title())));
    out.push_str(&authors);
    out.push('\n');
    out.push_str(&format!("<dc:description>{}</dc:description>\n", text("description")));
    out.push_str(&subjects);
    out.push_str(&format!("<dc:publisher>{publishers}</dc:publisher>\n"));
    out.push_str(&format!("<dc:rights>{}</dc:rights>\n", text("rights")));
    out.push_str("<dc:language>en-US</dc:language>\n");
    out.push_str(&format!("<dc:date>{}</dc:date>\n", text("issued")));
    out.push_str(&format!(
        "<dc:identifier id=\"bookid\">{}</dc:identifier>\n",
        escape_html(&metadata.identifier(input.book_id))
    ));
    out.push_str(&format!(
        "<meta name=\"cover\" content=\"{}\"/>\n",
        escape_html(input.cover.unwrap_or_default())
    ));
    out.push_str("</metadata>\n");
    out.push_str("<manifest>\n");
    out.push_str("<item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\" />\n");
    out.push_str(&manifest.join("\n"));
    out.push_str("\n</manifest>\n");
    out.push_str("<spine toc=\"ncx\">\n");
    out.push_str(&spine.join("\n"));
    out.push_str("</spine>\n");
    out.push_str(&format!(
        "<guide><reference href=\"{}\" title=\"Cover\" type=\"cover\" /></guide>\n",
        escape_html(&input.chapters[0].xhtml_filename())
    ));
    out.push_str("</package>");
    out
}

fn render_toc_ncx(input: &PackageInput<'_>) -> String {
    let metadata = input.metadata;
    let authors = metadata.names("authors", "").join(", ");

    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\" standalone=\"no\" ?>\n");
    out.push_str(
        "<!DOCTYPE ncx PUBLIC \"-//NISO//DTD ncx 2005-1//EN\" \"http://www.daisy.org/z3986/2005/ncx-2005-1.dtd\">\n",
    );
    out.push_str("<ncx xmlns=\"http://www.daisy.org/z3986/2005/ncx/\" version=\"2005-1\">\n");
    out.push_str("<head>\n");
    out.push_str(&format!(
        "<meta content=\"ID:ISBN:{}\" name=\"dtb:uid\"/>\n",
        escape_html(&metadata.identifier(input.book_id))
    ));
    out.push_str(&format!(
        "<meta content=\"{}\" name=\"dtb:depth\"/>\n",
        input.toc.max_depth
    ));
    out.push_str("<meta content=\"0\" name=\"dtb:totalPageCount\"/>\n");
    out.push_str("<meta content=\"0\" name=\"dtb:maxPageNumber\"/>\n");
    out.push_str("</head>\n");
    out.push_str(&format!(
        "<docTitle><text>{}</text></docTitle>\n",
        escape_html(metadata.title())
    ));
    out.push_str(&format!(
        "<docAuthor><text>{}</text></docAuthor>\n",
        escape_html(&authors)
    ));
    out.push_str(&format!("<navMap>{}</navMap>\n", input.toc.markup));
    out.push_str("</ncx>");
    out
}

/// Zips `book_dir` into `epub_path`, replacing any previous archive.
///
/// `mimetype` goes first and uncompressed; earlier `.epub` files in the
/// directory are not packed.
fn zip_book_dir(book_dir: &Path, epub_path: &Path) -> anyhow::Result<()> {
    let files = list_files_recursively_sorted(book_dir)
        .with_context(|| format!("list book files: {}", book_dir.display()))?;

    let out_file = File::create(epub_path)
        .with_context(|| format!("create epub output: {}", epub_path.display()))?;
    let mut zip = zip::ZipWriter::new(out_file);

    let mimetype_options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .unix_permissions(0o644);
    zip.start_file("mimetype", mimetype_options)
        .context("epub start_file mimetype")?;
    zip.write_all(MIMETYPE.as_bytes())
        .context("epub write mimetype")?;

    let deflated_options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    for path in files {
        let rel_path = path
            .strip_prefix(book_dir)
            .with_context(|| format!("strip book dir prefix: {}", path.display()))?;
        let name = rel_path.to_string_lossy().replace('\\', "/");
        if name == "mimetype" || name.ends_with(".epub") {
            continue;
        }

        let mut f = File::open(&path).with_context(|| format!("open: {}", path.display()))?;
        zip.start_file(name.as_str(), deflated_options)
            .with_context(|| format!("epub start_file: {name}"))?;
        std::io::copy(&mut f, &mut zip).with_context(|| format!("epub write: {name}"))?;
    }

    zip.finish().context("epub finish zip")?;
    Ok(())
}

fn list_file_names(dir: &Path) -> anyhow::Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read dir: {}", dir.display()))? {
        let entry = entry.with_context(|| format!("read dir entry: {}", dir.display()))?;
        if !entry.file_type().context("read entry type")?.is_file() {
            continue;
        }
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

fn list_files_recursively_sorted(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];

    while let Some(current) = stack.pop() {
        let mut entries = fs::read_dir(&current)
            .with_context(|| format!("read dir: {}", current.display()))?
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("list dir: {}", current.display()))?;
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let path = entry.path();
            let file_type = entry.file_type().context("read entry type")?;
            if file_type.is_dir() {
                stack.push(path);
                continue;
            }
            if file_type.is_file() {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use std::io::Read as _;

    use super::*;
    use crate::layout::BookLayout;

    fn metadata() -> BookMetadata {
        BookMetadata::from_api(serde_json::json!({
            "title": "Rust & You",
            "isbn": "9780000000001",
            "authors": [{"name": "Ann"}, {"name": "Bob"}],
            "subjects": [{"name": "Programming"}],
            "publishers": [{"name": "Pub One"}, {"name": "Pub Two"}],
            "description": "<p>About</p>",
            "rights": null,
            "issued": "2020-01-01",
        }))
        .expect("metadata")
    }

    #[test]
    fn manifest_stem_drops_last_extension_and_dots() {
        assert_eq!(manifest_stem("ch01.xhtml"), "ch01");
        assert_eq!(manifest_stem("part.one.xhtml"), "partone");
        assert_eq!(manifest_stem("README"), "README");
    }

    #[test]
    fn jpeg_like_extensions_normalize() {
        assert_eq!(image_media_type("a.jpg"), "image/jpeg");
        assert_eq!(image_media_type("a.jpeg"), "image/jpeg");
        assert_eq!(image_media_type("a.png"), "image/png");
        assert_eq!(image_media_type("a.gif"), "image/gif");
    }

    #[test]
    fn content_opf_lists_chapters_images_and_styles() {
        let chapters = vec![Chapter::local("cover.html", "Cover"), Chapter::local("ch01.html", "One")];
        let metadata = metadata();
        let toc = NavMap::default();
        let input = PackageInput {
            book_id: "42",
            chapters: &chapters,
            metadata: &metadata,
            toc: &toc,
            cover: Some("Images/cover.jpg"),
        };
        let opf = render_content_opf(&input, 2, &["cover.jpg".to_owned(), "fig.png".to_owned()]);

        assert!(opf.contains("<dc:title>Rust &amp; You</dc:title>"));
        assert!(opf.contains("<dc:creator opf:file-as=\"Ann\" opf:role=\"aut\">Ann</dc:creator>\n<dc:creator opf:file-as=\"Bob\""));
        assert!(opf.contains("<dc:subject>Programming</dc:subject>\n"));
        assert!(opf.contains("<dc:publisher>Pub One, Pub Two</dc:publisher>"));
        assert!(opf.contains("<dc:rights>n/a</dc:rights>"));
        assert!(opf.contains("<dc:description>&lt;p&gt;About&lt;/p&gt;</dc:description>"));
        assert!(opf.contains("<dc:identifier id=\"bookid\">9780000000001</dc:identifier>"));
        assert!(opf.contains("<meta name=\"cover\" content=\"Images/cover.jpg\"/>"));
        assert!(opf.contains("<item id=\"cover\" href=\"cover.xhtml\" media-type=\"application/xhtml+xml\" />"));
        assert!(opf.contains("<item id=\"img_cover\" href=\"Images/cover.jpg\" media-type=\"image/jpeg\" />"));
        assert!(opf.contains("<item id=\"img_fig\" href=\"Images/fig.png\" media-type=\"image/png\" />"));
        assert!(opf.contains("<item id=\"style_00\" href=\"Styles/Style00.css\" media-type=\"text/css\" />"));
        assert!(opf.contains("<item id=\"style_01\" href=\"Styles/Style01.css\" media-type=\"text/css\" />"));
        assert!(!opf.contains("style_02"));
        assert!(opf.contains("<spine toc=\"ncx\">\n<itemref idref=\"cover\"/>\n<itemref idref=\"ch01\"/></spine>"));
        assert!(opf.contains("<guide><reference href=\"cover.xhtml\" title=\"Cover\" type=\"cover\" /></guide>"));
    }

    #[test]
    fn toc_ncx_declares_depth_and_identifier() {
        let chapters = vec![Chapter::local("ch01.html", "One")];
        let metadata = BookMetadata::from_api(serde_json::json!({"title": "T", "authors": [{"name": "Ann"}]}))
            .expect("metadata");
        let toc = NavMap {
            markup: "<navPoint/>".to_owned(),
            total: 1,
            max_depth: 3,
        };
        let input = PackageInput {
            book_id: "42",
            chapters: &chapters,
            metadata: &metadata,
            toc: &toc,
            cover: None,
        };
        let ncx = render_toc_ncx(&input);
        assert!(ncx.contains("<meta content=\"ID:ISBN:42\" name=\"dtb:uid\"/>"));
        assert!(ncx.contains("<meta content=\"3\" name=\"dtb:depth\"/>"));
        assert!(ncx.contains("<docAuthor><text>Ann</text></docAuthor>"));
        assert!(ncx.contains("<navMap><navPoint/></navMap>"));
    }

    #[test]
    fn assemble_zips_the_book_directory() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let layout = BookLayout::new(temp.path(), "Rust", "42");
        layout.create()?;
        fs::write(layout.chapter_path("ch01.xhtml"), "<html/>")?;
        fs::write(layout.styles.join("Style00.css"), "body{}")?;
        fs::write(layout.images.join("fig.png"), [0_u8, 1, 2])?;
        fs::write(layout.epub_path("42"), "stale archive")?;

        let chapters = vec![Chapter::local("ch01.html", "One")];
        let metadata = metadata();
        let toc = NavMap::default();
        let epub = assemble(
            &layout,
            &PackageInput {
                book_id: "42",
                chapters: &chapters,
                metadata: &metadata,
                toc: &toc,
                cover: None,
            },
        )?;
        assert_eq!(epub, layout.epub_path("42"));

        let mut archive = zip::ZipArchive::new(File::open(&epub)?)?;
        {
            let mut first = archive.by_index(0)?;
            assert_eq!(first.name(), "mimetype");
            assert_eq!(first.compression(), zip::CompressionMethod::Stored);
            let mut body = String::new();
            first.read_to_string(&mut body)?;
            assert_eq!(body, MIMETYPE);
        }

        let names = archive.file_names().map(str::to_owned).collect::<Vec<_>>();
        for expected in [
            "META-INF/container.xml",
            "OEBPS/content.opf",
            "OEBPS/toc.ncx",
            "OEBPS/ch01.xhtml",
            "OEBPS/Styles/Style00.css",
            "OEBPS/Images/fig.png",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected} in {names:?}");
        }
        assert!(!names.iter().any(|n| n.ends_with(".epub")));
        assert_eq!(names.iter().filter(|n| *n == "mimetype").count(), 1);
        Ok(())
    }
}
