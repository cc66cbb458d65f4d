//! Drives one book download from login check to the packaged EPUB.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use url::Url;

use crate::config::Config;
use crate::dom;
use crate::epub::{self, PackageInput};
use crate::formats::{
    ApiVersion, BookMetadata, Chapter, ChapterPage, TocNode, api_error_message, is_api_error,
};
use crate::layout::{BookLayout, ExistingDirs, write_new_file};
use crate::page;
use crate::registry::{AssetRegistry, style_file_name};
use crate::session::Session;
use crate::toc;
use crate::transform::{CONTENT_ID, ChapterTransformer, ParsedFragment};

const RESUME_HINT: &str =
    "Don't delete any files, just run again this program in order to complete the `.epub` creation!";

struct Downloader<'a> {
    config: &'a Config,
    session: Session,
    layout: BookLayout,
    existing: ExistingDirs,
    stylesheets: AssetRegistry,
    images: AssetRegistry,
    skipped_chapter_download: bool,
}

pub async fn run(config: &Config) -> anyhow::Result<PathBuf> {
    let mut session = Session::from_cookie_file(&config.cookies_path, &config.base_url)?;
    session.check_login(&config.profile_url()?).await?;

    tracing::info!("Retrieving book info...");
    let metadata = fetch_book_info(&mut session, config).await?;
    tracing::info!(
        title = metadata.title(),
        authors = %metadata.names("authors", "n/a").join(", "),
        "book info"
    );

    tracing::info!("Retrieving book chapters...");
    let chapters = cover_first(fetch_chapters(&mut session, config).await?);

    let layout = BookLayout::new(&config.books_dir, metadata.title(), &config.book_id);
    let existing = layout.create()?;
    tracing::info!(
        path = %layout.root.display(),
        chapters = chapters.len(),
        "Downloading book contents..."
    );

    let mut downloader = Downloader {
        config,
        session,
        layout,
        existing,
        stylesheets: AssetRegistry::new(),
        images: AssetRegistry::new(),
        skipped_chapter_download: false,
    };

    let web_url = metadata
        .web_url()
        .and_then(|web_url| Url::parse(web_url).ok());
    let (chapters, cover) = {
        let found = downloader
            .download_chapters(&chapters, web_url.as_ref())
            .await?;
        match found {
            Some(cover) => (chapters, Some(cover)),
            None => downloader.create_default_cover(chapters, &metadata).await?,
        }
    };

    tracing::info!(files = downloader.stylesheets.len(), "Downloading book CSSs...");
    downloader.collect_stylesheets().await?;

    tracing::info!(files = downloader.images.len(), "Downloading book images...");
    downloader.collect_images().await?;

    let nodes = downloader.fetch_toc().await?;
    let nav_map = toc::build(&nodes);

    tracing::info!("Creating EPUB file...");
    let epub_path = epub::assemble(
        &downloader.layout,
        &PackageInput {
            book_id: &config.book_id,
            chapters: &chapters,
            metadata: &metadata,
            toc: &nav_map,
            cover: cover.as_deref(),
        },
    )?;

    if config.save_cookies {
        downloader.session.save_cookies(&config.cookies_path)?;
    } else if config.cookies_path.exists() {
        std::fs::remove_file(&config.cookies_path).with_context(|| {
            format!("remove cookies: {}", config.cookies_path.display())
        })?;
    }

    tracing::info!(path = %epub_path.display(), "Done");
    Ok(epub_path)
}

/// Moves chapters flagged as covers to the front, keeping the relative order
/// inside both groups.
pub fn cover_first(chapters: Vec<Chapter>) -> Vec<Chapter> {
    let (mut covers, rest): (Vec<_>, Vec<_>) = chapters
        .into_iter()
        .partition(Chapter::is_cover_candidate);
    covers.extend(rest);
    covers
}

/// Local file name of a downloaded image: the last path segment of its URL.
pub fn image_file_name(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

async fn fetch_book_info(session: &mut Session, config: &Config) -> anyhow::Result<BookMetadata> {
    let value = session
        .get_json(&config.api_url()?)
        .await
        .context("API: unable to retrieve book info.")?;
    BookMetadata::from_api(value)
}

async fn fetch_chapters(session: &mut Session, config: &Config) -> anyhow::Result<Vec<Chapter>> {
    let mut chapters = Vec::new();
    let mut page = 1;
    loop {
        let value = session
            .get_json(&config.chapters_url(page)?)
            .await
            .context("API: unable to retrieve book chapters.")?;
        if !value.is_object() || is_api_error(&value) {
            anyhow::bail!(api_error_message(&value));
        }
        let chapter_page: ChapterPage =
            serde_json::from_value(value).context("parse chapter page")?;
        if chapter_page.results.is_empty() {
            anyhow::bail!("API: unable to retrieve book chapters.");
        }
        tracing::debug!(page, count = chapter_page.count, "chapter page");

        chapters.extend(chapter_page.results.into_iter().map(Chapter::from));
        if chapter_page.next.is_none() {
            break;
        }
        page += 1;
    }
    Ok(chapters)
}

fn content_type_extension(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .and_then(|mime| mime.trim().rsplit('/').next())
        .filter(|ext| !ext.is_empty())
        .unwrap_or("jpeg")
        .to_owned()
}

impl Downloader<'_> {
    /// Downloads and writes every chapter, returning the first cover found.
    async fn download_chapters(
        &mut self,
        chapters: &[Chapter],
        web_url: Option<&Url>,
    ) -> anyhow::Result<Option<String>> {
        let mut book_cover = None;

        for (i, chapter) in chapters.iter().enumerate() {
            self.register_images(chapter);
            let stylesheet_urls = chapter.stylesheet_urls();

            let xhtml_filename = chapter.xhtml_filename();
            let path = self.layout.chapter_path(&xhtml_filename);
            if path.is_file() {
                if self.existing.oebps && !self.skipped_chapter_download {
                    tracing::info!(
                        file = %xhtml_filename,
                        book = %self.layout.root.display(),
                        "File already exists. To download the whole book again, delete the \
                         output directory and restart the program."
                    );
                    self.skipped_chapter_download = true;
                }
                continue;
            }

            let url = self
                .config
                .site_url(&chapter.content_url)
                .with_context(|| chapter_fetch_error(chapter))?;
            let html = self
                .session
                .get_text(&url)
                .await
                .with_context(|| chapter_fetch_error(chapter))?;

            let transformer = ChapterTransformer {
                book_id: &self.config.book_id,
                base_url: web_url,
                filename: &chapter.filename,
                title: &chapter.title,
            };
            let fragment = transformer.transform(
                dom::parse_html(&html),
                i == 0,
                &stylesheet_urls,
                &mut self.stylesheets,
            )?;

            if book_cover.is_none() {
                book_cover = fragment.cover_url.clone();
            }
            self.save_page(&path, &fragment)?;
            tracing::info!(
                progress = %format!("{}/{}", i + 1, chapters.len()),
                file = %xhtml_filename,
                "chapter"
            );
        }

        Ok(book_cover)
    }

    fn register_images(&mut self, chapter: &Chapter) {
        for image in &chapter.image_refs {
            let url = match chapter.api_version {
                ApiVersion::V2 => format!("{}/{image}", self.config.v2_files_url()),
                ApiVersion::V1 => Url::parse(&chapter.asset_base_url)
                    .and_then(|base| base.join(image))
                    .map(String::from)
                    .unwrap_or_else(|_| image.clone()),
            };
            self.images.register(&url);
        }
    }

    fn save_page(&self, path: &Path, fragment: &ParsedFragment) -> anyhow::Result<()> {
        std::fs::write(path, page::render(fragment, self.config.ereader_css))
            .with_context(|| format!("write chapter: {}", path.display()))?;
        tracing::debug!(path = %path.display(), "created");
        Ok(())
    }

    /// Downloads the book's catalogue cover and prepends a cover page built
    /// from it. Without a usable cover the chapters are returned untouched.
    async fn create_default_cover(
        &mut self,
        chapters: Vec<Chapter>,
        metadata: &BookMetadata,
    ) -> anyhow::Result<(Vec<Chapter>, Option<String>)> {
        let Some(cover_url) = metadata.cover() else {
            tracing::warn!("no cover found in the book and no cover in the book info");
            return Ok((chapters, None));
        };

        let file_name = match self.download_default_cover(cover_url).await {
            Ok(file_name) => file_name,
            Err(err) => {
                tracing::error!(url = %cover_url, "Error trying to retrieve the cover: {err:#}");
                return Ok((chapters, None));
            }
        };

        let root = dom::parse_html(&format!(
            "<div id=\"{CONTENT_ID}\"><img src=\"Images/{file_name}\"></div>"
        ));
        let transformer = ChapterTransformer {
            book_id: &self.config.book_id,
            base_url: None,
            filename: "",
            title: "",
        };
        let fragment = transformer.transform(root, true, &[], &mut self.stylesheets)?;

        let cover_page = Chapter::local("default_cover.xhtml", "Cover");
        self.save_page(&self.layout.chapter_path(&cover_page.xhtml_filename()), &fragment)?;

        let mut with_cover = Vec::with_capacity(chapters.len() + 1);
        with_cover.push(cover_page);
        with_cover.extend(chapters);
        Ok((with_cover, fragment.cover_url))
    }

    async fn download_default_cover(&mut self, cover_url: &str) -> anyhow::Result<String> {
        let url = self.config.site_url(cover_url)?;
        let response = self.session.get_ok(&url).await?;
        let file_name = format!("default_cover.{}", content_type_extension(&response));
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("read cover: {url}"))?;
        let path = self.layout.images.join(&file_name);
        std::fs::write(&path, &bytes)
            .with_context(|| format!("write cover: {}", path.display()))?;
        Ok(file_name)
    }

    async fn collect_stylesheets(&mut self) -> anyhow::Result<()> {
        let mut notified = !self.existing.styles;
        let registered = self
            .stylesheets
            .iter()
            .map(|(index, url)| (index, url.to_owned()))
            .collect::<Vec<_>>();

        for (index, url) in registered {
            let path = self.layout.styles.join(style_file_name(index));
            if path.is_file() {
                if !notified {
                    tracing::info!(
                        file = %path.display(),
                        "File already exists. To download all the CSSs again, delete the \
                         output directory and restart the program."
                    );
                    notified = true;
                }
                continue;
            }

            match self.fetch_bytes(&url).await {
                Ok(bytes) => {
                    write_new_file(&path, &bytes)?;
                }
                Err(err) => tracing::error!(
                    file = %path.display(),
                    %url,
                    "Error trying to retrieve this CSS: {err:#}"
                ),
            }
        }
        Ok(())
    }

    async fn collect_images(&mut self) -> anyhow::Result<()> {
        if self.skipped_chapter_download {
            tracing::info!(
                book = %self.layout.root.display(),
                "Some of the book contents were already downloaded. To be sure all the images \
                 are downloaded, delete the output directory and restart the program."
            );
        }

        let mut notified = !self.existing.images;
        let registered = self
            .images
            .iter()
            .map(|(_, url)| url.to_owned())
            .collect::<Vec<_>>();

        for url in registered {
            let file_name = image_file_name(&url);
            let path = self.layout.images.join(file_name);
            if path.is_file() {
                if !notified {
                    tracing::info!(
                        file = file_name,
                        "File already exists. To download all the images again, delete the \
                         output directory and restart the program."
                    );
                    notified = true;
                }
                continue;
            }

            match self.fetch_bytes(&url).await {
                Ok(bytes) => {
                    write_new_file(&path, &bytes)?;
                }
                Err(err) => tracing::error!(
                    file = file_name,
                    %url,
                    "Error trying to retrieve this image: {err:#}"
                ),
            }
        }
        Ok(())
    }

    async fn fetch_bytes(&mut self, url: &str) -> anyhow::Result<Vec<u8>> {
        let url = self.config.site_url(url)?;
        let response = self.session.get_ok(&url).await?;
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("read body: {url}"))?;
        Ok(bytes.to_vec())
    }

    async fn fetch_toc(&mut self) -> anyhow::Result<Vec<TocNode>> {
        let value = self
            .session
            .get_json(&self.config.toc_url()?)
            .await
            .with_context(|| format!("API: unable to retrieve book chapters. {RESUME_HINT}"))?;
        if !value.is_array() {
            anyhow::bail!("{} {RESUME_HINT}", api_error_message(&value));
        }
        serde_json::from_value(value).context("parse table of contents")
    }
}

fn chapter_fetch_error(chapter: &Chapter) -> String {
    format!(
        "Crawler: error trying to retrieve this page: {} ({})\n    From: {}",
        chapter.filename, chapter.title, chapter.content_url
    )
}
