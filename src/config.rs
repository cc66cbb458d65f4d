use std::path::PathBuf;

use anyhow::Context as _;
use url::Url;

use crate::cli::Cli;

/// Resolved settings for one run.
#[derive(Debug, Clone)]
pub struct Config {
    pub book_id: String,
    pub base_url: Url,
    pub cookies_path: PathBuf,
    pub books_dir: PathBuf,
    pub save_cookies: bool,
    pub ereader_css: bool,
    pub preserve_log: bool,
}

impl Config {
    pub fn from_cli(cli: Cli) -> anyhow::Result<Self> {
        let book_id = cli.book_id.trim().to_owned();
        if book_id.is_empty() || !book_id.chars().all(|c| c.is_ascii_alphanumeric()) {
            anyhow::bail!("book id must be alphanumeric: {:?}", cli.book_id);
        }

        let mut base_url = Url::parse(&cli.base_url).context("parse --base-url")?;
        if base_url.scheme() != "http" && base_url.scheme() != "https" {
            anyhow::bail!("--base-url must be http/https: {base_url}");
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            book_id,
            base_url,
            cookies_path: PathBuf::from(cli.cookies),
            books_dir: PathBuf::from(cli.out),
            save_cookies: !cli.no_cookies,
            ereader_css: cli.kindle,
            preserve_log: cli.preserve_log,
        })
    }

    pub fn api_url(&self) -> anyhow::Result<Url> {
        self.site_url(&format!("api/v1/book/{}/", self.book_id))
    }

    pub fn chapters_url(&self, page: usize) -> anyhow::Result<Url> {
        self.api_url()?
            .join(&format!("chapter/?page={page}"))
            .context("build chapters url")
    }

    pub fn toc_url(&self) -> anyhow::Result<Url> {
        self.api_url()?.join("toc/").context("build toc url")
    }

    pub fn profile_url(&self) -> anyhow::Result<Url> {
        self.site_url("profile/")
    }

    /// Base for image references of chapters served by the v2 API.
    pub fn v2_files_url(&self) -> String {
        format!(
            "{}api/v2/epubs/urn:orm:book:{}/files",
            self.base_url, self.book_id
        )
    }

    pub fn site_url(&self, path: &str) -> anyhow::Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("build site url: {path}"))
    }

    pub fn log_path(&self) -> PathBuf {
        PathBuf::from(format!("info_{}.log", self.book_id))
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser as _;

    use super::*;

    fn config(args: &[&str]) -> anyhow::Result<Config> {
        let cli = Cli::try_parse_from(std::iter::once("safaribooks").chain(args.iter().copied()))?;
        Config::from_cli(cli)
    }

    #[test]
    fn defaults_point_at_the_live_site() -> anyhow::Result<()> {
        let config = config(&["--base-url", "https://learning.oreilly.com", "9781491958698"])?;
        assert_eq!(
            config.api_url()?.as_str(),
            "https://learning.oreilly.com/api/v1/book/9781491958698/"
        );
        assert_eq!(
            config.chapters_url(2)?.as_str(),
            "https://learning.oreilly.com/api/v1/book/9781491958698/chapter/?page=2"
        );
        assert_eq!(
            config.toc_url()?.as_str(),
            "https://learning.oreilly.com/api/v1/book/9781491958698/toc/"
        );
        assert_eq!(
            config.v2_files_url(),
            "https://learning.oreilly.com/api/v2/epubs/urn:orm:book:9781491958698/files"
        );
        assert_eq!(config.log_path(), PathBuf::from("info_9781491958698.log"));
        assert!(config.save_cookies);
        assert!(!config.ereader_css);
        Ok(())
    }

    #[test]
    fn flags_map_onto_config() -> anyhow::Result<()> {
        let config = config(&[
            "--base-url",
            "http://127.0.0.1:8080/prefix",
            "--no-cookies",
            "--kindle",
            "--preserve-log",
            "42",
        ])?;
        assert!(!config.save_cookies);
        assert!(config.ereader_css);
        assert!(config.preserve_log);
        assert_eq!(
            config.profile_url()?.as_str(),
            "http://127.0.0.1:8080/prefix/profile/"
        );
        Ok(())
    }

    #[test]
    fn rejects_non_alphanumeric_book_ids() {
        assert!(config(&["--base-url", "https://x", "../etc"]).is_err());
    }
}
