use clap::Parser;

/// Download a purchased book from O'Reilly Learning and package it as an EPUB.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Book id, as found in the book URL (`/library/view/<name>/<BOOK ID>/`).
    #[arg(value_name = "BOOK ID")]
    pub book_id: String,

    /// Delete the cookie file at the end of the run instead of saving the
    /// refreshed session into it.
    #[arg(long)]
    pub no_cookies: bool,

    /// Add CSS rules that stop `table` and `pre` elements from overflowing
    /// (for e-readers such as Kindle).
    #[arg(long)]
    pub kindle: bool,

    /// Keep the `info_<BOOK ID>.log` run log even when nothing failed.
    #[arg(long)]
    pub preserve_log: bool,

    /// Cookie jar exported from a logged-in browser session.
    #[arg(long, env = "SAFARIBOOKS_COOKIES", default_value = "cookies.json")]
    pub cookies: String,

    /// Directory the book folders are created in.
    #[arg(long, default_value = "Books")]
    pub out: String,

    /// Site base URL.
    #[arg(
        long,
        env = "SAFARIBOOKS_BASE_URL",
        default_value = "https://learning.oreilly.com"
    )]
    pub base_url: String,
}
