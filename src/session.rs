//! Authenticated HTTP session backed by a `cookies.json` jar.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use reqwest::header::{self, HeaderMap, HeaderValue};
use url::Url;

const MAX_REDIRECTS: usize = 10;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
Chrome/142.0.0.0 Safari/537.36";
const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,\
image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7";

pub struct Session {
    client: reqwest::Client,
    cookies: BTreeMap<String, String>,
}

impl Session {
    /// Opens a session from the cookies saved in `cookies_path`.
    pub fn from_cookie_file(cookies_path: &Path, referer: &Url) -> anyhow::Result<Self> {
        if !cookies_path.is_file() {
            anyhow::bail!(
                "Login: unable to find `{}`. Export your browser cookies for the site into it first.",
                cookies_path.display()
            );
        }
        let raw = std::fs::read_to_string(cookies_path)
            .with_context(|| format!("read cookies: {}", cookies_path.display()))?;
        let cookies: BTreeMap<String, String> =
            serde_json::from_str(&raw).context("parse cookies json")?;
        Self::new(cookies, referer)
    }

    pub fn new(cookies: BTreeMap<String, String>, referer: &Url) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT));
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9"),
        );
        headers.insert(
            header::REFERER,
            HeaderValue::from_str(referer.as_str()).context("referer header")?,
        );
        headers.insert(
            header::UPGRADE_INSECURE_REQUESTS,
            HeaderValue::from_static("1"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("build http client")?;

        Ok(Self { client, cookies })
    }

    /// GET `url`, following redirects one hop at a time so every hop's
    /// `Set-Cookie` lands in the jar.
    pub async fn get(&mut self, url: &Url) -> anyhow::Result<reqwest::Response> {
        let mut current = url.clone();
        for _ in 0..=MAX_REDIRECTS {
            let response = self.get_once(&current).await?;
            if !response.status().is_redirection() {
                return Ok(response);
            }
            let location = response
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| anyhow::anyhow!("redirect expected but no location: {current}"))?;
            let next = current
                .join(location)
                .with_context(|| format!("resolve redirect location: {location}"))?;
            tracing::debug!(from = %current, to = %next, "following redirect");
            current = next;
        }
        anyhow::bail!("too many redirects: {url}")
    }

    /// GET `url` without following redirects.
    pub async fn get_once(&mut self, url: &Url) -> anyhow::Result<reqwest::Response> {
        let mut request = self.client.get(url.clone());
        if let Some(cookie) = self.cookie_header() {
            request = request.header(header::COOKIE, cookie);
        }
        let response = request.send().await.with_context(|| format!("GET {url}"))?;
        tracing::debug!(%url, status = %response.status(), "response");
        self.update_cookies(response.headers());
        Ok(response)
    }

    /// GET `url` and fail unless the final response is a success.
    pub async fn get_ok(&mut self, url: &Url) -> anyhow::Result<reqwest::Response> {
        let response = self.get(url).await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("GET {url}: unexpected status {status}");
        }
        Ok(response)
    }

    pub async fn get_text(&mut self, url: &Url) -> anyhow::Result<String> {
        let response = self.get_ok(url).await?;
        response
            .text()
            .await
            .with_context(|| format!("read body: {url}"))
    }

    pub async fn get_json(&mut self, url: &Url) -> anyhow::Result<serde_json::Value> {
        let response = self.get_ok(url).await?;
        response
            .json()
            .await
            .with_context(|| format!("parse json: {url}"))
    }

    /// Verifies the saved cookies still grant access to the profile page.
    pub async fn check_login(&mut self, profile_url: &Url) -> anyhow::Result<()> {
        let response = self
            .get_once(profile_url)
            .await
            .context("Login: unable to reach the site. Try again...")?;
        if response.status() != reqwest::StatusCode::OK {
            anyhow::bail!("Authentication issue: unable to access profile page.");
        }
        let body = response.text().await.context("read profile page")?;
        if body.contains("user_type\":\"Expired\"") {
            anyhow::bail!("Authentication issue: account subscription expired.");
        }
        tracing::info!("Successfully authenticated.");
        Ok(())
    }

    pub fn save_cookies(&self, cookies_path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string(&self.cookies).context("serialize cookies")?;
        std::fs::write(cookies_path, json)
            .with_context(|| format!("write cookies: {}", cookies_path.display()))
    }

    fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    fn update_cookies(&mut self, headers: &HeaderMap) {
        for value in headers.get_all(header::SET_COOKIE) {
            let Ok(value) = value.to_str() else {
                continue;
            };
            if let Some((name, cookie)) = parse_set_cookie(value) {
                match cookie {
                    Some(cookie) => self.cookies.insert(name, cookie),
                    None => self.cookies.remove(&name),
                };
            }
        }
    }
}

/// Parses a `Set-Cookie` header into its name and value; the value is `None`
/// when the cookie is being expired (`Max-Age=0`).
fn parse_set_cookie(header: &str) -> Option<(String, Option<String>)> {
    let mut parts = header.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let expired = parts.any(|attr| {
        attr.split_once('=').is_some_and(|(key, value)| {
            key.trim().eq_ignore_ascii_case("max-age")
                && value.trim().parse::<f64>().is_ok_and(|age| age <= 0.0)
        })
    });
    let value = (!expired).then(|| value.trim().to_owned());
    Some((name.to_owned(), value))
}
