//! Table acquisition: local CSV files or remote spreadsheets.
//!
//! Inventory tables usually live in shared Google Sheets. A sheet's browser
//! URL (`.../spreadsheets/d/<id>/edit#gid=<gid>`) serves HTML, so we rewrite it
//! to the CSV export endpoint before fetching.

use std::fmt;
use std::path::PathBuf;

use reqwest::blocking::Client;

use crate::error::AppError;

const SHEETS_PREFIX: &str = "https://docs.google.com/spreadsheets/d/";

/// Where a table is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableSource {
    Path(PathBuf),
    Url(String),
}

impl TableSource {
    /// Interpret a CLI/env value: `http(s)://` is a URL, anything else a path.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            TableSource::Url(trimmed.to_string())
        } else {
            TableSource::Path(PathBuf::from(trimmed))
        }
    }

    /// Resolve an optional flag value, falling back to an environment variable.
    pub fn from_flag_or_env(flag: Option<&str>, env_key: &str) -> Result<Self, AppError> {
        if let Some(raw) = flag {
            return Ok(Self::parse(raw));
        }
        dotenvy::dotenv().ok();
        let raw = std::env::var(env_key).map_err(|_| {
            AppError::input(format!(
                "No input table given: pass a path/URL or set {env_key} in the environment (.env)."
            ))
        })?;
        Ok(Self::parse(&raw))
    }
}

impl fmt::Display for TableSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableSource::Path(p) => write!(f, "{}", p.display()),
            TableSource::Url(u) => write!(f, "{u}"),
        }
    }
}

/// Reads tables from disk or over HTTP.
pub struct TableClient {
    client: Client,
}

impl TableClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Fetch the raw CSV text of a table.
    pub fn read(&self, source: &TableSource) -> Result<String, AppError> {
        match source {
            TableSource::Path(path) => std::fs::read_to_string(path)
                .map_err(|e| AppError::input(format!("Failed to read '{}': {e}", path.display()))),
            TableSource::Url(url) => self.fetch(url),
        }
    }

    fn fetch(&self, url: &str) -> Result<String, AppError> {
        let url = sheet_csv_url(url);
        log::info!("fetching table from {url}");

        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(|e| AppError::compute(format!("Table request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(AppError::compute(format!(
                "Table request failed with status {}.",
                resp.status()
            )));
        }

        let body = resp
            .text()
            .map_err(|e| AppError::compute(format!("Failed to read table response: {e}")))?;

        if body.trim_start().starts_with('<') {
            return Err(AppError::input(format!(
                "'{url}' returned HTML instead of CSV (is the sheet shared publicly?)."
            )));
        }
        Ok(body)
    }
}

impl Default for TableClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Rewrite a Google Sheets browser URL to its CSV export URL.
///
/// Non-Sheets URLs and URLs that already point at an export are returned unchanged.
pub fn sheet_csv_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix(SHEETS_PREFIX) else {
        return url.to_string();
    };
    if rest.contains("/export") || rest.contains("output=csv") {
        return url.to_string();
    }

    let id: String = rest.chars().take_while(|&c| c != '/' && c != '?' && c != '#').collect();
    if id.is_empty() {
        return url.to_string();
    }

    let gid = url
        .split(['#', '?', '&'])
        .find_map(|part| part.strip_prefix("gid="))
        .map(|g| g.chars().take_while(char::is_ascii_digit).collect::<String>())
        .filter(|g| !g.is_empty());

    match gid {
        Some(gid) => format!("{SHEETS_PREFIX}{id}/export?format=csv&gid={gid}"),
        None => format!("{SHEETS_PREFIX}{id}/export?format=csv"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_distinguishes_urls_and_paths() {
        assert_eq!(
            TableSource::parse(" https://example.org/t.csv "),
            TableSource::Url("https://example.org/t.csv".to_string())
        );
        assert_eq!(TableSource::parse("data/trees.csv"), TableSource::Path(PathBuf::from("data/trees.csv")));
    }

    #[test]
    fn sheet_edit_url_is_rewritten_with_gid() {
        let url = "https://docs.google.com/spreadsheets/d/AbC123_x/edit#gid=42";
        assert_eq!(
            sheet_csv_url(url),
            "https://docs.google.com/spreadsheets/d/AbC123_x/export?format=csv&gid=42"
        );
    }

    #[test]
    fn sheet_url_without_gid_exports_first_tab() {
        let url = "https://docs.google.com/spreadsheets/d/AbC123_x/edit?usp=sharing";
        assert_eq!(
            sheet_csv_url(url),
            "https://docs.google.com/spreadsheets/d/AbC123_x/export?format=csv"
        );
    }

    #[test]
    fn export_and_foreign_urls_are_untouched() {
        let export = "https://docs.google.com/spreadsheets/d/AbC/export?format=csv&gid=1";
        assert_eq!(sheet_csv_url(export), export);
        let other = "https://example.org/trees.csv";
        assert_eq!(sheet_csv_url(other), other);
    }

    #[test]
    fn local_read_missing_file_is_input_error() {
        let client = TableClient::new();
        let err = client
            .read(&TableSource::Path(PathBuf::from("/definitely/not/here.csv")))
            .unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_INPUT);
    }
}
