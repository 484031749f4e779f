//! Folder listing on Yandex Disk (`GET /v1/disk/resources`).

use iprtrack_recon::{CancelToken, FolderListing, FreshnessResolver, ResolveError, RetryPolicy};
use serde_json::Value;
use tracing::warn;

use crate::CliError;

use super::common::{extract_message, FetchClient, FetchError, FetchErrorKind};

const PAGE_LIMIT: usize = 200;

pub struct YandexDiskClient {
    client: FetchClient,
    token: String,
    url: String,
}

impl YandexDiskClient {
    /// `url` is the resources endpoint.
    pub fn new(token: String, url: String, retry: RetryPolicy, cancel: CancelToken) -> Result<Self, CliError> {
        Ok(Self {
            client: FetchClient::new("Yandex Disk", extract_message, retry, cancel)?,
            token,
            url,
        })
    }

    fn page(&self, path: &str, offset: usize) -> Result<Value, FetchError> {
        let params = [
            ("path", path.to_string()),
            ("limit", PAGE_LIMIT.to_string()),
            ("offset", offset.to_string()),
            ("fields", "_embedded.items.name,_embedded.items.type,_embedded.total".to_string()),
        ];
        // 404 carries the {error, description} body the listing reports.
        self.client.request_json_passing(&[404], |http| {
            http.get(&self.url)
                .header("Authorization", format!("OAuth {}", self.token))
                .query(&params)
        })
    }

    /// Every entry of the folder, following `offset` pages.
    fn list_all(&self, path: &str) -> Result<FolderListing, FetchError> {
        let mut entries = Vec::new();
        let mut offset = 0;

        loop {
            let body = self.page(path, offset)?;
            let page_len = body["_embedded"]["items"].as_array().map_or(0, Vec::len);
            let total = body["_embedded"]["total"].as_u64().map(|t| t as usize);

            match FolderListing::from_response(&body) {
                FolderListing::Missing(reason) => return Ok(FolderListing::Missing(reason)),
                FolderListing::Entries(page) => entries.extend(page),
            }

            offset += page_len;
            let exhausted = match total {
                Some(total) => offset >= total,
                None => page_len < PAGE_LIMIT,
            };
            if page_len == 0 || exhausted {
                return Ok(FolderListing::Entries(entries));
            }
        }
    }
}

impl FreshnessResolver for YandexDiskClient {
    /// A garbled answer for one folder is reported as missing, so the pass
    /// leaves that record's dates alone and carries on.
    fn list(&self, path: &str) -> Result<FolderListing, ResolveError> {
        match self.list_all(path) {
            Ok(listing) => Ok(listing),
            Err(e) if e.kind == FetchErrorKind::Upstream => {
                warn!("listing of {path} unusable: {e}");
                Ok(FolderListing::Missing(e.message))
            }
            Err(e) => Err(e.into()),
        }
    }
}
