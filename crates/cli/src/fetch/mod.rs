//! Remote adapters: company lookup, folder store, sheet publication.

mod common;
mod dadata;
mod sheets;
mod yadisk;

use std::time::Duration;

use iprtrack_config::{RetryConfig, Settings};
use iprtrack_recon::{CancelToken, RetryPolicy};

use crate::CliError;

use common::resolve_token;
pub use dadata::DadataClient;
pub use sheets::{SheetTarget, SheetsClient};
pub use yadisk::YandexDiskClient;

/// Tokens given on the command line; each falls back to the env var named
/// in the config.
#[derive(Debug, Clone, Default)]
pub struct TokenFlags {
    pub dadata: Option<String>,
    pub yadisk: Option<String>,
    pub sheets: Option<String>,
}

pub fn retry_policy(config: &RetryConfig) -> RetryPolicy {
    RetryPolicy {
        max_attempts: config.max_attempts,
        base_delay: Duration::from_millis(config.base_delay_ms),
        max_delay: Duration::from_millis(config.max_delay_ms),
        jitter: config.jitter,
    }
}

pub fn status_client(
    settings: &Settings,
    tokens: &TokenFlags,
    cancel: &CancelToken,
) -> Result<DadataClient, CliError> {
    let token = resolve_token(
        tokens.dadata.as_deref(),
        "DaData",
        "--dadata-token",
        &settings.status.token_env,
    )?;
    DadataClient::new(
        token,
        settings.status.base_url.clone(),
        retry_policy(&settings.retry.request),
        cancel.clone(),
    )
}

pub fn freshness_client(
    settings: &Settings,
    tokens: &TokenFlags,
    cancel: &CancelToken,
) -> Result<YandexDiskClient, CliError> {
    let token = resolve_token(
        tokens.yadisk.as_deref(),
        "Yandex Disk",
        "--yadisk-token",
        &settings.freshness.token_env,
    )?;
    YandexDiskClient::new(
        token,
        settings.freshness.base_url.clone(),
        retry_policy(&settings.retry.request),
        cancel.clone(),
    )
}

/// `None` when no spreadsheet is configured.
pub fn sheets_client(
    settings: &Settings,
    tokens: &TokenFlags,
    cancel: &CancelToken,
) -> Result<Option<SheetsClient>, CliError> {
    let publish = &settings.publish;
    if publish.spreadsheet_id.trim().is_empty() {
        return Ok(None);
    }
    let token = resolve_token(
        tokens.sheets.as_deref(),
        "Google Sheets",
        "--sheets-token",
        &publish.token_env,
    )?;
    let target = SheetTarget {
        spreadsheet_id: publish.spreadsheet_id.trim().to_string(),
        sheet_title: publish.sheet_title.clone(),
        sheet_id: publish.sheet_id,
    };
    SheetsClient::new(
        token,
        publish.base_url.clone(),
        target,
        retry_policy(&settings.retry.request),
        cancel.clone(),
    )
    .map(Some)
}
