//! Company lookup by tax id (DaData `findById/party`).

use iprtrack_core::TaxId;
use iprtrack_recon::{CancelToken, ResolveError, RetryPolicy, StatusResolver};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::CliError;

use super::common::{extract_message, FetchClient, FetchErrorKind};

pub struct DadataClient {
    client: FetchClient,
    token: String,
    url: String,
}

impl DadataClient {
    /// `url` is the full `findById/party` endpoint.
    pub fn new(token: String, url: String, retry: RetryPolicy, cancel: CancelToken) -> Result<Self, CliError> {
        Ok(Self {
            client: FetchClient::new("DaData", extract_message, retry, cancel)?,
            token,
            url,
        })
    }

    /// First suggestion for the tax id, `None` if the service knows none.
    ///
    /// An undecodable answer for one id degrades to `None` (status
    /// unknown) so the rest of the pass still runs.
    fn find_by_id(&self, tax_id: &TaxId) -> Result<Option<Value>, ResolveError> {
        let body = json!({ "query": tax_id.as_str() });
        let result = self.client.request_json(|http| {
            http.post(&self.url)
                .header("Authorization", format!("Token {}", self.token))
                .header("Accept", "application/json")
                .json(&body)
        });
        let response = match result {
            Ok(response) => response,
            Err(e) if e.kind == FetchErrorKind::Upstream => {
                warn!("status of {tax_id} left unknown: {e}");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let first = response["suggestions"]
            .as_array()
            .and_then(|s| s.first())
            .cloned();
        if first.is_none() {
            debug!("no company found for {tax_id}");
        }
        Ok(first)
    }
}

impl StatusResolver for DadataClient {
    fn lookup(&self, tax_id: &TaxId) -> Result<Option<Value>, ResolveError> {
        self.find_by_id(tax_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::common::test_policy;
    use httpmock::prelude::*;
    use iprtrack_core::CompanyStatus;
    use iprtrack_recon::{FatalKind, StatusLookup};

    fn client(server: &MockServer, token: &str) -> DadataClient {
        DadataClient::new(
            token.into(),
            server.url("/findById/party"),
            test_policy(2),
            CancelToken::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_first_suggestion_is_returned() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/findById/party")
                .header("Authorization", "Token key_1")
                .json_body(json!({ "query": "7701234567" }));
            then.status(200).json_body(json!({
                "suggestions": [
                    {
                        "value": "ООО \"РОМАШКА\"",
                        "data": {
                            "state": { "status": "LIQUIDATING" },
                            "name": {
                                "short_with_opf": "ООО \"РОМАШКА\"",
                                "full_with_opf": "ОБЩЕСТВО С ОГРАНИЧЕННОЙ ОТВЕТСТВЕННОСТЬЮ \"РОМАШКА\""
                            }
                        }
                    },
                    { "value": "branch", "data": {} }
                ]
            }));
        });

        let response = client(&server, "key_1")
            .lookup(&TaxId::parse("7701234567").unwrap())
            .unwrap()
            .unwrap();
        mock.assert();

        let lookup = StatusLookup::from_response(&response);
        assert_eq!(lookup.status, CompanyStatus::Liquidating);
        assert_eq!(lookup.short_name.as_str(), "ООО \"РОМАШКА\"");
    }

    #[test]
    fn test_no_suggestions_is_none() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/findById/party");
            then.status(200).json_body(json!({ "suggestions": [] }));
        });
        let response = client(&server, "k").lookup(&TaxId::parse("1").unwrap()).unwrap();
        assert!(response.is_none());
    }

    #[test]
    fn test_garbled_answer_is_unknown_not_fatal() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/findById/party")
                .json_body(json!({ "query": "111" }));
            then.status(200).body("<html>gateway page</html>");
        });
        server.mock(|when, then| {
            when.method(POST)
                .path("/findById/party")
                .json_body(json!({ "query": "333" }));
            then.status(404).body("not here");
        });
        let dadata = client(&server, "k");
        assert!(dadata.lookup(&TaxId::parse("111").unwrap()).unwrap().is_none());
        assert!(dadata.lookup(&TaxId::parse("333").unwrap()).unwrap().is_none());
    }

    #[test]
    fn test_garbled_answer_does_not_stop_the_pass() {
        use chrono::NaiveDate;
        use iprtrack_core::{CompanyRecord, Observation};
        use iprtrack_recon::{reconcile, run_status_pass, PassOptions, Registry};
        use std::collections::HashSet;

        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/findById/party")
                .json_body(json!({ "query": "111" }));
            then.status(200).body("<html>gateway page</html>");
        });
        server.mock(|when, then| {
            when.method(POST)
                .path("/findById/party")
                .json_body(json!({ "query": "222" }));
            then.status(200).json_body(json!({
                "suggestions": [{
                    "data": {
                        "state": { "status": "LIQUIDATED" },
                        "name": { "short_with_opf": "АО \"Б\"", "full_with_opf": "АО \"Б\"" }
                    }
                }]
            }));
        });

        let observed = [Observation::new("А", "111"), Observation::new("Б", "222")];
        let mut registry = reconcile(Registry::new(), &observed, &HashSet::new()).registry;
        let options = PassOptions {
            concurrency: 2,
            retry: RetryPolicy::none(),
            ..PassOptions::default()
        };
        let checked_at = NaiveDate::from_ymd_opt(2024, 1, 10)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let report = run_status_pass(
            &mut registry,
            &client(&server, "k"),
            &options,
            checked_at,
            &[] as &[String],
        )
        .unwrap();

        assert_eq!(report.checked, 2);
        let first: &CompanyRecord = registry.get(&TaxId::parse("111").unwrap()).unwrap();
        assert_eq!(first.status, CompanyStatus::Unknown);
        let second = registry.get(&TaxId::parse("222").unwrap()).unwrap();
        assert_eq!(second.status, CompanyStatus::Liquidated);
        assert_eq!(second.status_checked_at, Some(checked_at));
    }

    #[test]
    fn test_forbidden_is_auth_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/findById/party");
            then.status(403).json_body(json!({ "message": "Daily limit exceeded" }));
        });
        let err = client(&server, "k").lookup(&TaxId::parse("1").unwrap()).unwrap_err();
        match err {
            ResolveError::Fatal { kind, message } => {
                assert_eq!(kind, FatalKind::Auth);
                assert!(message.contains("DaData auth failed (403): Daily limit exceeded"), "{message}");
            }
            other => panic!("expected auth failure, got {other:?}"),
        }
    }
}
