//! HTTP implementations of the report and lookup ports.
//!
//! The upstream reporting APIs share one request shape: GET with
//! `start`/`end`/`limit` query parameters, JSON array of objects back.
//! Responses are mapped to raw field maps; all field interpretation
//! happens later in `core::classify`.

use crate::domain::model::{Identity, RawRecord, SourceKind, TimeRange};
use crate::domain::ports::{LookupQuery, ReportQuery};
use crate::utils::error::{ReportError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EndpointSpec {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub timeout_seconds: Option<u64>,
}

impl EndpointSpec {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            timeout_seconds: None,
        }
    }
}

async fn fetch_records(
    client: &Client,
    spec: &EndpointSpec,
    source_label: &str,
    query: &[(String, String)],
) -> Result<Vec<RawRecord>> {
    let mut request = client.get(&spec.url).query(query);

    for (key, value) in &spec.headers {
        request = request.header(key, value);
    }
    if let Some(timeout) = spec.timeout_seconds {
        request = request.timeout(Duration::from_secs(timeout));
    }

    tracing::debug!("📡 {}: GET {}", source_label, spec.url);
    let response = request.send().await?;
    let status = response.status();
    tracing::debug!("📡 {}: response status {}", source_label, status);

    if !status.is_success() {
        return Err(ReportError::UpstreamStatusError {
            source_name: source_label.to_string(),
            status: status.as_u16(),
        });
    }

    let json_data: serde_json::Value = response.json().await?;
    match json_data {
        serde_json::Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::Object(obj) => {
                    Some(RawRecord::new(obj.into_iter().collect()))
                }
                _ => None,
            })
            .collect()),
        serde_json::Value::Object(obj) => Ok(vec![RawRecord::new(obj.into_iter().collect())]),
        other => Err(ReportError::MalformedResponseError {
            source_name: source_label.to_string(),
            message: format!("expected array or object, got {}", other),
        }),
    }
}

/// One endpoint per source kind, sharing a single client.
pub struct HttpReportApi {
    client: Client,
    message_status: EndpointSpec,
    access_event: EndpointSpec,
    proposal: EndpointSpec,
}

impl HttpReportApi {
    pub fn new(
        message_status: EndpointSpec,
        access_event: EndpointSpec,
        proposal: EndpointSpec,
    ) -> Self {
        Self {
            client: Client::new(),
            message_status,
            access_event,
            proposal,
        }
    }

    fn endpoint(&self, source: SourceKind) -> &EndpointSpec {
        match source {
            SourceKind::MessageStatus => &self.message_status,
            SourceKind::AccessEvent => &self.access_event,
            SourceKind::Proposal => &self.proposal,
        }
    }
}

#[async_trait]
impl ReportQuery for HttpReportApi {
    async fn fetch(
        &self,
        source: SourceKind,
        range: TimeRange,
        limit: usize,
    ) -> Result<Vec<RawRecord>> {
        let query = vec![
            ("start".to_string(), range.start.to_rfc3339()),
            ("end".to_string(), range.end.to_rfc3339()),
            ("limit".to_string(), limit.to_string()),
        ];
        fetch_records(&self.client, self.endpoint(source), source.as_str(), &query).await
    }
}

/// Per-identity enrichment endpoint. The identity key goes out as `cpf`
/// or `phone`; additional filters are forwarded as-is.
pub struct HttpLookupApi {
    client: Client,
    spec: EndpointSpec,
}

impl HttpLookupApi {
    pub fn new(spec: EndpointSpec) -> Self {
        Self {
            client: Client::new(),
            spec,
        }
    }
}

#[async_trait]
impl LookupQuery for HttpLookupApi {
    async fn lookup(
        &self,
        identity: &Identity,
        filters: &HashMap<String, String>,
    ) -> Result<Vec<RawRecord>> {
        let mut query: Vec<(String, String)> = Vec::new();
        if let Some(national_id) = &identity.national_id {
            query.push(("cpf".to_string(), national_id.clone()));
        }
        if let Some(phone) = &identity.phone {
            query.push(("phone".to_string(), phone.clone()));
        }
        if query.is_empty() {
            // Nothing to key the lookup on.
            return Ok(Vec::new());
        }
        for (key, value) in filters {
            query.push((key.clone(), value.clone()));
        }
        fetch_records(&self.client, &self.spec, "lookup", &query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use httpmock::prelude::*;

    fn range() -> TimeRange {
        TimeRange::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn api_for(server: &MockServer) -> HttpReportApi {
        HttpReportApi::new(
            EndpointSpec::new(server.url("/messages")),
            EndpointSpec::new(server.url("/accesses")),
            EndpointSpec::new(server.url("/proposals")),
        )
    }

    #[tokio::test]
    async fn test_fetch_sends_window_and_limit() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/messages")
                .query_param("start", "2024-05-01T00:00:00+00:00")
                .query_param("end", "2024-05-02T00:00:00+00:00")
                .query_param("limit", "30000");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!([
                    {"phone": "11987654321", "status": "DELIVERED"},
                    {"phone": "11987654322", "status": "SENT"}
                ]));
        });

        let api = api_for(&server);
        let records = api
            .fetch(SourceKind::MessageStatus, range(), 30000)
            .await
            .unwrap();

        mock.assert();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].text("status"), Some("DELIVERED"));
    }

    #[tokio::test]
    async fn test_fetch_routes_by_source_kind() {
        let server = MockServer::start();
        let proposals_mock = server.mock(|when, then| {
            when.method(GET).path("/proposals");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!([{"cpf": "12345678909"}]));
        });

        let api = api_for(&server);
        let records = api.fetch(SourceKind::Proposal, range(), 100).await.unwrap();

        proposals_mock.assert();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/accesses");
            then.status(503);
        });

        let api = api_for(&server);
        let result = api.fetch(SourceKind::AccessEvent, range(), 100).await;

        match result {
            Err(ReportError::UpstreamStatusError { status, .. }) => assert_eq!(status, 503),
            other => panic!("expected UpstreamStatusError, got {:?}", other.map(|r| r.len())),
        }
    }

    #[tokio::test]
    async fn test_scalar_body_is_malformed() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/messages");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!(42));
        });

        let api = api_for(&server);
        let result = api.fetch(SourceKind::MessageStatus, range(), 100).await;
        assert!(matches!(
            result,
            Err(ReportError::MalformedResponseError { .. })
        ));
    }

    #[tokio::test]
    async fn test_lookup_keys_by_cpf() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/lookup")
                .query_param("cpf", "12345678909")
                .query_param("status", "pago");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!([{"cpf": "12345678909", "valor": 1500.0}]));
        });

        let api = HttpLookupApi::new(EndpointSpec::new(server.url("/lookup")));
        let identity = Identity {
            phone: None,
            national_id: Some("12345678909".to_string()),
        };
        let mut filters = HashMap::new();
        filters.insert("status".to_string(), "pago".to_string());

        let records = api.lookup(&identity, &filters).await.unwrap();

        mock.assert();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].number("valor"), Some(1500.0));
    }

    #[tokio::test]
    async fn test_lookup_empty_identity_short_circuits() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/lookup");
            then.status(200).json_body(serde_json::json!([]));
        });

        let api = HttpLookupApi::new(EndpointSpec::new(server.url("/lookup")));
        let records = api
            .lookup(&Identity::default(), &HashMap::new())
            .await
            .unwrap();

        assert!(records.is_empty());
        mock.assert_hits(0);
    }
}
