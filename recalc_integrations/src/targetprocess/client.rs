use crate::targetprocess::types::{BulkRequest, ItemsResponse};
use async_trait::async_trait;
use recalc_core::o11y::redaction::redact_url;
use recalc_core::{
    BulkOperation, EntityCounter, EntityRef, Error, OperationKind, OperationReport, PageSource,
    Result, Selection, Target,
};
use reqwest::{Client, StatusCode, Url};
use std::fmt;
use tracing::instrument;

const RECOMPUTE_PATH: &[&str] = &[
    "api",
    "MetricSetup",
    "v1",
    "iWantToDangerouslyCalculateAllMetricsAndPossiblyDieFromPerformanceConsequencesFor",
];
const VALIDATE_PATH: &[&str] = &[
    "api",
    "MetricSetup",
    "v1",
    "iWantToDangerouslyCheckAllMetricsConsistencyAndPossiblyDieFromPerformanceConsequencesFor",
];

/// One remote account. Implements every remote capability the engine needs.
#[derive(Clone)]
pub struct TargetprocessClient {
    client: Client,
    base_url: String,
    token: String,
}

impl fmt::Debug for TargetprocessClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetprocessClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl TargetprocessClient {
    pub fn new(target: &Target) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = target.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("build http client: {e}")))?;
        Ok(Self {
            client,
            base_url: target.base_url(),
            token: target.token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn count_url(&self, entity_type: &str, filter: &str) -> Result<Url> {
        self.url(
            &["api", "v2", entity_type],
            &[("where", format!("({filter})")), ("result", "count".to_string())],
        )
    }

    pub fn ids_url(
        &self,
        entity_type: &str,
        predicate: &str,
        selection: Selection,
        page_size: usize,
    ) -> Result<Url> {
        let select = match selection {
            Selection::Ids => "{id}",
            Selection::IdsWithEntityType => "{id,entityType:entityType.name}",
        };
        self.url(
            &["api", "v2", entity_type],
            &[
                ("select", select.to_string()),
                ("where", format!("({predicate})")),
                ("orderby", "id".to_string()),
                ("take", page_size.to_string()),
            ],
        )
    }

    pub fn operation_url(&self, kind: OperationKind) -> Result<Url> {
        let path = match kind {
            OperationKind::Recompute => RECOMPUTE_PATH,
            OperationKind::Validate => VALIDATE_PATH,
        };
        self.url(path, &[])
    }

    /// Segments are percent-encoded, so an entity type cannot inject a path or query.
    fn url(&self, segments: &[&str], params: &[(&str, String)]) -> Result<Url> {
        let invalid = |detail: String| {
            Error::Config(format!("invalid target url {}: {detail}", self.base_url))
        };
        let mut url = Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid("cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("token", &self.token);
            for (k, v) in params {
                query.append_pair(k, v);
            }
        }
        Ok(url)
    }

    /// Status and raw body of a GET. Only transport failures are errors here.
    async fn get_body(&self, url: Url, context: &str) -> Result<(StatusCode, Vec<u8>)> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::remote_request(context, e.without_url()))?;
        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| Error::remote_request(context, e.without_url()))?;
        Ok((status, body.to_vec()))
    }
}

/// The count endpoint answers with a bare number.
fn parse_count(value: &serde_json::Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    if let Some(f) = value.as_f64() {
        return (f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64).then_some(f as u64);
    }
    value.as_str().and_then(|s| s.trim().parse().ok())
}

fn decode_count(status: StatusCode, body: &[u8], context: &str) -> Result<u64> {
    if !status.is_success() {
        return Err(Error::remote_request_msg(context, format!("status {status}")));
    }
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| Error::remote_request(context, e))?;
    parse_count(&value).ok_or_else(|| {
        Error::remote_request_msg(context, format!("count is not a non-negative integer: {value}"))
    })
}

fn decode_page(status: StatusCode, body: &[u8], context: &str) -> Result<Vec<EntityRef>> {
    if !status.is_success() {
        return Err(Error::remote_request_msg(context, format!("status {status}")));
    }
    let page: ItemsResponse =
        serde_json::from_slice(body).map_err(|e| Error::remote_request(context, e))?;
    Ok(page.items.into_iter().map(EntityRef::from).collect())
}

fn decode_operation_report(
    status: StatusCode,
    body: &[u8],
    context: &str,
) -> Result<OperationReport> {
    if !status.is_success() {
        return Err(Error::remote_operation_msg(context, format!("status {status}")));
    }
    serde_json::from_slice(body).map_err(|e| Error::remote_operation(context, e))
}

#[async_trait]
impl EntityCounter for TargetprocessClient {
    #[instrument(level = "debug", skip(self))]
    async fn count(&self, entity_type: &str, filter: &str) -> Result<u64> {
        let url = self.count_url(entity_type, filter)?;
        let context = format!("count {entity_type} ({})", redact_url(url.as_str()));
        let (status, body) = self.get_body(url, &context).await?;
        decode_count(status, &body, &context)
    }
}

#[async_trait]
impl PageSource for TargetprocessClient {
    #[instrument(level = "debug", skip(self))]
    async fn fetch_page(
        &self,
        entity_type: &str,
        predicate: &str,
        selection: Selection,
        page_size: usize,
    ) -> Result<Vec<EntityRef>> {
        let url = self.ids_url(entity_type, predicate, selection, page_size)?;
        let context = format!("fetch ids for {entity_type} ({})", redact_url(url.as_str()));
        let (status, body) = self.get_body(url, &context).await?;
        decode_page(status, &body, &context)
    }
}

#[async_trait]
impl BulkOperation for TargetprocessClient {
    #[instrument(level = "debug", skip(self, targets), fields(targets = targets.len()))]
    async fn invoke(&self, kind: OperationKind, targets: &[EntityRef]) -> Result<OperationReport> {
        let url = self.operation_url(kind)?;
        let context = format!(
            "{} for {} targets ({})",
            kind.operation_name(),
            targets.len(),
            redact_url(url.as_str())
        );
        let resp = self
            .client
            .post(url)
            .json(&BulkRequest { targets })
            .send()
            .await
            .map_err(|e| Error::remote_operation(context.clone(), e.without_url()))?;
        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| Error::remote_operation(context.clone(), e.without_url()))?;
        decode_operation_report(status, &body, &context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recalc_core::{EntityTypeSpec, Protocol};
    use std::collections::HashMap;
    use std::time::Duration;

    const TOKEN: &str = "c2VjcmV0LXRva2VuLXZhbHVl";

    fn target(host: &str, protocol: Protocol) -> Target {
        Target {
            host: host.to_string(),
            token: TOKEN.to_string(),
            protocol,
            page_size: 200,
            request_timeout: Some(Duration::from_secs(2)),
            entity_types: vec![EntityTypeSpec::new("bug", "true")],
        }
    }

    fn query(url: &Url) -> HashMap<String, String> {
        url.query_pairs().into_owned().collect()
    }

    #[test]
    fn count_url_wraps_filter_and_asks_for_count() {
        let client = TargetprocessClient::new(&target("acme.tpondemand.com", Protocol::Https)).unwrap();
        let url = client.count_url("userstory", "userstories.count==0").unwrap();

        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("acme.tpondemand.com"));
        assert_eq!(url.path(), "/api/v2/userstory");
        let q = query(&url);
        assert_eq!(q["token"], TOKEN);
        assert_eq!(q["where"], "(userstories.count==0)");
        assert_eq!(q["result"], "count");
    }

    #[test]
    fn ids_url_selects_per_selection_and_orders_by_id() {
        let client = TargetprocessClient::new(&target("acme.tpondemand.com", Protocol::Http)).unwrap();

        let url = client
            .ids_url("bug", "(true) and (id>=201)", Selection::Ids, 200)
            .unwrap();
        assert_eq!(url.scheme(), "http");
        let q = query(&url);
        assert_eq!(q["select"], "{id}");
        assert_eq!(q["where"], "((true) and (id>=201))");
        assert_eq!(q["orderby"], "id");
        assert_eq!(q["take"], "200");

        let url = client
            .ids_url("bug", "true", Selection::IdsWithEntityType, 50)
            .unwrap();
        assert_eq!(query(&url)["select"], "{id,entityType:entityType.name}");
    }

    #[test]
    fn operation_urls_pick_the_bulk_endpoint() {
        let client = TargetprocessClient::new(&target("acme.tpondemand.com", Protocol::Https)).unwrap();
        let recompute = client.operation_url(OperationKind::Recompute).unwrap();
        let validate = client.operation_url(OperationKind::Validate).unwrap();
        assert!(recompute.path().ends_with("CalculateAllMetricsAndPossiblyDieFromPerformanceConsequencesFor"));
        assert!(validate.path().ends_with("CheckAllMetricsConsistencyAndPossiblyDieFromPerformanceConsequencesFor"));
        assert_eq!(query(&validate)["token"], TOKEN);
    }

    #[test]
    fn parses_numeric_and_string_counts() {
        assert_eq!(parse_count(&serde_json::json!(42)), Some(42));
        assert_eq!(parse_count(&serde_json::json!(42.0)), Some(42));
        assert_eq!(parse_count(&serde_json::json!(" 7 ")), Some(7));
        assert_eq!(parse_count(&serde_json::json!(-1)), None);
        assert_eq!(parse_count(&serde_json::json!(1.5)), None);
        assert_eq!(parse_count(&serde_json::json!({"items": []})), None);
    }

    #[test]
    fn page_items_become_entity_refs() {
        let body = br#"{"items": [{"id": 3}, {"id": 4, "entityType": "UserStory"}]}"#;
        let refs = decode_page(StatusCode::OK, body, "fetch ids for bug").unwrap();
        assert_eq!(refs, vec![EntityRef::new(3, ""), EntityRef::new(4, "UserStory")]);

        let empty = decode_page(StatusCode::OK, br#"{"items": []}"#, "fetch ids for bug").unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn page_without_items_is_a_request_error() {
        let err = decode_page(StatusCode::OK, b"{}", "fetch ids for bug").unwrap_err();
        assert!(err.is_remote_request(), "{err:?}");
        assert!(serde_json::from_str::<ItemsResponse>("{}").is_err());

        let err = decode_page(StatusCode::OK, b"<html>", "fetch ids for bug").unwrap_err();
        assert!(err.is_remote_request(), "{err:?}");
    }

    #[test]
    fn failed_status_is_a_request_error_for_reads() {
        let body = br#"{"items": [{"id": 1}]}"#;
        let err = decode_page(StatusCode::INTERNAL_SERVER_ERROR, body, "fetch ids for bug").unwrap_err();
        assert!(err.is_remote_request());
        assert!(format!("{:?}", err).contains("500"));

        let err = decode_count(StatusCode::UNAUTHORIZED, b"5", "count bug").unwrap_err();
        assert!(err.is_remote_request());
    }

    #[test]
    fn count_body_is_decoded() {
        assert_eq!(decode_count(StatusCode::OK, b"250", "count bug").unwrap(), 250);
        assert_eq!(decode_count(StatusCode::OK, br#""12""#, "count bug").unwrap(), 12);
        assert!(decode_count(StatusCode::OK, b"-3", "count bug").unwrap_err().is_remote_request());
        assert!(decode_count(StatusCode::OK, b"", "count bug").unwrap_err().is_remote_request());
    }

    #[test]
    fn operation_report_is_decoded() {
        let body = br#"{"reports": [
            {"id": 7, "entityType": "Bug", "errors": ["x"], "inconsistentFields": []}
        ]}"#;
        let report = decode_operation_report(StatusCode::OK, body, "validate").unwrap();
        assert_eq!(report.reports.len(), 1);
        assert_eq!(report.reports[0].id, 7);
    }

    #[test]
    fn malformed_operation_response_is_an_operation_error() {
        let err = decode_operation_report(StatusCode::OK, b"{}", "validate").unwrap_err();
        assert!(err.is_remote_operation(), "{err:?}");

        let err = decode_operation_report(StatusCode::OK, br#"{"reports": 3}"#, "validate").unwrap_err();
        assert!(err.is_remote_operation(), "{err:?}");

        let err = decode_operation_report(StatusCode::OK, b"not json", "recompute").unwrap_err();
        assert!(err.is_remote_operation(), "{err:?}");
    }

    #[test]
    fn failed_status_is_an_operation_error_for_bulk_calls() {
        let body = br#"{"reports": []}"#;
        let err = decode_operation_report(StatusCode::INTERNAL_SERVER_ERROR, body, "recompute")
            .unwrap_err();
        assert!(err.is_remote_operation());
        assert!(!err.is_remote_request());
    }

    #[test]
    fn entity_type_is_escaped_as_one_path_segment() {
        let client = TargetprocessClient::new(&target("acme.tpondemand.com", Protocol::Https)).unwrap();
        let url = client.count_url("bug?token=x/y", "true").unwrap();

        assert_eq!(url.path(), "/api/v2/bug%3Ftoken=x%2Fy");
        let q = query(&url);
        assert_eq!(q["token"], TOKEN);
        assert_eq!(q["where"], "(true)");
        assert_eq!(url.query_pairs().filter(|(k, _)| k == "token").count(), 1);
    }

    #[test]
    fn debug_hides_the_token() {
        let client = TargetprocessClient::new(&target("acme.tpondemand.com", Protocol::Https)).unwrap();
        assert!(!format!("{client:?}").contains(TOKEN));
    }

    #[tokio::test]
    async fn transport_errors_are_redacted_remote_request_errors() {
        let client = TargetprocessClient::new(&target("127.0.0.1:9", Protocol::Http)).unwrap();
        let err = client.count("bug", "true").await.unwrap_err();
        assert!(err.is_remote_request());
        let rendered = format!("{err} {err:?}");
        assert!(!rendered.contains(TOKEN), "token leaked: {rendered}");
        assert!(rendered.contains("[REDACTED]"));
    }
}
