const BASE_DELAY: u64 = 500;
const MAX_RETRIES: u32 = 3;
const API_KEY_HEADER: &str = "x-nxopen-api-key";
const COMBAT_POWER_STAT: &str = "전투력";
const RANKING_DATE_FORMAT: &str = "%Y-%m-%d";

/// Statuses that the lookup endpoints use for "no such entity".
const ABSENT_STATUS_CODES: &[StatusCode] = &[StatusCode::BAD_REQUEST, StatusCode::NOT_FOUND];

use crate::metrics_defs::{UPSTREAM_REQUEST_DURATION, UPSTREAM_RETRIES};
use crate::types::{BasicAttributes, Ocid, UnionMember};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use shared::{counter, histogram};
use std::time::Instant;
use tokio::time::{Duration, sleep};

#[derive(thiserror::Error, Debug)]
pub enum UpstreamError {
    #[error("request failed: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("unexpected status {status} from {endpoint}")]
    UnexpectedStatus {
        endpoint: &'static str,
        status: StatusCode,
    },
    #[error("{0} returned no data")]
    Empty(&'static str),
    #[error("upstream unavailable after retries")]
    RetriesExceeded,
}

/// Read access to the third-party game-data API.
///
/// Implementations own transport concerns such as retries. Callers treat
/// every method as a blocking call that either returns data or fails.
#[async_trait]
pub trait UpstreamCharacterApi: Send + Sync {
    /// Returns `None` when the name is unknown upstream.
    async fn resolve_identity(&self, character_name: &str) -> Result<Option<Ocid>, UpstreamError>;

    async fn basic_attributes(&self, ocid: &str) -> Result<BasicAttributes, UpstreamError>;

    /// Combat power exactly as upstream reports it (an integer as a string).
    async fn combat_power(&self, ocid: &str) -> Result<String, UpstreamError>;

    /// Ranked union list for the account that owns `ocid`, in upstream
    /// order, as published in the union ranking of `ranking_date`.
    async fn union_members(
        &self,
        ocid: &str,
        world_name: &str,
        ranking_date: NaiveDate,
    ) -> Result<Vec<UnionMember>, UpstreamError>;

    async fn guild_grouping_id(
        &self,
        guild_name: &str,
        world_name: &str,
    ) -> Result<Option<String>, UpstreamError>;
}

#[derive(Deserialize)]
struct IdResponse {
    ocid: String,
}

#[derive(Deserialize)]
struct BasicResponse {
    character_name: String,
    world_name: String,
    character_guild_name: Option<String>,
    character_class: String,
    character_class_level: String,
    character_level: i64,
}

#[derive(Deserialize)]
struct StatEntry {
    stat_name: String,
    stat_value: Option<String>,
}

#[derive(Deserialize)]
struct StatResponse {
    final_stat: Vec<StatEntry>,
}

#[derive(Deserialize)]
struct UnionRankingResponse {
    ranking: Vec<UnionMember>,
}

#[derive(Deserialize)]
struct GuildIdResponse {
    oguild_id: String,
}

/// HTTP client for the Nexon Open API.
pub struct NexonClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl NexonClient {
    pub fn new(base_url: &str, api_key: String, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(NexonClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Issues a GET and decodes the body. `Ok(None)` means upstream answered
    /// with one of the `absent` statuses.
    async fn fetch<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        query: &[(&str, &str)],
        absent: &[StatusCode],
    ) -> Result<Option<T>, UpstreamError> {
        const RETRIABLE_STATUS_CODES: &[StatusCode] = &[
            StatusCode::TOO_MANY_REQUESTS,     // 429
            StatusCode::INTERNAL_SERVER_ERROR, // 500
            StatusCode::BAD_GATEWAY,           // 502
            StatusCode::SERVICE_UNAVAILABLE,   // 503
            StatusCode::GATEWAY_TIMEOUT,       // 504
        ];

        let mut url = Url::parse(&format!("{}/maplestory/v1/{}", self.base_url, endpoint))
            .map_err(|e| UpstreamError::InvalidUrl(e.to_string()))?;
        url.query_pairs_mut().extend_pairs(query);

        let mut retries = 0;

        loop {
            let started = Instant::now();
            let response = self
                .client
                .get(url.clone())
                .header(API_KEY_HEADER, &self.api_key)
                .send()
                .await?;
            histogram!(UPSTREAM_REQUEST_DURATION).record(started.elapsed().as_secs_f64());

            let status = response.status();
            if status.is_success() {
                return Ok(Some(response.json::<T>().await?));
            }

            if absent.contains(&status) {
                tracing::debug!(endpoint, %status, "upstream reported no data");
                return Ok(None);
            }

            if !RETRIABLE_STATUS_CODES.contains(&status) {
                return Err(UpstreamError::UnexpectedStatus { endpoint, status });
            }

            if retries >= MAX_RETRIES {
                tracing::warn!(endpoint, %status, "giving up on upstream request");
                return Err(UpstreamError::RetriesExceeded);
            }

            // Backoff between retries
            let retry_millis = BASE_DELAY * 2_u64.pow(retries);
            counter!(UPSTREAM_RETRIES).increment(1);
            sleep(Duration::from_millis(retry_millis)).await;
            retries += 1;
        }
    }
}

#[async_trait]
impl UpstreamCharacterApi for NexonClient {
    async fn resolve_identity(&self, character_name: &str) -> Result<Option<Ocid>, UpstreamError> {
        let response: Option<IdResponse> =
            self
            .fetch(
                "id",
                &[("character_name", character_name)],
                ABSENT_STATUS_CODES,
            )
            .await?;

        Ok(response
            .map(|r| r.ocid)
            .filter(|ocid| !ocid.trim().is_empty()))
    }

    async fn basic_attributes(&self, ocid: &str) -> Result<BasicAttributes, UpstreamError> {
        let response: BasicResponse = self
            .fetch("character/basic", &[("ocid", ocid)], ABSENT_STATUS_CODES)
            .await?
            .ok_or(UpstreamError::Empty("character/basic"))?;

        Ok(BasicAttributes {
            character_name: response.character_name,
            world_name: response.world_name,
            guild_name: response.character_guild_name,
            class_name: response.character_class,
            class_tier: response.character_class_level,
            level: response.character_level,
        })
    }

    async fn combat_power(&self, ocid: &str) -> Result<String, UpstreamError> {
        let response: StatResponse = self
            .fetch("character/stat", &[("ocid", ocid)], ABSENT_STATUS_CODES)
            .await?
            .ok_or(UpstreamError::Empty("character/stat"))?;

        response
            .final_stat
            .into_iter()
            .find(|stat| stat.stat_name == COMBAT_POWER_STAT)
            .and_then(|stat| stat.stat_value)
            .ok_or(UpstreamError::Empty("character/stat"))
    }

    async fn union_members(
        &self,
        ocid: &str,
        world_name: &str,
        ranking_date: NaiveDate,
    ) -> Result<Vec<UnionMember>, UpstreamError> {
        let date = ranking_date.format(RANKING_DATE_FORMAT).to_string();
        // A rejected ranking request is an error here, never an empty union.
        let response: UnionRankingResponse = self
            .fetch(
                "ranking/union",
                &[("ocid", ocid), ("world_name", world_name), ("date", &date)],
                &[],
            )
            .await?
            .ok_or(UpstreamError::Empty("ranking/union"))?;

        Ok(response.ranking)
    }

    async fn guild_grouping_id(
        &self,
        guild_name: &str,
        world_name: &str,
    ) -> Result<Option<String>, UpstreamError> {
        let response: Option<GuildIdResponse> = self
            .fetch(
                "guild/id",
                &[("guild_name", guild_name), ("world_name", world_name)],
                ABSENT_STATUS_CODES,
            )
            .await?;

        Ok(response
            .map(|r| r.oguild_id)
            .filter(|id| !id.trim().is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ranking_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
    }

    fn client(server: &MockServer) -> NexonClient {
        NexonClient::new(&server.uri(), "test-key".into(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_resolve_identity_sends_api_key() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/maplestory/v1/id"))
            .and(query_param("character_name", "Foo"))
            .and(header(API_KEY_HEADER, "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ocid": "abc123"}"#))
            .mount(&mock_server)
            .await;

        let ocid = client(&mock_server).resolve_identity("Foo").await.unwrap();
        assert_eq!(ocid, Some("abc123".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_name_is_none() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/maplestory/v1/id"))
            .respond_with(ResponseTemplate::new(400).set_body_string(
                r#"{"error": {"name": "OPENAPI00004", "message": "Please input valid parameter"}}"#,
            ))
            .mount(&mock_server)
            .await;

        let ocid = client(&mock_server).resolve_identity("nobody").await.unwrap();
        assert_eq!(ocid, None);
    }

    #[tokio::test]
    async fn test_blank_ocid_is_none() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/maplestory/v1/id"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ocid": "  "}"#))
            .mount(&mock_server)
            .await;

        let ocid = client(&mock_server).resolve_identity("blank").await.unwrap();
        assert_eq!(ocid, None);
    }

    #[tokio::test]
    async fn test_retries_on_unavailable() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/maplestory/v1/id"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/maplestory/v1/id"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ocid": "abc123"}"#))
            .mount(&mock_server)
            .await;

        let ocid = client(&mock_server).resolve_identity("Foo").await.unwrap();
        assert_eq!(ocid, Some("abc123".to_string()));
    }

    #[tokio::test]
    async fn test_non_retriable_status_fails() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/maplestory/v1/character/basic"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = client(&mock_server).basic_attributes("abc123").await;
        assert!(matches!(
            result,
            Err(UpstreamError::UnexpectedStatus {
                status: StatusCode::FORBIDDEN,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_basic_attributes() {
        let mock_server = MockServer::start().await;

        let response_body = r#"{
            "date": "2024-01-01T00:00+09:00",
            "character_name": "Foo",
            "world_name": "Scania",
            "character_gender": "M",
            "character_class": "Hero",
            "character_class_level": "6",
            "character_level": 275,
            "character_exp": 1,
            "character_guild_name": null
        }"#;

        Mock::given(method("GET"))
            .and(path("/maplestory/v1/character/basic"))
            .and(query_param("ocid", "abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_string(response_body))
            .mount(&mock_server)
            .await;

        let basic = client(&mock_server).basic_attributes("abc123").await.unwrap();
        assert_eq!(
            basic,
            BasicAttributes {
                character_name: "Foo".into(),
                world_name: "Scania".into(),
                guild_name: None,
                class_name: "Hero".into(),
                class_tier: "6".into(),
                level: 275,
            }
        );
    }

    #[tokio::test]
    async fn test_combat_power_picks_stat() {
        let mock_server = MockServer::start().await;

        let response_body = r#"{
            "character_class": "Hero",
            "final_stat": [
                {"stat_name": "STR", "stat_value": "4000"},
                {"stat_name": "전투력", "stat_value": "123456789"}
            ],
            "remain_ap": 0
        }"#;

        Mock::given(method("GET"))
            .and(path("/maplestory/v1/character/stat"))
            .respond_with(ResponseTemplate::new(200).set_body_string(response_body))
            .mount(&mock_server)
            .await;

        let power = client(&mock_server).combat_power("abc123").await.unwrap();
        assert_eq!(power, "123456789");
    }

    #[tokio::test]
    async fn test_union_members_keep_upstream_order() {
        let mock_server = MockServer::start().await;

        let response_body = r#"{
            "ranking": [
                {"ranking": 10, "character_name": "A", "world_name": "Scania", "union_level": 8000},
                {"ranking": 11, "character_name": "B", "world_name": "Scania", "union_level": 8000}
            ]
        }"#;

        Mock::given(method("GET"))
            .and(path("/maplestory/v1/ranking/union"))
            .and(query_param("world_name", "Scania"))
            .and(query_param("date", "2024-02-29"))
            .respond_with(ResponseTemplate::new(200).set_body_string(response_body))
            .mount(&mock_server)
            .await;

        let members = client(&mock_server)
            .union_members("abc123", "Scania", ranking_date())
            .await
            .unwrap();
        assert_eq!(
            members,
            vec![UnionMember::new("A", 8000), UnionMember::new("B", 8000)]
        );
    }

    #[tokio::test]
    async fn test_rejected_union_request_is_an_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/maplestory/v1/ranking/union"))
            .respond_with(ResponseTemplate::new(400).set_body_string(
                r#"{"error": {"name": "OPENAPI00004", "message": "Please input valid parameter"}}"#,
            ))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = client(&mock_server)
            .union_members("abc123", "Scania", ranking_date())
            .await;
        assert!(matches!(
            result,
            Err(UpstreamError::UnexpectedStatus {
                endpoint: "ranking/union",
                status: StatusCode::BAD_REQUEST,
            })
        ));
    }
}
