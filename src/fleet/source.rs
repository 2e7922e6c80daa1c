use crate::error::AppError;
use crate::fleet::query::query_trucks;
use crate::fleet::seed::{seed_delivery_stats, seed_trucks};
use crate::fleet::types::{
    DeliveryStat, QueryParams, TruckDraft, TruckPage, TruckPatch, TruckRecord,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3001/api";
pub const DEFAULT_MOCK_LATENCY: Duration = Duration::from_millis(300);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Bulk query boundary behind which the truck records live.
#[async_trait]
pub trait TruckSource: Send + Sync {
    async fn fetch(&self, params: &QueryParams) -> Result<TruckPage, AppError>;

    async fn fetch_by_id(&self, id: &str) -> Result<TruckRecord, AppError>;

    async fn create(&self, draft: TruckDraft) -> Result<TruckRecord, AppError>;

    async fn update(&self, id: &str, patch: &TruckPatch) -> Result<TruckRecord, AppError>;

    async fn delete(&self, id: &str) -> Result<(), AppError>;

    async fn fetch_delivery_stats(&self) -> Result<Vec<DeliveryStat>, AppError>;
}

fn truck_not_found(id: &str) -> AppError {
    AppError::NotFound(format!("truck {id}"))
}

pub struct MockTruckSource {
    records: Mutex<Vec<TruckRecord>>,
    latency: Duration,
}

impl MockTruckSource {
    pub fn new(records: Vec<TruckRecord>, latency: Duration) -> Self {
        Self {
            records: Mutex::new(records),
            latency,
        }
    }

    pub fn seeded() -> Self {
        Self::new(seed_trucks(), DEFAULT_MOCK_LATENCY)
    }

    fn next_id(records: &[TruckRecord]) -> String {
        let highest = records
            .iter()
            .filter_map(|truck| truck.id.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        (highest + 1).to_string()
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl TruckSource for MockTruckSource {
    async fn fetch(&self, params: &QueryParams) -> Result<TruckPage, AppError> {
        self.simulate_latency().await;
        let records = self.records.lock();
        Ok(query_trucks(&records, params))
    }

    async fn fetch_by_id(&self, id: &str) -> Result<TruckRecord, AppError> {
        self.simulate_latency().await;
        self.records
            .lock()
            .iter()
            .find(|truck| truck.id == id)
            .cloned()
            .ok_or_else(|| truck_not_found(id))
    }

    async fn create(&self, draft: TruckDraft) -> Result<TruckRecord, AppError> {
        draft.validate()?;
        self.simulate_latency().await;
        let mut records = self.records.lock();
        let record = draft.into_record(Self::next_id(&records));
        records.push(record.clone());
        Ok(record)
    }

    async fn update(&self, id: &str, patch: &TruckPatch) -> Result<TruckRecord, AppError> {
        self.simulate_latency().await;
        let mut records = self.records.lock();
        let truck = records
            .iter_mut()
            .find(|truck| truck.id == id)
            .ok_or_else(|| truck_not_found(id))?;
        truck.apply_patch(patch);
        Ok(truck.clone())
    }

    async fn delete(&self, id: &str) -> Result<(), AppError> {
        self.simulate_latency().await;
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|truck| truck.id != id);
        if records.len() == before {
            return Err(truck_not_found(id));
        }
        Ok(())
    }

    async fn fetch_delivery_stats(&self) -> Result<Vec<DeliveryStat>, AppError> {
        self.simulate_latency().await;
        Ok(seed_delivery_stats())
    }
}

fn trucks_endpoint(base_url: &str) -> String {
    format!("{}/trucks", base_url.trim_end_matches('/'))
}

/// The id is pushed as one path segment, so `/`, `?` and `#` in it are percent-encoded.
fn truck_endpoint(base_url: &str, id: &str) -> Result<Url, AppError> {
    let mut url = Url::parse(&trucks_endpoint(base_url)).map_err(|error| {
        AppError::InvalidArgument(format!("invalid truck api url {base_url:?}: {error}"))
    })?;
    url.path_segments_mut()
        .map_err(|_| {
            AppError::InvalidArgument(format!("truck api url {base_url:?} cannot take a path"))
        })?
        .push(id);
    Ok(url)
}

fn delivery_stats_endpoint(base_url: &str) -> String {
    format!("{}/stats/deliveries", trucks_endpoint(base_url))
}

fn page_query(params: &QueryParams) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("page", params.page.to_string()),
        ("pageSize", params.page_size.to_string()),
        ("sort", params.sort.clone()),
    ];
    if !params.search.is_empty() {
        query.push(("search", params.search.clone()));
    }
    if !params.status.is_empty() {
        query.push(("status", params.status.clone()));
    }
    query
}

fn is_retryable(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout()
}

pub struct HttpTruckSource {
    client: Client,
    base_url: String,
}

impl HttpTruckSource {
    pub fn new(base_url: impl Into<String>) -> Result<Self, AppError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends once, retrying a single time after a delay on connect or timeout failures.
    async fn send(&self, build: impl Fn(&Client) -> RequestBuilder) -> Result<Response, AppError> {
        let response = match build(&self.client).send().await {
            Ok(response) => response,
            Err(error) if is_retryable(&error) => {
                tracing::warn!(base_url = %self.base_url, %error, "truck api request failed; retrying");
                tokio::time::sleep(RETRY_DELAY).await;
                build(&self.client).send().await?
            }
            Err(error) => return Err(error.into()),
        };
        Ok(response)
    }

    async fn checked(response: Response, id: Option<&str>) -> Result<Response, AppError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(match id {
                Some(id) => truck_not_found(id),
                None => AppError::NotFound(response.url().path().to_string()),
            });
        }

        let message = response.text().await.unwrap_or_default();
        Err(AppError::Upstream {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl TruckSource for HttpTruckSource {
    async fn fetch(&self, params: &QueryParams) -> Result<TruckPage, AppError> {
        let endpoint = trucks_endpoint(&self.base_url);
        let query = page_query(params);
        let response = self
            .send(|client| client.get(&endpoint).query(&query))
            .await?;
        let page = Self::checked(response, None)
            .await?
            .json::<TruckPage>()
            .await?;
        tracing::debug!(total = page.total, page = page.page, "fetched truck page");
        Ok(page)
    }

    async fn fetch_by_id(&self, id: &str) -> Result<TruckRecord, AppError> {
        let endpoint = truck_endpoint(&self.base_url, id)?;
        let response = self.send(|client| client.get(endpoint.clone())).await?;
        Ok(Self::checked(response, Some(id))
            .await?
            .json::<TruckRecord>()
            .await?)
    }

    async fn create(&self, draft: TruckDraft) -> Result<TruckRecord, AppError> {
        draft.validate()?;
        let endpoint = trucks_endpoint(&self.base_url);
        let response = self
            .send(|client| client.post(&endpoint).json(&draft))
            .await?;
        Ok(Self::checked(response, None)
            .await?
            .json::<TruckRecord>()
            .await?)
    }

    async fn update(&self, id: &str, patch: &TruckPatch) -> Result<TruckRecord, AppError> {
        let endpoint = truck_endpoint(&self.base_url, id)?;
        let response = self
            .send(|client| client.put(endpoint.clone()).json(patch))
            .await?;
        Ok(Self::checked(response, Some(id))
            .await?
            .json::<TruckRecord>()
            .await?)
    }

    async fn delete(&self, id: &str) -> Result<(), AppError> {
        let endpoint = truck_endpoint(&self.base_url, id)?;
        let response = self.send(|client| client.delete(endpoint.clone())).await?;
        Self::checked(response, Some(id)).await?;
        Ok(())
    }

    async fn fetch_delivery_stats(&self) -> Result<Vec<DeliveryStat>, AppError> {
        let endpoint = delivery_stats_endpoint(&self.base_url);
        let response = self.send(|client| client.get(&endpoint)).await?;
        let stats = Self::checked(response, None)
            .await?
            .json::<Vec<DeliveryStat>>()
            .await?;
        tracing::debug!(days = stats.len(), "fetched delivery stats");
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::types::{TruckLocation, TruckStatus};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn draft(driver: &str) -> TruckDraft {
        TruckDraft {
            driver: driver.to_string(),
            plate_number: "B 9999 ZZZ".to_string(),
            capacity: 4_000.0,
            status: TruckStatus::Idle,
            photo_url: None,
            location: TruckLocation {
                lat: -6.2,
                lng: 106.8,
                address: "Depok, Jawa Barat".to_string(),
            },
            last_seen: "2025-10-14T08:00:00.000Z".to_string(),
            current_load: 0.0,
            fuel_level: Some(100.0),
        }
    }

    /// Answers one HTTP request with a canned response and hands back the request head.
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let address = listener.local_addr().expect("listener has an address");
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.expect("client should connect");
            let mut head = Vec::new();
            let mut buffer = [0_u8; 1024];
            while !head.windows(4).any(|window| window == b"\r\n\r\n") {
                let read = stream.read(&mut buffer).await.expect("request should read");
                if read == 0 {
                    break;
                }
                head.extend_from_slice(&buffer[..read]);
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream
                .write_all(response.as_bytes())
                .await
                .expect("response should write");
            String::from_utf8_lossy(&head).into_owned()
        });
        (format!("http://{address}/api"), handle)
    }

    #[test]
    fn trucks_endpoint_trims_trailing_slash() {
        assert_eq!(
            trucks_endpoint("http://localhost:3001/api/"),
            "http://localhost:3001/api/trucks"
        );
        assert_eq!(
            truck_endpoint(DEFAULT_API_BASE_URL, "7")
                .expect("default base url is valid")
                .as_str(),
            "http://localhost:3001/api/trucks/7"
        );
        assert_eq!(
            delivery_stats_endpoint("http://localhost:3001/api/"),
            "http://localhost:3001/api/trucks/stats/deliveries"
        );
    }

    #[test]
    fn truck_endpoint_encodes_id_as_one_segment() {
        let url = truck_endpoint(DEFAULT_API_BASE_URL, "a/b?c#d").expect("default base url is valid");

        assert_eq!(url.as_str(), "http://localhost:3001/api/trucks/a%2Fb%3Fc%23d");
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
        assert!(matches!(
            truck_endpoint("not a url", "1"),
            Err(AppError::InvalidArgument(_))
        ));
    }

    #[test]
    fn page_query_skips_empty_filters() {
        let query = page_query(&QueryParams::default());
        let keys: Vec<&str> = query.iter().map(|(key, _)| *key).collect();
        assert_eq!(keys, vec!["page", "pageSize", "sort"]);

        let filtered = page_query(&QueryParams {
            search: "budi".to_string(),
            status: "active".to_string(),
            ..QueryParams::default()
        });
        assert!(filtered.contains(&("search", "budi".to_string())));
        assert!(filtered.contains(&("status", "active".to_string())));
    }

    #[tokio::test]
    async fn mock_source_serves_seed_fleet() {
        let source = MockTruckSource::new(seed_trucks(), Duration::ZERO);
        let page = source
            .fetch(&QueryParams::default())
            .await
            .expect("mock fetch should succeed");

        assert_eq!(page.total, 8);
        assert_eq!(page.data[0].driver, "Ahmad Hidayat");
    }

    #[tokio::test]
    async fn mock_source_reports_missing_truck() {
        let source = MockTruckSource::new(seed_trucks(), Duration::ZERO);

        let error = source.fetch_by_id("404").await.expect_err("id is unknown");
        assert!(error.is_not_found());
        assert!(source.delete("404").await.is_err());
        assert!(source
            .update("404", &TruckPatch::default())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn mock_source_assigns_next_numeric_id() {
        let source = MockTruckSource::new(seed_trucks(), Duration::ZERO);
        source.delete("3").await.expect("seed truck 3 exists");

        let created = source
            .create(draft("Joko Widodo"))
            .await
            .expect("valid draft should be created");
        assert_eq!(created.id, "9");

        let fetched = source.fetch_by_id("9").await.expect("new truck is stored");
        assert_eq!(fetched.driver, "Joko Widodo");
        assert!(source.create(draft("  ")).await.is_err());
    }

    #[tokio::test]
    async fn mock_source_merges_patch() {
        let source = MockTruckSource::new(seed_trucks(), Duration::ZERO);
        let updated = source
            .update(
                "1",
                &TruckPatch {
                    status: Some(TruckStatus::Offline),
                    ..TruckPatch::default()
                },
            )
            .await
            .expect("truck 1 exists");

        assert_eq!(updated.status, TruckStatus::Offline);
        assert_eq!(updated.driver, "Budi Santoso");
    }

    #[tokio::test]
    async fn http_source_sends_query_and_decodes_page() {
        let (base_url, server) = serve_once("200 OK", r#"{"data":[],"total":0,"page":2,"pageSize":5}"#).await;
        let source = HttpTruckSource::new(base_url).expect("client should build");

        let page = source
            .fetch(&QueryParams {
                page: 2,
                page_size: 5,
                status: "idle".to_string(),
                ..QueryParams::default()
            })
            .await
            .expect("page should decode");
        let head = server.await.expect("server task should finish");

        assert_eq!(page.page, 2);
        assert_eq!(page.page_size, 5);
        assert!(head.starts_with("GET /api/trucks?page=2&pageSize=5&sort=driver%3Aasc&status=idle "));
    }

    #[tokio::test]
    async fn http_source_maps_404_to_not_found() {
        let (base_url, server) = serve_once("404 Not Found", "").await;
        let source = HttpTruckSource::new(base_url).expect("client should build");

        let error = source.fetch_by_id("42").await.expect_err("server answers 404");
        let head = server.await.expect("server task should finish");

        assert!(error.is_not_found());
        assert!(head.starts_with("GET /api/trucks/42 "));
    }

    #[tokio::test]
    async fn mock_source_serves_week_of_delivery_stats() {
        let source = MockTruckSource::new(seed_trucks(), Duration::ZERO);
        let stats = source
            .fetch_delivery_stats()
            .await
            .expect("mock stats are always available");

        assert_eq!(stats.len(), 7);
        assert_eq!(stats[0].date, "2025-10-08");
        assert_eq!(stats[3].deliveries, 61);
        assert!(stats
            .iter()
            .all(|day| day.on_time + day.delayed == day.deliveries));
    }

    #[tokio::test]
    async fn http_source_fetches_delivery_stats() {
        let (base_url, server) = serve_once(
            "200 OK",
            r#"[{"date":"2025-10-08","deliveries":45,"onTime":42,"delayed":3}]"#,
        )
        .await;
        let source = HttpTruckSource::new(base_url).expect("client should build");

        let stats = source
            .fetch_delivery_stats()
            .await
            .expect("stats should decode");
        let head = server.await.expect("server task should finish");

        assert!(head.starts_with("GET /api/trucks/stats/deliveries "));
        assert_eq!(
            stats,
            vec![DeliveryStat {
                date: "2025-10-08".to_string(),
                deliveries: 45,
                on_time: 42,
                delayed: 3,
            }]
        );
    }

    #[tokio::test]
    async fn http_source_encodes_truck_id_in_path() {
        let (base_url, server) = serve_once("404 Not Found", "").await;
        let source = HttpTruckSource::new(base_url).expect("client should build");

        let error = source
            .fetch_by_id("7/../1")
            .await
            .expect_err("server answers 404");
        let head = server.await.expect("server task should finish");

        assert!(error.is_not_found());
        assert!(head.starts_with("GET /api/trucks/7%2F..%2F1 "));
    }

    #[tokio::test]
    async fn http_source_surfaces_server_errors() {
        let (base_url, server) = serve_once("503 Service Unavailable", r#"{"error":"down"}"#).await;
        let source = HttpTruckSource::new(base_url).expect("client should build");

        let error = source.delete("1").await.expect_err("server answers 503");
        let _ = server.await;

        assert!(matches!(error, AppError::Upstream { status: 503, .. }));
    }
}
