use std::collections::HashMap;
use std::time::{Duration, Instant};
use log::{debug, error, warn};
use reqwest::Client;
use tokio::sync::Mutex;

use crate::config::{FailurePolicy, Target};
use crate::history::Sample;
use crate::utils::http_client::{get_client, HttpClientConfig};

/// Takes one latency sample from a target.
#[async_trait::async_trait]
pub trait Prober {
    /// Measures a single round trip to `target`, never taking much longer
    /// than `budget`. Failures are folded into the returned sample.
    async fn probe(&self, target: &Target, budget: Duration) -> Sample;
    fn describe(&self) -> String;
}

impl FailurePolicy {
    pub fn failed_sample(self) -> Sample {
        match self {
            FailurePolicy::Marker => Sample::Failed,
            FailurePolicy::Zero => Sample::Latency(0),
        }
    }
}

/// Probes targets with a bodiless `HEAD` request.
///
/// Every call splits its own budget into connect and read halves. Clients are
/// built per distinct budget from the shared `HttpClientConfig` and reused.
pub struct HttpProber {
    client_config: HttpClientConfig,
    clients: Mutex<HashMap<Duration, Client>>,
    failure_policy: FailurePolicy,
}

impl HttpProber {
    /// Builds the client for `client_config.probe_timeout` up front so a bad
    /// proxy or TLS setup is reported at startup.
    pub fn new(client_config: HttpClientConfig, failure_policy: FailurePolicy) -> Result<Self, reqwest::Error> {
        let client = get_client(Some(client_config.clone()))?;
        let mut clients = HashMap::new();
        clients.insert(client_config.probe_timeout, client);

        Ok(HttpProber { client_config, clients: Mutex::new(clients), failure_policy })
    }

    async fn client_for(&self, budget: Duration) -> Result<Client, reqwest::Error> {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(&budget) {
            return Ok(client.clone());
        }

        let client = get_client(Some(HttpClientConfig { probe_timeout: budget, ..self.client_config.clone() }))?;
        debug!("Built HTTP client for a {:?} probe budget", budget);
        clients.insert(budget, client.clone());
        Ok(client)
    }
}

#[async_trait::async_trait]
impl Prober for HttpProber {
    async fn probe(&self, target: &Target, budget: Duration) -> Sample {
        let client = match self.client_for(budget).await {
            Ok(client) => client,
            Err(e) => {
                error!("Cannot build HTTP client for '{}': {}", target.url, e);
                return self.failure_policy.failed_sample();
            }
        };
        let request = client.head(&target.url).timeout(budget);

        let start = Instant::now();
        let response = request.send().await;
        let elapsed = start.elapsed();

        match response {
            Ok(resp) => {
                // Any status counts: the round trip completed.
                debug!("'{}' answered {} in {:?}", target.url, resp.status().as_u16(), elapsed);
                Sample::Latency(elapsed.as_millis() as u64)
            },
            Err(e) => {
                warn!("Failed to reach '{}' after {:?}: {}", target.url, elapsed, e);
                self.failure_policy.failed_sample()
            }
        }
    }

    fn describe(&self) -> String {
        format!("HEAD prober ({:?} on failure)", self.failure_policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Color;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn target(url: String) -> Target {
        Target { url, color: Color::rgb(0, 0, 0) }
    }

    fn prober(budget: Duration, failure_policy: FailurePolicy) -> HttpProber {
        HttpProber::new(HttpClientConfig { probe_timeout: budget, ..Default::default() }, failure_policy)
            .expect("client should build")
    }

    /// Serves `status` to every connection after waiting `delay`.
    async fn stub_server(status: &'static str, delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else { return };
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = socket.read(&mut buf).await;
                    tokio::time::sleep(delay).await;
                    let response = format!("HTTP/1.1 {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n", status);
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });
        format!("http://{}/", addr)
    }

    async fn closed_port_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn test_successful_probe_records_latency() {
        let url = stub_server("200 OK", Duration::from_millis(30)).await;
        let budget = Duration::from_secs(2);

        let sample = prober(budget, FailurePolicy::Marker).probe(&target(url), budget).await;

        let ms = sample.millis().expect("probe should succeed");
        assert!(ms >= 30, "expected at least the server delay, got {}", ms);
        assert!(ms < 2_000);
    }

    #[tokio::test]
    async fn test_error_status_still_counts_as_response() {
        let url = stub_server("503 Service Unavailable", Duration::ZERO).await;
        let budget = Duration::from_secs(2);

        let sample = prober(budget, FailurePolicy::Marker).probe(&target(url), budget).await;

        assert!(matches!(sample, Sample::Latency(_)));
    }

    #[tokio::test]
    async fn test_refused_connection_uses_marker() {
        let url = closed_port_url().await;
        let budget = Duration::from_secs(2);

        let sample = prober(budget, FailurePolicy::Marker).probe(&target(url), budget).await;

        assert_eq!(sample, Sample::Failed);
    }

    #[tokio::test]
    async fn test_refused_connection_records_zero_under_zero_policy() {
        let url = closed_port_url().await;
        let budget = Duration::from_secs(2);

        let sample = prober(budget, FailurePolicy::Zero).probe(&target(url), budget).await;

        assert_eq!(sample, Sample::Latency(0));
    }

    #[tokio::test]
    async fn test_slow_server_times_out_within_budget() {
        let url = stub_server("200 OK", Duration::from_secs(5)).await;
        let budget = Duration::from_millis(200);

        let start = Instant::now();
        let sample = prober(budget, FailurePolicy::Marker).probe(&target(url), budget).await;

        assert_eq!(sample, Sample::Failed);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_call_budget_is_split_even_when_client_default_is_larger() {
        // Answers at 300ms: inside a 400ms total, but past the 200ms read half.
        let url = stub_server("200 OK", Duration::from_millis(300)).await;
        let sampler = prober(Duration::from_secs(10), FailurePolicy::Marker);

        let start = Instant::now();
        let sample = sampler.probe(&target(url.clone()), Duration::from_millis(400)).await;

        assert_eq!(sample, Sample::Failed);
        assert!(start.elapsed() < Duration::from_millis(400));

        // The configured default budget still lets the same server answer.
        let sample = sampler.probe(&target(url), Duration::from_secs(10)).await;
        assert!(matches!(sample, Sample::Latency(ms) if ms >= 300));
    }

    #[tokio::test]
    async fn test_clients_are_reused_per_budget() {
        let sampler = prober(Duration::from_secs(2), FailurePolicy::Marker);
        let url = closed_port_url().await;

        sampler.probe(&target(url.clone()), Duration::from_millis(500)).await;
        sampler.probe(&target(url.clone()), Duration::from_millis(500)).await;
        sampler.probe(&target(url), Duration::from_secs(2)).await;

        assert_eq!(sampler.clients.lock().await.len(), 2);
    }

    #[test]
    fn test_failed_sample_per_policy() {
        assert_eq!(FailurePolicy::Marker.failed_sample(), Sample::Failed);
        assert_eq!(FailurePolicy::Zero.failed_sample(), Sample::Latency(0));
    }
}
