use reqwest::{Client, Error, header::HeaderMap, header::HeaderName, header::HeaderValue, redirect::Policy};
use std::collections::HashMap;
use std::time::Duration;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Total budget for one probe, split evenly between connect and read.
    pub probe_timeout: Duration,
    pub proxy_url: Option<String>,
    pub default_headers: HashMap<String, String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_millis(10_000),
            proxy_url: None,
            default_headers: HashMap::new(),
        }
    }
}

/// Splits a probe budget into its connect-phase and read-phase halves.
pub fn split_budget(total: Duration) -> (Duration, Duration) {
    let connect = total / 2;
    (connect, total - connect)
}

pub fn get_client(config: Option<HttpClientConfig>) -> Result<Client, Error> {
    let config = config.unwrap_or_default();
    let (connect_timeout, read_timeout) = split_budget(config.probe_timeout);

    let mut client_builder = Client::builder()
        .connect_timeout(connect_timeout)
        .read_timeout(read_timeout)
        .redirect(Policy::none());

    if let Some(proxy_url) = config.proxy_url {
        if let Ok(proxy) = reqwest::Proxy::all(&proxy_url) {
            client_builder = client_builder.proxy(proxy);
        } else {
            log::error!("Invalid proxy URL: {}", proxy_url);
        }
    }

    let mut headers = HeaderMap::new();
    for (key, value) in config.default_headers.iter() {
        if let (Ok(h_key), Ok(h_value)) = (HeaderName::from_str(key), HeaderValue::from_str(value)) {
            headers.insert(h_key, h_value);
        } else {
            log::error!("Invalid header: {}: {}", key, value);
        }
    }

    client_builder = client_builder.default_headers(headers);

    client_builder.build()
}
