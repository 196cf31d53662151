//! Device liveness probe
//!
//! A device answers `GET http://<ip>:9801/getscreensize` with 200 and an
//! optional plain-text body such as `"1920 1080"` or `"1920x1080"`.

use std::fmt;
use std::future::Future;
use std::net::Ipv4Addr;

use crate::registry::Resolution;

use super::config::ScanConfig;

/// Successful probe answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub ip: Ipv4Addr,
    /// Trimmed response body
    pub body: String,
    /// Parsed from the body, if it held two integers
    pub resolution: Option<Resolution>,
}

impl ProbeReport {
    pub fn new(ip: Ipv4Addr, body: &str) -> Self {
        let body = body.trim().to_string();
        let resolution = parse_resolution(&body);
        Self {
            ip,
            body,
            resolution,
        }
    }

    /// `"Device <body>"`, unless the body was empty
    pub fn display_name(&self) -> Option<String> {
        (!self.body.is_empty()).then(|| format!("Device {}", self.body))
    }
}

/// Why an address is not counted as a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// Connection refused, reset, or no route
    Unreachable(String),
    /// No answer in time
    Timeout,
    /// Answered with a status other than 200
    Status(u16),
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::Unreachable(e) => write!(f, "unreachable: {}", e),
            ProbeError::Timeout => write!(f, "timed out"),
            ProbeError::Status(code) => write!(f, "unexpected status {}", code),
        }
    }
}

impl std::error::Error for ProbeError {}

/// Checks whether a device lives at an address
pub trait Prober: Send + Sync + 'static {
    fn probe(&self, ip: Ipv4Addr) -> impl Future<Output = Result<ProbeReport, ProbeError>> + Send;
}

/// HTTP GET prober backed by `reqwest`
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: reqwest::Client,
    port: u16,
    path: String,
}

impl HttpProber {
    /// Build a prober using the scan config's port, path and timeouts
    pub fn new(config: &ScanConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.probe_connect_timeout)
            .timeout(config.probe_timeout)
            .no_proxy()
            .build()?;

        Ok(Self {
            client,
            port: config.probe_port,
            path: config.probe_path.clone(),
        })
    }

    /// Probe URL for an address
    pub fn url(&self, ip: Ipv4Addr) -> String {
        format!("http://{}:{}{}", ip, self.port, self.path)
    }
}

impl Prober for HttpProber {
    async fn probe(&self, ip: Ipv4Addr) -> Result<ProbeReport, ProbeError> {
        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                ProbeError::Timeout
            } else {
                ProbeError::Unreachable(e.to_string())
            }
        };

        let response = self
            .client
            .get(self.url(ip))
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(ProbeError::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(classify)?;
        Ok(ProbeReport::new(ip, &body))
    }
}

/// Parse `"W H"`, `"WxH"` or `"WXH"` into a resolution
pub fn parse_resolution(body: &str) -> Option<Resolution> {
    let normalized = body.replace(['x', 'X'], " ");
    let mut parts = normalized.split_whitespace();

    let width = parts.next()?.parse().ok()?;
    let height = parts.next()?.parse().ok()?;
    Some(Resolution::new(width, height))
}
