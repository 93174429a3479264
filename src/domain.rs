use crate::config::Nodepool;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Path of the nodepool status endpoint.
pub const STATUS_PATH: &str = "/image-list";

/// The single nodepool instance being monitored.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Target {
    pub host: String,
    pub port: String,
}

impl Target {
    pub fn new(host: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: port.into(),
        }
    }

    pub fn scrape_uri(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, STATUS_PATH)
    }
}

impl From<&Nodepool> for Target {
    fn from(config: &Nodepool) -> Self {
        Self::new(config.host.clone(), config.port.clone())
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A completed round trip to the status endpoint.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StatusResponse {
    pub status: u16,
    pub reason: Option<String>,
    /// The body text, or the description of the error that prevented reading it.
    pub body: Result<String, String>,
}

impl StatusResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    pub fn status_line(&self) -> String {
        match &self.reason {
            Some(reason) => format!("{} {}", self.status, reason),
            None => self.status.to_string(),
        }
    }

    pub fn body_or_error(&self) -> &str {
        match &self.body {
            Ok(body) => body,
            Err(error) => error,
        }
    }
}

/// Performs the HTTP round trip. An `Err` means no response was received at all.
pub trait DataSource {
    fn get(&self, uri: &str) -> impl Future<Output = anyhow::Result<StatusResponse>> + Send;
}

impl<T> DataSource for Arc<T>
where
    T: DataSource + Send + Sync,
{
    fn get(&self, uri: &str) -> impl Future<Output = anyhow::Result<StatusResponse>> + Send {
        (**self).get(uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrape_uri() {
        let target = Target::new("nodepool.example.org", "8005");
        assert_eq!(
            target.scrape_uri(),
            "http://nodepool.example.org:8005/image-list"
        );
    }

    #[test]
    fn test_status_line_and_body() {
        let response = StatusResponse {
            status: 503,
            reason: Some("Service Unavailable".to_owned()),
            body: Ok("overloaded".to_owned()),
        };
        assert!(!response.is_ok());
        assert_eq!(response.status_line(), "503 Service Unavailable");
        assert_eq!(response.body_or_error(), "overloaded");

        let response = StatusResponse {
            status: 599,
            reason: None,
            body: Err("connection reset".to_owned()),
        };
        assert_eq!(response.status_line(), "599");
        assert_eq!(response.body_or_error(), "connection reset");
    }
}
