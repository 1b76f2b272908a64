//! Trait abstraction for the command channel to enable testing

use std::time::Duration;
use tracing::debug;

use crate::error::{HapticBridgeError, Result};

/// Trait for issuing arm commands over the network
#[cfg_attr(test, mockall::automock)]
pub trait CommandTransport: Send {
    /// Issue a GET for `url` and discard the response body
    fn get(&self, url: &str) -> Result<()>;
}

/// Wrapper around `reqwest::blocking::Client` that implements CommandTransport
///
/// The blocking client runs its own runtime internally. Create and drop it
/// on a plain thread (or inside `tokio::task::spawn_blocking`), never
/// directly on an async worker.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    /// Build a client whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HapticBridgeError::Dispatch(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

impl CommandTransport for HttpTransport {
    fn get(&self, url: &str) -> Result<()> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| HapticBridgeError::Dispatch(format!("GET {} failed: {}", url, e)))?;

        debug!("GET {} -> {}", url, response.status());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_transport_builds() {
        assert!(HttpTransport::new(Duration::from_millis(500)).is_ok());
    }

    #[test]
    fn test_unreachable_host_is_dispatch_error() {
        // Reserve a free port, then release it so nothing is listening
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpTransport::new(Duration::from_millis(200)).unwrap();
        let url = format!("http://{}/?command=10,90,90,0,90,90,25", addr);
        let result = transport.get(&url);

        match result {
            Err(HapticBridgeError::Dispatch(msg)) => assert!(msg.contains(&addr.to_string())),
            other => panic!("Expected Dispatch error, got: {:?}", other),
        }
    }

    // Integration test - only runs with a reachable arm controller
    #[test]
    #[ignore] // Run with: cargo test -- --ignored
    fn test_get_with_real_arm() {
        let transport = HttpTransport::new(Duration::from_secs(1)).unwrap();
        let result = transport.get("http://192.168.3.14:4200/?command=10,90,90,0,90,90,25");
        assert!(result.is_ok(), "GET failed: {:?}", result);
    }
}
