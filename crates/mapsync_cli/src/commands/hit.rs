//! Hit command implementation.

use reqwest::blocking::Client;
use reqwest::{Method, StatusCode};
use std::time::Duration;
use tracing::warn;

/// Outcome of a hit session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitSummary {
    /// Requests sent.
    pub attempted: u32,
    /// Requests answered with 200.
    pub succeeded: u32,
}

/// Sends up to `count` requests to `url` with `Authorization: Bearer <key>`,
/// stopping at the first response that is not 200.
pub fn run(
    url: &str,
    count: u32,
    key: &str,
    method: &str,
    timeout: Duration,
) -> Result<HitSummary, Box<dyn std::error::Error>> {
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())?;
    let client = Client::builder().timeout(timeout).build()?;
    let mut summary = HitSummary {
        attempted: 0,
        succeeded: 0,
    };

    for i in 1..=count {
        println!("Hit Count: {i}");
        let response = client.request(method.clone(), url).bearer_auth(key).send()?;
        summary.attempted += 1;
        let status = response.status();
        if status != StatusCode::OK {
            warn!(status = status.as_u16(), "trigger answered with unexpected status, stopping");
            break;
        }
        summary.succeeded += 1;
    }

    println!(
        "Hit the trigger successfully {} of {count} times",
        summary.succeeded
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_server;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn sends_bearer_key_each_time() {
        let (url, requests, server) =
            test_server::serve(vec![(200, "ok".into()), (200, "ok".into())]);

        let summary = run(&format!("{url}/api"), 2, "s3cret", "get", TIMEOUT).unwrap();
        server.join().unwrap();

        assert_eq!(
            summary,
            HitSummary {
                attempted: 2,
                succeeded: 2
            }
        );
        for request in requests.try_iter() {
            assert!(request.starts_with("GET /api "));
            assert!(request
                .to_ascii_lowercase()
                .contains("authorization: bearer s3cret"));
        }
    }

    #[test]
    fn stops_at_first_failure() {
        let (url, _requests, server) = test_server::serve(vec![
            (200, "ok".into()),
            (401, "Unauthorized Operation!".into()),
        ]);

        let summary = run(&url, 5, "wrong", "GET", TIMEOUT).unwrap();
        server.join().unwrap();

        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.succeeded, 1);
    }

    #[test]
    fn unreachable_trigger_is_an_error() {
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        assert!(run(&format!("http://{addr}/api"), 1, "", "GET", TIMEOUT).is_err());
    }
}
