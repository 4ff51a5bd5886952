//! Integration tests for the PKI client
//!
//! These tests require a running PKI instance.
//! Set PKI_URL, PKI_USERNAME and PKI_PASSWORD environment variables to run.

use pki_client::{ClientConfig, Credentials, PkiClient, PkiClientTrait};

fn live_client() -> PkiClient {
    let url = std::env::var("PKI_URL").unwrap_or_else(|_| "https://localhost:8443".to_string());
    let username = std::env::var("PKI_USERNAME").expect("PKI_USERNAME environment variable must be set");
    let password = std::env::var("PKI_PASSWORD").expect("PKI_PASSWORD environment variable must be set");

    let mut config = ClientConfig::new(url);
    config.skip_tls_verify = std::env::var("PKI_SKIP_TLS_VERIFY").is_ok();
    PkiClient::new(&config, Credentials::Password { username, password }).expect("Failed to create client")
}

#[tokio::test]
#[ignore] // Requires running PKI instance
async fn test_health_probe() {
    let client = live_client();
    client.check_health().await.expect("Health probe failed");
}

#[tokio::test]
#[ignore]
async fn test_poll_unknown_request() {
    let client = live_client();
    let result = client.poll_status("000000000000000000000000").await;
    assert!(result.is_err(), "Unknown request should not resolve");
}
