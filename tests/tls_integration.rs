//! Integration tests for transport selection and TLS
//!
//! Configuration checks run everywhere. The end-to-end test needs a node
//! with TLS enabled:
//!
//! ```bash
//! export DOCSTORE_TLS_HOST="db.example.com"
//! export DOCSTORE_TLS_PORT="27017"
//! export DOCSTORE_TLS_CA="/path/to/ca.pem"   # Optional: verify against this CA
//!
//! cargo test --test tls_integration -- --ignored --nocapture
//! ```

#[cfg(test)]
mod tls_integration {
    use docstore_wire::client::TransportKind;
    use docstore_wire::{Client, ClientConfig, Error, Intent};
    use serde_json::json;
    use std::env;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn assert_config_error<T: std::fmt::Debug>(result: docstore_wire::Result<T>, needle: &str) {
        match result {
            Err(Error::Config(msg)) => assert!(
                msg.contains(needle),
                "expected '{}' in config error, got '{}'",
                needle,
                msg
            ),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_tls_options_without_tls_rejected() {
        let result = ClientConfig::builder("localhost", 27017)
            .ssl_cert("/etc/ssl/client.pem")
            .build();
        assert_config_error(result, "without TLS enabled");

        let result = ClientConfig::builder("localhost", 27017)
            .ssl(false)
            .ssl_verify(true)
            .build();
        assert_config_error(result, "without TLS enabled");
    }

    #[test]
    fn test_verify_requires_ca() {
        let result = ClientConfig::builder("localhost", 27017)
            .ssl(true)
            .ssl_verify(true)
            .build();
        assert_config_error(result, "ssl_ca_cert");
    }

    #[test]
    fn test_pass_phrase_requires_key() {
        let result = ClientConfig::builder("localhost", 27017)
            .ssl(true)
            .ssl_key_pass_phrase("hunter2")
            .build();
        assert_config_error(result, "ssl_key");

        // A certificate file does not stand in for the key here
        let result = ClientConfig::builder("localhost", 27017)
            .ssl(true)
            .ssl_cert("/etc/ssl/client.pem")
            .ssl_key_pass_phrase("hunter2")
            .build();
        assert_config_error(result, "ssl_key");
    }

    #[test]
    fn test_tls_transport_selected() {
        let config = ClientConfig::builder("localhost", 27017)
            .ssl(true)
            .build()
            .unwrap();
        assert_eq!(config.transport().kind(), TransportKind::Tls);
        let settings = config.transport().tls().unwrap();
        assert!(!settings.verify);
    }

    #[test]
    fn test_missing_ca_file_fails_at_construction() {
        let config = ClientConfig::builder("localhost", 27017)
            .ssl(true)
            .ssl_ca_cert("/nonexistent/docstore-ca.pem")
            .build()
            .unwrap();
        assert_config_error(Client::new(config), "CA certificate");
    }

    #[tokio::test]
    async fn test_tls_handshake_failure_is_connection_failure() {
        // A peer that hangs up instead of speaking TLS
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                drop(socket);
            }
        });

        let config = ClientConfig::builder("localhost", port)
            .ssl(true)
            .ssl_verify(false)
            .connect_timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        let client = Client::new(config).unwrap();

        let err = client.connect().await.unwrap_err();
        match err {
            Error::ConnectionFailure { address, .. } => {
                assert_eq!(address, format!("localhost:{}", port));
            }
            other => panic!("expected connection failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unix_socket_transport() {
        let path = "/nonexistent/docstore-test.sock";
        let config = ClientConfig::builder(path, 27017).build().unwrap();
        assert_eq!(config.transport().kind(), TransportKind::Unix);

        let client = Client::new(config).unwrap();
        assert_eq!(client.address(), path);

        let err = client.connect().await.unwrap_err();
        match err {
            Error::ConnectionFailure { address, .. } => assert_eq!(address, path),
            other => panic!("expected connection failure, got {:?}", other),
        }
    }

    /// End-to-end against a TLS-enabled node
    #[tokio::test]
    #[ignore] // Requires a node with TLS enabled
    async fn test_tls_connect_and_ping() {
        let host = match env::var("DOCSTORE_TLS_HOST") {
            Ok(host) => host,
            Err(_) => {
                eprintln!("Skipping test: DOCSTORE_TLS_HOST not set");
                return;
            }
        };
        let port = env::var("DOCSTORE_TLS_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(27017);

        let mut builder = ClientConfig::builder(host, port).ssl(true);
        if let Ok(ca) = env::var("DOCSTORE_TLS_CA") {
            builder = builder.ssl_ca_cert(ca);
        }
        let client = Client::new(builder.build().expect("config")).expect("client");

        client.connect().await.expect("TLS connect");
        let reply = client
            .run_command(Intent::Read, json!({"ping": 1}))
            .await
            .expect("ping over TLS");
        assert_eq!(reply["ok"], json!(1));
        assert!(client.is_active().await.expect("probe"));
        println!("✓ TLS connection succeeded");
    }
}
