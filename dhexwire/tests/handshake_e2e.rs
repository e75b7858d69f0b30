// End-to-end handshakes over real TCP sockets on the loopback interface.

use std::time::Duration;

use dhexcore::kex::{modp_group_2048, DhParams};
use dhexcore::session::SessionConfig;
use dhexcore::BigUint;
use dhexwire::{Client, ClientConfig, DhexWireError, HandshakeOutcome, Server, ServerConfig};

fn fast_session_config() -> SessionConfig {
    SessionConfig {
        private_key_bits: 128,
        min_prime_bits: 16,
    }
}

fn fast_params() -> DhParams {
    DhParams::new(
        BigUint::from(5u32),
        BigUint::from(18_446_744_073_709_551_557u64),
    )
}

/// Bind a server on an ephemeral port and run it in the background.
async fn spawn_server(mut config: ServerConfig) -> std::net::SocketAddr {
    config.port = 0;
    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

#[tokio::test]
async fn full_handshake_over_tcp() {
    let mut server_config = ServerConfig::new(0, fast_params());
    server_config.session = fast_session_config();
    let addr = spawn_server(server_config).await;

    let mut client_config = ClientConfig::new("127.0.0.1", addr.port(), "student42");
    client_config.session = fast_session_config();

    match Client::new(client_config).run().await.unwrap() {
        HandshakeOutcome::Established(session) => {
            assert_eq!(session.params.generator, BigUint::from(5u32));
            assert!(session.shared_secret > BigUint::from(0u32));
        }
        HandshakeOutcome::Busy => panic!("server refused an empty slot"),
    }
}

#[tokio::test]
async fn hint_determines_the_shared_secret() {
    // With a pre-assigned client exponent the test can predict the secret
    // from the server public key alone.
    let hint = BigUint::from(1_234_567_890_123u64);
    let mut server_config = ServerConfig::new(0, fast_params());
    server_config.session = fast_session_config();
    server_config.client_key_hint = Some(hint.clone());
    let addr = spawn_server(server_config).await;

    let mut client_config = ClientConfig::new("127.0.0.1", addr.port(), "student42");
    client_config.session = fast_session_config();

    match Client::new(client_config).run().await.unwrap() {
        HandshakeOutcome::Established(session) => {
            let expected_pk = session
                .params
                .generator
                .modpow(&hint, &session.params.prime);
            assert_eq!(session.client_public_key, expected_pk);
            let expected_secret = session
                .server_public_key
                .modpow(&hint, &session.params.prime);
            assert_eq!(session.shared_secret, expected_secret);
        }
        HandshakeOutcome::Busy => panic!("server refused an empty slot"),
    }
}

#[tokio::test]
async fn handshake_with_2048_bit_group() {
    let params = DhParams::new(BigUint::from(5u32), modp_group_2048());
    let server_config = ServerConfig::new(0, params);
    let addr = spawn_server(server_config).await;

    let client_config = ClientConfig::new("127.0.0.1", addr.port(), "student42");
    let outcome = Client::new(client_config).run().await.unwrap();
    assert!(matches!(outcome, HandshakeOutcome::Established(_)));
}

#[tokio::test]
async fn over_capacity_hello_gets_busy() {
    let mut server_config = ServerConfig::new(0, fast_params());
    server_config.session = fast_session_config();
    server_config.max_sessions = 0;
    let addr = spawn_server(server_config).await;

    let mut client_config = ClientConfig::new("127.0.0.1", addr.port(), "student42");
    client_config.session = fast_session_config();

    let outcome = Client::new(client_config).run().await.unwrap();
    assert!(matches!(outcome, HandshakeOutcome::Busy));
}

#[tokio::test]
async fn silent_server_times_out() {
    // A listener that accepts and then says nothing.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        // Hold the socket open without replying.
        tokio::time::sleep(Duration::from_secs(60)).await;
        drop(stream);
    });

    let mut client_config = ClientConfig::new("127.0.0.1", addr.port(), "student42");
    client_config.session = fast_session_config();
    client_config.reply_timeout = Duration::from_millis(200);

    let err = Client::new(client_config).run().await.unwrap_err();
    assert!(matches!(err, DhexWireError::Timeout));
}

#[tokio::test]
async fn refused_connection_is_a_connection_error() {
    // Bind then drop to get a port with nothing listening.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client_config = ClientConfig::new("127.0.0.1", port, "student42");
    let err = Client::new(client_config).run().await.unwrap_err();
    assert!(matches!(err, DhexWireError::Connection(_)));
}
