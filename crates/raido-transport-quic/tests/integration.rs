use std::sync::OnceLock;
use std::time::Duration;

use raido_transport::ClientTrust;
use raido_transport_quic::QuicTransport;
use tokio::time::timeout;

static CRYPTO_PROVIDER_INIT: OnceLock<()> = OnceLock::new();

fn init_crypto_provider() {
    CRYPTO_PROVIDER_INIT.get_or_init(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

#[tokio::test]
async fn dial_and_accept_roundtrip() {
    use raido_transport::Transport;

    init_crypto_provider();

    let cert_dir = std::env::temp_dir().join(format!(
        "raido-quic-test-{}",
        std::process::id()
    ));
    let server = QuicTransport::new(ClientTrust::Insecure, cert_dir.clone(), "localhost".to_string());
    let listener = server.listen("127.0.0.1:0").await.expect("listen");
    let local_addr = listener.local_addr().expect("local addr");

    let client = QuicTransport::new(ClientTrust::Insecure, cert_dir, "localhost".to_string());

    let accept_task = tokio::spawn(async move { listener.accept().await });

    let client_conn = timeout(Duration::from_secs(5), client.dial(&local_addr.to_string()))
        .await
        .expect("dial timeout")
        .expect("dial failed");

    let (server_conn, _remote) = timeout(Duration::from_secs(5), accept_task)
        .await
        .expect("accept timeout")
        .expect("join")
        .expect("accept failed");

    assert!(!client_conn.is_closed());
    assert!(!server_conn.is_closed());
}
