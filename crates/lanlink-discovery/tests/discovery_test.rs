//! Discovery integration tests
//!
//! These run real UDP sockets on loopback. Clients point their requests at
//! 127.0.0.1 via the unicast target override so the tests do not depend on
//! broadcast delivery inside the test environment.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lanlink_discovery::{
    Discoverable, DiscoverableTcpSocket, DiscoveringTcpSocket, UdpDiscoveryClient,
    UdpDiscoveryServer,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UdpSocket;
use tokio::time::timeout;

const TEST_REPLY: &str = "Hello from test service!";

fn localhost(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

async fn start_test_server(identifier: &str, reply: &'static str) -> UdpDiscoveryServer {
    let mut server = UdpDiscoveryServer::bind(0).await.unwrap();
    server.add_discoverable(Discoverable::new(identifier, move || reply.to_string()));
    server.start();
    server
}

#[tokio::test]
async fn test_raw_request_gets_reply() {
    let server = start_test_server("test_service", TEST_REPLY).await;

    let probe = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    probe
        .send_to(b"test_service", localhost(server.port()))
        .await
        .unwrap();

    let mut buf = [0u8; 1024];
    let (len, _) = timeout(Duration::from_secs(2), probe.recv_from(&mut buf))
        .await
        .expect("no reply within timeout")
        .unwrap();
    assert_eq!(&buf[..len], TEST_REPLY.as_bytes());

    server.shutdown().await;
}

#[tokio::test]
async fn test_one_reply_per_request() {
    let server = start_test_server("test_service", TEST_REPLY).await;

    let probe = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let mut buf = [0u8; 1024];

    for _ in 0..2 {
        probe
            .send_to(b"test_service", localhost(server.port()))
            .await
            .unwrap();
        timeout(Duration::from_secs(2), probe.recv_from(&mut buf))
            .await
            .expect("expected exactly one reply per request")
            .unwrap();
    }

    // No further datagrams arrive once both requests are answered.
    let extra = timeout(Duration::from_millis(300), probe.recv_from(&mut buf)).await;
    assert!(extra.is_err(), "server sent an unsolicited extra reply");

    server.shutdown().await;
}

#[tokio::test]
async fn test_multiple_services_dispatch_independently() {
    let mut server = UdpDiscoveryServer::bind(0).await.unwrap();
    server.add_discoverable(Discoverable::new("service1", || "Reply from service 1".into()));
    server.add_discoverable(Discoverable::new("service2", || "Reply from service 2".into()));
    server.start();

    let probe = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();

    let query = |identifier: &'static [u8]| {
        let probe = &probe;
        let port = server.port();
        async move {
            let mut buf = [0u8; 1024];
            probe.send_to(identifier, localhost(port)).await.unwrap();
            let (len, _) = timeout(Duration::from_secs(2), probe.recv_from(&mut buf))
                .await
                .expect("no reply within timeout")
                .unwrap();
            buf[..len].to_vec()
        }
    };

    // Each identifier resolves to its own reply, not to whichever service
    // was registered last.
    assert_eq!(query(b"service1").await, b"Reply from service 1");
    assert_eq!(query(b"service2").await, b"Reply from service 2");
    assert_eq!(query(b"service1").await, b"Reply from service 1");

    server.shutdown().await;
}

#[tokio::test]
async fn test_unknown_identifier_is_dropped_silently() {
    let server = start_test_server("test_service", TEST_REPLY).await;

    let probe = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    probe
        .send_to(b"unknown_service", localhost(server.port()))
        .await
        .unwrap();

    let mut buf = [0u8; 1024];
    let outcome = timeout(Duration::from_millis(500), probe.recv_from(&mut buf)).await;
    assert!(outcome.is_err(), "unknown identifier must get no reply");

    server.shutdown().await;
}

#[tokio::test]
async fn test_client_server_exchange() {
    let server = start_test_server("database", "127.0.0.1:5432").await;

    let received = Arc::new(Mutex::new(None::<Vec<u8>>));
    let received_clone = received.clone();
    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    let mut done_tx = Some(done_tx);

    let mut client = UdpDiscoveryClient::new(
        "database",
        Duration::from_millis(500),
        server.port(),
        move |reply, _sender| {
            *received_clone.lock().unwrap() = Some(reply.to_vec());
            if let Some(tx) = done_tx.take() {
                let _ = tx.send(());
            }
            true
        },
    );
    client.set_target(localhost(server.port()));
    client.start().await.unwrap();

    timeout(Duration::from_secs(2), done_rx)
        .await
        .expect("handler never invoked")
        .unwrap();
    assert_eq!(
        received.lock().unwrap().as_deref(),
        Some(b"127.0.0.1:5432".as_slice())
    );

    client.shutdown().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_missing_service_never_invokes_handler() {
    let server = start_test_server("database", "127.0.0.1:5432").await;

    let invoked = Arc::new(AtomicU32::new(0));
    let invoked_clone = invoked.clone();

    let mut client = UdpDiscoveryClient::new(
        "missing",
        Duration::from_millis(200),
        server.port(),
        move |_, _| {
            invoked_clone.fetch_add(1, Ordering::SeqCst);
            true
        },
    );
    client.set_target(localhost(server.port()));
    client.start().await.unwrap();

    tokio::time::sleep(Duration::from_millis(1000)).await;
    client.stop();
    client.shutdown().await;

    assert_eq!(invoked.load(Ordering::SeqCst), 0);
    server.shutdown().await;
}

#[tokio::test]
async fn test_client_retry_precedes_server() {
    // Reserve a port for the late server, then release it so only the port
    // number survives.
    let placeholder = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let port = placeholder.local_addr().unwrap().port();
    drop(placeholder);

    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    let mut done_tx = Some(done_tx);

    let mut client = UdpDiscoveryClient::new(
        "database",
        Duration::from_millis(300),
        port,
        move |reply, _sender| {
            assert_eq!(reply, b"127.0.0.1:5432");
            if let Some(tx) = done_tx.take() {
                let _ = tx.send(());
            }
            true
        },
    );
    client.set_target(localhost(port));
    client.start().await.unwrap();

    // The server shows up 800 ms into the exchange; retransmits must find it.
    tokio::time::sleep(Duration::from_millis(800)).await;
    let mut server = UdpDiscoveryServer::bind(port).await.unwrap();
    server.add_discoverable(Discoverable::new("database", || "127.0.0.1:5432".into()));
    server.start();

    timeout(Duration::from_secs(3), done_rx)
        .await
        .expect("retransmits never reached the late server")
        .unwrap();

    client.shutdown().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_accepted_reply_stops_retransmits() {
    let requests_seen = Arc::new(AtomicU32::new(0));
    let requests_clone = requests_seen.clone();

    let mut server = UdpDiscoveryServer::bind(0).await.unwrap();
    server.add_discoverable(Discoverable::new("svc", move || {
        requests_clone.fetch_add(1, Ordering::SeqCst);
        "reply".to_string()
    }));
    server.start();

    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    let mut done_tx = Some(done_tx);
    let mut client = UdpDiscoveryClient::new(
        "svc",
        Duration::from_millis(100),
        server.port(),
        move |_, _| {
            if let Some(tx) = done_tx.take() {
                let _ = tx.send(());
            }
            true
        },
    );
    client.set_target(localhost(server.port()));
    client.start().await.unwrap();

    timeout(Duration::from_secs(2), done_rx)
        .await
        .expect("no reply accepted")
        .unwrap();
    client.shutdown().await;

    // Let any request already on the wire land before sampling.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let after_done = requests_seen.load(Ordering::SeqCst);
    assert!(after_done >= 1);

    // With the exchange finished, the retransmit cadence is gone: the
    // server sees no new requests.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(requests_seen.load(Ordering::SeqCst), after_done);

    server.shutdown().await;
}

#[tokio::test]
async fn test_declined_reply_keeps_listening() {
    let server = start_test_server("svc", "reply").await;

    let invocations = Arc::new(AtomicU32::new(0));
    let invocations_clone = invocations.clone();
    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    let mut done_tx = Some(done_tx);

    let mut client = UdpDiscoveryClient::new(
        "svc",
        Duration::from_millis(150),
        server.port(),
        move |_, _| {
            let n = invocations_clone.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                return false; // decline the first reply, stay subscribed
            }
            if let Some(tx) = done_tx.take() {
                let _ = tx.send(());
            }
            true
        },
    );
    client.set_target(localhost(server.port()));
    client.start().await.unwrap();

    timeout(Duration::from_secs(3), done_rx)
        .await
        .expect("second reply never arrived")
        .unwrap();
    assert!(invocations.load(Ordering::SeqCst) >= 2);

    client.shutdown().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_clients_share_one_server() {
    let server = start_test_server("svc", "reply").await;
    let port = server.port();

    let exchanges = (0..3).map(|_| {
        let target = localhost(port);
        async move {
            let (done_tx, done_rx) = tokio::sync::oneshot::channel();
            let mut done_tx = Some(done_tx);
            let mut client =
                UdpDiscoveryClient::new("svc", Duration::from_millis(200), port, move |_, _| {
                    if let Some(tx) = done_tx.take() {
                        let _ = tx.send(());
                    }
                    true
                });
            client.set_target(target);
            client.start().await.unwrap();
            timeout(Duration::from_secs(2), done_rx).await.unwrap().unwrap();
            client.shutdown().await;
        }
    });
    futures::future::join_all(exchanges).await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_discovering_connects_through_discoverable() {
    let socket = DiscoverableTcpSocket::bind("echo", 0, 0).await.unwrap();
    socket.start();
    let udp_port = socket.udp_port();

    let acceptor = tokio::spawn(async move {
        let (mut stream, _) = socket.accept().await.unwrap();
        let mut buf = [0u8; 16];
        let n = stream.read(&mut buf).await.unwrap();
        stream.write_all(&buf[..n]).await.unwrap();
        socket.shutdown().await;
    });

    let discovering = DiscoveringTcpSocket::new("echo", udp_port)
        .with_retry_interval(Duration::from_millis(200))
        .with_target(localhost(udp_port));

    let mut stream = timeout(Duration::from_secs(3), discovering.connect())
        .await
        .expect("rendezvous timed out")
        .unwrap();

    stream.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");

    acceptor.await.unwrap();
}

#[tokio::test]
async fn test_discovering_rejects_malformed_reply() {
    let mut server = UdpDiscoveryServer::bind(0).await.unwrap();
    server.add_discoverable(Discoverable::new("svc", || "not-a-port".into()));
    server.start();

    let discovering = DiscoveringTcpSocket::new("svc", server.port())
        .with_retry_interval(Duration::from_millis(200))
        .with_target(localhost(server.port()));

    let outcome = timeout(Duration::from_secs(2), discovering.connect())
        .await
        .expect("exchange should complete quickly");
    assert!(matches!(
        outcome,
        Err(lanlink_core::LanlinkError::InvalidDiscoveryReply(_))
    ));

    server.shutdown().await;
}
