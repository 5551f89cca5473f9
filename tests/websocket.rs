//! End-to-end tests over real WebSocket connections

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use wshub::{Hub, HubConfig, HubServer, ServerConfig};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    hub: Arc<Hub>,
    stop: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<wshub::Result<()>>,
}

impl TestServer {
    async fn start(config: ServerConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = HubServer::new(config.stats_interval(Duration::ZERO));
        let hub = Arc::clone(server.hub());
        let (stop, stopped) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            server
                .serve(listener, async move {
                    let _ = stopped.await;
                })
                .await
        });

        Self {
            addr,
            hub,
            stop: Some(stop),
            task,
        }
    }

    async fn connect(&self, path: &str) -> Client {
        let url = format!("ws://{}{}", self.addr, path);
        let (client, _) = connect_async(url).await.unwrap();
        client
    }

    async fn wait_for_members(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.hub.registry().len().await != count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("registry never reached expected size");
    }

    async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let result = tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("server did not stop")
            .unwrap();
        assert!(result.is_ok());
    }
}

async fn next_text(client: &mut Client) -> String {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for message")
            .expect("stream ended")
            .unwrap();

        match msg {
            Message::Text(text) => return text.as_str().to_string(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected message: {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_chat_broadcast_reaches_every_client() {
    let server = TestServer::start(ServerConfig::default()).await;

    let mut a = server.connect("/ws").await;
    let mut b = server.connect("/ws").await;
    let mut c = server.connect("/ws").await;
    server.wait_for_members(3).await;

    a.send(Message::text("hello")).await.unwrap();

    assert_eq!(next_text(&mut a).await, "hello");
    assert_eq!(next_text(&mut b).await, "hello");
    assert_eq!(next_text(&mut c).await, "hello");

    b.send(Message::text("one")).await.unwrap();
    b.send(Message::text("two")).await.unwrap();

    for client in [&mut a, &mut b, &mut c] {
        assert_eq!(next_text(client).await, "one");
        assert_eq!(next_text(client).await, "two");
    }

    server.stop().await;
}

#[tokio::test]
async fn test_disconnected_client_leaves_registry() {
    let server = TestServer::start(ServerConfig::default()).await;

    let a = server.connect("/ws").await;
    let mut b = server.connect("/ws").await;
    server.wait_for_members(2).await;

    drop(a);
    server.wait_for_members(1).await;

    b.send(Message::text("still here")).await.unwrap();
    assert_eq!(next_text(&mut b).await, "still here");

    server.stop().await;
}

#[tokio::test]
async fn test_feed_ticks_until_budget() {
    let hub = HubConfig::default()
        .feed_interval(Duration::from_millis(100))
        .feed_budget(Duration::from_millis(350));
    let server = TestServer::start(ServerConfig::default().hub(hub)).await;

    let mut feed = server.connect("/ws/subscribe/order-book").await;

    let mut received = Vec::new();
    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(msg) = feed.next().await {
            match msg {
                Ok(Message::Text(text)) => received.push(text.as_str().to_string()),
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    })
    .await;

    assert!(drained.is_ok(), "feed was never closed");
    assert_eq!(received, vec!["Order ready"; 3]);
    assert!(server.hub.registry().is_empty().await);

    server.stop().await;
}

#[tokio::test]
async fn test_feed_and_chat_are_separate() {
    let server = TestServer::start(ServerConfig::default()).await;

    let mut chat = server.connect("/ws").await;
    let mut feed = server.connect("/ws/subscribe/order-book").await;
    server.wait_for_members(1).await;

    chat.send(Message::text("chat only")).await.unwrap();
    assert_eq!(next_text(&mut chat).await, "chat only");

    let nothing = tokio::time::timeout(Duration::from_millis(200), feed.next()).await;
    assert!(nothing.is_err(), "feed client received chat traffic");

    server.stop().await;
}

#[tokio::test]
async fn test_health_route() {
    let server = TestServer::start(ServerConfig::default()).await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
    assert!(response.ends_with("ok"), "{}", response);

    server.stop().await;
}

#[tokio::test]
async fn test_stop_closes_open_connections() {
    let server = TestServer::start(ServerConfig::default()).await;

    let mut chat = server.connect("/ws").await;
    server.wait_for_members(1).await;

    let hub = Arc::clone(&server.hub);
    server.stop().await;

    assert!(hub.is_shutdown());

    let ended = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match chat.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(ended.is_ok());

    tokio::time::timeout(Duration::from_secs(5), async {
        while !hub.registry().is_empty().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("chat connection was never deregistered");
}
