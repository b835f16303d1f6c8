use bytes::Bytes;
use cache_node::{CacheNodeClient, serve};
use gramcache::ports::CacheBackend;
use shared::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};
use storage_engine::MokaBackend;
use tokio::net::TcpListener;

async fn start_node() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(serve(listener, Arc::new(MokaBackend::new_unbounded())));
    addr
}

#[tokio::test]
async fn test_client_round_trips_every_command() {
    let addr = start_node().await;
    let client = CacheNodeClient::new(addr, Duration::from_secs(2));

    client.ping().await.unwrap();

    client.set("user:1", Bytes::from("alice")).await.unwrap();
    client.set("user:3", Bytes::from("carol")).await.unwrap();
    assert_eq!(
        client.get("user:1").await.unwrap(),
        Some(Bytes::from("alice"))
    );
    assert_eq!(client.get("user:2").await.unwrap(), None);

    let keys = vec![
        "user:1".to_string(),
        "user:2".to_string(),
        "user:3".to_string(),
    ];
    let found = client.get_multi(&keys).await.unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found.get("user:3"), Some(&Bytes::from("carol")));

    assert!(!client
        .compare_and_set("user:3", b"stale", Bytes::from("x"))
        .await
        .unwrap());
    assert!(client
        .compare_and_set("user:3", b"carol", Bytes::from("carol2"))
        .await
        .unwrap());
    assert_eq!(
        client.get("user:3").await.unwrap(),
        Some(Bytes::from("carol2"))
    );

    assert!(client.delete("user:1").await.unwrap());
    assert!(!client.delete("user:1").await.unwrap());

    client.delete_all().await.unwrap();
    assert_eq!(client.get("user:3").await.unwrap(), None);
}

#[tokio::test]
async fn test_empty_get_multi_needs_no_node() {
    // Nothing listens here; an empty batch must not dial.
    let client = CacheNodeClient::new("127.0.0.1:1", Duration::from_millis(100));
    assert!(client.get_multi(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_silent_node_times_out_as_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        // Accept and hold the socket without ever replying.
        let (_socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let client = CacheNodeClient::new(addr, Duration::from_millis(100));
    let err = client.get("indexPosts").await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_client_reconnects_after_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = CacheNodeClient::new(addr.to_string(), Duration::from_millis(500));
    assert!(client.ping().await.unwrap_err().is_transport());

    // Bring a node up on the same address and retry with the same client.
    let listener = TcpListener::bind(addr).await.unwrap();
    tokio::spawn(serve(listener, Arc::new(MokaBackend::new_unbounded())));
    client.ping().await.unwrap();
}

#[tokio::test]
async fn test_queued_callers_each_get_their_own_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let call_timeout = Duration::from_millis(200);
    let client = Arc::new(CacheNodeClient::new(addr, call_timeout));

    let mut tasks = Vec::new();
    for i in 0..4 {
        let client = Arc::clone(&client);
        tasks.push(tokio::spawn(async move {
            let started = Instant::now();
            let result = client.get(&format!("user:{}", i)).await;
            (result, started.elapsed())
        }));
    }

    for task in tasks {
        let (result, elapsed) = task.await.unwrap();
        assert!(result.unwrap_err().is_transport());
        // Serialized timeouts would stack to roughly 4x the bound.
        assert!(elapsed < call_timeout * 2, "call took {:?}", elapsed);
    }
}
