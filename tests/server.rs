#![cfg(unix)]

mod common;

use std::net::{SocketAddr, TcpListener};
use std::time::Duration;

use common::{app_state, test_config, write_aged, FakeYtdl};
use tokio::sync::oneshot;
use video_cacher::proxy::ProxyServer;

fn free_addr() -> SocketAddr {
    TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap()
}

async fn wait_until_listening(addr: SocketAddr) {
    for _ in 0..100 {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("server never started on {addr}");
}

#[tokio::test]
async fn serves_getvideo_and_cached_files_over_http() {
    let cache_dir = tempfile::tempdir().unwrap();
    std::fs::write(
        cache_dir.path().join("clip.mp4"),
        (0..100u8).collect::<Vec<_>>(),
    )
    .unwrap();
    write_aged(cache_dir.path(), "_download.mp4", 10, 0);
    let fake = FakeYtdl::resolving_to("https://cdn.test/resolved.mp4");
    let state = app_state(test_config(cache_dir.path()), fake.ytdl()).await;

    let addr = free_addr();
    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        ProxyServer::new(addr, state, 8)
            .run(async {
                let _ = stopped.await;
            })
            .await
    });
    wait_until_listening(addr).await;
    let client = reqwest::Client::new();
    let base = format!("http://{addr}");

    let response = client
        .get(format!("{base}/api/getvideo"))
        .query(&[("url", "https://example.com/page"), ("avpro", "false")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "https://cdn.test/resolved.mp4");

    let response = client.get(format!("{base}/api/getvideo")).send().await.unwrap();
    assert_eq!(response.status(), 400);

    let response = client
        .get(format!("{base}/clip.mp4"))
        .header("Range", "bytes=10-19")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 206);
    assert_eq!(response.headers()["content-range"], "bytes 10-19/100");
    assert_eq!(response.bytes().await.unwrap().to_vec(), (10..20u8).collect::<Vec<_>>());

    let response = client.get(format!("{base}/clip.mp4")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "video/mp4");
    assert_eq!(response.bytes().await.unwrap().len(), 100);

    let response = client
        .get(format!("{base}/clip.mp4"))
        .header("Range", "bytes=500-")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 416);

    for missing in ["missing.mp4", "_download.mp4"] {
        let response = client.get(format!("{base}/{missing}")).send().await.unwrap();
        assert_eq!(response.status(), 404);
    }

    stop.send(()).unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn head_getvideo_has_no_side_effects() {
    let cache_dir = tempfile::tempdir().unwrap();
    let fake = FakeYtdl::resolving_to("https://cdn.test/resolved.mp4");
    let state = app_state(test_config(cache_dir.path()), fake.ytdl()).await;
    let queue = state.queue.clone();

    let addr = free_addr();
    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        ProxyServer::new(addr, state, 8)
            .run(async {
                let _ = stopped.await;
            })
            .await
    });
    wait_until_listening(addr).await;

    let response = reqwest::Client::new()
        .head(format!("http://{addr}/api/getvideo"))
        .query(&[("url", "https://youtu.be/GoSo8YOKSAE")])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 405);
    assert_eq!(response.headers()["allow"], "GET");
    assert!(fake.calls().is_empty());
    assert!(queue.is_empty());

    stop.send(()).unwrap();
    server.await.unwrap().unwrap();
}
