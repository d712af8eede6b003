//! OOS Integration Tests
//!
//! Out-of-service tracking driven through a live network: a provider serves
//! `oos.getList` over a real socket, the network discovers it through the
//! name service and mirrors its list into `is_oos`.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use mbus_common::protocol::Response;
use mbus_common::transport::{BinCodec, FrameLimits, RpcServer};

use mbus_net::oos::{OosListReturn, OOS_LIST_METHOD};
use mbus_net::{Identity, LocalMirror, NameServiceRegister, Network, NetworkParams};

/// Serves `oos.getList` from a shared (generation, list) cell.
async fn start_provider(list: Arc<Mutex<(u32, Vec<String>)>>) -> String {
    let server = Arc::new(
        RpcServer::bind("127.0.0.1:0", FrameLimits::default())
            .await
            .unwrap(),
    );
    let spec = server.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        server
            .run_with_handler(move |request, sender| {
                assert_eq!(request.method, OOS_LIST_METHOD);
                let (generation, services) = list.lock().unwrap().clone();
                let ret = OosListReturn {
                    generation,
                    services,
                };
                sender.send(Response::success(request.id, BinCodec::encode(&ret).unwrap()));
            })
            .await
            .unwrap();
    });
    spec
}

fn oos_network(mirror: &Arc<LocalMirror>) -> Arc<Network> {
    let mut params = NetworkParams::new(Identity::new("127.0.0.1", ""));
    params.oos_pattern = "oos/*".to_string();
    Network::new(params, mirror.clone(), mirror.clone())
}

async fn wait_for<F: Fn() -> bool>(what: &str, check: F) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn test_oos_list_tracks_provider_through_network() {
    let mirror = Arc::new(LocalMirror::new());
    let list = Arc::new(Mutex::new((1u32, vec!["search/a".to_string()])));
    let spec = start_provider(Arc::clone(&list)).await;
    mirror.register("oos/p1", &spec);

    let net = oos_network(&mirror);
    net.start().await.unwrap();

    wait_for("initial oos list", || net.is_oos("search/a")).await;
    assert!(!net.is_oos("search/b"));
    assert!(net.wait_until_ready(Duration::from_secs(10)).await);

    // A new generation replaces the published set.
    *list.lock().unwrap() = (2, vec!["search/b".to_string()]);
    wait_for("updated oos list", || net.is_oos("search/b")).await;
    assert!(!net.is_oos("search/a"));

    // Withdrawing the provider withdraws its list.
    mirror.unregister("oos/p1");
    wait_for("withdrawn oos list", || !net.is_oos("search/b")).await;

    net.shutdown().await;
    assert!(!net.is_oos("search/a"));
}

#[tokio::test]
async fn test_ready_waits_for_first_list() {
    let mirror = Arc::new(LocalMirror::new());
    // Listens but never answers, so the tracker cannot finish its first poll.
    let server = Arc::new(
        RpcServer::bind("127.0.0.1:0", FrameLimits::default())
            .await
            .unwrap(),
    );
    let spec = server.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        server
            .run_with_handler(move |_request, _sender| {})
            .await
            .unwrap();
    });
    mirror.register("oos/mute", &spec);

    let net = oos_network(&mirror);
    net.start().await.unwrap();

    assert!(!net.wait_until_ready(Duration::from_millis(500)).await);
    net.shutdown().await;
}
