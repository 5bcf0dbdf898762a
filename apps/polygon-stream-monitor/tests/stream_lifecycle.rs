//! Stream lifecycle integration tests.
//!
//! Runs a scripted local WebSocket server speaking the upstream protocol
//! (status handshake, auth, subscribe, aggregate frames) and drives the
//! real supervisor/worker/store pipeline against it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use polygon_stream_monitor::infrastructure::config::{
    ConnectionSettings, Credential, DetectorSettings, MonitorConfig, StorageSettings,
    SupervisorSettings,
};
use polygon_stream_monitor::{
    AssetClass, Entitlements, MarketStore, StreamSupervisor, SubscriptionTier, TradingWindow,
};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// Base bar timestamp (epoch millis); bars step one minute apart.
const BASE_TS: i64 = 1_700_000_000_000;

fn test_config(endpoint: String, db_path: PathBuf) -> Arc<MonitorConfig> {
    let tiers = [(AssetClass::Crypto, SubscriptionTier::Delayed)]
        .into_iter()
        .collect();
    let overrides = [(AssetClass::Crypto, endpoint)].into_iter().collect();

    Arc::new(MonitorConfig {
        credential: Credential::new("integration-test-key").unwrap(),
        entitlements: Entitlements::new(tiers, overrides),
        symbols: std::collections::HashMap::new(),
        detector: DetectorSettings::default(),
        connection: ConnectionSettings {
            connect_timeout: Duration::from_secs(5),
        },
        supervisor: SupervisorSettings {
            health_interval: Duration::from_millis(200),
            shutdown_timeout: Duration::from_secs(5),
            trading_window: TradingWindow::default(),
        },
        storage: StorageSettings {
            db_path,
            retention_days: 7,
        },
    })
}

fn aggregate_frame(index: i64, volume: f64) -> String {
    let start = BASE_TS + index * 60_000;
    format!(
        r#"[{{"ev":"XA","pair":"BTC-USD","o":42000.0,"h":42100.0,"l":41900.0,"c":42050.0,"v":{volume},"vw":42010.0,"s":{start},"e":{}}}]"#,
        start + 60_000
    )
}

/// Drive one scripted upstream session: handshake, auth, subscribe, then
/// the given bars. Holds the connection open afterwards when `hold` is set,
/// otherwise closes it server-side.
async fn run_session(stream: TcpStream, bars: Vec<(i64, f64)>, hold: bool) {
    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

    ws.send(Message::Text(
        r#"[{"ev":"status","status":"connected","message":"Connected Successfully"}]"#.into(),
    ))
    .await
    .unwrap();

    // Authentication request.
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                if text.contains(r#""action":"auth""#) {
                    assert!(text.contains("integration-test-key"));
                    break;
                }
            }
            Some(Ok(_)) => {}
            _ => return,
        }
    }
    ws.send(Message::Text(
        r#"[{"ev":"status","status":"auth_success","message":"authenticated"}]"#.into(),
    ))
    .await
    .unwrap();

    // Subscription request carrying the built channel tokens.
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                if text.contains(r#""action":"subscribe""#) {
                    assert!(text.contains("XA.BTC-USD"));
                    break;
                }
            }
            Some(Ok(_)) => {}
            _ => return,
        }
    }
    ws.send(Message::Text(
        r#"[{"ev":"status","status":"success","message":"subscribed to: XA.BTC-USD"}]"#.into(),
    ))
    .await
    .unwrap();

    for (index, volume) in bars {
        ws.send(Message::Text(aggregate_frame(index, volume).into()))
            .await
            .unwrap();
    }

    if hold {
        // Keep the socket open; answer pings until the client goes away.
        while let Some(frame) = ws.next().await {
            match frame {
                Ok(Message::Ping(payload)) => {
                    let _ = ws.send(Message::Pong(payload)).await;
                }
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    } else {
        let _ = ws.close(None).await;
    }
}

/// Poll until `check` passes or the deadline lapses.
async fn wait_until<F: Fn() -> bool>(what: &str, deadline: Duration, check: F) {
    let started = std::time::Instant::now();
    loop {
        if check() {
            return;
        }
        assert!(
            started.elapsed() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn streams_ticks_and_anomalies_into_the_store() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("ws://{}", listener.local_addr().unwrap());
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("streaming.db");

    // Five flat bars then a 4x spike: past the crypto threshold.
    let bars: Vec<(i64, f64)> = vec![
        (0, 100.0),
        (1, 100.0),
        (2, 100.0),
        (3, 100.0),
        (4, 100.0),
        (5, 400.0),
    ];
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        run_session(stream, bars, true).await;
    });

    let config = test_config(endpoint, db_path.clone());
    let mut supervisor = StreamSupervisor::new(Arc::clone(&config));
    supervisor.start(AssetClass::Crypto, vec!["BTC-USD".to_string()]);

    let cancel = CancellationToken::new();
    let supervisor_task = tokio::spawn(supervisor.run(cancel.clone()));

    let reader = MarketStore::open(&db_path).unwrap();
    wait_until("all six ticks to land", Duration::from_secs(10), || {
        reader.stats().map(|s| s.tick_count).unwrap_or(0) >= 6
    })
    .await;
    wait_until("the volume spike to land", Duration::from_secs(10), || {
        reader.stats().map(|s| s.anomaly_count).unwrap_or(0) >= 1
    })
    .await;

    let anomalies = reader
        .recent_anomalies(chrono::Utc::now() - chrono::Duration::hours(1))
        .unwrap();
    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0].symbol, "BTC-USD");
    assert_eq!(anomalies[0].anomaly_type, "volume_spike");
    assert_eq!(anomalies[0].status, "detected");
    assert!((anomalies[0].multiplier - 4.0).abs() < 1e-9);

    let ticks = reader
        .recent_ticks(Some("BTC-USD"), Some(AssetClass::Crypto), chrono::DateTime::UNIX_EPOCH)
        .unwrap();
    assert_eq!(ticks.len(), 6);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(10), supervisor_task)
        .await
        .unwrap()
        .unwrap();
    server.abort();
}

#[tokio::test]
async fn supervisor_restarts_a_worker_after_upstream_close() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("ws://{}", listener.local_addr().unwrap());
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("streaming.db");

    let server = tokio::spawn(async move {
        // First session delivers one bar, then drops the transport.
        let (stream, _) = listener.accept().await.unwrap();
        run_session(stream, vec![(0, 100.0)], false).await;

        // The health loop must come back for a fresh session.
        let (stream, _) = listener.accept().await.unwrap();
        run_session(stream, vec![(1, 110.0)], true).await;
    });

    let config = test_config(endpoint, db_path.clone());
    let mut supervisor = StreamSupervisor::new(Arc::clone(&config));
    supervisor.start(AssetClass::Crypto, vec!["BTC-USD".to_string()]);

    let cancel = CancellationToken::new();
    let supervisor_task = tokio::spawn(supervisor.run(cancel.clone()));

    let reader = MarketStore::open(&db_path).unwrap();
    wait_until("the first session's tick", Duration::from_secs(10), || {
        reader.stats().map(|s| s.tick_count).unwrap_or(0) >= 1
    })
    .await;

    // The second tick can only arrive through a restarted worker.
    wait_until("a tick from the restarted worker", Duration::from_secs(10), || {
        reader.stats().map(|s| s.tick_count).unwrap_or(0) >= 2
    })
    .await;

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(10), supervisor_task)
        .await
        .unwrap()
        .unwrap();
    server.abort();
}
