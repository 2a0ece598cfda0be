use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout, Instant};

use lib_link::{Destination, SessionSupervisor, Settings};

#[tokio::main]
/// # Link Lifecycle Integration Test
///
/// Runs the real supervisor against a live loopback peer and verifies:
/// 1.  A validated payload sent by the peer reaches the payload channel.
/// 2.  A silent connection receives steady heartbeats and is never torn
///     down.
/// 3.  When the peer closes the connection, the keeper reconnects on its
///     own (a second accept on the listener).
/// 4.  A shutdown broadcast stops the supervisor promptly.
async fn main() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
    let dest = Destination {
        host: "127.0.0.1".to_string(),
        port: listener.local_addr().unwrap().port(),
    };

    let accepts = Arc::new(AtomicU32::new(0));
    let pings = Arc::new(AtomicU32::new(0));

    // Peer behavior: the first connection gets one valid payload, is read
    // for heartbeats, and is closed by the peer after 600ms. Later
    // connections are held open and silent.
    let accepts_srv = Arc::clone(&accepts);
    let pings_srv = Arc::clone(&pings);
    tokio::spawn(async move {
        let mut held = Vec::new();
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let n = accepts_srv.fetch_add(1, Ordering::SeqCst) + 1;
            if n == 1 {
                let pings = Arc::clone(&pings_srv);
                tokio::spawn(async move {
                    stream
                        .write_all(b"LNK:first-payload")
                        .await
                        .expect("peer write");
                    let deadline = Instant::now() + Duration::from_millis(600);
                    let mut buf = [0u8; 64];
                    loop {
                        let remaining = deadline.saturating_duration_since(Instant::now());
                        if remaining.is_zero() {
                            break;
                        }
                        match timeout(remaining, stream.read(&mut buf)).await {
                            Ok(Ok(0)) | Ok(Err(_)) | Err(_) => break,
                            Ok(Ok(read)) => {
                                let newlines =
                                    buf[..read].iter().filter(|&&b| b == b'\n').count() as u32;
                                pings.fetch_add(newlines, Ordering::SeqCst);
                            }
                        }
                    }
                    // Peer-initiated close; the keeper must recover
                    drop(stream);
                });
            } else {
                held.push(stream);
            }
        }
    });

    let settings = Settings {
        destinations: vec![dest.clone()],
        pool_size: 1,
        heartbeat_interval: Duration::from_millis(100),
        socket_timeout: Duration::from_millis(300),
        max_retries: 2,
        cooldown: Duration::from_millis(100),
        status_interval: Duration::from_secs(60),
        payload_header: b"LNK:".to_vec(),
        payload_min_length: 4,
        log_dir: PathBuf::from("./logs"),
        log_level: "info".to_string(),
    };

    let (supervisor, mut payload_rx) = SessionSupervisor::new(&settings);
    let registry = supervisor.registry();
    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let running = tokio::spawn(supervisor.run(shutdown_tx.clone()));

    // 1. The valid payload flows through validation to the channel
    let payload = timeout(Duration::from_secs(2), payload_rx.recv())
        .await
        .expect("payload must arrive within two seconds")
        .expect("payload channel open");
    assert_eq!(payload.destination, dest);
    assert_eq!(payload.bytes, b"LNK:first-payload".to_vec());
    println!("payload delivery: OK");

    // 2. Heartbeats tick on the silent link, with no reconnection yet
    sleep(Duration::from_millis(450)).await;
    let beat_count = pings.load(Ordering::SeqCst);
    assert!(
        beat_count >= 2,
        "expected heartbeats on the silent link, got {beat_count}"
    );
    assert_eq!(accepts.load(Ordering::SeqCst), 1);
    println!("heartbeat cadence: OK ({beat_count} beats)");

    // 3. After the peer-initiated close, the keeper reconnects on its own
    let reconnect_deadline = Instant::now() + Duration::from_secs(3);
    while accepts.load(Ordering::SeqCst) < 2 {
        assert!(
            Instant::now() < reconnect_deadline,
            "keeper did not reconnect after the peer closed"
        );
        sleep(Duration::from_millis(20)).await;
    }
    let status = registry.status(&dest).expect("destination tracked");
    assert!(status.reconnects >= 1, "failure cycle must be recorded");
    println!("reconnection after peer close: OK");

    // 4. Shutdown stops every task promptly
    shutdown_tx.send(()).expect("shutdown broadcast");
    timeout(Duration::from_secs(2), running)
        .await
        .expect("supervisor must stop promptly on shutdown")
        .expect("supervisor task join");
    println!("shutdown: OK");

    println!("test_link_lifecycle: all checks passed");
}
