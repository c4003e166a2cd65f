pub mod client;
pub use self::client::{MockTransport, PartOutcome, TestClient};

use s3_multipart_transfer::{TransferDatabase, TransferUpdate, TransferUpdateReceiver};
use std::str::FromStr;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

pub static TRACER: LazyLock<()> = LazyLock::new(|| {
    let level = std::env::var("LOG_LEVEL")
        .map(|l| tracing::Level::from_str(l.as_str()).unwrap())
        .unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init()
});

/// A fresh transfer database in a temp directory, kept alive by the guard.
pub async fn new_database() -> (tempfile::TempDir, Arc<TransferDatabase>) {
    let dir = tempfile::tempdir().unwrap();
    let db = TransferDatabase::open(dir.path()).await.unwrap();
    (dir, Arc::new(db))
}

/// Poll `cond` until it holds, panicking after five seconds.
pub async fn wait_for<F: Fn() -> bool>(what: &str, cond: F) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}

/// Receive the next update, panicking after five seconds.
pub async fn next_update(rx: &mut TransferUpdateReceiver) -> TransferUpdate {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a transfer update")
        .expect("update channel closed")
}

/// Drain updates until a terminal one arrives, returning it and the number
/// of progress updates seen on the way.
pub async fn next_terminal_update(rx: &mut TransferUpdateReceiver) -> (TransferUpdate, usize) {
    let mut progress = 0;
    loop {
        match next_update(rx).await {
            TransferUpdate::Progress { .. } => progress += 1,
            TransferUpdate::Initiated { .. } => {}
            terminal => return (terminal, progress),
        }
    }
}
