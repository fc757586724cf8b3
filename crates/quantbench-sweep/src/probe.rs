use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::Instant;

/// Fixed pause between connection attempts, also the per-attempt
/// connect timeout.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Poll `localhost:port` until a TCP connection succeeds or `timeout`
/// elapses. Connection refusal and connect timeout both mean "not
/// ready yet"; the probe cannot tell a slow-loading server from a
/// crashed one and waits out the full timeout either way.
pub async fn wait_ready(port: u16, timeout: Duration) -> bool {
    wait_ready_with_interval(port, timeout, POLL_INTERVAL).await
}

async fn wait_ready_with_interval(port: u16, timeout: Duration, interval: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        match tokio::time::timeout(interval, TcpStream::connect(("127.0.0.1", port))).await {
            Ok(Ok(_)) => return true,
            // Refused: the attempt returned immediately, pace the loop.
            Ok(Err(_)) => tokio::time::sleep(interval).await,
            // The attempt itself consumed the interval.
            Err(_) => {}
        }
    }
    false
}
