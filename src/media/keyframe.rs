//! Keyframe requests sent upstream to publishers

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::transport::{RtcpPacket, Transport, TransportError};

/// Send one PLI for each video SSRC, stopping at the first failure
pub async fn request_keyframes(
    transport: &dyn Transport,
    ssrcs: &[u32],
) -> Result<(), TransportError> {
    for &ssrc in ssrcs {
        transport.write_rtcp(&[RtcpPacket::pli(ssrc)]).await?;
    }
    Ok(())
}

/// Periodically ask the publisher of a video track for a keyframe
///
/// The first request goes out one `period` after spawning. The task stops
/// on its first write failure; the relay loop aborts it when it exits.
pub fn spawn_heartbeat(
    transport: Arc<dyn Transport>,
    ssrc: u32,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            ticker.tick().await;
            if let Err(e) = transport.write_rtcp(&[RtcpPacket::pli(ssrc)]).await {
                tracing::debug!(ssrc = ssrc, error = %e, "Keyframe heartbeat stopped");
                return;
            }
        }
    })
}

/// Ask a publisher for keyframes once, after `delay`
pub fn spawn_delayed_request(
    transport: Arc<dyn Transport>,
    ssrcs: Vec<u32>,
    delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Err(e) = request_keyframes(transport.as_ref(), &ssrcs).await {
            tracing::debug!(error = %e, "Delayed keyframe request failed");
        }
    })
}
