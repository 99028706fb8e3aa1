//! RTCP feedback aggregation
//!
//! Each subscriber sends feedback about the tracks it receives. Keyframe
//! requests are forwarded to the publisher, at most one PLI and one FIR per
//! batch of packets received together; a fresh batch starts fresh. Bitrate
//! estimates and loss figures are tracked for reporting only.

use std::sync::Arc;

use crate::session::ResourceId;
use crate::transport::{FeedbackReader, RtcpPacket, Transport};

/// Worst conditions reported by a downstream consumer so far
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedbackState {
    /// Lowest receiver bitrate estimate seen (bits/sec)
    pub min_bitrate: Option<u64>,
    /// Highest fraction lost seen (256ths)
    pub max_fraction_lost: Option<u8>,
}

impl FeedbackState {
    /// Record a bitrate estimate; true if it is a new minimum
    pub fn observe_bitrate(&mut self, bitrate: u64) -> bool {
        match self.min_bitrate {
            Some(min) if min <= bitrate => false,
            _ => {
                self.min_bitrate = Some(bitrate);
                true
            }
        }
    }

    /// Record a loss fraction; true if it is a new maximum
    pub fn observe_fraction_lost(&mut self, fraction_lost: u8) -> bool {
        match self.max_fraction_lost {
            Some(max) if max >= fraction_lost => false,
            _ => {
                self.max_fraction_lost = Some(fraction_lost);
                true
            }
        }
    }
}

/// Aggregates feedback for one downstream-to-upstream link
#[derive(Debug)]
pub struct FeedbackAggregator {
    upstream_ssrc: u32,
    state: FeedbackState,
    forwarded: u64,
}

impl FeedbackAggregator {
    /// Create an aggregator forwarding requests for `upstream_ssrc`
    pub fn new(upstream_ssrc: u32) -> Self {
        Self {
            upstream_ssrc,
            state: FeedbackState::default(),
            forwarded: 0,
        }
    }

    /// Process one batch, returning the packets to forward upstream
    ///
    /// Forwarded keyframe requests are retargeted at the publisher's SSRC.
    pub fn process_batch(&mut self, batch: &[RtcpPacket]) -> Vec<RtcpPacket> {
        let mut forward = Vec::new();
        let mut pli_sent = false;
        let mut fir_sent = false;

        for packet in batch {
            match packet {
                RtcpPacket::PictureLossIndication { .. } => {
                    if !pli_sent {
                        forward.push(packet.retarget(self.upstream_ssrc));
                        pli_sent = true;
                    }
                }
                RtcpPacket::FullIntraRequest { .. } => {
                    if !fir_sent {
                        forward.push(packet.retarget(self.upstream_ssrc));
                        fir_sent = true;
                    }
                }
                RtcpPacket::ReceiverEstimatedMaximumBitrate { bitrate } => {
                    if self.state.observe_bitrate(*bitrate) {
                        tracing::debug!(
                            ssrc = self.upstream_ssrc,
                            bitrate = *bitrate,
                            "New minimum receiver bitrate estimate"
                        );
                    }
                }
                RtcpPacket::ReceiverReport { fraction_lost } => {
                    for &fraction in fraction_lost {
                        if self.state.observe_fraction_lost(fraction) {
                            tracing::debug!(
                                ssrc = self.upstream_ssrc,
                                fraction_lost = fraction,
                                "New maximum fraction lost"
                            );
                        }
                    }
                }
                RtcpPacket::TransportLayerNack | RtcpPacket::Other => {}
            }
        }

        self.forwarded += forward.len() as u64;
        forward
    }

    /// Conditions observed so far
    pub fn state(&self) -> &FeedbackState {
        &self.state
    }

    /// Total packets forwarded upstream
    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }
}

/// Pump feedback from a subscriber's sender to the publisher
///
/// Runs until reading fails, which happens when the subscriber's transport
/// closes. A failed upstream write is logged and does not stop the pump:
/// the engine needs the feedback drained either way.
pub async fn run_feedback_link(
    mut reader: Box<dyn FeedbackReader>,
    upstream: Arc<dyn Transport>,
    upstream_ssrc: u32,
    subscriber: ResourceId,
) -> FeedbackAggregator {
    let mut aggregator = FeedbackAggregator::new(upstream_ssrc);

    loop {
        let batch = match reader.read_batch().await {
            Ok(batch) => batch,
            Err(e) => {
                tracing::debug!(
                    resource_id = %subscriber,
                    ssrc = upstream_ssrc,
                    forwarded = aggregator.forwarded(),
                    min_bitrate = ?aggregator.state().min_bitrate,
                    max_fraction_lost = ?aggregator.state().max_fraction_lost,
                    error = %e,
                    "Feedback link closed"
                );
                break;
            }
        };

        let forward = aggregator.process_batch(&batch);
        if forward.is_empty() {
            continue;
        }

        if let Err(e) = upstream.write_rtcp(&forward).await {
            tracing::debug!(
                resource_id = %subscriber,
                ssrc = upstream_ssrc,
                error = %e,
                "Failed to forward feedback upstream"
            );
        }
    }

    aggregator
}
