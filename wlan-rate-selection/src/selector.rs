// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The rate-selector capability. One selector implementation is chosen at
//! configuration time and serves every peer; per-peer state lives in an
//! arena owned by the selector, with the registry holding only opaque
//! handles.

use {
    crate::peer::PeerCapabilities,
    std::fmt,
    wlan_common::{
        ie::SupportedRate,
        mac::{format_addr, MacAddr},
        phy::Cbw,
        tx_vector::TxVector,
    },
};

/// Opaque ticket for one peer's selector-owned state. Valid until the
/// selector is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerHandle(pub(crate) usize);

impl PeerHandle {
    pub(crate) fn index(&self) -> usize {
        self.0
    }
}

/// A rate adaptation algorithm. All methods are synchronous; outcome
/// callbacks must not fail. Implementations learn about a peer exclusively
/// through these callbacks, which the registry guarantees to deliver in
/// transmission order.
pub trait RateSelector {
    /// Allocates algorithm state for a new peer.
    fn create_peer_state(&mut self, peer: &PeerCapabilities) -> PeerHandle;

    /// Drops all peer state. Handles issued earlier become invalid.
    fn reset(&mut self);

    /// Picks the transmit vector for a unicast data frame. The returned
    /// vector must not exceed `allowed_width`, and any guard-interval,
    /// width or stream choice outside the peer's validated capability is an
    /// internal consistency violation that aborts rather than degrades.
    fn data_tx_vector(
        &mut self,
        peer: &PeerCapabilities,
        handle: PeerHandle,
        allowed_width: Cbw,
    ) -> TxVector;

    /// Picks the vector for an RTS toward this peer: the highest rate in
    /// `basic_rates` not exceeding the non-HT reference rate of the last
    /// data rate used, falling back to a scan of the local mode list.
    fn rts_tx_vector(
        &mut self,
        peer: &PeerCapabilities,
        handle: PeerHandle,
        basic_rates: &[SupportedRate],
    ) -> TxVector;

    fn report_rts_failed(&mut self, peer: &PeerCapabilities, handle: PeerHandle);

    fn report_rts_ok(&mut self, peer: &PeerCapabilities, handle: PeerHandle, cts_snr: f64);

    fn report_data_failed(&mut self, peer: &PeerCapabilities, handle: PeerHandle);

    fn report_data_ok(
        &mut self,
        peer: &PeerCapabilities,
        handle: PeerHandle,
        ack_snr: f64,
        data_snr: f64,
        cbw: Cbw,
        nss: u8,
    );

    /// The RTS exchange for a frame gave up; the frame is dropped.
    fn report_final_rts_failed(&mut self, peer: &PeerCapabilities, handle: PeerHandle);

    /// The frame exhausted its retries and is dropped.
    fn report_final_data_failed(&mut self, peer: &PeerCapabilities, handle: PeerHandle);

    /// Reports the block-ack outcome of one A-MPDU. `n_success == 0` means
    /// the acknowledgment itself was missed, which is handled as a single
    /// failed attempt of the whole aggregate rather than per-MPDU loss.
    fn report_ampdu_status(
        &mut self,
        peer: &PeerCapabilities,
        handle: PeerHandle,
        n_success: u16,
        n_failed: u16,
        data_snr: f64,
        vector_used: &TxVector,
    );

    /// Protocol-decision hooks. `normally` carries the registry's default
    /// answer; selectors override only when the algorithm has an opinion.
    fn needs_rts(&mut self, _handle: PeerHandle, normally: bool) -> bool {
        normally
    }

    fn needs_fragmentation(&mut self, _handle: PeerHandle, normally: bool) -> bool {
        normally
    }

    fn needs_retransmission(&mut self, _handle: PeerHandle, normally: bool) -> bool {
        normally
    }

    /// Re-seeds the selector's random streams for reproducible runs.
    /// Returns how many streams were consumed.
    fn assign_streams(&mut self, _seed: u64) -> usize {
        0
    }

    /// Writes the per-peer statistics table, if the selector keeps one.
    fn write_stats(
        &self,
        _peer: &PeerCapabilities,
        _handle: PeerHandle,
        _out: &mut dyn fmt::Write,
    ) -> fmt::Result {
        Ok(())
    }
}

/// Control-response rate selection shared by the selectors: the highest
/// BSS-basic rate not exceeding the non-HT reference rate of the last data
/// vector, falling back to a scan of the full local mode list
/// (IEEE Std 802.11-2016, 9.7.6.5).
pub(crate) fn select_rts_rate(
    last_data: &TxVector,
    basic_rates: &[SupportedRate],
    local_rates: &[SupportedRate],
    peer_addr: &MacAddr,
) -> TxVector {
    let reference = last_data.non_ht_reference_rate().rate();
    let pick = |rates: &[SupportedRate]| {
        rates.iter().filter(|r| r.rate() <= reference).max_by_key(|r| r.rate()).copied()
    };
    let rate = pick(basic_rates).or_else(|| pick(local_rates)).unwrap_or_else(|| {
        panic!(
            "no control rate at or below the {} * 0.5 Mbps reference for peer {}",
            reference,
            format_addr(peer_addr)
        )
    });
    // Both rate lists contain only validated legacy rates.
    TxVector::from_supported_rate(&rate).expect("control rates are valid legacy rates")
}
