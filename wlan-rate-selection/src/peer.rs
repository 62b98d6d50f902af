// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Per-peer capability snapshot owned by the station registry.

use {
    crate::frame_error::FrameErrorTracker,
    wlan_common::{
        ie::{HeCapabilities, HtCapabilities, SupportedRate, VhtCapabilities},
        mac::MacAddr,
        phy::{Cbw, GuardInterval},
        signal::EwmaSnr,
    },
};

/// Association bookkeeping for a peer, driven by the MAC's management
/// exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssocState {
    /// Freshly created record; nothing is known about the peer yet.
    BrandNew,
    Disassociated,
    /// An association response was queued and awaits its TX report.
    WaitAssocTxOk,
    GotAssocTxOk,
}

/// Everything the registry knows about one peer: advertised capabilities,
/// the derived transmission ceilings, association state, and the running
/// link-quality estimates. Created lazily on first lookup, mutated only by
/// the capability recording handlers, dropped only on registry reset.
#[derive(Debug, Clone)]
pub struct PeerCapabilities {
    pub addr: MacAddr,
    pub assoc_state: AssocState,
    pub qos: bool,
    pub short_preamble: bool,
    pub short_slot_time: bool,
    /// Usable legacy modes: the local mode list intersected with the peer's
    /// advertised rate set, ascending.
    pub rates: Vec<SupportedRate>,
    pub ht: Option<HtCapabilities>,
    pub vht: Option<VhtCapabilities>,
    pub he: Option<HeCapabilities>,
    /// Widest channel usable toward this peer, already clamped to the local
    /// operating width.
    pub cbw: Cbw,
    /// Short (400 ns) guard interval usable for HT/VHT transmissions.
    pub sgi: bool,
    /// Shortest HE guard interval usable toward this peer.
    pub he_gi: GuardInterval,
    /// Spatial stream ceiling, already clamped to the local transmit chains.
    pub streams: u8,
    pub error_tracker: FrameErrorTracker,
    pub ewma_snr: Option<EwmaSnr>,
}

impl PeerCapabilities {
    pub fn new(addr: MacAddr) -> Self {
        Self {
            addr,
            assoc_state: AssocState::BrandNew,
            qos: false,
            short_preamble: false,
            short_slot_time: false,
            rates: vec![],
            ht: None,
            vht: None,
            he: None,
            cbw: Cbw::Cbw20,
            sgi: false,
            he_gi: GuardInterval::Ns3200,
            streams: 1,
            error_tracker: FrameErrorTracker::new(),
            ewma_snr: None,
        }
    }

    /// Whether the peer advertised HT or any later amendment. Decides
    /// whether the HT engine runs its own tables or delegates to the legacy
    /// engine.
    pub fn ht_or_newer(&self) -> bool {
        self.ht.is_some() || self.vht.is_some() || self.he.is_some()
    }

    pub fn ht_supported(&self) -> bool {
        self.ht.is_some()
    }

    pub fn vht_supported(&self) -> bool {
        self.vht.is_some()
    }

    pub fn he_supported(&self) -> bool {
        self.he.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_is_brand_new_and_legacy() {
        let peer = PeerCapabilities::new([1, 2, 3, 4, 5, 6]);
        assert_eq!(peer.assoc_state, AssocState::BrandNew);
        assert!(!peer.ht_or_newer());
        assert_eq!(peer.cbw, Cbw::Cbw20);
        assert_eq!(peer.streams, 1);
        assert!(peer.rates.is_empty());
    }
}
