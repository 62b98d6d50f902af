// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The station registry: owns the address-to-peer-state table, answers
//! protocol-wide questions (RTS/CTS, CTS-to-self, fragmentation,
//! retransmission), keeps the per-AC retry counters, and dispatches
//! transmission outcomes to the configured rate selector.

use {
    crate::{
        device::LocalPhy,
        error::Error,
        peer::{AssocState, PeerCapabilities},
        selector::{PeerHandle, RateSelector},
    },
    log::warn,
    std::{collections::HashMap, fmt, rc::Rc},
    wlan_common::{
        ie::{intersect_rates, HeCapabilities, HtCapabilities, LocalRates, PeerRates,
             SupportedRate, VhtCapabilities},
        mac::{self, AccessCategory, MacAddr, Tid, NUM_ACCESS_CATEGORIES},
        phy::{Band, Cbw},
        signal::EwmaSnr,
        time::TimeSource,
        tx_vector::{Preamble, TxVector},
    },
};

const MIN_FRAG_THRESHOLD: u32 = 256;
const MAX_FRAG_THRESHOLD: u32 = 65_535;
const EWMA_SNR_WINDOW: usize = 10;

/// How a BSS with mixed-capability membership shields higher-modulation
/// transmissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionMode {
    RtsCts,
    CtsToSelf,
}

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Frames whose MPDU size exceeds this use the RTS/CTS exchange and the
    /// long retry counter.
    pub rts_cts_threshold: u32,
    /// MSDUs above this are fragmented. Clamped to [256, 65535] and forced
    /// even by [`StationRegistry::set_fragmentation_threshold`].
    pub fragmentation_threshold: u32,
    pub max_short_retry: u32,
    pub max_long_retry: u32,
    pub protection_mode: ProtectionMode,
    pub short_preamble_enabled: bool,
    /// BSS color stamped on HE transmissions; 0 disables.
    pub bss_color: u8,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            rts_cts_threshold: MAX_FRAG_THRESHOLD,
            fragmentation_threshold: MAX_FRAG_THRESHOLD,
            max_short_retry: 7,
            max_long_retry: 4,
            protection_mode: ProtectionMode::RtsCts,
            short_preamble_enabled: false,
            bss_color: 0,
        }
    }
}

/// Metadata of an outgoing frame, as far as rate selection cares.
#[derive(Debug, Clone, Copy)]
pub struct FrameMeta {
    pub peer_addr: MacAddr,
    pub is_mgmt: bool,
    /// QoS TID, or None for non-QoS data.
    pub tid: Option<Tid>,
    /// MSDU payload length, excluding MAC header and FCS.
    pub msdu_len: u32,
    pub is_retry: bool,
}

impl FrameMeta {
    pub fn access_category(&self) -> AccessCategory {
        self.tid.map(AccessCategory::from_tid).unwrap_or(AccessCategory::BestEffort)
    }

    fn header_len(&self) -> u32 {
        if self.tid.is_some() {
            mac::QOS_HDR_LEN
        } else {
            mac::HDR_LEN
        }
    }

    /// On-air MPDU size: payload plus header and FCS.
    pub fn mpdu_len(&self) -> u32 {
        self.msdu_len + self.header_len() + mac::FCS_LEN
    }
}

struct PeerEntry {
    caps: PeerCapabilities,
    handle: PeerHandle,
}

pub struct StationRegistry {
    config: RegistryConfig,
    local: Rc<LocalPhy>,
    clock: Rc<dyn TimeSource>,
    selector: Box<dyn RateSelector>,
    peers: HashMap<MacAddr, PeerEntry>,
    basic_rates: Vec<SupportedRate>,
    /// Non-ERP members are present in the BSS; ERP-or-newer transmissions
    /// need protection.
    use_non_erp_protection: bool,
    /// Non-HT members are present; HT-or-newer transmissions need
    /// protection.
    use_non_ht_protection: bool,
    // Station short/long retry counts, one of each per AC.
    ssrc: [u32; NUM_ACCESS_CATEGORIES],
    slrc: [u32; NUM_ACCESS_CATEGORIES],
}

impl StationRegistry {
    pub fn new(
        config: RegistryConfig,
        local: Rc<LocalPhy>,
        clock: Rc<dyn TimeSource>,
        selector: Box<dyn RateSelector>,
    ) -> Self {
        let basic_rates = local.basic_rates();
        Self {
            config,
            local,
            clock,
            selector,
            peers: HashMap::new(),
            basic_rates,
            use_non_erp_protection: false,
            use_non_ht_protection: false,
            ssrc: [0; NUM_ACCESS_CATEGORIES],
            slrc: [0; NUM_ACCESS_CATEGORIES],
        }
    }

    /// Get-or-create the peer's algorithm state. Never fails; repeated
    /// lookups without an intervening reset return the same handle.
    pub fn lookup(&mut self, addr: &MacAddr) -> PeerHandle {
        self.ensure_peer(addr);
        self.peers[addr].handle
    }

    fn ensure_peer(&mut self, addr: &MacAddr) {
        if !self.peers.contains_key(addr) {
            let caps = PeerCapabilities::new(*addr);
            let handle = self.selector.create_peer_state(&caps);
            self.peers.insert(*addr, PeerEntry { caps, handle });
        }
    }

    /// Drops every peer record and all selector state, and rearms the
    /// protocol-wide bookkeeping.
    pub fn reset(&mut self) {
        self.peers.clear();
        self.selector.reset();
        self.basic_rates = self.local.basic_rates();
        self.use_non_erp_protection = false;
        self.use_non_ht_protection = false;
        self.reset_retry_counters();
    }

    fn reset_retry_counters(&mut self) {
        self.ssrc = [0; NUM_ACCESS_CATEGORIES];
        self.slrc = [0; NUM_ACCESS_CATEGORIES];
    }

    // === Configuration ===

    pub fn set_rts_cts_threshold(&mut self, threshold: u32) {
        self.config.rts_cts_threshold = threshold.min(MAX_FRAG_THRESHOLD);
    }

    /// Sets the fragmentation threshold, clamped to [256, 65535]. Fragments
    /// other than the last must span an even number of octets, so odd
    /// values round down.
    pub fn set_fragmentation_threshold(&mut self, threshold: u32) {
        let threshold = if threshold < MIN_FRAG_THRESHOLD {
            warn!("Fragmentation threshold {} below minimum; using 256.", threshold);
            MIN_FRAG_THRESHOLD
        } else if threshold % 2 != 0 {
            warn!("Fragmentation threshold must be even; using {}.", threshold - 1);
            threshold - 1
        } else {
            threshold
        };
        self.config.fragmentation_threshold = threshold.min(MAX_FRAG_THRESHOLD);
    }

    pub fn fragmentation_threshold(&self) -> u32 {
        self.config.fragmentation_threshold
    }

    pub fn set_protection_mode(&mut self, mode: ProtectionMode) {
        self.config.protection_mode = mode;
    }

    pub fn set_use_non_erp_protection(&mut self, enable: bool) {
        self.use_non_erp_protection = enable;
    }

    pub fn set_use_non_ht_protection(&mut self, enable: bool) {
        self.use_non_ht_protection = enable;
    }

    pub fn set_bss_color(&mut self, color: u8) {
        self.config.bss_color = color;
    }

    pub fn add_basic_rate(&mut self, rate: SupportedRate) {
        if !self.basic_rates.iter().any(|r| r.rate() == rate.rate()) {
            self.basic_rates.push(rate.with_basic(true));
        }
    }

    pub fn assign_streams(&mut self, seed: u64) -> usize {
        self.selector.assign_streams(seed)
    }

    // === Capability recording ===

    pub fn record_supported_rates(
        &mut self,
        addr: &MacAddr,
        peer_rates: Vec<SupportedRate>,
    ) -> Result<(), Error> {
        self.ensure_peer(addr);
        let mut usable =
            intersect_rates(LocalRates(self.local.legacy_rates.clone()), PeerRates(peer_rates))
                .map_err(|_| Error::NoCommonRates)?;
        usable.sort_by_key(|r| r.rate());
        let entry = self.peers.get_mut(addr).expect("peer entry just ensured");
        entry.caps.rates = usable;
        Ok(())
    }

    pub fn record_ht_capabilities(&mut self, addr: &MacAddr, ht: &HtCapabilities) {
        self.ensure_peer(addr);
        let local = Rc::clone(&self.local);
        let entry = self.peers.get_mut(addr).expect("peer entry just ensured");
        entry.caps.ht = Some(*ht);
        Self::update_derived(&mut entry.caps, &local);
    }

    pub fn record_vht_capabilities(&mut self, addr: &MacAddr, vht: &VhtCapabilities) {
        self.ensure_peer(addr);
        let local = Rc::clone(&self.local);
        let entry = self.peers.get_mut(addr).expect("peer entry just ensured");
        entry.caps.vht = Some(*vht);
        Self::update_derived(&mut entry.caps, &local);
    }

    pub fn record_he_capabilities(&mut self, addr: &MacAddr, he: &HeCapabilities) {
        self.ensure_peer(addr);
        let local = Rc::clone(&self.local);
        let entry = self.peers.get_mut(addr).expect("peer entry just ensured");
        entry.caps.he = Some(*he);
        Self::update_derived(&mut entry.caps, &local);
    }

    /// Recomputes the peer's derived ceilings from every advertised
    /// element, clamped against local capability.
    fn update_derived(caps: &mut PeerCapabilities, local: &LocalPhy) {
        use wlan_common::ie::ChanWidthSet;

        let mut cbw = Cbw::Cbw20;
        let mut streams = 1u8;
        let mut sgi = false;

        if let Some(ht) = &caps.ht {
            if ht.chan_width_set >= ChanWidthSet::TWENTY_FORTY {
                cbw = Cbw::Cbw40;
            }
            streams = streams.max(ht.max_streams());
            sgi = sgi || ht.sgi_20 || ht.sgi_40;
        }
        if let Some(vht) = &caps.vht {
            // The VHT width set selects 160 vs 80 MHz operation.
            cbw = if vht.supported_cbw_set >= 1 { Cbw::Cbw160 } else { Cbw::Cbw80 };
            streams = streams.max(vht.max_streams());
            sgi = sgi || vht.sgi_80 || vht.sgi_160;
        }
        if let Some(he) = &caps.he {
            // HE channel width bits are band-dependent.
            let he_cbw = match local.band {
                Band::TwoGhz => {
                    if he.chan_width_set & 0b001 != 0 {
                        Cbw::Cbw40
                    } else {
                        Cbw::Cbw20
                    }
                }
                Band::FiveGhz | Band::SixGhz => {
                    if he.chan_width_set & 0b100 != 0 {
                        Cbw::Cbw160
                    } else if he.chan_width_set & 0b010 != 0 {
                        Cbw::Cbw80
                    } else {
                        Cbw::Cbw20
                    }
                }
            };
            cbw = cbw.max(he_cbw);
            streams = streams.max(he.max_streams());
            caps.he_gi = he.gi.max(local.he_gi);
        }

        caps.cbw = cbw.min(local.cbw);
        caps.streams = streams.min(local.max_tx_streams);
        caps.sgi = sgi && local.sgi_supported;
    }

    pub fn record_qos(&mut self, addr: &MacAddr, qos: bool) {
        self.ensure_peer(addr);
        self.peers.get_mut(addr).expect("peer entry just ensured").caps.qos = qos;
    }

    pub fn record_short_preamble(&mut self, addr: &MacAddr, short: bool) {
        self.ensure_peer(addr);
        self.peers.get_mut(addr).expect("peer entry just ensured").caps.short_preamble = short;
    }

    pub fn record_short_slot_time(&mut self, addr: &MacAddr, short: bool) {
        self.ensure_peer(addr);
        self.peers.get_mut(addr).expect("peer entry just ensured").caps.short_slot_time = short;
    }

    pub fn record_disassociated(&mut self, addr: &MacAddr) {
        self.set_assoc_state(addr, AssocState::Disassociated);
    }

    pub fn record_wait_assoc_tx_ok(&mut self, addr: &MacAddr) {
        self.set_assoc_state(addr, AssocState::WaitAssocTxOk);
    }

    pub fn record_got_assoc_tx_ok(&mut self, addr: &MacAddr) {
        self.set_assoc_state(addr, AssocState::GotAssocTxOk);
    }

    fn set_assoc_state(&mut self, addr: &MacAddr, state: AssocState) {
        self.ensure_peer(addr);
        self.peers.get_mut(addr).expect("peer entry just ensured").caps.assoc_state = state;
        // Retry accounting restarts with the association.
        self.reset_retry_counters();
    }

    pub fn assoc_state(&mut self, addr: &MacAddr) -> AssocState {
        self.ensure_peer(addr);
        self.peers[addr].caps.assoc_state
    }

    // === Vector selection ===

    /// Transmit vector for a data or management frame. Broadcast, multicast
    /// and management frames ride the lowest basic rate; unicast data
    /// delegates to the configured selector. Protocol-wide fields (BSS
    /// color) are applied uniformly afterward.
    pub fn get_data_tx_vector(&mut self, frame: &FrameMeta, allowed_width: Cbw) -> TxVector {
        let mut vector = if mac::is_multicast(&frame.peer_addr) || frame.is_mgmt {
            self.lowest_basic_rate_vector()
        } else {
            self.ensure_peer(&frame.peer_addr);
            let entry = &self.peers[&frame.peer_addr];
            self.selector.data_tx_vector(&entry.caps, entry.handle, allowed_width)
        };
        vector.set_bss_color(self.config.bss_color);
        vector
    }

    /// Vector for an RTS toward a unicast peer.
    pub fn get_rts_tx_vector(&mut self, addr: &MacAddr) -> TxVector {
        self.ensure_peer(addr);
        let entry = &self.peers[addr];
        self.selector.rts_tx_vector(&entry.caps, entry.handle, &self.basic_rates)
    }

    fn lowest_basic_rate_vector(&self) -> TxVector {
        let rate = self
            .basic_rates
            .iter()
            .copied()
            .min_by_key(|r| r.rate())
            .unwrap_or_else(|| self.local.lowest_rate());
        // Rates in the basic set come from the validated local mode list.
        let vector = TxVector::from_supported_rate(&rate)
            .expect("basic rates are valid legacy rates");
        let preamble =
            Preamble::for_transmission(vector.phy(), self.config.short_preamble_enabled);
        vector.with_preamble(preamble)
    }

    // === Protocol decisions ===

    /// Whether this frame needs an RTS/CTS exchange. Forced on when the
    /// configured protection mode must shield mixed-capability membership;
    /// otherwise the selector decides, defaulting to a size threshold.
    pub fn need_rts(&mut self, frame: &FrameMeta) -> bool {
        if mac::is_multicast(&frame.peer_addr) {
            return false;
        }
        let allowed_width = self.local.cbw;
        let vector = self.get_data_tx_vector(frame, allowed_width);
        if self.config.protection_mode == ProtectionMode::RtsCts
            && self.protection_required(&vector)
        {
            return true;
        }
        let normally = frame.mpdu_len() > self.config.rts_cts_threshold;
        let handle = self.peers[&frame.peer_addr].handle;
        self.selector.needs_rts(handle, normally)
    }

    /// Whether this frame should be preceded by a CTS-to-self, the
    /// alternative protection mechanism.
    pub fn need_cts_to_self(&mut self, frame: &FrameMeta) -> bool {
        let allowed_width = self.local.cbw;
        let vector = self.get_data_tx_vector(frame, allowed_width);
        self.config.protection_mode == ProtectionMode::CtsToSelf
            && self.protection_required(&vector)
    }

    fn protection_required(&self, vector: &TxVector) -> bool {
        (self.use_non_erp_protection && vector.phy().is_erp_or_newer())
            || (self.use_non_ht_protection && vector.phy().is_ht_or_newer())
    }

    pub fn need_fragmentation(&mut self, frame: &FrameMeta) -> bool {
        if mac::is_multicast(&frame.peer_addr) {
            return false;
        }
        let normally = frame.mpdu_len() > self.config.fragmentation_threshold;
        self.ensure_peer(&frame.peer_addr);
        let handle = self.peers[&frame.peer_addr].handle;
        self.selector.needs_fragmentation(handle, normally)
    }

    /// Whether the frame should be retransmitted after a failure: the AC's
    /// retry counter is still under its limit, unless the selector
    /// overrides.
    pub fn need_retransmission(&mut self, frame: &FrameMeta) -> bool {
        let ac = frame.access_category().index();
        let normally = if self.is_long_frame(frame) {
            self.slrc[ac] < self.config.max_long_retry
        } else {
            self.ssrc[ac] < self.config.max_short_retry
        };
        self.ensure_peer(&frame.peer_addr);
        let handle = self.peers[&frame.peer_addr].handle;
        self.selector.needs_retransmission(handle, normally)
    }

    fn is_long_frame(&self, frame: &FrameMeta) -> bool {
        frame.mpdu_len() > self.config.rts_cts_threshold
    }

    // === Fragmentation geometry ===

    /// Payload capacity of one fragment under the current threshold.
    fn fragment_capacity(&self, frame: &FrameMeta) -> u32 {
        self.config.fragmentation_threshold - frame.header_len() - mac::FCS_LEN
    }

    pub fn num_fragments(&self, frame: &FrameMeta) -> u32 {
        let capacity = self.fragment_capacity(frame);
        let full = frame.msdu_len / capacity;
        if frame.msdu_len % capacity > 0 || full == 0 {
            full + 1
        } else {
            full
        }
    }

    pub fn fragment_size(&self, frame: &FrameMeta, index: u32) -> u32 {
        let n = self.num_fragments(frame);
        assert!(index < n, "fragment index {} out of range ({} fragments)", index, n);
        let capacity = self.fragment_capacity(frame);
        if index + 1 == n {
            frame.msdu_len - capacity * index
        } else {
            capacity
        }
    }

    pub fn fragment_offset(&self, frame: &FrameMeta, index: u32) -> u32 {
        let n = self.num_fragments(frame);
        assert!(index < n, "fragment index {} out of range ({} fragments)", index, n);
        self.fragment_capacity(frame) * index
    }

    pub fn is_last_fragment(&self, frame: &FrameMeta, index: u32) -> bool {
        index + 1 == self.num_fragments(frame)
    }

    // === Outcome reports ===

    pub fn report_rts_failed(&mut self, frame: &FrameMeta) {
        let ac = frame.access_category().index();
        self.ssrc[ac] += 1;
        self.ensure_peer(&frame.peer_addr);
        let entry = &self.peers[&frame.peer_addr];
        self.selector.report_rts_failed(&entry.caps, entry.handle);
    }

    pub fn report_data_failed(&mut self, frame: &FrameMeta) {
        let ac = frame.access_category().index();
        if self.is_long_frame(frame) {
            self.slrc[ac] += 1;
        } else {
            self.ssrc[ac] += 1;
        }
        self.ensure_peer(&frame.peer_addr);
        let entry = &self.peers[&frame.peer_addr];
        self.selector.report_data_failed(&entry.caps, entry.handle);
    }

    pub fn report_rts_ok(&mut self, frame: &FrameMeta, cts_snr: f64) {
        let now = self.clock.now();
        let ac = frame.access_category().index();
        let retries = self.ssrc[ac];
        self.ensure_peer(&frame.peer_addr);
        let entry = self.peers.get_mut(&frame.peer_addr).expect("peer entry just ensured");
        entry.caps.error_tracker.record_success(now, retries);
        self.ssrc[ac] = 0;
        let entry = &self.peers[&frame.peer_addr];
        self.selector.report_rts_ok(&entry.caps, entry.handle, cts_snr);
    }

    pub fn report_data_ok(
        &mut self,
        frame: &FrameMeta,
        ack_snr: f64,
        data_snr: f64,
        cbw: Cbw,
        nss: u8,
    ) {
        let now = self.clock.now();
        let ac = frame.access_category().index();
        let long = self.is_long_frame(frame);
        let retries = if long { self.slrc[ac] } else { self.ssrc[ac] };
        self.ensure_peer(&frame.peer_addr);
        let entry = self.peers.get_mut(&frame.peer_addr).expect("peer entry just ensured");
        entry.caps.error_tracker.record_success(now, retries);
        Self::update_snr(&mut entry.caps, data_snr);
        if long {
            self.slrc[ac] = 0;
        } else {
            self.ssrc[ac] = 0;
        }
        let entry = &self.peers[&frame.peer_addr];
        self.selector.report_data_ok(&entry.caps, entry.handle, ack_snr, data_snr, cbw, nss);
    }

    /// The RTS exchange gave up for good; the caller must drop the frame.
    pub fn report_final_rts_failed(&mut self, frame: &FrameMeta) {
        let now = self.clock.now();
        let ac = frame.access_category().index();
        self.ensure_peer(&frame.peer_addr);
        let entry = self.peers.get_mut(&frame.peer_addr).expect("peer entry just ensured");
        entry.caps.error_tracker.record_failure(now);
        self.ssrc[ac] = 0;
        let entry = &self.peers[&frame.peer_addr];
        self.selector.report_final_rts_failed(&entry.caps, entry.handle);
    }

    /// The frame exhausted its retries; the caller must drop it.
    pub fn report_final_data_failed(&mut self, frame: &FrameMeta) {
        let now = self.clock.now();
        let ac = frame.access_category().index();
        let long = self.is_long_frame(frame);
        self.ensure_peer(&frame.peer_addr);
        let entry = self.peers.get_mut(&frame.peer_addr).expect("peer entry just ensured");
        entry.caps.error_tracker.record_failure(now);
        if long {
            self.slrc[ac] = 0;
        } else {
            self.ssrc[ac] = 0;
        }
        let entry = &self.peers[&frame.peer_addr];
        self.selector.report_final_data_failed(&entry.caps, entry.handle);
    }

    /// Block-ack outcome of one aggregate. `n_success == 0` denotes a
    /// missed block-ack, distinct from partial success.
    pub fn report_ampdu_status(
        &mut self,
        addr: &MacAddr,
        n_success: u16,
        n_failed: u16,
        data_snr: f64,
        vector_used: &TxVector,
    ) {
        self.ensure_peer(addr);
        let entry = self.peers.get_mut(addr).expect("peer entry just ensured");
        Self::update_snr(&mut entry.caps, data_snr);
        let entry = &self.peers[addr];
        self.selector.report_ampdu_status(
            &entry.caps,
            entry.handle,
            n_success,
            n_failed,
            data_snr,
            vector_used,
        );
    }

    fn update_snr(caps: &mut PeerCapabilities, snr_db: f64) {
        match &mut caps.ewma_snr {
            Some(snr) => snr.update_average(snr_db),
            None => caps.ewma_snr = Some(EwmaSnr::new(EWMA_SNR_WINDOW, snr_db)),
        }
    }

    // === Telemetry ===

    pub fn short_retry_count(&self, ac: AccessCategory) -> u32 {
        self.ssrc[ac.index()]
    }

    pub fn long_retry_count(&self, ac: AccessCategory) -> u32 {
        self.slrc[ac.index()]
    }

    pub fn peer_frame_error_rate(&mut self, addr: &MacAddr) -> f64 {
        self.ensure_peer(addr);
        self.peers[addr].caps.error_tracker.frame_error_rate()
    }

    pub fn peer_snr_db(&mut self, addr: &MacAddr) -> Option<i8> {
        self.ensure_peer(addr);
        self.peers[addr].caps.ewma_snr.as_ref().map(|s| s.db())
    }

    pub fn write_peer_stats(&mut self, addr: &MacAddr, out: &mut dyn fmt::Write) -> fmt::Result {
        self.ensure_peer(addr);
        let entry = &self.peers[addr];
        self.selector.write_stats(&entry.caps, entry.handle, out)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::constant_rate::{ConstantRateConfig, ConstantRateSelector},
        std::time::Duration,
        wlan_common::{assert_variant, mac::BCAST_ADDR, time::ManualClock},
    };

    const PEER: MacAddr = [2, 2, 2, 2, 2, 2];

    fn test_registry() -> (StationRegistry, ManualClock) {
        let clock = ManualClock::new();
        let local = Rc::new(LocalPhy::default());
        let selector = ConstantRateSelector::new(ConstantRateConfig::default(), Rc::clone(&local));
        let registry = StationRegistry::new(
            RegistryConfig::default(),
            local,
            Rc::new(clock.clone()),
            Box::new(selector),
        );
        (registry, clock)
    }

    fn data_frame(len: u32) -> FrameMeta {
        FrameMeta { peer_addr: PEER, is_mgmt: false, tid: Some(0), msdu_len: len, is_retry: false }
    }

    #[test]
    fn lookup_is_idempotent() {
        let (mut registry, _clock) = test_registry();
        let first = registry.lookup(&PEER);
        let second = registry.lookup(&PEER);
        assert_eq!(first, second);

        let other = registry.lookup(&[3; 6]);
        assert_ne!(first, other);

        registry.reset();
        // After a reset the peer gets a fresh state.
        let _ = registry.lookup(&PEER);
    }

    #[test]
    fn failure_reports_count_and_success_resets() {
        let (mut registry, _clock) = test_registry();
        let frame = data_frame(100);
        let ac = frame.access_category();

        for expected in 1..=5 {
            registry.report_data_failed(&frame);
            assert_eq!(registry.short_retry_count(ac), expected);
        }

        registry.report_data_ok(&frame, 20.0, 25.0, Cbw::Cbw20, 1);
        assert_eq!(registry.short_retry_count(ac), 0);
    }

    #[test]
    fn final_failure_resets_counter() {
        let (mut registry, _clock) = test_registry();
        let frame = data_frame(100);
        let ac = frame.access_category();

        registry.report_data_failed(&frame);
        registry.report_data_failed(&frame);
        assert_eq!(registry.short_retry_count(ac), 2);
        registry.report_final_data_failed(&frame);
        assert_eq!(registry.short_retry_count(ac), 0);
    }

    #[test]
    fn long_frames_use_the_long_counter() {
        let (mut registry, _clock) = test_registry();
        registry.set_rts_cts_threshold(500);
        let frame = data_frame(1000);
        let ac = frame.access_category();

        registry.report_data_failed(&frame);
        assert_eq!(registry.long_retry_count(ac), 1);
        assert_eq!(registry.short_retry_count(ac), 0);
    }

    #[test]
    fn assoc_state_change_resets_counters() {
        let (mut registry, _clock) = test_registry();
        let frame = data_frame(100);
        registry.report_data_failed(&frame);
        registry.record_got_assoc_tx_ok(&PEER);
        assert_eq!(registry.short_retry_count(frame.access_category()), 0);
        assert_eq!(registry.assoc_state(&PEER), AssocState::GotAssocTxOk);
    }

    #[test]
    fn fragmentation_threshold_clamping() {
        let (mut registry, _clock) = test_registry();
        registry.set_fragmentation_threshold(257);
        assert_eq!(registry.fragmentation_threshold(), 256);
        registry.set_fragmentation_threshold(100);
        assert_eq!(registry.fragmentation_threshold(), 256);
        registry.set_fragmentation_threshold(3000);
        assert_eq!(registry.fragmentation_threshold(), 3000);
    }

    #[test]
    fn fragment_geometry() {
        let (mut registry, _clock) = test_registry();
        registry.set_fragmentation_threshold(300);
        let frame = data_frame(1000);
        assert!(registry.need_fragmentation(&frame));

        // Capacity: 300 - 26 (QoS header) - 4 (FCS) = 270 bytes.
        let n = registry.num_fragments(&frame);
        assert_eq!(n, 4);
        assert_eq!(registry.fragment_size(&frame, 0), 270);
        assert_eq!(registry.fragment_offset(&frame, 1), 270);
        assert_eq!(registry.fragment_size(&frame, 3), 1000 - 3 * 270);
        assert!(!registry.is_last_fragment(&frame, 2));
        assert!(registry.is_last_fragment(&frame, 3));
    }

    #[test]
    fn broadcast_rides_the_lowest_basic_rate() {
        let (mut registry, _clock) = test_registry();
        let frame = FrameMeta {
            peer_addr: BCAST_ADDR,
            is_mgmt: false,
            tid: None,
            msdu_len: 100,
            is_retry: false,
        };
        let vector = registry.get_data_tx_vector(&frame, Cbw::Cbw20);
        assert_eq!(vector.erp_rate(), Some(SupportedRate(12)));
    }

    #[test]
    fn rts_follows_size_threshold_by_default() {
        let (mut registry, _clock) = test_registry();
        registry.set_rts_cts_threshold(500);
        assert!(!registry.need_rts(&data_frame(100)));
        assert!(registry.need_rts(&data_frame(1000)));
    }

    #[test]
    fn protection_mode_forces_rts() {
        let (mut registry, _clock) = test_registry();
        registry.set_use_non_erp_protection(true);
        // The constant selector picks an ERP rate, which non-ERP members
        // cannot hear.
        assert!(registry.need_rts(&data_frame(100)));

        registry.set_protection_mode(ProtectionMode::CtsToSelf);
        assert!(!registry.need_rts(&data_frame(100)));
        assert!(registry.need_cts_to_self(&data_frame(100)));
    }

    #[test]
    fn retransmission_respects_retry_limits() {
        let (mut registry, _clock) = test_registry();
        let frame = data_frame(100);
        for _ in 0..7 {
            assert!(registry.need_retransmission(&frame));
            registry.report_data_failed(&frame);
        }
        // Short retry limit (7) reached.
        assert!(!registry.need_retransmission(&frame));
    }

    #[test]
    fn success_feeds_the_error_tracker_and_snr() {
        let (mut registry, clock) = test_registry();
        let frame = data_frame(100);
        clock.advance(Duration::from_millis(100));
        registry.report_data_failed(&frame);
        registry.report_data_ok(&frame, 20.0, 25.0, Cbw::Cbw20, 1);
        assert!(registry.peer_frame_error_rate(&PEER) > 0.0);
        assert_variant!(registry.peer_snr_db(&PEER), Some(25));
    }

    #[test]
    fn he_width_decoding_is_band_dependent() {
        use wlan_common::test_utils::fake_capabilities::fake_he_capabilities;

        let clock = ManualClock::new();
        let local = Rc::new(LocalPhy {
            band: Band::TwoGhz,
            cbw: Cbw::Cbw40,
            he_supported: true,
            ..LocalPhy::default()
        });
        let selector = ConstantRateSelector::new(ConstantRateConfig::default(), Rc::clone(&local));
        let mut registry = StationRegistry::new(
            RegistryConfig::default(),
            local,
            Rc::new(clock),
            Box::new(selector),
        );
        registry.record_he_capabilities(&PEER, &fake_he_capabilities());
        registry.ensure_peer(&PEER);
        // In 2.4 GHz only the 40 MHz bit applies, clamped by the local
        // operating width.
        assert_eq!(registry.peers[&PEER].caps.cbw, Cbw::Cbw40);
    }
}
