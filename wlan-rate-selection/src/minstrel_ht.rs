// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Minstrel-HT rate selection: per-peer statistics over the rate-group
//! table, EWMA-smoothed success probabilities, a randomized sampling
//! strategy, and a three-deep multi-rate retry chain. Peers without HT/VHT/HE
//! support are served by an owned legacy Minstrel delegate.
//!
//! Statistics refresh lazily: every outcome report compares the injected
//! clock against the next update deadline, so no timer infrastructure is
//! needed and the surrounding simulation stays deterministic.

use {
    crate::{
        device::LocalPhy,
        groups::{GroupList, McsGroup},
        minstrel::{MinstrelConfig, MinstrelSelector},
        peer::PeerCapabilities,
        probe_sequence::ProbeSequence,
        selector::{select_rts_rate, PeerHandle, RateSelector},
    },
    log::{debug, warn},
    rand::{rngs::StdRng, SeedableRng},
    std::{fmt, rc::Rc, time::Duration},
    wlan_common::{
        airtime,
        ie::SupportedRate,
        mac::{format_addr, MacAddr},
        phy::{Cbw, WlanPhyType},
        time::TimeSource,
        tx_vector::{TxVector, HT_NUM_UNIQUE_MCS},
    },
};

/// Per-rate budget simulation horizon and attempt cap. The contention
/// simulation is a deliberate approximation of the published algorithm and
/// must not be "corrected".
const RETRY_TIME_HORIZON: Duration = Duration::from_millis(6);
const MAX_RETRIES_PER_RATE: u32 = 7;
const CW_MIN: u32 = 15;
const CW_MAX: u32 = 1023;

/// Sampled rates above this EWMA probability are not worth the airtime.
const SAMPLE_PROB_CEILING: f64 = 95.0;
/// Rates skipped this many refresh intervals get sampled even when slow.
const SAMPLE_SKIP_LIMIT: u32 = 20;
/// At most this many slow-rate samples per refresh interval.
const SAMPLE_SLOW_LIMIT: u32 = 2;

#[derive(Debug, Clone)]
pub struct MinstrelHtConfig {
    /// Minimum spacing between statistics refreshes.
    pub update_interval: Duration,
    /// EWMA history weight in percent, 0-100.
    pub ewma_level: u32,
    /// Columns in the sampling table; each rate is probed roughly once per
    /// this many refresh intervals.
    pub n_sample_columns: u8,
    /// Reference MPDU length for the airtime tables.
    pub frame_length: u32,
    /// Restrict each peer to its newest advertised amendment's groups.
    pub use_latest_amendment_only: bool,
    /// Log the per-peer statistics table at each refresh.
    pub print_stats: bool,
}

impl Default for MinstrelHtConfig {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_millis(100),
            ewma_level: 75,
            n_sample_columns: 10,
            frame_length: 1200,
            use_latest_amendment_only: true,
            print_stats: false,
        }
    }
}

#[derive(Debug, Default, Clone)]
struct RateStats {
    supported: bool,
    /// Attempt budget for this rate in the retry chain.
    retry_count: u32,
    retry_updated: bool,
    attempts: u32,
    successes: u32,
    prev_attempts: u32,
    prev_successes: u32,
    attempt_hist: u64,
    success_hist: u64,
    samples_skipped: u32,
    /// Raw probability of the last closed window, percent.
    prob: f64,
    ewma_prob: f64,
    ewmsd_prob: f64,
    /// Percent of airtime-seconds; only relative order matters.
    throughput: f64,
}

#[derive(Debug, Clone)]
struct PeerGroup {
    supported: bool,
    /// Sampling cursor within this group.
    row: u8,
    col: u8,
    max_tp_rate: u16,
    max_tp_rate2: u16,
    max_prob_rate: u16,
    rates: Vec<RateStats>,
}

/// One-way per-peer lifecycle: capability unknown, delegated to the legacy
/// engine, or running the full HT tables.
enum PeerState {
    Uninitialized,
    NonHt,
    HtInitialized(Box<HtPeer>),
}

struct HtPeer {
    groups: Vec<PeerGroup>,
    probe: ProbeSequence,
    sample_group: u8,
    /// Global rate index currently used for transmissions.
    txrate: u16,
    max_tp_rate: u16,
    max_tp_rate2: u16,
    max_prob_rate: u16,
    short_retry: u32,
    long_retry: u32,
    is_sampling: bool,
    sample_rate: u16,
    sample_tries: u32,
    sample_wait: u32,
    sample_count: u32,
    num_samples_slow: u32,
    avg_ampdu_len: f64,
    ampdu_len: u64,
    ampdu_packet_count: u32,
    total_packets: u64,
    sample_packets: u64,
    next_stats_update: Duration,
}

/// Immutable engine context threaded through the per-peer state machinery.
struct EngineCtx<'a> {
    config: &'a MinstrelHtConfig,
    groups: &'a GroupList,
}

pub struct MinstrelHtSelector {
    config: MinstrelHtConfig,
    local: Rc<LocalPhy>,
    clock: Rc<dyn TimeSource>,
    groups: GroupList,
    rng: StdRng,
    peers: Vec<PeerState>,
    /// Serves peers that never advertised HT or newer.
    legacy: MinstrelSelector,
}

impl MinstrelHtSelector {
    pub fn new(config: MinstrelHtConfig, local: Rc<LocalPhy>, clock: Rc<dyn TimeSource>) -> Self {
        let groups = GroupList::new(&local, config.frame_length);
        let legacy_config = MinstrelConfig {
            update_interval: config.update_interval,
            ewma_level: config.ewma_level,
            n_sample_columns: config.n_sample_columns,
            frame_length: config.frame_length,
            print_stats: config.print_stats,
            ..MinstrelConfig::default()
        };
        let legacy = MinstrelSelector::new(legacy_config, Rc::clone(&local), Rc::clone(&clock));
        Self {
            config,
            local,
            clock,
            groups,
            rng: StdRng::seed_from_u64(1),
            peers: Vec::new(),
            legacy,
        }
    }

    fn ctx(&self) -> EngineCtx<'_> {
        EngineCtx { config: &self.config, groups: &self.groups }
    }

    /// Takes the one-way init transition on the first call where the peer's
    /// capability is known.
    fn ensure_init(&mut self, peer: &PeerCapabilities, handle: PeerHandle) {
        if let PeerState::Uninitialized = self.peers[handle.index()] {
            if peer.ht_or_newer() {
                let now = self.clock.now();
                let ht = self.rate_init(peer, now);
                self.peers[handle.index()] = PeerState::HtInitialized(Box::new(ht));
            } else if !peer.rates.is_empty() {
                self.peers[handle.index()] = PeerState::NonHt;
            }
        }
    }

    fn rate_init(&mut self, peer: &PeerCapabilities, now: Duration) -> HtPeer {
        let rates_per_group = self.groups.rates_per_group();
        let mut peer_groups = Vec::with_capacity(self.groups.num_groups() as usize);
        for gid in 0..self.groups.num_groups() {
            let group = self.groups.group(gid);
            let mut rates = vec![RateStats::default(); rates_per_group as usize];
            let group_usable = group.supported && Self::peer_supports_group(&self.config, peer, group);
            if group_usable {
                for rid in 0..group.num_rates {
                    if Self::peer_supports_rate(peer, group, rid) {
                        let stats = &mut rates[rid as usize];
                        stats.supported = true;
                        stats.retry_count = 1;
                    }
                }
            }
            let supported = group_usable && rates.iter().any(|r| r.supported);
            peer_groups.push(PeerGroup {
                supported,
                row: 0,
                col: 0,
                max_tp_rate: 0,
                max_tp_rate2: 0,
                max_prob_rate: 0,
                rates,
            });
        }
        if !peer_groups.iter().any(|g| g.supported) {
            panic!(
                "no supported rate groups for peer {}: advertised capabilities \
                 share nothing with the local device",
                format_addr(&peer.addr)
            );
        }
        let probe =
            ProbeSequence::random_new(&mut self.rng, rates_per_group, self.config.n_sample_columns);
        let mut ht = HtPeer {
            groups: peer_groups,
            probe,
            sample_group: 0,
            txrate: 0,
            max_tp_rate: 0,
            max_tp_rate2: 0,
            max_prob_rate: 0,
            short_retry: 0,
            long_retry: 0,
            is_sampling: false,
            sample_rate: 0,
            sample_tries: 4,
            sample_wait: 0,
            sample_count: 16,
            num_samples_slow: 0,
            avg_ampdu_len: 1.0,
            ampdu_len: 0,
            ampdu_packet_count: 0,
            total_packets: 0,
            sample_packets: 0,
            next_stats_update: now,
        };
        let ctx = self.ctx();
        ht.set_next_sample(&ctx);
        ht.update_stats(&ctx, now);
        ht.txrate = ht.find_rate(&ctx);
        ht
    }

    fn peer_supports_group(
        config: &MinstrelHtConfig,
        peer: &PeerCapabilities,
        group: &McsGroup,
    ) -> bool {
        let amendment_ok = match group.phy {
            WlanPhyType::Ht => {
                peer.ht_supported()
                    && !(config.use_latest_amendment_only
                        && (peer.vht_supported() || peer.he_supported()))
            }
            WlanPhyType::Vht => {
                peer.vht_supported()
                    && !(config.use_latest_amendment_only && peer.he_supported())
            }
            WlanPhyType::He => peer.he_supported(),
            _ => false,
        };
        let gi_ok = match group.phy {
            WlanPhyType::He => group.gi >= peer.he_gi,
            _ => !group.gi.is_short() || peer.sgi,
        };
        amendment_ok && gi_ok && group.cbw <= peer.cbw && group.nss <= peer.streams
    }

    fn peer_supports_rate(peer: &PeerCapabilities, group: &McsGroup, rate_id: u8) -> bool {
        match group.phy {
            WlanPhyType::Ht => peer
                .ht
                .map(|ht| ht.supports_mcs((group.nss - 1) * HT_NUM_UNIQUE_MCS + rate_id))
                .unwrap_or(false),
            WlanPhyType::Vht => peer
                .vht
                .and_then(|vht| vht.max_mcs(group.nss))
                .map(|max| rate_id <= max)
                .unwrap_or(false),
            WlanPhyType::He => peer
                .he
                .and_then(|he| he.max_mcs(group.nss))
                .map(|max| rate_id <= max)
                .unwrap_or(false),
            _ => false,
        }
    }

    fn lowest_legacy_vector(&self) -> TxVector {
        TxVector::from_supported_rate(&self.local.lowest_rate())
            .expect("local mode list holds valid legacy rates")
    }

    /// Sum of the active retry chain's per-rate budgets; the ceiling that
    /// `long_retry` may legally reach.
    pub fn retry_budget(&self, handle: PeerHandle) -> u32 {
        let ctx = self.ctx();
        match &self.peers[handle.index()] {
            PeerState::HtInitialized(ht) => ht.count_retries(&ctx),
            _ => 0,
        }
    }
}

impl RateSelector for MinstrelHtSelector {
    fn create_peer_state(&mut self, peer: &PeerCapabilities) -> PeerHandle {
        let handle = PeerHandle(self.peers.len());
        self.peers.push(PeerState::Uninitialized);
        // Keep the delegate's arena index-aligned with ours.
        let legacy_handle = self.legacy.create_peer_state(peer);
        debug_assert_eq!(legacy_handle, handle);
        handle
    }

    fn reset(&mut self) {
        self.peers.clear();
        self.legacy.reset();
    }

    fn data_tx_vector(
        &mut self,
        peer: &PeerCapabilities,
        handle: PeerHandle,
        allowed_width: Cbw,
    ) -> TxVector {
        self.ensure_init(peer, handle);
        let ctx = EngineCtx { config: &self.config, groups: &self.groups };
        match &self.peers[handle.index()] {
            PeerState::Uninitialized => self.lowest_legacy_vector(),
            PeerState::NonHt => self.legacy.data_tx_vector(peer, handle, allowed_width),
            PeerState::HtInitialized(ht) => ht.data_tx_vector(&ctx, peer, allowed_width),
        }
    }

    fn rts_tx_vector(
        &mut self,
        peer: &PeerCapabilities,
        handle: PeerHandle,
        basic_rates: &[SupportedRate],
    ) -> TxVector {
        self.ensure_init(peer, handle);
        match &self.peers[handle.index()] {
            PeerState::Uninitialized => {
                let last = self.lowest_legacy_vector();
                select_rts_rate(&last, basic_rates, &self.local.legacy_rates, &peer.addr)
            }
            PeerState::NonHt => self.legacy.rts_tx_vector(peer, handle, basic_rates),
            PeerState::HtInitialized(ht) => {
                let gid = self.groups.group_id(ht.txrate);
                let rid = self.groups.rate_id(ht.txrate);
                let last = self.groups.group(gid).tx_vector(rid);
                select_rts_rate(&last, basic_rates, &self.local.legacy_rates, &peer.addr)
            }
        }
    }

    fn report_rts_failed(&mut self, peer: &PeerCapabilities, handle: PeerHandle) {
        self.ensure_init(peer, handle);
        match &mut self.peers[handle.index()] {
            PeerState::Uninitialized => {}
            PeerState::NonHt => self.legacy.report_rts_failed(peer, handle),
            PeerState::HtInitialized(ht) => ht.short_retry += 1,
        }
    }

    fn report_rts_ok(&mut self, peer: &PeerCapabilities, handle: PeerHandle, cts_snr: f64) {
        self.ensure_init(peer, handle);
        if let PeerState::NonHt = self.peers[handle.index()] {
            self.legacy.report_rts_ok(peer, handle, cts_snr);
        }
    }

    fn report_data_failed(&mut self, peer: &PeerCapabilities, handle: PeerHandle) {
        self.ensure_init(peer, handle);
        let ctx = EngineCtx { config: &self.config, groups: &self.groups };
        match &mut self.peers[handle.index()] {
            PeerState::Uninitialized => {}
            PeerState::NonHt => self.legacy.report_data_failed(peer, handle),
            PeerState::HtInitialized(ht) => {
                ht.update_packet_counters(0, 1);
                ht.update_rate(&ctx, &peer.addr);
            }
        }
    }

    fn report_data_ok(
        &mut self,
        peer: &PeerCapabilities,
        handle: PeerHandle,
        ack_snr: f64,
        data_snr: f64,
        cbw: Cbw,
        nss: u8,
    ) {
        self.ensure_init(peer, handle);
        let now = self.clock.now();
        let ctx = EngineCtx { config: &self.config, groups: &self.groups };
        match &mut self.peers[handle.index()] {
            PeerState::Uninitialized => {}
            PeerState::NonHt => {
                self.legacy.report_data_ok(peer, handle, ack_snr, data_snr, cbw, nss)
            }
            PeerState::HtInitialized(ht) => {
                let gid = ctx.groups.group_id(ht.txrate) as usize;
                let rid = ctx.groups.rate_id(ht.txrate) as usize;
                ht.groups[gid].rates[rid].successes += 1;
                ht.groups[gid].rates[rid].attempts += 1;
                ht.update_packet_counters(1, 0);
                ht.is_sampling = false;
                ht.update_retry();
                if now >= ht.next_stats_update {
                    ht.update_stats(&ctx, now);
                }
                ht.txrate = ht.find_rate(&ctx);
            }
        }
    }

    fn report_final_rts_failed(&mut self, peer: &PeerCapabilities, handle: PeerHandle) {
        self.ensure_init(peer, handle);
        match &mut self.peers[handle.index()] {
            PeerState::Uninitialized => {}
            PeerState::NonHt => self.legacy.report_final_rts_failed(peer, handle),
            PeerState::HtInitialized(ht) => ht.short_retry = 0,
        }
    }

    fn report_final_data_failed(&mut self, peer: &PeerCapabilities, handle: PeerHandle) {
        self.ensure_init(peer, handle);
        let now = self.clock.now();
        let ctx = EngineCtx { config: &self.config, groups: &self.groups };
        match &mut self.peers[handle.index()] {
            PeerState::Uninitialized => {}
            PeerState::NonHt => self.legacy.report_final_data_failed(peer, handle),
            PeerState::HtInitialized(ht) => {
                ht.update_packet_counters(0, 1);
                ht.is_sampling = false;
                ht.update_retry();
                if now >= ht.next_stats_update {
                    ht.update_stats(&ctx, now);
                }
                ht.txrate = ht.find_rate(&ctx);
            }
        }
    }

    fn report_ampdu_status(
        &mut self,
        peer: &PeerCapabilities,
        handle: PeerHandle,
        n_success: u16,
        n_failed: u16,
        _data_snr: f64,
        _vector_used: &TxVector,
    ) {
        self.ensure_init(peer, handle);
        let now = self.clock.now();
        let ctx = EngineCtx { config: &self.config, groups: &self.groups };
        match &mut self.peers[handle.index()] {
            PeerState::HtInitialized(ht) => {
                ht.ampdu_packet_count += 1;
                ht.ampdu_len += (n_success + n_failed) as u64;
                ht.update_packet_counters(n_success as u32, n_failed as u32);
                let gid = ctx.groups.group_id(ht.txrate) as usize;
                let rid = ctx.groups.rate_id(ht.txrate) as usize;
                ht.groups[gid].rates[rid].successes += n_success as u32;
                ht.groups[gid].rates[rid].attempts += (n_success + n_failed) as u32;
                if n_success == 0 && ht.long_retry < ht.count_retries(&ctx) {
                    // The whole aggregate went unacknowledged; one step
                    // down the retry chain.
                    ht.update_rate(&ctx, &peer.addr);
                } else {
                    ht.is_sampling = false;
                    ht.update_retry();
                    if now >= ht.next_stats_update {
                        ht.update_stats(&ctx, now);
                    }
                    ht.txrate = ht.find_rate(&ctx);
                }
            }
            _ => {
                warn!(
                    "A-MPDU status for peer {} without HT initialization; ignored",
                    format_addr(&peer.addr)
                );
            }
        }
    }

    fn assign_streams(&mut self, seed: u64) -> usize {
        self.rng = StdRng::seed_from_u64(seed);
        1 + self.legacy.assign_streams(seed.wrapping_add(1))
    }

    fn write_stats(
        &self,
        peer: &PeerCapabilities,
        handle: PeerHandle,
        out: &mut dyn fmt::Write,
    ) -> fmt::Result {
        match &self.peers[handle.index()] {
            PeerState::Uninitialized => writeln!(out, "peer {}: uninitialized", format_addr(&peer.addr)),
            PeerState::NonHt => self.legacy.write_stats(peer, handle, out),
            PeerState::HtInitialized(ht) => ht.write_stats(&self.ctx(), peer, out),
        }
    }
}

impl HtPeer {
    fn stats(&self, ctx: &EngineCtx<'_>, index: u16) -> &RateStats {
        let gid = ctx.groups.group_id(index) as usize;
        let rid = ctx.groups.rate_id(index) as usize;
        &self.groups[gid].rates[rid]
    }

    fn th_prob(&self, ctx: &EngineCtx<'_>, index: u16) -> (f64, f64) {
        let stats = self.stats(ctx, index);
        (stats.throughput, stats.ewma_prob)
    }

    fn rate_retry_count(&self, ctx: &EngineCtx<'_>, index: u16) -> u32 {
        self.stats(ctx, index).retry_count
    }

    /// First supported (group, rate) in table order: 1 stream, long GI,
    /// 20 MHz, MCS 0 when available.
    fn lowest_index(&self, ctx: &EngineCtx<'_>) -> u16 {
        for (gid, group) in self.groups.iter().enumerate() {
            if !group.supported {
                continue;
            }
            if let Some(rid) = group.rates.iter().position(|r| r.supported) {
                return ctx.groups.index(gid as u8, rid as u8);
            }
        }
        // rate_init refuses peers without a single supported rate.
        panic!("no supported rate in a previously validated rate table");
    }

    fn lowest_index_in_group(&self, ctx: &EngineCtx<'_>, gid: u8) -> u16 {
        match self.groups[gid as usize].rates.iter().position(|r| r.supported) {
            Some(rid) => ctx.groups.index(gid, rid as u8),
            None => panic!("no supported rate in a previously validated group"),
        }
    }

    fn data_tx_vector(
        &self,
        ctx: &EngineCtx<'_>,
        peer: &PeerCapabilities,
        allowed_width: Cbw,
    ) -> TxVector {
        let mut gid = ctx.groups.group_id(self.txrate);
        let rid = ctx.groups.rate_id(self.txrate);
        let group = ctx.groups.group(gid);

        // A choice outside the peer's validated capability means the rate
        // table itself is corrupt; abort rather than degrade.
        let gi_mismatch = match group.phy {
            WlanPhyType::He => group.gi < peer.he_gi,
            _ => group.gi.is_short() && !peer.sgi,
        };
        if gi_mismatch || group.cbw > peer.cbw || group.nss > peer.streams {
            panic!(
                "inconsistent group selected for peer {}: chose {:?}/{} nss, {} ns GI, {} MHz \
                 against peer limits {} nss, sgi {}, {} MHz",
                format_addr(&peer.addr),
                group.phy,
                group.nss,
                group.gi.nanos(),
                group.cbw.mhz(),
                peer.streams,
                peer.sgi,
                peer.cbw.mhz(),
            );
        }

        if group.cbw > allowed_width {
            gid = self.width_clamped_group(ctx, gid, allowed_width, &peer.addr);
        }
        let group = ctx.groups.group(gid);
        group
            .tx_vector(rid)
            .with_aggregation(peer.qos && !self.is_sampling)
    }

    /// Searches progressively halved widths for a supported group with
    /// identical class, streams and guard interval.
    fn width_clamped_group(
        &self,
        ctx: &EngineCtx<'_>,
        gid: u8,
        allowed_width: Cbw,
        addr: &MacAddr,
    ) -> u8 {
        let group = ctx.groups.group(gid);
        let mut cbw = group.cbw;
        while let Some(halved) = cbw.halved() {
            cbw = halved;
            if cbw > allowed_width {
                continue;
            }
            if let Some(candidate) =
                ctx.groups.group_id_for(group.phy, group.nss, group.gi, cbw)
            {
                if self.groups[candidate as usize].supported {
                    return candidate;
                }
            }
        }
        panic!(
            "no supported group under the {} MHz width constraint for peer {} \
             (class {:?}, {} nss, {} ns GI)",
            allowed_width.mhz(),
            format_addr(addr),
            group.phy,
            group.nss,
            group.gi.nanos(),
        );
    }

    fn update_retry(&mut self) {
        self.short_retry = 0;
        self.long_retry = 0;
    }

    fn update_packet_counters(&mut self, n_success: u32, n_failed: u32) {
        self.total_packets += (n_success + n_failed) as u64;
        if self.is_sampling {
            self.sample_packets += (n_success + n_failed) as u64;
        }
        if self.sample_wait == 0 && self.sample_tries == 0 && self.sample_count > 0 {
            // Throttle the next sample, scaled by the running average
            // aggregate length.
            self.sample_wait = 16 + 2 * self.avg_ampdu_len as u32;
            self.sample_tries = 1;
            self.sample_count -= 1;
        }
    }

    /// Advances the retry chain after one failed attempt. Exhausting the
    /// chain while `long_retry` exceeds the budget means the counters were
    /// not reset correctly, which is fatal.
    fn update_rate(&mut self, ctx: &EngineCtx<'_>, addr: &MacAddr) {
        self.long_retry += 1;
        let gid = ctx.groups.group_id(self.txrate) as usize;
        let rid = ctx.groups.rate_id(self.txrate) as usize;
        self.groups[gid].rates[rid].attempts += 1;

        let max_tp_retries = self.rate_retry_count(ctx, self.max_tp_rate);
        let max_tp2_retries = self.rate_retry_count(ctx, self.max_tp_rate2);
        let max_prob_retries = self.rate_retry_count(ctx, self.max_prob_rate);

        if !self.is_sampling {
            if self.long_retry < max_tp_retries {
                self.txrate = self.max_tp_rate;
            } else if self.long_retry < max_tp_retries + max_tp2_retries {
                self.txrate = self.max_tp_rate2;
            } else if self.long_retry <= max_tp_retries + max_tp2_retries + max_prob_retries {
                self.txrate = self.max_prob_rate;
            } else {
                panic!(
                    "retry chain exhausted for peer {}: long retry {} exceeds budget {}",
                    format_addr(addr),
                    self.long_retry,
                    max_tp_retries + max_tp2_retries + max_prob_retries,
                );
            }
        } else {
            // While sampling, the sample rate replaces the second chain
            // entry and is attempted exactly once.
            if self.long_retry < max_tp_retries {
                self.txrate = self.max_tp_rate;
            } else if self.long_retry <= 1 + max_tp_retries {
                self.txrate = self.sample_rate;
            } else if self.long_retry <= 1 + max_tp_retries + max_prob_retries {
                self.txrate = self.max_prob_rate;
            } else {
                panic!(
                    "retry chain exhausted for peer {} while sampling: long retry {} exceeds \
                     budget {}",
                    format_addr(addr),
                    self.long_retry,
                    1 + max_tp_retries + max_prob_retries,
                );
            }
        }
    }

    /// Total attempt budget of the active retry chain.
    fn count_retries(&self, ctx: &EngineCtx<'_>) -> u32 {
        let max_tp_retries = self.rate_retry_count(ctx, self.max_tp_rate);
        let max_tp2_retries = self.rate_retry_count(ctx, self.max_tp_rate2);
        let max_prob_retries = self.rate_retry_count(ctx, self.max_prob_rate);
        if !self.is_sampling {
            max_tp_retries + max_tp2_retries + max_prob_retries
        } else {
            1 + max_tp_retries + max_prob_retries
        }
    }

    /// Picks the rate for the next first transmission: a sampling candidate
    /// when one is due and worth trying, the best-throughput rate otherwise.
    fn find_rate(&mut self, ctx: &EngineCtx<'_>) -> u16 {
        if self.total_packets + self.sample_packets == 0 {
            return self.max_tp_rate;
        }

        if self.sample_wait == 0 && self.sample_tries != 0 {
            let sample_idx = self.next_sample(ctx);
            let sample_gid = ctx.groups.group_id(sample_idx);
            let sample_rid = ctx.groups.rate_id(sample_idx);
            let group_ok = self.groups[sample_gid as usize].supported
                && self.groups[sample_gid as usize].rates[sample_rid as usize].supported;
            if group_ok {
                let info = &self.groups[sample_gid as usize].rates[sample_rid as usize];
                let skipped = info.samples_skipped;
                let ewma_prob = info.ewma_prob;
                // Don't sample the rates already in the chain, nor rates
                // that are all but certain to work.
                if sample_idx != self.max_tp_rate
                    && sample_idx != self.max_tp_rate2
                    && sample_idx != self.max_prob_rate
                    && ewma_prob <= SAMPLE_PROB_CEILING
                {
                    let sample_dur = ctx.groups.first_tx_time(sample_idx);
                    let max_tp2_dur = ctx.groups.first_tx_time(self.max_tp_rate2);
                    let max_prob_dur = ctx.groups.first_tx_time(self.max_prob_rate);
                    let max_tp_streams =
                        ctx.groups.group(ctx.groups.group_id(self.max_tp_rate)).nss;
                    let sample_streams = ctx.groups.group(sample_gid).nss;

                    // Lower rates get sampled only occasionally when the
                    // link is working well.
                    if sample_dur < max_tp2_dur
                        || (sample_streams < max_tp_streams && sample_dur < max_prob_dur)
                    {
                        self.is_sampling = true;
                        self.sample_rate = sample_idx;
                        self.sample_tries -= 1;
                        return sample_idx;
                    } else {
                        self.num_samples_slow += 1;
                        if skipped >= SAMPLE_SKIP_LIMIT
                            && self.num_samples_slow <= SAMPLE_SLOW_LIMIT
                        {
                            self.is_sampling = true;
                            self.sample_rate = sample_idx;
                            self.sample_tries -= 1;
                            return sample_idx;
                        }
                    }
                }
            }
        }
        if self.sample_wait > 0 {
            self.sample_wait -= 1;
        }

        self.max_tp_rate
    }

    fn next_sample(&mut self, ctx: &EngineCtx<'_>) -> u16 {
        let gid = self.sample_group;
        let group = &self.groups[gid as usize];
        let rate = self.probe.entry(group.row, group.col);
        let index = ctx.groups.index(gid, rate);
        self.set_next_sample(ctx);
        index
    }

    /// Moves the cursor group-first over supported groups, then row, then
    /// column.
    fn set_next_sample(&mut self, ctx: &EngineCtx<'_>) {
        loop {
            self.sample_group = (self.sample_group + 1) % ctx.groups.num_groups();
            if self.groups[self.sample_group as usize].supported {
                break;
            }
        }
        let group = &mut self.groups[self.sample_group as usize];
        group.row += 1;
        if group.row >= ctx.groups.rates_per_group() {
            group.row = 0;
            group.col = (group.col + 1) % ctx.config.n_sample_columns;
        }
    }

    /// Folds the just-closed window into the EWMA statistics, recomputes
    /// throughputs and the best-rate triple, and rearms the sampling
    /// budget. Called at most once per update interval, lazily from an
    /// outcome report.
    fn update_stats(&mut self, ctx: &EngineCtx<'_>, now: Duration) {
        self.next_stats_update = now + ctx.config.update_interval;
        self.num_samples_slow = 0;
        self.sample_count = 0;
        let ewma_level = ctx.config.ewma_level as f64;

        if self.ampdu_packet_count > 0 {
            let new_len = (self.ampdu_len / self.ampdu_packet_count as u64) as f64;
            self.avg_ampdu_len =
                (new_len * (100.0 - ewma_level) + self.avg_ampdu_len * ewma_level) / 100.0;
            self.ampdu_len = 0;
            self.ampdu_packet_count = 0;
        }

        let lowest = self.lowest_index(ctx);
        self.max_tp_rate = lowest;
        self.max_tp_rate2 = lowest;
        self.max_prob_rate = lowest;

        for gid in 0..ctx.groups.num_groups() {
            if !self.groups[gid as usize].supported {
                continue;
            }
            self.sample_count += 1;
            let group_lowest = self.lowest_index_in_group(ctx, gid);
            {
                let group = &mut self.groups[gid as usize];
                group.max_tp_rate = group_lowest;
                group.max_tp_rate2 = group_lowest;
                group.max_prob_rate = group_lowest;
            }
            for rid in 0..ctx.groups.rates_per_group() {
                let index = ctx.groups.index(gid, rid);
                let has_throughput;
                {
                    let stats = &mut self.groups[gid as usize].rates[rid as usize];
                    if !stats.supported {
                        continue;
                    }
                    stats.retry_updated = false;
                    if stats.attempts > 0 {
                        stats.samples_skipped = 0;
                        let mut prob = 100.0 * stats.successes as f64 / stats.attempts as f64;
                        stats.prob = prob;
                        if stats.success_hist == 0 {
                            // First observation: no smoothing.
                            stats.ewma_prob = prob;
                        } else {
                            stats.ewmsd_prob =
                                ewmsd(stats.ewmsd_prob, prob, stats.ewma_prob, ewma_level);
                            prob = (prob * (100.0 - ewma_level) + stats.ewma_prob * ewma_level)
                                / 100.0;
                            stats.ewma_prob = prob;
                        }
                        stats.throughput =
                            calculate_throughput(ctx.groups.first_tx_time(index), prob);
                        stats.success_hist += stats.successes as u64;
                        stats.attempt_hist += stats.attempts as u64;
                    } else {
                        stats.samples_skipped += 1;
                    }
                    stats.prev_successes = stats.successes;
                    stats.prev_attempts = stats.attempts;
                    stats.successes = 0;
                    stats.attempts = 0;
                    has_throughput = stats.throughput != 0.0;
                }
                if has_throughput {
                    self.set_best_station_th_rates(ctx, index);
                    self.set_best_probability_rate(ctx, index);
                }
            }
        }

        // Try to sample every available rate during each interval.
        self.sample_count *= 8;

        self.calculate_retransmits(ctx, self.max_tp_rate);
        self.calculate_retransmits(ctx, self.max_tp_rate2);
        self.calculate_retransmits(ctx, self.max_prob_rate);

        if ctx.config.print_stats {
            debug!(
                "stats refresh: max tp {} / {} max prob {} avg aggr len {:.1}",
                self.max_tp_rate, self.max_tp_rate2, self.max_prob_rate, self.avg_ampdu_len,
            );
        }
    }

    fn set_best_station_th_rates(&mut self, ctx: &EngineCtx<'_>, index: u16) {
        let (th, prob) = self.th_prob(ctx, index);
        let (max_tp_th, max_tp_prob) = self.th_prob(ctx, self.max_tp_rate);
        let (max_tp2_th, max_tp2_prob) = self.th_prob(ctx, self.max_tp_rate2);

        if th > max_tp_th || (th == max_tp_th && prob > max_tp_prob) {
            self.max_tp_rate2 = self.max_tp_rate;
            self.max_tp_rate = index;
        } else if th > max_tp2_th || (th == max_tp2_th && prob > max_tp2_prob) {
            self.max_tp_rate2 = index;
        }

        let gid = ctx.groups.group_id(index) as usize;
        let (group_tp_th, group_tp_prob) = self.th_prob(ctx, self.groups[gid].max_tp_rate);
        let (group_tp2_th, group_tp2_prob) = self.th_prob(ctx, self.groups[gid].max_tp_rate2);
        if th > group_tp_th || (th == group_tp_th && prob > group_tp_prob) {
            self.groups[gid].max_tp_rate2 = self.groups[gid].max_tp_rate;
            self.groups[gid].max_tp_rate = index;
        } else if th > group_tp2_th || (th == group_tp2_th && prob > group_tp2_prob) {
            self.groups[gid].max_tp_rate2 = index;
        }
    }

    /// High-probability candidate selection: above 75 % EWMA the contenders
    /// compete on throughput, at or below it on raw probability.
    fn set_best_probability_rate(&mut self, ctx: &EngineCtx<'_>, index: u16) {
        let (th, prob) = self.th_prob(ctx, index);
        let (current_th, current_prob) = self.th_prob(ctx, self.max_prob_rate);
        let gid = ctx.groups.group_id(index) as usize;
        let (group_th, group_prob) = self.th_prob(ctx, self.groups[gid].max_prob_rate);

        if prob > 75.0 {
            if th > current_th {
                self.max_prob_rate = index;
            }
            if th > group_th {
                self.groups[gid].max_prob_rate = index;
            }
        } else {
            if prob > current_prob {
                self.max_prob_rate = index;
            }
            if prob > group_prob {
                self.groups[gid].max_prob_rate = index;
            }
        }
    }

    /// Precomputes a rate's attempt budget by simulating contention-window
    /// doublings until the 6 ms horizon or the attempt cap is reached.
    fn calculate_retransmits(&mut self, ctx: &EngineCtx<'_>, index: u16) {
        let gid = ctx.groups.group_id(index) as usize;
        let rid = ctx.groups.rate_id(index) as usize;
        if self.groups[gid].rates[rid].retry_updated {
            return;
        }

        let data_tx_time = ctx.groups.group(gid as u8).first_tx_time(rid as u8)
            + ctx.groups
                .group(gid as u8)
                .middle_tx_time(rid as u8)
                .mul_f64((self.avg_ampdu_len - 1.0).max(0.0));
        let ack_time = airtime::SIFS + airtime::block_ack_tx_time();
        let slot = airtime::SLOT_TIME;

        let stats = &mut self.groups[gid].rates[rid];
        if stats.ewma_prob < 1.0 {
            // A dead rate is not worth more than one attempt.
            stats.retry_count = 1;
        } else {
            stats.retry_count = 2;
            stats.retry_updated = true;

            let mut cw = CW_MIN;
            // Contention time for the first two tries.
            let mut cw_time = slot * (cw / 2);
            cw = CW_MAX.min((cw + 1) * 2);
            cw_time += slot * (cw / 2);
            cw = CW_MAX.min((cw + 1) * 2);

            let mut tx_time = cw_time + (data_tx_time + ack_time) * 2;
            while tx_time < RETRY_TIME_HORIZON && stats.retry_count < MAX_RETRIES_PER_RATE {
                stats.retry_count += 1;
                let backoff = slot * (cw / 2);
                cw = CW_MAX.min((cw + 1) * 2);
                tx_time += backoff + data_tx_time + ack_time;
            }
        }
    }

    fn write_stats(
        &self,
        ctx: &EngineCtx<'_>,
        peer: &PeerCapabilities,
        out: &mut dyn fmt::Write,
    ) -> fmt::Result {
        writeln!(
            out,
            "peer {}: best tp {} / {} best prob {} avg aggr len {:.1}",
            format_addr(&peer.addr),
            self.max_tp_rate,
            self.max_tp_rate2,
            self.max_prob_rate,
            self.avg_ampdu_len,
        )?;
        writeln!(out, "  idx  rate                              prob  ewma  ewmsd  tput       retry  this-window  hist")?;
        for gid in 0..ctx.groups.num_groups() {
            if !self.groups[gid as usize].supported {
                continue;
            }
            for rid in 0..ctx.groups.rates_per_group() {
                let stats = &self.groups[gid as usize].rates[rid as usize];
                if !stats.supported {
                    continue;
                }
                let index = ctx.groups.index(gid, rid);
                let marker = if index == self.max_tp_rate {
                    'A'
                } else if index == self.max_tp_rate2 {
                    'B'
                } else if index == self.max_prob_rate {
                    'P'
                } else {
                    ' '
                };
                writeln!(
                    out,
                    "{} {:4}  {:32}  {:4.0}  {:4.0}  {:5.1}  {:9.0}  {:5}  {:5}/{:<5}  {}/{}",
                    marker,
                    index,
                    format!("{}", ctx.groups.group(gid).tx_vector(rid)),
                    stats.prob,
                    stats.ewma_prob,
                    stats.ewmsd_prob,
                    stats.throughput,
                    stats.retry_count,
                    stats.prev_successes,
                    stats.prev_attempts,
                    stats.success_hist,
                    stats.attempt_hist,
                )?;
            }
        }
        Ok(())
    }
}

fn calculate_throughput(tx_time: Duration, ewma_prob: f64) -> f64 {
    // Below 10 % the rate counts for nothing; above 90 % the probability is
    // capped to damp collision-driven fluctuation.
    if ewma_prob < 10.0 {
        0.0
    } else {
        ewma_prob.min(90.0) / tx_time.as_secs_f64()
    }
}

/// Exponentially weighted moving standard deviation of the probability.
fn ewmsd(old_ewmsd: f64, current_prob: f64, ewma_prob: f64, weight: f64) -> f64 {
    let diff = current_prob - ewma_prob;
    let incr = (100.0 - weight) * diff / 100.0;
    let variance = weight * (old_ewmsd * old_ewmsd + diff * incr) / 100.0;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        wlan_common::{
            ie::{ChanWidthSet, HtCapabilities},
            phy::{Band, GuardInterval},
            test_utils::fake_capabilities::{fake_ht_capabilities, fake_legacy_rates},
            time::ManualClock,
        },
    };

    const PEER: MacAddr = [2, 2, 2, 2, 2, 2];

    fn local_phy() -> LocalPhy {
        LocalPhy {
            band: Band::FiveGhz,
            cbw: Cbw::Cbw40,
            max_tx_streams: 4,
            sgi_supported: true,
            ht_supported: true,
            ..LocalPhy::default()
        }
    }

    fn ht_peer() -> PeerCapabilities {
        let mut peer = PeerCapabilities::new(PEER);
        peer.rates = fake_legacy_rates();
        peer.ht = Some(fake_ht_capabilities());
        peer.cbw = Cbw::Cbw40;
        peer.sgi = true;
        peer.streams = 2;
        peer.qos = true;
        peer
    }

    fn selector_with(clock: &ManualClock, local: LocalPhy) -> MinstrelHtSelector {
        MinstrelHtSelector::new(
            MinstrelHtConfig::default(),
            Rc::new(local),
            Rc::new(clock.clone()),
        )
    }

    fn init_ht_peer(selector: &mut MinstrelHtSelector, peer: &PeerCapabilities) -> PeerHandle {
        let handle = selector.create_peer_state(peer);
        // Any vector query or outcome report takes the init transition.
        let _ = selector.data_tx_vector(peer, handle, Cbw::Cbw40);
        handle
    }

    #[test]
    fn group_support_follows_peer_capabilities() {
        let clock = ManualClock::new();
        let mut selector = selector_with(&clock, local_phy());
        let peer = ht_peer();
        let handle = init_ht_peer(&mut selector, &peer);

        let ht = match &selector.peers[handle.index()] {
            PeerState::HtInitialized(ht) => ht,
            _ => panic!("peer should be HT initialized"),
        };
        for gid in 0..selector.groups.num_groups() {
            let group = selector.groups.group(gid);
            let expect = group.nss <= 2;
            assert_eq!(
                ht.groups[gid as usize].supported,
                expect,
                "group {} ({} nss, {} ns GI, {} MHz)",
                gid,
                group.nss,
                group.gi.nanos(),
                group.cbw.mhz(),
            );
        }
        // Both guard intervals and both widths appear among the supported
        // groups.
        let supported: Vec<_> = (0..selector.groups.num_groups())
            .filter(|gid| ht.groups[*gid as usize].supported)
            .map(|gid| selector.groups.group(gid))
            .collect();
        assert!(supported.iter().any(|g| g.gi == GuardInterval::Ns400));
        assert!(supported.iter().any(|g| g.gi == GuardInterval::Ns800));
        assert!(supported.iter().any(|g| g.cbw == Cbw::Cbw20));
        assert!(supported.iter().any(|g| g.cbw == Cbw::Cbw40));

        // The lowest supported rate is 1-stream/long-GI/20 MHz/MCS 0.
        let ctx = selector.ctx();
        let lowest = ht.lowest_index(&ctx);
        let group = selector.groups.group(selector.groups.group_id(lowest));
        assert_eq!(group.nss, 1);
        assert_eq!(group.gi, GuardInterval::Ns800);
        assert_eq!(group.cbw, Cbw::Cbw20);
        assert_eq!(selector.groups.rate_id(lowest), 0);
    }

    #[test]
    #[should_panic(expected = "no supported rate groups")]
    fn zero_supported_groups_is_fatal() {
        let clock = ManualClock::new();
        let mut selector = selector_with(&clock, local_phy());
        let mut peer = ht_peer();
        // An HT peer with an empty MCS bitmask shares no usable rate.
        peer.ht = Some(HtCapabilities {
            chan_width_set: ChanWidthSet::TWENTY_FORTY,
            sgi_20: true,
            sgi_40: true,
            rx_mcs_bitmask: 0,
        });
        let handle = selector.create_peer_state(&peer);
        let _ = selector.data_tx_vector(&peer, handle, Cbw::Cbw40);
    }

    #[test]
    fn ewma_bootstrap_and_throughput_floor() {
        let clock = ManualClock::new();
        let mut selector = selector_with(&clock, local_phy());
        let peer = ht_peer();
        let handle = init_ht_peer(&mut selector, &peer);

        // The window lands on whatever rate is current when reported.
        let rate_r = match &selector.peers[handle.index()] {
            PeerState::HtInitialized(ht) => ht.txrate,
            _ => unreachable!(),
        };
        let vector = selector.data_tx_vector(&peer, handle, Cbw::Cbw40);
        // One window: 21 attempts, 1 success.
        selector.report_ampdu_status(&peer, handle, 1, 20, 20.0, &vector);

        // Cross the update interval and fold the window in.
        clock.advance(Duration::from_millis(150));
        let now = clock.now();
        {
            let ctx = EngineCtx { config: &selector.config, groups: &selector.groups };
            match &mut selector.peers[handle.index()] {
                PeerState::HtInitialized(ht) => ht.update_stats(&ctx, now),
                _ => unreachable!(),
            }
        }

        let ctx = selector.ctx();
        let ht = match &selector.peers[handle.index()] {
            PeerState::HtInitialized(ht) => ht,
            _ => unreachable!(),
        };
        let stats = ht.stats(&ctx, rate_r);
        let expected = 100.0 * 1.0 / 21.0;
        assert!((stats.prob - expected).abs() < 1e-9, "prob {} != {}", stats.prob, expected);
        // First observation: EWMA set directly, no smoothing.
        assert!((stats.ewma_prob - expected).abs() < 1e-9);
        // 4.76 % is below the 10 % floor.
        assert_eq!(stats.throughput, 0.0);
    }

    #[test]
    fn retry_budget_matches_chain_and_corruption_is_fatal() {
        let clock = ManualClock::new();
        let mut selector = selector_with(&clock, local_phy());
        let peer = ht_peer();
        let handle = init_ht_peer(&mut selector, &peer);

        let (budget, is_sampling) = {
            let ctx = selector.ctx();
            match &selector.peers[handle.index()] {
                PeerState::HtInitialized(ht) => (ht.count_retries(&ctx), ht.is_sampling),
                _ => unreachable!(),
            }
        };
        assert!(!is_sampling);
        assert_eq!(budget, selector.retry_budget(handle));

        // The chain entries of a fresh peer are one attempt each.
        let ctx = selector.ctx();
        let sum = match &selector.peers[handle.index()] {
            PeerState::HtInitialized(ht) => {
                ht.rate_retry_count(&ctx, ht.max_tp_rate)
                    + ht.rate_retry_count(&ctx, ht.max_tp_rate2)
                    + ht.rate_retry_count(&ctx, ht.max_prob_rate)
            }
            _ => unreachable!(),
        };
        assert_eq!(budget, sum);
    }

    #[test]
    #[should_panic(expected = "retry chain exhausted")]
    fn corrupted_long_retry_hits_the_fatal_path() {
        let clock = ManualClock::new();
        let mut selector = selector_with(&clock, local_phy());
        let peer = ht_peer();
        let handle = init_ht_peer(&mut selector, &peer);

        let budget = selector.retry_budget(handle);
        match &mut selector.peers[handle.index()] {
            PeerState::HtInitialized(ht) => ht.long_retry = budget,
            _ => unreachable!(),
        }
        selector.report_data_failed(&peer, handle);
    }

    #[test]
    fn sample_cursor_stays_on_supported_groups() {
        let clock = ManualClock::new();
        let mut selector = selector_with(&clock, local_phy());
        let peer = ht_peer();
        let handle = init_ht_peer(&mut selector, &peer);

        let ctx = EngineCtx { config: &selector.config, groups: &selector.groups };
        let ht = match &mut selector.peers[handle.index()] {
            PeerState::HtInitialized(ht) => ht,
            _ => unreachable!(),
        };
        for _ in 0..200 {
            let index = ht.next_sample(&ctx);
            let gid = ctx.groups.group_id(index);
            assert!(ht.groups[gid as usize].supported);
            assert!(ctx.groups.group(gid).nss <= 2);
        }
    }

    #[test]
    fn width_clamp_halves_to_a_compatible_group() {
        let clock = ManualClock::new();
        let mut selector = selector_with(&clock, local_phy());
        let peer = ht_peer();
        let handle = init_ht_peer(&mut selector, &peer);

        // Force the current rate into a 40 MHz group.
        {
            let gid = selector
                .groups
                .group_id_for(WlanPhyType::Ht, 1, GuardInterval::Ns800, Cbw::Cbw40)
                .unwrap();
            let index = selector.groups.index(gid, 0);
            match &mut selector.peers[handle.index()] {
                PeerState::HtInitialized(ht) => ht.txrate = index,
                _ => unreachable!(),
            }
        }
        let vector = selector.data_tx_vector(&peer, handle, Cbw::Cbw20);
        assert_eq!(vector.cbw(), Cbw::Cbw20);
        assert_eq!(vector.nss(), 1);
        assert_eq!(vector.gi(), GuardInterval::Ns800);

        // Without the constraint the 40 MHz choice stands.
        let vector = selector.data_tx_vector(&peer, handle, Cbw::Cbw40);
        assert_eq!(vector.cbw(), Cbw::Cbw40);
    }

    #[test]
    #[should_panic(expected = "inconsistent group selected")]
    fn capability_mismatch_is_fatal() {
        let clock = ManualClock::new();
        let mut selector = selector_with(&clock, local_phy());
        let mut peer = ht_peer();
        let handle = init_ht_peer(&mut selector, &peer);

        // The peer "loses" its short-GI support after the table was built;
        // a short-GI choice must now abort.
        {
            let gid = selector
                .groups
                .group_id_for(WlanPhyType::Ht, 1, GuardInterval::Ns400, Cbw::Cbw20)
                .unwrap();
            let index = selector.groups.index(gid, 0);
            match &mut selector.peers[handle.index()] {
                PeerState::HtInitialized(ht) => ht.txrate = index,
                _ => unreachable!(),
            }
        }
        peer.sgi = false;
        let _ = selector.data_tx_vector(&peer, handle, Cbw::Cbw40);
    }

    #[test]
    fn non_ht_peers_are_delegated() {
        let clock = ManualClock::new();
        let mut selector = selector_with(&clock, local_phy());
        let mut peer = PeerCapabilities::new(PEER);
        peer.rates = fake_legacy_rates();
        let handle = selector.create_peer_state(&peer);

        let vector = selector.data_tx_vector(&peer, handle, Cbw::Cbw20);
        assert!(matches!(
            vector.phy(),
            WlanPhyType::Dsss | WlanPhyType::Cck | WlanPhyType::Erp
        ));
        // Outcome reports flow through without touching HT state.
        selector.report_data_failed(&peer, handle);
        selector.report_data_ok(&peer, handle, 20.0, 25.0, Cbw::Cbw20, 1);
        assert!(matches!(selector.peers[handle.index()], PeerState::NonHt));
    }

    #[test]
    fn rts_rate_respects_the_reference_bound() {
        let clock = ManualClock::new();
        let mut selector = selector_with(&clock, local_phy());
        let peer = ht_peer();
        let handle = init_ht_peer(&mut selector, &peer);

        // Fresh peers start at MCS 0, whose non-HT reference is 6 Mbps.
        let basic = [SupportedRate(12).with_basic(true), SupportedRate(48).with_basic(true)];
        let rts = selector.rts_tx_vector(&peer, handle, &basic);
        assert_eq!(rts.erp_rate(), Some(SupportedRate(12)));
    }

    #[test]
    fn aggregation_is_withheld_while_sampling() {
        let clock = ManualClock::new();
        let mut selector = selector_with(&clock, local_phy());
        let peer = ht_peer();
        let handle = init_ht_peer(&mut selector, &peer);

        match &mut selector.peers[handle.index()] {
            PeerState::HtInitialized(ht) => ht.is_sampling = true,
            _ => unreachable!(),
        }
        let vector = selector.data_tx_vector(&peer, handle, Cbw::Cbw40);
        assert!(!vector.aggregation());

        match &mut selector.peers[handle.index()] {
            PeerState::HtInitialized(ht) => ht.is_sampling = false,
            _ => unreachable!(),
        }
        let vector = selector.data_tx_vector(&peer, handle, Cbw::Cbw40);
        assert!(vector.aggregation());
    }

    #[test]
    fn stats_refresh_tracks_a_good_rate() {
        let clock = ManualClock::new();
        let mut selector = selector_with(&clock, local_phy());
        let peer = ht_peer();
        let handle = init_ht_peer(&mut selector, &peer);

        // Several intervals of clean aggregates on whatever rate is
        // current; throughput should accumulate on some rate and the best
        // triple should point at supported rates.
        for _ in 0..5 {
            let vector = selector.data_tx_vector(&peer, handle, Cbw::Cbw40);
            selector.report_ampdu_status(&peer, handle, 16, 0, 25.0, &vector);
            clock.advance(Duration::from_millis(120));
        }
        let ctx = selector.ctx();
        let ht = match &selector.peers[handle.index()] {
            PeerState::HtInitialized(ht) => ht,
            _ => unreachable!(),
        };
        assert!(ht.stats(&ctx, ht.max_tp_rate).supported);
        assert!(ht.stats(&ctx, ht.max_prob_rate).supported);
        assert!(ht.stats(&ctx, ht.max_tp_rate).throughput > 0.0);
        assert!(ht.avg_ampdu_len > 1.0);
    }

    #[test]
    fn throughput_floor_and_ceiling() {
        let tx_time = Duration::from_micros(100);
        // Below 10 % a rate counts for nothing.
        assert_eq!(calculate_throughput(tx_time, 9.9), 0.0);
        // In between, the probability passes through untouched.
        assert_eq!(calculate_throughput(tx_time, 50.0), 50.0 / tx_time.as_secs_f64());
        // Above 90 % the probability is capped at 90.
        assert_eq!(calculate_throughput(tx_time, 95.0), 90.0 / tx_time.as_secs_f64());
    }

    #[test]
    fn stats_dump_lists_supported_rates() {
        let clock = ManualClock::new();
        let mut selector = selector_with(&clock, local_phy());
        let peer = ht_peer();
        let handle = init_ht_peer(&mut selector, &peer);

        let mut dump = String::new();
        selector.write_stats(&peer, handle, &mut dump).unwrap();
        assert!(dump.contains("best tp"));
        assert!(dump.contains("Ht mcs 0"));
    }
}
