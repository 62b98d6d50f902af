// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Legacy Minstrel rate selection over the peer's usable DSSS/CCK/ERP
//! rates, for peers that never advertised HT or newer. Runs standalone or
//! as the HT engine's delegate.

use {
    crate::{
        device::LocalPhy,
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
        mac::format_addr,
        phy::Cbw,
        time::TimeSource,
        tx_vector::TxVector,
    },
};

const RETRY_TIME_HORIZON: Duration = Duration::from_millis(6);
const LEGACY_CW_MIN: u32 = 31;
const LEGACY_CW_MAX: u32 = 1023;

#[derive(Debug, Clone)]
pub struct MinstrelConfig {
    pub update_interval: Duration,
    /// EWMA history weight in percent, 0-100.
    pub ewma_level: u32,
    pub n_sample_columns: u8,
    /// Reference MPDU length for the airtime estimates.
    pub frame_length: u32,
    /// Share of packets spent probing other rates, percent.
    pub look_around_rate: u64,
    pub print_stats: bool,
}

impl Default for MinstrelConfig {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_millis(100),
            ewma_level: 75,
            n_sample_columns: 10,
            frame_length: 1200,
            look_around_rate: 10,
            print_stats: false,
        }
    }
}

#[derive(Debug, Clone)]
struct LegacyRateStats {
    rate: SupportedRate,
    perfect_tx_time: Duration,
    retry_count: u32,
    adjusted_retry_count: u32,
    attempts: u32,
    successes: u32,
    prev_attempts: u32,
    prev_successes: u32,
    attempt_hist: u64,
    success_hist: u64,
    samples_skipped: u32,
    /// Remaining sample grants for low-value rates; -1 is unlimited.
    sample_limit: i32,
    prob: f64,
    ewma_prob: f64,
    throughput: f64,
}

struct LegacyPeer {
    table: Vec<LegacyRateStats>,
    probe: ProbeSequence,
    sample_row: u8,
    sample_col: u8,
    txrate: usize,
    max_tp_rate: usize,
    max_tp_rate2: usize,
    max_prob_rate: usize,
    short_retry: u32,
    long_retry: u32,
    is_sampling: bool,
    /// A slower-than-best sample rides second in the chain instead of
    /// leading it.
    sample_deferred: bool,
    num_samples_deferred: u64,
    sample_rate: usize,
    total_packets: u64,
    sample_packets: u64,
    next_stats_update: Duration,
}

enum PeerState {
    Uninitialized,
    Initialized(Box<LegacyPeer>),
}

pub struct MinstrelSelector {
    config: MinstrelConfig,
    local: Rc<LocalPhy>,
    clock: Rc<dyn TimeSource>,
    rng: StdRng,
    peers: Vec<PeerState>,
}

impl MinstrelSelector {
    pub fn new(config: MinstrelConfig, local: Rc<LocalPhy>, clock: Rc<dyn TimeSource>) -> Self {
        Self { config, local, clock, rng: StdRng::seed_from_u64(1), peers: Vec::new() }
    }

    fn ensure_init(&mut self, peer: &PeerCapabilities, handle: PeerHandle) {
        if let PeerState::Uninitialized = self.peers[handle.index()] {
            if peer.rates.is_empty() {
                return;
            }
            let now = self.clock.now();
            let state = self.rate_init(peer, now);
            self.peers[handle.index()] = PeerState::Initialized(Box::new(state));
        }
    }

    fn rate_init(&mut self, peer: &PeerCapabilities, now: Duration) -> LegacyPeer {
        let mut table = Vec::with_capacity(peer.rates.len());
        for rate in &peer.rates {
            let vector = TxVector::from_supported_rate(rate)
                .expect("usable peer rates are valid legacy rates");
            let perfect_tx_time = airtime::mpdu_tx_time_first(&vector, self.config.frame_length);
            let mut stats = LegacyRateStats {
                rate: *rate,
                perfect_tx_time,
                retry_count: 1,
                adjusted_retry_count: 1,
                attempts: 0,
                successes: 0,
                prev_attempts: 0,
                prev_successes: 0,
                attempt_hist: 0,
                success_hist: 0,
                samples_skipped: 0,
                sample_limit: -1,
                prob: 0.0,
                ewma_prob: 0.0,
                throughput: 0.0,
            };
            // Grow the retry budget until another attempt would push the
            // worst-case airtime past the horizon.
            for retries in 2..11 {
                if time_unicast_packet(perfect_tx_time, retries) > RETRY_TIME_HORIZON {
                    break;
                }
                stats.retry_count = retries;
                stats.adjusted_retry_count = retries;
            }
            table.push(stats);
        }
        let n_modes = table.len() as u8;
        let probe =
            ProbeSequence::random_new(&mut self.rng, n_modes, self.config.n_sample_columns);
        let mut state = LegacyPeer {
            table,
            probe,
            sample_row: 0,
            sample_col: 0,
            txrate: 0,
            max_tp_rate: 0,
            max_tp_rate2: 0,
            max_prob_rate: 0,
            short_retry: 0,
            long_retry: 0,
            is_sampling: false,
            sample_deferred: false,
            num_samples_deferred: 0,
            sample_rate: 0,
            total_packets: 0,
            sample_packets: 0,
            next_stats_update: now,
        };
        state.update_stats(&self.config, now);
        state
    }
}

/// Worst-case airtime of one packet delivered after `long_retries`
/// retransmissions, backoff included.
fn time_unicast_packet(data_tx_time: Duration, long_retries: u32) -> Duration {
    let mut total = data_tx_time + airtime::SIFS + airtime::ack_tx_time();
    let mut cw = LEGACY_CW_MIN;
    for _ in 0..long_retries {
        total += data_tx_time + airtime::SIFS + airtime::ack_tx_time();
        total += airtime::SLOT_TIME * (cw / 2);
        cw = LEGACY_CW_MAX.min((cw + 1) * 2);
    }
    total
}

impl LegacyPeer {
    fn update_retry(&mut self) {
        self.short_retry = 0;
        self.long_retry = 0;
    }

    fn next_sample(&mut self) -> usize {
        let rate = self.probe.entry(self.sample_row, self.sample_col) as usize;
        self.sample_row += 1;
        if self.sample_row >= self.probe.num_rates() {
            self.sample_row = 0;
            self.sample_col = (self.sample_col + 1) % self.probe.num_columns();
        }
        rate
    }

    fn find_rate(&mut self, config: &MinstrelConfig) -> usize {
        if self.total_packets + self.sample_packets == 0 {
            return 0;
        }

        let spent = self.sample_packets + self.num_samples_deferred / 2;
        let delta =
            (self.total_packets * config.look_around_rate / 100) as i64 - spent as i64;
        if delta < 0 {
            return self.max_tp_rate;
        }

        let n_modes = self.table.len() as i64;
        if delta > n_modes * 2 {
            // With multi-rate retry not every planned sample gets used.
            // Soak up the backlog so a degrading link doesn't trigger a
            // burst of sampling frames.
            self.sample_packets += (delta - n_modes * 2) as u64;
        }

        let sample_idx = self.next_sample();
        self.sample_deferred = false;

        let slower = self.table[sample_idx].perfect_tx_time
            > self.table[self.max_tp_rate].perfect_tx_time;
        if slower && self.table[sample_idx].samples_skipped < 20 {
            // Sample the slower rate from the second chain stage only.
            self.sample_deferred = true;
            self.num_samples_deferred += 1;
            self.is_sampling = true;
            self.sample_rate = sample_idx;
            self.max_tp_rate
        } else if self.table[sample_idx].sample_limit == 0 {
            self.is_sampling = false;
            self.max_tp_rate
        } else {
            self.is_sampling = true;
            self.sample_rate = sample_idx;
            if self.table[sample_idx].sample_limit > 0 {
                self.table[sample_idx].sample_limit -= 1;
            }
            sample_idx
        }
    }

    /// Advances the retry chain after one failed attempt. The legacy chain
    /// ends on the lowest rate instead of aborting.
    fn update_rate(&mut self) {
        self.long_retry += 1;
        self.table[self.txrate].attempts += 1;

        let max_tp = self.table[self.max_tp_rate].adjusted_retry_count;
        let max_tp2 = self.table[self.max_tp_rate2].adjusted_retry_count;
        let max_prob = self.table[self.max_prob_rate].adjusted_retry_count;
        let sample = self.table[self.sample_rate].adjusted_retry_count;

        self.txrate = if !self.is_sampling {
            if self.long_retry < max_tp {
                self.max_tp_rate
            } else if self.long_retry < max_tp + max_tp2 {
                self.max_tp_rate2
            } else if self.long_retry < max_tp + max_tp2 + max_prob {
                self.max_prob_rate
            } else {
                0
            }
        } else if self.sample_deferred {
            if self.long_retry < max_tp {
                self.max_tp_rate
            } else if self.long_retry < max_tp + sample {
                self.sample_rate
            } else if self.long_retry < max_tp + sample + max_prob {
                self.max_prob_rate
            } else {
                0
            }
        } else {
            if self.long_retry < sample {
                self.sample_rate
            } else if self.long_retry < sample + max_tp {
                self.max_tp_rate
            } else if self.long_retry < sample + max_tp + max_prob {
                self.max_prob_rate
            } else {
                0
            }
        };
    }

    fn update_stats(&mut self, config: &MinstrelConfig, now: Duration) {
        self.next_stats_update = now + config.update_interval;
        let ewma_level = config.ewma_level as f64;

        for stats in &mut self.table {
            if stats.attempts > 0 {
                stats.samples_skipped = 0;
                let mut prob = 100.0 * stats.successes as f64 / stats.attempts as f64;
                stats.prob = prob;
                if stats.success_hist == 0 {
                    // First observation: no smoothing.
                    stats.ewma_prob = prob;
                } else {
                    prob = (prob * (100.0 - ewma_level) + stats.ewma_prob * ewma_level) / 100.0;
                    stats.ewma_prob = prob;
                }
                stats.throughput = stats.ewma_prob / stats.perfect_tx_time.as_secs_f64();
                stats.success_hist += stats.successes as u64;
                stats.attempt_hist += stats.attempts as u64;
            } else {
                stats.samples_skipped += 1;
            }
            stats.prev_successes = stats.successes;
            stats.prev_attempts = stats.attempts;
            stats.successes = 0;
            stats.attempts = 0;

            // Rates that nearly always or nearly never work are not worth
            // long retries or frequent samples.
            if stats.ewma_prob > 95.0 || stats.ewma_prob < 10.0 {
                stats.adjusted_retry_count = stats.retry_count.min(2);
                stats.sample_limit = 4;
            } else {
                stats.sample_limit = -1;
                stats.adjusted_retry_count = stats.retry_count;
            }
            if stats.throughput == 0.0 {
                stats.adjusted_retry_count = stats.adjusted_retry_count.min(2);
            }
        }

        let mut max_tp = 0;
        for i in 0..self.table.len() {
            if self.table[i].throughput > self.table[max_tp].throughput {
                max_tp = i;
            }
        }
        let mut max_tp2 = if max_tp == 0 && self.table.len() > 1 { 1 } else { 0 };
        for i in 0..self.table.len() {
            if i != max_tp && self.table[i].throughput > self.table[max_tp2].throughput {
                max_tp2 = i;
            }
        }
        let mut max_prob = 0;
        for i in 0..self.table.len() {
            if self.table[i].ewma_prob >= 95.0 {
                if self.table[i].throughput >= self.table[max_prob].throughput {
                    max_prob = i;
                }
            } else if self.table[i].ewma_prob > self.table[max_prob].ewma_prob {
                max_prob = i;
            }
        }
        self.max_tp_rate = max_tp;
        self.max_tp_rate2 = max_tp2;
        self.max_prob_rate = max_prob;

        if config.print_stats {
            debug!(
                "legacy stats refresh: max tp {} / {} max prob {}",
                self.max_tp_rate, self.max_tp_rate2, self.max_prob_rate,
            );
        }
    }

    fn write_stats(&self, peer: &PeerCapabilities, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(
            out,
            "peer {} (legacy): best tp {} / {} best prob {}",
            format_addr(&peer.addr),
            self.max_tp_rate,
            self.max_tp_rate2,
            self.max_prob_rate,
        )?;
        writeln!(out, "  idx  rate                 prob  ewma  tput       retry  this-window  hist")?;
        for (i, stats) in self.table.iter().enumerate() {
            let marker = if i == self.max_tp_rate {
                'A'
            } else if i == self.max_tp_rate2 {
                'B'
            } else if i == self.max_prob_rate {
                'P'
            } else {
                ' '
            };
            writeln!(
                out,
                "{} {:4}  {:19?}  {:4.0}  {:4.0}  {:9.0}  {:2}/{:<2}  {:5}/{:<5}  {}/{}",
                marker,
                i,
                stats.rate,
                stats.prob,
                stats.ewma_prob,
                stats.throughput,
                stats.adjusted_retry_count,
                stats.retry_count,
                stats.prev_successes,
                stats.prev_attempts,
                stats.success_hist,
                stats.attempt_hist,
            )?;
        }
        Ok(())
    }
}

impl RateSelector for MinstrelSelector {
    fn create_peer_state(&mut self, _peer: &PeerCapabilities) -> PeerHandle {
        let handle = PeerHandle(self.peers.len());
        self.peers.push(PeerState::Uninitialized);
        handle
    }

    fn reset(&mut self) {
        self.peers.clear();
    }

    fn data_tx_vector(
        &mut self,
        peer: &PeerCapabilities,
        handle: PeerHandle,
        _allowed_width: Cbw,
    ) -> TxVector {
        self.ensure_init(peer, handle);
        let rate = match &self.peers[handle.index()] {
            PeerState::Uninitialized => self.local.lowest_rate(),
            PeerState::Initialized(state) => state.table[state.txrate].rate,
        };
        TxVector::from_supported_rate(&rate).expect("rate table holds valid legacy rates")
    }

    fn rts_tx_vector(
        &mut self,
        peer: &PeerCapabilities,
        handle: PeerHandle,
        basic_rates: &[SupportedRate],
    ) -> TxVector {
        let last = self.data_tx_vector(peer, handle, Cbw::Cbw20);
        select_rts_rate(&last, basic_rates, &self.local.legacy_rates, &peer.addr)
    }

    fn report_rts_failed(&mut self, peer: &PeerCapabilities, handle: PeerHandle) {
        self.ensure_init(peer, handle);
        if let PeerState::Initialized(state) = &mut self.peers[handle.index()] {
            state.short_retry += 1;
        }
    }

    fn report_rts_ok(&mut self, _peer: &PeerCapabilities, _handle: PeerHandle, _cts_snr: f64) {}

    fn report_data_failed(&mut self, peer: &PeerCapabilities, handle: PeerHandle) {
        self.ensure_init(peer, handle);
        if let PeerState::Initialized(state) = &mut self.peers[handle.index()] {
            state.total_packets += 1;
            if state.is_sampling {
                state.sample_packets += 1;
            }
            state.update_rate();
        }
    }

    fn report_data_ok(
        &mut self,
        peer: &PeerCapabilities,
        handle: PeerHandle,
        _ack_snr: f64,
        _data_snr: f64,
        _cbw: Cbw,
        _nss: u8,
    ) {
        self.ensure_init(peer, handle);
        let now = self.clock.now();
        let config = &self.config;
        if let PeerState::Initialized(state) = &mut self.peers[handle.index()] {
            state.table[state.txrate].successes += 1;
            state.table[state.txrate].attempts += 1;
            state.total_packets += 1;
            if state.is_sampling {
                state.sample_packets += 1;
            }
            state.is_sampling = false;
            state.sample_deferred = false;
            state.update_retry();
            if now >= state.next_stats_update {
                state.update_stats(config, now);
            }
            state.txrate = state.find_rate(config);
        }
    }

    fn report_final_rts_failed(&mut self, peer: &PeerCapabilities, handle: PeerHandle) {
        self.ensure_init(peer, handle);
        if let PeerState::Initialized(state) = &mut self.peers[handle.index()] {
            state.short_retry = 0;
        }
    }

    fn report_final_data_failed(&mut self, peer: &PeerCapabilities, handle: PeerHandle) {
        self.ensure_init(peer, handle);
        let now = self.clock.now();
        let config = &self.config;
        if let PeerState::Initialized(state) = &mut self.peers[handle.index()] {
            state.is_sampling = false;
            state.sample_deferred = false;
            state.update_retry();
            if now >= state.next_stats_update {
                state.update_stats(config, now);
            }
            state.txrate = state.find_rate(config);
        }
    }

    fn report_ampdu_status(
        &mut self,
        peer: &PeerCapabilities,
        _handle: PeerHandle,
        _n_success: u16,
        _n_failed: u16,
        _data_snr: f64,
        _vector_used: &TxVector,
    ) {
        // Aggregation requires HT; a legacy peer cannot produce this.
        warn!(
            "A-MPDU status for legacy peer {}; ignored",
            format_addr(&peer.addr)
        );
    }

    fn assign_streams(&mut self, seed: u64) -> usize {
        self.rng = StdRng::seed_from_u64(seed);
        1
    }

    fn write_stats(
        &self,
        peer: &PeerCapabilities,
        handle: PeerHandle,
        out: &mut dyn fmt::Write,
    ) -> fmt::Result {
        match &self.peers[handle.index()] {
            PeerState::Uninitialized => {
                writeln!(out, "peer {}: uninitialized", format_addr(&peer.addr))
            }
            PeerState::Initialized(state) => state.write_stats(peer, out),
        }
    }
}
