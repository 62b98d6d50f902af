// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Local device capability snapshot: the PHY mode/MCS enumeration and
//! ceilings that rate selection validates every choice against. Populated
//! once by the caller from its device model and shared read-only.

use wlan_common::{
    ie::SupportedRate,
    phy::{Band, Cbw, GuardInterval},
};

#[derive(Debug, Clone)]
pub struct LocalPhy {
    pub band: Band,
    /// Operating channel width.
    pub cbw: Cbw,
    pub max_tx_streams: u8,
    /// Short (400 ns) guard interval support for HT/VHT.
    pub sgi_supported: bool,
    /// Shortest HE guard interval the device transmits with.
    pub he_gi: GuardInterval,
    pub ht_supported: bool,
    pub vht_supported: bool,
    pub he_supported: bool,
    /// Legacy (DSSS/CCK/ERP) modes in ascending rate order, basic bits set
    /// on the locally configured basic set.
    pub legacy_rates: Vec<SupportedRate>,
}

impl LocalPhy {
    /// The lowest-rate legacy mode, the floor for broadcast and management
    /// traffic.
    pub fn lowest_rate(&self) -> SupportedRate {
        self.legacy_rates
            .iter()
            .copied()
            .min_by_key(|r| r.rate())
            .expect("local device advertises at least one legacy rate")
    }

    pub fn basic_rates(&self) -> Vec<SupportedRate> {
        self.legacy_rates.iter().copied().filter(|r| r.basic()).collect()
    }
}

impl Default for LocalPhy {
    fn default() -> Self {
        Self {
            band: Band::FiveGhz,
            cbw: Cbw::Cbw20,
            max_tx_streams: 1,
            sgi_supported: false,
            he_gi: GuardInterval::Ns3200,
            ht_supported: false,
            vht_supported: false,
            he_supported: false,
            legacy_rates: [12u8, 18, 24, 36, 48, 72, 96, 108]
                .iter()
                .enumerate()
                .map(|(i, r)| SupportedRate(*r).with_basic(i == 0))
                .collect(),
        }
    }
}
