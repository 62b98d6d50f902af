// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The rate-group table: every (modulation class, streams, guard interval,
//! channel width) combination the local device could ever transmit with,
//! each holding its per-MCS airtime. Built once per engine and shared
//! read-only by all peers; unsupported combinations keep their slot so group
//! ids stay stable.

use {
    crate::device::LocalPhy,
    std::time::Duration,
    wlan_common::{
        airtime,
        phy::{Cbw, GuardInterval, WlanPhyType},
        tx_vector::{TxVector, HE_NUM_MCS, HT_NUM_UNIQUE_MCS, VHT_NUM_MCS},
    },
};

pub const MAX_STREAMS: u8 = 4;
pub const HT_RATES_PER_GROUP: u8 = HT_NUM_UNIQUE_MCS;
pub const VHT_RATES_PER_GROUP: u8 = VHT_NUM_MCS;
pub const HE_RATES_PER_GROUP: u8 = HE_NUM_MCS;

const HT_WIDTHS: [Cbw; 2] = [Cbw::Cbw20, Cbw::Cbw40];
const VHT_WIDTHS: [Cbw; 4] = [Cbw::Cbw20, Cbw::Cbw40, Cbw::Cbw80, Cbw::Cbw160];
const HE_WIDTHS: [Cbw; 4] = [Cbw::Cbw20, Cbw::Cbw40, Cbw::Cbw80, Cbw::Cbw160];
const HT_VHT_GIS: [GuardInterval; 2] = [GuardInterval::Ns800, GuardInterval::Ns400];
const HE_GIS: [GuardInterval; 3] =
    [GuardInterval::Ns3200, GuardInterval::Ns1600, GuardInterval::Ns800];

/// One bucket of related rates: a fixed modulation class, stream count,
/// guard interval and width, with per-MCS transmit times for the first and
/// for subsequent MPDUs of an aggregate.
#[derive(Debug, Clone)]
pub struct McsGroup {
    pub phy: WlanPhyType,
    pub nss: u8,
    pub gi: GuardInterval,
    pub cbw: Cbw,
    /// Whether the local device can transmit this combination at all.
    pub supported: bool,
    /// Valid MCS slots in this group (8 HT, 10 VHT, 12 HE).
    pub num_rates: u8,
    first_tx_time: Vec<Duration>,
    middle_tx_time: Vec<Duration>,
}

impl McsGroup {
    /// The transmit vector of one rate in this group.
    pub fn tx_vector(&self, rate_id: u8) -> TxVector {
        let mcs = match self.phy {
            WlanPhyType::Ht => (self.nss - 1) * HT_NUM_UNIQUE_MCS + rate_id,
            _ => rate_id,
        };
        // Every enumerated (class, gi, cbw, nss, mcs) combination is
        // PHY-valid by construction.
        TxVector::new(self.phy, self.gi, self.cbw, self.nss, mcs)
            .expect("group table enumerates only valid vectors")
    }

    pub fn first_tx_time(&self, rate_id: u8) -> Duration {
        self.first_tx_time[rate_id as usize]
    }

    pub fn middle_tx_time(&self, rate_id: u8) -> Duration {
        self.middle_tx_time[rate_id as usize]
    }
}

pub struct GroupList {
    groups: Vec<McsGroup>,
    rates_per_group: u8,
}

impl GroupList {
    /// Enumerates the full group grid for every amendment the local device
    /// speaks, widths doubling from 20 MHz to the class ceiling.
    /// `frame_len` is the reference MPDU length behind the airtime tables.
    pub fn new(local: &LocalPhy, frame_len: u32) -> Self {
        let rates_per_group = if local.he_supported {
            HE_RATES_PER_GROUP
        } else if local.vht_supported {
            VHT_RATES_PER_GROUP
        } else {
            HT_RATES_PER_GROUP
        };
        let mut groups = Vec::new();
        if local.ht_supported {
            for cbw in HT_WIDTHS.iter() {
                for gi in HT_VHT_GIS.iter() {
                    for nss in 1..=MAX_STREAMS {
                        groups.push(Self::build_group(
                            local,
                            WlanPhyType::Ht,
                            nss,
                            *gi,
                            *cbw,
                            HT_RATES_PER_GROUP,
                            frame_len,
                        ));
                    }
                }
            }
        }
        if local.vht_supported {
            for cbw in VHT_WIDTHS.iter() {
                for gi in HT_VHT_GIS.iter() {
                    for nss in 1..=MAX_STREAMS {
                        groups.push(Self::build_group(
                            local,
                            WlanPhyType::Vht,
                            nss,
                            *gi,
                            *cbw,
                            VHT_RATES_PER_GROUP,
                            frame_len,
                        ));
                    }
                }
            }
        }
        if local.he_supported {
            for cbw in HE_WIDTHS.iter() {
                for gi in HE_GIS.iter() {
                    for nss in 1..=MAX_STREAMS {
                        groups.push(Self::build_group(
                            local,
                            WlanPhyType::He,
                            nss,
                            *gi,
                            *cbw,
                            HE_RATES_PER_GROUP,
                            frame_len,
                        ));
                    }
                }
            }
        }
        Self { groups, rates_per_group }
    }

    fn build_group(
        local: &LocalPhy,
        phy: WlanPhyType,
        nss: u8,
        gi: GuardInterval,
        cbw: Cbw,
        num_rates: u8,
        frame_len: u32,
    ) -> McsGroup {
        let gi_ok = match phy {
            WlanPhyType::He => gi >= local.he_gi,
            _ => !gi.is_short() || local.sgi_supported,
        };
        let supported = gi_ok && cbw <= local.cbw && nss <= local.max_tx_streams;
        let mut group = McsGroup {
            phy,
            nss,
            gi,
            cbw,
            supported,
            num_rates,
            first_tx_time: Vec::with_capacity(num_rates as usize),
            middle_tx_time: Vec::with_capacity(num_rates as usize),
        };
        for rate_id in 0..num_rates {
            let vector = group.tx_vector(rate_id);
            group.first_tx_time.push(airtime::mpdu_tx_time_first(&vector, frame_len));
            group.middle_tx_time.push(airtime::mpdu_tx_time_middle(&vector, frame_len));
        }
        group
    }

    pub fn num_groups(&self) -> u8 {
        self.groups.len() as u8
    }

    pub fn rates_per_group(&self) -> u8 {
        self.rates_per_group
    }

    pub fn group(&self, group_id: u8) -> &McsGroup {
        &self.groups[group_id as usize]
    }

    /// Global rate index of (group, rate).
    pub fn index(&self, group_id: u8, rate_id: u8) -> u16 {
        group_id as u16 * self.rates_per_group as u16 + rate_id as u16
    }

    pub fn group_id(&self, index: u16) -> u8 {
        (index / self.rates_per_group as u16) as u8
    }

    pub fn rate_id(&self, index: u16) -> u8 {
        (index % self.rates_per_group as u16) as u8
    }

    pub fn first_tx_time(&self, index: u16) -> Duration {
        self.group(self.group_id(index)).first_tx_time(self.rate_id(index))
    }

    /// Finds the group with the same class, streams and guard interval at a
    /// different width, if the grid holds one.
    pub fn group_id_for(
        &self,
        phy: WlanPhyType,
        nss: u8,
        gi: GuardInterval,
        cbw: Cbw,
    ) -> Option<u8> {
        self.groups
            .iter()
            .position(|g| g.phy == phy && g.nss == nss && g.gi == gi && g.cbw == cbw)
            .map(|pos| pos as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wlan_common::phy::Band;

    fn ht_local() -> LocalPhy {
        LocalPhy {
            band: Band::FiveGhz,
            cbw: Cbw::Cbw40,
            max_tx_streams: 4,
            sgi_supported: true,
            ht_supported: true,
            ..LocalPhy::default()
        }
    }

    #[test]
    fn ht_grid_shape() {
        let groups = GroupList::new(&ht_local(), 1200);
        // 2 widths x 2 guard intervals x 4 stream counts.
        assert_eq!(groups.num_groups(), 16);
        assert_eq!(groups.rates_per_group(), 8);
        assert!(groups.groups.iter().all(|g| g.supported));
    }

    #[test]
    fn unsupported_combinations_keep_their_slot() {
        let mut local = ht_local();
        local.cbw = Cbw::Cbw20;
        local.max_tx_streams = 2;
        let groups = GroupList::new(&local, 1200);
        assert_eq!(groups.num_groups(), 16);
        let forty = groups.groups.iter().filter(|g| g.cbw == Cbw::Cbw40).count();
        assert_eq!(forty, 8);
        assert!(groups.groups.iter().filter(|g| g.cbw == Cbw::Cbw40).all(|g| !g.supported));
        assert!(groups.groups.iter().filter(|g| g.nss > 2).all(|g| !g.supported));
    }

    #[test]
    fn index_roundtrip() {
        let groups = GroupList::new(&ht_local(), 1200);
        for gid in 0..groups.num_groups() {
            for rid in 0..groups.rates_per_group() {
                let index = groups.index(gid, rid);
                assert_eq!(groups.group_id(index), gid);
                assert_eq!(groups.rate_id(index), rid);
            }
        }
    }

    #[test]
    fn group_zero_is_single_stream_long_gi_20mhz() {
        let groups = GroupList::new(&ht_local(), 1200);
        let first = groups.group(0);
        assert_eq!(first.phy, WlanPhyType::Ht);
        assert_eq!(first.nss, 1);
        assert_eq!(first.gi, GuardInterval::Ns800);
        assert_eq!(first.cbw, Cbw::Cbw20);
    }

    #[test]
    fn wider_groups_are_faster() {
        let groups = GroupList::new(&ht_local(), 1200);
        let narrow = groups.group_id_for(WlanPhyType::Ht, 1, GuardInterval::Ns800, Cbw::Cbw20);
        let wide = groups.group_id_for(WlanPhyType::Ht, 1, GuardInterval::Ns800, Cbw::Cbw40);
        let (narrow, wide) = (narrow.unwrap(), wide.unwrap());
        assert!(groups.group(wide).first_tx_time(0) < groups.group(narrow).first_tx_time(0));
    }

    #[test]
    fn he_grid_uses_he_guard_intervals() {
        let local = LocalPhy {
            band: Band::FiveGhz,
            cbw: Cbw::Cbw160,
            max_tx_streams: 2,
            sgi_supported: true,
            he_gi: GuardInterval::Ns800,
            ht_supported: true,
            vht_supported: true,
            he_supported: true,
            ..LocalPhy::default()
        };
        let groups = GroupList::new(&local, 1200);
        // HT: 2x2x4, VHT: 4x2x4, HE: 4x3x4 groups.
        assert_eq!(groups.num_groups(), 16 + 32 + 48);
        assert_eq!(groups.rates_per_group(), 12);
        let he = groups.group_id_for(WlanPhyType::He, 1, GuardInterval::Ns3200, Cbw::Cbw20);
        assert!(he.is_some());
        assert!(groups.group(he.unwrap()).supported);
    }
}
