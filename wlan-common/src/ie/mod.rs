// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Decoded capability elements as advertised by peers. Frame-level
//! (de)serialization happens elsewhere; these are the post-decode views the
//! rate-selection subsystem consumes.

mod intersect;

pub use intersect::*;

use crate::phy::GuardInterval;

/// A legacy (DSSS/CCK/ERP) rate in units of 0.5 Mbps, with the basic-rate
/// bit in the MSB as encoded in the Supported Rates element.
/// IEEE Std 802.11-2016, 9.4.2.3
#[derive(PartialEq, Eq, Hash, Clone, Copy)]
pub struct SupportedRate(pub u8);

impl SupportedRate {
    pub fn rate(&self) -> u8 {
        self.0 & 0x7F
    }

    pub fn basic(&self) -> bool {
        self.0 & 0x80 != 0
    }

    pub fn with_basic(self, basic: bool) -> Self {
        Self(self.rate() | if basic { 0x80 } else { 0 })
    }

    pub fn data_rate_bps(&self) -> u64 {
        self.rate() as u64 * 500_000
    }
}

impl std::fmt::Debug for SupportedRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{} Mbps", if self.basic() { "basic " } else { "" }, self.rate() as f32 / 2.0)
    }
}

/// Supported Channel Width Set subfield of the HT Capability Info field.
#[derive(Debug, PartialEq, PartialOrd, Clone, Copy)]
pub struct ChanWidthSet(pub u8);

impl ChanWidthSet {
    pub const TWENTY_ONLY: Self = Self(0);
    pub const TWENTY_FORTY: Self = Self(1);
}

/// Decoded HT Capabilities element.
/// IEEE Std 802.11-2016, 9.4.2.56
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HtCapabilities {
    pub chan_width_set: ChanWidthSet,
    pub sgi_20: bool,
    pub sgi_40: bool,
    /// Rx MCS bitmask for MCS 0-31, bit N set iff MCS N is supported.
    pub rx_mcs_bitmask: u32,
}

impl HtCapabilities {
    pub fn supports_mcs(&self, mcs: u8) -> bool {
        mcs < 32 && self.rx_mcs_bitmask & (1 << mcs) != 0
    }

    /// Highest spatial stream count admitted by the MCS bitmask. HT MCS
    /// 0-7 are single stream, 8-15 two streams, and so on.
    pub fn max_streams(&self) -> u8 {
        for nss in (1..=4).rev() {
            let lane = (self.rx_mcs_bitmask >> ((nss - 1) * 8)) & 0xFF;
            if lane != 0 {
                return nss;
            }
        }
        1
    }
}

/// Per-stream Rx MCS map shared by the VHT and HE capability elements:
/// two bits per stream count, `0b11` meaning no support at that count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxMcsMap(pub u16);

pub const MCS_MAP_NOT_SUPPORTED: u8 = 3;

impl RxMcsMap {
    fn lane(&self, nss: u8) -> u8 {
        debug_assert!((1..=8).contains(&nss));
        ((self.0 >> ((nss - 1) * 2)) & 0b11) as u8
    }

    /// Highest MCS index usable at the given stream count, if any. The
    /// meaning of the two-bit lane differs per amendment, so the caller
    /// supplies the decode table base (7 for VHT: 0b00 -> MCS 0-7; 7 for
    /// HE with stride 2: 0b00 -> MCS 0-7, 0b01 -> 0-9, 0b10 -> 0-11).
    pub fn max_mcs(&self, nss: u8, base: u8, stride: u8) -> Option<u8> {
        match self.lane(nss) {
            MCS_MAP_NOT_SUPPORTED => None,
            lane => Some(base + lane * stride),
        }
    }

    pub fn max_streams(&self, base: u8, stride: u8) -> u8 {
        for nss in (1..=4).rev() {
            if self.max_mcs(nss, base, stride).is_some() {
                return nss;
            }
        }
        1
    }
}

/// Decoded VHT Capabilities element.
/// IEEE Std 802.11-2016, 9.4.2.158
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VhtCapabilities {
    /// Supported Channel Width Set: 0 admits up to 80 MHz, 1 and 2 admit
    /// 160 MHz operation.
    pub supported_cbw_set: u8,
    pub sgi_80: bool,
    pub sgi_160: bool,
    pub rx_mcs_map: RxMcsMap,
}

impl VhtCapabilities {
    pub fn max_mcs(&self, nss: u8) -> Option<u8> {
        // 0b00 -> MCS 0-7, 0b01 -> 0-8, 0b10 -> 0-9
        self.rx_mcs_map.max_mcs(nss, 7, 1)
    }

    pub fn max_streams(&self) -> u8 {
        self.rx_mcs_map.max_streams(7, 1)
    }
}

/// Decoded HE Capabilities element. The channel width set bits are
/// band-dependent; see the registry's recording logic.
/// IEEE Std 802.11ax-2021, 9.4.2.248
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeCapabilities {
    /// Raw Supported Channel Width Set subfield of the HE PHY capabilities.
    /// Bit 0: 40 MHz in 2.4 GHz; bit 1: 40/80 MHz in 5/6 GHz; bit 2:
    /// 160 MHz in 5/6 GHz.
    pub chan_width_set: u8,
    pub rx_mcs_map: RxMcsMap,
    /// Shortest guard interval the peer receives; 800 ns on capable
    /// hardware, relaxed to 1600/3200 ns otherwise.
    pub gi: GuardInterval,
}

impl HeCapabilities {
    pub fn max_mcs(&self, nss: u8) -> Option<u8> {
        // 0b00 -> MCS 0-7, 0b01 -> 0-9, 0b10 -> 0-11
        self.rx_mcs_map.max_mcs(nss, 7, 2)
    }

    pub fn max_streams(&self) -> u8 {
        self.rx_mcs_map.max_streams(7, 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_rate_fields() {
        let rate = SupportedRate(0x8C);
        assert_eq!(rate.rate(), 12);
        assert!(rate.basic());
        assert_eq!(rate.data_rate_bps(), 6_000_000);
        assert!(!rate.with_basic(false).basic());
    }

    #[test]
    fn ht_mcs_bitmask_streams() {
        let two_streams = HtCapabilities {
            chan_width_set: ChanWidthSet::TWENTY_FORTY,
            sgi_20: true,
            sgi_40: true,
            rx_mcs_bitmask: 0x0000_FFFF,
        };
        assert_eq!(two_streams.max_streams(), 2);
        assert!(two_streams.supports_mcs(15));
        assert!(!two_streams.supports_mcs(16));
    }

    #[test]
    fn vht_mcs_map_lanes() {
        // Two streams at MCS 0-9, remaining lanes marked unsupported.
        let map = RxMcsMap(0xFFFA);
        let caps = VhtCapabilities {
            supported_cbw_set: 0,
            sgi_80: true,
            sgi_160: false,
            rx_mcs_map: map,
        };
        assert_eq!(caps.max_mcs(1), Some(9));
        assert_eq!(caps.max_mcs(2), Some(9));
        assert_eq!(caps.max_mcs(3), None);
        assert_eq!(caps.max_streams(), 2);
    }

    #[test]
    fn he_mcs_map_lanes() {
        // One stream at MCS 0-11, others unsupported.
        let map = RxMcsMap(0xFFFE);
        let caps = HeCapabilities { chan_width_set: 0, rx_mcs_map: map, gi: GuardInterval::Ns800 };
        assert_eq!(caps.max_mcs(1), Some(11));
        assert_eq!(caps.max_mcs(2), None);
        assert_eq!(caps.max_streams(), 1);
    }
}
