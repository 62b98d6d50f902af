// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::ie::SupportedRate,
    crate::phy::{Cbw, GuardInterval, WlanPhyType},
    anyhow::{bail, Error},
};

pub const HT_NUM_MCS: u8 = 32; // Only support MCS 0-31
pub const HT_NUM_UNIQUE_MCS: u8 = 8;
pub const VHT_NUM_MCS: u8 = 10;
pub const HE_NUM_MCS: u8 = 12;
pub const ERP_NUM_RATES: u8 = 8;
pub const MAX_NSS: u8 = 4;

const ERP_RATE_LIST: [u8; ERP_NUM_RATES as usize] = [12, 18, 24, 36, 48, 72, 96, 108];

// Non-HT reference rate per unique modulation/coding pair, in 0.5 Mbps
// units. IEEE Std 802.11-2016, Table 10-9; modulations denser than
// 64-QAM 3/4 reference 54 Mbps.
const NON_HT_REFERENCE_RATE: [u8; HT_NUM_UNIQUE_MCS as usize] =
    [12, 24, 36, 48, 72, 96, 108, 108];

/// Preamble format implied by the modulation class and BSS configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preamble {
    Long,
    Short,
    Ht,
    Vht,
    He,
}

impl Preamble {
    pub fn for_transmission(phy: WlanPhyType, short_preamble: bool) -> Self {
        match phy {
            WlanPhyType::Dsss | WlanPhyType::Cck => {
                if short_preamble {
                    Preamble::Short
                } else {
                    Preamble::Long
                }
            }
            WlanPhyType::Erp => Preamble::Long,
            WlanPhyType::Ht => Preamble::Ht,
            WlanPhyType::Vht => Preamble::Vht,
            WlanPhyType::He => Preamble::He,
        }
    }
}

/// Encapsulates parameters for transmitting a packet over a PHY.
///
/// MCS index is defined in
/// * HT: IEEE 802.11-2016 Table 19-27
/// * VHT: IEEE 802.11-2016 Table 21-30
/// * HE: IEEE 802.11ax-2021 Table 27-111
///
/// We extend the definition of MCS index as follows:
/// * For ERP/ERP-OFDM (WlanPhyType::Erp):
///     * 0: BPSK,   1/2 -> Data rate  6 Mbps
///     * 1: BPSK,   3/4 -> Data rate  9 Mbps
///     * 2: QPSK,   1/2 -> Data rate 12 Mbps
///     * 3: QPSK,   3/4 -> Data rate 18 Mbps
///     * 4: 16-QAM, 1/2 -> Data rate 24 Mbps
///     * 5: 16-QAM, 3/4 -> Data rate 36 Mbps
///     * 6: 64-QAM, 2/3 -> Data rate 48 Mbps
///     * 7: 64-QAM, 3/4 -> Data rate 54 Mbps
/// * For DSSS, HR/DSSS, and ERP-DSSS/CCK (WlanPhyType::Dsss and
///   WlanPhyType::Cck):
///     * 0:  2 -> 1   Mbps DSSS
///     * 1:  4 -> 2   Mbps DSSS
///     * 2: 11 -> 5.5 Mbps CCK
///     * 3: 22 -> 11  Mbps CCK
#[derive(PartialEq, Clone, Copy, Debug)]
pub struct TxVector {
    phy: WlanPhyType,
    gi: GuardInterval,
    cbw: Cbw,
    nss: u8,
    mcs_idx: u8,
    tx_power_level: u8,
    preamble: Preamble,
    /// BSS color stamped on HE transmissions, 0 when unset.
    bss_color: u8,
    /// Whether the frame may be sent as part of an A-MPDU.
    aggregation: bool,
}

impl TxVector {
    pub fn new(
        phy: WlanPhyType,
        gi: GuardInterval,
        cbw: Cbw,
        nss: u8,
        mcs_idx: u8,
    ) -> Result<Self, Error> {
        let supported_mcs = match phy {
            WlanPhyType::Dsss => mcs_idx == 0 || mcs_idx == 1,
            WlanPhyType::Cck => mcs_idx == 2 || mcs_idx == 3,
            WlanPhyType::Ht => {
                match gi {
                    GuardInterval::Ns800 | GuardInterval::Ns400 => (),
                    other => bail!("Unsupported GI for HT PHY: {:?}", other),
                }
                match cbw {
                    Cbw::Cbw20 | Cbw::Cbw40 => (),
                    other => bail!("Unsupported CBW for HT PHY: {:?}", other),
                }
                mcs_idx < HT_NUM_MCS
            }
            WlanPhyType::Vht => {
                match gi {
                    GuardInterval::Ns800 | GuardInterval::Ns400 => (),
                    other => bail!("Unsupported GI for VHT PHY: {:?}", other),
                }
                if !(1..=MAX_NSS).contains(&nss) {
                    bail!("Unsupported NSS for VHT PHY: {}", nss);
                }
                mcs_idx < VHT_NUM_MCS
            }
            WlanPhyType::He => {
                match gi {
                    GuardInterval::Ns800 | GuardInterval::Ns1600 | GuardInterval::Ns3200 => (),
                    other => bail!("Unsupported GI for HE PHY: {:?}", other),
                }
                if !(1..=MAX_NSS).contains(&nss) {
                    bail!("Unsupported NSS for HE PHY: {}", nss);
                }
                mcs_idx < HE_NUM_MCS
            }
            WlanPhyType::Erp => mcs_idx < ERP_NUM_RATES,
        };
        if supported_mcs {
            let nss = match phy {
                WlanPhyType::Ht => 1 + mcs_idx / HT_NUM_UNIQUE_MCS,
                WlanPhyType::Vht | WlanPhyType::He => nss,
                _ => 1,
            };
            Ok(Self {
                phy,
                gi,
                cbw,
                nss,
                mcs_idx,
                tx_power_level: 0,
                preamble: Preamble::for_transmission(phy, false),
                bss_color: 0,
                aggregation: false,
            })
        } else {
            bail!("Unsupported MCS {:?} for phy type {:?}", mcs_idx, phy);
        }
    }

    pub fn from_supported_rate(erp_rate: &SupportedRate) -> Result<Self, Error> {
        let (phy, mcs_idx) = match erp_rate.rate() {
            2 => (WlanPhyType::Dsss, 0),
            4 => (WlanPhyType::Dsss, 1),
            11 => (WlanPhyType::Cck, 2),
            22 => (WlanPhyType::Cck, 3),
            12 => (WlanPhyType::Erp, 0),
            18 => (WlanPhyType::Erp, 1),
            24 => (WlanPhyType::Erp, 2),
            36 => (WlanPhyType::Erp, 3),
            48 => (WlanPhyType::Erp, 4),
            72 => (WlanPhyType::Erp, 5),
            96 => (WlanPhyType::Erp, 6),
            108 => (WlanPhyType::Erp, 7),
            other_rate => {
                bail!("Invalid rate {} * 0.5 Mbps for 802.11a/b/g.", other_rate);
            }
        };
        Self::new(phy, GuardInterval::Ns800, Cbw::Cbw20, 1, mcs_idx)
    }

    pub fn phy(&self) -> WlanPhyType {
        self.phy
    }

    pub fn gi(&self) -> GuardInterval {
        self.gi
    }

    pub fn cbw(&self) -> Cbw {
        self.cbw
    }

    pub fn nss(&self) -> u8 {
        self.nss
    }

    pub fn mcs_idx(&self) -> u8 {
        self.mcs_idx
    }

    pub fn tx_power_level(&self) -> u8 {
        self.tx_power_level
    }

    pub fn preamble(&self) -> Preamble {
        self.preamble
    }

    pub fn bss_color(&self) -> u8 {
        self.bss_color
    }

    pub fn aggregation(&self) -> bool {
        self.aggregation
    }

    pub fn with_tx_power_level(mut self, level: u8) -> Self {
        self.tx_power_level = level;
        self
    }

    pub fn with_preamble(mut self, preamble: Preamble) -> Self {
        self.preamble = preamble;
        self
    }

    pub fn with_aggregation(mut self, aggregation: bool) -> Self {
        self.aggregation = aggregation;
        self
    }

    pub fn set_bss_color(&mut self, color: u8) {
        if self.phy == WlanPhyType::He {
            self.bss_color = color;
        }
    }

    pub fn erp_rate(&self) -> Option<SupportedRate> {
        if self.phy == WlanPhyType::Erp {
            Some(SupportedRate(ERP_RATE_LIST[self.mcs_idx as usize]))
        } else {
            None
        }
    }

    /// Non-HT reference rate of this vector, bounding control-response
    /// rates (IEEE Std 802.11-2016, 9.7.9). Legacy vectors reference
    /// themselves; HT and later reference the legacy rate of equal
    /// modulation and coding.
    pub fn non_ht_reference_rate(&self) -> SupportedRate {
        let rate = match self.phy {
            WlanPhyType::Dsss | WlanPhyType::Cck => match self.mcs_idx {
                0 => 2,
                1 => 4,
                2 => 11,
                _ => 22,
            },
            WlanPhyType::Erp => ERP_RATE_LIST[self.mcs_idx as usize],
            WlanPhyType::Ht => {
                NON_HT_REFERENCE_RATE[(self.mcs_idx % HT_NUM_UNIQUE_MCS) as usize]
            }
            WlanPhyType::Vht | WlanPhyType::He => {
                NON_HT_REFERENCE_RATE[self.mcs_idx.min(HT_NUM_UNIQUE_MCS - 1) as usize]
            }
        };
        SupportedRate(rate)
    }
}

impl std::fmt::Display for TxVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} mcs {} nss {} gi {}ns cbw {}MHz",
            self.phy,
            self.mcs_idx,
            self.nss,
            self.gi.nanos(),
            self.cbw.mhz()
        )
    }
}
