// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! PHY-level enums: modulation class, guard interval, channel bandwidth and
//! operating band.

/// Modulation class of a transmission, ordered from oldest to newest
/// amendment so that protection rules can compare generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WlanPhyType {
    Dsss,
    Cck,
    Erp,
    Ht,
    Vht,
    He,
}

impl WlanPhyType {
    /// ERP-OFDM or any later amendment; the classes shielded by non-ERP
    /// protection.
    pub fn is_erp_or_newer(&self) -> bool {
        *self >= WlanPhyType::Erp
    }

    /// HT or any later amendment; the classes shielded by non-HT protection.
    pub fn is_ht_or_newer(&self) -> bool {
        *self >= WlanPhyType::Ht
    }
}

/// Guard interval preceding each OFDM symbol. HT/VHT use 800/400 ns, HE uses
/// 3200/1600/800 ns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GuardInterval {
    Ns400,
    Ns800,
    Ns1600,
    Ns3200,
}

impl GuardInterval {
    pub fn nanos(&self) -> u16 {
        match self {
            GuardInterval::Ns400 => 400,
            GuardInterval::Ns800 => 800,
            GuardInterval::Ns1600 => 1600,
            GuardInterval::Ns3200 => 3200,
        }
    }

    pub fn is_short(&self) -> bool {
        *self == GuardInterval::Ns400
    }
}

/// Channel bandwidth of a transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Cbw {
    Cbw20,
    Cbw40,
    Cbw80,
    Cbw160,
}

impl Cbw {
    pub fn mhz(&self) -> u16 {
        match self {
            Cbw::Cbw20 => 20,
            Cbw::Cbw40 => 40,
            Cbw::Cbw80 => 80,
            Cbw::Cbw160 => 160,
        }
    }

    pub fn from_mhz(mhz: u16) -> Option<Self> {
        match mhz {
            20 => Some(Cbw::Cbw20),
            40 => Some(Cbw::Cbw40),
            80 => Some(Cbw::Cbw80),
            160 => Some(Cbw::Cbw160),
            _ => None,
        }
    }

    /// The next narrower standard width, if any.
    pub fn halved(&self) -> Option<Self> {
        match self {
            Cbw::Cbw20 => None,
            Cbw::Cbw40 => Some(Cbw::Cbw20),
            Cbw::Cbw80 => Some(Cbw::Cbw40),
            Cbw::Cbw160 => Some(Cbw::Cbw80),
        }
    }

    /// The next wider standard width, if any.
    pub fn doubled(&self) -> Option<Self> {
        match self {
            Cbw::Cbw20 => Some(Cbw::Cbw40),
            Cbw::Cbw40 => Some(Cbw::Cbw80),
            Cbw::Cbw80 => Some(Cbw::Cbw160),
            Cbw::Cbw160 => None,
        }
    }
}

/// Operating band. HE capability bits are interpreted per band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Band {
    TwoGhz,
    FiveGhz,
    SixGhz,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phy_generation_order() {
        assert!(WlanPhyType::Erp.is_erp_or_newer());
        assert!(WlanPhyType::He.is_erp_or_newer());
        assert!(!WlanPhyType::Cck.is_erp_or_newer());
        assert!(WlanPhyType::Ht.is_ht_or_newer());
        assert!(!WlanPhyType::Erp.is_ht_or_newer());
    }

    #[test]
    fn cbw_halving_chain() {
        let mut cbw = Cbw::Cbw160;
        let mut widths = vec![cbw.mhz()];
        while let Some(next) = cbw.halved() {
            cbw = next;
            widths.push(cbw.mhz());
        }
        assert_eq!(widths, vec![160, 80, 40, 20]);
    }
}
