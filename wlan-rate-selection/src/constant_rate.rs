// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The simplest rate selector: a fixed configured rate for every peer,
//! ignoring all outcome feedback. Useful as a baseline and in tests.

use {
    crate::{
        device::LocalPhy,
        peer::PeerCapabilities,
        selector::{select_rts_rate, PeerHandle, RateSelector},
    },
    std::rc::Rc,
    wlan_common::{
        ie::SupportedRate,
        phy::Cbw,
        tx_vector::TxVector,
    },
};

#[derive(Debug, Clone)]
pub struct ConstantRateConfig {
    /// Legacy rate used for every unicast data frame, in 0.5 Mbps units.
    pub data_rate: SupportedRate,
}

impl Default for ConstantRateConfig {
    fn default() -> Self {
        Self { data_rate: SupportedRate(12) }
    }
}

pub struct ConstantRateSelector {
    config: ConstantRateConfig,
    local: Rc<LocalPhy>,
    num_peers: usize,
}

impl ConstantRateSelector {
    pub fn new(config: ConstantRateConfig, local: Rc<LocalPhy>) -> Self {
        Self { config, local, num_peers: 0 }
    }

    fn data_vector(&self) -> TxVector {
        TxVector::from_supported_rate(&self.config.data_rate)
            .expect("configured constant rate is a valid legacy rate")
    }
}

impl RateSelector for ConstantRateSelector {
    fn create_peer_state(&mut self, _peer: &PeerCapabilities) -> PeerHandle {
        let handle = PeerHandle(self.num_peers);
        self.num_peers += 1;
        handle
    }

    fn reset(&mut self) {
        self.num_peers = 0;
    }

    fn data_tx_vector(
        &mut self,
        _peer: &PeerCapabilities,
        _handle: PeerHandle,
        _allowed_width: Cbw,
    ) -> TxVector {
        self.data_vector()
    }

    fn rts_tx_vector(
        &mut self,
        peer: &PeerCapabilities,
        _handle: PeerHandle,
        basic_rates: &[SupportedRate],
    ) -> TxVector {
        select_rts_rate(&self.data_vector(), basic_rates, &self.local.legacy_rates, &peer.addr)
    }

    fn report_rts_failed(&mut self, _peer: &PeerCapabilities, _handle: PeerHandle) {}

    fn report_rts_ok(&mut self, _peer: &PeerCapabilities, _handle: PeerHandle, _cts_snr: f64) {}

    fn report_data_failed(&mut self, _peer: &PeerCapabilities, _handle: PeerHandle) {}

    fn report_data_ok(
        &mut self,
        _peer: &PeerCapabilities,
        _handle: PeerHandle,
        _ack_snr: f64,
        _data_snr: f64,
        _cbw: Cbw,
        _nss: u8,
    ) {
    }

    fn report_final_rts_failed(&mut self, _peer: &PeerCapabilities, _handle: PeerHandle) {}

    fn report_final_data_failed(&mut self, _peer: &PeerCapabilities, _handle: PeerHandle) {}

    fn report_ampdu_status(
        &mut self,
        _peer: &PeerCapabilities,
        _handle: PeerHandle,
        _n_success: u16,
        _n_failed: u16,
        _data_snr: f64,
        _vector_used: &TxVector,
    ) {
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_the_configured_rate() {
        let local = Rc::new(LocalPhy::default());
        let mut selector = ConstantRateSelector::new(
            ConstantRateConfig { data_rate: SupportedRate(48) },
            Rc::clone(&local),
        );
        let peer = PeerCapabilities::new([1; 6]);
        let handle = selector.create_peer_state(&peer);

        let vector = selector.data_tx_vector(&peer, handle, Cbw::Cbw20);
        assert_eq!(vector.erp_rate(), Some(SupportedRate(48)));

        selector.report_data_failed(&peer, handle);
        let vector = selector.data_tx_vector(&peer, handle, Cbw::Cbw20);
        assert_eq!(vector.erp_rate(), Some(SupportedRate(48)));
    }

    #[test]
    fn rts_rate_bounded_by_reference() {
        let local = Rc::new(LocalPhy::default());
        let mut selector = ConstantRateSelector::new(
            ConstantRateConfig { data_rate: SupportedRate(48) },
            Rc::clone(&local),
        );
        let peer = PeerCapabilities::new([1; 6]);
        let handle = selector.create_peer_state(&peer);

        // Only 6 Mbps is basic in the default local set; 6 <= 24 so it wins.
        let rts = selector.rts_tx_vector(&peer, handle, &local.basic_rates());
        assert_eq!(rts.erp_rate(), Some(SupportedRate(12)));

        // Without basic rates the full mode list is scanned: highest rate
        // not above 24 Mbps.
        let rts = selector.rts_tx_vector(&peer, handle, &[]);
        assert_eq!(rts.erp_rate(), Some(SupportedRate(48)));
    }
}
