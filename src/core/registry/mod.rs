// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capture requests for clients.
//!
//! A capture can be requested for a station before it has associated. Such
//! requests wait in the [`UnassocClientRegistry`] and are consumed when the
//! association event arrives. [`CaptureControl`] ties the registry to the
//! bounded table of peers with capture enabled.

use crate::core::capture::types::{CaptureMethod, CaptureParams, MacAddress};
use crate::core::error::{CfrError, CfrResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What `register` does when every registry entry is taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnassocPolicy {
    /// Fail with `CapacityExceeded`
    #[default]
    Reject,
    /// Drop the entry registered longest ago
    EvictOldest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UnassocClientEntry {
    pub mac_address: MacAddress,
    pub capture_params: CaptureParams,
    #[serde(skip)]
    seq: u64,
}

/// Fixed-capacity table of pending capture requests.
#[derive(Debug)]
pub struct UnassocClientRegistry {
    entries: Box<[Option<UnassocClientEntry>]>,
    policy: UnassocPolicy,
    next_seq: u64,
}

impl UnassocClientRegistry {
    pub fn new(capacity: usize, policy: UnassocPolicy) -> Self {
        Self {
            entries: vec![None; capacity].into_boxed_slice(),
            policy,
            next_seq: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn policy(&self) -> UnassocPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn position(&self, mac: MacAddress) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| matches!(e, Some(entry) if entry.mac_address == mac))
    }

    pub fn contains(&self, mac: MacAddress) -> bool {
        self.position(mac).is_some()
    }

    /// Record a pending capture request. An address already present has its
    /// parameters replaced in place.
    pub fn register(&mut self, mac: MacAddress, params: CaptureParams) -> CfrResult<()> {
        if let Some(idx) = self.position(mac) {
            if let Some(entry) = self.entries[idx].as_mut() {
                entry.capture_params = params;
            }
            log::debug!("Updated pending capture request for {}", mac);
            return Ok(());
        }

        let idx = match self.entries.iter().position(Option::is_none) {
            Some(idx) => idx,
            None => match self.policy {
                UnassocPolicy::Reject => {
                    log::warn!("Unassociated client pool full, rejecting {}", mac);
                    return Err(CfrError::capacity_exceeded(
                        "unassociated client pool",
                        self.capacity(),
                    ));
                }
                UnassocPolicy::EvictOldest => {
                    let oldest = self
                        .entries
                        .iter()
                        .enumerate()
                        .filter_map(|(i, e)| e.map(|entry| (i, entry.seq)))
                        .min_by_key(|(_, seq)| *seq)
                        .map(|(i, _)| i);
                    match oldest {
                        Some(idx) => {
                            if let Some(evicted) = self.entries[idx].take() {
                                log::warn!(
                                    "Unassociated client pool full, evicting {} for {}",
                                    evicted.mac_address,
                                    mac
                                );
                            }
                            idx
                        }
                        // Zero-capacity registry
                        None => {
                            return Err(CfrError::capacity_exceeded(
                                "unassociated client pool",
                                0,
                            ))
                        }
                    }
                }
            },
        };

        self.entries[idx] = Some(UnassocClientEntry {
            mac_address: mac,
            capture_params: params,
            seq: self.next_seq,
        });
        self.next_seq += 1;
        log::debug!("Registered pending capture request for {}", mac);
        Ok(())
    }

    /// Take the pending request for a client that just associated.
    pub fn consume_on_association(&mut self, mac: MacAddress) -> Option<CaptureParams> {
        let idx = self.position(mac)?;
        self.entries[idx].take().map(|e| e.capture_params)
    }

    /// Drop a pending request; `false` when none was registered.
    pub fn remove(&mut self, mac: MacAddress) -> bool {
        match self.position(mac) {
            Some(idx) => {
                self.entries[idx] = None;
                true
            }
            None => false,
        }
    }

    pub fn clear_all(&mut self) {
        self.entries.iter_mut().for_each(|e| *e = None);
    }

    /// Pending requests, oldest first
    pub fn entries(&self) -> Vec<UnassocClientEntry> {
        let mut entries: Vec<_> = self.entries.iter().flatten().copied().collect();
        entries.sort_by_key(|e| e.seq);
        entries
    }
}

/// Capture state of one associated peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PeerCaptureConfig {
    pub enabled: bool,
    pub bandwidth: u8,
    pub period: u32,
    pub capture_method: CaptureMethod,
}

impl From<CaptureParams> for PeerCaptureConfig {
    fn from(params: CaptureParams) -> Self {
        Self {
            enabled: true,
            bandwidth: params.bandwidth,
            period: params.period,
            capture_method: params.method,
        }
    }
}

/// Where an `enable` request ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnablePlacement {
    Peer,
    Pending,
}

/// Capture enable/disable control path.
#[derive(Debug)]
pub struct CaptureControl {
    registry: UnassocClientRegistry,
    peers: HashMap<MacAddress, PeerCaptureConfig>,
    max_sta_count: usize,
}

impl CaptureControl {
    pub fn new(registry: UnassocClientRegistry, max_sta_count: usize) -> Self {
        Self {
            registry,
            peers: HashMap::with_capacity(max_sta_count),
            max_sta_count,
        }
    }

    #[inline]
    pub fn registry(&self) -> &UnassocClientRegistry {
        &self.registry
    }

    #[inline]
    pub fn registry_mut(&mut self) -> &mut UnassocClientRegistry {
        &mut self.registry
    }

    pub fn peer(&self, mac: MacAddress) -> Option<&PeerCaptureConfig> {
        self.peers.get(&mac)
    }

    pub fn active_peers(&self) -> usize {
        self.peers.len()
    }

    /// Fails when `mac` would need a new entry in a full peer table.
    fn ensure_peer_room(&self, mac: MacAddress) -> CfrResult<()> {
        if !self.peers.contains_key(&mac) && self.peers.len() >= self.max_sta_count {
            log::warn!("Peer capture table full, cannot enable {}", mac);
            return Err(CfrError::capacity_exceeded(
                "peer capture table",
                self.max_sta_count,
            ));
        }
        Ok(())
    }

    fn insert_peer(&mut self, mac: MacAddress, params: CaptureParams) -> CfrResult<()> {
        self.ensure_peer_room(mac)?;
        self.peers.insert(mac, PeerCaptureConfig::from(params));
        Ok(())
    }

    /// Enable capture for `mac`, immediately when associated, otherwise on
    /// association.
    pub fn enable(
        &mut self,
        mac: MacAddress,
        params: CaptureParams,
        associated: bool,
    ) -> CfrResult<EnablePlacement> {
        if associated {
            self.insert_peer(mac, params)?;
            log::info!("Capture enabled for {}", mac);
            Ok(EnablePlacement::Peer)
        } else {
            self.registry.register(mac, params)?;
            Ok(EnablePlacement::Pending)
        }
    }

    /// Promote a pending request once its client associates. Returns the
    /// parameters applied, if a request was pending. When the peer table is
    /// full the request stays pending.
    pub fn on_peer_associated(&mut self, mac: MacAddress) -> CfrResult<Option<CaptureParams>> {
        if !self.registry.contains(mac) {
            return Ok(None);
        }
        self.ensure_peer_room(mac)?;
        let params = match self.registry.consume_on_association(mac) {
            Some(params) => params,
            None => return Ok(None),
        };
        self.insert_peer(mac, params)?;
        log::info!("Capture enabled for {} on association", mac);
        Ok(Some(params))
    }

    /// Disable capture for `mac`, wherever it is; `false` when unknown.
    pub fn disable(&mut self, mac: MacAddress) -> bool {
        let was_peer = self.peers.remove(&mac).is_some();
        let was_pending = self.registry.remove(mac);
        if was_peer || was_pending {
            log::info!("Capture disabled for {}", mac);
        }
        was_peer || was_pending
    }

    pub fn clear_all(&mut self) {
        self.peers.clear();
        self.registry.clear_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(last: u8) -> MacAddress {
        MacAddress::new([0x00, 0x03, 0x7f, 0x00, 0x00, last])
    }

    fn params(bandwidth: u8) -> CaptureParams {
        CaptureParams {
            bandwidth,
            period: 10,
            method: CaptureMethod::NullFrameWithPhase,
        }
    }

    #[test]
    fn test_register_and_consume() {
        let mut registry = UnassocClientRegistry::new(2, UnassocPolicy::Reject);
        registry.register(mac(1), params(1)).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.consume_on_association(mac(1)), Some(params(1)));
        assert_eq!(registry.consume_on_association(mac(1)), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reregister_updates_in_place() {
        let mut registry = UnassocClientRegistry::new(1, UnassocPolicy::Reject);
        registry.register(mac(1), params(1)).unwrap();
        registry.register(mac(1), params(3)).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.entries()[0].capture_params.bandwidth, 3);
    }

    #[test]
    fn test_reject_when_full() {
        let mut registry = UnassocClientRegistry::new(1, UnassocPolicy::Reject);
        registry.register(mac(1), params(1)).unwrap();
        let err = registry.register(mac(2), params(1)).unwrap_err();
        assert!(matches!(err, CfrError::CapacityExceeded { capacity: 1, .. }));
        assert!(registry.contains(mac(1)));
    }

    #[test]
    fn test_evict_oldest_when_full() {
        let mut registry = UnassocClientRegistry::new(2, UnassocPolicy::EvictOldest);
        registry.register(mac(1), params(1)).unwrap();
        registry.register(mac(2), params(1)).unwrap();
        registry.register(mac(3), params(1)).unwrap();
        assert!(!registry.contains(mac(1)));
        let order: Vec<_> = registry.entries().iter().map(|e| e.mac_address).collect();
        assert_eq!(order, vec![mac(2), mac(3)]);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut registry = UnassocClientRegistry::new(3, UnassocPolicy::Reject);
        registry.register(mac(1), params(1)).unwrap();
        registry.register(mac(2), params(1)).unwrap();
        assert!(registry.remove(mac(1)));
        assert!(!registry.remove(mac(1)));
        registry.clear_all();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_control_promotes_on_association() {
        let registry = UnassocClientRegistry::new(2, UnassocPolicy::Reject);
        let mut control = CaptureControl::new(registry, 1);

        assert_eq!(
            control.enable(mac(1), params(2), false).unwrap(),
            EnablePlacement::Pending
        );
        assert_eq!(control.on_peer_associated(mac(1)).unwrap(), Some(params(2)));
        assert_eq!(control.peer(mac(1)).map(|p| p.bandwidth), Some(2));
        assert!(control.registry().is_empty());
        assert_eq!(control.on_peer_associated(mac(9)).unwrap(), None);
    }

    #[test]
    fn test_association_into_full_peer_table_keeps_request() {
        let registry = UnassocClientRegistry::new(2, UnassocPolicy::Reject);
        let mut control = CaptureControl::new(registry, 1);
        control.enable(mac(1), params(1), true).unwrap();
        control.enable(mac(2), params(2), false).unwrap();

        let err = control.on_peer_associated(mac(2)).unwrap_err();
        assert!(matches!(err, CfrError::CapacityExceeded { capacity: 1, .. }));
        assert!(control.registry().contains(mac(2)));
        assert!(control.peer(mac(2)).is_none());

        // Promoted once room frees up
        assert!(control.disable(mac(1)));
        assert_eq!(control.on_peer_associated(mac(2)).unwrap(), Some(params(2)));
        assert!(control.registry().is_empty());
        assert_eq!(control.active_peers(), 1);
    }

    #[test]
    fn test_control_bounds_peer_table() {
        let registry = UnassocClientRegistry::new(2, UnassocPolicy::Reject);
        let mut control = CaptureControl::new(registry, 1);
        control.enable(mac(1), params(1), true).unwrap();
        assert!(control.enable(mac(2), params(1), true).is_err());
        // Updating an enabled peer does not need a free entry
        assert!(control.enable(mac(1), params(3), true).is_ok());

        assert!(control.disable(mac(1)));
        assert!(!control.disable(mac(1)));
        assert_eq!(control.active_peers(), 0);
    }
}
