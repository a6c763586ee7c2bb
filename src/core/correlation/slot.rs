// SPDX-License-Identifier: MIT OR Apache-2.0

//! One correlation slot and the state transitions both producers, the aging
//! sweep and flush-all apply to it.
//!
//! Every method here runs with the slot's lock held. None of them allocate
//! or call out of the slot; what leaves the slot is returned by value and
//! dealt with after the lock is dropped.

use crate::core::capture::dma_header::DmaDescriptorHeader;
use crate::core::stats::EventSource;

/// PPDU-derived identifier both producers report for a capture
pub type CaptureId = u32;

/// What the DBR completion contributed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbrHalf {
    pub capture_id: CaptureId,
    pub physical_address: u64,
    pub length: u32,
    pub received_at_ms: u64,
}

/// What the TX/RX completion contributed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionHalf {
    pub capture_id: CaptureId,
    pub addr_primary: u32,
    pub addr_secondary: u32,
    pub dma_header: DmaDescriptorHeader,
    pub received_at_ms: u64,
}

/// Both halves of a capture, taken out of the pool at the moment of joining
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinedCapture {
    pub capture_id: CaptureId,
    pub dbr: DbrHalf,
    pub completion: CompletionHalf,
}

impl JoinedCapture {
    #[inline]
    pub fn payload_len(&self) -> u32 {
        self.dbr.length
    }
}

/// Contents of a slot removed before it joined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialCapture {
    pub capture_id: CaptureId,
    pub dbr: Option<DbrHalf>,
    pub completion: Option<CompletionHalf>,
}

impl PartialCapture {
    /// The half that did arrive, when exactly one did
    pub fn present(&self) -> Option<EventSource> {
        match (self.dbr.is_some(), self.completion.is_some()) {
            (true, false) => Some(EventSource::Dbr),
            (false, true) => Some(EventSource::TxRx),
            _ => None,
        }
    }

    /// DBR buffer this capture still holds
    #[inline]
    pub fn buffer(&self) -> Option<u64> {
        self.dbr.map(|d| d.physical_address)
    }
}

/// Result of offering one half to a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Stored; waiting for the other half. `evicted` holds an unrelated
    /// capture that had to give up the slot.
    Pending { evicted: Option<PartialCapture> },
    /// This half completed the capture; the slot is already empty again.
    Joined(JoinedCapture),
    /// This half had already been delivered for this capture. A re-delivered
    /// DBR naming a buffer other than the one the slot knows of hands that
    /// buffer back as `stray_buffer`, still to be released.
    Duplicate { stray_buffer: Option<u64> },
}

/// Id recently handed off from this slot, remembered so that a late
/// re-delivery is not mistaken for a new capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Retired {
    capture_id: CaptureId,
    buffer: u64,
    at_ms: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelationSlot {
    dbr: Option<DbrHalf>,
    completion: Option<CompletionHalf>,
    retired: Option<Retired>,
}

enum Half {
    Dbr(DbrHalf),
    Completion(CompletionHalf),
}

impl Half {
    fn capture_id(&self) -> CaptureId {
        match self {
            Half::Dbr(d) => d.capture_id,
            Half::Completion(c) => c.capture_id,
        }
    }

    /// Reject this half as a re-delivery; `known` is the buffer the slot
    /// already accounts for.
    fn duplicate(&self, known: Option<u64>) -> Admission {
        let stray_buffer = match self {
            Half::Dbr(d) if known != Some(d.physical_address) => Some(d.physical_address),
            _ => None,
        };
        Admission::Duplicate { stray_buffer }
    }
}

impl CorrelationSlot {
    #[inline]
    pub fn dbr_received(&self) -> bool {
        self.dbr.is_some()
    }

    #[inline]
    pub fn completion_received(&self) -> bool {
        self.completion.is_some()
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.dbr_received() && self.completion_received()
    }

    #[inline]
    pub fn is_occupied(&self) -> bool {
        self.dbr_received() || self.completion_received()
    }

    /// Capture id held by the slot, if any half is present
    pub fn occupant(&self) -> Option<CaptureId> {
        self.dbr
            .map(|d| d.capture_id)
            .or_else(|| self.completion.map(|c| c.capture_id))
    }

    #[inline]
    pub fn dbr(&self) -> Option<&DbrHalf> {
        self.dbr.as_ref()
    }

    #[inline]
    pub fn completion(&self) -> Option<&CompletionHalf> {
        self.completion.as_ref()
    }

    /// Age of the oldest half present
    pub fn age_ms(&self, now_ms: u64) -> Option<u64> {
        let oldest = match (self.dbr, self.completion) {
            (Some(d), Some(c)) => d.received_at_ms.min(c.received_at_ms),
            (Some(d), None) => d.received_at_ms,
            (None, Some(c)) => c.received_at_ms,
            (None, None) => return None,
        };
        Some(now_ms.saturating_sub(oldest))
    }

    /// Reset to empty, forgetting any retired id.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn admit_dbr(&mut self, half: DbrHalf, retire_window_ms: u64) -> Admission {
        let now = half.received_at_ms;
        self.admit(Half::Dbr(half), now, retire_window_ms)
    }

    pub fn admit_completion(&mut self, half: CompletionHalf, retire_window_ms: u64) -> Admission {
        let now = half.received_at_ms;
        self.admit(Half::Completion(half), now, retire_window_ms)
    }

    fn admit(&mut self, half: Half, now_ms: u64, retire_window_ms: u64) -> Admission {
        let capture_id = half.capture_id();
        let mut evicted = None;

        match self.occupant() {
            None => {
                if let Some(retired) = self.retired {
                    let fresh = now_ms.saturating_sub(retired.at_ms) <= retire_window_ms;
                    if retired.capture_id == capture_id && fresh {
                        return half.duplicate(Some(retired.buffer));
                    }
                }
                self.retired = None;
            }
            Some(occupant) if occupant == capture_id => {}
            Some(_) => {
                evicted = self.take_partial();
            }
        }

        let known = self.dbr.map(|d| d.physical_address);
        match half {
            Half::Dbr(_) if self.dbr.is_some() => return half.duplicate(known),
            Half::Completion(_) if self.completion.is_some() => return half.duplicate(known),
            Half::Dbr(d) => self.dbr = Some(d),
            Half::Completion(c) => self.completion = Some(c),
        }

        match (self.dbr, self.completion) {
            (Some(dbr), Some(completion)) => {
                self.dbr = None;
                self.completion = None;
                self.retired = Some(Retired {
                    capture_id,
                    buffer: dbr.physical_address,
                    at_ms: now_ms,
                });
                Admission::Joined(JoinedCapture {
                    capture_id,
                    dbr,
                    completion,
                })
            }
            _ => Admission::Pending { evicted },
        }
    }

    /// Remove a partial capture older than `timeout_ms`.
    pub fn take_if_stale(&mut self, now_ms: u64, timeout_ms: u64) -> Option<PartialCapture> {
        if let Some(retired) = self.retired {
            if now_ms.saturating_sub(retired.at_ms) > timeout_ms {
                self.retired = None;
            }
        }
        match self.age_ms(now_ms) {
            Some(age) if age > timeout_ms => self.take_partial(),
            _ => None,
        }
    }

    /// Remove whatever the slot holds.
    pub fn take_partial(&mut self) -> Option<PartialCapture> {
        let capture_id = self.occupant()?;
        let partial = PartialCapture {
            capture_id,
            dbr: self.dbr.take(),
            completion: self.completion.take(),
        };
        Some(partial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: u64 = 3000;

    fn dbr(id: CaptureId, at: u64) -> DbrHalf {
        DbrHalf {
            capture_id: id,
            physical_address: 0x1000 + u64::from(id),
            length: 256,
            received_at_ms: at,
        }
    }

    fn completion(id: CaptureId, at: u64) -> CompletionHalf {
        CompletionHalf {
            capture_id: id,
            addr_primary: 0x2000,
            addr_secondary: 0x3000,
            dma_header: DmaDescriptorHeader::cfr(id as u16),
            received_at_ms: at,
        }
    }

    #[test]
    fn test_join_clears_slot() {
        let mut slot = CorrelationSlot::default();
        assert_eq!(
            slot.admit_dbr(dbr(7, 0), WINDOW),
            Admission::Pending { evicted: None }
        );
        assert!(slot.dbr_received());
        assert!(!slot.is_complete());

        match slot.admit_completion(completion(7, 5), WINDOW) {
            Admission::Joined(joined) => {
                assert_eq!(joined.capture_id, 7);
                assert_eq!(joined.payload_len(), 256);
            }
            other => panic!("expected join, got {:?}", other),
        }
        assert!(!slot.is_occupied());
    }

    #[test]
    fn test_duplicate_before_join_is_not_reapplied() {
        let mut slot = CorrelationSlot::default();
        slot.admit_completion(completion(7, 0), WINDOW);
        let mut second = completion(7, 1);
        second.addr_primary = 0xdead;
        assert_eq!(
            slot.admit_completion(second, WINDOW),
            Admission::Duplicate { stray_buffer: None }
        );
        assert_eq!(slot.completion().map(|c| c.addr_primary), Some(0x2000));
    }

    #[test]
    fn test_redelivery_after_join_is_duplicate() {
        let mut slot = CorrelationSlot::default();
        slot.admit_dbr(dbr(7, 0), WINDOW);
        assert!(matches!(
            slot.admit_completion(completion(7, 1), WINDOW),
            Admission::Joined(_)
        ));
        assert_eq!(
            slot.admit_completion(completion(7, 2), WINDOW),
            Admission::Duplicate { stray_buffer: None }
        );
        assert!(!slot.is_occupied());
    }

    #[test]
    fn test_duplicate_dbr_hands_back_unknown_buffer() {
        let mut slot = CorrelationSlot::default();
        slot.admit_dbr(dbr(7, 0), WINDOW);
        assert_eq!(
            slot.admit_dbr(dbr(7, 1), WINDOW),
            Admission::Duplicate { stray_buffer: None }
        );
        let mut moved = dbr(7, 2);
        moved.physical_address = 0x9000;
        assert_eq!(
            slot.admit_dbr(moved, WINDOW),
            Admission::Duplicate {
                stray_buffer: Some(0x9000)
            }
        );
        assert_eq!(slot.dbr().map(|d| d.physical_address), Some(0x1007));

        // Same rule once the capture has been handed off
        slot.admit_completion(completion(7, 3), WINDOW);
        assert_eq!(
            slot.admit_dbr(dbr(7, 4), WINDOW),
            Admission::Duplicate { stray_buffer: None }
        );
        moved.received_at_ms = 5;
        assert_eq!(
            slot.admit_dbr(moved, WINDOW),
            Admission::Duplicate {
                stray_buffer: Some(0x9000)
            }
        );
    }

    #[test]
    fn test_retired_id_expires() {
        let mut slot = CorrelationSlot::default();
        slot.admit_dbr(dbr(7, 0), WINDOW);
        slot.admit_completion(completion(7, 0), WINDOW);
        assert_eq!(
            slot.admit_dbr(dbr(7, WINDOW + 1), WINDOW),
            Admission::Pending { evicted: None }
        );
    }

    #[test]
    fn test_collision_evicts_occupant() {
        let mut slot = CorrelationSlot::default();
        slot.admit_dbr(dbr(3, 0), WINDOW);
        match slot.admit_completion(completion(7, 1), WINDOW) {
            Admission::Pending {
                evicted: Some(partial),
            } => {
                assert_eq!(partial.capture_id, 3);
                assert_eq!(partial.present(), Some(EventSource::Dbr));
                assert_eq!(partial.buffer(), Some(0x1003));
            }
            other => panic!("expected eviction, got {:?}", other),
        }
        assert_eq!(slot.occupant(), Some(7));
        assert!(!slot.dbr_received());
    }

    #[test]
    fn test_take_if_stale_uses_oldest_half() {
        let mut slot = CorrelationSlot::default();
        slot.admit_completion(completion(9, 100), WINDOW);
        assert!(slot.take_if_stale(100 + WINDOW, WINDOW).is_none());
        let partial = slot.take_if_stale(101 + WINDOW, WINDOW).unwrap();
        assert_eq!(partial.present(), Some(EventSource::TxRx));
        assert!(!slot.is_occupied());
    }

    #[test]
    fn test_clear_forgets_retired_id() {
        let mut slot = CorrelationSlot::default();
        slot.admit_dbr(dbr(7, 0), WINDOW);
        slot.admit_completion(completion(7, 0), WINDOW);
        slot.clear();
        assert_eq!(
            slot.admit_dbr(dbr(7, 1), WINDOW),
            Admission::Pending { evicted: None }
        );
    }
}
