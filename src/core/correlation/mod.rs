// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod clock;
pub mod pool;
pub mod slot;
pub mod sweeper;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use pool::{SlotPool, SlotRef};
pub use slot::{Admission, CaptureId, CorrelationSlot, JoinedCapture, PartialCapture};
pub use sweeper::{AgingSweeper, AgingTarget};
