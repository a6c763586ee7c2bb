// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::core::error::CfrResult;
use std::fmt::Debug;

/// Downstream consumer of serialized capture records.
///
/// `publish` receives exactly one record (header followed by payload) per
/// call. It may be called from the emitter thread or, in inline dispatch
/// mode, from whichever producer completed the join.
pub trait Sink: Debug + Send + Sync {
    fn start(&self) {}
    fn stop(&self) {}

    fn publish(&self, record: &[u8]) -> CfrResult<()>;

    fn clone_box(&self) -> Box<dyn Sink>;
}

impl Clone for Box<dyn Sink> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
