// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod capture;
pub mod config;
pub mod correlation;
pub mod correlator;
pub mod dma;
pub mod error;
pub mod registry;
pub mod replay;
pub mod stats;
pub mod stream;
