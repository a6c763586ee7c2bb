// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod correlator_config;
pub mod flat_config;

pub use correlator_config::CorrelatorConfig;
pub use flat_config::{FlatConfig, PropertySource};
