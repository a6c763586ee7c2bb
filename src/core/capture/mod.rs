// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod builder;
pub mod dma_header;
pub mod metadata;
pub mod record;
pub mod types;

pub use builder::RecordBuilder;
pub use dma_header::DmaDescriptorHeader;
pub use metadata::VersionedMetadata;
pub use record::{CfrRecord, RecordHeader, RecordReader};
pub use types::{CaptureMethod, CaptureParams, CaptureSnapshot, MacAddress, MetadataVersion};
