// SPDX-License-Identifier: MIT OR Apache-2.0

//! Decoder for the header the capture microcode DMAs ahead of a CFR payload.
//!
//! ```text
//! word  bits    field
//! 0     0..8    tag (0xBA)
//! 0     8..14   length, in 4-octet units
//! 1     0       upload_done
//! 1     1..4    capture_type      0: invalid, 1: CFR, 2: CIR, 3: DebugH
//! 1     4..6    preamble_type     0: legacy, 1: HT, 2: VHT, 3: HE
//! 1     6..9    nss               0: 1 stream .. 7: 8 streams
//! 1     9..12   num_chains        0: invalid, 1: 1 chain ..
//! 1     12..15  upload_pkt_bw     0: 20 MHz, 1: 40, 2: 80, 3: 160
//! 1     15      sw_peer_id_valid
//! 2     0..16   sw_peer_id
//! 3     0..16   phy_ppdu_id
//! 4     0..16   total_bytes       (enhanced header only)
//! 5     0..4    header_version    (enhanced header only)
//! 5     4..8    target_id         (enhanced header only)
//! ```

use crate::core::error::{CfrError, CfrResult};
use byteorder::{ByteOrder, LittleEndian};

pub const DMA_HEADER_TAG: u8 = 0xBA;
pub const DMA_HEADER_LEN: usize = 8;
pub const ENHANCED_DMA_HEADER_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaCaptureType {
    Cfr,
    Cir,
    DebugH,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreambleType {
    Legacy,
    Ht,
    Vht,
    He,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadBandwidth {
    Mhz20,
    Mhz40,
    Mhz80,
    Mhz160,
}

impl UploadBandwidth {
    pub const fn mhz(&self) -> u16 {
        match self {
            Self::Mhz20 => 20,
            Self::Mhz40 => 40,
            Self::Mhz80 => 80,
            Self::Mhz160 => 160,
        }
    }
}

/// Decoded DMA descriptor header. Fields keep their raw widths; typed views
/// are available through the accessor methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DmaDescriptorHeader {
    tag: u8,
    length_words: u8,
    upload_done: bool,
    capture_type: u8,
    preamble_type: u8,
    nss: u8,
    num_chains: u8,
    upload_pkt_bw: u8,
    sw_peer_id_valid: bool,
    sw_peer_id: u16,
    phy_ppdu_id: u16,
    total_bytes: Option<u16>,
    header_version: u8,
    target_id: u8,
}

impl DmaDescriptorHeader {
    /// Decode the base (8 byte) or enhanced (12 byte) header layout.
    pub fn decode(bytes: &[u8]) -> CfrResult<Self> {
        if bytes.len() < DMA_HEADER_LEN {
            return Err(CfrError::malformed_header(format!(
                "need at least {} bytes, got {}",
                DMA_HEADER_LEN,
                bytes.len()
            )));
        }

        let word0 = LittleEndian::read_u16(&bytes[0..2]);
        let word1 = LittleEndian::read_u16(&bytes[2..4]);
        let tag = (word0 & 0xff) as u8;
        if tag != DMA_HEADER_TAG {
            return Err(CfrError::malformed_header(format!(
                "bad tag {:#04x}, expected {:#04x}",
                tag, DMA_HEADER_TAG
            )));
        }

        let mut header = Self {
            tag,
            length_words: ((word0 >> 8) & 0x3f) as u8,
            upload_done: word1 & 0x1 != 0,
            capture_type: ((word1 >> 1) & 0x7) as u8,
            preamble_type: ((word1 >> 4) & 0x3) as u8,
            nss: ((word1 >> 6) & 0x7) as u8,
            num_chains: ((word1 >> 9) & 0x7) as u8,
            upload_pkt_bw: ((word1 >> 12) & 0x7) as u8,
            sw_peer_id_valid: (word1 >> 15) & 0x1 != 0,
            sw_peer_id: LittleEndian::read_u16(&bytes[4..6]),
            phy_ppdu_id: LittleEndian::read_u16(&bytes[6..8]),
            total_bytes: None,
            header_version: 0,
            target_id: 0,
        };

        if bytes.len() >= ENHANCED_DMA_HEADER_LEN {
            let word5 = LittleEndian::read_u16(&bytes[10..12]);
            header.total_bytes = Some(LittleEndian::read_u16(&bytes[8..10]));
            header.header_version = (word5 & 0xf) as u8;
            header.target_id = ((word5 >> 4) & 0xf) as u8;
        }

        Ok(header)
    }

    /// Encode back to the wire layout; enhanced when `total_bytes` is set.
    pub fn encode(&self) -> Vec<u8> {
        let word0 = u16::from(self.tag) | (u16::from(self.length_words & 0x3f) << 8);
        let word1 = u16::from(self.upload_done)
            | (u16::from(self.capture_type & 0x7) << 1)
            | (u16::from(self.preamble_type & 0x3) << 4)
            | (u16::from(self.nss & 0x7) << 6)
            | (u16::from(self.num_chains & 0x7) << 9)
            | (u16::from(self.upload_pkt_bw & 0x7) << 12)
            | (u16::from(self.sw_peer_id_valid) << 15);

        let len = if self.total_bytes.is_some() {
            ENHANCED_DMA_HEADER_LEN
        } else {
            DMA_HEADER_LEN
        };
        let mut out = vec![0u8; len];
        LittleEndian::write_u16(&mut out[0..2], word0);
        LittleEndian::write_u16(&mut out[2..4], word1);
        LittleEndian::write_u16(&mut out[4..6], self.sw_peer_id);
        LittleEndian::write_u16(&mut out[6..8], self.phy_ppdu_id);
        if let Some(total) = self.total_bytes {
            let word5 = u16::from(self.header_version & 0xf) | (u16::from(self.target_id & 0xf) << 4);
            LittleEndian::write_u16(&mut out[8..10], total);
            LittleEndian::write_u16(&mut out[10..12], word5);
        }
        out
    }

    /// Start a header for a CFR upload of the given PPDU.
    pub fn cfr(phy_ppdu_id: u16) -> Self {
        Self {
            tag: DMA_HEADER_TAG,
            length_words: (DMA_HEADER_LEN / 4) as u8,
            upload_done: true,
            capture_type: 1,
            num_chains: 1,
            phy_ppdu_id,
            ..Self::default()
        }
    }

    pub fn with_total_bytes(mut self, total_bytes: u16) -> Self {
        self.total_bytes = Some(total_bytes);
        self.length_words = (ENHANCED_DMA_HEADER_LEN / 4) as u8;
        self
    }

    pub fn with_streams(mut self, nss: u8, num_chains: u8) -> Self {
        self.nss = nss.saturating_sub(1) & 0x7;
        self.num_chains = num_chains & 0x7;
        self
    }

    pub fn with_bandwidth(mut self, upload_pkt_bw: u8) -> Self {
        self.upload_pkt_bw = upload_pkt_bw & 0x7;
        self
    }

    pub fn with_peer(mut self, sw_peer_id: u16) -> Self {
        self.sw_peer_id = sw_peer_id;
        self.sw_peer_id_valid = true;
        self
    }

    pub fn with_preamble(mut self, preamble_type: u8) -> Self {
        self.preamble_type = preamble_type & 0x3;
        self
    }

    #[inline]
    pub fn header_len_bytes(&self) -> usize {
        usize::from(self.length_words) * 4
    }

    #[inline]
    pub fn upload_done(&self) -> bool {
        self.upload_done
    }

    #[inline]
    pub fn raw_capture_type(&self) -> u8 {
        self.capture_type
    }

    pub fn capture_type(&self) -> Option<DmaCaptureType> {
        match self.capture_type {
            1 => Some(DmaCaptureType::Cfr),
            2 => Some(DmaCaptureType::Cir),
            3 => Some(DmaCaptureType::DebugH),
            _ => None,
        }
    }

    pub fn preamble_type(&self) -> PreambleType {
        match self.preamble_type {
            0 => PreambleType::Legacy,
            1 => PreambleType::Ht,
            2 => PreambleType::Vht,
            _ => PreambleType::He,
        }
    }

    /// Spatial stream count (the field stores count - 1)
    #[inline]
    pub fn spatial_streams(&self) -> u8 {
        self.nss + 1
    }

    /// Raw nss field as written into the record's sts_count
    #[inline]
    pub fn raw_nss(&self) -> u8 {
        self.nss
    }

    #[inline]
    pub fn num_chains(&self) -> u8 {
        self.num_chains
    }

    #[inline]
    pub fn raw_bandwidth(&self) -> u8 {
        self.upload_pkt_bw
    }

    pub fn bandwidth(&self) -> Option<UploadBandwidth> {
        match self.upload_pkt_bw {
            0 => Some(UploadBandwidth::Mhz20),
            1 => Some(UploadBandwidth::Mhz40),
            2 => Some(UploadBandwidth::Mhz80),
            3 => Some(UploadBandwidth::Mhz160),
            _ => None,
        }
    }

    /// Software peer id, when the microcode marked it valid
    pub fn sw_peer_id(&self) -> Option<u16> {
        self.sw_peer_id_valid.then_some(self.sw_peer_id)
    }

    #[inline]
    pub fn phy_ppdu_id(&self) -> u16 {
        self.phy_ppdu_id
    }

    /// Total bytes the microcode declared for this upload (enhanced header)
    #[inline]
    pub fn total_bytes(&self) -> Option<u16> {
        self.total_bytes
    }

    #[inline]
    pub fn header_version(&self) -> u8 {
        self.header_version
    }

    #[inline]
    pub fn target_id(&self) -> u8 {
        self.target_id
    }
}
