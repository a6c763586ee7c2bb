// SPDX-License-Identifier: MIT OR Apache-2.0

//! Versioned metadata blocks carried in every capture record.
//!
//! Each layout is packed little-endian with no padding. `VersionedMetadata`
//! is the sum type selected by the header's `metadata_version` byte.

use super::dma_header::DmaDescriptorHeader;
use super::types::{
    CaptureSnapshot, MacAddress, MetadataVersion, HOST_MAX_CHAINS, MAC_ADDR_LEN, MAX_MU_USERS,
};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

pub const METADATA_V1_LEN: usize = 28;
pub const METADATA_V2_LEN: usize = METADATA_V1_LEN + HOST_MAX_CHAINS * 4 + HOST_MAX_CHAINS * 2;
pub const METADATA_V3_LEN: usize =
    24 + MAX_MU_USERS * MAC_ADDR_LEN + HOST_MAX_CHAINS * 4 + HOST_MAX_CHAINS * 2;

/// Fields shared by every layout, in wire order after the peer address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaptureInfo {
    pub status: u8,
    pub capture_bw: u8,
    pub channel_bw: u8,
    pub phy_mode: u8,
    pub prim20_chan: u16,
    pub center_freq1: u16,
    pub center_freq2: u16,
    pub capture_mode: u8,
    pub capture_type: u8,
    pub sts_count: u8,
    pub num_rx_chain: u8,
    pub timestamp: u32,
    pub length: u32,
}

impl CaptureInfo {
    /// Combine the configuration snapshot with what the hardware reported.
    pub fn from_parts(
        snapshot: &CaptureSnapshot,
        dma: &DmaDescriptorHeader,
        timestamp: u32,
        length: u32,
    ) -> Self {
        Self {
            status: u8::from(dma.upload_done()),
            capture_bw: dma.raw_bandwidth(),
            channel_bw: snapshot.channel.channel_bw,
            phy_mode: snapshot.channel.phy_mode,
            prim20_chan: snapshot.channel.prim20_chan,
            center_freq1: snapshot.channel.center_freq1,
            center_freq2: snapshot.channel.center_freq2,
            capture_mode: snapshot.capture_mode as u8,
            capture_type: snapshot.capture_type as u8,
            sts_count: dma.raw_nss(),
            num_rx_chain: dma.num_chains(),
            timestamp,
            length,
        }
    }

    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u8(self.status)?;
        w.write_u8(self.capture_bw)?;
        w.write_u8(self.channel_bw)?;
        w.write_u8(self.phy_mode)?;
        w.write_u16::<LittleEndian>(self.prim20_chan)?;
        w.write_u16::<LittleEndian>(self.center_freq1)?;
        w.write_u16::<LittleEndian>(self.center_freq2)?;
        w.write_u8(self.capture_mode)?;
        w.write_u8(self.capture_type)?;
        w.write_u8(self.sts_count)?;
        w.write_u8(self.num_rx_chain)?;
        w.write_u32::<LittleEndian>(self.timestamp)?;
        w.write_u32::<LittleEndian>(self.length)
    }

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(Self {
            status: r.read_u8()?,
            capture_bw: r.read_u8()?,
            channel_bw: r.read_u8()?,
            phy_mode: r.read_u8()?,
            prim20_chan: r.read_u16::<LittleEndian>()?,
            center_freq1: r.read_u16::<LittleEndian>()?,
            center_freq2: r.read_u16::<LittleEndian>()?,
            capture_mode: r.read_u8()?,
            capture_type: r.read_u8()?,
            sts_count: r.read_u8()?,
            num_rx_chain: r.read_u8()?,
            timestamp: r.read_u32::<LittleEndian>()?,
            length: r.read_u32::<LittleEndian>()?,
        })
    }
}

/// Per-chain RSSI and phase, carried by v2 and v3
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChainReport {
    pub chain_rssi: [u32; HOST_MAX_CHAINS],
    pub chain_phase: [u16; HOST_MAX_CHAINS],
}

impl ChainReport {
    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for rssi in &self.chain_rssi {
            w.write_u32::<LittleEndian>(*rssi)?;
        }
        for phase in &self.chain_phase {
            w.write_u16::<LittleEndian>(*phase)?;
        }
        Ok(())
    }

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut report = Self::default();
        for rssi in report.chain_rssi.iter_mut() {
            *rssi = r.read_u32::<LittleEndian>()?;
        }
        for phase in report.chain_phase.iter_mut() {
            *phase = r.read_u16::<LittleEndian>()?;
        }
        Ok(report)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetadataV1 {
    pub peer_addr: MacAddress,
    pub info: CaptureInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetadataV2 {
    pub peer_addr: MacAddress,
    pub info: CaptureInfo,
    pub chains: ChainReport,
}

/// v3 moves the peer address after the capture info and widens it to hold
/// up to four MU peers. A SU capture uses only the first address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetadataV3 {
    pub info: CaptureInfo,
    pub is_mu_ppdu: bool,
    pub num_mu_users: u8,
    pub peer_addrs: [MacAddress; MAX_MU_USERS],
    pub chains: ChainReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionedMetadata {
    V1(MetadataV1),
    V2(MetadataV2),
    V3(MetadataV3),
}

fn write_mac<W: Write>(w: &mut W, mac: &MacAddress) -> io::Result<()> {
    w.write_all(&mac.octets())
}

fn read_mac<R: Read>(r: &mut R) -> io::Result<MacAddress> {
    let mut octets = [0u8; MAC_ADDR_LEN];
    r.read_exact(&mut octets)?;
    Ok(MacAddress::new(octets))
}

impl VersionedMetadata {
    /// Build the layout for `version` from the snapshot and the hardware view.
    pub fn assemble(
        version: MetadataVersion,
        snapshot: &CaptureSnapshot,
        dma: &DmaDescriptorHeader,
        timestamp: u32,
        length: u32,
    ) -> Self {
        let info = CaptureInfo::from_parts(snapshot, dma, timestamp, length);
        let chains = ChainReport {
            chain_rssi: snapshot.chain_rssi,
            chain_phase: snapshot.chain_phase,
        };
        match version {
            MetadataVersion::V1 => Self::V1(MetadataV1 {
                peer_addr: snapshot.peer_addr,
                info,
            }),
            MetadataVersion::V2 => Self::V2(MetadataV2 {
                peer_addr: snapshot.peer_addr,
                info,
                chains,
            }),
            MetadataVersion::V3 => {
                let mut peer_addrs = [MacAddress::ZERO; MAX_MU_USERS];
                let num_mu_users = if snapshot.is_mu_ppdu {
                    let users = usize::from(snapshot.num_mu_users).min(MAX_MU_USERS);
                    peer_addrs[..users].copy_from_slice(&snapshot.mu_peer_addrs[..users]);
                    users as u8
                } else {
                    peer_addrs[0] = snapshot.peer_addr;
                    0
                };
                Self::V3(MetadataV3 {
                    info,
                    is_mu_ppdu: snapshot.is_mu_ppdu,
                    num_mu_users,
                    peer_addrs,
                    chains,
                })
            }
        }
    }

    #[inline]
    pub fn version(&self) -> MetadataVersion {
        match self {
            Self::V1(_) => MetadataVersion::V1,
            Self::V2(_) => MetadataVersion::V2,
            Self::V3(_) => MetadataVersion::V3,
        }
    }

    #[inline]
    pub const fn encoded_len(version: MetadataVersion) -> usize {
        match version {
            MetadataVersion::V1 => METADATA_V1_LEN,
            MetadataVersion::V2 => METADATA_V2_LEN,
            MetadataVersion::V3 => METADATA_V3_LEN,
        }
    }

    pub fn info(&self) -> &CaptureInfo {
        match self {
            Self::V1(m) => &m.info,
            Self::V2(m) => &m.info,
            Self::V3(m) => &m.info,
        }
    }

    /// Primary peer address (first MU peer for v3)
    pub fn peer_addr(&self) -> MacAddress {
        match self {
            Self::V1(m) => m.peer_addr,
            Self::V2(m) => m.peer_addr,
            Self::V3(m) => m.peer_addrs[0],
        }
    }

    pub fn chains(&self) -> Option<&ChainReport> {
        match self {
            Self::V1(_) => None,
            Self::V2(m) => Some(&m.chains),
            Self::V3(m) => Some(&m.chains),
        }
    }

    #[inline]
    pub fn payload_len(&self) -> u32 {
        self.info().length
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        match self {
            Self::V1(m) => {
                write_mac(w, &m.peer_addr)?;
                m.info.write_to(w)
            }
            Self::V2(m) => {
                write_mac(w, &m.peer_addr)?;
                m.info.write_to(w)?;
                m.chains.write_to(w)
            }
            Self::V3(m) => {
                m.info.write_to(w)?;
                w.write_u8(u8::from(m.is_mu_ppdu))?;
                w.write_u8(m.num_mu_users)?;
                for mac in &m.peer_addrs {
                    write_mac(w, mac)?;
                }
                m.chains.write_to(w)
            }
        }
    }

    pub fn read_from<R: Read>(version: MetadataVersion, r: &mut R) -> io::Result<Self> {
        Ok(match version {
            MetadataVersion::V1 => {
                let peer_addr = read_mac(r)?;
                Self::V1(MetadataV1 {
                    peer_addr,
                    info: CaptureInfo::read_from(r)?,
                })
            }
            MetadataVersion::V2 => {
                let peer_addr = read_mac(r)?;
                let info = CaptureInfo::read_from(r)?;
                Self::V2(MetadataV2 {
                    peer_addr,
                    info,
                    chains: ChainReport::read_from(r)?,
                })
            }
            MetadataVersion::V3 => {
                let info = CaptureInfo::read_from(r)?;
                let is_mu_ppdu = r.read_u8()? != 0;
                let num_mu_users = r.read_u8()?;
                let mut peer_addrs = [MacAddress::ZERO; MAX_MU_USERS];
                for mac in peer_addrs.iter_mut() {
                    *mac = read_mac(r)?;
                }
                Self::V3(MetadataV3 {
                    info,
                    is_mu_ppdu,
                    num_mu_users,
                    peer_addrs,
                    chains: ChainReport::read_from(r)?,
                })
            }
        })
    }
}
