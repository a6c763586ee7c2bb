// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capture vocabulary shared by the header codec, the record builder and the
//! client registry.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Number of receive chains carried in the v2/v3 metadata layouts
pub const HOST_MAX_CHAINS: usize = 8;

/// Maximum number of MU peers carried in the v3 metadata layout
pub const MAX_MU_USERS: usize = 4;

pub const MAC_ADDR_LEN: usize = 6;

/// 48-bit IEEE 802 address
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct MacAddress(pub [u8; MAC_ADDR_LEN]);

impl MacAddress {
    pub const ZERO: MacAddress = MacAddress([0; MAC_ADDR_LEN]);

    pub const fn new(bytes: [u8; MAC_ADDR_LEN]) -> Self {
        Self(bytes)
    }

    #[inline]
    pub const fn octets(&self) -> [u8; MAC_ADDR_LEN] {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0 == [0; MAC_ADDR_LEN]
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl fmt::Debug for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddress({})", self)
    }
}

impl FromStr for MacAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; MAC_ADDR_LEN];
        let mut parts = s.split(|c| c == ':' || c == '-');
        for byte in bytes.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| format!("MAC address '{}' has fewer than 6 octets", s))?;
            *byte = u8::from_str_radix(part, 16)
                .map_err(|e| format!("Invalid octet '{}' in MAC address '{}': {}", part, s, e))?;
        }
        if parts.next().is_some() {
            return Err(format!("MAC address '{}' has more than 6 octets", s));
        }
        Ok(Self(bytes))
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Layout of the versioned metadata block following the common header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MetadataVersion {
    V1 = 1,
    V2 = 2,
    V3 = 3,
}

impl MetadataVersion {
    #[inline]
    pub const fn as_u8(&self) -> u8 {
        *self as u8
    }
}

impl TryFrom<u8> for MetadataVersion {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MetadataVersion::V1),
            2 => Ok(MetadataVersion::V2),
            3 => Ok(MetadataVersion::V3),
            _ => Err(format!(
                "Unsupported metadata version {}. Valid values: 1, 2, 3",
                value
            )),
        }
    }
}

impl From<MetadataVersion> for u8 {
    fn from(v: MetadataVersion) -> u8 {
        v.as_u8()
    }
}

/// Host platform the capture was taken on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformType {
    #[default]
    None = 0,
    Mips = 1,
    Arm = 2,
}

/// Radio (chip) family stamped into the record header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RadioType {
    #[default]
    None = 0,
    Osprey = 1,
    Peacock = 2,
    Scorpion = 3,
    Honeybee = 4,
    Dragonfly = 5,
    Jet = 6,
    Peregrine = 17,
    Swift = 18,
    Beeliner = 19,
    Cascade = 20,
    Dakota = 21,
    Besra = 22,
    Hkv2 = 23,
    Cyp = 24,
}

/// Response frame type the capture was taken on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckCaptureMode {
    #[default]
    LegacyAck = 0,
    DupLegacyAck = 1,
    HtAck = 2,
    VhtAck = 3,
}

impl AckCaptureMode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::LegacyAck),
            1 => Some(Self::DupLegacyAck),
            2 => Some(Self::HtAck),
            3 => Some(Self::VhtAck),
            _ => None,
        }
    }
}

/// Method used to solicit the frame the capture was taken on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMethod {
    #[default]
    NullFrame = 0,
    NullFrameWithPhase = 1,
    ProbeResp = 2,
    Tm = 3,
    Ftm = 4,
    AckRespToTmFtm = 5,
    TaRaTypeFilter = 6,
    NdpaNdp = 7,
    AllPacket = 8,
    Auto = 0xff,
}

impl CaptureMethod {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::NullFrame,
            1 => Self::NullFrameWithPhase,
            2 => Self::ProbeResp,
            3 => Self::Tm,
            4 => Self::Ftm,
            5 => Self::AckRespToTmFtm,
            6 => Self::TaRaTypeFilter,
            7 => Self::NdpaNdp,
            8 => Self::AllPacket,
            0xff => Self::Auto,
            _ => return None,
        })
    }
}

/// Per-client capture request: bandwidth, period and method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CaptureParams {
    pub bandwidth: u8,
    /// Capture period in milliseconds, 0 for one-shot
    pub period: u32,
    pub method: CaptureMethod,
}

/// Operating channel of the radio at capture time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelInfo {
    pub channel_bw: u8,
    pub phy_mode: u8,
    pub prim20_chan: u16,
    pub center_freq1: u16,
    pub center_freq2: u16,
}

/// Read-only view of the capture configuration consulted when a record is
/// assembled. Owned by configuration management; the correlator only copies
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSnapshot {
    pub peer_addr: MacAddress,
    pub channel: ChannelInfo,
    pub capture_mode: AckCaptureMode,
    pub capture_type: CaptureMethod,
    pub chain_rssi: [u32; HOST_MAX_CHAINS],
    pub chain_phase: [u16; HOST_MAX_CHAINS],
    pub is_mu_ppdu: bool,
    pub num_mu_users: u8,
    pub mu_peer_addrs: [MacAddress; MAX_MU_USERS],
}
