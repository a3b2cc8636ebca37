//! Report IDs, command bytes, and struct offsets for the PixArt RF HID OTA
//! protocol. All multi-byte fields are little-endian.

pub const INPUT_REPORT_ID: u8 = 0x05;
pub const OUTPUT_REPORT_ID: u8 = 0x06;
pub const FEATURE_REPORT_ID: u8 = 0x07;

pub const CMD_FW_OTA_INIT: u8 = 0x10;
pub const CMD_FW_WRITE: u8 = 0x17;
pub const CMD_FW_UPGRADE: u8 = 0x18;
pub const CMD_FW_MCU_RESET: u8 = 0x22;
pub const CMD_FW_GET_INFO: u8 = 0x23;
pub const CMD_FW_OBJECT_CREATE: u8 = 0x25;
pub const CMD_FW_OTA_INIT_NEW: u8 = 0x27;

pub const OBJECT_SIZE_MAX: usize = 4096;
pub const OTA_PAYLOAD_SZ: usize = 20;
pub const OTA_BUF_SZ: usize = 32;

/// Device state populated by `OTA_INIT_NEW`'s feature-report reply.
#[derive(Debug, Clone, Default)]
pub struct OtaState {
    pub status: u8,
    pub new_flow: u8,
    pub offset: u16,
    pub checksum: u16,
    pub max_object_size: u32,
    pub mtu_size: u16,
    pub prn_threshold: u16,
    pub spec_check_result: u8,
}

impl OtaState {
    /// Parses the feature-report reply to `OTA_INIT_NEW`. `buf` must be at
    /// least `OTA_BUF_SZ` bytes, with byte 0 the feature report ID and byte 1
    /// the echoed command byte (neither is consulted here).
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < 0x11 {
            return None;
        }
        Some(Self {
            status: buf[0x02],
            new_flow: buf[0x03],
            offset: u16::from_le_bytes([buf[0x04], buf[0x05]]),
            checksum: u16::from_le_bytes([buf[0x06], buf[0x07]]),
            max_object_size: u32::from_le_bytes([buf[0x08], buf[0x09], buf[0x0a], buf[0x0b]]),
            mtu_size: u16::from_le_bytes([buf[0x0c], buf[0x0d]]),
            prn_threshold: u16::from_le_bytes([buf[0x0e], buf[0x0f]]),
            spec_check_result: buf[0x10],
        })
    }
}

/// Device info populated by `GET_INFO`'s feature-report reply.
#[derive(Debug, Clone, Default)]
pub struct OtaInfo {
    pub version: [u8; 5],
    pub checksum: u16,
}

impl OtaInfo {
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < 0x0a || buf[0x02] != CMD_FW_GET_INFO {
            return None;
        }
        let mut version = [0u8; 5];
        version.copy_from_slice(&buf[0x03..0x08]);
        let checksum = u16::from_le_bytes([buf[0x08], buf[0x09]]);
        Some(Self { version, checksum })
    }

    pub fn version_str(&self) -> String {
        String::from_utf8_lossy(&self.version)
            .trim_end_matches('\0')
            .to_string()
    }
}

/// 16-bit wraparound sum of all bytes — no carry propagation beyond 16 bits.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u16 = 0;
    for &b in data {
        sum = sum.wrapping_add(b as u16);
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_wraps_around() {
        let data = vec![0xFFu8; 300];
        let expected = (0xFFu32 * 300 % 0x10000) as u16;
        assert_eq!(checksum(&data), expected);
    }

    #[test]
    fn checksum_empty_is_zero() {
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn ota_state_parses_offsets() {
        let mut buf = [0u8; OTA_BUF_SZ];
        buf[0x02] = 0xAB;
        buf[0x03] = 0x01;
        buf[0x04..0x06].copy_from_slice(&1234u16.to_le_bytes());
        buf[0x06..0x08].copy_from_slice(&5678u16.to_le_bytes());
        buf[0x08..0x0c].copy_from_slice(&4096u32.to_le_bytes());
        buf[0x0c..0x0e].copy_from_slice(&64u16.to_le_bytes());
        buf[0x0e..0x10].copy_from_slice(&2u16.to_le_bytes());
        buf[0x10] = 0x01;

        let state = OtaState::parse(&buf).unwrap();
        assert_eq!(state.status, 0xAB);
        assert_eq!(state.new_flow, 0x01);
        assert_eq!(state.offset, 1234);
        assert_eq!(state.checksum, 5678);
        assert_eq!(state.max_object_size, 4096);
        assert_eq!(state.mtu_size, 64);
        assert_eq!(state.prn_threshold, 2);
        assert_eq!(state.spec_check_result, 0x01);
    }

    #[test]
    fn ota_info_parses_version_and_checksum() {
        let mut buf = [0u8; 0x0a];
        buf[0x02] = CMD_FW_GET_INFO;
        buf[0x03..0x08].copy_from_slice(b"1.2.3");
        buf[0x08..0x0a].copy_from_slice(&0x1234u16.to_le_bytes());
        let info = OtaInfo::parse(&buf).unwrap();
        assert_eq!(&info.version, b"1.2.3");
        assert_eq!(info.checksum, 0x1234);
        assert_eq!(info.version_str(), "1.2.3");
    }

    #[test]
    fn ota_info_rejects_wrong_opcode() {
        let mut buf = [0u8; 0x0a];
        buf[0x02] = 0x99;
        assert!(OtaInfo::parse(&buf).is_none());
    }
}
