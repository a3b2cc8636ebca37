use std::thread::sleep;
use std::time::Duration;

use crate::error::{FuError, FuResult, ResultContext};
use crate::firmware::Firmware;
use crate::pixart::transport::HidTransport;
use crate::pixart::wire::*;

/// A PixArt RF HID OTA device, tracking the state reported by `OTA_INIT_NEW`
/// and `GET_INFO`. Generic over the transport so tests can substitute an
/// in-memory mock for the real hidraw device.
pub struct PixartDevice<T: HidTransport> {
    transport: T,
    state: OtaState,
    info: OtaInfo,
}

impl<T: HidTransport> PixartDevice<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: OtaState::default(),
            info: OtaInfo::default(),
        }
    }

    pub fn state(&self) -> &OtaState {
        &self.state
    }

    pub fn info(&self) -> &OtaInfo {
        &self.info
    }

    /// `fu_pxi_device_fw_ota_init`.
    fn ota_init(&mut self) -> FuResult<()> {
        let req = [OUTPUT_REPORT_ID, CMD_FW_OTA_INIT];
        self.transport.pwrite(0, &req).context("ota init")
    }

    /// `fu_pxi_device_fw_ota_init_new`. Populates `self.state`.
    fn ota_init_new(&mut self, fw_sz: u32) -> FuResult<()> {
        let mut req = Vec::with_capacity(2 + 4 + 1 + 10);
        req.push(OUTPUT_REPORT_ID);
        req.push(CMD_FW_OTA_INIT_NEW);
        req.extend_from_slice(&fw_sz.to_le_bytes());
        req.push(0x0); /* OTA setting */
        req.extend_from_slice(&[0u8; 10]); /* fw_version, unused on this path */
        self.transport
            .pwrite(0, &req)
            .context("ota init new")?;

        sleep(Duration::from_micros(30_000));

        let mut res = [0u8; OTA_BUF_SZ];
        res[0] = FEATURE_REPORT_ID;
        res[1] = CMD_FW_OTA_INIT_NEW;
        self.transport
            .feature_get(&mut res)
            .context("ota init new reply")?;

        self.state = OtaState::parse(&res)
            .ok_or_else(|| FuError::ProtocolError("ota init new reply truncated".into()))?;
        Ok(())
    }

    /// `fu_pxi_device_fw_get_info`. Populates `self.info`.
    fn get_info(&mut self) -> FuResult<()> {
        let req = [OUTPUT_REPORT_ID, CMD_FW_GET_INFO];
        self.transport.pwrite(0, &req).context("get info")?;

        let mut res = [0u8; 64];
        res[0] = FEATURE_REPORT_ID;
        res[1] = CMD_FW_GET_INFO;
        self.transport
            .feature_get(&mut res)
            .context("get info reply")?;

        self.info = OtaInfo::parse(&res).ok_or_else(|| {
            FuError::ProtocolError(format!("FwGetInfo opcode invalid {:#04x}", res[0x02]))
        })?;
        Ok(())
    }

    /// `fu_pxi_device_setup`: init then query info, independent of flashing.
    pub fn setup(&mut self) -> FuResult<()> {
        self.ota_init()?;
        self.get_info()
    }

    /// Reads a `FU_PXI_DEVICE_OTA_BUF_SZ`-byte notification from input
    /// offset `port`, returning `(opcode_at_0x01, checksum_at_0x02_le)`.
    fn wait_notify(&mut self, port: u64) -> FuResult<(u8, u16)> {
        let mut res = [0u8; OTA_BUF_SZ];
        res[0] = INPUT_REPORT_ID;
        self.transport
            .pread(port, &mut res[..OTA_BUF_SZ - port as usize])
            .context("notify")?;
        let opcode = res[0x01];
        let checksum = u16::from_le_bytes([res[0x02], res[0x03]]);
        Ok((opcode, checksum))
    }

    /// `fu_pxi_device_fw_object_create`. The reply is read but discarded —
    /// the original comments it "seems unused"; a read failure here is
    /// tolerated rather than propagated.
    fn object_create(&mut self, address: u32, size: u32) -> FuResult<()> {
        let mut req = Vec::with_capacity(10);
        req.push(OUTPUT_REPORT_ID);
        req.push(CMD_FW_OBJECT_CREATE);
        req.extend_from_slice(&address.to_le_bytes());
        req.extend_from_slice(&size.to_le_bytes());
        self.transport
            .pwrite(0, &req)
            .context("object create")?;

        let mut res = [0u8; OTA_BUF_SZ];
        if let Err(e) = self.transport.pread(0, &mut res) {
            log::debug!("object create reply read failed (ignored): {e}");
        }
        sleep(Duration::from_micros(30_000));
        Ok(())
    }

    fn write_payload(&mut self, payload: &[u8]) -> FuResult<()> {
        let mut req = Vec::with_capacity(1 + payload.len());
        req.push(OUTPUT_REPORT_ID);
        req.extend_from_slice(payload);
        self.transport.pwrite(0, &req).context("payload")
    }

    /// `fu_pxi_device_write_chunk`: one 4096-byte object, split into 20-byte
    /// payloads with PRN acks every `prn_threshold` payloads.
    fn write_object(&mut self, address: u32, object: &[u8]) -> FuResult<()> {
        let checksum = checksum(object);
        self.object_create(address, object.len() as u32)?;

        let mut prn = 0u32;
        for payload in object.chunks(OTA_PAYLOAD_SZ) {
            self.write_payload(payload)?;
            prn += 1;
            if prn >= self.state.prn_threshold as u32 {
                let (opcode, _) = self.wait_notify(0x1)?;
                if opcode != CMD_FW_WRITE {
                    return Err(FuError::ReadError(format!(
                        "FwWrite opcode invalid {opcode:#04x}"
                    )));
                }
                prn = 0;
            }
        }

        let (_, checksum_tmp) = self.wait_notify(0x0)?;
        if checksum_tmp != checksum {
            return Err(FuError::ChecksumMismatch {
                computed: checksum,
                received: checksum_tmp,
            });
        }
        Ok(())
    }

    /// `fu_pxi_device_fw_upgrade`.
    fn upgrade(&mut self, fw: &Firmware) -> FuResult<()> {
        let checksum = checksum(&fw.bytes);
        let mut req = Vec::with_capacity(2 + 4 + 4 + 10);
        req.push(OUTPUT_REPORT_ID);
        req.push(CMD_FW_UPGRADE);
        req.extend_from_slice(&(fw.bytes.len() as u32).to_le_bytes());
        req.extend_from_slice(&(checksum as u32).to_le_bytes());
        let mut version = [0u8; 10];
        let v = fw.version.as_bytes();
        let n = v.len().min(10);
        version[..n].copy_from_slice(&v[..n]);
        req.extend_from_slice(&version);

        self.transport.pwrite(0, &req).context("upgrade")?;

        let (opcode, _) = self.wait_notify(0x1)?;
        if opcode != CMD_FW_UPGRADE {
            return Err(FuError::ReadError(format!(
                "FwUpgrade opcode invalid {opcode:#04x}"
            )));
        }
        Ok(())
    }

    /// `fu_pxi_device_reset`. The size is deliberately truncated to a single
    /// byte, matching the original's `fw_sz` squeeze — preserved for wire
    /// compatibility (see design notes).
    fn reset(&mut self, fw_sz: usize) -> FuResult<()> {
        let req = [OUTPUT_REPORT_ID, CMD_FW_MCU_RESET, fw_sz as u8];
        self.transport.pwrite(0, &req).context("failed to reset")
    }

    /// `fu_pxi_device_write_firmware`: the full OTA sequence.
    pub fn write_firmware(
        &mut self,
        fw: &Firmware,
        mut on_progress: impl FnMut(usize, usize),
    ) -> FuResult<()> {
        self.ota_init()?;
        self.ota_init_new(fw.bytes.len() as u32)?;

        let objects: Vec<(u32, &[u8])> = fw
            .bytes
            .chunks(OBJECT_SIZE_MAX)
            .enumerate()
            .map(|(i, chunk)| ((i * OBJECT_SIZE_MAX) as u32, chunk))
            .collect();
        let total = objects.len();
        for (i, (address, object)) in objects.into_iter().enumerate() {
            self.write_object(address, object)?;
            on_progress(i, total);
        }

        self.upgrade(fw)?;
        self.reset(fw.bytes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// A mock `HidTransport` backed by in-memory queues, standing in for a
    /// real hidraw file descriptor.
    struct MockHid {
        writes: Vec<Vec<u8>>,
        feature_replies: VecDeque<Vec<u8>>,
        pread_replies: VecDeque<Vec<u8>>,
        fail_next_pread: bool,
    }

    impl MockHid {
        fn new() -> Self {
            Self {
                writes: Vec::new(),
                feature_replies: VecDeque::new(),
                pread_replies: VecDeque::new(),
                fail_next_pread: false,
            }
        }
    }

    impl HidTransport for MockHid {
        fn pwrite(&mut self, _port: u64, data: &[u8]) -> FuResult<()> {
            self.writes.push(data.to_vec());
            Ok(())
        }

        fn pread(&mut self, _port: u64, buf: &mut [u8]) -> FuResult<()> {
            if self.fail_next_pread {
                self.fail_next_pread = false;
                return Err(FuError::ReadError("mock read failure".into()));
            }
            if let Some(reply) = self.pread_replies.pop_front() {
                let n = reply.len().min(buf.len());
                buf[..n].copy_from_slice(&reply[..n]);
            }
            Ok(())
        }

        fn feature_get(&mut self, buf: &mut [u8]) -> FuResult<()> {
            if let Some(reply) = self.feature_replies.pop_front() {
                let n = reply.len().min(buf.len());
                buf[..n].copy_from_slice(&reply[..n]);
            }
            Ok(())
        }
    }

    fn ota_init_new_reply(prn_threshold: u16) -> Vec<u8> {
        let mut buf = vec![0u8; OTA_BUF_SZ];
        buf[0x0e..0x10].copy_from_slice(&prn_threshold.to_le_bytes());
        buf
    }

    #[test]
    fn happy_path_single_object_two_payloads_one_prn() {
        // fw_size=40, prn_threshold=2: a single 40-byte object, two 20-byte
        // payloads, exactly one PRN ack after the second payload.
        let mut hid = MockHid::new();
        hid.feature_replies.push_back(ota_init_new_reply(2));

        let fw_bytes: Vec<u8> = (0u8..40).collect();
        let sum = checksum(&fw_bytes);
        // object_create reply (discarded), then one PRN ack, then final checksum notify.
        hid.pread_replies.push_back(vec![0u8; OTA_BUF_SZ]);
        let mut prn_ack = vec![0u8; OTA_BUF_SZ];
        prn_ack[0x01] = CMD_FW_WRITE;
        hid.pread_replies.push_back(prn_ack);
        let mut final_notify = vec![0u8; OTA_BUF_SZ];
        final_notify[0x02..0x04].copy_from_slice(&sum.to_le_bytes());
        hid.pread_replies.push_back(final_notify);
        // upgrade ack
        let mut upgrade_ack = vec![0u8; OTA_BUF_SZ];
        upgrade_ack[0x01] = CMD_FW_UPGRADE;
        hid.pread_replies.push_back(upgrade_ack);

        let mut device = PixartDevice::new(hid);
        let fw = Firmware::new(fw_bytes, "1.0");
        let mut progress = Vec::new();
        device
            .write_firmware(&fw, |i, n| progress.push((i, n)))
            .unwrap();
        assert_eq!(progress, vec![(0, 1)]);
    }

    #[test]
    fn checksum_mismatch_is_reported() {
        let mut hid = MockHid::new();
        hid.feature_replies.push_back(ota_init_new_reply(100));
        hid.pread_replies.push_back(vec![0u8; OTA_BUF_SZ]); // object create reply
        let mut final_notify = vec![0u8; OTA_BUF_SZ];
        final_notify[0x02..0x04].copy_from_slice(&0xFFFFu16.to_le_bytes());
        hid.pread_replies.push_back(final_notify);

        let mut device = PixartDevice::new(hid);
        let fw = Firmware::new(vec![1, 2, 3, 4], "1.0");
        let err = device.write_firmware(&fw, |_, _| {}).unwrap_err();
        match err {
            FuError::ChecksumMismatch { computed, received } => {
                assert_eq!(received, 0xFFFF);
                assert_ne!(computed, received);
            }
            other => panic!("expected ChecksumMismatch, got {other:?}"),
        }
    }

    #[test]
    fn object_create_read_failure_is_tolerated() {
        let mut hid = MockHid::new();
        hid.feature_replies.push_back(ota_init_new_reply(100));
        hid.fail_next_pread = true;
        let mut final_notify = vec![0u8; OTA_BUF_SZ];
        let sum = checksum(&[9, 9, 9]);
        final_notify[0x02..0x04].copy_from_slice(&sum.to_le_bytes());
        hid.pread_replies.push_back(final_notify);
        let mut upgrade_ack = vec![0u8; OTA_BUF_SZ];
        upgrade_ack[0x01] = CMD_FW_UPGRADE;
        hid.pread_replies.push_back(upgrade_ack);

        let mut device = PixartDevice::new(hid);
        let fw = Firmware::new(vec![9, 9, 9], "1.0");
        device.write_firmware(&fw, |_, _| {}).unwrap();
    }

    #[test]
    fn setup_populates_info() {
        let mut hid = MockHid::new();
        let mut info_reply = vec![0u8; 64];
        info_reply[0x02] = CMD_FW_GET_INFO;
        info_reply[0x03..0x08].copy_from_slice(b"9.9.9");
        info_reply[0x08..0x0a].copy_from_slice(&0x42u16.to_le_bytes());
        hid.feature_replies.push_back(info_reply);

        let mut device = PixartDevice::new(hid);
        device.setup().unwrap();
        assert_eq!(device.info().version_str(), "9.9.9");
        assert_eq!(device.info().checksum, 0x42);
    }
}
