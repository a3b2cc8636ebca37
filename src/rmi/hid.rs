use crate::error::{FuError, FuResult, ResultContext};
use crate::pixart::transport::HidTransport;
use crate::rmi::transport::RmiTransport;

/// Feature report ID used for RMI-over-HID register access (distinct from
/// the PixArt OTA report IDs in `pixart::wire` — this is a different HID
/// application entirely, sharing only the underlying `HidTransport`
/// primitive).
const RMI_HID_FEATURE_REPORT_ID: u8 = 0x0F;

/// `RmiTransport` over a plain HID register bus: addresses and data are
/// exchanged via `HIDIOCSFEATURE`/`HIDIOCGFEATURE` feature reports rather
/// than the byte-at-a-time PS/2 protocol. Page selection works the same way
/// as the PS/2 adaptor — a register write to `0xFF`.
pub struct RmiHidTransport<H: HidTransport> {
    hid: H,
    current_page: Option<u8>,
}

impl<H: HidTransport> RmiHidTransport<H> {
    pub fn new(hid: H) -> Self {
        Self {
            hid,
            current_page: None,
        }
    }
}

const PAGE_SELECT_REGISTER: u8 = 0xff;

/// Fixed 4-byte request header (`report id`, `op`, `addr`, `len`) ahead of
/// the response payload.
const REQ_HEADER_LEN: usize = 4;

impl<H: HidTransport> RmiTransport for RmiHidTransport<H> {
    fn read(&mut self, addr: u16, len: usize) -> FuResult<Vec<u8>> {
        self.set_page((addr >> 8) as u8)?;
        let mut req = vec![RMI_HID_FEATURE_REPORT_ID, 0x01, (addr & 0xFF) as u8, len as u8];
        req.resize((REQ_HEADER_LEN + len).max(8), 0);
        self.hid
            .feature_get(&mut req)
            .context(format!("rmi hid read {addr:#06x}"))?;
        Ok(req[REQ_HEADER_LEN..REQ_HEADER_LEN + len].to_vec())
    }

    fn read_packet(&mut self, addr: u16, len: usize) -> FuResult<Vec<u8>> {
        // the HID register bus addresses every register directly; there is
        // no distinct packet-register framing to apply.
        self.read(addr, len)
    }

    fn write(&mut self, addr: u16, data: &[u8]) -> FuResult<()> {
        self.set_page((addr >> 8) as u8)?;
        let mut req = vec![RMI_HID_FEATURE_REPORT_ID, 0x02, (addr & 0xFF) as u8];
        req.extend_from_slice(data);
        self.hid.pwrite(0, &req).context(format!("rmi hid write {addr:#06x}"))
    }

    fn set_page(&mut self, page: u8) -> FuResult<()> {
        if self.current_page == Some(page) {
            return Ok(());
        }
        let req = [RMI_HID_FEATURE_REPORT_ID, 0x02, PAGE_SELECT_REGISTER, page];
        self.hid.pwrite(0, &req).context("failed to set RMI page")?;
        self.current_page = Some(page);
        Ok(())
    }

    fn wait_for_attr(&mut self, _source_mask: u8, _timeout_ms: u64) -> FuResult<()> {
        Ok(())
    }

    fn query_status(&mut self) -> FuResult<bool> {
        let byte = self.read(0x0, 1)?[0];
        Ok(byte & 0x40 != 0)
    }

    fn query_build_id(&mut self) -> FuResult<u32> {
        Err(FuError::NotSupported(
            "query_build_id is a PS/2-only operation".into(),
        ))
    }

    fn query_product_sub_id(&mut self) -> FuResult<u8> {
        Err(FuError::NotSupported(
            "query_product_sub_id is a PS/2-only operation".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockHid {
        writes: Vec<Vec<u8>>,
        feature_reply: Vec<u8>,
    }

    impl HidTransport for MockHid {
        fn pwrite(&mut self, _port: u64, data: &[u8]) -> FuResult<()> {
            self.writes.push(data.to_vec());
            Ok(())
        }
        fn pread(&mut self, _port: u64, _buf: &mut [u8]) -> FuResult<()> {
            Ok(())
        }
        fn feature_get(&mut self, buf: &mut [u8]) -> FuResult<()> {
            let n = self.feature_reply.len().min(buf.len());
            buf[..n].copy_from_slice(&self.feature_reply[..n]);
            Ok(())
        }
    }

    #[test]
    fn set_page_is_only_written_once_per_page() {
        let mut reply = vec![0u8; 8];
        reply[4] = 0xAB;
        let hid = MockHid {
            writes: Vec::new(),
            feature_reply: reply,
        };
        let mut transport = RmiHidTransport::new(hid);
        transport.read(0x0100, 1).unwrap();
        transport.read(0x0101, 1).unwrap();
        let page_writes = transport
            .hid
            .writes
            .iter()
            .filter(|w| w.len() > 2 && w[2] == PAGE_SELECT_REGISTER)
            .count();
        assert_eq!(page_writes, 1);
    }

    /// `RmiV5Flash::setup` issues a 7-byte F34 block-properties read; the
    /// request buffer must grow to hold a response that long instead of
    /// staying pinned at the 8-byte minimum.
    #[test]
    fn read_of_more_than_four_bytes_does_not_panic() {
        let mut reply = vec![0u8; 11];
        reply[4..11].copy_from_slice(&[0x00, 0x40, 0x00, 0x10, 0x00, 0x05, 0x00]);
        let hid = MockHid {
            writes: Vec::new(),
            feature_reply: reply,
        };
        let mut transport = RmiHidTransport::new(hid);
        let data = transport.read(0x0042, 7).unwrap();
        assert_eq!(data, vec![0x00, 0x40, 0x00, 0x10, 0x00, 0x05, 0x00]);
    }
}
