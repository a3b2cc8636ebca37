use bitflags::bitflags;

use crate::error::FuResult;

bitflags! {
    /// `RmiDeviceWaitForIdleFlags`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WaitForIdleFlags: u8 {
        const NONE = 0;
        /// Force a re-scan of F34 after the wait; erase can change its layout.
        const REFRESH_F34 = 1 << 0;
    }
}

/// The capability interface a concrete RMI bus (HID register bus or PS/2
/// adaptor) must provide. The V5 flash engine is generic over this trait,
/// mirroring `FuSynapticsRmiDeviceClass`'s function-pointer table.
pub trait RmiTransport {
    /// Reads `len` bytes starting at `addr`.
    fn read(&mut self, addr: u16, len: usize) -> FuResult<Vec<u8>>;

    /// Reads `len` bytes starting at `addr` using packet-register framing.
    /// Only the V5 secure-check RSA key-burst reads need this; every other
    /// caller uses [`RmiTransport::read`].
    fn read_packet(&mut self, addr: u16, len: usize) -> FuResult<Vec<u8>>;

    fn write(&mut self, addr: u16, data: &[u8]) -> FuResult<()>;

    fn set_page(&mut self, page: u8) -> FuResult<()>;

    fn wait_for_attr(&mut self, source_mask: u8, timeout_ms: u64) -> FuResult<()>;

    fn query_status(&mut self) -> FuResult<bool>;

    fn query_build_id(&mut self) -> FuResult<u32>;

    fn query_product_sub_id(&mut self) -> FuResult<u8>;
}
