use crate::error::FuResult;

/// Minimal HID primitive the PixArt and RMI-HID protocols are built on. The
/// host owns the actual hidraw file descriptor and ioctl calls; this crate
/// only ever sees `pwrite`/`pread`/`feature_get`.
pub trait HidTransport {
    /// Writes `data` at device offset `port` (the PixArt protocol always
    /// writes at offset 0; `port` exists so `pread` below can share the
    /// signature used by the original's `fu_udev_device_p{read,write}_full`).
    fn pwrite(&mut self, port: u64, data: &[u8]) -> FuResult<()>;

    /// Reads exactly `buf.len()` bytes starting at device offset `port`.
    fn pread(&mut self, port: u64, buf: &mut [u8]) -> FuResult<()>;

    /// Issues a `HIDIOCGFEATURE` ioctl; `buf[0]` must be pre-seeded with the
    /// feature report ID by the caller, matching the original's calling
    /// convention.
    fn feature_get(&mut self, buf: &mut [u8]) -> FuResult<()>;
}
