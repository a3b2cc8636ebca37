use crate::error::{FuError, FuResult, ResultContext};
use crate::rmi::ps2::channel::{self, Ps2Channel};
use crate::rmi::transport::RmiTransport;

const RMI_DEVICE_PAGE_SELECT_REGISTER: u8 = 0xff;

/// Switches the Linux driver bound to the PS/2 port between `psmouse`
/// (runtime) and `serio_raw` (bootloader) by writing to the device's sysfs
/// `drvctl` attribute, and re-opens the device afterwards. The actual sysfs
/// I/O is the host's responsibility.
pub trait Ps2ModeSwitch {
    fn write_drvctl(&mut self, mode: &str) -> FuResult<()>;
    fn close(&mut self) -> FuResult<()>;
    fn rescan(&mut self) -> FuResult<()>;
    fn open(&mut self) -> FuResult<()>;
}

/// Adapts the byte-level PS/2 protocol to the `RmiTransport` register-bus
/// interface. Holds the sticky `in_backdoor` flag.
pub struct Ps2RmiAdaptor<C: Ps2Channel, S: Ps2ModeSwitch> {
    channel: C,
    mode: S,
    in_backdoor: bool,
    is_bootloader: bool,
}

impl<C: Ps2Channel, S: Ps2ModeSwitch> Ps2RmiAdaptor<C, S> {
    pub fn new(channel: C, mode: S, is_bootloader: bool) -> Self {
        Self {
            channel,
            mode,
            in_backdoor: false,
            is_bootloader,
        }
    }

    pub fn is_bootloader(&self) -> bool {
        self.is_bootloader
    }

    pub fn in_backdoor(&self) -> bool {
        self.in_backdoor
    }

    /// `fu_synaptics_rmi_ps2_device_enable_rmi_backdoor`: idempotent.
    fn enable_rmi_backdoor(&mut self) -> FuResult<()> {
        if self.in_backdoor {
            return Ok(());
        }
        channel::write_byte(&mut self.channel, channel::AUX_DISABLE, 50)
            .context("failed to disable stream mode")?;
        log::debug!("enabling RMI backdoor");
        channel::sample_rate_sequence(
            &mut self.channel,
            channel::SET_MODE_BYTE_2,
            channel::FULL_RMI_BACKDOOR,
            false,
        )
        .context("failed to enter RMI mode")?;
        self.in_backdoor = true;
        Ok(())
    }

    /// `fu_synaptics_rmi_ps2_device_write_rmi_register`.
    fn write_rmi_register(&mut self, addr: u8, data: &[u8], timeout_ms: u32) -> FuResult<()> {
        self.enable_rmi_backdoor()
            .context("failed to enable RMI backdoor")?;
        channel::write_byte(&mut self.channel, channel::AUX_SET_SCALING_2TO1, timeout_ms)
            .context("failed to edpAuxSetScaling2To1")?;
        channel::write_byte(&mut self.channel, channel::AUX_SET_SAMPLE_RATE, timeout_ms)
            .context("failed to edpAuxSetSampleRate")?;
        channel::write_byte(&mut self.channel, addr, timeout_ms)
            .context("failed to write address")?;
        for (i, &byte) in data.iter().enumerate() {
            channel::write_byte(&mut self.channel, channel::AUX_SET_SAMPLE_RATE, timeout_ms)
                .context(format!("failed to set byte {i}"))?;
            channel::write_byte(&mut self.channel, byte, timeout_ms)
                .context(format!("failed to write byte {i}"))?;
        }
        std::thread::sleep(std::time::Duration::from_millis(20));
        Ok(())
    }

    /// `fu_synaptics_rmi_ps2_device_read_rmi_register`: the low byte of a
    /// little-endian 24-bit assembly — opposite byte order from
    /// `status_request_sequence`'s big-endian assembly.
    fn read_rmi_register(&mut self, addr: u8) -> FuResult<u8> {
        self.enable_rmi_backdoor()
            .context("failed to enable RMI backdoor")?;
        channel::write_byte(&mut self.channel, channel::AUX_SET_SCALING_2TO1, 50)
            .and_then(|_| channel::write_byte(&mut self.channel, channel::AUX_SET_SAMPLE_RATE, 50))
            .and_then(|_| channel::write_byte(&mut self.channel, addr, 50))
            .and_then(|_| channel::write_byte(&mut self.channel, channel::AUX_STATUS_REQUEST, 50))
            .context("failed to write command in Read RMI register")?;

        let mut response: u32 = 0;
        for i in 0..3u32 {
            let tmp = channel::read_byte(&mut self.channel, 500)
                .context(format!("failed to read byte {i}"))?;
            response |= (tmp as u32) << (8 * i);
        }
        std::thread::sleep(std::time::Duration::from_millis(20));
        Ok(response as u8)
    }

    /// `fu_synaptics_rmi_ps2_device_read_rmi_packet_register`: returns all
    /// `req_sz` bytes rather than folding to a single byte.
    fn read_rmi_packet_register(&mut self, addr: u8, req_sz: usize) -> FuResult<Vec<u8>> {
        self.enable_rmi_backdoor()
            .context("failed to enable RMI backdoor")?;
        channel::write_byte(&mut self.channel, channel::AUX_SET_SCALING_2TO1, 50)
            .and_then(|_| channel::write_byte(&mut self.channel, channel::AUX_SET_SAMPLE_RATE, 50))
            .and_then(|_| channel::write_byte(&mut self.channel, addr, 50))
            .and_then(|_| channel::write_byte(&mut self.channel, channel::AUX_STATUS_REQUEST, 50))
            .context("failed to write command in Read RMI Packet Register")?;

        let mut buf = Vec::with_capacity(req_sz);
        for i in 0..req_sz {
            let tmp = channel::read_byte(&mut self.channel, 50)
                .context(format!("failed to read byte {i}"))?;
            buf.push(tmp);
        }
        std::thread::sleep(std::time::Duration::from_millis(20));
        Ok(buf)
    }

    /// `fu_synaptics_rmi_ps2_device_query_build_id`.
    fn query_build_id(&mut self) -> FuResult<u32> {
        self.in_backdoor = false;

        let status = channel::status_request_sequence(&mut self.channel, channel::ESR_IDENTIFY_SYNAPTICS)
            .context("failed to status request sequence for IdentifySynaptics")?;
        log::debug!("Identify Synaptics response = {status:#x}");

        let is_touchpad = channel::is_touchpad_response(status);
        let is_stick = channel::detect_synaptics_styk(&mut self.channel)
            .context("failed to detect Synaptics styk")?;

        if !(is_touchpad || is_stick) {
            return Ok(0);
        }

        log::debug!("trying to query capability2");
        let build_id = channel::status_request_sequence(&mut self.channel, channel::ESR_READ_EXTRA_CAPABILITIES_2)
            .context("failed to status_request_sequence read extraCapabilities2")?;
        Ok(build_id)
    }

    /// `fu_synaptics_rmi_ps2_device_query_product_sub_id`. Returns a real
    /// `Result` rather than the original's unchecked `NULL`/`0` conflation.
    fn query_product_sub_id(&mut self) -> FuResult<u8> {
        let status = channel::status_request_sequence(&mut self.channel, channel::ESR_READ_CAPABILITIES)
            .context("failed to status_request_sequence read esrReadCapabilities")?;
        Ok(((status >> 8) & 0xFF) as u8)
    }

    /// `fu_synaptics_rmi_ps2_device_detach`.
    pub fn detach(&mut self) -> FuResult<()> {
        if self.is_bootloader {
            log::debug!("already in bootloader mode, skipping");
            return Ok(());
        }
        self.mode
            .write_drvctl("serio_raw")
            .context("failed to write to drvctl")?;
        self.mode.close()?;
        self.mode.rescan()?;
        self.mode.open()?;
        self.is_bootloader = true;
        self.enable_rmi_backdoor()
            .context("failed to enable RMI backdoor")
    }

    /// `fu_synaptics_rmi_ps2_device_attach`.
    pub fn attach(&mut self) -> FuResult<()> {
        if !self.is_bootloader {
            log::debug!("already in runtime mode, skipping");
            return Ok(());
        }
        self.mode
            .write_drvctl("psmouse")
            .context("failed to write to drvctl")?;
        self.in_backdoor = false;
        self.is_bootloader = false;
        self.mode.rescan()
    }

    /// `fu_synaptics_rmi_ps2_device_open`: drains stale input, resets, and
    /// confirms the `0xAA 0x00` announcement, only while in bootloader mode.
    pub fn open(&mut self) -> FuResult<()> {
        if !self.is_bootloader {
            return Ok(());
        }

        for _ in 0..0xffffu32 {
            if channel::read_byte(&mut self.channel, 20).is_err() {
                break;
            }
        }

        channel::write_byte(&mut self.channel, channel::AUX_RESET, 600)
            .context("failed to reset")?;

        let b0 = channel::read_byte(&mut self.channel, 500)
            .context("failed to read 0xAA00")?;
        let b1 = channel::read_byte(&mut self.channel, 500)
            .context("failed to read 0xAA00")?;
        if b0 != 0xAA || b1 != 0x00 {
            return Err(FuError::ProtocolError(format!(
                "failed to read 0xAA00, got {b0:#04x}{b1:#04x}"
            )));
        }

        channel::write_byte(&mut self.channel, channel::AUX_DISABLE, 50)
            .context("failed to disable stream mode")
    }
}

impl<C: Ps2Channel, S: Ps2ModeSwitch> RmiTransport for Ps2RmiAdaptor<C, S> {
    fn read(&mut self, addr: u16, len: usize) -> FuResult<Vec<u8>> {
        self.set_page((addr >> 8) as u8)
            .context("failed to set RMI page")?;
        let mut buf = Vec::with_capacity(len);
        for i in 0..len {
            let reg_addr = ((addr & 0x00FF) as usize + i) as u8;
            let byte = self
                .read_rmi_register(reg_addr)
                .context(format!("failed register read {addr:#06x}"))?;
            buf.push(byte);
        }
        Ok(buf)
    }

    fn read_packet(&mut self, addr: u16, len: usize) -> FuResult<Vec<u8>> {
        self.set_page((addr >> 8) as u8)
            .context("failed to set RMI page")?;
        self.read_rmi_packet_register((addr & 0x00FF) as u8, len)
            .context(format!("failed packet register read {addr:#06x}"))
    }

    fn write(&mut self, addr: u16, data: &[u8]) -> FuResult<()> {
        self.set_page((addr >> 8) as u8)
            .context("failed to set RMI page")?;
        self.write_rmi_register((addr & 0x00FF) as u8, data, 999)
            .context(format!("failed to write register {addr:#06x}"))
    }

    fn set_page(&mut self, page: u8) -> FuResult<()> {
        self.write_rmi_register(RMI_DEVICE_PAGE_SELECT_REGISTER, &[page], 20)
            .context(format!("failed to write page {page}"))
    }

    fn wait_for_attr(&mut self, _source_mask: u8, _timeout_ms: u64) -> FuResult<()> {
        Ok(())
    }

    /// "this doesn't work in PS/2 mode".
    fn query_status(&mut self) -> FuResult<bool> {
        Ok(self.is_bootloader)
    }

    fn query_build_id(&mut self) -> FuResult<u32> {
        self.query_build_id()
    }

    fn query_product_sub_id(&mut self) -> FuResult<u8> {
        self.query_product_sub_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rmi::ps2::channel::{Ps2IoError, ACK};
    use std::collections::VecDeque;

    struct MockChannel {
        acks: VecDeque<u8>,
        reads: VecDeque<u8>,
        writes: Vec<u8>,
    }

    impl MockChannel {
        fn new() -> Self {
            Self {
                acks: VecDeque::new(),
                reads: VecDeque::new(),
                writes: Vec::new(),
            }
        }

        fn ack_every_write(mut self, n: usize) -> Self {
            for _ in 0..n {
                self.acks.push_back(ACK);
            }
            self
        }
    }

    impl Ps2Channel for MockChannel {
        fn read_raw(&mut self, _timeout_ms: u32) -> Result<u8, Ps2IoError> {
            if let Some(b) = self.acks.pop_front() {
                return Ok(b);
            }
            self.reads.pop_front().ok_or(Ps2IoError::TimedOut)
        }

        fn write_raw(&mut self, byte: u8, _timeout_ms: u32) -> FuResult<()> {
            self.writes.push(byte);
            Ok(())
        }

        fn resend_delay(&self) -> std::time::Duration {
            std::time::Duration::ZERO
        }

        fn error_delay(&self) -> std::time::Duration {
            std::time::Duration::ZERO
        }

        fn poll_delay(&self) -> std::time::Duration {
            std::time::Duration::ZERO
        }
    }

    struct MockMode {
        events: Vec<&'static str>,
    }

    impl Ps2ModeSwitch for MockMode {
        fn write_drvctl(&mut self, mode: &str) -> FuResult<()> {
            self.events.push(if mode == "serio_raw" { "serio_raw" } else { "psmouse" });
            Ok(())
        }
        fn close(&mut self) -> FuResult<()> {
            self.events.push("close");
            Ok(())
        }
        fn rescan(&mut self) -> FuResult<()> {
            self.events.push("rescan");
            Ok(())
        }
        fn open(&mut self) -> FuResult<()> {
            self.events.push("open");
            Ok(())
        }
    }

    fn adaptor_with_acks(n: usize) -> Ps2RmiAdaptor<MockChannel, MockMode> {
        Ps2RmiAdaptor::new(
            MockChannel::new().ack_every_write(n),
            MockMode { events: Vec::new() },
            true,
        )
    }

    #[test]
    fn enable_rmi_backdoor_is_idempotent() {
        let mut adaptor = adaptor_with_acks(2);
        adaptor.enable_rmi_backdoor().unwrap();
        let writes_after_first = adaptor.channel.writes.len();
        adaptor.enable_rmi_backdoor().unwrap();
        assert_eq!(adaptor.channel.writes.len(), writes_after_first);
        assert!(adaptor.in_backdoor());
    }

    #[test]
    fn read_rmi_register_takes_low_byte_of_le_assembly() {
        // disable + sample-rate-sequence (set_scaling, 4x resolution pairs,
        // sample-rate, param) + set_scaling_2to1 + sample_rate + addr + status_request
        let mut adaptor = adaptor_with_acks(20);
        adaptor.channel.reads.push_back(0x34); // byte 0 -> lowest byte
        adaptor.channel.reads.push_back(0x12);
        adaptor.channel.reads.push_back(0x00);
        let value = adaptor.read_rmi_register(0x10).unwrap();
        assert_eq!(value, 0x34);
    }

    #[test]
    fn detach_is_noop_already_bootloader() {
        let mut adaptor = Ps2RmiAdaptor::new(
            MockChannel::new(),
            MockMode { events: Vec::new() },
            true,
        );
        adaptor.detach().unwrap();
        assert!(adaptor.mode.events.is_empty());
    }
}
