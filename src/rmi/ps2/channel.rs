use std::thread::sleep;
use std::time::Duration;

use crate::error::{FuError, FuResult, ResultContext};

pub const ACK: u8 = 0xFA;
pub const RESEND: u8 = 0xFE;
pub const ERROR: u8 = 0xFC;

pub const AUX_SET_SCALING_1TO1: u8 = 0xE6;
pub const AUX_SET_SCALING_2TO1: u8 = 0xE7;
pub const AUX_SET_RESOLUTION: u8 = 0xE8;
pub const AUX_STATUS_REQUEST: u8 = 0xE9;
pub const AUX_SET_SAMPLE_RATE: u8 = 0xF3;
pub const AUX_DISABLE: u8 = 0xF5;
pub const AUX_RESET: u8 = 0xFF;
pub const AUX_IBM_READ_SECONDARY_ID: u8 = 0xE1;

pub const SET_MODE_BYTE_2: u8 = 0x14;
pub const FULL_RMI_BACKDOOR: u8 = 0x00;

pub const ESR_IDENTIFY_SYNAPTICS: u8 = 0x00;
pub const ESR_READ_EXTRA_CAPABILITIES_2: u8 = 0x06;
pub const ESR_READ_CAPABILITIES: u8 = 0x02;

const ESDT_JYT_SYNA: u8 = 0x05;
const ESDT_SYNAPTICS: u8 = 0x47;
const ESDR_TOUCHPAD: u8 = 0x00;

/// Whether a PS/2 read timed out (recoverable by retrying) or failed for
/// some other reason (fatal).
pub enum Ps2IoError {
    TimedOut,
    Other(FuError),
}

impl From<Ps2IoError> for FuError {
    fn from(e: Ps2IoError) -> Self {
        match e {
            Ps2IoError::TimedOut => FuError::ReadError("timed out".into()),
            Ps2IoError::Other(e) => e,
        }
    }
}

/// The byte-level serial channel a PS/2 touchpad/stick is attached to. The
/// host owns the actual `/dev/serio_raw*` fd; flush-on-write and blocking
/// I/O are the host's responsibility, matching `FU_IO_CHANNEL_FLAG_FLUSH_INPUT
/// | FU_IO_CHANNEL_FLAG_USE_BLOCKING_IO`.
pub trait Ps2Channel {
    fn read_raw(&mut self, timeout_ms: u32) -> Result<u8, Ps2IoError>;
    fn write_raw(&mut self, byte: u8, timeout_ms: u32) -> FuResult<()>;

    /// Delay before resending after a `RESEND` response. Real hardware needs
    /// the full contractual second (§5); mock channels used in tests
    /// override this to zero so retry-heavy tests stay fast.
    fn resend_delay(&self) -> Duration {
        Duration::from_secs(1)
    }

    /// Delay before resending after an `ERROR` response, and the pause after
    /// an unrecognized ack byte.
    fn error_delay(&self) -> Duration {
        Duration::from_millis(10)
    }

    /// Delay between `read_ack` poll attempts on timeout.
    fn poll_delay(&self) -> Duration {
        Duration::from_micros(30)
    }
}

/// `fu_synaptics_rmi_ps2_device_read_ack`: poll up to 60 times, sleeping
/// `channel.poll_delay()` between timeouts.
pub fn read_ack(channel: &mut impl Ps2Channel) -> FuResult<u8> {
    for i in 0..60 {
        match channel.read_raw(60) {
            Ok(byte) => return Ok(byte),
            Err(Ps2IoError::TimedOut) => {
                log::warn!("read timed out: {i}");
                sleep(channel.poll_delay());
            }
            Err(Ps2IoError::Other(e)) => return Err(e),
        }
    }
    Err(FuError::ReadError("failed".into()))
}

/// `fu_synaptics_rmi_ps2_device_read_byte`.
pub fn read_byte(channel: &mut impl Ps2Channel, timeout_ms: u32) -> FuResult<u8> {
    channel.read_raw(timeout_ms).map_err(FuError::from)
}

/// `fu_synaptics_rmi_ps2_device_write_byte`: write `byte`, then read an
/// acknowledge, resending per the device's response. Retries the whole
/// write up to 3 times if the ack read itself fails.
pub fn write_byte(channel: &mut impl Ps2Channel, byte: u8, timeout_ms: u32) -> FuResult<()> {
    let mut do_write = true;
    let mut i = 0u32;
    loop {
        if do_write {
            channel.write_raw(byte, timeout_ms)?;
        }
        do_write = false;

        let res = match read_ack(channel) {
            Ok(res) => res,
            Err(e) => {
                if i > 3 {
                    return Err(e).context("read ack failed");
                }
                log::warn!("read ack failed: {e}, retrying");
                i += 1;
                continue;
            }
        };

        if res == ACK {
            break;
        }
        if res == RESEND {
            do_write = true;
            sleep(channel.resend_delay());
            continue;
        }
        if res == ERROR {
            do_write = true;
            sleep(channel.error_delay());
            continue;
        }
        log::debug!("other response: {res:#04x}");
        sleep(channel.error_delay());
    }
    Ok(())
}

/// `fu_synaptics_rmi_ps2_device_set_resolution_sequence`: encodes an 8-bit
/// argument as four 2-bit `SET_RESOLUTION` writes, MSB pair first.
pub fn set_resolution_sequence(channel: &mut impl Ps2Channel, arg: u8, send_e6s: bool) -> FuResult<()> {
    let count = if send_e6s { 2 } else { 1 };
    for _ in 0..count {
        write_byte(channel, AUX_SET_SCALING_1TO1, 50)?;
    }
    for i in (0..4).rev() {
        let two_bits = (arg >> (i * 2)) & 0x3;
        write_byte(channel, AUX_SET_RESOLUTION, 50)?;
        write_byte(channel, two_bits, 50)?;
    }
    Ok(())
}

/// `fu_synaptics_rmi_ps2_device_status_request_sequence`: assembles a
/// 24-bit response big-endian.
pub fn status_request_sequence(channel: &mut impl Ps2Channel, argument: u8) -> FuResult<u32> {
    let mut ok = false;
    for _ in 0..3 {
        if set_resolution_sequence(channel, argument, false).is_err() {
            continue;
        }
        if write_byte(channel, AUX_STATUS_REQUEST, 10).is_err() {
            continue;
        }
        ok = true;
        break;
    }
    if !ok {
        return Err(FuError::ProtocolError("status request sequence failed".into()));
    }

    let mut buf = 0u32;
    for _ in 0..3 {
        let byte = read_byte(channel, 10).context("failed to read byte")?;
        buf = (buf << 8) | byte as u32;
    }
    Ok(buf)
}

/// `fu_synaptics_rmi_ps2_device_sample_rate_sequence`: up to 4 attempts,
/// forcing `send_e6s = true` on every retry.
pub fn sample_rate_sequence(
    channel: &mut impl Ps2Channel,
    param: u8,
    arg: u8,
    mut send_e6s: bool,
) -> FuResult<()> {
    for i in 0.. {
        if i > 0 {
            send_e6s = true;
        }
        let attempt = (|| -> FuResult<()> {
            set_resolution_sequence(channel, arg, send_e6s)?;
            write_byte(channel, AUX_SET_SAMPLE_RATE, 50)?;
            write_byte(channel, param, 50)?;
            Ok(())
        })();
        match attempt {
            Ok(()) => return Ok(()),
            Err(e) => {
                if i > 3 {
                    return Err(e);
                }
                log::warn!("sample rate sequence failed, will retry: {e}");
            }
        }
    }
    unreachable!()
}

/// `fu_synaptics_rmi_ps2_device_detect_synaptics_styk`.
pub fn detect_synaptics_styk(channel: &mut impl Ps2Channel) -> FuResult<bool> {
    write_byte(channel, AUX_IBM_READ_SECONDARY_ID, 10).context("failed to write IBMReadSecondaryID(0xE1)")?;
    let data = read_byte(channel, 10).context("failed to receive IBMReadSecondaryID")?;
    Ok(data == ESDT_JYT_SYNA || data == ESDT_SYNAPTICS)
}

pub fn is_touchpad_response(status: u32) -> bool {
    ((status & 0xFF00) >> 8) as u8 == ESDR_TOUCHPAD
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct MockChannel {
        writes: Vec<u8>,
        acks: VecDeque<u8>,
        reads: VecDeque<u8>,
    }

    impl MockChannel {
        fn new() -> Self {
            Self {
                writes: Vec::new(),
                acks: VecDeque::new(),
                reads: VecDeque::new(),
            }
        }
    }

    impl Ps2Channel for MockChannel {
        fn read_raw(&mut self, _timeout_ms: u32) -> Result<u8, Ps2IoError> {
            if let Some(b) = self.acks.pop_front() {
                return Ok(b);
            }
            self.reads
                .pop_front()
                .ok_or(Ps2IoError::Other(FuError::ReadError("empty".into())))
        }

        fn write_raw(&mut self, byte: u8, _timeout_ms: u32) -> FuResult<()> {
            self.writes.push(byte);
            Ok(())
        }

        // tests don't exercise real hardware timing, so the contractual
        // resend/error/poll delays would otherwise cost whole seconds per run.
        fn resend_delay(&self) -> Duration {
            Duration::ZERO
        }

        fn error_delay(&self) -> Duration {
            Duration::ZERO
        }

        fn poll_delay(&self) -> Duration {
            Duration::ZERO
        }
    }

    #[test]
    fn write_byte_acks_immediately() {
        let mut channel = MockChannel::new();
        channel.acks.push_back(ACK);
        write_byte(&mut channel, 0x42, 50).unwrap();
        assert_eq!(channel.writes, vec![0x42]);
    }

    #[test]
    fn write_byte_resends_twice_then_acks() {
        let mut channel = MockChannel::new();
        channel.acks.push_back(RESEND);
        channel.acks.push_back(RESEND);
        channel.acks.push_back(ACK);
        write_byte(&mut channel, 0x42, 50).unwrap();
        // the byte gets written once per RESEND plus the initial write.
        assert_eq!(channel.writes, vec![0x42, 0x42, 0x42]);
    }
}
