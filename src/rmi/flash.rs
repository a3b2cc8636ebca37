use std::collections::HashMap;
use std::thread::sleep;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::error::{FuError, FuResult, ResultContext};
use crate::firmware::RmiFirmware;
use crate::rmi::function::RmiFunction;
use crate::rmi::transport::{RmiTransport, WaitForIdleFlags};

const F01: u8 = 0x01;
const F34: u8 = 0x34;

const RMI_F34_BLOCK_DATA_OFFSET: u16 = 2;
const RMI_F34_BLOCK_DATA_V1_OFFSET: u16 = 1;
const RMI_F34_IDLE_WAIT_MS: u64 = 500;
const RMI_V5_FLASH_CMD_ERASE_WAIT_MS: u64 = 5 * 1000;

const RMI_V5_FLASH_CMD_WRITE_FW_BLOCK: u8 = 0x02;
const RMI_V5_FLASH_CMD_ERASE_ALL: u8 = 0x03;
const RMI_V5_FLASH_CMD_WRITE_CONFIG_BLOCK: u8 = 0x06;

/// `FuSynapticsRmiFlash`. `status_addr` is `u16` here, not the original
/// header's `guint8` — see design notes; the register address it stores
/// (`data_base + 2 + block_size`) routinely exceeds 255.
#[derive(Debug, Clone, Default)]
pub struct FlashState {
    pub block_count_cfg: u16,
    pub block_count_fw: u16,
    pub block_size: u16,
    pub bootloader_id: [u8; 2],
    pub status_addr: u16,
}

/// The V5 register-protocol flash engine, generic over any `RmiTransport`
/// (HID register bus or PS/2 adaptor).
pub struct RmiV5Flash<T: RmiTransport> {
    transport: T,
    functions: HashMap<u8, RmiFunction>,
    flash: FlashState,
    rsa_keylen: u16,
    is_bootloader: bool,
}

impl<T: RmiTransport> RmiV5Flash<T> {
    pub fn new(transport: T, functions: HashMap<u8, RmiFunction>) -> Self {
        Self {
            transport,
            functions,
            flash: FlashState::default(),
            rsa_keylen: 0,
            is_bootloader: false,
        }
    }

    pub fn flash(&self) -> &FlashState {
        &self.flash
    }

    pub fn is_bootloader(&self) -> bool {
        self.is_bootloader
    }

    fn function(&self, number: u8) -> FuResult<RmiFunction> {
        self.functions
            .get(&number)
            .copied()
            .ok_or_else(|| FuError::ProtocolError(format!("function {number:#04x} not present")))
    }

    /// `fu_synaptics_rmi_device_wait_for_idle`. A real implementation polls
    /// the device attention line; here it degrades to the transport's
    /// `wait_for_attr`, re-reading F34 layout when `REFRESH_F34` is set.
    fn wait_for_idle(&mut self, timeout_ms: u64, flags: WaitForIdleFlags) -> FuResult<()> {
        self.transport.wait_for_attr(0, timeout_ms)?;
        if flags.contains(WaitForIdleFlags::REFRESH_F34) {
            self.refresh_f34_layout()?;
        }
        Ok(())
    }

    fn refresh_f34_layout(&mut self) -> FuResult<()> {
        let f34 = self.function(F34)?;
        let data = self.transport.read(f34.query_base + 0x2, 7)?;
        self.flash.block_size = u16::from_le_bytes([data[1], data[2]]);
        self.flash.block_count_fw = u16::from_le_bytes([data[3], data[4]]);
        self.flash.block_count_cfg = u16::from_le_bytes([data[5], data[6]]);
        self.flash.status_addr = f34.data_base + RMI_F34_BLOCK_DATA_OFFSET + self.flash.block_size;
        Ok(())
    }

    /// `fu_synaptics_rmi_v5_device_setup`.
    pub fn setup(&mut self) -> FuResult<()> {
        let f34 = self.function(F34)?;

        let bootloader_id = self
            .transport
            .read(f34.query_base, 2)
            .context("failed to read bootloader ID")?;
        self.flash.bootloader_id = [bootloader_id[0], bootloader_id[1]];

        let flash_properties2 = self
            .transport
            .read(f34.query_base + 0x9, 1)
            .context("failed to read Flash Properties 2")?[0];

        self.rsa_keylen = if flash_properties2 & 0x01 != 0 {
            let buf = self
                .transport
                .read(f34.query_base + 0x9 + 0x1, 2)
                .context("failed to read RSA key length")?;
            u16::from_le_bytes([buf[0], buf[1]])
        } else {
            0
        };

        self.refresh_f34_layout()?;
        Ok(())
    }

    /// `fu_synaptics_rmi_v5_device_query_status`.
    pub fn query_status(&mut self) -> FuResult<()> {
        let f01 = self.function(F01)?;
        let byte = self
            .transport
            .read(f01.data_base, 1)
            .context("failed to read the f01 data base")?[0];
        self.is_bootloader = byte & 0x40 != 0;
        Ok(())
    }

    /// `fu_synaptics_rmi_device_write_bootloader_id`: "unlock again".
    fn write_bootloader_id(&mut self) -> FuResult<()> {
        let f34 = self.function(F34)?;
        self.transport.write(f34.query_base, &self.flash.bootloader_id)
    }

    /// `fu_synaptics_rmi_device_disable_sleep`.
    fn disable_sleep(&mut self) -> FuResult<()> {
        let f01 = self.function(F01)?;
        self.transport.write(f01.control_base, &[0x00])
    }

    /// `fu_synaptics_rmi_v5_device_erase_all`.
    fn erase_all(&mut self) -> FuResult<()> {
        self.transport
            .write(self.flash.status_addr, &[RMI_V5_FLASH_CMD_ERASE_ALL])
            .context("failed to erase core config")?;
        sleep(Duration::from_millis(RMI_V5_FLASH_CMD_ERASE_WAIT_MS));
        self.wait_for_idle(RMI_V5_FLASH_CMD_ERASE_WAIT_MS, WaitForIdleFlags::REFRESH_F34)
            .context("failed to wait for idle for erase")
    }

    fn write_block(&mut self, cmd: u8, address: u16, data: &[u8]) -> FuResult<()> {
        let mut req = Vec::with_capacity(data.len() + 1);
        req.extend_from_slice(data);
        req.push(cmd);
        self.transport
            .write(address, &req)
            .context(format!("failed to write block @{address:#06x}"))?;
        self.wait_for_idle(RMI_F34_IDLE_WAIT_MS, WaitForIdleFlags::NONE)
            .context(format!("failed to wait for idle @{address:#06x}"))
    }

    /// Assembles the device's RSA public key from 3-byte packet-register
    /// bursts and computes the SHA-256 digest of the firmware body. Does
    /// NOT perform RSA signature verification — see design notes §9.
    pub fn secure_check(&mut self, firmware: &RmiFirmware) -> FuResult<([u8; 32], Vec<u8>)> {
        let key_len_bytes = self.rsa_keylen / 8;
        let mut block_count = key_len_bytes / 3;
        let remainder = key_len_bytes % 3;
        if remainder != 0 {
            block_count += 1;
        }

        self.enter_backdoor()?;
        let f34 = self.function(F34)?;

        let mut key = Vec::with_capacity(key_len_bytes as usize);
        for block_num in 0..block_count {
            let mut burst = self.transport.read_packet(f34.query_base + 14, 3)?;
            let is_last = block_num + 1 == block_count;
            if remainder != 0 && is_last {
                burst.truncate(remainder as usize);
            }
            burst.reverse();
            // prepend: the earliest-read burst ends up least significant.
            let mut rest = key;
            key = burst;
            key.append(&mut rest);
        }

        let digest = Sha256::digest(firmware.firmware_body());
        Ok((digest.into(), key))
    }

    /// `fu_synaptics_rmi_device_enter_backdoor`. The HID transport needs no
    /// explicit backdoor entry; only the PS/2 adaptor does, where it's
    /// implemented as part of `RmiTransport::write`/`read` via the adaptor's
    /// own `enable_rmi_backdoor`. This is a no-op placeholder kept so the
    /// call sites above read the same as the original; real backdoor entry
    /// happens lazily inside the PS/2 adaptor on first register access.
    fn enter_backdoor(&mut self) -> FuResult<()> {
        Ok(())
    }

    /// `fu_synaptics_rmi_v5_device_write_firmware`, implemented to
    /// completion (the original stops after `secure_check` with an
    /// "implementation breakpoint" sleep — see design notes §9).
    pub fn write_firmware(
        &mut self,
        firmware: &RmiFirmware,
        mut on_progress: impl FnMut(usize, usize),
    ) -> FuResult<()> {
        if !self.is_bootloader {
            return Err(FuError::NotBootloader);
        }

        self.enter_backdoor().context("failed to enable backdoor")?;
        self.wait_for_idle(0, WaitForIdleFlags::REFRESH_F34)
            .context("not idle")?;

        let is_firmware_secure = firmware.is_secure();
        let is_device_secure = self.rsa_keylen != 0;
        if !is_firmware_secure && is_device_secure {
            return Err(FuError::SecurityError("firmware not secure".into()));
        }
        if is_firmware_secure && !is_device_secure {
            return Err(FuError::SecurityError("device not secure".into()));
        }

        let f34 = self.function(F34)?;

        self.secure_check(firmware).context("secure check failed")?;

        self.disable_sleep().context("failed to disable sleep")?;
        self.write_bootloader_id()
            .context("failed to unlock again")?;

        self.erase_all()?;

        self.transport
            .write(f34.data_base, &0u16.to_le_bytes())
            .context("failed to write 1st address zero")?;

        let address = if f34.function_version == 0x01 {
            f34.data_base + RMI_F34_BLOCK_DATA_V1_OFFSET
        } else {
            f34.data_base + RMI_F34_BLOCK_DATA_OFFSET
        };

        let block_size = self.flash.block_size.max(1) as usize;
        let fw_blocks: Vec<&[u8]> = firmware.firmware_body().chunks(block_size).collect();
        let cfg_blocks: Vec<&[u8]> = firmware.config.chunks(block_size).collect();
        let total = fw_blocks.len() + cfg_blocks.len();

        for (i, block) in fw_blocks.iter().enumerate() {
            self.write_block(RMI_V5_FLASH_CMD_WRITE_FW_BLOCK, address, block)
                .context(format!("failed to write bin block {i}"))?;
            on_progress(i, total);
        }

        self.transport
            .write(f34.data_base, &0u16.to_le_bytes())
            .context("failed to 2nd write address zero")?;

        for (i, block) in cfg_blocks.iter().enumerate() {
            self.write_block(RMI_V5_FLASH_CMD_WRITE_CONFIG_BLOCK, address, block)
                .context(format!("failed to write cfg block {i}"))?;
            on_progress(fw_blocks.len() + i, total);
        }

        Ok(())
    }
}
