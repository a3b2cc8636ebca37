//! Command-line demo that drives the PixArt and Synaptics RMI state
//! machines against small in-process simulated devices, the way the
//! workspace's other emulator binary drives its bus model from the CLI.

use std::collections::HashMap;

use clap::{Parser, Subcommand};

use fu_core::error::{FuError, FuResult};
use fu_core::firmware::{Firmware, RmiFirmware};
use fu_core::orchestrate::{FlashOrchestrator, FlashPhase, FlashProgress, PixartFlashable, RmiFlashable};
use fu_core::pixart::device::PixartDevice;
use fu_core::pixart::transport::HidTransport;
use fu_core::pixart::wire::{self, OtaState};
use fu_core::rmi::flash::RmiV5Flash;
use fu_core::rmi::function::RmiFunction;
use fu_core::rmi::transport::RmiTransport;

#[derive(Parser)]
#[command(name = "fu-sim", about = "Simulate a firmware update against an in-process device")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Flash a simulated PixArt RF device.
    Pixart {
        #[arg(long, default_value_t = 8192)]
        size: usize,
        #[arg(long, default_value_t = 64)]
        prn_threshold: u16,
    },
    /// Flash a simulated Synaptics RMI V5 device.
    Rmi {
        #[arg(long, default_value_t = 2048)]
        fw_size: usize,
        #[arg(long, default_value_t = 512)]
        cfg_size: usize,
        #[arg(long, default_value_t = 128)]
        block_size: u16,
    },
}

struct ConsoleProgress;

impl FlashProgress for ConsoleProgress {
    fn on_phase(&mut self, phase: FlashPhase) {
        println!("[fu-sim] {phase}");
    }
    fn on_error(&mut self, error: &FuError) {
        eprintln!("[fu-sim] failed: {error}");
    }
}

/// A simulated PixArt HID device. Unlike a mock used purely for unit tests,
/// this one actually accumulates object bytes and answers with the real
/// running checksum, so `fu-sim pixart` completes a full update end to end.
struct SimPixartHid {
    prn_threshold: u16,
    last_cmd: u8,
    object_remaining: usize,
    object_bytes: Vec<u8>,
}

impl HidTransport for SimPixartHid {
    fn pwrite(&mut self, _port: u64, data: &[u8]) -> FuResult<()> {
        if self.object_remaining > 0 {
            // mid-object: every write is a 20-byte (or shorter, final)
            // payload, never a command.
            let payload = &data[1..];
            self.object_bytes.extend_from_slice(payload);
            self.object_remaining = self.object_remaining.saturating_sub(payload.len());
            return Ok(());
        }
        self.last_cmd = data[1];
        if self.last_cmd == wire::CMD_FW_OBJECT_CREATE {
            let size = u32::from_le_bytes([data[6], data[7], data[8], data[9]]) as usize;
            self.object_bytes.clear();
            self.object_remaining = size;
        }
        Ok(())
    }

    fn pread(&mut self, port: u64, buf: &mut [u8]) -> FuResult<()> {
        buf.fill(0);
        if port == 0x1 {
            buf[0x01] = if self.last_cmd == wire::CMD_FW_UPGRADE {
                wire::CMD_FW_UPGRADE
            } else {
                wire::CMD_FW_WRITE
            };
        } else {
            let checksum = wire::checksum(&self.object_bytes);
            buf[0x02..0x04].copy_from_slice(&checksum.to_le_bytes());
        }
        Ok(())
    }

    fn feature_get(&mut self, buf: &mut [u8]) -> FuResult<()> {
        match self.last_cmd {
            wire::CMD_FW_OTA_INIT_NEW => {
                let state = OtaState {
                    status: 0,
                    new_flow: 0,
                    offset: 0,
                    checksum: 0,
                    max_object_size: wire::OBJECT_SIZE_MAX as u32,
                    mtu_size: 64,
                    prn_threshold: self.prn_threshold,
                    spec_check_result: 0,
                };
                buf[0x02] = state.status;
                buf[0x03] = state.new_flow;
                buf[0x04..0x06].copy_from_slice(&state.offset.to_le_bytes());
                buf[0x06..0x08].copy_from_slice(&state.checksum.to_le_bytes());
                buf[0x08..0x0c].copy_from_slice(&state.max_object_size.to_le_bytes());
                buf[0x0c..0x0e].copy_from_slice(&state.mtu_size.to_le_bytes());
                buf[0x0e..0x10].copy_from_slice(&state.prn_threshold.to_le_bytes());
            }
            wire::CMD_FW_GET_INFO => {
                buf[0x02] = wire::CMD_FW_GET_INFO;
                buf[0x03..0x08].copy_from_slice(b"1.0.0");
            }
            _ => {}
        }
        Ok(())
    }
}

fn run_pixart(size: usize, prn_threshold: u16) {
    let hid = SimPixartHid {
        prn_threshold,
        last_cmd: 0,
        object_remaining: 0,
        object_bytes: Vec::new(),
    };
    let mut device = PixartDevice::new(hid);
    let fw = Firmware::new(vec![0xAAu8; size], "1.2.3");

    let mut progress = ConsoleProgress;
    let mut orchestrator = FlashOrchestrator::new(&mut progress);

    let result = (|| -> FuResult<()> {
        device.setup()?;
        let mut flashable = PixartFlashable {
            device: &mut device,
            firmware: &fw,
        };
        orchestrator.run(&mut flashable)
    })();

    match result {
        Ok(()) => println!("pixart: device reports version {}", device.info().version_str()),
        Err(e) => eprintln!("pixart: simulation failed: {e}"),
    }
}

/// A simulated RMI register space. Stores register bytes in a sparse map
/// and reacts to the flash-command writes a real F34 implementation would.
struct SimRmiTransport {
    regs: HashMap<u16, u8>,
    bootloader: bool,
}

impl SimRmiTransport {
    fn set(&mut self, addr: u16, data: &[u8]) {
        for (i, &b) in data.iter().enumerate() {
            self.regs.insert(addr + i as u16, b);
        }
    }

    fn get(&self, addr: u16, len: usize) -> Vec<u8> {
        (0..len).map(|i| *self.regs.get(&(addr + i as u16)).unwrap_or(&0)).collect()
    }
}

impl RmiTransport for SimRmiTransport {
    fn read(&mut self, addr: u16, len: usize) -> FuResult<Vec<u8>> {
        Ok(self.get(addr, len))
    }
    fn read_packet(&mut self, addr: u16, len: usize) -> FuResult<Vec<u8>> {
        Ok(self.get(addr, len))
    }
    fn write(&mut self, addr: u16, data: &[u8]) -> FuResult<()> {
        self.set(addr, data);
        Ok(())
    }
    fn set_page(&mut self, _page: u8) -> FuResult<()> {
        Ok(())
    }
    fn wait_for_attr(&mut self, _source_mask: u8, _timeout_ms: u64) -> FuResult<()> {
        Ok(())
    }
    fn query_status(&mut self) -> FuResult<bool> {
        Ok(self.bootloader)
    }
    fn query_build_id(&mut self) -> FuResult<u32> {
        Ok(0)
    }
    fn query_product_sub_id(&mut self) -> FuResult<u8> {
        Ok(0)
    }
}

fn run_rmi(fw_size: usize, cfg_size: usize, block_size: u16) {
    let mut transport = SimRmiTransport {
        regs: HashMap::new(),
        bootloader: true,
    };
    // seed the F01 status byte so query_status() observes bootloader mode (bit 6).
    transport.set(0x10, &[0x40]);
    // seed F34 query registers: bootloader id, flash_properties2 (non-secure), block layout
    transport.set(0x40, &[0x01, 0x02]);
    transport.set(0x49, &[0x00]);
    transport.set(
        0x42,
        &[
            0x00,
            block_size.to_le_bytes()[0],
            block_size.to_le_bytes()[1],
            ((fw_size / block_size.max(1) as usize) as u16).to_le_bytes()[0],
            ((fw_size / block_size.max(1) as usize) as u16).to_le_bytes()[1],
            ((cfg_size / block_size.max(1) as usize) as u16).to_le_bytes()[0],
            ((cfg_size / block_size.max(1) as usize) as u16).to_le_bytes()[1],
        ],
    );

    let mut functions = HashMap::new();
    functions.insert(
        0x01u8,
        RmiFunction {
            function_number: 0x01,
            data_base: 0x10,
            control_base: 0x20,
            ..Default::default()
        },
    );
    functions.insert(
        0x34u8,
        RmiFunction {
            function_number: 0x34,
            query_base: 0x40,
            data_base: 0x50,
            function_version: 0,
            ..Default::default()
        },
    );

    let mut flash = RmiV5Flash::new(transport, functions);
    let mut progress = ConsoleProgress;
    let mut orchestrator = FlashOrchestrator::new(&mut progress);

    let result = (|| -> FuResult<()> {
        flash.setup()?;
        flash.query_status()?;
        let fw = RmiFirmware::new(vec![0x11u8; fw_size], vec![0x22u8; cfg_size], 0, "2.0.0");
        let mut flashable = RmiFlashable {
            flash: &mut flash,
            firmware: &fw,
        };
        orchestrator.run(&mut flashable)
    })();

    if let Err(e) = result {
        eprintln!("rmi: simulation failed: {e}");
    } else {
        println!(
            "rmi: wrote {} fw bytes / {} cfg bytes over {} blocks",
            fw_size, cfg_size, flash.flash().block_size
        );
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Command::Pixart { size, prn_threshold } => run_pixart(size, prn_threshold),
        Command::Rmi {
            fw_size,
            cfg_size,
            block_size,
        } => run_rmi(fw_size, cfg_size, block_size),
    }
}
