use std::fmt;

use crate::error::FuResult;
use crate::firmware::{Firmware, RmiFirmware};
use crate::pixart::device::PixartDevice;
use crate::pixart::transport::HidTransport;
use crate::rmi::flash::RmiV5Flash;
use crate::rmi::transport::RmiTransport;

/// Cross-device update phases, in the order orchestration guarantees to
/// emit them: `Ready -> Busy -> Write -> Verify -> Restart -> Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashPhase {
    Ready,
    Busy,
    Write { block: usize, total: usize },
    Verify,
    Restart,
    Done,
}

impl fmt::Display for FlashPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlashPhase::Ready => write!(f, "ready"),
            FlashPhase::Busy => write!(f, "busy"),
            FlashPhase::Write { block, total } => write!(f, "writing block {block}/{total}"),
            FlashPhase::Verify => write!(f, "verifying"),
            FlashPhase::Restart => write!(f, "restarting"),
            FlashPhase::Done => write!(f, "done"),
        }
    }
}

/// Progress callback surface for a flash attempt.
pub trait FlashProgress {
    fn on_phase(&mut self, phase: FlashPhase);
    fn on_chunk(&mut self, index: usize, total: usize) {
        let _ = (index, total);
    }
    fn on_error(&mut self, error: &crate::error::FuError) {
        let _ = error;
    }
    fn on_complete(&mut self) {}
}

/// A no-op progress sink, useful when the caller doesn't need callbacks.
pub struct NullProgress;

impl FlashProgress for NullProgress {
    fn on_phase(&mut self, _phase: FlashPhase) {}
}

/// A device family this crate can drive through the single orchestration
/// state machine. Implementors supply only the "write the whole firmware
/// image" step; the phase bookkeeping is shared.
pub trait Flashable {
    fn write_firmware(&mut self, on_chunk: &mut dyn FnMut(usize, usize)) -> FuResult<()>;
}

/// Adapts a [`PixartDevice`] plus the firmware it's about to receive into
/// [`Flashable`].
pub struct PixartFlashable<'a, T: HidTransport> {
    pub device: &'a mut PixartDevice<T>,
    pub firmware: &'a Firmware,
}

impl<'a, T: HidTransport> Flashable for PixartFlashable<'a, T> {
    fn write_firmware(&mut self, on_chunk: &mut dyn FnMut(usize, usize)) -> FuResult<()> {
        self.device.write_firmware(self.firmware, on_chunk)
    }
}

/// Adapts an [`RmiV5Flash`] plus the firmware it's about to receive into
/// [`Flashable`].
pub struct RmiFlashable<'a, T: RmiTransport> {
    pub flash: &'a mut RmiV5Flash<T>,
    pub firmware: &'a RmiFirmware,
}

impl<'a, T: RmiTransport> Flashable for RmiFlashable<'a, T> {
    fn write_firmware(&mut self, on_chunk: &mut dyn FnMut(usize, usize)) -> FuResult<()> {
        self.flash.write_firmware(self.firmware, on_chunk)
    }
}

/// Drives the `READY -> BUSY -> WRITE -> VERIFY -> RESTART -> DONE` state
/// machine over any [`Flashable`] device, reporting phase transitions and
/// per-block progress to a [`FlashProgress`] sink.
pub struct FlashOrchestrator<'p> {
    progress: &'p mut dyn FlashProgress,
}

impl<'p> FlashOrchestrator<'p> {
    pub fn new(progress: &'p mut dyn FlashProgress) -> Self {
        Self { progress }
    }

    /// Runs a full update attempt. Failure at any phase is fatal — there is
    /// no partial rollback, matching the single-threaded synchronous model.
    pub fn run(&mut self, device: &mut dyn Flashable) -> FuResult<()> {
        self.progress.on_phase(FlashPhase::Ready);
        self.progress.on_phase(FlashPhase::Busy);

        let progress = &mut self.progress;
        let result = device.write_firmware(&mut |i, n| {
            progress.on_phase(FlashPhase::Write { block: i, total: n });
            progress.on_chunk(i, n);
        });

        if let Err(ref e) = result {
            self.progress.on_error(e);
            return result;
        }

        self.progress.on_phase(FlashPhase::Verify);
        self.progress.on_phase(FlashPhase::Restart);
        self.progress.on_phase(FlashPhase::Done);
        self.progress.on_complete();
        Ok(())
    }
}
