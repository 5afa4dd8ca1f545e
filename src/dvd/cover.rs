//! Drive reset and cover monitoring

use super::platform::{InterruptGuard, Platform};
use super::regs::{cover, reset, DiReg};
use super::{timings, Callback, Cause, DvdLow};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CoverStatus {
    /// The drive was reset too recently for the cover bit to be trusted
    Unsettled = 0,
    Open = 1,
    Closed = 2,
}

impl<P: Platform> DvdLow<P> {
    /// Pulse the drive's reset line. This busy-waits for the duration of the pulse (a few
    /// microseconds). The end of the reset is signaled through the reset/cover callback.
    pub fn reset(&mut self) {
        debug!("DVD: resetting drive");

        self.platform.write_di(DiReg::Cover, cover::INT_MASK);

        let reg = self.platform.read_reset();
        self.platform
            .write_reset((reg & !reset::DRIVE_RUN) | reset::ALWAYS_SET);

        let start = self.platform.system_time();
        while self.platform.system_time() - start < timings::RESET_PULSE {
            std::hint::spin_loop();
        }

        self.platform
            .write_reset(reg | reset::DRIVE_RUN | reset::ALWAYS_SET);

        self.reset_occurred = true;
        self.last_reset_end = self.platform.system_time();
    }

    pub fn cover_status(&mut self) -> CoverStatus {
        let now = self.platform.system_time();

        if now - self.last_reset_end < timings::COVER_SETTLE {
            return CoverStatus::Unsettled;
        }

        if self.platform.read_di(DiReg::Cover) & cover::OPEN != 0 {
            CoverStatus::Open
        } else {
            CoverStatus::Closed
        }
    }

    /// Replace the callback called when the drive comes back from a reset, returning the
    /// previous one
    pub fn set_reset_cover_callback(&mut self, callback: Option<Callback>) -> Option<Callback> {
        let _guard = InterruptGuard::new(&mut self.platform);

        std::mem::replace(&mut self.reset_cover_callback, callback)
    }

    /// Wait for the cover to close. `callback` receives `Cause::COVER` when it does. No timeout
    /// is armed since that could take forever.
    pub fn wait_cover_close<F>(&mut self, callback: F)
    where
        F: FnOnce(Cause) + 'static,
    {
        self.callback = Some(Box::new(callback));
        self.waiting_cover_close = true;
        self.stop_at_next_int = false;

        self.platform.write_di(DiReg::Cover, cover::INT_MASK);
    }
}
