//! Interface between the driver and the OS/hardware it runs on

use super::regs::DiReg;
use super::Ticks;

/// One-shot alarms used by the driver. Arming an alarm that's already armed replaces its
/// deadline.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Alarm {
    /// Fires if the drive doesn't answer the current command in time
    Timeout,
    /// Delays a read queued by the seek workaround
    Workaround,
    /// Polls transfer progress before forcing a hardware break
    Break,
}

/// Everything the driver needs from its environment. The host is expected to forward the DI
/// interrupt to `DvdLow::interrupt` and expired alarms to `DvdLow::alarm`.
pub trait Platform {
    fn read_di(&mut self, reg: DiReg) -> u32;

    fn write_di(&mut self, reg: DiReg, val: u32);

    /// Read the PI register controlling the drive reset line
    fn read_reset(&mut self) -> u32;

    fn write_reset(&mut self, val: u32);

    /// Free-running system timer
    fn system_time(&mut self) -> Ticks;

    /// Called once when the driver is created
    fn init_alarms(&mut self);

    /// Arm `alarm` to fire `delay` ticks from now
    fn set_alarm(&mut self, alarm: Alarm, delay: Ticks);

    /// Disarm `alarm`. Does nothing if it's not armed.
    fn cancel_alarm(&mut self, alarm: Alarm);

    /// Disable interrupts, returning true if they were enabled before the call
    fn disable_interrupts(&mut self) -> bool;

    /// Restore the interrupt state returned by `disable_interrupts`
    fn restore_interrupts(&mut self, enabled: bool);

    /// Mask the DI interrupt line. Unmasking it is up to the OS.
    fn mask_di_interrupt(&mut self);

    /// Install a blank execution context for the duration of a completion callback
    fn enter_exception_context(&mut self);

    /// Go back to the context that was running before `enter_exception_context`
    fn leave_exception_context(&mut self);

    /// True if the disc currently loaded uses audio streaming. The drive then reserves part of
    /// its cache for audio, which shrinks the read-ahead window.
    fn audio_streaming(&mut self) -> bool;
}

/// Interrupts are disabled while this guard is alive
pub struct InterruptGuard<'a, P: Platform> {
    platform: &'a mut P,
    enabled: bool,
}

impl<'a, P: Platform> InterruptGuard<'a, P> {
    pub fn new(platform: &'a mut P) -> InterruptGuard<'a, P> {
        let enabled = platform.disable_interrupts();

        InterruptGuard { platform, enabled }
    }
}

impl<'a, P: Platform> Drop for InterruptGuard<'a, P> {
    fn drop(&mut self) {
        self.platform.restore_interrupts(self.enabled);
    }
}

/// The exception context is installed while this guard is alive
pub struct ExceptionContext<'a, P: Platform> {
    platform: &'a mut P,
}

impl<'a, P: Platform> ExceptionContext<'a, P> {
    pub fn enter(platform: &'a mut P) -> ExceptionContext<'a, P> {
        platform.enter_exception_context();

        ExceptionContext { platform }
    }
}

impl<'a, P: Platform> Drop for ExceptionContext<'a, P> {
    fn drop(&mut self) {
        self.platform.leave_exception_context();
    }
}
