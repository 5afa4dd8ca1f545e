//! Completion handling: DI interrupt, timeout and workaround alarms, break monitor

use super::platform::{Alarm, ExceptionContext, Platform};
use super::queue::PendingCommand;
use super::regs::{cover, status, DiReg};
use super::{timings, Cause, DvdLow};

impl<P: Platform> DvdLow<P> {
    /// DI interrupt handler. Must be called by the host whenever the DI raises its interrupt.
    pub fn interrupt(&mut self) {
        // A real interrupt came in, the timeout lost the race
        self.platform.cancel_alarm(Alarm::Timeout);
        // Nothing left to break
        self.platform.cancel_alarm(Alarm::Break);

        let now = self.platform.system_time();

        let mut cause = Cause::empty();

        if self.last_command_was_read {
            self.last_read_finished = now;
            self.first_read = false;
            self.previous = self.current;

            if self.stop_at_next_int {
                cause |= Cause::BREAK;
            }
        }

        self.last_command_was_read = false;
        self.stop_at_next_int = false;

        let reg = self.platform.read_di(DiReg::Status);
        let mask = reg & status::MASKS;
        // Only keep the interrupts that are enabled
        let intr = (reg & status::INTS) & (mask << 1);

        if intr & status::BREAK_INT != 0 {
            cause |= Cause::BREAK;
        }

        if intr & status::ERROR_INT != 0 {
            cause |= Cause::ERROR;
        }

        if intr & status::COMPLETE_INT != 0 {
            cause |= Cause::COMPLETE;
        }

        if !cause.is_empty() {
            self.reset_occurred = false;
        }

        // Ack without touching the masks
        self.platform.write_di(DiReg::Status, intr | mask);

        if self.reset_occurred && now - self.last_reset_end < timings::RESET_COVER_WINDOW {
            let reg = self.platform.read_di(DiReg::Cover);
            let mask = reg & cover::INT_MASK;
            let intr = (reg & cover::INT) & (mask << 1);

            if intr & cover::INT != 0 {
                debug!("DVD: drive reset complete");

                if let Some(cb) = self.reset_cover_callback.take() {
                    let _context = ExceptionContext::enter(&mut self.platform);

                    cb(Cause::COVER);
                }
            }

            let reg = self.platform.read_di(DiReg::Cover);
            self.platform.write_di(DiReg::Cover, reg);
        } else if self.waiting_cover_close {
            let reg = self.platform.read_di(DiReg::Cover);
            let mask = reg & cover::INT_MASK;
            let intr = (reg & cover::INT) & (mask << 1);

            if intr & cover::INT != 0 {
                cause |= Cause::COVER;
            }

            self.platform.write_di(DiReg::Cover, intr | mask);
            self.waiting_cover_close = false;
        } else {
            self.platform.write_di(DiReg::Cover, 0);
        }

        if cause.contains(Cause::BREAK) && !self.breaking {
            // Nobody asked for it
            cause.remove(Cause::BREAK);
        }

        if cause.contains(Cause::COMPLETE) {
            if self.process_next_command() {
                // The logical operation isn't over yet
                return;
            }
        } else if !cause.is_empty() {
            // A failed sub-command aborts the whole chain, including a delayed read
            self.queue.clear();
            self.platform.cancel_alarm(Alarm::Workaround);
        }

        if !cause.is_empty() {
            self.complete(cause);
            self.breaking = false;
        }
    }

    /// Must be called by the host when one of the alarms armed through `Platform::set_alarm`
    /// expires
    pub fn alarm(&mut self, alarm: Alarm) {
        match alarm {
            Alarm::Timeout => self.timeout(),
            Alarm::Workaround => {
                let processed = self.process_next_command();

                assert!(processed, "DVD workaround alarm with an empty command queue");
            }
            Alarm::Break => self.break_monitor(),
        }
    }

    /// Force a hardware break of the transfer in flight as soon as it has made some progress. The
    /// drive can't abort a transfer that hasn't started yet, so until the DMA length register
    /// starts moving the check is repeated every `BREAK_POLL`.
    pub fn force_break(&mut self) {
        self.break_monitor();
    }

    fn break_monitor(&mut self) {
        if !self.last_command_was_read {
            debug!("DVD: no read in flight, nothing to break");
            return;
        }

        let remaining = self.platform.read_di(DiReg::DmaLength);

        if remaining < self.last_length {
            self.do_break();
        } else {
            self.platform.set_alarm(Alarm::Break, timings::BREAK_POLL);
        }
    }

    fn do_break(&mut self) {
        debug!("DVD: hardware break");

        let reg = self.platform.read_di(DiReg::Status);
        self.platform
            .write_di(DiReg::Status, reg | status::BREAK_INT | status::BREAK_REQUEST);

        self.breaking = true;
    }

    fn timeout(&mut self) {
        warn!("DVD: command timeout");

        self.platform.mask_di_interrupt();
        // Whatever remained of the chain won't be issued
        self.queue.clear();
        self.platform.cancel_alarm(Alarm::Break);
        self.last_command_was_read = false;

        self.complete(Cause::TIMEOUT);
    }

    /// Take the pending callback and call it in a blank context. If the callback has already
    /// been consumed (timeout racing with the interrupt) nothing happens.
    fn complete(&mut self, cause: Cause) {
        let callback = self.callback.take();

        let _context = ExceptionContext::enter(&mut self.platform);

        match callback {
            Some(cb) => cb(cause),
            None => debug!("DVD: no callback for {:?}", cause),
        }
    }

    /// Issue the next sub-command in the queue. Returns false if the queue is exhausted.
    fn process_next_command(&mut self) -> bool {
        debug_assert!(self.queue.next_index() < super::queue::QUEUE_SLOTS);

        match self.queue.advance() {
            Some(PendingCommand::Read {
                addr,
                length,
                offset,
                callback,
            }) => {
                self.issue_read(addr, length, offset, callback);
                true
            }
            Some(PendingCommand::Seek { offset, callback }) => {
                self.issue_seek(offset, callback);
                true
            }
            None => false,
        }
    }
}
