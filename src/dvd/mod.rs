//! Disc interface driver
//!
//! Every command is asynchronous: the public methods program the DI registers, arm a timeout and
//! return immediately. Completion is reported later through the callback, from
//! [`DvdLow::interrupt`] when the drive raises its interrupt or from [`DvdLow::alarm`] when the
//! timeout expires first. Callbacks fire at most once per logical operation, even when the read
//! scheduler splits a read into a seek followed by the actual read.

mod cause;
mod cover;
mod interrupt;
pub mod platform;
pub mod queue;
pub mod regs;
pub mod scheduler;
pub mod sim;

#[cfg(test)]
mod tests;

pub use self::cause::Cause;
pub use self::cover::CoverStatus;
pub use self::platform::{Alarm, Platform};
pub use self::scheduler::{Transfer, WorkaroundMode};

use self::platform::InterruptGuard;
use self::queue::{CommandQueue, PendingCommand};
use self::regs::{command, control, DiReg};
use self::scheduler::ReadPlan;

/// Time as reported by the system timer
pub type Ticks = i64;

/// Completion callback. Called at most once.
pub type Callback = Box<dyn FnOnce(Cause)>;

/// Size of the disk ID returned by `read_disk_id`
pub const DISK_ID_SIZE: u32 = 0x20;
/// Size of the drive information returned by `inquiry`
pub const DRIVE_INFO_SIZE: u32 = 0x20;

/// Sub-commands of the audio stream command
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AudioStreamCommand {
    /// Queue a new stream
    Entry = 0,
    /// Stop streaming
    Cancel = 0x1_0000,
}

/// Sub-commands of the audio status command
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AudioStatusQuery {
    Playing = 0,
    CurrentAddress = 0x1_0000,
    StartAddress = 0x2_0000,
    Length = 0x3_0000,
}

/// State of the disc interface driver
pub struct DvdLow<P: Platform> {
    platform: P,
    /// Callback for the command in flight
    callback: Option<Callback>,
    /// Called when the drive comes back from a reset
    reset_cover_callback: Option<Callback>,
    /// True until a read completes after the workaround mode was set
    first_read: bool,
    /// Set by `request_break`, folded into the cause when the next read completes
    stop_at_next_int: bool,
    /// Length of the last transfer, used by the break monitor to detect progress
    last_length: u32,
    last_reset_end: Ticks,
    reset_occurred: bool,
    waiting_cover_close: bool,
    /// True if a break was requested and hasn't been reported yet
    breaking: bool,
    workaround: WorkaroundMode,
    last_read_finished: Ticks,
    last_read_issued: Ticks,
    last_command_was_read: bool,
    queue: CommandQueue,
    /// Last read issued
    current: Transfer,
    /// Last read completed
    previous: Transfer,
}

impl<P: Platform> DvdLow<P> {
    pub fn new(mut platform: P) -> DvdLow<P> {
        platform.init_alarms();

        let mut dvd = DvdLow {
            platform,
            callback: None,
            reset_cover_callback: None,
            first_read: true,
            stop_at_next_int: false,
            last_length: 0,
            last_reset_end: 0,
            reset_occurred: false,
            waiting_cover_close: false,
            breaking: false,
            workaround: WorkaroundMode::Disabled,
            last_read_finished: 0,
            last_read_issued: 0,
            last_command_was_read: false,
            queue: CommandQueue::new(),
            current: Transfer::default(),
            previous: Transfer::default(),
        };

        dvd.set_workaround_type(WorkaroundMode::Disabled);

        dvd
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn workaround(&self) -> WorkaroundMode {
        self.workaround
    }

    /// Date at which the last read was sent to the drive
    pub fn last_read_issued(&self) -> Ticks {
        self.last_read_issued
    }

    /// Date at which the last read completed
    pub fn last_read_finished(&self) -> Ticks {
        self.last_read_finished
    }

    /// Index of the next sub-command in the command queue
    pub fn queue_cursor(&self) -> usize {
        self.queue.next_index()
    }

    /// True if sub-commands remain in the command queue
    pub fn queue_pending(&self) -> bool {
        !self.queue.is_exhausted()
    }

    /// Select the read workaround. Resets the first read detection so that the next read is
    /// preceded by a seek if the workaround requires it.
    pub fn set_workaround_type(&mut self, mode: WorkaroundMode) {
        if let WorkaroundMode::SeekBeforeRead { seek_location } = mode {
            assert!(
                seek_location & 3 == 0,
                "DVD workaround: seek location must be a multiple of 4 (0x{:x})",
                seek_location
            );
        }

        let _guard = InterruptGuard::new(&mut self.platform);

        self.workaround = mode;
        self.first_read = true;
    }

    /// Read `length` bytes at disc `offset` into `addr`. The read scheduler may insert a seek or
    /// a short delay before the actual read, `callback` is only called once the whole sequence
    /// is done.
    pub fn read<F>(&mut self, addr: u32, length: u32, offset: u32, callback: F)
    where
        F: FnOnce(Cause) + 'static,
    {
        assert!(
            addr & 31 == 0,
            "DVD read: address must be aligned to 32 bytes (0x{:08x})",
            addr
        );
        assert!(
            length & 31 == 0,
            "DVD read: length must be a multiple of 32 (0x{:x})",
            length
        );
        assert!(
            offset & 3 == 0,
            "DVD read: offset must be a multiple of 4 (0x{:x})",
            offset
        );
        assert!(length != 0, "DVD read: 0 was specified as length");

        let callback: Callback = Box::new(callback);

        self.platform.write_di(DiReg::DmaLength, length);
        self.current = Transfer {
            addr,
            length,
            offset,
        };

        let since_last_read = self.platform.system_time() - self.last_read_finished;
        let streaming = match self.workaround {
            WorkaroundMode::Disabled => false,
            _ => self.platform.audio_streaming(),
        };

        let plan = scheduler::plan_read(
            self.workaround,
            self.first_read,
            &self.current,
            &self.previous,
            streaming,
            since_last_read,
        );

        match plan {
            ReadPlan::Direct => {
                self.queue.clear();
                self.issue_read(addr, length, offset, Some(callback));
            }
            ReadPlan::SeekFirst { seek_offset } => {
                debug!(
                    "DVD: seeking to 0x{:x} before reading at 0x{:x}",
                    seek_offset, offset
                );

                self.queue.clear();
                self.queue.push(PendingCommand::Seek {
                    offset: seek_offset,
                    callback: None,
                });
                self.queue.push(PendingCommand::Read {
                    addr,
                    length,
                    offset,
                    callback: None,
                });

                // Only the seek carries the callback, the read keeps it pending
                let first = self.queue.advance();
                debug_assert!(matches!(first, Some(PendingCommand::Seek { .. })));

                self.issue_seek(seek_offset, Some(callback));
            }
            ReadPlan::Delay(delay) => {
                debug!(
                    "DVD: delaying read at 0x{:x} by {} ticks",
                    offset, delay
                );

                self.queue.clear();
                self.queue.push(PendingCommand::Read {
                    addr,
                    length,
                    offset,
                    callback: Some(callback),
                });

                self.platform.set_alarm(Alarm::Workaround, delay);
            }
        }
    }

    /// Move the read head to `offset`
    pub fn seek<F>(&mut self, offset: u32, callback: F)
    where
        F: FnOnce(Cause) + 'static,
    {
        self.issue_seek(offset, Some(Box::new(callback)));
    }

    /// Read the 32 byte disk ID into `addr`
    pub fn read_disk_id<F>(&mut self, addr: u32, callback: F)
    where
        F: FnOnce(Cause) + 'static,
    {
        assert!(
            addr & 31 == 0,
            "DVD read disk ID: buffer must be aligned to 32 bytes (0x{:08x})",
            addr
        );

        self.set_callback(Some(Box::new(callback)));

        trace!("DVD: read disk ID into 0x{:08x}", addr);

        self.platform.write_di(DiReg::Cmd0, command::READ_DISK_ID);
        self.platform.write_di(DiReg::Cmd1, 0);
        self.platform.write_di(DiReg::Cmd2, DISK_ID_SIZE);
        self.platform.write_di(DiReg::DmaAddr, addr);
        self.platform.write_di(DiReg::DmaLength, DISK_ID_SIZE);
        self.platform
            .write_di(DiReg::Control, control::START | control::DMA);

        self.set_timeout_alarm(timings::COMMAND_TIMEOUT);
    }

    pub fn stop_motor<F>(&mut self, callback: F)
    where
        F: FnOnce(Cause) + 'static,
    {
        self.immediate_command(command::STOP_MOTOR, Box::new(callback));
    }

    /// Ask the drive for the last error code. The code is returned in the immediate register.
    pub fn request_error<F>(&mut self, callback: F)
    where
        F: FnOnce(Cause) + 'static,
    {
        self.immediate_command(command::REQUEST_ERROR, Box::new(callback));
    }

    /// Read the 32 byte drive information block into `addr`
    pub fn inquiry<F>(&mut self, addr: u32, callback: F)
    where
        F: FnOnce(Cause) + 'static,
    {
        self.set_callback(Some(Box::new(callback)));

        trace!("DVD: inquiry into 0x{:08x}", addr);

        self.platform.write_di(DiReg::Cmd0, command::INQUIRY);
        self.platform.write_di(DiReg::Cmd2, DRIVE_INFO_SIZE);
        self.platform.write_di(DiReg::DmaAddr, addr);
        self.platform.write_di(DiReg::DmaLength, DRIVE_INFO_SIZE);
        self.platform
            .write_di(DiReg::Control, control::START | control::DMA);

        self.set_timeout_alarm(timings::COMMAND_TIMEOUT);
    }

    pub fn audio_stream<F>(
        &mut self,
        subcmd: AudioStreamCommand,
        length: u32,
        offset: u32,
        callback: F,
    ) where
        F: FnOnce(Cause) + 'static,
    {
        self.set_callback(Some(Box::new(callback)));

        trace!(
            "DVD: audio stream {:?} 0x{:x} bytes at 0x{:x}",
            subcmd,
            length,
            offset
        );

        self.platform
            .write_di(DiReg::Cmd0, command::AUDIO_STREAM | subcmd as u32);
        self.platform.write_di(DiReg::Cmd1, offset >> 2);
        self.platform.write_di(DiReg::Cmd2, length);
        self.platform.write_di(DiReg::Control, control::START);

        self.set_timeout_alarm(timings::COMMAND_TIMEOUT);
    }

    /// The result is returned in the immediate register
    pub fn request_audio_status<F>(&mut self, query: AudioStatusQuery, callback: F)
    where
        F: FnOnce(Cause) + 'static,
    {
        self.immediate_command(command::AUDIO_STATUS | query as u32, Box::new(callback));
    }

    /// Configure the drive's audio buffer. The low nibble of `size` is the buffer size, the next
    /// one the trigger level.
    pub fn audio_buffer_config<F>(&mut self, enable: bool, size: u32, callback: F)
    where
        F: FnOnce(Cause) + 'static,
    {
        debug_assert!(size <= 0xff, "Bad audio buffer config 0x{:x}", size);
        debug_assert!((size >> 4) & 0xf <= 2, "Bad audio buffer trigger 0x{:x}", size);

        let enable = if enable {
            command::AUDIO_BUFFER_ENABLE
        } else {
            0
        };

        self.immediate_command(
            command::AUDIO_BUFFER_CONFIG | enable | size,
            Box::new(callback),
        );
    }

    /// Ask for the current command to be aborted. This doesn't touch the hardware, the break is
    /// reported with the next interrupt.
    pub fn request_break(&mut self) {
        self.stop_at_next_int = true;
        self.breaking = true;
    }

    /// Remove the pending callback and disable the cover interrupt
    pub fn clear_callback(&mut self) -> Option<Callback> {
        self.platform.write_di(DiReg::Cover, 0);

        self.callback.take()
    }

    /// Store the callback for a new command. `None` keeps the one already pending, used when
    /// chaining sub-commands.
    fn set_callback(&mut self, callback: Option<Callback>) {
        if let Some(cb) = callback {
            self.callback = Some(cb);
        }

        self.stop_at_next_int = false;
    }

    fn set_timeout_alarm(&mut self, timeout: Ticks) {
        self.platform.set_alarm(Alarm::Timeout, timeout);
    }

    /// Send a command without data transfer
    fn immediate_command(&mut self, cmd: u32, callback: Callback) {
        self.set_callback(Some(callback));

        trace!("DVD: command 0x{:08x}", cmd);

        self.platform.write_di(DiReg::Cmd0, cmd);
        self.platform.write_di(DiReg::Control, control::START);

        self.set_timeout_alarm(timings::COMMAND_TIMEOUT);
    }

    fn issue_read(&mut self, addr: u32, length: u32, offset: u32, callback: Option<Callback>) {
        self.set_callback(callback);
        self.last_command_was_read = true;
        self.last_read_issued = self.platform.system_time();

        trace!(
            "DVD: read 0x{:x} bytes at 0x{:x} into 0x{:08x}",
            length,
            offset,
            addr
        );

        self.platform.write_di(DiReg::Cmd0, command::READ);
        self.platform.write_di(DiReg::Cmd1, offset / 4);
        self.platform.write_di(DiReg::Cmd2, length);
        self.platform.write_di(DiReg::DmaAddr, addr);
        self.platform.write_di(DiReg::DmaLength, length);
        self.last_length = length;
        self.platform
            .write_di(DiReg::Control, control::START | control::DMA);

        let timeout = if length > timings::LARGE_READ {
            timings::LARGE_READ_TIMEOUT
        } else {
            timings::COMMAND_TIMEOUT
        };

        self.set_timeout_alarm(timeout);
    }

    fn issue_seek(&mut self, offset: u32, callback: Option<Callback>) {
        assert!(
            offset & 3 == 0,
            "DVD seek: offset must be a multiple of 4 (0x{:x})",
            offset
        );

        self.set_callback(callback);

        trace!("DVD: seek to 0x{:x}", offset);

        self.platform.write_di(DiReg::Cmd0, command::SEEK);
        self.platform.write_di(DiReg::Cmd1, offset / 4);
        self.platform.write_di(DiReg::Control, control::START);

        self.set_timeout_alarm(timings::COMMAND_TIMEOUT);
    }
}

pub mod timings {
    //! Driver timings, expressed in system timer ticks.

    use super::Ticks;

    /// The system timer runs at a quarter of the 162MHz bus clock
    pub const TIMER_CLOCK_HZ: Ticks = 40_500_000;

    pub const fn secs_to_ticks(s: Ticks) -> Ticks {
        s * TIMER_CLOCK_HZ
    }

    pub const fn ms_to_ticks(ms: Ticks) -> Ticks {
        ms * (TIMER_CLOCK_HZ / 1000)
    }

    pub const fn us_to_ticks(us: Ticks) -> Ticks {
        (us * TIMER_CLOCK_HZ) / 1_000_000
    }

    /// Timeout for all commands except large reads
    pub const COMMAND_TIMEOUT: Ticks = secs_to_ticks(10);

    /// Reads longer than this many bytes get `LARGE_READ_TIMEOUT`
    pub const LARGE_READ: u32 = 0xa0_0000;

    pub const LARGE_READ_TIMEOUT: Ticks = secs_to_ticks(20);

    /// Minimum delay between the end of a read and a new read hitting the drive's cache
    pub const READ_SETTLE: Ticks = ms_to_ticks(5) + us_to_ticks(500);

    /// Minimum width of the reset pulse
    pub const RESET_PULSE: Ticks = us_to_ticks(12);

    /// After a reset, cover interrupts signal the end of the reset for this long
    pub const RESET_COVER_WINDOW: Ticks = ms_to_ticks(200);

    /// The cover status is meaningless for this long after a reset
    pub const COVER_SETTLE: Ticks = ms_to_ticks(100);

    /// Break monitor polling period
    pub const BREAK_POLL: Ticks = ms_to_ticks(20);
}
