//! Simulated drive
//!
//! `SimDrive` implements `Platform` on top of an in-memory model of the DI registers and a very
//! simple drive: every command completes after `latency` ticks unless a fault has been injected.
//! Time only moves forward when the simulation is told to, which makes it possible to test races
//! between interrupts and alarms deterministically. Reading the clock advances it by
//! `clock_drift` ticks so that busy loops terminate.

use fnv::FnvHashMap;

use super::platform::{Alarm, Platform};
use super::regs::{command, control, cover, reset, status, DiReg, DI_REG_COUNT};
use super::{timings, DvdLow, Ticks};

/// Commands as seen by the drive
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Command {
    Read { addr: u32, length: u32, offset: u32 },
    Seek { offset: u32 },
    ReadDiskId { addr: u32 },
    Inquiry { addr: u32 },
    StopMotor,
    RequestError,
    AudioStream { subcmd: u32, length: u32, offset: u32 },
    AudioStatus { subcmd: u32 },
    AudioBufferConfig { config: u32 },
    Unknown(u32),
}

impl Command {
    fn decode(regs: &[u32; DI_REG_COUNT]) -> Command {
        let cmd0 = regs[DiReg::Cmd0 as usize];
        let cmd1 = regs[DiReg::Cmd1 as usize];
        let cmd2 = regs[DiReg::Cmd2 as usize];
        let addr = regs[DiReg::DmaAddr as usize];

        if cmd0 == command::READ_DISK_ID {
            return Command::ReadDiskId { addr };
        }

        let sub = cmd0 & 0xff_ffff;

        match cmd0 & 0xff00_0000 {
            command::READ => Command::Read {
                addr,
                length: cmd2,
                offset: cmd1 << 2,
            },
            command::SEEK => Command::Seek { offset: cmd1 << 2 },
            command::INQUIRY => Command::Inquiry { addr },
            command::STOP_MOTOR => Command::StopMotor,
            command::REQUEST_ERROR => Command::RequestError,
            command::AUDIO_STREAM => Command::AudioStream {
                subcmd: sub,
                length: cmd2,
                offset: cmd1 << 2,
            },
            command::AUDIO_STATUS => Command::AudioStatus { subcmd: sub },
            command::AUDIO_BUFFER_CONFIG => Command::AudioBufferConfig { config: sub },
            _ => Command::Unknown(cmd0),
        }
    }
}

/// What should go wrong with the next command
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Fault {
    /// Complete with an error interrupt
    Error,
    /// Never complete
    Silent,
}

/// Events the host has to forward to the driver
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Event {
    Interrupt,
    Alarm(Alarm),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum HwEvent {
    /// Latch the given status interrupt bits
    Status(u32),
    /// Latch the cover interrupt
    Cover,
}

pub struct SimDrive {
    now: Ticks,
    /// Added to the clock every time it's read
    pub clock_drift: Ticks,
    /// Time taken by the drive to execute a command
    pub latency: Ticks,
    /// Value returned by `Platform::audio_streaming`
    pub streaming: bool,
    /// Value put in the immediate register by `RequestError`
    pub error_code: u32,
    regs: [u32; DI_REG_COUNT],
    pi_reset: u32,
    alarms: FnvHashMap<Alarm, Ticks>,
    hw_events: Vec<(Ticks, HwEvent)>,
    next_fault: Option<Fault>,
    commands: Vec<(Ticks, Command)>,
    interrupts_enabled: bool,
    di_masked: bool,
    context_depth: u32,
    alarms_initialized: bool,
}

impl SimDrive {
    pub fn new() -> SimDrive {
        let mut regs = [0; DI_REG_COUNT];

        // The OS enables all DI interrupts before the driver starts
        regs[DiReg::Status as usize] = status::MASKS;

        SimDrive {
            // Don't start at 0 to avoid the post-reset window at boot
            now: timings::secs_to_ticks(1),
            clock_drift: 1,
            latency: timings::ms_to_ticks(2),
            streaming: false,
            error_code: 0,
            regs,
            pi_reset: reset::ALWAYS_SET | reset::DRIVE_RUN,
            alarms: FnvHashMap::default(),
            hw_events: Vec::new(),
            next_fault: None,
            commands: Vec::new(),
            interrupts_enabled: true,
            di_masked: false,
            context_depth: 0,
            alarms_initialized: false,
        }
    }

    /// Current time, without moving the clock
    pub fn now(&self) -> Ticks {
        self.now
    }

    /// Every command received so far with the date it was started
    pub fn commands(&self) -> &[(Ticks, Command)] {
        &self.commands
    }

    pub fn last_command(&self) -> Option<Command> {
        self.commands.last().map(|&(_, c)| c)
    }

    pub fn reg(&self, reg: DiReg) -> u32 {
        self.regs[reg as usize]
    }

    /// Deadline of `alarm`, if it's armed
    pub fn alarm_deadline(&self, alarm: Alarm) -> Option<Ticks> {
        self.alarms.get(&alarm).cloned()
    }

    pub fn inject_fault(&mut self, fault: Fault) {
        self.next_fault = Some(fault);
    }

    /// Simulate DMA progress on the current transfer
    pub fn transfer_progress(&mut self, bytes: u32) {
        let len = &mut self.regs[DiReg::DmaLength as usize];

        *len = len.saturating_sub(bytes);
    }

    pub fn open_cover(&mut self) {
        self.regs[DiReg::Cover as usize] |= cover::OPEN;
        self.hw_events.push((self.now, HwEvent::Cover));
    }

    pub fn close_cover(&mut self) {
        self.regs[DiReg::Cover as usize] &= !cover::OPEN;
        self.hw_events.push((self.now, HwEvent::Cover));
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.interrupts_enabled
    }

    pub fn di_interrupt_masked(&self) -> bool {
        self.di_masked
    }

    /// What the OS would do before issuing new commands after a timeout
    pub fn unmask_di_interrupt(&mut self) {
        self.di_masked = false;
    }

    /// Nesting level of the exception context
    pub fn context_depth(&self) -> u32 {
        self.context_depth
    }

    pub fn alarms_initialized(&self) -> bool {
        self.alarms_initialized
    }

    /// True if an enabled interrupt is latched
    fn irq(&self) -> bool {
        let st = self.regs[DiReg::Status as usize];
        let cv = self.regs[DiReg::Cover as usize];

        let di = st & status::INTS & ((st & status::MASKS) << 1) != 0;
        let cvr = cv & cover::INT != 0 && cv & cover::INT_MASK != 0;

        di || cvr
    }

    /// Return the next event due no later than `limit` (if any), moving the clock to its date
    pub fn next_event(&mut self, limit: Option<Ticks>) -> Option<Event> {
        loop {
            let hw = self
                .hw_events
                .iter()
                .enumerate()
                .min_by_key(|&(_, &(date, _))| date)
                .map(|(i, &(date, _))| (i, date));

            let alarm = self
                .alarms
                .iter()
                .min_by_key(|&(_, &date)| date)
                .map(|(&a, &date)| (a, date));

            let hw_first = match (hw, alarm) {
                (None, None) => return None,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                // Hardware wins ties
                (Some((_, hd)), Some((_, ad))) => hd <= ad,
            };

            let date = if hw_first {
                hw.map(|(_, d)| d)
            } else {
                alarm.map(|(_, d)| d)
            };

            if let (Some(limit), Some(date)) = (limit, date) {
                if date > limit {
                    return None;
                }
            }

            if let Some(date) = date {
                self.now = self.now.max(date);
            }

            if hw_first {
                if let Some((i, _)) = hw {
                    let (_, event) = self.hw_events.remove(i);

                    self.apply(event);

                    if self.irq() && !self.di_masked {
                        return Some(Event::Interrupt);
                    }
                }
            } else if let Some((a, _)) = alarm {
                self.alarms.remove(&a);

                return Some(Event::Alarm(a));
            }
        }
    }

    /// Move the clock to `date`. Doesn't process any event.
    pub fn set_time(&mut self, date: Ticks) {
        self.now = self.now.max(date);
    }

    fn apply(&mut self, event: HwEvent) {
        match event {
            HwEvent::Status(bits) => {
                self.regs[DiReg::Status as usize] |= bits;
                self.regs[DiReg::Control as usize] &= !control::START;

                if bits & status::COMPLETE_INT != 0 {
                    self.regs[DiReg::DmaLength as usize] = 0;
                }
            }
            HwEvent::Cover => self.regs[DiReg::Cover as usize] |= cover::INT,
        }
    }

    fn start_command(&mut self) {
        let command = Command::decode(&self.regs);

        self.commands.push((self.now, command));

        match command {
            Command::RequestError => self.regs[DiReg::Immediate as usize] = self.error_code,
            Command::AudioStatus { .. } => self.regs[DiReg::Immediate as usize] = 0,
            _ => (),
        }

        let bits = match self.next_fault.take() {
            None => status::COMPLETE_INT,
            Some(Fault::Error) => status::ERROR_INT,
            Some(Fault::Silent) => return,
        };

        self.hw_events
            .push((self.now + self.latency, HwEvent::Status(bits)));
    }

    fn break_command(&mut self) {
        if self.regs[DiReg::Control as usize] & control::START == 0 {
            // Nothing to break
            return;
        }

        self.hw_events
            .retain(|&(_, e)| !matches!(e, HwEvent::Status(_)));
        self.hw_events.push((
            self.now + timings::us_to_ticks(100),
            HwEvent::Status(status::BREAK_INT),
        ));
    }
}

impl Default for SimDrive {
    fn default() -> SimDrive {
        SimDrive::new()
    }
}

impl Platform for SimDrive {
    fn read_di(&mut self, reg: DiReg) -> u32 {
        self.regs[reg as usize]
    }

    fn write_di(&mut self, reg: DiReg, val: u32) {
        let r = &mut self.regs[reg as usize];

        match reg {
            DiReg::Status => {
                // Interrupt bits are write-1-to-clear
                let ints = *r & status::INTS & !(val & status::INTS);

                *r = ints | (val & status::MASKS);

                if val & status::BREAK_REQUEST != 0 {
                    self.break_command();
                }
            }
            DiReg::Cover => {
                // The OPEN bit is read-only, INT is write-1-to-clear
                let open = *r & cover::OPEN;
                let int = *r & cover::INT & !(val & cover::INT);

                *r = open | int | (val & cover::INT_MASK);
            }
            DiReg::Control => {
                *r = val;

                if val & control::START != 0 {
                    self.start_command();
                }
            }
            _ => *r = val,
        }
    }

    fn read_reset(&mut self) -> u32 {
        self.pi_reset
    }

    fn write_reset(&mut self, val: u32) {
        let was_running = self.pi_reset & reset::DRIVE_RUN != 0;

        self.pi_reset = val;

        if !was_running && val & reset::DRIVE_RUN != 0 {
            // The drive signals the end of its reset sequence with a cover interrupt
            self.hw_events.push((self.now + self.latency, HwEvent::Cover));
        }
    }

    fn system_time(&mut self) -> Ticks {
        let now = self.now;

        self.now += self.clock_drift;

        now
    }

    fn init_alarms(&mut self) {
        self.alarms.clear();
        self.alarms_initialized = true;
    }

    fn set_alarm(&mut self, alarm: Alarm, delay: Ticks) {
        self.alarms.insert(alarm, self.now + delay);
    }

    fn cancel_alarm(&mut self, alarm: Alarm) {
        self.alarms.remove(&alarm);
    }

    fn disable_interrupts(&mut self) -> bool {
        let enabled = self.interrupts_enabled;

        self.interrupts_enabled = false;

        enabled
    }

    fn restore_interrupts(&mut self, enabled: bool) {
        self.interrupts_enabled = enabled;
    }

    fn mask_di_interrupt(&mut self) {
        self.di_masked = true;
    }

    fn enter_exception_context(&mut self) {
        self.context_depth += 1;
    }

    fn leave_exception_context(&mut self) {
        debug_assert!(self.context_depth > 0);

        self.context_depth -= 1;
    }

    fn audio_streaming(&mut self) -> bool {
        self.streaming
    }
}

/// Upper bound on the number of events processed by a single run, reaching it means that
/// something keeps rearming itself
const MAX_EVENTS: usize = 10_000;

fn dispatch(dvd: &mut DvdLow<SimDrive>, event: Event) {
    match event {
        Event::Interrupt => dvd.interrupt(),
        Event::Alarm(a) => dvd.alarm(a),
    }
}

/// Forward events to the driver until there's nothing left to do. Returns the number of events
/// processed.
pub fn run_until_idle(dvd: &mut DvdLow<SimDrive>) -> usize {
    let mut n = 0;

    while let Some(event) = dvd.platform_mut().next_event(None) {
        dispatch(dvd, event);

        n += 1;
        assert!(n < MAX_EVENTS, "Simulation doesn't settle");
    }

    n
}

/// Forward the events due before `date` to the driver then move the clock to `date`
pub fn run_until(dvd: &mut DvdLow<SimDrive>, date: Ticks) -> usize {
    let mut n = 0;

    while let Some(event) = dvd.platform_mut().next_event(Some(date)) {
        dispatch(dvd, event);

        n += 1;
        assert!(n < MAX_EVENTS, "Simulation doesn't settle");
    }

    dvd.platform_mut().set_time(date);

    n
}
