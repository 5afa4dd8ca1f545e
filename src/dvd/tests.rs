use super::regs::{cover, status, DiReg};
use super::sim::{self, Command, Fault, SimDrive};
use super::timings::{ms_to_ticks, secs_to_ticks, COVER_SETTLE, READ_SETTLE, RESET_COVER_WINDOW};
use super::{
    Alarm, AudioStatusQuery, AudioStreamCommand, Cause, CoverStatus, DvdLow, Platform,
    WorkaroundMode,
};
use std::cell::RefCell;
use std::rc::Rc;

type CauseLog = Rc<RefCell<Vec<Cause>>>;

const BUF: u32 = 0x8010_0000;

const SEEK_BEFORE_READ: WorkaroundMode = WorkaroundMode::SeekBeforeRead {
    seek_location: 0x4_0000,
};

fn build_dvd() -> DvdLow<SimDrive> {
    DvdLow::new(SimDrive::new())
}

/// Build a callback that appends its cause to `log`
fn logger(log: &CauseLog) -> impl FnOnce(Cause) + 'static {
    let l = log.clone();

    move |cause| l.borrow_mut().push(cause)
}

fn recorder() -> (CauseLog, impl FnOnce(Cause) + 'static) {
    let log = Rc::new(RefCell::new(Vec::new()));
    let cb = logger(&log);

    (log, cb)
}

fn commands(dvd: &DvdLow<SimDrive>) -> Vec<Command> {
    dvd.platform().commands().iter().map(|&(_, c)| c).collect()
}

fn check_queue(dvd: &DvdLow<SimDrive>) {
    assert!(dvd.queue_cursor() <= 2);
}

/// Perform a complete read and check that it succeeded
fn read_ok(dvd: &mut DvdLow<SimDrive>, length: u32, offset: u32) {
    let (log, cb) = recorder();

    dvd.read(BUF, length, offset, cb);
    check_queue(dvd);
    sim::run_until_idle(dvd);
    check_queue(dvd);

    assert_eq!(*log.borrow(), vec![Cause::COMPLETE]);
}

#[test]
fn init() {
    let dvd = build_dvd();

    assert!(dvd.platform().alarms_initialized());
    assert!(dvd.platform().interrupts_enabled());
    assert_eq!(dvd.workaround(), WorkaroundMode::Disabled);
    assert_eq!(dvd.queue_cursor(), 0);
    assert!(!dvd.queue_pending());
}

#[test]
fn read_direct() {
    let mut dvd = build_dvd();

    read_ok(&mut dvd, 0x8000, 0x1_0000);

    assert_eq!(
        commands(&dvd),
        vec![Command::Read {
            addr: BUF,
            length: 0x8000,
            offset: 0x1_0000
        }]
    );

    let p = dvd.platform();
    assert_eq!(p.alarm_deadline(Alarm::Timeout), None);
    assert_eq!(p.context_depth(), 0);
}

#[test]
fn read_registers() {
    let mut dvd = build_dvd();
    let (_, cb) = recorder();

    dvd.read(BUF, 0x40, 0x1234_5670, cb);

    let p = dvd.platform();
    assert_eq!(p.reg(DiReg::Cmd0), 0xa800_0000);
    assert_eq!(p.reg(DiReg::Cmd1), 0x1234_5670 / 4);
    assert_eq!(p.reg(DiReg::Cmd2), 0x40);
    assert_eq!(p.reg(DiReg::DmaAddr), BUF);
    assert_eq!(p.reg(DiReg::DmaLength), 0x40);
    assert_eq!(p.reg(DiReg::Control), 3);
}

#[test]
fn first_read_seeks() {
    let mut dvd = build_dvd();

    dvd.set_workaround_type(SEEK_BEFORE_READ);
    assert!(dvd.platform().interrupts_enabled());

    read_ok(&mut dvd, 0x20, 0x1_0040);

    assert_eq!(
        commands(&dvd),
        vec![
            Command::Seek { offset: 0x5_0000 },
            Command::Read {
                addr: BUF,
                length: 0x20,
                offset: 0x1_0040
            },
        ]
    );

    assert!(!dvd.queue_pending());
}

#[test]
fn first_read_seeks_to_zero() {
    let mut dvd = build_dvd();

    dvd.set_workaround_type(SEEK_BEFORE_READ);

    read_ok(&mut dvd, 0x20, 0x40);

    assert_eq!(commands(&dvd)[0], Command::Seek { offset: 0 });
    assert_eq!(commands(&dvd).len(), 2);
}

#[test]
fn contiguous_read_is_delayed() {
    let mut dvd = build_dvd();

    dvd.set_workaround_type(SEEK_BEFORE_READ);
    read_ok(&mut dvd, 0x8000, 0);

    let finished = dvd.last_read_finished();
    let (log, cb) = recorder();

    dvd.read(BUF, 0x8000, 0x8000, cb);

    // Nothing sent to the drive yet
    assert_eq!(commands(&dvd).len(), 2);
    assert!(dvd
        .platform()
        .alarm_deadline(Alarm::Workaround)
        .is_some());
    assert!(dvd.queue_pending());

    sim::run_until_idle(&mut dvd);

    assert_eq!(*log.borrow(), vec![Cause::COMPLETE]);

    let cmds = dvd.platform().commands();
    assert_eq!(cmds.len(), 3);

    let (date, cmd) = cmds[2];
    assert_eq!(
        cmd,
        Command::Read {
            addr: BUF,
            length: 0x8000,
            offset: 0x8000
        }
    );
    assert!(date >= finished + READ_SETTLE);
    assert!(dvd.last_read_issued() >= finished + READ_SETTLE);
}

#[test]
fn delayed_read_survives_reset() {
    let mut dvd = build_dvd();

    dvd.set_workaround_type(SEEK_BEFORE_READ);
    read_ok(&mut dvd, 0x8000, 0);

    // The end of the reset is signaled while the read waits for the drive to settle
    dvd.reset();

    let (log, cb) = recorder();
    dvd.read(BUF, 0x8000, 0x8000, cb);
    assert!(dvd.queue_pending());

    sim::run_until_idle(&mut dvd);

    assert_eq!(*log.borrow(), vec![Cause::COMPLETE]);
    assert_eq!(commands(&dvd).len(), 3);
    assert!(!dvd.queue_pending());
}

#[test]
fn aborted_delayed_read_is_dropped() {
    let mut dvd = build_dvd();

    dvd.set_workaround_type(SEEK_BEFORE_READ);
    read_ok(&mut dvd, 0x8000, 0);

    let (cover_log, cover_cb) = recorder();
    let (read_log, read_cb) = recorder();

    dvd.wait_cover_close(cover_cb);
    dvd.read(BUF, 0x8000, 0x8000, read_cb);
    assert!(dvd
        .platform()
        .alarm_deadline(Alarm::Workaround)
        .is_some());

    dvd.platform_mut().open_cover();
    sim::run_until_idle(&mut dvd);

    assert_eq!(*cover_log.borrow(), vec![Cause::COVER]);
    assert!(read_log.borrow().is_empty());
    assert_eq!(dvd.platform().alarm_deadline(Alarm::Workaround), None);
    assert!(!dvd.queue_pending());
    assert_eq!(commands(&dvd).len(), 2);
}

#[test]
fn contiguous_read_after_settle_is_direct() {
    let mut dvd = build_dvd();

    dvd.set_workaround_type(SEEK_BEFORE_READ);
    read_ok(&mut dvd, 0x8000, 0);

    let later = dvd.platform().now() + ms_to_ticks(6);
    sim::run_until(&mut dvd, later);

    let (log, cb) = recorder();
    dvd.read(BUF, 0x8000, 0x8000, cb);

    assert_eq!(dvd.platform().alarm_deadline(Alarm::Workaround), None);
    assert_eq!(commands(&dvd).len(), 3);

    sim::run_until_idle(&mut dvd);

    assert_eq!(*log.borrow(), vec![Cause::COMPLETE]);
}

#[test]
fn jump_read_seeks() {
    let mut dvd = build_dvd();

    dvd.set_workaround_type(SEEK_BEFORE_READ);
    read_ok(&mut dvd, 0x8000, 0);
    read_ok(&mut dvd, 0x20, 5 << 15);

    assert_eq!(
        commands(&dvd)[2..].to_vec(),
        vec![
            Command::Seek {
                offset: (5 << 15) + 0x4_0000
            },
            Command::Read {
                addr: BUF,
                length: 0x20,
                offset: 5 << 15
            },
        ]
    );
}

#[test]
fn cold_read_is_direct() {
    let mut dvd = build_dvd();

    dvd.set_workaround_type(SEEK_BEFORE_READ);
    read_ok(&mut dvd, 0x8000, 0);
    read_ok(&mut dvd, 0x20, 100 << 15);

    assert_eq!(commands(&dvd).len(), 3);
}

#[test]
fn streaming_shrinks_window() {
    let mut dvd = build_dvd();

    dvd.set_workaround_type(SEEK_BEFORE_READ);
    read_ok(&mut dvd, 0x8000, 0);

    // 6 blocks ahead is a jump when not streaming...
    read_ok(&mut dvd, 0x20, 6 << 15);
    assert_eq!(commands(&dvd).len(), 4);

    // ...but out of the window when streaming
    dvd.platform_mut().streaming = true;
    read_ok(&mut dvd, 0x20, 16 << 15);
    assert_eq!(commands(&dvd).len(), 5);
}

#[test]
fn mode_change_rearms_first_read() {
    let mut dvd = build_dvd();

    read_ok(&mut dvd, 0x8000, 0);

    dvd.set_workaround_type(SEEK_BEFORE_READ);

    // Would be contiguous, but it's the first read in this mode
    read_ok(&mut dvd, 0x8000, 0x8000);

    assert_eq!(
        commands(&dvd)[1],
        Command::Seek {
            offset: 0x8000 + 0x4_0000
        }
    );
}

#[test]
fn failed_seek_aborts_read() {
    let mut dvd = build_dvd();
    let (log, cb) = recorder();

    dvd.set_workaround_type(SEEK_BEFORE_READ);
    dvd.platform_mut().inject_fault(Fault::Error);

    dvd.read(BUF, 0x20, 0x8000, cb);
    sim::run_until_idle(&mut dvd);

    assert_eq!(*log.borrow(), vec![Cause::ERROR]);
    assert_eq!(commands(&dvd).len(), 1);
    assert!(!dvd.queue_pending());
    assert_eq!(dvd.queue_cursor(), 0);
}

#[test]
fn timeout() {
    let mut dvd = build_dvd();
    let (log, cb) = recorder();

    dvd.platform_mut().inject_fault(Fault::Silent);

    let start = dvd.platform().now();
    dvd.read(BUF, 0x20, 0, cb);
    sim::run_until_idle(&mut dvd);

    assert_eq!(*log.borrow(), vec![Cause::TIMEOUT]);
    assert!(dvd.platform().now() >= start + secs_to_ticks(10));
    assert!(dvd.platform().di_interrupt_masked());
    assert_eq!(dvd.platform().context_depth(), 0);

    // A late interrupt for the same command is ignored
    dvd.interrupt();
    assert_eq!(log.borrow().len(), 1);
}

#[test]
fn large_read_timeout() {
    let mut dvd = build_dvd();

    let (_, cb) = recorder();
    let start = dvd.platform().now();
    dvd.read(BUF, 0xa0_0000, 0, cb);

    let deadline = dvd.platform().alarm_deadline(Alarm::Timeout).unwrap();
    assert!(deadline >= start + secs_to_ticks(10));
    assert!(deadline < start + secs_to_ticks(11));

    sim::run_until_idle(&mut dvd);

    let (_, cb) = recorder();
    let start = dvd.platform().now();
    dvd.read(BUF, 0xa0_0020, 0, cb);

    let deadline = dvd.platform().alarm_deadline(Alarm::Timeout).unwrap();
    assert!(deadline >= start + secs_to_ticks(20));
    assert!(deadline < start + secs_to_ticks(21));
}

#[test]
fn timeout_discards_chain() {
    let mut dvd = build_dvd();

    dvd.set_workaround_type(SEEK_BEFORE_READ);
    dvd.platform_mut().inject_fault(Fault::Silent);

    let (log, cb) = recorder();
    dvd.read(BUF, 0x20, 0x8000, cb);
    sim::run_until_idle(&mut dvd);

    assert_eq!(*log.borrow(), vec![Cause::TIMEOUT]);
    assert!(!dvd.queue_pending());

    dvd.platform_mut().unmask_di_interrupt();

    let (log, cb) = recorder();
    dvd.stop_motor(cb);
    sim::run_until_idle(&mut dvd);

    // The read that was queued behind the seek must not resurface
    assert_eq!(*log.borrow(), vec![Cause::COMPLETE]);
    assert_eq!(
        commands(&dvd),
        vec![Command::Seek { offset: 0x4_8000 }, Command::StopMotor]
    );
}

#[test]
fn break_before_completion() {
    let mut dvd = build_dvd();
    let (log, cb) = recorder();

    dvd.read(BUF, 0x20, 0, cb);
    dvd.request_break();
    sim::run_until_idle(&mut dvd);

    assert_eq!(*log.borrow(), vec![Cause::COMPLETE | Cause::BREAK]);
}

#[test]
fn break_after_completion() {
    let mut dvd = build_dvd();
    let (log, cb) = recorder();

    dvd.read(BUF, 0x20, 0, cb);
    sim::run_until_idle(&mut dvd);

    dvd.request_break();
    sim::run_until_idle(&mut dvd);

    assert_eq!(*log.borrow(), vec![Cause::COMPLETE]);
}

#[test]
fn break_only_applies_to_reads() {
    let mut dvd = build_dvd();
    let (log, cb) = recorder();

    dvd.stop_motor(cb);
    dvd.request_break();
    sim::run_until_idle(&mut dvd);

    assert_eq!(*log.borrow(), vec![Cause::COMPLETE]);
}

#[test]
fn force_break_waits_for_progress() {
    let mut dvd = build_dvd();
    let (log, cb) = recorder();

    dvd.platform_mut().latency = ms_to_ticks(100);
    dvd.read(BUF, 0x8000, 0, cb);

    dvd.force_break();
    assert!(dvd.platform().alarm_deadline(Alarm::Break).is_some());

    // No progress, keep polling
    let later = dvd.platform().now() + ms_to_ticks(30);
    sim::run_until(&mut dvd, later);
    assert!(dvd.platform().alarm_deadline(Alarm::Break).is_some());
    assert!(log.borrow().is_empty());

    dvd.platform_mut().transfer_progress(0x1000);
    sim::run_until_idle(&mut dvd);

    assert_eq!(*log.borrow(), vec![Cause::BREAK]);
    assert_eq!(dvd.platform().alarm_deadline(Alarm::Break), None);
    assert_eq!(dvd.platform().alarm_deadline(Alarm::Timeout), None);
}

#[test]
fn force_break_without_read() {
    let mut dvd = build_dvd();

    dvd.force_break();
    assert_eq!(dvd.platform().alarm_deadline(Alarm::Break), None);
    assert_eq!(sim::run_until_idle(&mut dvd), 0);

    let (log, cb) = recorder();
    dvd.stop_motor(cb);
    dvd.force_break();
    assert_eq!(dvd.platform().alarm_deadline(Alarm::Break), None);

    sim::run_until_idle(&mut dvd);
    assert_eq!(*log.borrow(), vec![Cause::COMPLETE]);
}

#[test]
fn force_break_stops_after_timeout() {
    let mut dvd = build_dvd();
    let (log, cb) = recorder();

    dvd.platform_mut().inject_fault(Fault::Silent);
    dvd.read(BUF, 0x8000, 0, cb);
    dvd.force_break();

    sim::run_until_idle(&mut dvd);

    assert_eq!(*log.borrow(), vec![Cause::TIMEOUT]);
    assert_eq!(dvd.platform().alarm_deadline(Alarm::Break), None);
}

#[test]
fn unrequested_break_is_ignored() {
    let mut dvd = build_dvd();
    let (log, cb) = recorder();

    dvd.read(BUF, 0x20, 0, cb);

    // Break raised behind the driver's back
    dvd.platform_mut()
        .write_di(DiReg::Status, status::MASKS | status::BREAK_REQUEST);
    sim::run_until_idle(&mut dvd);

    assert!(log.borrow().is_empty());
    assert!(dvd.clear_callback().is_some());
    assert_eq!(dvd.platform().reg(DiReg::Status), status::MASKS);
}

#[test]
fn interrupt_ack_keeps_masks() {
    let mut dvd = build_dvd();

    read_ok(&mut dvd, 0x20, 0);
    assert_eq!(dvd.platform().reg(DiReg::Status), status::MASKS);

    dvd.platform_mut().inject_fault(Fault::Error);
    let (log, cb) = recorder();
    dvd.read(BUF, 0x20, 0, cb);
    sim::run_until_idle(&mut dvd);

    assert_eq!(*log.borrow(), vec![Cause::ERROR]);
    assert_eq!(dvd.platform().reg(DiReg::Status), status::MASKS);
}

#[test]
fn wait_cover_close() {
    let mut dvd = build_dvd();
    let (log, cb) = recorder();

    dvd.platform_mut().open_cover();
    sim::run_until_idle(&mut dvd);
    assert_eq!(dvd.cover_status(), CoverStatus::Open);

    dvd.wait_cover_close(cb);
    assert_eq!(dvd.platform().alarm_deadline(Alarm::Timeout), None);

    dvd.platform_mut().close_cover();
    sim::run_until_idle(&mut dvd);

    assert_eq!(*log.borrow(), vec![Cause::COVER]);
    assert_eq!(dvd.cover_status(), CoverStatus::Closed);

    let reg = dvd.platform().reg(DiReg::Cover);
    assert_eq!(reg & cover::INT, 0);
    assert_ne!(reg & cover::INT_MASK, 0);
}

#[test]
fn cover_status_after_reset() {
    let mut dvd = build_dvd();

    assert_eq!(dvd.cover_status(), CoverStatus::Closed);

    dvd.reset();
    let t = dvd.platform().now();

    assert_eq!(dvd.cover_status(), CoverStatus::Unsettled);

    dvd.platform_mut().set_time(t + COVER_SETTLE - 2);
    assert_eq!(dvd.cover_status(), CoverStatus::Unsettled);

    dvd.platform_mut().set_time(t + COVER_SETTLE);
    assert_eq!(dvd.cover_status(), CoverStatus::Closed);

    dvd.platform_mut().open_cover();
    assert_eq!(dvd.cover_status(), CoverStatus::Open);
}

#[test]
fn reset_callback() {
    let mut dvd = build_dvd();
    let (log, cb) = recorder();

    assert!(dvd.set_reset_cover_callback(Some(Box::new(cb))).is_none());
    assert!(dvd.platform().interrupts_enabled());

    dvd.reset();
    sim::run_until_idle(&mut dvd);

    assert_eq!(*log.borrow(), vec![Cause::COVER]);
    assert_eq!(dvd.platform().context_depth(), 0);
    // Consumed
    assert!(dvd.set_reset_cover_callback(None).is_none());
}

#[test]
fn reset_callback_window_expired() {
    let mut dvd = build_dvd();
    let (log, cb) = recorder();

    dvd.set_reset_cover_callback(Some(Box::new(cb)));

    // The drive takes longer than the window to come back
    dvd.platform_mut().latency = RESET_COVER_WINDOW + ms_to_ticks(50);
    dvd.reset();
    sim::run_until_idle(&mut dvd);

    assert!(log.borrow().is_empty());
    assert!(dvd.set_reset_cover_callback(None).is_some());
}

#[test]
fn reset_callback_cleared_by_command() {
    let mut dvd = build_dvd();
    let (reset_log, reset_cb) = recorder();
    let (log, cb) = recorder();

    dvd.set_reset_cover_callback(Some(Box::new(reset_cb)));

    dvd.platform_mut().latency = ms_to_ticks(50);
    dvd.reset();

    // Completes before the drive signals the end of the reset
    dvd.platform_mut().latency = ms_to_ticks(1);
    dvd.stop_motor(cb);
    sim::run_until_idle(&mut dvd);

    assert_eq!(*log.borrow(), vec![Cause::COMPLETE]);
    assert!(reset_log.borrow().is_empty());
    assert!(dvd.set_reset_cover_callback(None).is_some());
}

#[test]
#[should_panic]
fn workaround_misaligned_seek_location() {
    let mut dvd = build_dvd();

    dvd.set_workaround_type(WorkaroundMode::SeekBeforeRead { seek_location: 2 });
}

#[test]
fn reset_callback_swap() {
    let mut dvd = build_dvd();
    let (log_a, cb_a) = recorder();
    let (_, cb_b) = recorder();

    dvd.set_reset_cover_callback(Some(Box::new(cb_a)));

    let old = dvd.set_reset_cover_callback(Some(Box::new(cb_b)));
    old.unwrap()(Cause::COVER);
    assert_eq!(*log_a.borrow(), vec![Cause::COVER]);

    assert!(dvd.set_reset_cover_callback(None).is_some());
}

#[test]
fn clear_callback() {
    let mut dvd = build_dvd();
    let (log, cb) = recorder();

    dvd.read(BUF, 0x20, 0, cb);

    assert!(dvd.clear_callback().is_some());
    assert!(dvd.clear_callback().is_none());

    sim::run_until_idle(&mut dvd);

    assert!(log.borrow().is_empty());
    assert_eq!(dvd.platform().reg(DiReg::Cover), 0);
}

#[test]
fn command_encoding() {
    let mut dvd = build_dvd();
    let log: CauseLog = Rc::new(RefCell::new(Vec::new()));

    dvd.seek(0x1000, logger(&log));
    assert_eq!(dvd.platform().reg(DiReg::Cmd0), 0xab00_0000);
    assert_eq!(dvd.platform().reg(DiReg::Cmd1), 0x400);
    assert_eq!(dvd.platform().reg(DiReg::Control), 1);
    sim::run_until_idle(&mut dvd);

    dvd.read_disk_id(BUF, logger(&log));
    assert_eq!(dvd.platform().reg(DiReg::Cmd2), 0x20);
    sim::run_until_idle(&mut dvd);

    dvd.inquiry(BUF + 0x20, logger(&log));
    sim::run_until_idle(&mut dvd);

    dvd.stop_motor(logger(&log));
    sim::run_until_idle(&mut dvd);

    dvd.platform_mut().error_code = 0x0102_0401;
    dvd.request_error(logger(&log));
    sim::run_until_idle(&mut dvd);
    assert_eq!(dvd.platform().reg(DiReg::Immediate), 0x0102_0401);

    dvd.audio_stream(AudioStreamCommand::Cancel, 0x1000, 0x8000, logger(&log));
    sim::run_until_idle(&mut dvd);

    dvd.request_audio_status(AudioStatusQuery::CurrentAddress, logger(&log));
    sim::run_until_idle(&mut dvd);

    dvd.audio_buffer_config(true, 0x0a, logger(&log));
    sim::run_until_idle(&mut dvd);

    assert_eq!(
        commands(&dvd),
        vec![
            Command::Seek { offset: 0x1000 },
            Command::ReadDiskId { addr: BUF },
            Command::Inquiry { addr: BUF + 0x20 },
            Command::StopMotor,
            Command::RequestError,
            Command::AudioStream {
                subcmd: 0x1_0000,
                length: 0x1000,
                offset: 0x8000
            },
            Command::AudioStatus { subcmd: 0x1_0000 },
            Command::AudioBufferConfig { config: 0x1_000a },
        ]
    );

    assert_eq!(*log.borrow(), vec![Cause::COMPLETE; 8]);
}

#[test]
#[should_panic]
fn read_misaligned_address() {
    let mut dvd = build_dvd();

    dvd.read(BUF + 4, 0x20, 0, |_| ());
}

#[test]
#[should_panic]
fn read_bad_length() {
    let mut dvd = build_dvd();

    dvd.read(BUF, 0x24, 0, |_| ());
}

#[test]
#[should_panic]
fn read_zero_length() {
    let mut dvd = build_dvd();

    dvd.read(BUF, 0, 0, |_| ());
}

#[test]
#[should_panic]
fn read_misaligned_offset() {
    let mut dvd = build_dvd();

    dvd.read(BUF, 0x20, 2, |_| ());
}

#[test]
#[should_panic]
fn seek_misaligned_offset() {
    let mut dvd = build_dvd();

    dvd.seek(0x1001, |_| ());
}

#[test]
#[should_panic]
fn disk_id_misaligned() {
    let mut dvd = build_dvd();

    dvd.read_disk_id(BUF + 0x10, |_| ());
}
