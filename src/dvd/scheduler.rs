//! Read scheduling
//!
//! Some drive firmware revisions mishandle a read that lands right after the previous one while
//! the drive is still busy filling its read-ahead cache: the data comes back late or not at all.
//! The workaround is to either give the drive a little time to settle before issuing a read that
//! hits the cache, or to force the head somewhere else with an explicit seek before reading.
//!
//! The functions in this module only take the decision, `DvdLow::read` carries it out.

use super::timings;
use super::Ticks;
use crate::error::{Error, Result};

/// The drive caches data in 32KiB blocks
const BLOCK_SHIFT: u32 = 15;
const BLOCK_MASK: u32 = 0x1_ffff;

/// Read-ahead window, in blocks, when the drive isn't streaming audio
const WINDOW_BLOCKS: u32 = 15;
/// Read-ahead window, in blocks, when part of the cache is reserved for audio streaming
const WINDOW_BLOCKS_STREAMING: u32 = 5;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum WorkaroundMode {
    /// Issue every read as requested
    Disabled,
    /// Seek before reads that would confuse the drive. `seek_location` is added to the 32KiB
    /// aligned target of the seek.
    SeekBeforeRead { seek_location: u32 },
}

impl WorkaroundMode {
    /// Build a workaround mode from the raw type used by the OS configuration
    pub fn from_raw(kind: u32, seek_location: u32) -> Result<WorkaroundMode> {
        match kind {
            0 => Ok(WorkaroundMode::Disabled),
            1 => {
                if seek_location & 3 != 0 {
                    return Err(Error::BadSeekLocation(seek_location));
                }

                Ok(WorkaroundMode::SeekBeforeRead { seek_location })
            }
            _ => Err(Error::BadWorkaroundType(kind)),
        }
    }
}

/// A single data transfer
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Transfer {
    pub addr: u32,
    pub length: u32,
    pub offset: u32,
}

impl Transfer {
    /// Block containing the first byte of the transfer
    pub fn start_block(&self) -> u32 {
        (self.offset >> BLOCK_SHIFT) & BLOCK_MASK
    }

    /// Block containing the last byte of the transfer
    pub fn end_block(&self) -> u32 {
        let last = self.offset.wrapping_add(self.length).wrapping_sub(1);

        (last >> BLOCK_SHIFT) & BLOCK_MASK
    }
}

/// Position of a new transfer relative to the last completed one
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Locality {
    /// Outside of the drive's read-ahead window
    Cold,
    /// Starts in the last block of the previous transfer or the one right after
    Contiguous,
    /// Within the read-ahead window but not contiguous
    Jump,
}

/// Classify `current` against `previous`
pub fn locality(current: &Transfer, previous: &Transfer, streaming: bool) -> Locality {
    let prev_end = i64::from(previous.end_block());
    let start = i64::from(current.start_block());

    let window = if streaming {
        WINDOW_BLOCKS_STREAMING
    } else {
        WINDOW_BLOCKS
    };

    let warm = start + 2 > prev_end && start < prev_end + i64::from(window) + 3;

    if !warm {
        Locality::Cold
    } else if start == prev_end || start == prev_end + 1 {
        Locality::Contiguous
    } else {
        Locality::Jump
    }
}

/// Location of the seek issued before reading at `offset`
pub fn seek_offset(offset: u32, seek_location: u32) -> u32 {
    let block_start = offset & !((1 << BLOCK_SHIFT) - 1);

    if block_start == 0 {
        0
    } else {
        block_start.wrapping_add(seek_location)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ReadPlan {
    /// Issue the read right away
    Direct,
    /// Seek to `seek_offset` then read
    SeekFirst { seek_offset: u32 },
    /// Wait for the given number of ticks then read
    Delay(Ticks),
}

/// Decide how to issue `current`. `first_read` is true if no read completed since the mode was
/// set and `since_last_read` is the time elapsed since the previous read finished.
pub fn plan_read(
    mode: WorkaroundMode,
    first_read: bool,
    current: &Transfer,
    previous: &Transfer,
    streaming: bool,
    since_last_read: Ticks,
) -> ReadPlan {
    let seek_location = match mode {
        WorkaroundMode::Disabled => return ReadPlan::Direct,
        WorkaroundMode::SeekBeforeRead { seek_location } => seek_location,
    };

    let seek_first = ReadPlan::SeekFirst {
        seek_offset: seek_offset(current.offset, seek_location),
    };

    if first_read {
        return seek_first;
    }

    match locality(current, previous, streaming) {
        Locality::Cold => ReadPlan::Direct,
        Locality::Jump => seek_first,
        Locality::Contiguous => {
            let settle = timings::READ_SETTLE;

            if since_last_read >= settle {
                ReadPlan::Direct
            } else {
                ReadPlan::Delay(settle - since_last_read)
            }
        }
    }
}

#[cfg(test)]
fn transfer(offset: u32, length: u32) -> Transfer {
    Transfer {
        addr: 0x8010_0000,
        length,
        offset,
    }
}

#[cfg(test)]
const SEEK_BEFORE_READ: WorkaroundMode = WorkaroundMode::SeekBeforeRead {
    seek_location: 0x4_0000,
};

#[test]
fn test_blocks() {
    let t = transfer(0x8000, 0x8000);

    assert_eq!(t.start_block(), 1);
    assert_eq!(t.end_block(), 1);

    let t = transfer(0x7fe0, 0x40);

    assert_eq!(t.start_block(), 0);
    assert_eq!(t.end_block(), 1);
}

#[test]
fn test_locality_contiguous() {
    let prev = transfer(0, 0x8000);
    let cur = transfer(0x8000, 0x8000);

    assert_eq!(locality(&cur, &prev, false), Locality::Contiguous);

    // Same block
    let cur = transfer(0x4000, 0x20);
    assert_eq!(locality(&cur, &prev, false), Locality::Contiguous);
}

#[test]
fn test_locality_window() {
    // Previous transfer ends in block 10
    let prev = transfer(10 << 15, 0x20);

    // Slightly behind
    assert_eq!(
        locality(&transfer(9 << 15, 0x20), &prev, false),
        Locality::Jump
    );
    assert_eq!(
        locality(&transfer(8 << 15, 0x20), &prev, false),
        Locality::Cold
    );

    // Ahead, within the window
    assert_eq!(
        locality(&transfer(27 << 15, 0x20), &prev, false),
        Locality::Jump
    );
    assert_eq!(
        locality(&transfer(28 << 15, 0x20), &prev, false),
        Locality::Cold
    );

    // The window shrinks while streaming
    assert_eq!(
        locality(&transfer(17 << 15, 0x20), &prev, true),
        Locality::Jump
    );
    assert_eq!(
        locality(&transfer(18 << 15, 0x20), &prev, true),
        Locality::Cold
    );
}

#[test]
fn test_seek_offset() {
    assert_eq!(seek_offset(0, 0x4_0000), 0);
    assert_eq!(seek_offset(0x7ffc, 0x4_0000), 0);
    assert_eq!(seek_offset(0x8000, 0x4_0000), 0x4_8000);
    assert_eq!(seek_offset(0x1_2344, 0x4_0000), 0x5_0000);
}

#[test]
fn test_plan_disabled() {
    let plan = plan_read(
        WorkaroundMode::Disabled,
        true,
        &transfer(0x8000, 0x20),
        &Transfer::default(),
        false,
        0,
    );

    assert_eq!(plan, ReadPlan::Direct);
}

#[test]
fn test_plan_first_read() {
    let plan = plan_read(
        SEEK_BEFORE_READ,
        true,
        &transfer(0x1_0040, 0x20),
        &Transfer::default(),
        false,
        0,
    );

    assert_eq!(
        plan,
        ReadPlan::SeekFirst {
            seek_offset: 0x5_0000
        }
    );
}

#[test]
fn test_plan_contiguous() {
    let prev = transfer(0, 0x8000);
    let cur = transfer(0x8000, 0x8000);
    let settle = timings::READ_SETTLE;

    assert_eq!(
        plan_read(SEEK_BEFORE_READ, false, &cur, &prev, false, 100),
        ReadPlan::Delay(settle - 100)
    );

    assert_eq!(
        plan_read(SEEK_BEFORE_READ, false, &cur, &prev, false, settle),
        ReadPlan::Direct
    );
}

#[test]
fn test_plan_jump_and_cold() {
    let prev = transfer(0, 0x8000);

    assert_eq!(
        plan_read(
            SEEK_BEFORE_READ,
            false,
            &transfer(5 << 15, 0x20),
            &prev,
            false,
            0
        ),
        ReadPlan::SeekFirst {
            seek_offset: (5 << 15) + 0x4_0000
        }
    );

    assert_eq!(
        plan_read(
            SEEK_BEFORE_READ,
            false,
            &transfer(100 << 15, 0x20),
            &prev,
            false,
            0
        ),
        ReadPlan::Direct
    );
}

#[test]
fn test_workaround_from_raw() {
    assert_eq!(
        WorkaroundMode::from_raw(0, 12).unwrap(),
        WorkaroundMode::Disabled
    );
    assert_eq!(
        WorkaroundMode::from_raw(1, 12).unwrap(),
        WorkaroundMode::SeekBeforeRead { seek_location: 12 }
    );
    assert!(WorkaroundMode::from_raw(2, 0).is_err());
}

#[test]
fn test_workaround_seek_location_alignment() {
    match WorkaroundMode::from_raw(1, 2) {
        Err(Error::BadSeekLocation(2)) => (),
        r => panic!("Unexpected result {:?}", r),
    }

    // The location is ignored when the workaround is off
    assert_eq!(
        WorkaroundMode::from_raw(0, 2).unwrap(),
        WorkaroundMode::Disabled
    );
}
