//! Chain of sub-commands making up a single logical operation (e.g. seek then read). The chain
//! is loaded by the read scheduler before the first sub-command is issued and then consumed one
//! command at a time by the completion handler.

use super::Callback;

/// Number of slots in the queue. The last slot always holds the terminator so at most
/// `QUEUE_SLOTS - 1` commands can be chained.
pub const QUEUE_SLOTS: usize = 3;

pub enum PendingCommand {
    Read {
        addr: u32,
        length: u32,
        offset: u32,
        /// If `None` the callback already pending in the driver is kept
        callback: Option<Callback>,
    },
    Seek {
        offset: u32,
        callback: Option<Callback>,
    },
}

pub struct CommandQueue {
    /// `None` marks the end of the chain
    slots: [Option<PendingCommand>; QUEUE_SLOTS],
    /// Number of populated slots
    len: usize,
    /// Index of the next command to issue. Never greater than `len`.
    next: usize,
}

impl CommandQueue {
    pub fn new() -> CommandQueue {
        CommandQueue {
            slots: [None, None, None],
            len: 0,
            next: 0,
        }
    }

    /// Discard all the pending commands and rewind the cursor
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }

        self.len = 0;
        self.next = 0;
    }

    /// Append `command` at the end of the chain
    pub fn push(&mut self, command: PendingCommand) {
        assert!(
            self.len < QUEUE_SLOTS - 1,
            "DVD command queue overflow ({} commands)",
            self.len
        );

        self.slots[self.len] = Some(command);
        self.len += 1;
    }

    /// Pop the command under the cursor, if any
    pub fn advance(&mut self) -> Option<PendingCommand> {
        debug_assert!(self.next <= self.len);

        let command = self.slots[self.next].take()?;

        self.next += 1;

        Some(command)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn next_index(&self) -> usize {
        self.next
    }

    /// True if no command remains to be issued
    pub fn is_exhausted(&self) -> bool {
        self.slots[self.next].is_none()
    }
}

#[cfg(test)]
fn seek(offset: u32) -> PendingCommand {
    PendingCommand::Seek {
        offset,
        callback: None,
    }
}

#[cfg(test)]
fn read(offset: u32) -> PendingCommand {
    PendingCommand::Read {
        addr: 0x8000_0000,
        length: 0x20,
        offset,
        callback: None,
    }
}

#[test]
fn test_queue_chain() {
    let mut queue = CommandQueue::new();

    assert!(queue.is_exhausted());
    assert!(queue.advance().is_none());

    queue.push(seek(0x8000));
    queue.push(read(0x8040));

    assert_eq!(queue.len(), 2);

    match queue.advance() {
        Some(PendingCommand::Seek { offset, .. }) => assert_eq!(offset, 0x8000),
        _ => panic!("expected a seek"),
    }

    match queue.advance() {
        Some(PendingCommand::Read { offset, .. }) => assert_eq!(offset, 0x8040),
        _ => panic!("expected a read"),
    }

    assert!(queue.is_exhausted());
    assert!(queue.advance().is_none());
    // The cursor stays on the terminator
    assert_eq!(queue.next_index(), 2);
}

#[test]
fn test_queue_clear() {
    let mut queue = CommandQueue::new();

    queue.push(read(0));
    queue.clear();

    assert_eq!(queue.len(), 0);
    assert_eq!(queue.next_index(), 0);
    assert!(queue.advance().is_none());
}

#[test]
#[should_panic]
fn test_queue_overflow() {
    let mut queue = CommandQueue::new();

    queue.push(seek(0));
    queue.push(read(0));
    queue.push(read(0));
}
