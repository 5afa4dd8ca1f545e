use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Reason why a command finished, passed to the completion callbacks. Several bits can be set at
/// once (for instance a read that completed right as a break was requested reports both COMPLETE
/// and BREAK) except for TIMEOUT which is always alone.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Cause(u32);

impl Cause {
    /// The drive reported an error, the caller should issue `request_error` to find out why
    pub const ERROR: Cause = Cause(1 << 0);
    pub const COMPLETE: Cause = Cause(1 << 1);
    /// The cover closed (or, for the reset callback, the drive came back from a reset)
    pub const COVER: Cause = Cause(1 << 2);
    pub const BREAK: Cause = Cause(1 << 3);
    /// No interrupt was received in time
    pub const TIMEOUT: Cause = Cause(0x10);

    pub fn empty() -> Cause {
        Cause(0)
    }

    pub fn from_bits(bits: u32) -> Cause {
        Cause(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true if all the bits of `other` are set in `self`
    pub fn contains(self, other: Cause) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn remove(&mut self, other: Cause) {
        self.0 &= !other.0;
    }
}

impl BitOr for Cause {
    type Output = Cause;

    fn bitor(self, rhs: Cause) -> Cause {
        Cause(self.0 | rhs.0)
    }
}

impl BitOrAssign for Cause {
    fn bitor_assign(&mut self, rhs: Cause) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Cause {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        const NAMES: [(Cause, &str); 5] = [
            (Cause::ERROR, "ERROR"),
            (Cause::COMPLETE, "COMPLETE"),
            (Cause::COVER, "COVER"),
            (Cause::BREAK, "BREAK"),
            (Cause::TIMEOUT, "TIMEOUT"),
        ];

        write!(f, "Cause(")?;

        let mut first = true;
        for &(c, name) in NAMES.iter() {
            if self.contains(c) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }

        write!(f, ")")
    }
}

#[test]
fn test_cause_bits() {
    let mut c = Cause::COMPLETE | Cause::BREAK;

    assert_eq!(c.bits(), 0xa);
    assert!(c.contains(Cause::BREAK));
    assert!(!c.contains(Cause::ERROR));

    c.remove(Cause::BREAK);
    assert_eq!(c, Cause::COMPLETE);

    c.remove(Cause::COMPLETE);
    assert!(c.is_empty());
}

#[test]
fn test_cause_debug() {
    assert_eq!(
        format!("{:?}", Cause::ERROR | Cause::COVER),
        "Cause(ERROR|COVER)"
    );
    assert_eq!(format!("{:?}", Cause::empty()), "Cause()");
}
