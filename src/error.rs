use std::fmt;
use std::num::ParseIntError;

pub type Result<T> = ::std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// The requested drive workaround type doesn't exist
    BadWorkaroundType(u32),
    /// The seek workaround location isn't a multiple of 4
    BadSeekLocation(u32),
    /// A numeric argument couldn't be parsed
    BadNumber(ParseIntError),
    LogicError(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::BadWorkaroundType(t) => write!(f, "unknown workaround type {}", t),
            Error::BadSeekLocation(l) => write!(f, "misaligned seek location 0x{:x}", l),
            Error::BadNumber(e) => write!(f, "bad number: {}", e),
            Error::LogicError(s) => write!(f, "{}", s),
        }
    }
}

impl std::error::Error for Error {}

impl From<ParseIntError> for Error {
    fn from(e: ParseIntError) -> Self {
        Error::BadNumber(e)
    }
}
