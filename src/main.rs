#[macro_use]
extern crate log;
extern crate simple_logger;

use std::cell::RefCell;
use std::rc::Rc;

use dvdlow::dvd::sim::{self, SimDrive};
use dvdlow::dvd::{Cause, DvdLow, WorkaroundMode};
use dvdlow::error::{Error, Result};

/// Parse a number in decimal or 0x-prefixed hexadecimal
fn parse_number(s: &str) -> Result<u32> {
    let n = if s.starts_with("0x") {
        u32::from_str_radix(&s[2..], 16)?
    } else {
        s.parse()?
    };

    Ok(n)
}

fn main() -> Result<()> {
    if let Err(e) = simple_logger::init() {
        return Err(Error::LogicError(format!("Can't init logger: {}", e)));
    }

    let args: Vec<_> = std::env::args().collect();

    if args.len() > 3 {
        error!("Usage: dvdlow [workaround-type [seek-location]]");
        return Err(Error::LogicError("Too many arguments".into()));
    }

    let kind = match args.get(1) {
        Some(k) => parse_number(k)?,
        None => 1,
    };

    let location = match args.get(2) {
        Some(l) => parse_number(l)?,
        None => 0x3_0000,
    };

    let mode = WorkaroundMode::from_raw(kind, location)?;

    info!("Workaround: {:?}", mode);

    let mut dvd = DvdLow::new(SimDrive::new());

    dvd.set_workaround_type(mode);

    let causes = Rc::new(RefCell::new(Vec::new()));

    // Stream a file sequentially then jump around a bit
    let offsets = [0, 0x8000, 0x1_0000, 0x6_0000, 0x6_8000, 0x40_0000];

    for &offset in offsets.iter() {
        let c = causes.clone();

        dvd.read(0x8010_0000, 0x8000, offset, move |cause| {
            c.borrow_mut().push((offset, cause))
        });

        let events = sim::run_until_idle(&mut dvd);

        debug!("{} events for read at 0x{:x}", events, offset);
    }

    for &(offset, cause) in causes.borrow().iter() {
        if cause == Cause::COMPLETE {
            info!("Read at 0x{:06x}: {:?}", offset, cause);
        } else {
            warn!("Read at 0x{:06x}: {:?}", offset, cause);
        }
    }

    for &(date, command) in dvd.platform().commands() {
        info!("{:>12} {:?}", date, command);
    }

    Ok(())
}
