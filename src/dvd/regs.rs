//! DI and PI register layout

/// Registers of the disc interface, in the order they appear in the memory map (one 32bit word
/// each).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DiReg {
    /// DISR: interrupt status and mask
    Status = 0,
    /// DICVR: cover status and interrupt
    Cover = 1,
    /// DICMDBUF0: command word
    Cmd0 = 2,
    /// DICMDBUF1: first command parameter
    Cmd1 = 3,
    /// DICMDBUF2: second command parameter
    Cmd2 = 4,
    /// DIMAR: DMA target address
    DmaAddr = 5,
    /// DILENGTH: DMA length. The drive decrements it while the transfer progresses.
    DmaLength = 6,
    /// DICR: control
    Control = 7,
    /// DIIMMBUF: immediate data
    Immediate = 8,
}

/// Number of DI registers
pub const DI_REG_COUNT: usize = 9;

pub mod status {
    //! DISR bits

    /// Writing 1 asks the drive to abort the current command
    pub const BREAK_REQUEST: u32 = 1 << 0;
    pub const COMPLETE_MASK: u32 = 1 << 1;
    pub const COMPLETE_INT: u32 = 1 << 2;
    pub const ERROR_MASK: u32 = 1 << 3;
    pub const ERROR_INT: u32 = 1 << 4;
    pub const BREAK_MASK: u32 = 1 << 5;
    pub const BREAK_INT: u32 = 1 << 6;

    /// All the interrupt enable bits. Each one sits right below the interrupt it enables.
    pub const MASKS: u32 = COMPLETE_MASK | ERROR_MASK | BREAK_MASK;
    /// All the latched interrupt bits. They're cleared by writing 1.
    pub const INTS: u32 = COMPLETE_INT | ERROR_INT | BREAK_INT;
}

pub mod cover {
    //! DICVR bits

    /// Set while the lid is open
    pub const OPEN: u32 = 1 << 0;
    pub const INT_MASK: u32 = 1 << 1;
    /// Latched on cover transitions and at the end of a drive reset. Cleared by writing 1.
    pub const INT: u32 = 1 << 2;
}

pub mod control {
    //! DICR bits

    pub const START: u32 = 1 << 0;
    /// Transfer is a DMA (otherwise immediate)
    pub const DMA: u32 = 1 << 1;
}

pub mod reset {
    //! Bits of the PI register controlling the drive reset line

    pub const ALWAYS_SET: u32 = 1 << 0;
    /// Reset is asserted while this bit is low
    pub const DRIVE_RUN: u32 = 1 << 2;
}

pub mod command {
    //! First command word of each command packet

    pub const READ: u32 = 0xa800_0000;
    /// Same opcode as READ, the sub-command selects the disk ID area
    pub const READ_DISK_ID: u32 = 0xa800_0040;
    pub const SEEK: u32 = 0xab00_0000;
    pub const REQUEST_ERROR: u32 = 0xe000_0000;
    pub const AUDIO_STREAM: u32 = 0xe100_0000;
    pub const AUDIO_STATUS: u32 = 0xe200_0000;
    pub const STOP_MOTOR: u32 = 0xe300_0000;
    pub const AUDIO_BUFFER_CONFIG: u32 = 0xe400_0000;
    pub const INQUIRY: u32 = 0x1200_0000;

    /// Enable bit of the audio buffer configuration command
    pub const AUDIO_BUFFER_ENABLE: u32 = 0x1_0000;
}
