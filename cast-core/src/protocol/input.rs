//! Input-capture bodies: the 16-byte input report.
//!
//! ## Wire layout (16 bytes)
//!
//! ```text
//! down:       u32  (4)  buttons pressed this report
//! up:         u32  (4)  buttons released this report
//! circle_x:   i16  (2)  primary analog pad
//! circle_y:   i16  (2)
//! cstick_x:   i16  (2)  secondary analog stick
//! cstick_y:   i16  (2)
//! ```

use bitflags::bitflags;

use crate::error::CastError;

// ── ButtonMask ───────────────────────────────────────────────────

bitflags! {
    /// Button bits carried in the `down`/`up` fields of an input report.
    ///
    /// Unknown bits are preserved on decode so reports from newer pads
    /// survive a round trip.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ButtonMask: u32 {
        const A          = 1 << 0;
        const B          = 1 << 1;
        const SELECT     = 1 << 2;
        const START      = 1 << 3;
        const DPAD_RIGHT = 1 << 4;
        const DPAD_LEFT  = 1 << 5;
        const DPAD_UP    = 1 << 6;
        const DPAD_DOWN  = 1 << 7;
        const R          = 1 << 8;
        const L          = 1 << 9;
        const X          = 1 << 10;
        const Y          = 1 << 11;
        const ZL         = 1 << 14;
        const ZR         = 1 << 15;
    }
}

// ── InputReport ──────────────────────────────────────────────────

/// Wire size of an input report body.
pub const INPUT_REPORT_SIZE: usize = 16;

/// One sampled input state: button transitions plus analog positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputReport {
    pub down: ButtonMask,
    pub up: ButtonMask,
    pub circle_x: i16,
    pub circle_y: i16,
    pub cstick_x: i16,
    pub cstick_y: i16,
}

impl InputReport {
    pub fn new(
        down: ButtonMask,
        up: ButtonMask,
        circle_x: i16,
        circle_y: i16,
        cstick_x: i16,
        cstick_y: i16,
    ) -> Self {
        Self {
            down,
            up,
            circle_x,
            circle_y,
            cstick_x,
            cstick_y,
        }
    }

    /// A report with no transitions and centered pads.
    pub fn idle() -> Self {
        Self::default()
    }

    /// Whether this report carries no button or pad activity.
    pub fn is_idle(&self) -> bool {
        self.down.is_empty()
            && self.up.is_empty()
            && self.circle_x == 0
            && self.circle_y == 0
            && self.cstick_x == 0
            && self.cstick_y == 0
    }

    /// Serialize to the 16-byte wire form.
    pub fn encode(&self) -> [u8; INPUT_REPORT_SIZE] {
        let mut buf = [0u8; INPUT_REPORT_SIZE];
        buf[0..4].copy_from_slice(&self.down.bits().to_le_bytes());
        buf[4..8].copy_from_slice(&self.up.bits().to_le_bytes());
        buf[8..10].copy_from_slice(&self.circle_x.to_le_bytes());
        buf[10..12].copy_from_slice(&self.circle_y.to_le_bytes());
        buf[12..14].copy_from_slice(&self.cstick_x.to_le_bytes());
        buf[14..16].copy_from_slice(&self.cstick_y.to_le_bytes());
        buf
    }

    /// Parse from an exactly 16-byte body.
    pub fn decode(bytes: &[u8]) -> Result<Self, CastError> {
        if bytes.len() != INPUT_REPORT_SIZE {
            return Err(CastError::InvalidPayloadLength {
                expected: INPUT_REPORT_SIZE,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            down: ButtonMask::from_bits_retain(u32::from_le_bytes(bytes[0..4].try_into().unwrap())),
            up: ButtonMask::from_bits_retain(u32::from_le_bytes(bytes[4..8].try_into().unwrap())),
            circle_x: i16::from_le_bytes(bytes[8..10].try_into().unwrap()),
            circle_y: i16::from_le_bytes(bytes[10..12].try_into().unwrap()),
            cstick_x: i16::from_le_bytes(bytes[12..14].try_into().unwrap()),
            cstick_y: i16::from_le_bytes(bytes[14..16].try_into().unwrap()),
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────
