//! Signal strengths, composite voltages and their lookup tables.
//!
//! Every driven terminal carries a strength byte where lower is stronger:
//! `0` is a supply rail, `1..=127` a normal drive, `128..=253` a weak drive,
//! `254` stored charge and `255` nothing at all. A node keeps the strongest
//! high and the strongest low contribution it sees, and its composite
//! [`Voltage`] is a pure table lookup on the two drive classes.

use serde::{Deserialize, Serialize};

use crate::types::Strength;

/// Strength of a supply or ground rail.
pub const RAIL: Strength = 0;
/// Strongest non-rail drive; what a conducting transistor makes of a rail.
pub const DRIVE: Strength = 1;
/// Weakest strength still in the normal drive band.
pub const DRIVE_MAX: Strength = 127;
/// Strongest weak drive.
pub const WEAK: Strength = 128;
/// Weakest strength still in the weak band.
pub const WEAK_MAX: Strength = 253;
/// Stored charge on an otherwise undriven node.
pub const CHARGED: Strength = 254;
/// No contribution.
pub const NONE: Strength = 255;

/// The five classes a strength byte collapses into, strongest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum DriveClass {
    Rail = 0,
    Drive = 1,
    Weak = 2,
    Charged = 3,
    Nothing = 4,
}

/// The composite value of a node.
///
/// The discriminants are the raw codes used by the persisted state image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Voltage {
    Strong1 = 0,
    Strong0 = 1,
    Normal1 = 2,
    Normal0 = 3,
    NormalX = 4,
    Weak1 = 5,
    Weak0 = 6,
    WeakX = 7,
    Charged1 = 8,
    Charged0 = 9,
    #[default]
    ChargedX = 10,
    /// Both rails driven at full strength. Always a fatal condition.
    Illegal = 11,
}

/// Three-valued logic as seen by device inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Logic {
    Zero,
    One,
    X,
}

/// A value a device may put on one of its outputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    Low,
    High,
    Unknown,
}

/// Strength byte to drive class.
pub const DRIVE_TABLE: [DriveClass; 256] = build_drive_table();

/// `(class(high) << 3) | class(low)` to voltage.
pub const COMBO_TABLE: [Voltage; 64] = build_combo_table();

/// Voltage code to display character.
pub const LETTER_TABLE: [char; 12] = ['H', 'L', '1', '0', 'X', 'h', 'l', 'x', '+', '-', '?', '!'];

const fn build_drive_table() -> [DriveClass; 256] {
    let mut table = [DriveClass::Nothing; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = match i {
            0 => DriveClass::Rail,
            1..=127 => DriveClass::Drive,
            128..=253 => DriveClass::Weak,
            254 => DriveClass::Charged,
            _ => DriveClass::Nothing,
        };
        i += 1;
    }
    table
}

const fn combine_classes(high: DriveClass, low: DriveClass) -> Voltage {
    use DriveClass::*;
    match (high, low) {
        (Rail, Rail) => Voltage::Illegal,
        (Rail, _) => Voltage::Strong1,
        (_, Rail) => Voltage::Strong0,
        (Drive, Drive) => Voltage::NormalX,
        (Drive, _) => Voltage::Normal1,
        (_, Drive) => Voltage::Normal0,
        (Weak, Weak) => Voltage::WeakX,
        (Weak, _) => Voltage::Weak1,
        (_, Weak) => Voltage::Weak0,
        (Charged, Charged) => Voltage::ChargedX,
        (Charged, _) => Voltage::Charged1,
        (_, Charged) => Voltage::Charged0,
        (Nothing, Nothing) => Voltage::ChargedX,
    }
}

const fn class_from_index(i: usize) -> Option<DriveClass> {
    match i {
        0 => Some(DriveClass::Rail),
        1 => Some(DriveClass::Drive),
        2 => Some(DriveClass::Weak),
        3 => Some(DriveClass::Charged),
        4 => Some(DriveClass::Nothing),
        _ => None,
    }
}

const fn build_combo_table() -> [Voltage; 64] {
    let mut table = [Voltage::Illegal; 64];
    let mut i = 0;
    while i < 64 {
        if let (Some(high), Some(low)) = (class_from_index(i >> 3), class_from_index(i & 7)) {
            table[i] = combine_classes(high, low);
        }
        i += 1;
    }
    table
}

/// Returns the drive class of a strength byte.
#[inline]
pub fn class_of(strength: Strength) -> DriveClass {
    DRIVE_TABLE[strength as usize]
}

/// Resolves a pair of accumulated strengths to a composite voltage.
#[inline]
pub fn resolve(high: Strength, low: Strength) -> Voltage {
    COMBO_TABLE[((class_of(high) as usize) << 3) | class_of(low) as usize]
}

/// Strength a conducting switch hands to the node on its other side.
///
/// A rail comes out as a normal drive; a weak switch clamps anything it
/// passes into the weak band. Charge and nothing pass unchanged.
#[inline]
pub fn through_switch(strength: Strength, weak: bool) -> Strength {
    if strength >= CHARGED {
        strength
    } else if weak {
        strength.max(WEAK)
    } else {
        strength.max(DRIVE)
    }
}

impl Voltage {
    /// All voltages in code order.
    pub const ALL: [Voltage; 12] = [
        Voltage::Strong1,
        Voltage::Strong0,
        Voltage::Normal1,
        Voltage::Normal0,
        Voltage::NormalX,
        Voltage::Weak1,
        Voltage::Weak0,
        Voltage::WeakX,
        Voltage::Charged1,
        Voltage::Charged0,
        Voltage::ChargedX,
        Voltage::Illegal,
    ];

    /// Raw code used in state images.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Inverse of [`Voltage::code`].
    pub fn from_code(code: u8) -> Option<Voltage> {
        Self::ALL.get(code as usize).copied()
    }

    /// Single-character display symbol.
    pub fn letter(self) -> char {
        LETTER_TABLE[self as usize]
    }

    /// The logic value a device input sees.
    pub fn logic(self) -> Logic {
        match self {
            Voltage::Strong1 | Voltage::Normal1 | Voltage::Weak1 | Voltage::Charged1 => Logic::One,
            Voltage::Strong0 | Voltage::Normal0 | Voltage::Weak0 | Voltage::Charged0 => Logic::Zero,
            Voltage::NormalX | Voltage::WeakX | Voltage::ChargedX | Voltage::Illegal => Logic::X,
        }
    }

    pub fn is_high(self) -> bool {
        self.logic() == Logic::One
    }

    pub fn is_low(self) -> bool {
        self.logic() == Logic::Zero
    }
}

impl std::fmt::Display for Voltage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.letter())
    }
}

impl Logic {
    pub fn not(self) -> Logic {
        match self {
            Logic::Zero => Logic::One,
            Logic::One => Logic::Zero,
            Logic::X => Logic::X,
        }
    }

    pub fn and(self, other: Logic) -> Logic {
        match (self, other) {
            (Logic::Zero, _) | (_, Logic::Zero) => Logic::Zero,
            (Logic::One, Logic::One) => Logic::One,
            _ => Logic::X,
        }
    }

    pub fn or(self, other: Logic) -> Logic {
        match (self, other) {
            (Logic::One, _) | (_, Logic::One) => Logic::One,
            (Logic::Zero, Logic::Zero) => Logic::Zero,
            _ => Logic::X,
        }
    }

    /// Applies an active-high/active-low polarity: the result is `One` when
    /// the signal is at its active level.
    pub fn active(self, active_high: bool) -> Logic {
        if active_high {
            self
        } else {
            self.not()
        }
    }

    pub fn from_bool(value: bool) -> Logic {
        if value {
            Logic::One
        } else {
            Logic::Zero
        }
    }

    pub fn to_level(self) -> Level {
        match self {
            Logic::Zero => Level::Low,
            Logic::One => Level::High,
            Logic::X => Level::Unknown,
        }
    }
}

impl Level {
    /// High and low contributions of a terminal driving this level.
    pub fn strengths(self, strength: Strength) -> (Strength, Strength) {
        match self {
            Level::High => (strength, NONE),
            Level::Low => (NONE, strength),
            Level::Unknown => (strength, strength),
        }
    }

    pub fn invert(self) -> Level {
        match self {
            Level::High => Level::Low,
            Level::Low => Level::High,
            Level::Unknown => Level::Unknown,
        }
    }

    pub fn from_bool(value: bool) -> Level {
        if value {
            Level::High
        } else {
            Level::Low
        }
    }
}
