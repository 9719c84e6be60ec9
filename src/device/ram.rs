//! Word-addressed memory.
//!
//! Terminals are `[read_enable, write_enable, addr.., din.., dout..]` with
//! address and data bits least significant first. Odd accesses (unknown
//! address, out-of-range address, unknown write data, reads of words never
//! written, read and write enabled together) are warnings: the access is
//! skipped or returns zero, and simulation continues.

use super::{Behavior, DeviceDescriptor, DeviceIo, TermRole};
use crate::error::{Result, SimError};
use crate::network::TermKind;
use crate::strength::{Level, Logic};
use crate::types::Strength;

pub const RAM: DeviceDescriptor = DeviceDescriptor {
    name: "ram",
    terminals: &[
        TermRole::new("read_enable", TermKind::VoltageInput),
        TermRole::new("write_enable", TermKind::VoltageInput),
        TermRole::new("addr", TermKind::VoltageInput),
        TermRole::new("din", TermKind::VoltageInput),
        TermRole::new("dout", TermKind::Output),
    ],
    expandable: None,
    params: [0; 3],
};

/// Widest supported word.
pub const MAX_WORD_BITS: usize = 32;
/// Widest supported address.
pub const MAX_ADDR_BITS: usize = 24;

#[derive(Clone, Debug)]
pub struct Ram {
    addr_bits: usize,
    word_bits: usize,
    read_active_high: bool,
    write_active_high: bool,
    words: Vec<Option<u32>>,
    strength: Strength,
    reads: u64,
    writes: u64,
}

/// Outcome of decoding a group of input bits.
enum Decoded {
    Value(u32),
    Unknown,
}

impl Ram {
    /// Memory of `words` words (all `2^addr_bits` when `None`).
    pub fn new(
        addr_bits: usize,
        word_bits: usize,
        words: Option<usize>,
        strength: Strength,
    ) -> Result<Self> {
        if addr_bits == 0 {
            return Err(SimError::RamNoAddress);
        }
        if word_bits > MAX_WORD_BITS {
            return Err(SimError::RamWordWidth(word_bits));
        }
        if word_bits == 0 {
            return Err(SimError::bad_attr("word_bits", "must be at least 1"));
        }
        if addr_bits > MAX_ADDR_BITS {
            return Err(SimError::bad_attr(
                "addr_bits",
                format!("at most {MAX_ADDR_BITS} address lines are supported"),
            ));
        }
        let full = 1usize << addr_bits;
        let size = words.unwrap_or(full).min(full);
        Ok(Self {
            addr_bits,
            word_bits,
            read_active_high: true,
            write_active_high: true,
            words: vec![None; size],
            strength,
            reads: 0,
            writes: 0,
        })
    }

    /// Sets the active level of the read and write enables.
    pub fn with_polarity(mut self, read_active_high: bool, write_active_high: bool) -> Self {
        self.read_active_high = read_active_high;
        self.write_active_high = write_active_high;
        self
    }

    pub fn addr_bits(&self) -> usize {
        self.addr_bits
    }

    pub fn word_bits(&self) -> usize {
        self.word_bits
    }

    pub fn size(&self) -> usize {
        self.words.len()
    }

    /// Stored word, if it was ever written.
    pub fn peek(&self, addr: usize) -> Option<u32> {
        self.words.get(addr).copied().flatten()
    }

    /// Completed reads.
    pub fn reads(&self) -> u64 {
        self.reads
    }

    /// Completed writes.
    pub fn writes(&self) -> u64 {
        self.writes
    }

    fn addr_term(&self, bit: usize) -> usize {
        2 + bit
    }

    fn din_term(&self, bit: usize) -> usize {
        2 + self.addr_bits + bit
    }

    fn dout_term(&self, bit: usize) -> usize {
        2 + self.addr_bits + self.word_bits + bit
    }

    fn decode(io: &DeviceIo<'_>, terms: impl Iterator<Item = usize>) -> Decoded {
        let mut value = 0u32;
        for (bit, term) in terms.enumerate() {
            match io.logic(term) {
                Logic::One => value |= 1 << bit,
                Logic::Zero => {}
                Logic::X => return Decoded::Unknown,
            }
        }
        Decoded::Value(value)
    }

    fn address(&self, io: &mut DeviceIo<'_>, access: &str) -> Option<usize> {
        let terms = (0..self.addr_bits).map(|b| self.addr_term(b));
        match Self::decode(io, terms) {
            Decoded::Unknown => {
                io.warn(&format!("{access} with unknown address"));
                None
            }
            Decoded::Value(addr) if addr as usize >= self.words.len() => {
                io.warn(&format!(
                    "{access} address {addr} out of range (size {})",
                    self.words.len()
                ));
                None
            }
            Decoded::Value(addr) => Some(addr as usize),
        }
    }

    fn write(&mut self, io: &mut DeviceIo<'_>) {
        let Some(addr) = self.address(io, "write") else {
            return;
        };
        let terms = (0..self.word_bits).map(|b| self.din_term(b));
        match Self::decode(io, terms) {
            Decoded::Unknown => io.warn(&format!("write of unknown data at {addr} ignored")),
            Decoded::Value(data) => {
                self.words[addr] = Some(data);
                self.writes += 1;
            }
        }
    }

    fn drive_outputs(&self, io: &mut DeviceIo<'_>, word: Option<u32>) {
        for bit in 0..self.word_bits {
            let level = match word {
                Some(w) => Level::from_bool((w >> bit) & 1 == 1),
                None => Level::Unknown,
            };
            io.drive(self.dout_term(bit), level, self.strength);
        }
    }

    fn undrive_outputs(&self, io: &mut DeviceIo<'_>) {
        for bit in 0..self.word_bits {
            io.undrive(self.dout_term(bit));
        }
    }

    fn read(&mut self, io: &mut DeviceIo<'_>) {
        let Some(addr) = self.address(io, "read") else {
            self.undrive_outputs(io);
            return;
        };
        let word = match self.words[addr] {
            Some(w) => w,
            None => {
                io.warn(&format!("read of uninitialized address {addr}"));
                0
            }
        };
        self.reads += 1;
        self.drive_outputs(io, Some(word));
    }
}

impl Behavior for Ram {
    fn descriptor(&self) -> &'static DeviceDescriptor {
        &RAM
    }

    fn terminal_count(&self) -> usize {
        2 + self.addr_bits + 2 * self.word_bits
    }

    fn terminal_kind(&self, term: usize) -> TermKind {
        if term < 2 + self.addr_bits + self.word_bits {
            TermKind::VoltageInput
        } else {
            TermKind::Output
        }
    }

    fn simulate(&mut self, io: &mut DeviceIo<'_>) {
        let read = io.logic(0).active(self.read_active_high);
        let write = io.logic(1).active(self.write_active_high);

        if read == Logic::One && write == Logic::One {
            io.warn("read and write enabled together");
        }
        match write {
            Logic::One => self.write(io),
            Logic::X => io.warn("write enable unknown, write ignored"),
            Logic::Zero => {}
        }
        match read {
            Logic::One => self.read(io),
            Logic::X => self.drive_outputs(io, None),
            Logic::Zero => self.undrive_outputs(io),
        }
    }

    fn startup(&mut self, io: &mut DeviceIo<'_>) {
        let read = io.logic(0).active(self.read_active_high);
        match read {
            Logic::Zero => self.undrive_outputs(io),
            Logic::One => self.read(io),
            Logic::X => self.drive_outputs(io, None),
        }
    }

    fn restart(&mut self) {
        self.words.iter_mut().for_each(|w| *w = None);
        self.reads = 0;
        self.writes = 0;
    }

    fn describe(&self) -> String {
        format!(
            "ram {}x{} ({} address lines) read {} write {} reads {} writes {}",
            self.words.len(),
            self.word_bits,
            self.addr_bits,
            if self.read_active_high { "high" } else { "low" },
            if self.write_active_high { "high" } else { "low" },
            self.reads,
            self.writes
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_errors() {
        assert!(matches!(Ram::new(0, 8, None, 1), Err(SimError::RamNoAddress)));
        assert!(matches!(Ram::new(2, 33, None, 1), Err(SimError::RamWordWidth(33))));
        assert!(matches!(Ram::new(2, 0, None, 1), Err(SimError::BadAttribute { .. })));
        assert!(Ram::new(2, 32, None, 1).is_ok());
    }

    #[test]
    fn test_layout() {
        let ram = Ram::new(2, 4, None, 1).unwrap();
        assert_eq!(ram.size(), 4);
        assert_eq!(ram.terminal_count(), 2 + 2 + 8);
        assert_eq!(ram.terminal_kind(1), TermKind::VoltageInput);
        assert_eq!(ram.terminal_kind(7), TermKind::VoltageInput);
        assert_eq!(ram.terminal_kind(8), TermKind::Output);
        assert_eq!(ram.dout_term(3), 11);
    }

    #[test]
    fn test_partial_size() {
        let ram = Ram::new(3, 8, Some(5), 1).unwrap();
        assert_eq!(ram.size(), 5);
        let clamped = Ram::new(2, 8, Some(100), 1).unwrap();
        assert_eq!(clamped.size(), 4);
        assert_eq!(clamped.peek(0), None);
    }
}
