use std::{fmt, str::FromStr};

use crate::error::{AddressError, ConfigError};

/// Addresses narrower than this are zero-extended before conversion.
const MIN_ADDR_BYTES: usize = 4;

/// A decoded trace address: its value as a byte offset plus the bit width
/// the hex text spelled out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    value: u64,
    width: u32,
}

impl Address {
    pub fn new(value: u64) -> Self {
        let bytes = (u64::BITS - value.leading_zeros()).div_ceil(8) as usize;
        Address {
            value,
            width: (bytes.max(MIN_ADDR_BYTES) * 8) as u32,
        }
    }

    /// Parses `0x`-prefixed (or bare) hex. Digits become big-endian bytes,
    /// zero-extended on the left to at least four bytes.
    pub fn parse(text: &str) -> Result<Self, AddressError> {
        let digits = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .unwrap_or(text);
        if digits.is_empty() {
            return Err(AddressError::Empty);
        }

        let mut nibbles = Vec::with_capacity(digits.len() + 1);
        if digits.len() % 2 == 1 {
            nibbles.push(0);
        }
        for c in digits.chars() {
            let nibble = c.to_digit(16).ok_or(AddressError::InvalidDigit(c))?;
            nibbles.push(nibble as u8);
        }
        let mut bytes: Vec<u8> = nibbles.chunks(2).map(|p| (p[0] << 4) | p[1]).collect();

        // Leading zero bytes carry no value but still count towards the width.
        let width = bytes.len().max(MIN_ADDR_BYTES);
        let significant = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
        bytes.drain(..significant);
        if bytes.len() > 8 {
            return Err(AddressError::TooWide(text.to_string()));
        }

        let mut be = [0u8; 8];
        be[8 - bytes.len()..].copy_from_slice(&bytes);
        Ok(Address {
            value: u64::from_be_bytes(be),
            width: (width.min(8) * 8) as u32,
        })
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    /// Byte offset into the backing store.
    pub fn offset(&self) -> u64 {
        self.value
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// Full binary representation, most significant bit first.
    pub fn binary(&self) -> String {
        (0..self.width)
            .rev()
            .map(|bit| if (self.value >> bit) & 1 == 1 { '1' } else { '0' })
            .collect()
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.value)
    }
}

#[derive(Debug, Clone, Copy)]
struct BitSection {
    shift: u32,
    mask: u64,
}

impl BitSection {
    fn apply(&self, num: u64) -> u64 {
        (num >> self.shift) & self.mask
    }
}

fn required_bits(n: usize) -> u32 {
    n.next_power_of_two().ilog2()
}

fn power_of_two(what: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        Err(ConfigError::Zero { what })
    } else if !value.is_power_of_two() {
        Err(ConfigError::NotPowerOfTwo { what, value })
    } else {
        Ok(())
    }
}

/// Cache geometry and the tag/index/offset split derived from it.
#[derive(Debug, Clone, Copy)]
pub struct AddressCodec {
    pub size: usize,
    pub block_size: usize,
    pub n_ways: usize,
    pub n_lines: usize,
    pub n_sets: usize,
    pub offset_bits: u32,
    pub index_bits: u32,
    set_sec: BitSection,
}

impl AddressCodec {
    pub fn new(size: usize, block_size: usize, n_ways: usize) -> Result<Self, ConfigError> {
        if size == 0 {
            return Err(ConfigError::Zero { what: "cache size" });
        }
        power_of_two("block size", block_size)?;
        power_of_two("associativity", n_ways)?;
        if block_size >= size {
            return Err(ConfigError::BlockTooLarge { block_size, size });
        }
        if size % block_size != 0 {
            return Err(ConfigError::UnevenSize { size, block_size });
        }
        let n_lines = size / block_size;
        if n_ways > n_lines {
            return Err(ConfigError::AssociativityTooLarge {
                ways: n_ways,
                lines: n_lines,
            });
        }
        if n_lines % n_ways != 0 {
            return Err(ConfigError::UnevenSets {
                lines: n_lines,
                ways: n_ways,
            });
        }
        let n_sets = n_lines / n_ways;

        let offset_bits = required_bits(block_size);
        let index_bits = required_bits(n_sets);
        let set_sec = BitSection {
            shift: offset_bits,
            mask: (1u64 << index_bits) - 1,
        };

        Ok(AddressCodec {
            size,
            block_size,
            n_ways,
            n_lines,
            n_sets,
            offset_bits,
            index_bits,
            set_sec,
        })
    }

    pub fn set_index(&self, addr: &Address) -> usize {
        // Sets that aren't a power of two wrap instead of indexing out of range.
        self.set_sec.apply(addr.value()) as usize % self.n_sets
    }

    pub fn tag_length(&self, addr: &Address) -> u32 {
        addr.width().saturating_sub(self.index_bits + self.offset_bits)
    }
}
