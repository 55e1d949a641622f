//! Random backing store images and traces.

use std::io::{self, Write};

const CHUNK: usize = 8 * 1024;

/// Writes `bytes` random bytes to `out`.
pub fn ram(out: &mut impl Write, bytes: u64, rng: &mut fastrand::Rng) -> io::Result<()> {
    let mut chunk = [0u8; CHUNK];
    let mut left = bytes;
    while left > 0 {
        let n = left.min(CHUNK as u64) as usize;
        rng.fill(&mut chunk[..n]);
        out.write_all(&chunk[..n])?;
        left -= n as u64;
    }
    out.flush()
}

/// Writes `count` random trace lines. Every access fits one block inside a
/// store of `ram_size` bytes.
pub fn trace(
    out: &mut impl Write,
    count: usize,
    ram_size: u64,
    block_size: usize,
    rng: &mut fastrand::Rng,
) -> io::Result<()> {
    let top = ram_size.saturating_sub(block_size as u64).max(1);
    for _ in 0..count {
        let addr = rng.u64(..top);
        let size = rng.usize(1..=block_size.max(1));
        if rng.bool() {
            writeln!(out, "L\t{addr:#x},\t{size}")?;
        } else {
            let data: String = (0..size).map(|_| format!("{:02x}", rng.u8(..))).collect();
            writeln!(out, "S\t{addr:#x},\t{size},\t0x{data}")?;
        }
    }
    out.flush()
}
