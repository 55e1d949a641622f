use std::{
    collections::{HashMap, HashSet},
    fs,
    io::{self, BufRead, BufReader, Read},
    path::Path,
    str::FromStr,
};

use log::warn;
use xz2::read::XzDecoder;

use crate::{addr::Address, error::TraceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Load,
    Store,
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Load => "LOAD",
            Op::Store => "STORE",
        }
    }
}

/// Store payload: the decoded bytes and the hex text it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Data {
    pub bytes: Vec<u8>,
    pub hex: String,
}

impl Data {
    pub fn parse(text: &str) -> Result<Self, String> {
        let hex = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .unwrap_or(text);
        if hex.is_empty() {
            return Err("empty data".to_string());
        }
        let digits = hex
            .chars()
            .map(|c| c.to_digit(16).map(|d| d as u8))
            .collect::<Option<Vec<u8>>>()
            .ok_or_else(|| format!("invalid data {text:?}"))?;
        // An odd digit count gets a leading zero nibble.
        let bytes = digits
            .rchunks(2)
            .rev()
            .map(|pair| pair.iter().fold(0u8, |acc, d| (acc << 4) | d))
            .collect();
        Ok(Data {
            bytes,
            hex: hex.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instr {
    pub op: Op,
    pub addr: Address,
    pub size: usize,
    pub data: Option<Data>,
}

impl Instr {
    pub fn load(addr: Address, size: usize) -> Self {
        Instr {
            op: Op::Load,
            addr,
            size,
            data: None,
        }
    }

    pub fn store(addr: Address, size: usize, data: Data) -> Self {
        Instr {
            op: Op::Store,
            addr,
            size,
            data: Some(data),
        }
    }

    /// Parses `L\t0xADDR,\tSIZE` or `S\t0xADDR,\tSIZE,\t0xDATA`.
    /// `line` is only used for error messages.
    pub fn parse(text: &str, line: usize) -> Result<Self, TraceError> {
        let malformed = |reason: &str| TraceError::Malformed {
            line,
            reason: reason.to_string(),
        };

        let text = text.trim();
        let (kind, rest) = text
            .split_once(char::is_whitespace)
            .unwrap_or((text, ""));
        let op = match kind {
            "L" => Op::Load,
            "S" => Op::Store,
            other => {
                return Err(TraceError::UnknownInstruction {
                    line,
                    found: other.to_string(),
                })
            }
        };

        let mut fields = rest.split(',').map(str::trim);
        let addr = fields
            .next()
            .filter(|f| !f.is_empty())
            .ok_or_else(|| malformed("missing address"))?;
        let addr = Address::parse(addr).map_err(|source| TraceError::Address { line, source })?;
        let size = fields
            .next()
            .ok_or_else(|| malformed("missing size"))?
            .parse::<usize>()
            .map_err(|e| malformed(format!("invalid size: {e}").as_str()))?;

        let data = match op {
            Op::Load => None,
            Op::Store => {
                let data = fields.next().ok_or_else(|| malformed("missing store data"))?;
                Some(Data::parse(data).map_err(|e| malformed(e.as_str()))?)
            }
        };
        if fields.next().is_some_and(|f| !f.is_empty()) {
            return Err(malformed("trailing fields"));
        }

        Ok(Instr {
            op,
            addr,
            size,
            data,
        })
    }
}

impl FromStr for Instr {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Instr::parse(s, 0)
    }
}

/// A fully parsed trace for one core. Lines that fail to parse are
/// logged and dropped, so positions index only real instructions.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    pub instrs: Vec<Instr>,
    pub skipped: usize,
}

impl Trace {
    pub fn read(path: &Path) -> io::Result<Trace> {
        let stream = fs::File::open(path)?;
        let reader: Box<dyn Read> = if path.extension().is_some_and(|ext| ext == "xz") {
            Box::new(XzDecoder::new(stream))
        } else {
            Box::new(stream)
        };
        Trace::from_reader(BufReader::new(reader))
    }

    pub fn from_reader(mut reader: impl BufRead) -> io::Result<Trace> {
        let mut trace = Trace::default();
        let mut buf = Vec::new();
        let mut number = 0;
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            number += 1;
            let line = match std::str::from_utf8(&buf) {
                Ok(line) => line,
                Err(err) => {
                    warn!("skipping trace line {number}: {err}");
                    trace.skipped += 1;
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match Instr::parse(line, number) {
                Ok(instr) => trace.instrs.push(instr),
                Err(err) => {
                    warn!("skipping trace line: {err}");
                    trace.skipped += 1;
                }
            }
        }
        Ok(trace)
    }

    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    pub fn oracle(&self) -> TraceOracle {
        TraceOracle::new(self.instrs.iter().map(|i| i.addr.value()))
    }
}

impl FromStr for Trace {
    type Err = io::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Trace::from_reader(s.as_bytes())
    }
}

/// Read-only view of a core's whole address stream, used by the offline
/// Bélády policy to look ahead of the current position.
#[derive(Debug, Clone, Default)]
pub struct TraceOracle {
    addrs: Vec<u64>,
    uses: HashMap<u64, Vec<usize>>,
}

impl TraceOracle {
    pub fn new(addrs: impl IntoIterator<Item = u64>) -> Self {
        let addrs: Vec<u64> = addrs.into_iter().collect();
        let mut uses: HashMap<u64, Vec<usize>> = HashMap::new();
        for (pos, &addr) in addrs.iter().enumerate() {
            uses.entry(addr).or_default().push(pos);
        }
        TraceOracle { addrs, uses }
    }

    /// First position strictly after `pos` that touches `addr`.
    pub fn next_use(&self, addr: u64, pos: usize) -> Option<usize> {
        let uses = self.uses.get(&addr)?;
        let idx = uses.partition_point(|&p| p <= pos);
        uses.get(idx).copied()
    }

    /// Addresses from `from` onward, deduplicated, in first-use order.
    /// Bélády answers its own queries through `next_use`; this view is for
    /// callers that want the whole remaining working set.
    pub fn future_addresses(&self, from: usize) -> Vec<u64> {
        let mut seen = HashSet::new();
        self.addrs
            .iter()
            .skip(from)
            .copied()
            .filter(|a| seen.insert(*a))
            .collect()
    }
}
