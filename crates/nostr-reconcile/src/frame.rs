// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Frame encoding
//!
//! `version || entry*`, where each entry is `lower || upper || mode || payload`.

use std::fmt;

use bitcoin_hashes::sha256::Hash as Sha256Hash;
use bitcoin_hashes::Hash;

use crate::error::Error;

/// ID size
pub const ID_SIZE: usize = 32;

/// Protocol version byte
pub const PROTOCOL_VERSION: u8 = 0x01;

const FINGERPRINT_SIZE: usize = 16;

const BOUND_MIN: u8 = 0x00;
const BOUND_ID: u8 = 0x01;
const BOUND_MAX: u8 = 0x02;

const MODE_FINGERPRINT: u8 = 0x00;
const MODE_SPLIT: u8 = 0x01;
const MODE_HAVE_IDS: u8 = 0x02;
const MODE_NEED_IDS: u8 = 0x03;

/// Item ID
pub type Id = [u8; ID_SIZE];

/// Range bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bound {
    /// Lower than any ID
    Min,
    /// ID
    Id(Id),
    /// Greater than any ID
    Max,
}

/// Range fingerprint
///
/// sha256 of the concatenated IDs followed by the item count (u64, little endian), truncated to
/// 16 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; FINGERPRINT_SIZE]);

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint(")?;
        for b in self.0.iter() {
            write!(f, "{b:02x}")?;
        }
        write!(f, ")")
    }
}

impl Fingerprint {
    pub(crate) fn compute(ids: &[Id]) -> Self {
        let mut buf: Vec<u8> = Vec::with_capacity(ids.len() * ID_SIZE + 8);
        for id in ids.iter() {
            buf.extend_from_slice(id);
        }
        buf.extend_from_slice(&(ids.len() as u64).to_le_bytes());

        let hash: [u8; 32] = Sha256Hash::hash(&buf).to_byte_array();
        let mut fp: [u8; FINGERPRINT_SIZE] = [0u8; FINGERPRINT_SIZE];
        fp.copy_from_slice(&hash[..FINGERPRINT_SIZE]);
        Self(fp)
    }
}

/// Sub-range of a split, starting where the previous one ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SubRange {
    pub upper: Bound,
    pub fingerprint: Fingerprint,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Mode {
    Fingerprint(Fingerprint),
    Split(Vec<SubRange>),
    HaveIds(Vec<Id>),
    NeedIds(Vec<Id>),
}

/// Frame entry over `[lower, upper)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Entry {
    pub lower: Bound,
    pub upper: Bound,
    pub mode: Mode,
}

pub(crate) fn encode(entries: &[Entry]) -> Vec<u8> {
    let mut buf: Vec<u8> = vec![PROTOCOL_VERSION];

    for entry in entries.iter() {
        encode_bound(&mut buf, &entry.lower);
        encode_bound(&mut buf, &entry.upper);

        match &entry.mode {
            Mode::Fingerprint(fp) => {
                buf.push(MODE_FINGERPRINT);
                buf.extend_from_slice(&fp.0);
            }
            Mode::Split(subs) => {
                buf.push(MODE_SPLIT);
                encode_varint(&mut buf, subs.len() as u64);
                for sub in subs.iter() {
                    encode_bound(&mut buf, &sub.upper);
                    buf.extend_from_slice(&sub.fingerprint.0);
                }
            }
            Mode::HaveIds(ids) => {
                buf.push(MODE_HAVE_IDS);
                encode_ids(&mut buf, ids);
            }
            Mode::NeedIds(ids) => {
                buf.push(MODE_NEED_IDS);
                encode_ids(&mut buf, ids);
            }
        }
    }

    buf
}

pub(crate) fn decode(bytes: &[u8]) -> Result<Vec<Entry>, Error> {
    let mut reader = Reader { bytes, pos: 0 };

    let version: u8 = reader.byte()?;
    if version != PROTOCOL_VERSION {
        return Err(Error::UnsupportedVersion(version));
    }

    let mut entries: Vec<Entry> = Vec::new();

    while !reader.is_empty() {
        let lower: Bound = reader.bound()?;
        let upper: Bound = reader.bound()?;

        if lower >= upper {
            return Err(Error::InvalidRange);
        }

        let mode: Mode = match reader.byte()? {
            MODE_FINGERPRINT => Mode::Fingerprint(reader.fingerprint()?),
            MODE_SPLIT => {
                let len: usize = reader.len()?;
                let mut subs: Vec<SubRange> = Vec::new();
                let mut prev: Bound = lower;
                for _ in 0..len {
                    let sub_upper: Bound = reader.bound()?;
                    if sub_upper <= prev || sub_upper > upper {
                        return Err(Error::InvalidRange);
                    }
                    prev = sub_upper;
                    subs.push(SubRange {
                        upper: sub_upper,
                        fingerprint: reader.fingerprint()?,
                    });
                }

                if prev != upper {
                    return Err(Error::InvalidRange);
                }

                Mode::Split(subs)
            }
            MODE_HAVE_IDS => Mode::HaveIds(reader.ids()?),
            MODE_NEED_IDS => Mode::NeedIds(reader.ids()?),
            mode => return Err(Error::InvalidMode(mode)),
        };

        entries.push(Entry { lower, upper, mode });
    }

    Ok(entries)
}

fn encode_bound(buf: &mut Vec<u8>, bound: &Bound) {
    match bound {
        Bound::Min => buf.push(BOUND_MIN),
        Bound::Id(id) => {
            buf.push(BOUND_ID);
            buf.extend_from_slice(id);
        }
        Bound::Max => buf.push(BOUND_MAX),
    }
}

fn encode_ids(buf: &mut Vec<u8>, ids: &[Id]) {
    encode_varint(buf, ids.len() as u64);
    for id in ids.iter() {
        buf.extend_from_slice(id);
    }
}

/// LEB128
fn encode_varint(buf: &mut Vec<u8>, mut n: u64) {
    loop {
        let byte: u8 = (n & 0x7f) as u8;
        n >>= 7;
        if n == 0 {
            buf.push(byte);
            break;
        }
        buf.push(byte | 0x80);
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn take(&mut self, n: usize) -> Result<&[u8], Error> {
        let end: usize = self
            .pos
            .checked_add(n)
            .ok_or(Error::UnexpectedEndOfInput)?;
        let slice: &[u8] = self
            .bytes
            .get(self.pos..end)
            .ok_or(Error::UnexpectedEndOfInput)?;
        self.pos = end;
        Ok(slice)
    }

    fn byte(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    fn id(&mut self) -> Result<Id, Error> {
        let mut id: Id = [0u8; ID_SIZE];
        id.copy_from_slice(self.take(ID_SIZE)?);
        Ok(id)
    }

    fn bound(&mut self) -> Result<Bound, Error> {
        match self.byte()? {
            BOUND_MIN => Ok(Bound::Min),
            BOUND_ID => Ok(Bound::Id(self.id()?)),
            BOUND_MAX => Ok(Bound::Max),
            tag => Err(Error::InvalidBound(tag)),
        }
    }

    fn fingerprint(&mut self) -> Result<Fingerprint, Error> {
        let mut fp: [u8; FINGERPRINT_SIZE] = [0u8; FINGERPRINT_SIZE];
        fp.copy_from_slice(self.take(FINGERPRINT_SIZE)?);
        Ok(Fingerprint(fp))
    }

    fn varint(&mut self) -> Result<u64, Error> {
        let mut n: u64 = 0;
        let mut shift: u32 = 0;
        loop {
            let byte: u8 = self.byte()?;
            if shift >= 64 || (shift == 63 && byte > 1) {
                return Err(Error::VarintOverflow);
            }
            n |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(n);
            }
            shift += 7;
        }
    }

    /// Element count, bounded by the remaining input
    fn len(&mut self) -> Result<usize, Error> {
        let len: u64 = self.varint()?;
        let remaining: usize = self.bytes.len() - self.pos;
        if len > remaining as u64 {
            return Err(Error::UnexpectedEndOfInput);
        }
        Ok(len as usize)
    }

    fn ids(&mut self) -> Result<Vec<Id>, Error> {
        let len: usize = self.len()?;
        let mut ids: Vec<Id> = Vec::with_capacity(len);
        for _ in 0..len {
            ids.push(self.id()?);
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint() {
        for n in [0u64, 1, 127, 128, 300, 16_384, u64::MAX] {
            let mut buf = Vec::new();
            encode_varint(&mut buf, n);
            let mut reader = Reader {
                bytes: &buf,
                pos: 0,
            };
            assert_eq!(reader.varint().unwrap(), n);
            assert!(reader.is_empty());
        }

        let mut reader = Reader {
            bytes: &[0xff; 11],
            pos: 0,
        };
        assert_eq!(reader.varint(), Err(Error::VarintOverflow));
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(decode(&[]), Err(Error::UnexpectedEndOfInput));
        assert_eq!(decode(&[0x61]), Err(Error::UnsupportedVersion(0x61)));
        assert_eq!(decode(&[PROTOCOL_VERSION]), Ok(Vec::new()));

        // Reversed range
        assert_eq!(
            decode(&[PROTOCOL_VERSION, BOUND_MAX, BOUND_MIN, MODE_HAVE_IDS, 0]),
            Err(Error::InvalidRange)
        );

        // Unknown mode
        assert_eq!(
            decode(&[PROTOCOL_VERSION, BOUND_MIN, BOUND_MAX, 9]),
            Err(Error::InvalidMode(9))
        );

        // Truncated ID list
        assert_eq!(
            decode(&[PROTOCOL_VERSION, BOUND_MIN, BOUND_MAX, MODE_NEED_IDS, 1, 0xaa]),
            Err(Error::UnexpectedEndOfInput)
        );
    }

    #[test]
    fn test_split_must_cover_range() {
        let fp = Fingerprint::compute(&[]);
        let entry = Entry {
            lower: Bound::Min,
            upper: Bound::Max,
            mode: Mode::Split(vec![
                SubRange {
                    upper: Bound::Id([5; 32]),
                    fingerprint: fp,
                },
                SubRange {
                    upper: Bound::Max,
                    fingerprint: fp,
                },
            ]),
        };
        let bytes = encode(&[entry.clone()]);
        assert_eq!(decode(&bytes), Ok(vec![entry]));

        // Drop the last sub-range: the split no longer reaches the upper bound
        let entry = Entry {
            lower: Bound::Min,
            upper: Bound::Max,
            mode: Mode::Split(vec![SubRange {
                upper: Bound::Id([5; 32]),
                fingerprint: fp,
            }]),
        };
        assert_eq!(decode(&encode(&[entry])), Err(Error::InvalidRange));
    }

    #[test]
    fn test_fingerprint_depends_on_count() {
        let a = Fingerprint::compute(&[]);
        let b = Fingerprint::compute(&[[0u8; 32]]);
        assert_ne!(a, b);
        assert_eq!(b, Fingerprint::compute(&[[0u8; 32]]));
    }
}
