//! Address Codec
//!
//! Identifiers are 160-bit strings rendered as 32 base32 characters:
//! a 128-bit payload with a 32-bit checksum mixed into it at fixed bit
//! offsets. The canonical text form is upper case.
//!
//! Two decoders exist on purpose:
//! - [`decode_strict`] accepts only the canonical form. Anything that ends up
//!   persisted or looked up (payment destinations, registry entries) must go
//!   through it, usually via [`Address::parse`].
//! - [`decode_lenient`] folds case before verifying the checksum. It exists for
//!   manual entry and display tooling and must never feed a persisted value.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of an address in characters
pub const ADDRESS_LENGTH: usize = 32;

/// Payload size in bytes
pub const PAYLOAD_LEN: usize = 16;

const CHECKSUM_LEN: usize = 4;
const CHECKSUM_BITS: usize = CHECKSUM_LEN * 8;
const TOTAL_BITS: usize = (PAYLOAD_LEN + CHECKSUM_LEN) * 8;

/// RFC 4648 base32 alphabet (canonical case)
const ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Relative checksum bit offsets: decimal digits of pi, zeros skipped
const PI_DIGITS: &[u8] = b"14159265358979323846264338327950288419716939937510";

/// Bytes of SHA-256(payload) that make up the checksum
const CHECKSUM_BYTE_POSITIONS: [usize; CHECKSUM_LEN] = [5, 13, 21, 29];

/// Raw address payload
pub type Payload = [u8; PAYLOAD_LEN];

/// Codec errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid address format: {0}")]
    InvalidFormat(String),

    #[error("Invalid address checksum")]
    InvalidChecksum,
}

pub type Result<T> = std::result::Result<T, AddressError>;

/// Encode a payload into its canonical address text.
pub fn encode(payload: &Payload) -> String {
    let checksum = checksum(payload);
    let mixed = mix_checksum(payload, &checksum);

    (0..ADDRESS_LENGTH)
        .map(|i| ALPHABET[read_bits(&mixed, i * 5, 5) as usize] as char)
        .collect()
}

/// Decode canonical address text. Any lower-case character is a format error.
pub fn decode_strict(text: &str) -> Result<Payload> {
    let raw = to_raw(text, false)?;
    verify(&raw)
}

/// Decode address text in either case, verifying only the checksum.
///
/// Not for values that will be persisted or used as lookup keys.
pub fn decode_lenient(text: &str) -> Result<Payload> {
    let raw = to_raw(text, true)?;
    verify(&raw)
}

/// Returns true only for canonical, checksum-valid address text.
pub fn is_valid_address(text: &str) -> bool {
    decode_strict(text).is_ok()
}

fn to_raw(text: &str, fold_case: bool) -> Result<[u8; TOTAL_BITS / 8]> {
    if text.len() != ADDRESS_LENGTH {
        return Err(AddressError::InvalidFormat(format!(
            "expected {} characters, got {}",
            ADDRESS_LENGTH,
            text.len()
        )));
    }

    let mut raw = [0u8; TOTAL_BITS / 8];
    for (i, c) in text.bytes().enumerate() {
        let c = if fold_case { c.to_ascii_uppercase() } else { c };
        let value = match c {
            b'A'..=b'Z' => c - b'A',
            b'2'..=b'7' => c - b'2' + 26,
            b'a'..=b'z' => {
                return Err(AddressError::InvalidFormat(format!(
                    "non-canonical lower-case character at position {}",
                    i
                )))
            }
            _ => {
                return Err(AddressError::InvalidFormat(format!(
                    "character {:?} at position {} is outside the base32 alphabet",
                    c as char, i
                )))
            }
        };
        write_bits(&mut raw, i * 5, 5, value);
    }
    Ok(raw)
}

fn verify(raw: &[u8; TOTAL_BITS / 8]) -> Result<Payload> {
    let (payload, embedded) = separate_checksum(raw);
    if checksum(&payload) != embedded {
        return Err(AddressError::InvalidChecksum);
    }
    Ok(payload)
}

fn checksum(payload: &Payload) -> [u8; CHECKSUM_LEN] {
    let digest = Sha256::digest(payload);
    CHECKSUM_BYTE_POSITIONS.map(|pos| digest[pos])
}

/// Absolute bit offsets of the checksum bits inside the 160-bit string
fn checksum_offsets() -> [usize; CHECKSUM_BITS] {
    let mut offsets = [0usize; CHECKSUM_BITS];
    let mut offset = 0;
    let mut index = 0;

    for digit in PI_DIGITS.iter().map(|d| (d - b'0') as usize) {
        if digit == 0 {
            continue;
        }
        offset += digit;
        if offset >= TOTAL_BITS || index == CHECKSUM_BITS {
            break;
        }
        offsets[index] = offset;
        index += 1;
    }

    debug_assert_eq!(index, CHECKSUM_BITS);
    offsets
}

fn mix_checksum(payload: &Payload, checksum: &[u8; CHECKSUM_LEN]) -> [u8; TOTAL_BITS / 8] {
    let offsets = checksum_offsets();
    let mut out = [0u8; TOTAL_BITS / 8];
    let (mut p, mut c) = (0, 0);

    for pos in 0..TOTAL_BITS {
        let bit = if c < CHECKSUM_BITS && offsets[c] == pos {
            c += 1;
            read_bits(checksum, c - 1, 1)
        } else {
            p += 1;
            read_bits(payload, p - 1, 1)
        };
        write_bits(&mut out, pos, 1, bit);
    }
    out
}

fn separate_checksum(raw: &[u8; TOTAL_BITS / 8]) -> (Payload, [u8; CHECKSUM_LEN]) {
    let offsets = checksum_offsets();
    let mut payload = [0u8; PAYLOAD_LEN];
    let mut checksum = [0u8; CHECKSUM_LEN];
    let (mut p, mut c) = (0, 0);

    for pos in 0..TOTAL_BITS {
        let bit = read_bits(raw, pos, 1);
        if c < CHECKSUM_BITS && offsets[c] == pos {
            write_bits(&mut checksum, c, 1, bit);
            c += 1;
        } else {
            write_bits(&mut payload, p, 1, bit);
            p += 1;
        }
    }
    (payload, checksum)
}

/// Read `width` bits starting at bit `start` (MSB first)
fn read_bits(bytes: &[u8], start: usize, width: usize) -> u8 {
    (start..start + width).fold(0u8, |acc, i| {
        (acc << 1) | ((bytes[i / 8] >> (7 - i % 8)) & 1)
    })
}

fn write_bits(bytes: &mut [u8], start: usize, width: usize, value: u8) {
    for k in 0..width {
        let i = start + k;
        let bit = (value >> (width - 1 - k)) & 1;
        bytes[i / 8] |= bit << (7 - i % 8);
    }
}

/// A canonical, checksum-valid address.
///
/// The only ways to obtain one are [`Address::parse`] (strict decoding),
/// [`Address::from_payload`] and [`Address::from_definition`]; deserialization
/// goes through the strict decoder as well.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    text: String,
    payload: Payload,
}

impl Address {
    /// Parse canonical address text
    pub fn parse(text: &str) -> Result<Self> {
        let payload = decode_strict(text)?;
        Ok(Self {
            text: text.to_string(),
            payload,
        })
    }

    pub fn from_payload(payload: &Payload) -> Self {
        Self {
            text: encode(payload),
            payload: *payload,
        }
    }

    /// Derive the address controlled by a definition (first 16 bytes of its BLAKE3 hash)
    pub fn from_definition(definition: &[u8]) -> Self {
        let hash = blake3::hash(definition);
        let mut payload = [0u8; PAYLOAD_LEN];
        payload.copy_from_slice(&hash.as_bytes()[..PAYLOAD_LEN]);
        Self::from_payload(&payload)
    }

    pub fn payload(&self) -> Payload {
        self.payload
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(text: String) -> Result<Self> {
        let payload = decode_strict(&text)?;
        Ok(Self { text, payload })
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.text
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.text
    }
}
