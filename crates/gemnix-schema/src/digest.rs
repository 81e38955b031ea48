//! SHA-256 digest encodings used in gemsets.
//!
//! Nix accepts two textual forms: the 52-character base-32 form it prints by
//! default, and the 64-character hex form. Gemsets are normalized to base-32.

/// Nix's base-32 alphabet (omits e, o, t, u).
pub const NIX_BASE32_ALPHABET: &[u8; 32] = b"0123456789abcdfghijklmnpqrsvwxyz";

pub const BASE32_LEN: usize = 52;
pub const HEX_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestFormat {
    Base32,
    Hex,
    Other,
}

impl DigestFormat {
    pub fn of(digest: &str) -> Self {
        if digest.len() == BASE32_LEN && digest.bytes().all(|b| NIX_BASE32_ALPHABET.contains(&b)) {
            DigestFormat::Base32
        } else if digest.len() == HEX_LEN
            && digest
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            DigestFormat::Hex
        } else {
            DigestFormat::Other
        }
    }
}

/// Whether `digest` is already in the short form a gemset stores.
pub fn is_base32(digest: &str) -> bool {
    DigestFormat::of(digest) == DigestFormat::Base32
}

/// Encode bytes using Nix's base-32 variant (least significant bits first).
pub fn nix_base32(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::new();
    }
    let len = (bytes.len() * 8 - 1) / 5 + 1;
    let mut out = String::with_capacity(len);
    for n in (0..len).rev() {
        let bit = n * 5;
        let i = bit / 8;
        let j = bit % 8;
        let low = u16::from(bytes[i]) >> j;
        let high = bytes.get(i + 1).map_or(0, |&b| u16::from(b) << (8 - j));
        let c = (low | high) & 0x1f;
        out.push(char::from(NIX_BASE32_ALPHABET[c as usize]));
    }
    out
}

/// Normalize a digest to base-32. Hex input is converted; anything else is `None`.
pub fn to_base32(digest: &str) -> Option<String> {
    match DigestFormat::of(digest) {
        DigestFormat::Base32 => Some(digest.to_owned()),
        DigestFormat::Hex => {
            let bytes: Option<Vec<u8>> = (0..digest.len())
                .step_by(2)
                .map(|i| u8::from_str_radix(&digest[i..i + 2], 16).ok())
                .collect();
            bytes.map(|b| nix_base32(&b))
        }
        DigestFormat::Other => None,
    }
}
