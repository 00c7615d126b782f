//! Party codes: short, unambiguous, user-facing channel names

use rand::Rng;

use crate::net::NetError;

/// Code length in characters
pub const PARTY_CODE_LEN: usize = 6;

/// Alphabet without visually confusable glyphs (no 0/O, 1/I/L)
pub const PARTY_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Generate a fresh party code
pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..PARTY_CODE_LEN)
        .map(|_| PARTY_CODE_ALPHABET[rng.gen_range(0..PARTY_CODE_ALPHABET.len())] as char)
        .collect()
}

/// Normalize user input (trim, uppercase) and validate it as a party code
pub fn normalize(input: &str) -> Result<String, NetError> {
    let code = input.trim().to_ascii_uppercase();
    if is_valid(&code) {
        Ok(code)
    } else {
        Err(NetError::InvalidPartyCode(input.to_string()))
    }
}

/// Check an already-normalized code
pub fn is_valid(code: &str) -> bool {
    code.len() == PARTY_CODE_LEN && code.bytes().all(|b| PARTY_CODE_ALPHABET.contains(&b))
}
