//! Syntactic validation of Algorand addresses.
//!
//! An address is the RFC 4648 base32 encoding, without padding, of a 32-byte
//! public key followed by a 4-byte checksum: 58 characters from `A-Z2-7`.
//! The checksum itself is not verified here; the indexer rejects addresses
//! that do not decode.

use algopay::error::ValidationError;

/// Length of an encoded address.
pub const ADDRESS_LEN: usize = 58;

const fn is_base32(c: u8) -> bool {
    matches!(c, b'A'..=b'Z' | b'2'..=b'7')
}

/// Checks that `address` looks like an Algorand address.
///
/// # Errors
///
/// Returns [`ValidationError::EmptyAddress`] or
/// [`ValidationError::InvalidAddress`] naming the first problem found.
pub fn validate_address(address: &str) -> Result<(), ValidationError> {
    if address.is_empty() {
        return Err(ValidationError::EmptyAddress);
    }
    let invalid = |reason: String| ValidationError::InvalidAddress {
        address: address.to_owned(),
        reason,
    };
    if address.len() != ADDRESS_LEN {
        return Err(invalid(format!(
            "expected {ADDRESS_LEN} characters, got {}",
            address.len()
        )));
    }
    if let Some(pos) = address.bytes().position(|c| !is_base32(c)) {
        return Err(invalid(format!("character at position {pos} is not base32")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "VCMJKWOY5P5P7SKMZFFOCEROPJCZOTIJMNIYNUCKH7LRO45JMJP6UYBIJA";

    #[test]
    fn test_accepts_well_formed_address() {
        assert_eq!(VALID.len(), ADDRESS_LEN);
        assert!(validate_address(VALID).is_ok());
    }

    #[test]
    fn test_rejects_wrong_length() {
        let err = validate_address(&VALID[..57]).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidAddress { .. }));
    }

    #[test]
    fn test_rejects_non_base32_characters() {
        let lower = VALID.to_lowercase();
        assert!(validate_address(&lower).is_err());

        let mut with_one = VALID.to_owned();
        with_one.replace_range(0..1, "1");
        assert!(validate_address(&with_one).is_err());
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(validate_address(""), Err(ValidationError::EmptyAddress));
    }
}
