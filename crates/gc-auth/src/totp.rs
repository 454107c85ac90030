//! Time-based one-time-code generation (RFC 6238)
//!
//! Produces the short-lived numeric logon code from a bot's shared
//! secret and the current wall-clock time: HMAC-SHA1 over the 30-second
//! window counter, dynamic truncation, six decimal digits. Pure
//! functions, no side effects.
//!
//! Clock skew is not handled here: the session retries a rejected logon
//! once with `code_at()` for the previous window.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use common::{Error, Result};

type HmacSha1 = Hmac<Sha1>;

/// Validity window of a single code, in seconds.
pub const WINDOW_SECS: u64 = 30;

/// Decode a base64 shared secret into raw key bytes.
pub fn decode_shared_secret(encoded: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(encoded.trim())
        .map_err(|e| Error::InvalidSecret(format!("base64 decode failed: {e}")))
}

/// Compute the six-digit code for the window containing `unix_secs`.
///
/// Stable for all timestamps within one 30-second window; changes in
/// the adjacent window. Left-zero-padded so the output is always six
/// characters.
pub fn code_at(secret: &[u8], unix_secs: u64) -> String {
    let counter = (unix_secs / WINDOW_SECS).to_be_bytes();

    let mut mac = HmacSha1::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(&counter);
    let digest = mac.finalize().into_bytes();

    // RFC 4226 dynamic truncation
    let offset = (digest[19] & 0x0f) as usize;
    let binary = (u32::from(digest[offset] & 0x7f) << 24)
        | (u32::from(digest[offset + 1]) << 16)
        | (u32::from(digest[offset + 2]) << 8)
        | u32::from(digest[offset + 3]);

    format!("{:06}", binary % 1_000_000)
}

/// Compute the code for the current wall-clock window.
pub fn current_code(secret: &[u8]) -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    code_at(secret, now)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// RFC 6238 Appendix B test secret (ASCII "12345678901234567890").
    fn rfc_secret() -> Vec<u8> {
        b"12345678901234567890".to_vec()
    }

    #[test]
    fn matches_rfc_6238_sha1_vectors() {
        // Appendix B values, truncated from 8 to 6 digits.
        let secret = rfc_secret();
        assert_eq!(code_at(&secret, 59), "287082");
        assert_eq!(code_at(&secret, 1_111_111_109), "081804");
        assert_eq!(code_at(&secret, 1_111_111_111), "050471");
        assert_eq!(code_at(&secret, 1_234_567_890), "005924");
        assert_eq!(code_at(&secret, 2_000_000_000), "279037");
        assert_eq!(code_at(&secret, 20_000_000_000), "353130");
    }

    #[test]
    fn stable_within_one_window() {
        let secret = rfc_secret();
        assert_eq!(code_at(&secret, 30), code_at(&secret, 59));
        assert_eq!(code_at(&secret, 30), code_at(&secret, 45));
    }

    #[test]
    fn differs_across_window_boundary() {
        // 1111111109 and 1111111111 sit one second either side of a
        // window edge and have distinct published codes.
        let secret = rfc_secret();
        assert_ne!(code_at(&secret, 1_111_111_109), code_at(&secret, 1_111_111_111));
    }

    #[test]
    fn always_six_digits() {
        let secret = rfc_secret();
        for t in [0u64, 29, 31, 12345, 98765432] {
            let code = code_at(&secret, t);
            assert_eq!(code.len(), 6, "code for t={t} was {code}");
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn decode_shared_secret_roundtrip() {
        let decoded = decode_shared_secret("MTIzNDU2Nzg5MDEyMzQ1Njc4OTA=").unwrap();
        assert_eq!(decoded, rfc_secret());
    }

    #[test]
    fn decode_shared_secret_tolerates_surrounding_whitespace() {
        let decoded = decode_shared_secret("  c2VjcmV0\n").unwrap();
        assert_eq!(decoded, b"secret");
    }

    #[test]
    fn decode_shared_secret_rejects_garbage() {
        assert!(matches!(
            decode_shared_secret("not*base64!"),
            Err(Error::InvalidSecret(_))
        ));
    }

    #[test]
    fn current_code_is_well_formed() {
        let code = current_code(&rfc_secret());
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }
}
