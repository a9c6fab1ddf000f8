// Control-port password generation and hashing
//
// Tor stores the control password as an OpenPGP iterated+salted S2K digest:
// salt and password are repeated until exactly 65536 bytes have been fed to
// SHA-1. The `16:` prefix and the `60` count indicator (0x60 encodes 65536
// iterations) are fixed by Tor and must not change.

use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use sha1::{Digest, Sha1};
use zeroize::Zeroizing;

/// Length of generated control passwords
pub const PASSWORD_LENGTH: usize = 32;

/// Salt length used by Tor's control password hash
pub const SALT_LENGTH: usize = 8;

/// Bytes fed into the digest (count indicator 0x60)
const HASH_INPUT_LEN: usize = 65536;

const HASH_PREFIX: &str = "16:";
const COUNT_INDICATOR: &str = "60";

/// Generate a random alphanumeric control password
pub fn random_password() -> Zeroizing<String> {
    Zeroizing::new(
        OsRng
            .sample_iter(&Alphanumeric)
            .take(PASSWORD_LENGTH)
            .map(char::from)
            .collect(),
    )
}

/// Hash `password` with a fresh random salt, in `HashedControlPassword` form
pub fn hashed_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LENGTH];
    OsRng.fill_bytes(&mut salt);
    hashed_password_with_salt(password, &salt)
}

/// Hash `password` with a caller-supplied salt
pub fn hashed_password_with_salt(password: &str, salt: &[u8; SALT_LENGTH]) -> String {
    let mut seed = Zeroizing::new(Vec::with_capacity(SALT_LENGTH + password.len()));
    seed.extend_from_slice(salt);
    seed.extend_from_slice(password.as_bytes());

    let mut hasher = Sha1::new();
    let mut remaining = HASH_INPUT_LEN;
    while remaining > 0 {
        // Final repetition is truncated so exactly HASH_INPUT_LEN bytes go in.
        let take = remaining.min(seed.len());
        hasher.update(&seed[..take]);
        remaining -= take;
    }
    let digest = hasher.finalize();

    format!(
        "{}{}{}{}",
        HASH_PREFIX,
        hex::encode_upper(salt),
        COUNT_INDICATOR,
        hex::encode_upper(digest)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn is_well_formed(hash: &str) -> bool {
        let Some(rest) = hash.strip_prefix("16:") else {
            return false;
        };
        if rest.len() != 16 + 2 + 40 {
            return false;
        }
        let (salt, rest) = rest.split_at(16);
        let (indicator, digest) = rest.split_at(2);
        let upper_hex = |s: &str| s.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c));
        upper_hex(salt) && indicator == "60" && upper_hex(digest)
    }

    fn reference_digest(password: &str, salt: &[u8; SALT_LENGTH]) -> String {
        let seed: Vec<u8> = salt.iter().chain(password.as_bytes()).copied().collect();
        let expanded: Vec<u8> = seed.iter().cycle().take(65536).copied().collect();
        hex::encode_upper(Sha1::digest(&expanded))
    }

    #[test]
    fn test_random_password_shape() {
        let password = random_password();
        assert_eq!(password.len(), PASSWORD_LENGTH);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_random_passwords_differ() {
        assert_ne!(*random_password(), *random_password());
    }

    #[test]
    fn test_hash_format() {
        let hash = hashed_password("jesdabest");
        assert!(is_well_formed(&hash), "malformed hash: {}", hash);
    }

    #[test]
    fn test_hash_is_salted() {
        assert_ne!(hashed_password("same"), hashed_password("same"));
    }

    #[test]
    fn test_salted_hash_matches_reference_expansion() {
        let salt = [0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF];
        // 8 + 3 bytes does not divide 65536, so the last repetition is cut.
        let hash = hashed_password_with_salt("abc", &salt);

        assert!(hash.starts_with("16:0123456789ABCDEF60"));
        assert_eq!(&hash[21..], reference_digest("abc", &salt));
    }

    #[test]
    fn test_salt_is_deterministic_input() {
        let salt = [7u8; SALT_LENGTH];
        assert_eq!(
            hashed_password_with_salt("pw", &salt),
            hashed_password_with_salt("pw", &salt)
        );
        assert_ne!(
            hashed_password_with_salt("pw", &salt),
            hashed_password_with_salt("pw2", &salt)
        );
    }

    proptest! {
        #[test]
        fn prop_hash_always_well_formed(password in "[ -~]{0,64}") {
            prop_assert!(is_well_formed(&hashed_password(&password)));
        }

        #[test]
        fn prop_matches_reference(password in "[a-zA-Z0-9]{0,40}", salt in any::<[u8; 8]>()) {
            let hash = hashed_password_with_salt(&password, &salt);
            prop_assert_eq!(&hash[21..], reference_digest(&password, &salt));
        }
    }
}
