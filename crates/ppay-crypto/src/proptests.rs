#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use std::sync::Arc;

    use crate::keys::{derive_from_signature, IdentityKeyPair, KeyBackup};
    use crate::memo::{decrypt_memo, encrypt_memo, MemoEnvelope, MemoError, MAX_MEMO_LEN};
    use crate::store::MemoryStore;
    use crate::vault::{KeyVault, KeyVaultError, SessionKeys};

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        // Memo round trip for the matching key, DecryptionFailed for any other.
        #[test]
        fn test_memo_round_trip(
            text in "\\PC{1,200}",
            recipient_seed in any::<[u8; 32]>(),
            other_seed in any::<[u8; 32]>(),
        ) {
            prop_assume!(text.len() <= MAX_MEMO_LEN);
            let recipient = IdentityKeyPair::from_secret_bytes(recipient_seed);
            let other = IdentityKeyPair::from_secret_bytes(other_seed);
            prop_assume!(recipient.public_key() != other.public_key());

            let blob = encrypt_memo(&text, recipient.public_key()).unwrap();
            prop_assert_eq!(decrypt_memo(&blob, &recipient).unwrap(), text);
            prop_assert_eq!(decrypt_memo(&blob, &other), Err(MemoError::DecryptionFailed));
        }

        // Flipping any bit of any cipher byte is detected.
        #[test]
        fn test_memo_tamper_detection(
            text in "[a-z ]{1,64}",
            index in any::<prop::sample::Index>(),
            mask in 1u8..=255,
        ) {
            let recipient = IdentityKeyPair::generate();
            let env = MemoEnvelope::seal(&text, recipient.public_key()).unwrap().unwrap();
            let MemoEnvelope::Sealed(mut sealed) = env else {
                panic!("expected sealed envelope");
            };
            let i = index.index(sealed.cipher.len());
            sealed.cipher[i] ^= mask;

            let blob = MemoEnvelope::Sealed(sealed).to_blob();
            prop_assert_eq!(decrypt_memo(&blob, &recipient), Err(MemoError::DecryptionFailed));
        }

        // Derivation is a pure function of the signature bytes.
        #[test]
        fn test_derivation_determinism(
            a in prop::collection::vec(any::<u8>(), 1..128),
            b in prop::collection::vec(any::<u8>(), 1..128),
        ) {
            prop_assert_eq!(derive_from_signature(&a), derive_from_signature(&a));
            if a != b {
                let ka = derive_from_signature(&a);
                let kb = derive_from_signature(&b);
                prop_assert_ne!(ka.public_key(), kb.public_key());
            }
        }

        // Import rejects any secret that is not exactly 32 bytes and leaves storage alone.
        #[test]
        fn test_import_rejects_wrong_secret_length(len in 0usize..96) {
            prop_assume!(len != 32);
            use base64::{engine::general_purpose::STANDARD as B64, Engine as _};

            let vault = KeyVault::new(Arc::new(MemoryStore::new()), Arc::new(SessionKeys::new()));
            let existing = vault.get_or_create_device_key();

            let payload = serde_json::to_string(&KeyBackup {
                public_key: B64.encode(existing.public_key()),
                secret_key: B64.encode(vec![7u8; len]),
            }).unwrap();

            prop_assert!(matches!(
                vault.import_keys(&payload),
                Err(KeyVaultError::InvalidKeyFormat(_))
            ));
            prop_assert_eq!(vault.load_device_key().unwrap(), Some(existing));
        }
    }
}
