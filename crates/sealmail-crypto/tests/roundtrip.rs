//! Property tests for the sealed formats.

#![allow(clippy::unwrap_used)]

use chrono::Utc;
use proptest::prelude::*;
use sealmail_core::CryptoProvider;
use sealmail_core::crypto::DecryptContext;
use sealmail_crypto::SealedCrypto;

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}

fn context() -> DecryptContext {
    DecryptContext {
        date: Utc::now(),
        sender: None,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn message_round_trip(payload in prop::collection::vec(any::<u8>(), 1..4096)) {
        let crypto = SealedCrypto::new();
        let (recipient, recipient_private) = crypto.generate_key();
        let (sender, sender_private) = crypto.generate_key();

        let sealed = crypto
            .encrypt_message(&payload, &[recipient], Some(&sender_private))
            .unwrap();
        let opened = block_on(crypto.decrypt_message(&sealed, &[recipient_private], &context()))
            .unwrap();

        prop_assert_eq!(&opened.data, &payload);
        let signature = opened.signature.unwrap();
        prop_assert!(block_on(crypto.verify_detached(&payload, &signature, &sender, Utc::now()))
            .unwrap());
    }

    #[test]
    fn split_round_trip(
        payload in prop::collection::vec(any::<u8>(), 1..4096),
        filename in "[a-z]{1,12}\\.[a-z]{3}",
    ) {
        let crypto = SealedCrypto::new();
        let (recipient, recipient_private) = crypto.generate_key();

        let split = block_on(crypto.encrypt_split(&payload, &filename, &[recipient], None))
            .unwrap();
        let key = block_on(crypto.decrypt_session_key(&split.key_packets[0], &[recipient_private]))
            .unwrap();
        let data = block_on(crypto.decrypt_data_packet(&split.data_packet, &key)).unwrap();

        prop_assert_eq!(data, payload);
    }

    #[test]
    fn any_flipped_byte_is_rejected(
        payload in prop::collection::vec(any::<u8>(), 1..512),
        position in any::<prop::sample::Index>(),
    ) {
        let crypto = SealedCrypto::new();
        let (recipient, recipient_private) = crypto.generate_key();

        let mut sealed = crypto.encrypt_message(&payload, &[recipient], None).unwrap();
        let i = position.index(sealed.len());
        sealed[i] ^= 0x01;

        let result = block_on(crypto.decrypt_message(&sealed, &[recipient_private], &context()));
        prop_assert!(result.is_err());
    }
}
