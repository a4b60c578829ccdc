use tchat_crypto::{channel_aad, decrypt, encrypt, AeadError, TAG_LEN};

const KEY: [u8; 32] = [0u8; 32];
const NONCE: [u8; 12] = [0u8; 12];

#[test]
fn round_trip_with_channel_aad() {
    // S1: from=1, to=2, seq=5, plaintext "Hello Bob!"
    let aad = channel_aad(1, 2, 5);
    assert_eq!(
        aad,
        [0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 5],
        "AAD must be from(4) ‖ to(4) ‖ seq(8), big-endian"
    );

    let plaintext = b"Hello Bob!";
    let ct = encrypt(plaintext, &KEY, &NONCE, &aad).unwrap();
    assert_eq!(ct.len(), plaintext.len() + TAG_LEN);

    let back = decrypt(&ct, &KEY, &NONCE, &aad).unwrap();
    assert_eq!(back, plaintext);
}

#[test]
fn flipping_first_ciphertext_byte_fails_authentication() {
    let aad = channel_aad(1, 2, 5);
    let mut ct = encrypt(b"Hello Bob!", &KEY, &NONCE, &aad).unwrap();
    ct[0] ^= 0x01;
    assert_eq!(
        decrypt(&ct, &KEY, &NONCE, &aad),
        Err(AeadError::AuthenticationFailed)
    );
}

#[test]
fn any_single_bit_flip_fails_authentication() {
    let aad = channel_aad(1, 2, 5);
    let ct = encrypt(b"Hello Bob!", &KEY, &NONCE, &aad).unwrap();

    // Every bit of the ciphertext (tag included).
    for byte in 0..ct.len() {
        for bit in 0..8 {
            let mut tampered = ct.clone();
            tampered[byte] ^= 1 << bit;
            assert_eq!(
                decrypt(&tampered, &KEY, &NONCE, &aad),
                Err(AeadError::AuthenticationFailed),
                "flip at byte {byte} bit {bit} must fail"
            );
        }
    }

    // Every bit of the nonce.
    for byte in 0..NONCE.len() {
        for bit in 0..8 {
            let mut nonce = NONCE;
            nonce[byte] ^= 1 << bit;
            assert_eq!(
                decrypt(&ct, &KEY, &nonce, &aad),
                Err(AeadError::AuthenticationFailed)
            );
        }
    }

    // Every bit of the AAD.
    for byte in 0..aad.len() {
        for bit in 0..8 {
            let mut bad_aad = aad;
            bad_aad[byte] ^= 1 << bit;
            assert_eq!(
                decrypt(&ct, &KEY, &NONCE, &bad_aad),
                Err(AeadError::AuthenticationFailed)
            );
        }
    }
}

#[test]
fn aad_mismatch_models_header_forgery() {
    // Re-addressing an envelope (changing from/to) or replaying it under
    // a different sequence must break authentication.
    let ct = encrypt(b"hi", &KEY, &NONCE, &channel_aad(5, 7, 1)).unwrap();
    assert!(decrypt(&ct, &KEY, &NONCE, &channel_aad(6, 7, 1)).is_err());
    assert!(decrypt(&ct, &KEY, &NONCE, &channel_aad(5, 8, 1)).is_err());
    assert!(decrypt(&ct, &KEY, &NONCE, &channel_aad(5, 7, 2)).is_err());
    assert!(decrypt(&ct, &KEY, &NONCE, &channel_aad(5, 7, 1)).is_ok());
}

#[test]
fn empty_plaintext_still_authenticates() {
    let aad = channel_aad(1, 2, 1);
    let ct = encrypt(b"", &KEY, &NONCE, &aad).unwrap();
    assert_eq!(ct.len(), TAG_LEN);
    assert_eq!(decrypt(&ct, &KEY, &NONCE, &aad).unwrap(), b"");
}
