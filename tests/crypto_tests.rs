//! Integration tests for the crypto layer: AES-256-GCM sealing, the
//! Argon2id master key, and the HKDF/HMAC key hierarchy.

use derivault::crypto::{
    decrypt, derive_master_key_with_params, encrypt, Argon2Params, MasterKey,
};

/// Helper: fast (but valid) Argon2 parameters for tests.
fn fast_params() -> Argon2Params {
    Argon2Params {
        memory_kib: 8_192, // 8 MB (fast for testing)
        iterations: 1,
        parallelism: 1,
    }
}

// ---------------------------------------------------------------------------
// Encryption round-trip
// ---------------------------------------------------------------------------

#[test]
fn encrypt_decrypt_roundtrip() {
    let key = [0xABu8; 32];
    let plaintext = b"one sealed entry document";

    let ciphertext = encrypt(&key, plaintext).expect("encrypt should succeed");

    // Ciphertext must be longer than plaintext (12-byte nonce + 16-byte tag).
    assert!(ciphertext.len() > plaintext.len());

    let recovered = decrypt(&key, &ciphertext).expect("decrypt should succeed");
    assert_eq!(recovered, plaintext);
}

#[test]
fn encrypt_produces_different_ciphertext_each_time() {
    let key = [0xCDu8; 32];
    let plaintext = b"same plaintext";

    let ct1 = encrypt(&key, plaintext).expect("encrypt 1");
    let ct2 = encrypt(&key, plaintext).expect("encrypt 2");

    // Because each call generates a new random nonce, the output must differ.
    assert_ne!(ct1, ct2, "two encryptions of the same plaintext must differ");
}

#[test]
fn decrypt_with_wrong_key_fails() {
    let key = [0x11u8; 32];
    let wrong_key = [0x22u8; 32];

    let ciphertext = encrypt(&key, b"payload").expect("encrypt");
    assert!(
        decrypt(&wrong_key, &ciphertext).is_err(),
        "decryption with the wrong key must fail"
    );
}

#[test]
fn decrypt_with_truncated_data_fails() {
    // Anything shorter than the 12-byte nonce must fail outright.
    let key = [0xAAu8; 32];
    assert!(decrypt(&key, &[0u8; 5]).is_err());
}

#[test]
fn decrypt_with_corrupted_ciphertext_fails() {
    let key = [0xBBu8; 32];

    let mut ciphertext = encrypt(&key, b"value").expect("encrypt");
    // Flip a byte in the ciphertext portion (after the 12-byte nonce).
    if let Some(byte) = ciphertext.get_mut(15) {
        *byte ^= 0xFF;
    }

    assert!(
        decrypt(&key, &ciphertext).is_err(),
        "corrupted ciphertext must fail auth check"
    );
}

// ---------------------------------------------------------------------------
// Master key derivation (Argon2id)
// ---------------------------------------------------------------------------

#[test]
fn master_key_derivation_is_deterministic() {
    let params = fast_params();

    let key1 = derive_master_key_with_params("alice", "correcthorse", &params).expect("derive 1");
    let key2 = derive_master_key_with_params("alice", "correcthorse", &params).expect("derive 2");

    assert_eq!(
        key1.as_bytes(),
        key2.as_bytes(),
        "same credentials must produce the same key"
    );
}

#[test]
fn master_key_depends_on_the_username() {
    let params = fast_params();

    let alice = derive_master_key_with_params("alice", "same-password", &params).expect("derive");
    let bob = derive_master_key_with_params("bob", "same-password", &params).expect("derive");

    assert_ne!(alice.as_bytes(), bob.as_bytes());
}

#[test]
fn master_key_depends_on_the_password() {
    let params = fast_params();

    let key1 = derive_master_key_with_params("alice", "password-one", &params).expect("derive");
    let key2 = derive_master_key_with_params("alice", "password-two", &params).expect("derive");

    assert_ne!(key1.as_bytes(), key2.as_bytes());
}

#[test]
fn cost_parameters_change_the_key() {
    let fast = fast_params();
    let slower = Argon2Params {
        memory_kib: 8_192,
        iterations: 2,
        parallelism: 1,
    };

    let key1 = derive_master_key_with_params("alice", "correcthorse", &fast).expect("derive");
    let key2 = derive_master_key_with_params("alice", "correcthorse", &slower).expect("derive");

    assert_ne!(key1.as_bytes(), key2.as_bytes());
}

// ---------------------------------------------------------------------------
// Key hierarchy
// ---------------------------------------------------------------------------

#[test]
fn site_seeds_separate_sites_and_counters() {
    let entries = MasterKey::new([0x99u8; 32]).derive_entries_key().unwrap();

    let a = entries.site_seed(b"test-scope", "a.com", 1).unwrap();
    let b = entries.site_seed(b"test-scope", "b.com", 1).unwrap();
    let a2 = entries.site_seed(b"test-scope", "a.com", 2).unwrap();

    assert_ne!(a.as_bytes(), b.as_bytes(), "sites must be isolated");
    assert_ne!(a.as_bytes(), a2.as_bytes(), "counters must rotate the seed");
}

#[test]
fn site_seed_is_reproducible() {
    let entries = MasterKey::new([0x77u8; 32]).derive_entries_key().unwrap();

    let s1 = entries.site_seed(b"test-scope", "example.com", 3).unwrap();
    let s2 = entries.site_seed(b"test-scope", "example.com", 3).unwrap();

    assert_eq!(s1.as_bytes(), s2.as_bytes());
}

// ---------------------------------------------------------------------------
// End-to-end: credentials -> key hierarchy -> sealed entry
// ---------------------------------------------------------------------------

#[test]
fn full_crypto_pipeline() {
    let params = fast_params();

    // Step 1: derive the master key from credentials.
    let master = derive_master_key_with_params("alice", "hunter2", &params).expect("derive master");

    // Step 2: derive the entries key and a per-entry seal key.
    let entries = master.derive_entries_key().expect("entries key");
    let seal = entries
        .site_seed(b"test-seal-scope", "github", 1)
        .expect("seal key");

    // Step 3: seal a document and open it again.
    let document = b"entry document bytes";
    let sealed = encrypt(seal.as_bytes(), document).expect("encrypt");
    let opened = decrypt(seal.as_bytes(), &sealed).expect("decrypt");
    assert_eq!(opened, document);

    // Step 4: a re-derived hierarchy from the same credentials opens
    // the same blob.
    let master2 =
        derive_master_key_with_params("alice", "hunter2", &params).expect("derive again");
    let seal2 = master2
        .derive_entries_key()
        .expect("entries key")
        .site_seed(b"test-seal-scope", "github", 1)
        .expect("seal key");
    let opened2 = decrypt(seal2.as_bytes(), &sealed).expect("decrypt with re-derived key");
    assert_eq!(opened2, document);
}
