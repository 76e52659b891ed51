use rand::RngCore;
use veil_core::Seed;
use veil_core::Error;

const SEED_A: &str = "0x1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef";
const SEED_B: &str = "0x2222222222222222222222222222222222222222222222222222222222222222";

#[test]
fn test_deterministic_rng() {
    let seed = Seed::from_hex(SEED_A).unwrap();

    let mut rng1 = seed.create_deterministic_rng();
    let mut rng2 = seed.create_deterministic_rng();

    assert_eq!(rng1.next_u32(), rng2.next_u32());
    assert_eq!(rng1.next_u64(), rng2.next_u64());
}

#[test]
fn test_different_seeds_different_rngs() {
    let mut rng1 = Seed::from_hex(SEED_A).unwrap().create_deterministic_rng();
    let mut rng2 = Seed::from_hex(SEED_B).unwrap().create_deterministic_rng();
    assert_ne!(rng1.next_u64(), rng2.next_u64());
}

#[test]
fn test_hex_prefix_is_optional() {
    let with = Seed::from_hex(SEED_A).unwrap();
    let without = Seed::from_hex(SEED_A.trim_start_matches("0x")).unwrap();
    assert_eq!(with, without);
    assert_eq!(with.to_hex(), SEED_A);
}

#[test]
fn test_rejects_bad_seeds() {
    assert!(matches!(
        Seed::from_hex("0x1234"),
        Err(Error::InvalidSeedLength(4))
    ));
    let not_hex = "z".repeat(64);
    assert!(matches!(Seed::from_hex(&not_hex), Err(Error::InvalidSeedHex)));
}

#[test]
fn test_serde_uses_hex() {
    let seed = Seed::from_hex(SEED_B).unwrap();
    let json = serde_json::to_string(&seed).unwrap();
    assert_eq!(json, format!("\"{SEED_B}\""));
    let back: Seed = serde_json::from_str(&json).unwrap();
    assert_eq!(back, seed);
}

#[test]
fn test_debug_hides_seed() {
    let seed = Seed::from_hex(SEED_A).unwrap();
    let debug = format!("{seed:?}");
    assert!(!debug.contains(SEED_A.trim_start_matches("0x")));
    assert!(debug.contains(&seed.hash_hex()));
}
