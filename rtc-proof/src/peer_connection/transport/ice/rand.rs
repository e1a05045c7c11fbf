use rand::Rng;

const RUNES_ALPHA: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

const LEN_UFRAG: usize = 16;
const LEN_PWD: usize = 32;

pub(crate) fn generate_random_string(n: usize, runes: &[u8]) -> String {
    let mut rng = rand::rng();
    (0..n)
        .map(|_| runes[rng.random_range(0..runes.len())] as char)
        .collect()
}

/// Generates ICE pwd.
pub(crate) fn generate_pwd() -> String {
    generate_random_string(LEN_PWD, RUNES_ALPHA)
}

/// ICE user fragment.
pub(crate) fn generate_ufrag() -> String {
    generate_random_string(LEN_UFRAG, RUNES_ALPHA)
}

/// Random identifier for sessions, streams and tracks.
pub(crate) fn generate_id(n: usize) -> String {
    generate_random_string(n, RUNES_ALPHA)
}
