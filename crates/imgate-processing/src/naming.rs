use rand::Rng;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 6;

/// `{unix_millis}_{6 base36 chars}{ext}`, e.g. `1764076031141_to5nxg.webp`.
///
/// Not checked against existing objects. Calls within the same millisecond collide with
/// probability 1/36^6 per pair.
pub fn unique_file_name(ext: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    format!("{}_{}{}", millis, random_suffix(), ext)
}

fn random_suffix() -> String {
    let mut rng = rand::rng();
    (0..SUFFIX_LEN)
        .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
        .collect()
}
