use rand::Rng;
use xxhash_rust::xxh3::xxh3_128;

/// Fingerprint a visitor from its IP address and user agent.
/// Same inputs always map to the same 32-char hex digest.
pub fn visitor_fingerprint(ip_address: &str, user_agent: &str) -> String {
    let hash = xxh3_128(format!("{ip_address}{user_agent}").as_bytes());
    format!("{hash:032x}")
}

/// Human-readable unique id: UTC timestamp digits (down to nanoseconds)
/// followed by random digits, 32 characters in total.
///
/// Ids generated later sort after earlier ones, which keeps `ORDER BY id`
/// roughly chronological.
pub fn human_uid() -> String {
    let now = chrono::Utc::now();
    let mut uid = format!(
        "{}{:09}",
        now.format("%Y%m%d%H%M%S"),
        now.timestamp_subsec_nanos()
    );
    let mut rng = rand::thread_rng();
    while uid.len() < 32 {
        uid.push(char::from(b'0' + rng.gen_range(0..10u8)));
    }
    uid
}
