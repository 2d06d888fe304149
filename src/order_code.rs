use chrono::Utc;
use rand::Rng;

// No 0/O, 1/I/L: codes get read aloud over WhatsApp.
const ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";
const SUFFIX_LEN: usize = 6;

/// Human-readable order code, e.g. `ORD-261019-K7QX2M`.
///
/// The random suffix gives ~887M codes per day; the `orders.order_code`
/// unique index catches the rare collision and the caller retries.
pub fn generate() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("ORD-{}-{}", Utc::now().format("%y%m%d"), suffix)
}
