//! Shannon entropy over raw byte buffers.
//!
//! Entropy in bits per byte is the packing/encryption heuristic used by the
//! scanner: plain code and data sit around 4-6, compressed or encrypted
//! payloads push toward the 8.0 ceiling.

/// Compute the Shannon entropy of a byte slice, in bits per byte.
///
/// Returns a value in `[0.0, 8.0]`: 0.0 for an empty buffer or a buffer of
/// one repeated value, approaching 8.0 for uniformly random bytes. Single
/// pass, fixed 256-bucket histogram, no allocation.
pub fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    let mut counts = [0u64; 256];
    for &b in data {
        counts[b as usize] += 1;
    }

    let len = data.len() as f64;
    let mut entropy = 0.0;
    for &c in &counts {
        if c > 0 {
            let p = c as f64 / len;
            entropy -= p * p.log2();
        }
    }
    entropy
}
