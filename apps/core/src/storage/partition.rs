//! Byte-budget partitioner - Greedy split of an ordered list into chunks.
//!
//! Chunk size is measured as the byte length of the compact JSON array, which
//! is exactly what the synchronized area stores for a chunk value.

/// Budget for one serialized chunk. Stays under the 8,192-byte per-item
/// ceiling of the synchronized area, leaving room for the key.
pub const MAX_CHUNK_BYTES: usize = 7500;

/// Serialized byte size of `items` as a compact JSON array.
pub fn serialized_size<S: AsRef<str>>(items: &[S]) -> usize {
    if items.is_empty() {
        return 2;
    }
    // brackets + separating commas
    let framing = 2 + items.len() - 1;
    framing
        + items
            .iter()
            .map(|item| encoded_str_len(item.as_ref()))
            .sum::<usize>()
}

/// Byte length of one JSON string literal, quotes included.
fn encoded_str_len(s: &str) -> usize {
    let escaped: usize = s
        .chars()
        .map(|c| match c {
            '"' | '\\' | '\n' | '\r' | '\t' | '\u{08}' | '\u{0C}' => 2,
            c if (c as u32) < 0x20 => 6,
            c => c.len_utf8(),
        })
        .sum();
    escaped + 2
}

/// Split `items` into the fewest ordered groups whose serialized size stays
/// within `budget`, in one greedy pass.
///
/// An item that alone exceeds the budget still gets its own group; nothing
/// is dropped. Empty input yields no groups.
pub fn partition<S: AsRef<str>>(items: &[S], budget: usize) -> Vec<Vec<String>> {
    let mut groups = Vec::new();
    let mut current: Vec<String> = Vec::new();
    // Running size of `current` as a JSON array
    let mut current_size = 2;

    for item in items {
        let item = item.as_ref();
        let item_size = encoded_str_len(item);
        let tentative = if current.is_empty() {
            2 + item_size
        } else {
            current_size + 1 + item_size
        };

        if tentative > budget && !current.is_empty() {
            groups.push(std::mem::take(&mut current));
            current_size = 2 + item_size;
        } else {
            current_size = tentative;
        }
        current.push(item.to_string());
    }

    if !current.is_empty() {
        groups.push(current);
    }
    groups
}
