//! Leaf operators. Each returns `Some(new)` with `new != old`, or `None`
//! for the documented no-op cases.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::value::{EnumValue, Value};

/// Printable ASCII minus `\`, `"` and `;`.
pub(crate) fn text_alphabet() -> Vec<char> {
    (b' '..=b'~')
        .map(char::from)
        .filter(|c| !matches!(c, '\\' | '"' | ';'))
        .collect()
}

pub(crate) fn mutate_leaf<R: Rng + ?Sized>(
    value: &Value,
    int_bit_width: u32,
    rng: &mut R,
) -> Option<Value> {
    match value {
        Value::Bool(b) => Some(Value::Bool(!b)),
        Value::Int(i) => Some(Value::Int(flip_int(*i, int_bit_width, rng))),
        Value::Float(f) => Some(Value::Float(flip_float(*f, rng))),
        Value::Text(s) => Some(Value::Text(edit_text(s, rng))),
        Value::Bytes(b) => Some(Value::Bytes(edit_bytes(b, rng))),
        Value::Enum(e) => resample_enum(e, rng).map(Value::Enum),
        _ => None,
    }
}

fn flip_int<R: Rng + ?Sized>(i: i64, width: u32, rng: &mut R) -> i64 {
    let bit = rng.gen_range(0..width.clamp(1, 64));
    i ^ (1_i64 << bit)
}

fn flip_float<R: Rng + ?Sized>(f: f64, rng: &mut R) -> f64 {
    let bit = rng.gen_range(0..64);
    f64::from_bits(f.to_bits() ^ (1_u64 << bit))
}

#[derive(Clone, Copy)]
enum Edit {
    Delete,
    Insert,
    Replace,
}

fn pick_edit<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Edit {
    if len == 0 {
        return Edit::Insert;
    }
    match rng.gen_range(0..3) {
        0 => Edit::Delete,
        1 => Edit::Insert,
        _ => Edit::Replace,
    }
}

fn edit_text<R: Rng + ?Sized>(s: &str, rng: &mut R) -> String {
    let alphabet = text_alphabet();
    let mut chars: Vec<char> = s.chars().collect();
    match pick_edit(chars.len(), rng) {
        Edit::Delete => {
            let at = rng.gen_range(0..chars.len());
            chars.remove(at);
        }
        Edit::Insert => {
            let at = rng.gen_range(0..=chars.len());
            let c = alphabet.choose(rng).copied().unwrap_or('a');
            chars.insert(at, c);
        }
        Edit::Replace => {
            let at = rng.gen_range(0..chars.len());
            let old = chars[at];
            let others: Vec<char> = alphabet.iter().copied().filter(|&c| c != old).collect();
            chars[at] = others.choose(rng).copied().unwrap_or('a');
        }
    }
    chars.into_iter().collect()
}

fn edit_bytes<R: Rng + ?Sized>(b: &[u8], rng: &mut R) -> Vec<u8> {
    let mut bytes = b.to_vec();
    match pick_edit(bytes.len(), rng) {
        Edit::Delete => {
            let at = rng.gen_range(0..bytes.len());
            bytes.remove(at);
        }
        Edit::Insert => {
            let at = rng.gen_range(0..=bytes.len());
            bytes.insert(at, rng.gen());
        }
        Edit::Replace => {
            let at = rng.gen_range(0..bytes.len());
            // Adding 1..=255 mod 256 can never give back the old byte.
            bytes[at] = bytes[at].wrapping_add(rng.gen_range(1..=255));
        }
    }
    bytes
}

fn resample_enum<R: Rng + ?Sized>(e: &EnumValue, rng: &mut R) -> Option<EnumValue> {
    let n = e.members().len();
    if n < 2 {
        return None;
    }
    // Draw from the n-1 other members.
    let mut index = rng.gen_range(0..n - 1);
    if index >= e.index() {
        index += 1;
    }
    e.with_index(index)
}
