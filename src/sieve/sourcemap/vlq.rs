//! Base64 VLQ codec for the `mappings` field
//!
//! Each value is a signed integer split into 5-bit groups, least significant first. The
//! sign lives in the lowest bit of the first group and bit 6 of every digit flags a
//! continuation.

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

const SHIFT: u32 = 5;
const MASK: i64 = 0b1_1111;
const CONTINUATION: i64 = 0b10_0000;
/// Seven digits carry a 32-bit magnitude plus the sign bit
const MAX_SHIFT: u32 = 30;

fn digit_value(byte: u8) -> Option<i64> {
    let value = match byte {
        b'A'..=b'Z' => byte - b'A',
        b'a'..=b'z' => byte - b'a' + 26,
        b'0'..=b'9' => byte - b'0' + 52,
        b'+' => 62,
        b'/' => 63,
        _ => return None,
    };
    Some(value as i64)
}

/// Append the VLQ encoding of `value` to `out`
pub fn encode(value: i64, out: &mut String) {
    let mut rest = if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    };

    loop {
        let mut digit = rest & MASK;
        rest >>= SHIFT;
        if rest > 0 {
            digit |= CONTINUATION;
        }
        out.push(ALPHABET[digit as usize] as char);
        if rest == 0 {
            break;
        }
    }
}

/// Decode every value of one segment (the text between commas)
pub fn decode_segment(segment: &str) -> Result<Vec<i64>, String> {
    let mut values = Vec::new();
    let mut accumulated = 0i64;
    let mut shift = 0u32;

    for byte in segment.bytes() {
        let digit =
            digit_value(byte).ok_or_else(|| format!("invalid VLQ digit `{}`", byte as char))?;
        if shift > MAX_SHIFT {
            return Err(format!("VLQ value overflows in segment `{}`", segment));
        }
        accumulated |= (digit & MASK) << shift;

        if digit & CONTINUATION != 0 {
            shift += SHIFT;
            continue;
        }

        let magnitude = accumulated >> 1;
        values.push(if accumulated & 1 == 1 {
            -magnitude
        } else {
            magnitude
        });
        accumulated = 0;
        shift = 0;
    }

    if shift != 0 {
        return Err(format!("truncated VLQ value in segment `{}`", segment));
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(value: i64) -> String {
        let mut out = String::new();
        encode(value, &mut out);
        out
    }

    #[test]
    fn test_known_encodings() {
        assert_eq!(encoded(0), "A");
        assert_eq!(encoded(1), "C");
        assert_eq!(encoded(-1), "D");
        assert_eq!(encoded(15), "e");
        assert_eq!(encoded(16), "gB");
        assert_eq!(encoded(-17), "jB");
    }

    #[test]
    fn test_decode_segment() {
        assert_eq!(decode_segment("AACA").unwrap(), vec![0, 0, 1, 0]);
        assert_eq!(decode_segment("gBjB").unwrap(), vec![16, -17]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_segment("A*").is_err());
        assert!(decode_segment("g").is_err());
    }

    #[test]
    fn test_decode_rejects_values_beyond_32_bits() {
        assert_eq!(decode_segment(&encoded(u32::MAX as i64)).unwrap(), vec![u32::MAX as i64]);
        assert!(decode_segment("ggggggggggggH").is_err());
    }
}
