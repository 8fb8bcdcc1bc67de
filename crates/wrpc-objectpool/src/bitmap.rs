//! Lowest-set-bit lookup, used by the pool to turn a free-slot bitmap word into a
//! slot index without a linear bit-by-bit scan.

use std::sync::OnceLock;

fn lowest_bit_of_u8(mut val: u8) -> u8 {
    let mut pos = 0u8;
    if val & 0x0f == 0 {
        pos += 4;
        val >>= 4;
    }
    if val & 0x03 == 0 {
        pos += 2;
        val >>= 2;
    }
    if val & 0x01 == 0 {
        pos += 1;
    }
    pos
}

/// Position of the lowest set bit in `val`, or `0` if `val` is zero (callers must
/// not rely on the zero case; a zero word means "no free slot").
pub(crate) fn lowest_bit(val: u8) -> u8 {
    static TABLE: OnceLock<[u8; 256]> = OnceLock::new();
    let table = TABLE.get_or_init(|| {
        let mut t = [0u8; 256];
        for (i, slot) in t.iter_mut().enumerate().skip(1) {
            *slot = lowest_bit_of_u8(i as u8);
        }
        t
    });
    table[val as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_lowest_bit() {
        assert_eq!(lowest_bit(0b0000_0001), 0);
        assert_eq!(lowest_bit(0b0000_0010), 1);
        assert_eq!(lowest_bit(0b0010_1000), 3);
        assert_eq!(lowest_bit(0b1000_0000), 7);
    }
}
