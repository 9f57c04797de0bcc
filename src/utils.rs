use std::ops::BitXorAssign;

mod rand_compat;

pub(crate) use rand_compat::RngCompat;

pub(crate) fn xor_inplace<T: Copy + BitXorAssign>(a: &mut [T], b: &[T]) {
    a.iter_mut().zip(b).for_each(|(a, b)| {
        *a ^= *b;
    });
}

/// Packs bits into bytes, least significant bit first.
pub(crate) fn boolvec_to_u8vec(bv: &[bool]) -> Vec<u8> {
    let mut v = vec![0u8; bv.len().div_ceil(8)];
    for (i, b) in bv.iter().enumerate() {
        v[i / 8] |= (*b as u8) << (i % 8);
    }
    v
}

/// Transposes up to 128 bit columns of `rows` bits each into `rows` 128-bit rows.
///
/// Bit `i` of column `j` becomes bit `j` of row `i`.
pub(crate) fn transpose_columns(columns: &[Vec<u8>], rows: usize) -> Vec<u128> {
    let mut out = vec![0u128; rows];
    for (j, column) in columns.iter().enumerate().take(128) {
        for (i, row) in out.iter_mut().enumerate() {
            let bit = column.get(i / 8).map_or(0, |byte| (byte >> (i % 8)) & 1);
            *row |= (bit as u128) << j;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_bits() {
        assert_eq!(boolvec_to_u8vec(&[]), Vec::<u8>::new());
        assert_eq!(boolvec_to_u8vec(&[true, false, true]), vec![0b101]);
        let mut bits = vec![false; 9];
        bits[8] = true;
        assert_eq!(boolvec_to_u8vec(&bits), vec![0, 1]);
    }

    #[test]
    fn transpose_moves_bits_to_rows() {
        let columns = vec![vec![0b0000_0010], vec![0b0000_0011], vec![0]];
        let rows = transpose_columns(&columns, 3);
        assert_eq!(rows, vec![0b010, 0b011, 0]);
    }

    #[test]
    fn xor_in_place() {
        let mut a = vec![1u8, 2, 3];
        xor_inplace(&mut a, &[1, 1, 1]);
        assert_eq!(a, vec![0, 3, 2]);
    }
}
