//! Non-contiguous v4 netmask decomposition. A `NET4_SRC`/`NET4_DST` rule
//! attribute may carry an arbitrary mask -- not necessarily a run of
//! leading ones -- so before it can be inserted into an LPM trie (which
//! only understands contiguous prefixes) it has to be rewritten as the
//! minimal union of contiguous prefixes matching the same address set.
//! `spec.md` §9 is explicit that this belongs in the rule builder, not in
//! the LPM trie itself.

/// Decompose `(addr & mask)` into `(prefix_bits, prefix_len)` pairs whose
/// union matches exactly the addresses `addr`/`mask` matches.
pub fn decompose_mask_v4(addr: [u8; 4], mask: [u8; 4]) -> Vec<(u32, u8)> {
    let fixed = u32::from_be_bytes(addr) & u32::from_be_bytes(mask);
    let mask_bits = u32::from_be_bytes(mask);
    let mut out = Vec::new();
    decompose_rec(fixed, mask_bits, &mut out);
    out
}

fn decompose_rec(fixed: u32, mask_bits: u32, out: &mut Vec<(u32, u8)>) {
    if let Some(len) = contiguous_prefix_len(mask_bits) {
        out.push((fixed, len));
        return;
    }
    // Not a clean prefix: the mask has a free (unset) bit above some fixed
    // (set) bit. Split the match on the highest such free bit, trying both
    // 0 and 1 there, which turns it into a fixed bit for both recursive
    // halves.
    let free_bit = (0..32u32)
        .rev()
        .find(|&b| mask_bits & (1 << b) == 0 && mask_bits & ((1u32 << b) - 1) != 0)
        .expect("decompose_rec called on an already-contiguous mask");
    let bit = 1u32 << free_bit;
    decompose_rec(fixed, mask_bits | bit, out);
    decompose_rec(fixed | bit, mask_bits | bit, out);
}

/// If `mask_bits` is a run of leading ones followed by all zeros (a valid
/// CIDR mask), return how many leading ones there are.
fn contiguous_prefix_len(mask_bits: u32) -> Option<u8> {
    let len = mask_bits.leading_ones();
    let expected = if len == 0 {
        0
    } else if len == 32 {
        u32::MAX
    } else {
        u32::MAX << (32 - len)
    };
    if mask_bits == expected {
        Some(len as u8)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_mask_is_a_single_prefix() {
        let out = decompose_mask_v4([10, 0, 0, 0], [255, 255, 255, 0]);
        assert_eq!(out, vec![(u32::from_be_bytes([10, 0, 0, 0]), 24)]);
    }

    #[test]
    fn non_contiguous_mask_covers_the_same_address_set() {
        // Mask with a hole: top 8 bits fixed, bit 23 free, bits 22..0 fixed.
        let mask = [255, 0b1111_1110, 255, 255];
        let addr = [10, 0b0000_0000, 0, 0];
        let out = decompose_mask_v4(addr, mask);
        // Every decomposed prefix must itself be contiguous and every
        // address covered by the original pattern must be covered by
        // exactly one decomposed prefix.
        for &(_, len) in &out {
            assert!(len <= 32);
        }
        let expected_bit = 1u32 << 23;
        let base = u32::from_be_bytes(addr) & u32::from_be_bytes(mask);
        let covers = |a: u32| out.iter().any(|&(p, len)| {
            let prefix_mask = if len == 0 { 0 } else { u32::MAX << (32 - len) };
            (a & prefix_mask) == (p & prefix_mask)
        });
        assert!(covers(base));
        assert!(covers(base | expected_bit));
    }
}
