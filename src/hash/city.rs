//! 64-bit City-style mixing hash
//!
//! Non-cryptographic, deterministic across platforms: every multi-byte load
//! is little-endian regardless of the host. The algorithm switches on input
//! length (0-16, 17-32, 33-64 bytes, then a 64-byte block loop).

const K0: u64 = 0xc3a5_c85c_97cb_3127;
const K1: u64 = 0xb492_b66f_be98_f273;
const K2: u64 = 0x9ae1_6a3b_2f90_404f;

/// Multiplier for the 128-to-64 fold
const KMUL: u64 = 0x9ddf_ea08_eb38_2d69;

#[inline]
fn fetch64(s: &[u8], i: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&s[i..i + 8]);
    u64::from_le_bytes(buf)
}

#[inline]
fn fetch32(s: &[u8], i: usize) -> u64 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&s[i..i + 4]);
    u64::from(u32::from_le_bytes(buf))
}

#[inline]
fn shift_mix(val: u64) -> u64 {
    val ^ (val >> 47)
}

#[inline]
fn hash_len16_mul(u: u64, v: u64, mul: u64) -> u64 {
    let mut a = (u ^ v).wrapping_mul(mul);
    a ^= a >> 47;
    let mut b = (v ^ a).wrapping_mul(mul);
    b ^= b >> 47;
    b.wrapping_mul(mul)
}

#[inline]
fn hash_len16(u: u64, v: u64) -> u64 {
    hash_len16_mul(u, v, KMUL)
}

fn hash_len0_to16(s: &[u8]) -> u64 {
    let n = s.len();
    let len = n as u64;
    if n >= 8 {
        let mul = K2.wrapping_add(len.wrapping_mul(2));
        let a = fetch64(s, 0).wrapping_add(K2);
        let b = fetch64(s, n - 8);
        let c = b.rotate_right(37).wrapping_mul(mul).wrapping_add(a);
        let d = a.rotate_right(25).wrapping_add(b).wrapping_mul(mul);
        return hash_len16_mul(c, d, mul);
    }
    if n >= 4 {
        let mul = K2.wrapping_add(len.wrapping_mul(2));
        let a = fetch32(s, 0);
        return hash_len16_mul(len.wrapping_add(a << 3), fetch32(s, n - 4), mul);
    }
    if n > 0 {
        let a = u32::from(s[0]);
        let b = u32::from(s[n >> 1]);
        let c = u32::from(s[n - 1]);
        let y = a.wrapping_add(b << 8);
        let z = (n as u32).wrapping_add(c << 2);
        return shift_mix(u64::from(y).wrapping_mul(K2) ^ u64::from(z).wrapping_mul(K0))
            .wrapping_mul(K2);
    }
    K2
}

fn hash_len17_to32(s: &[u8]) -> u64 {
    let n = s.len();
    let mul = K2.wrapping_add((n as u64).wrapping_mul(2));
    let a = fetch64(s, 0).wrapping_mul(K1);
    let b = fetch64(s, 8);
    let c = fetch64(s, n - 8).wrapping_mul(mul);
    let d = fetch64(s, n - 16).wrapping_mul(K2);
    hash_len16_mul(
        a.wrapping_add(b)
            .rotate_right(43)
            .wrapping_add(c.rotate_right(30))
            .wrapping_add(d),
        a.wrapping_add(b.wrapping_add(K2).rotate_right(18))
            .wrapping_add(c),
        mul,
    )
}

fn hash_len33_to64(s: &[u8]) -> u64 {
    let n = s.len();
    let mul = K2.wrapping_add((n as u64).wrapping_mul(2));
    let a = fetch64(s, 0).wrapping_mul(K2);
    let b = fetch64(s, 8);
    let c = fetch64(s, n - 24);
    let d = fetch64(s, n - 32);
    let e = fetch64(s, 16).wrapping_mul(K2);
    let f = fetch64(s, 24).wrapping_mul(9);
    let g = fetch64(s, n - 8);
    let h = fetch64(s, n - 16).wrapping_mul(mul);

    let u = a
        .wrapping_add(g)
        .rotate_right(43)
        .wrapping_add(b.rotate_right(30).wrapping_add(c).wrapping_mul(9));
    let v = (a.wrapping_add(g) ^ d).wrapping_add(f).wrapping_add(1);
    let w = u
        .wrapping_add(v)
        .wrapping_mul(mul)
        .swap_bytes()
        .wrapping_add(h);
    let x = e.wrapping_add(f).rotate_right(42).wrapping_add(c);
    let y = v
        .wrapping_add(w)
        .wrapping_mul(mul)
        .swap_bytes()
        .wrapping_add(g)
        .wrapping_mul(mul);
    let z = e.wrapping_add(f).wrapping_add(c);
    let a = x
        .wrapping_add(z)
        .wrapping_mul(mul)
        .wrapping_add(y)
        .swap_bytes()
        .wrapping_add(b);
    let b = shift_mix(
        z.wrapping_add(a)
            .wrapping_mul(mul)
            .wrapping_add(d)
            .wrapping_add(h),
    )
    .wrapping_mul(mul);
    b.wrapping_add(x)
}

/// Returns a 16-byte hash of the 32 bytes at `s[i..i + 32]` seeded by `a`, `b`
fn weak_hash_len32_with_seeds(s: &[u8], i: usize, mut a: u64, mut b: u64) -> (u64, u64) {
    let w = fetch64(s, i);
    let x = fetch64(s, i + 8);
    let y = fetch64(s, i + 16);
    let z = fetch64(s, i + 24);

    a = a.wrapping_add(w);
    b = b.wrapping_add(a).wrapping_add(z).rotate_right(21);
    let c = a;
    a = a.wrapping_add(x).wrapping_add(y);
    b = b.wrapping_add(a.rotate_right(44));
    (a.wrapping_add(z), b.wrapping_add(c))
}

/// Hash a byte slice to 64 bits
///
/// ```rust
/// use kuba_counter::hash::hash64;
///
/// assert_eq!(hash64(b""), 0x9ae1_6a3b_2f90_404f);
/// assert_eq!(hash64(b"abc"), hash64(b"abc"));
/// assert_ne!(hash64(b"abc"), hash64(b"abd"));
/// ```
pub fn hash64(s: &[u8]) -> u64 {
    let n = s.len();
    if n <= 16 {
        return hash_len0_to16(s);
    }
    if n <= 32 {
        return hash_len17_to32(s);
    }
    if n <= 64 {
        return hash_len33_to64(s);
    }

    // Hash the tail first, then keep 56 bytes of state (v, w, x, y, z)
    // while walking 64-byte blocks from the front.
    let len = n as u64;
    let mut x = fetch64(s, n - 40);
    let mut y = fetch64(s, n - 16).wrapping_add(fetch64(s, n - 56));
    let mut z = hash_len16(fetch64(s, n - 48).wrapping_add(len), fetch64(s, n - 24));
    let (mut v1, mut v2) = weak_hash_len32_with_seeds(s, n - 64, len, z);
    let (mut w1, mut w2) = weak_hash_len32_with_seeds(s, n - 32, y.wrapping_add(K1), x);
    x = x.wrapping_mul(K1).wrapping_add(fetch64(s, 0));

    let blocks = (n - 1) / 64;
    for block in 0..blocks {
        let off = block * 64;
        x = x
            .wrapping_add(y)
            .wrapping_add(v1)
            .wrapping_add(fetch64(s, off + 8))
            .rotate_right(37)
            .wrapping_mul(K1);
        y = y
            .wrapping_add(v2)
            .wrapping_add(fetch64(s, off + 48))
            .rotate_right(42)
            .wrapping_mul(K1);
        x ^= w2;
        y = y.wrapping_add(v1).wrapping_add(fetch64(s, off + 40));
        z = z.wrapping_add(w1).rotate_right(33).wrapping_mul(K1);
        (v1, v2) = weak_hash_len32_with_seeds(s, off, v2.wrapping_mul(K1), x.wrapping_add(w1));
        (w1, w2) = weak_hash_len32_with_seeds(
            s,
            off + 32,
            z.wrapping_add(w2),
            y.wrapping_add(fetch64(s, off + 16)),
        );
        std::mem::swap(&mut z, &mut x);
    }

    hash_len16(
        hash_len16(v1, w1)
            .wrapping_add(shift_mix(y).wrapping_mul(K1))
            .wrapping_add(z),
        hash_len16(v2, w2).wrapping_add(x),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic filler so every length branch sees non-trivial input
    fn pattern(n: usize) -> Vec<u8> {
        (0..n).map(|i| (i * 31 + 7) as u8).collect()
    }

    #[test]
    fn test_short_inputs() {
        assert_eq!(hash64(b""), K2);
        assert_eq!(hash64(b"a"), 0xb345_4265_b6df_75e3);
        assert_eq!(hash64(b"abc"), 0x24a5_b3a0_74e7_f369);
        assert_eq!(hash64(b"abcd"), 0x1a55_02de_4a1f_8101);
        assert_eq!(hash64(b"hello world"), 0x588f_b747_8bd6_b01b);
        assert_eq!(hash64(b"0123456789abcdef"), 0x54b9_61e5_dc83_4067);
    }

    #[test]
    fn test_medium_inputs() {
        assert_eq!(hash64(b"0123456789abcdefg"), 0xa6dd_ff87_a449_d24a);
        assert_eq!(hash64(&pattern(32)), 0x5b02_13e6_2a3c_a399);
        assert_eq!(hash64(&pattern(33)), 0x37bd_9558_4886_5317);
        assert_eq!(hash64(&pattern(64)), 0x98f3_1c34_85ef_cafd);
    }

    #[test]
    fn test_long_inputs() {
        assert_eq!(hash64(&pattern(65)), 0xdfac_987f_bccb_c482);
        assert_eq!(hash64(&pattern(128)), 0xd44a_ca4d_d8ff_4e3b);
        assert_eq!(hash64(&pattern(200)), 0xe763_4271_d2c2_f86f);
    }

    #[test]
    fn test_single_bit_flip_changes_hash() {
        for len in [1usize, 5, 12, 20, 40, 100] {
            let base = pattern(len);
            let mut flipped = base.clone();
            flipped[len / 2] ^= 1;
            assert_ne!(hash64(&base), hash64(&flipped), "len {}", len);
        }
    }
}
