//! Fletcher-16 checksum as computed by the instrument firmware and host tools
//!
//! Both running sums start at 0xFF and accumulate with 16-bit wrapping arithmetic. They are
//! folded once at the end, not reduced modulo 255 on every byte, so the result differs from
//! textbook Fletcher-16 for long inputs. Keep it bit-exact; both ends of the link depend on it.

/// Compute the checksum over `data`
pub fn fletcher16(data: &[u8]) -> u16 {
    let mut sum1: u16 = 0x00FF;
    let mut sum2: u16 = 0x00FF;

    for b in data {
        sum1 = sum1.wrapping_add(*b as u16);
        sum2 = sum2.wrapping_add(sum1);
    }

    sum1 = (sum1 & 0x00FF) + (sum1 >> 8);
    sum2 = (sum2 & 0x00FF) + (sum2 >> 8);

    (sum2 << 8) | sum1
}
