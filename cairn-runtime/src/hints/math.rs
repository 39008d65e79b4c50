//! Integer math used by witness-generating hints

use num_bigint::BigUint;
use num_traits::{One, Zero};

/// Floor square root by Newton iteration
pub fn isqrt(n: &BigUint) -> BigUint {
    if n.is_zero() {
        return BigUint::zero();
    }
    // Initial guess >= sqrt(n)
    let mut x = BigUint::one() << ((n.bits() + 1) / 2);
    loop {
        let y = (&x + n / &x) >> 1;
        if y >= x {
            return x;
        }
        x = y;
    }
}
