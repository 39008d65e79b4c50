//! Field element arithmetic for the Cairn VM
//!
//! p = 2^251 + 17 * 2^192 + 1
//!
//! Properties:
//! - 252-bit prime, the default field of the proof system
//! - Values are stored in canonical form: 0 <= value < p
//! - Division is multiplication by the Fermat inverse

use num_bigint::BigUint;
use num_traits::{Num, One, ToPrimitive, Zero};
use once_cell::sync::Lazy;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign};

/// The field prime: 2^251 + 17 * 2^192 + 1
pub static PRIME: Lazy<BigUint> = Lazy::new(|| {
    BigUint::from_str_radix(
        "800000000000011000000000000000000000000000000000000000000000001",
        16,
    )
    .expect("prime literal is valid hex")
});

/// Canonical hex rendering of [`PRIME`], as stored in program files.
pub const PRIME_HEX: &str = "0x800000000000011000000000000000000000000000000000000000000000001";

/// A field element in canonical form
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Felt(BigUint);

impl Felt {
    /// Create a field element, reducing modulo p
    pub fn new(value: BigUint) -> Self {
        Felt(value % &*PRIME)
    }

    pub fn zero() -> Self {
        Felt(BigUint::zero())
    }

    pub fn one() -> Self {
        Felt(BigUint::one())
    }

    /// Parse a decimal string
    pub fn from_dec_str(s: &str) -> Option<Self> {
        BigUint::from_str_radix(s, 10).ok().map(Self::new)
    }

    /// Parse a hex string, with or without a `0x` prefix
    pub fn from_hex(s: &str) -> Option<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        BigUint::from_str_radix(digits, 16).ok().map(Self::new)
    }

    /// Canonical hex rendering with `0x` prefix
    pub fn to_hex(&self) -> String {
        format!("0x{}", self.0.to_str_radix(16))
    }

    pub fn to_biguint(&self) -> &BigUint {
        &self.0
    }

    /// The canonical value as usize, if it fits
    pub fn to_usize(&self) -> Option<usize> {
        self.0.to_usize()
    }

    pub fn to_u64(&self) -> Option<u64> {
        self.0.to_u64()
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_one(&self) -> bool {
        self.0.is_one()
    }

    /// Compute self^exp mod p
    pub fn pow(&self, exp: &BigUint) -> Self {
        Felt(self.0.modpow(exp, &PRIME))
    }

    /// Multiplicative inverse via Fermat's little theorem: a^(p-2)
    ///
    /// Returns `None` for zero, which has no inverse.
    pub fn inv(&self) -> Option<Self> {
        if self.is_zero() {
            return None;
        }
        let exp = &*PRIME - 2u32;
        Some(Felt(self.0.modpow(&exp, &PRIME)))
    }

    /// Field division: self * rhs^(-1)
    ///
    /// Returns `None` when rhs is zero.
    pub fn field_div(&self, rhs: &Felt) -> Option<Self> {
        rhs.inv().map(|inv| self * &inv)
    }

    /// Interpret the canonical value as a signed quantity: values above p/2
    /// map to `value - p`. Used for offset-style immediates.
    pub fn to_signed_biguint(&self) -> (bool, BigUint) {
        let half = &*PRIME >> 1;
        if self.0 > half {
            (true, &*PRIME - &self.0)
        } else {
            (false, self.0.clone())
        }
    }
}

impl Add for Felt {
    type Output = Felt;

    fn add(self, rhs: Felt) -> Felt {
        Felt::new(self.0 + rhs.0)
    }
}

impl Add for &Felt {
    type Output = Felt;

    fn add(self, rhs: &Felt) -> Felt {
        Felt::new(&self.0 + &rhs.0)
    }
}

impl AddAssign for Felt {
    fn add_assign(&mut self, rhs: Felt) {
        *self = Felt::new(&self.0 + rhs.0);
    }
}

impl Sub for Felt {
    type Output = Felt;

    fn sub(self, rhs: Felt) -> Felt {
        &self - &rhs
    }
}

impl Sub for &Felt {
    type Output = Felt;

    fn sub(self, rhs: &Felt) -> Felt {
        // Add p before subtracting to stay in the naturals
        Felt::new(&self.0 + &*PRIME - &rhs.0)
    }
}

impl SubAssign for Felt {
    fn sub_assign(&mut self, rhs: Felt) {
        *self = &*self - &rhs;
    }
}

impl Mul for Felt {
    type Output = Felt;

    fn mul(self, rhs: Felt) -> Felt {
        Felt::new(self.0 * rhs.0)
    }
}

impl Mul for &Felt {
    type Output = Felt;

    fn mul(self, rhs: &Felt) -> Felt {
        Felt::new(&self.0 * &rhs.0)
    }
}

impl MulAssign for Felt {
    fn mul_assign(&mut self, rhs: Felt) {
        *self = Felt::new(&self.0 * rhs.0);
    }
}

impl Neg for Felt {
    type Output = Felt;

    fn neg(self) -> Felt {
        if self.is_zero() {
            self
        } else {
            Felt(&*PRIME - self.0)
        }
    }
}

impl Neg for &Felt {
    type Output = Felt;

    fn neg(self) -> Felt {
        self.clone().neg()
    }
}

impl From<u64> for Felt {
    fn from(value: u64) -> Self {
        Felt(BigUint::from(value))
    }
}

impl From<u32> for Felt {
    fn from(value: u32) -> Self {
        Felt(BigUint::from(value))
    }
}

impl From<usize> for Felt {
    fn from(value: usize) -> Self {
        Felt(BigUint::from(value))
    }
}

impl From<i64> for Felt {
    fn from(value: i64) -> Self {
        if value >= 0 {
            Felt(BigUint::from(value as u64))
        } else {
            -Felt(BigUint::from(value.unsigned_abs()))
        }
    }
}

impl From<i32> for Felt {
    fn from(value: i32) -> Self {
        Felt::from(value as i64)
    }
}

impl From<BigUint> for Felt {
    fn from(value: BigUint) -> Self {
        Felt::new(value)
    }
}

impl fmt::Display for Felt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Program files store felts as hex strings; serde goes through that form.

impl Serialize for Felt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Felt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if let Some(digits) = s.strip_prefix("0x") {
            Felt::from_hex(digits).ok_or_else(|| D::Error::custom("invalid hex felt"))
        } else {
            Felt::from_dec_str(&s).ok_or_else(|| D::Error::custom("invalid decimal felt"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prime_value() {
        assert_eq!(format!("0x{}", PRIME.to_str_radix(16)), PRIME_HEX);
    }

    #[test]
    fn test_reduction() {
        let p_plus_one = &*PRIME + 1u32;
        assert_eq!(Felt::new(p_plus_one), Felt::one());
        assert_eq!(Felt::new(PRIME.clone()), Felt::zero());
    }

    #[test]
    fn test_addition_wraps() {
        let a = Felt::new(&*PRIME - 1u32);
        let b = Felt::from(5u64);
        assert_eq!(a + b, Felt::from(4u64));
    }

    #[test]
    fn test_subtraction_underflow() {
        let a = Felt::from(5u64);
        let b = Felt::from(10u64);
        assert_eq!(a - b, Felt::new(&*PRIME - 5u32));
    }

    #[test]
    fn test_negative_from_i64() {
        assert_eq!(Felt::from(-1i64), Felt::new(&*PRIME - 1u32));
        assert_eq!(Felt::from(-1i64) + Felt::one(), Felt::zero());
    }

    #[test]
    fn test_inverse() {
        let a = Felt::from(12345u64);
        let inv = a.inv().unwrap();
        assert!((a * inv).is_one());
        assert!(Felt::zero().inv().is_none());
    }

    #[test]
    fn test_field_div() {
        let a = Felt::from(10u64);
        let b = Felt::from(2u64);
        assert_eq!(a.field_div(&b), Some(Felt::from(5u64)));
        assert!(a.field_div(&Felt::zero()).is_none());
    }

    #[test]
    fn test_pow() {
        let two = Felt::from(2u64);
        assert_eq!(two.pow(&BigUint::from(10u32)), Felt::from(1024u64));
    }

    #[test]
    fn test_hex_round_trip() {
        let a = Felt::from_hex("0x1a2b3c").unwrap();
        assert_eq!(Felt::from_hex(&a.to_hex()).unwrap(), a);
        assert_eq!(a, Felt::from(0x1a2b3cu64));
    }

    #[test]
    fn test_to_signed() {
        let (neg, mag) = Felt::from(-2i64).to_signed_biguint();
        assert!(neg);
        assert_eq!(mag, BigUint::from(2u32));

        let (neg, mag) = Felt::from(7u64).to_signed_biguint();
        assert!(!neg);
        assert_eq!(mag, BigUint::from(7u32));
    }

    #[test]
    fn test_serde_hex_string() {
        let a = Felt::from(255u64);
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, "\"0xff\"");
        let back: Felt = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
    }
}
