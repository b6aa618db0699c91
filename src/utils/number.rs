use num_traits::{PrimInt, WrappingAdd, WrappingSub};

#[inline]
pub fn div_rem<T: std::ops::Div<Output=T> + std::ops::Rem<Output=T> + Copy>(x: T, y: T) -> (T, T) {
    let quot = x / y;
    let rem = x % y;
    (quot, rem)
}

#[inline(always)]
pub const fn extend_sign(value: u8) -> u16 {
    value as i8 as i16 as u16
}

/// Width-generic helpers shared by the 8- and 16-bit instruction paths.
pub trait SpecialOps: PrimInt + WrappingAdd + WrappingSub {
    const BITS: u32;
    const SIGN_BIT: Self;

    fn widen(self) -> u32;
    fn truncate(value: u32) -> Self;
    fn sign_extend(self) -> i32;

    /// `self + y + carry` as `(result, carry out)`.
    fn add_with_carry(self, y: Self, carry: bool) -> (Self, bool);
    /// `self - y - borrow` as `(result, borrow out)`.
    fn sub_with_borrow(self, y: Self, borrow: bool) -> (Self, bool);

    fn rotate_carry_left(self, count: u32, carry: bool) -> (Self, bool);
    fn rotate_carry_right(self, count: u32, carry: bool) -> (Self, bool);

    #[inline(always)]
    fn is_negative(self) -> bool {
        self & Self::SIGN_BIT != Self::zero()
    }

    #[inline(always)]
    fn low_byte(self) -> u8 {
        self.widen() as u8
    }
}

macro_rules! special_uint_impl {
    (
        Self = $SelfT:ty,
        SignedT = $SignedT:ty,
    ) => {
        impl SpecialOps for $SelfT {
            const BITS: u32 = <$SelfT>::BITS;
            const SIGN_BIT: Self = 1 << (<$SelfT>::BITS - 1);

            #[inline(always)]
            fn widen(self) -> u32 {
                self as u32
            }

            #[inline(always)]
            fn truncate(value: u32) -> Self {
                value as $SelfT
            }

            #[inline(always)]
            fn sign_extend(self) -> i32 {
                self as $SignedT as i32
            }

            #[inline]
            fn add_with_carry(self, y: Self, carry: bool) -> (Self, bool) {
                let wide = self as u32 + y as u32 + carry as u32;
                (wide as $SelfT, wide > <$SelfT>::MAX as u32)
            }

            #[inline]
            fn sub_with_borrow(self, y: Self, borrow: bool) -> (Self, bool) {
                let subtrahend = y as u32 + borrow as u32;
                ((self as u32).wrapping_sub(subtrahend) as $SelfT, (self as u32) < subtrahend)
            }

            fn rotate_carry_left(self, count: u32, carry: bool) -> (Self, bool) {
                // The carry flag sits above the operand, making a 9- or 17-bit ring.
                let bits = <$SelfT>::BITS + 1;
                let count = count % bits;
                if count == 0 {
                    return (self, carry);
                }
                let ring = ((carry as u32) << <$SelfT>::BITS) | self as u32;
                let rotated = ((ring << count) | (ring >> (bits - count))) & ((1u32 << bits) - 1);
                (rotated as $SelfT, (rotated >> <$SelfT>::BITS) & 1 != 0)
            }

            fn rotate_carry_right(self, count: u32, carry: bool) -> (Self, bool) {
                let bits = <$SelfT>::BITS + 1;
                let count = count % bits;
                if count == 0 {
                    return (self, carry);
                }
                let ring = ((carry as u32) << <$SelfT>::BITS) | self as u32;
                let rotated = ((ring >> count) | (ring << (bits - count))) & ((1u32 << bits) - 1);
                (rotated as $SelfT, (rotated >> <$SelfT>::BITS) & 1 != 0)
            }
        }
    }
}

special_uint_impl! {
    Self = u8,
    SignedT = i8,
}

special_uint_impl! {
    Self = u16,
    SignedT = i16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carry_and_borrow() {
        assert_eq!(0xFFu8.add_with_carry(1, false), (0x00, true));
        assert_eq!(0xFEu8.add_with_carry(1, true), (0x00, true));
        assert_eq!(0x7FFFu16.add_with_carry(1, false), (0x8000, false));
        assert_eq!(0u8.sub_with_borrow(1, false), (0xFF, true));
        assert_eq!(5u16.sub_with_borrow(5, true), (0xFFFF, true));
        assert_eq!(5u16.sub_with_borrow(4, true), (0, false));
    }

    #[test]
    fn rotate_through_carry() {
        assert_eq!(0x80u8.rotate_carry_left(1, false), (0x00, true));
        assert_eq!(0x00u8.rotate_carry_left(1, true), (0x01, false));
        assert_eq!(0x01u16.rotate_carry_right(1, false), (0x0000, true));
        // A full 9-bit turn is the identity
        assert_eq!(0x5Au8.rotate_carry_left(9, true), (0x5A, true));
    }

    #[test]
    fn sign_helpers() {
        assert_eq!(extend_sign(0x80), 0xFF80);
        assert_eq!(extend_sign(0x7F), 0x007F);
        assert!(0x8000u16.is_negative());
        assert!(!0x7Fu8.is_negative());
        assert_eq!(0xFFu8.sign_extend(), -1);
        assert_eq!(div_rem(17u16, 5), (3, 2));
    }
}
