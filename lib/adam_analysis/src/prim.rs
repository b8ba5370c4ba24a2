//! Abstract primitive values: signs and booleans.

use adam_code::instrs::{BinOp, UnOp};
use bitflags::bitflags;
use serde::{Serialize, Serializer};
use std::fmt;

bitflags! {
    pub struct Prim: u8 {
        const NEG   = 0b00001;
        const ZERO  = 0b00010;
        const POS   = 0b00100;
        const TRUE  = 0b01000;
        const FALSE = 0b10000;

        const SIGNS = Self::NEG.bits | Self::ZERO.bits | Self::POS.bits;
        const BOOLS = Self::TRUE.bits | Self::FALSE.bits;
    }
}

impl Default for Prim {
    fn default() -> Self {
        Self::empty()
    }
}

impl Serialize for Prim {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.bits())
    }
}

impl fmt::Display for Prim {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for (flag, name) in [
            (Self::NEG, "-"),
            (Self::ZERO, "0"),
            (Self::POS, "+"),
            (Self::TRUE, "T"),
            (Self::FALSE, "F"),
        ] {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        Ok(())
    }
}

fn sign_of(v: i64) -> Prim {
    match v.signum() {
        -1 => Prim::NEG,
        0 => Prim::ZERO,
        _ => Prim::POS,
    }
}

fn signs(p: Prim) -> impl Iterator<Item = Prim> {
    [Prim::NEG, Prim::ZERO, Prim::POS]
        .into_iter()
        .filter(move |s| p.contains(*s))
}

/// Lifts a sign-level operator to sets of signs.
fn lift(a: Prim, b: Prim, op: fn(Prim, Prim) -> Prim) -> Prim {
    signs(a)
        .flat_map(|x| signs(b).map(move |y| op(x, y)))
        .fold(Prim::empty(), |acc, r| acc | r)
}

fn add_sign(x: Prim, y: Prim) -> Prim {
    if x == Prim::ZERO {
        y
    } else if y == Prim::ZERO || x == y {
        x
    } else {
        Prim::SIGNS
    }
}

fn mul_sign(x: Prim, y: Prim) -> Prim {
    if x == Prim::ZERO || y == Prim::ZERO {
        Prim::ZERO
    } else if x == y {
        Prim::POS
    } else {
        Prim::NEG
    }
}

fn div_sign(x: Prim, y: Prim) -> Prim {
    if y == Prim::ZERO {
        // division by zero throws, no value flows out
        Prim::empty()
    } else if x == Prim::ZERO {
        Prim::ZERO
    } else {
        mul_sign(x, y) | Prim::ZERO
    }
}

fn rem_sign(x: Prim, y: Prim) -> Prim {
    if y == Prim::ZERO {
        Prim::empty()
    } else {
        x | Prim::ZERO
    }
}

impl Prim {
    /// Abstraction of an integer constant. `0` and `1` are also booleans.
    #[must_use]
    pub fn from_const(v: i64) -> Self {
        let sign = sign_of(v);
        match v {
            0 => sign | Self::FALSE,
            1 => sign | Self::TRUE,
            _ => sign,
        }
    }

    #[must_use]
    pub fn any() -> Self {
        Self::all()
    }

    #[must_use]
    pub fn negate(self) -> Self {
        let mut res = self & (Self::ZERO | Self::BOOLS);
        if self.contains(Self::NEG) {
            res |= Self::POS;
        }
        if self.contains(Self::POS) {
            res |= Self::NEG;
        }
        res
    }

    /// Bitwise not on integers, logical not on booleans.
    #[must_use]
    pub fn bit_not(self) -> Self {
        let mut res = Self::empty();
        if self.contains(Self::NEG) {
            res |= Self::ZERO | Self::POS;
        }
        if self.intersects(Self::ZERO | Self::POS) {
            res |= Self::NEG;
        }
        if self.contains(Self::TRUE) {
            res |= Self::FALSE;
        }
        if self.contains(Self::FALSE) {
            res |= Self::TRUE;
        }
        res
    }

    #[must_use]
    pub fn plus(self, other: Self) -> Self {
        lift(self, other, add_sign) | self.bools_or(other)
    }

    #[must_use]
    pub fn minus(self, other: Self) -> Self {
        self.plus(other.negate())
    }

    #[must_use]
    pub fn times(self, other: Self) -> Self {
        lift(self, other, mul_sign) | self.bools_and(other)
    }

    #[must_use]
    pub fn divide(self, other: Self) -> Self {
        lift(self, other, div_sign)
    }

    #[must_use]
    pub fn modulo(self, other: Self) -> Self {
        lift(self, other, rem_sign)
    }

    #[must_use]
    pub fn and(self, other: Self) -> Self {
        let signs = if self & Self::SIGNS == Self::ZERO || other & Self::SIGNS == Self::ZERO {
            Self::ZERO
        } else if self.is_empty() || other.is_empty() {
            Self::empty()
        } else {
            Self::SIGNS
        };
        signs | self.bools_and(other)
    }

    #[must_use]
    pub fn or(self, other: Self) -> Self {
        let signs = if self.is_empty() || other.is_empty() {
            Self::empty()
        } else if self & Self::SIGNS == Self::ZERO {
            other & Self::SIGNS
        } else if other & Self::SIGNS == Self::ZERO {
            self & Self::SIGNS
        } else {
            Self::SIGNS
        };
        signs | self.bools_or(other)
    }

    /// Result of a three-way comparison: the sign of `self - other`.
    #[must_use]
    pub fn compare(self, other: Self) -> Self {
        lift(self, other, |x, y| add_sign(x, y.negate()))
    }

    #[must_use]
    pub fn unop(self, op: UnOp) -> Self {
        match op {
            UnOp::Neg => self.negate(),
            UnOp::Not => self.bit_not(),
            UnOp::Convert => self,
        }
    }

    #[must_use]
    pub fn binop(self, op: BinOp, other: Self) -> Self {
        match op {
            BinOp::Add => self.plus(other),
            BinOp::Sub => self.minus(other),
            BinOp::Mul => self.times(other),
            BinOp::Div => self.divide(other),
            BinOp::Rem => self.modulo(other),
            BinOp::And => self.and(other),
            BinOp::Or => self.or(other),
            BinOp::Xor | BinOp::Shl | BinOp::Shr | BinOp::Ushr => {
                if self.is_empty() || other.is_empty() {
                    Self::empty()
                } else if self.intersects(Self::BOOLS) && other.intersects(Self::BOOLS) {
                    Self::all()
                } else {
                    Self::SIGNS
                }
            }
        }
    }

    fn bools_or(self, other: Self) -> Self {
        let mut res = Self::empty();
        if self.contains(Self::TRUE) || other.contains(Self::TRUE) {
            res |= Self::TRUE;
        }
        if self.contains(Self::FALSE) && other.contains(Self::FALSE) {
            res |= Self::FALSE;
        }
        res
    }

    fn bools_and(self, other: Self) -> Self {
        let mut res = Self::empty();
        if self.contains(Self::TRUE) && other.contains(Self::TRUE) {
            res |= Self::TRUE;
        }
        if self.contains(Self::FALSE) || other.contains(Self::FALSE) {
            res |= Self::FALSE;
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants() {
        assert_eq!(Prim::from_const(-3), Prim::NEG);
        assert_eq!(Prim::from_const(0), Prim::ZERO | Prim::FALSE);
        assert_eq!(Prim::from_const(1), Prim::POS | Prim::TRUE);
        assert_eq!(Prim::from_const(42), Prim::POS);
    }

    #[test]
    fn sign_arithmetic() {
        let pos = Prim::POS;
        let neg = Prim::NEG;
        let zero = Prim::ZERO;
        assert_eq!(pos.plus(pos), Prim::POS);
        assert_eq!(pos.plus(neg), Prim::SIGNS);
        assert_eq!(zero.plus(neg), Prim::NEG);
        assert_eq!(pos.minus(neg), Prim::POS);
        assert_eq!(neg.times(neg), Prim::POS);
        assert_eq!(neg.times(pos | zero), Prim::NEG | Prim::ZERO);
        assert_eq!(pos.divide(zero), Prim::empty());
        assert_eq!(pos.divide(pos), Prim::POS | Prim::ZERO);
        assert_eq!(neg.modulo(pos), Prim::NEG | Prim::ZERO);
        assert_eq!(pos.compare(neg), Prim::POS);
        assert_eq!(zero.and(pos), Prim::ZERO);
    }

    #[test]
    fn booleans() {
        let t = Prim::from_const(1);
        let f = Prim::from_const(0);
        assert!(t.bit_not().contains(Prim::FALSE));
        assert!(!t.bit_not().contains(Prim::TRUE));
        assert!(t.and(f).contains(Prim::FALSE));
        assert!(!t.and(f).contains(Prim::TRUE));
        assert!(t.or(f).contains(Prim::TRUE));
    }

    #[test]
    fn not_operator() {
        let neg = Prim::from_const(-1);
        assert_eq!(neg.unop(UnOp::Not), Prim::ZERO | Prim::POS);
        assert_eq!(Prim::POS.unop(UnOp::Not), Prim::NEG);
        assert_eq!(Prim::from_const(0).unop(UnOp::Not), Prim::NEG | Prim::TRUE);
    }

    #[test]
    fn unknown_is_stable() {
        let any = Prim::any();
        assert_eq!(any.negate(), any);
        assert_eq!(any.plus(any) & Prim::SIGNS, Prim::SIGNS);
    }
}
