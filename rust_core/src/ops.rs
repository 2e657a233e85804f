//! Arithmetic on [`Var`] handles. Every operation records exactly one new
//! node on the tape of its operand(s).

use crate::tape::{Op, Var};
use statrs::function::erf;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

impl<'t> Var<'t> {
    fn unary(self, value: f64, op: Op) -> Var<'t> {
        self.tape.push(value, op)
    }

    pub fn exp(self) -> Var<'t> {
        self.unary(self.value().exp(), Op::Exp(self.index))
    }

    pub fn ln(self) -> Var<'t> {
        self.unary(self.value().ln(), Op::Ln(self.index))
    }

    pub fn sqrt(self) -> Var<'t> {
        self.unary(self.value().sqrt(), Op::Sqrt(self.index))
    }

    pub fn square(self) -> Var<'t> {
        let v = self.value();
        self.unary(v * v, Op::Square(self.index))
    }

    pub fn powf(self, exponent: f64) -> Var<'t> {
        self.unary(self.value().powf(exponent), Op::Powf(self.index, exponent))
    }

    pub fn pow(self, exponent: Var<'t>) -> Var<'t> {
        let e = self.tape.own(&exponent);
        self.unary(
            self.value().powf(exponent.value()),
            Op::Pow(self.index, e),
        )
    }

    pub fn erf(self) -> Var<'t> {
        self.unary(erf::erf(self.value()), Op::Erf(self.index))
    }

    pub fn erfc(self) -> Var<'t> {
        self.unary(erf::erfc(self.value()), Op::Erfc(self.index))
    }

    fn affine(self, value: f64, scale: f64) -> Var<'t> {
        self.unary(
            value,
            Op::Affine {
                a: self.index,
                scale,
            },
        )
    }
}

macro_rules! binary_var_var {
    ($trait:ident, $method:ident, $op:ident, $f:expr) => {
        impl<'t> $trait<Var<'t>> for Var<'t> {
            type Output = Var<'t>;

            fn $method(self, rhs: Var<'t>) -> Var<'t> {
                let b = self.tape.own(&rhs);
                let value = $f(self.value(), rhs.value());
                self.tape.push(value, Op::$op(self.index, b))
            }
        }
    };
}

binary_var_var!(Add, add, Add, |a: f64, b: f64| a + b);
binary_var_var!(Sub, sub, Sub, |a: f64, b: f64| a - b);
binary_var_var!(Mul, mul, Mul, |a: f64, b: f64| a * b);
binary_var_var!(Div, div, Div, |a: f64, b: f64| a / b);

impl<'t> Add<f64> for Var<'t> {
    type Output = Var<'t>;

    fn add(self, rhs: f64) -> Var<'t> {
        self.affine(self.value() + rhs, 1.0)
    }
}

impl<'t> Add<Var<'t>> for f64 {
    type Output = Var<'t>;

    fn add(self, rhs: Var<'t>) -> Var<'t> {
        rhs.affine(self + rhs.value(), 1.0)
    }
}

impl<'t> Sub<f64> for Var<'t> {
    type Output = Var<'t>;

    fn sub(self, rhs: f64) -> Var<'t> {
        self.affine(self.value() - rhs, 1.0)
    }
}

impl<'t> Sub<Var<'t>> for f64 {
    type Output = Var<'t>;

    fn sub(self, rhs: Var<'t>) -> Var<'t> {
        rhs.affine(self - rhs.value(), -1.0)
    }
}

impl<'t> Mul<f64> for Var<'t> {
    type Output = Var<'t>;

    fn mul(self, rhs: f64) -> Var<'t> {
        self.affine(self.value() * rhs, rhs)
    }
}

impl<'t> Mul<Var<'t>> for f64 {
    type Output = Var<'t>;

    fn mul(self, rhs: Var<'t>) -> Var<'t> {
        rhs.affine(self * rhs.value(), self)
    }
}

impl<'t> Div<f64> for Var<'t> {
    type Output = Var<'t>;

    fn div(self, rhs: f64) -> Var<'t> {
        self.affine(self.value() / rhs, 1.0 / rhs)
    }
}

impl<'t> Div<Var<'t>> for f64 {
    type Output = Var<'t>;

    fn div(self, rhs: Var<'t>) -> Var<'t> {
        rhs.unary(
            self / rhs.value(),
            Op::Recip {
                a: rhs.index,
                numerator: self,
            },
        )
    }
}

impl<'t> Neg for Var<'t> {
    type Output = Var<'t>;

    fn neg(self) -> Var<'t> {
        self.affine(-self.value(), -1.0)
    }
}

macro_rules! assign_op {
    ($trait:ident, $method:ident, $op:tt) => {
        impl<'t> $trait<Var<'t>> for Var<'t> {
            fn $method(&mut self, rhs: Var<'t>) {
                *self = *self $op rhs;
            }
        }

        impl<'t> $trait<f64> for Var<'t> {
            fn $method(&mut self, rhs: f64) {
                *self = *self $op rhs;
            }
        }
    };
}

assign_op!(AddAssign, add_assign, +);
assign_op!(SubAssign, sub_assign, -);
assign_op!(MulAssign, mul_assign, *);
assign_op!(DivAssign, div_assign, /);
