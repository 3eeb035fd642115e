use num_traits::{Float, FromPrimitive, Num, NumCast, One, ToPrimitive, Zero};
use std::f64::consts::{LN_10, LN_2};
use std::num::FpCategory;
use std::ops::{
    Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Rem, RemAssign, Sub, SubAssign,
};

/// Dual number for forward-mode differentiation.
///
/// Seeding `eps = 1` on one state component and evaluating a system yields
/// that column of the Jacobian in the `eps` parts of the output.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Dual {
    pub val: f64,
    pub eps: f64,
}

impl Dual {
    pub fn new(val: f64, eps: f64) -> Self {
        Self { val, eps }
    }

    /// A value with zero tangent.
    pub fn constant(val: f64) -> Self {
        Self::new(val, 0.0)
    }

    /// `f(self)` given `f(val)` and `f'(val)`.
    fn chain(self, value: f64, slope: f64) -> Self {
        Self::new(value, slope * self.eps)
    }
}

impl Zero for Dual {
    fn zero() -> Self {
        Self::constant(0.0)
    }
    fn is_zero(&self) -> bool {
        self.val == 0.0 && self.eps == 0.0
    }
}

impl One for Dual {
    fn one() -> Self {
        Self::constant(1.0)
    }
}

impl Add for Dual {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.val + rhs.val, self.eps + rhs.eps)
    }
}

impl Sub for Dual {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        self + -rhs
    }
}

impl Mul for Dual {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(self.val * rhs.val, self.eps * rhs.val + rhs.eps * self.val)
    }
}

impl Div for Dual {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        let quotient = self.val / rhs.val;
        Self::new(quotient, (self.eps - quotient * rhs.eps) / rhs.val)
    }
}

impl Neg for Dual {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.val, -self.eps)
    }
}

impl Rem for Dual {
    type Output = Self;
    /// `x - trunc(x / y) * y`, differentiated with the quotient held fixed.
    fn rem(self, rhs: Self) -> Self {
        let whole = (self.val / rhs.val).trunc();
        Self::new(self.val % rhs.val, self.eps - whole * rhs.eps)
    }
}

macro_rules! assign_via_binary {
    ($($assign:ident :: $method:ident => $op:tt),* $(,)?) => {
        $(impl $assign for Dual {
            fn $method(&mut self, rhs: Self) {
                *self = *self $op rhs;
            }
        })*
    };
}

assign_via_binary!(
    AddAssign::add_assign => +,
    SubAssign::sub_assign => -,
    MulAssign::mul_assign => *,
    DivAssign::div_assign => /,
    RemAssign::rem_assign => %,
);

impl Num for Dual {
    type FromStrRadixErr = <f64 as Num>::FromStrRadixErr;
    fn from_str_radix(text: &str, radix: u32) -> Result<Self, Self::FromStrRadixErr> {
        f64::from_str_radix(text, radix).map(Self::constant)
    }
}

impl ToPrimitive for Dual {
    fn to_i64(&self) -> Option<i64> {
        self.val.to_i64()
    }
    fn to_u64(&self) -> Option<u64> {
        self.val.to_u64()
    }
    fn to_f64(&self) -> Option<f64> {
        Some(self.val)
    }
}

impl FromPrimitive for Dual {
    fn from_i64(n: i64) -> Option<Self> {
        n.to_f64().map(Self::constant)
    }
    fn from_u64(n: u64) -> Option<Self> {
        n.to_f64().map(Self::constant)
    }
    fn from_f64(n: f64) -> Option<Self> {
        Some(Self::constant(n))
    }
}

impl NumCast for Dual {
    fn from<T: ToPrimitive>(n: T) -> Option<Self> {
        n.to_f64().map(Self::constant)
    }
}

// Constants and step functions carry no tangent.
macro_rules! constants {
    ($($name:ident = $value:expr),* $(,)?) => {
        $(fn $name() -> Self { Dual::constant($value) })*
    };
}

macro_rules! flat_in_value {
    ($($name:ident),* $(,)?) => {
        $(fn $name(self) -> Self { Dual::constant(self.val.$name()) })*
    };
}

macro_rules! value_predicates {
    ($($name:ident),* $(,)?) => {
        $(fn $name(self) -> bool { self.val.$name() })*
    };
}

impl Float for Dual {
    constants!(
        nan = f64::NAN,
        infinity = f64::INFINITY,
        neg_infinity = f64::NEG_INFINITY,
        neg_zero = -0.0,
        min_value = f64::MIN,
        min_positive_value = f64::MIN_POSITIVE,
        max_value = f64::MAX,
    );
    flat_in_value!(floor, ceil, round, trunc, signum);
    value_predicates!(is_nan, is_infinite, is_finite, is_normal, is_sign_positive, is_sign_negative);

    fn classify(self) -> FpCategory {
        self.val.classify()
    }
    fn integer_decode(self) -> (u64, i16, i8) {
        self.val.integer_decode()
    }

    fn fract(self) -> Self {
        self.chain(self.val.fract(), 1.0)
    }
    fn abs(self) -> Self {
        let slope = if self.val < 0.0 { -1.0 } else { 1.0 };
        self.chain(self.val.abs(), slope)
    }
    fn mul_add(self, a: Self, b: Self) -> Self {
        self * a + b
    }
    fn recip(self) -> Self {
        Self::one() / self
    }
    fn max(self, other: Self) -> Self {
        if other.val < self.val { self } else { other }
    }
    fn min(self, other: Self) -> Self {
        if self.val < other.val { self } else { other }
    }
    #[allow(deprecated)]
    fn abs_sub(self, other: Self) -> Self {
        if other.val < self.val { self - other } else { Self::zero() }
    }

    fn powi(self, n: i32) -> Self {
        self.chain(self.val.powi(n), <f64 as From<i32>>::from(n) * self.val.powi(n - 1))
    }
    /// A constant exponent uses the power rule, which stays finite at a zero
    /// base; otherwise `x^y = exp(y ln x)`.
    fn powf(self, n: Self) -> Self {
        let value = self.val.powf(n.val);
        if n.eps == 0.0 {
            return self.chain(value, n.val * self.val.powf(n.val - 1.0));
        }
        Self::new(value, value * (n.eps * self.val.ln() + n.val * self.eps / self.val))
    }
    fn sqrt(self) -> Self {
        let root = self.val.sqrt();
        self.chain(root, 0.5 / root)
    }
    fn cbrt(self) -> Self {
        let root = self.val.cbrt();
        self.chain(root, 1.0 / (3.0 * root * root))
    }
    fn hypot(self, other: Self) -> Self {
        (self * self + other * other).sqrt()
    }

    fn exp(self) -> Self {
        let e = self.val.exp();
        self.chain(e, e)
    }
    fn exp2(self) -> Self {
        let e = self.val.exp2();
        self.chain(e, e * LN_2)
    }
    fn exp_m1(self) -> Self {
        self.chain(self.val.exp_m1(), self.val.exp())
    }
    fn ln(self) -> Self {
        self.chain(self.val.ln(), self.val.recip())
    }
    fn ln_1p(self) -> Self {
        self.chain(self.val.ln_1p(), (1.0 + self.val).recip())
    }
    fn log(self, base: Self) -> Self {
        self.ln() / base.ln()
    }
    fn log2(self) -> Self {
        self.chain(self.val.log2(), (self.val * LN_2).recip())
    }
    fn log10(self) -> Self {
        self.chain(self.val.log10(), (self.val * LN_10).recip())
    }

    fn sin(self) -> Self {
        self.chain(self.val.sin(), self.val.cos())
    }
    fn cos(self) -> Self {
        self.chain(self.val.cos(), -self.val.sin())
    }
    fn sin_cos(self) -> (Self, Self) {
        (self.sin(), self.cos())
    }
    fn tan(self) -> Self {
        let t = self.val.tan();
        self.chain(t, 1.0 + t * t)
    }
    fn asin(self) -> Self {
        self.chain(self.val.asin(), (1.0 - self.val * self.val).sqrt().recip())
    }
    fn acos(self) -> Self {
        self.chain(self.val.acos(), -(1.0 - self.val * self.val).sqrt().recip())
    }
    fn atan(self) -> Self {
        self.chain(self.val.atan(), (1.0 + self.val * self.val).recip())
    }
    /// `atan2(y, x)` with `self` as `y`.
    fn atan2(self, other: Self) -> Self {
        let r2 = self.val.hypot(other.val).powi(2);
        Self::new(
            self.val.atan2(other.val),
            (self.eps * other.val - other.eps * self.val) / r2,
        )
    }

    fn sinh(self) -> Self {
        self.chain(self.val.sinh(), self.val.cosh())
    }
    fn cosh(self) -> Self {
        self.chain(self.val.cosh(), self.val.sinh())
    }
    fn tanh(self) -> Self {
        let t = self.val.tanh();
        self.chain(t, 1.0 - t * t)
    }
    fn asinh(self) -> Self {
        self.chain(self.val.asinh(), (self.val * self.val + 1.0).sqrt().recip())
    }
    fn acosh(self) -> Self {
        self.chain(self.val.acosh(), (self.val * self.val - 1.0).sqrt().recip())
    }
    fn atanh(self) -> Self {
        self.chain(self.val.atanh(), (1.0 - self.val * self.val).recip())
    }
}

#[cfg(test)]
mod tests {
    use super::Dual;
    use num_traits::Float;

    fn derivative_of(f: impl Fn(Dual) -> Dual, x: f64) -> f64 {
        f(Dual::new(x, 1.0)).eps
    }

    fn central_difference(f: impl Fn(f64) -> f64, x: f64) -> f64 {
        let h = 1e-6;
        (f(x + h) - f(x - h)) / (2.0 * h)
    }

    #[test]
    fn powf_matches_power_rule() {
        // d/dk k^0.3 = 0.3 k^-0.7
        let d = derivative_of(|k| k.powf(Dual::new(0.3, 0.0)), 2.0);
        assert!((d - 0.3 * 2.0f64.powf(-0.7)).abs() < 1e-12);
    }

    #[test]
    fn elementary_functions_match_finite_differences() {
        let x = 0.4;
        let cases: Vec<(fn(Dual) -> Dual, fn(f64) -> f64)> = vec![
            (Dual::tanh, f64::tanh),
            (Dual::sqrt, f64::sqrt),
            (Dual::ln, f64::ln),
            (Dual::log10, f64::log10),
            (Dual::atan, f64::atan),
            (Dual::cbrt, f64::cbrt),
            (Dual::sinh, f64::sinh),
            (Dual::exp2, f64::exp2),
            (Dual::sin, f64::sin),
            (Dual::cos, f64::cos),
            (Dual::asin, f64::asin),
            (Dual::atanh, f64::atanh),
            (Dual::ln_1p, f64::ln_1p),
        ];
        for (dual_fn, real_fn) in cases {
            let ad = derivative_of(dual_fn, x);
            let fd = central_difference(real_fn, x);
            assert!((ad - fd).abs() < 1e-6, "ad {ad} vs fd {fd}");
        }
    }

    #[test]
    fn quotient_rule() {
        // d/dx x / (1 + x) = 1 / (1 + x)^2
        let d = derivative_of(|x| x / (Dual::new(1.0, 0.0) + x), 1.0);
        assert!((d - 0.25).abs() < 1e-12);
    }

    #[test]
    fn constant_exponent_at_zero_base_has_finite_slope() {
        let d = Dual::new(0.0, 1.0).powf(Dual::constant(2.0));
        assert_eq!(d, Dual::new(0.0, 0.0));
    }

    #[test]
    fn variable_exponent_uses_log_rule() {
        // d/dy 2^y = 2^y ln 2
        let d = Dual::constant(2.0).powf(Dual::new(3.0, 1.0));
        assert!((d.eps - 8.0 * 2.0f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn remainder_tracks_both_operands() {
        // 7.5 % 2 = 1.5 = 7.5 - 3 * 2
        let wrt_x = Dual::new(7.5, 1.0) % Dual::constant(2.0);
        assert_eq!(wrt_x, Dual::new(1.5, 1.0));
        let wrt_y = Dual::constant(7.5) % Dual::new(2.0, 1.0);
        assert_eq!(wrt_y.eps, -3.0);
    }
}
