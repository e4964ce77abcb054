//! The numeric tower: arbitrary precision integers, exact rationals and floats.
//!
//! Arithmetic coerces its operands to a common kind before computing:
//!
//! - any float operand makes every operand a float (IEEE semantics, so float
//!   division by zero gives an infinity or NaN rather than an error)
//! - otherwise any rational makes every integer `n/1` and the result is exact
//! - otherwise everything stays in big integers
//!
//! Rationals are kept in lowest terms with a positive denominator, and a
//! rational result whose denominator reduces to 1 always comes back as an
//! `Integer`. No `Value::Rational` with denominator 1 can be built.

use std::cmp::Ordering;
use std::fmt;

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{One, Signed, ToPrimitive, Zero};

use crate::Error;
use crate::ast::Value;

/// An exact fraction in lowest terms with a positive denominator
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rational {
    numerator: BigInt,
    denominator: BigInt,
}

impl Rational {
    /// Build `numerator / denominator` as a value: a `Rational` in lowest
    /// terms, or an `Integer` when the denominator divides the numerator.
    pub fn new_value(numerator: BigInt, denominator: BigInt) -> Result<Value, Error> {
        if denominator.is_zero() {
            return Err(Error::division_by_zero());
        }
        Ok(Self::reduced(numerator, denominator).into_value())
    }

    pub fn numerator(&self) -> &BigInt {
        &self.numerator
    }

    pub fn denominator(&self) -> &BigInt {
        &self.denominator
    }

    /// Reduce to lowest terms. The caller guarantees a non-zero denominator.
    fn reduced(numerator: BigInt, denominator: BigInt) -> Self {
        let divisor = numerator.gcd(&denominator);
        let (mut numerator, mut denominator) = (numerator / &divisor, denominator / &divisor);
        if denominator.is_negative() {
            numerator = -numerator;
            denominator = -denominator;
        }
        Rational {
            numerator,
            denominator,
        }
    }

    /// `n/1`, only ever used as an intermediate during exact arithmetic
    fn from_integer(integer: BigInt) -> Self {
        Rational {
            numerator: integer,
            denominator: BigInt::one(),
        }
    }

    fn into_value(self) -> Value {
        if self.denominator.is_one() {
            Value::Integer(self.numerator)
        } else {
            Value::Rational(self)
        }
    }

    fn add(&self, other: &Rational) -> Rational {
        Self::reduced(
            &self.numerator * &other.denominator + &other.numerator * &self.denominator,
            &self.denominator * &other.denominator,
        )
    }

    fn sub(&self, other: &Rational) -> Rational {
        Self::reduced(
            &self.numerator * &other.denominator - &other.numerator * &self.denominator,
            &self.denominator * &other.denominator,
        )
    }

    fn mul(&self, other: &Rational) -> Rational {
        Self::reduced(
            &self.numerator * &other.numerator,
            &self.denominator * &other.denominator,
        )
    }

    fn div(&self, other: &Rational) -> Result<Rational, Error> {
        if other.numerator.is_zero() {
            return Err(Error::division_by_zero());
        }
        Ok(Self::reduced(
            &self.numerator * &other.denominator,
            &self.denominator * &other.numerator,
        ))
    }

    pub fn to_f64(&self) -> f64 {
        let numerator = self.numerator.to_f64().unwrap_or(f64::NAN);
        let denominator = self.denominator.to_f64().unwrap_or(f64::NAN);
        numerator / denominator
    }
}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rational {
    fn cmp(&self, other: &Self) -> Ordering {
        // Denominators are positive, so cross-multiplying preserves order
        (&self.numerator * &other.denominator).cmp(&(&other.numerator * &self.denominator))
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

pub(crate) fn integer_to_f64(integer: &BigInt) -> f64 {
    integer.to_f64().unwrap_or(if integer.is_negative() {
        f64::NEG_INFINITY
    } else {
        f64::INFINITY
    })
}

/// Render a float so that it always lexes back as a float
pub(crate) fn format_float(float: f64) -> String {
    if float.is_nan() {
        return "nan".to_owned();
    }
    if float.is_infinite() {
        return if float > 0.0 { "inf" } else { "-inf" }.to_owned();
    }
    let text = format!("{float}");
    if text.contains('.') {
        text
    } else {
        format!("{text}.0")
    }
}

/// Numeric arguments after coercion to their common kind
#[derive(Debug, Clone, PartialEq)]
pub enum Operands {
    Integers(Vec<BigInt>),
    Rationals(Vec<Rational>),
    Floats(Vec<f64>),
}

impl Operands {
    /// Coerce the arguments of `name` to a common numeric kind. Any
    /// non-numeric argument is a `wrong-type` error naming that argument.
    pub fn coerce(name: &str, args: &[Value]) -> Result<Operands, Error> {
        let mut has_float = false;
        let mut has_rational = false;
        for arg in args {
            match arg {
                Value::Integer(_) => {}
                Value::Rational(_) => has_rational = true,
                Value::Float(_) => has_float = true,
                other => {
                    return Err(Error::wrong_type(format!(
                        "{name} requires numbers, but got: {other}"
                    )));
                }
            }
        }

        let operands = if has_float {
            Operands::Floats(
                args.iter()
                    .map(|arg| match arg {
                        Value::Integer(i) => integer_to_f64(i),
                        Value::Rational(r) => r.to_f64(),
                        Value::Float(f) => *f,
                        _ => unreachable!("checked numeric above"),
                    })
                    .collect(),
            )
        } else if has_rational {
            Operands::Rationals(
                args.iter()
                    .map(|arg| match arg {
                        Value::Integer(i) => Rational::from_integer(i.clone()),
                        Value::Rational(r) => r.clone(),
                        _ => unreachable!("checked numeric above"),
                    })
                    .collect(),
            )
        } else {
            Operands::Integers(
                args.iter()
                    .map(|arg| match arg {
                        Value::Integer(i) => i.clone(),
                        _ => unreachable!("checked numeric above"),
                    })
                    .collect(),
            )
        };
        Ok(operands)
    }

    /// Promote integers to rationals, for operations that must stay exact
    fn into_exact(self) -> Operands {
        match self {
            Operands::Integers(integers) => {
                Operands::Rationals(integers.into_iter().map(Rational::from_integer).collect())
            }
            other => other,
        }
    }
}

/// Left fold within one numeric kind. `Operands` is never empty here because
/// every arithmetic built-in requires at least one argument.
fn fold<T, R>(
    values: Vec<T>,
    step: impl Fn(T, T) -> Result<T, Error>,
    wrap: impl Fn(T) -> R,
) -> Result<Option<R>, Error> {
    let mut iter = values.into_iter();
    let Some(mut accumulator) = iter.next() else {
        return Ok(None);
    };
    for value in iter {
        accumulator = step(accumulator, value)?;
    }
    Ok(Some(wrap(accumulator)))
}

fn folded(result: Option<Value>) -> Value {
    result.unwrap_or_else(|| Value::Integer(BigInt::zero()))
}

pub(crate) fn add(operands: Operands) -> Result<Value, Error> {
    let result = match operands {
        Operands::Integers(v) => fold(v, |a, b| Ok(a + b), Value::Integer)?,
        Operands::Rationals(v) => fold(v, |a, b| Ok(a.add(&b)), Rational::into_value)?,
        Operands::Floats(v) => fold(v, |a, b| Ok(a + b), Value::Float)?,
    };
    Ok(folded(result))
}

pub(crate) fn subtract(operands: Operands) -> Result<Value, Error> {
    let result = match operands {
        Operands::Integers(v) if v.len() == 1 => v.into_iter().next().map(|i| Value::Integer(-i)),
        Operands::Rationals(v) if v.len() == 1 => v.into_iter().next().map(|r| {
            Rational {
                numerator: -r.numerator,
                denominator: r.denominator,
            }
            .into_value()
        }),
        Operands::Floats(v) if v.len() == 1 => v.into_iter().next().map(|f| Value::Float(-f)),
        Operands::Integers(v) => fold(v, |a, b| Ok(a - b), Value::Integer)?,
        Operands::Rationals(v) => fold(v, |a, b| Ok(a.sub(&b)), Rational::into_value)?,
        Operands::Floats(v) => fold(v, |a, b| Ok(a - b), Value::Float)?,
    };
    Ok(folded(result))
}

pub(crate) fn multiply(operands: Operands) -> Result<Value, Error> {
    let result = match operands {
        Operands::Integers(v) => fold(v, |a, b| Ok(a * b), Value::Integer)?,
        Operands::Rationals(v) => fold(v, |a, b| Ok(a.mul(&b)), Rational::into_value)?,
        Operands::Floats(v) => fold(v, |a, b| Ok(a * b), Value::Float)?,
    };
    Ok(folded(result))
}

/// Exact division for integers and rationals, IEEE division for floats
pub(crate) fn divide(operands: Operands) -> Result<Value, Error> {
    let result = match operands.into_exact() {
        Operands::Rationals(v) => fold(v, |a, b| a.div(&b), Rational::into_value)?,
        Operands::Floats(v) => fold(v, |a, b| Ok(a / b), Value::Float)?,
        Operands::Integers(_) => unreachable!("into_exact promotes integers"),
    };
    Ok(folded(result))
}

/// Whether the operands are strictly increasing
pub(crate) fn less_than(operands: Operands) -> bool {
    fn increasing<T: PartialOrd>(values: &[T]) -> bool {
        values.windows(2).all(|pair| pair[0] < pair[1])
    }

    match operands {
        Operands::Integers(v) => increasing(&v),
        Operands::Rationals(v) => increasing(&v),
        Operands::Floats(v) => increasing(&v),
    }
}

/// Floor modulo: the result takes the sign of the divisor
pub(crate) fn modulo(dividend: &BigInt, divisor: &BigInt) -> Result<Value, Error> {
    if divisor.is_zero() {
        return Err(Error::division_by_zero());
    }
    Ok(Value::Integer(dividend.mod_floor(divisor)))
}

/// Floor division, rounding towards negative infinity
pub(crate) fn floor_divide(dividend: &BigInt, divisor: &BigInt) -> Result<Value, Error> {
    if divisor.is_zero() {
        return Err(Error::division_by_zero());
    }
    Ok(Value::Integer(dividend.div_floor(divisor)))
}

/// Numeric equality across the tower, or `None` if either side is not a number
pub(crate) fn numeric_eq(left: &Value, right: &Value) -> Option<bool> {
    if !left.is_number() || !right.is_number() {
        return None;
    }
    let pair = [left.clone(), right.clone()];
    let equal = match Operands::coerce("equal?", &pair).ok()? {
        Operands::Integers(v) => v[0] == v[1],
        Operands::Rationals(v) => v[0] == v[1],
        Operands::Floats(v) => v[0] == v[1],
    };
    Some(equal)
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::val;

    fn rational(numerator: i64, denominator: i64) -> Value {
        Rational::new_value(BigInt::from(numerator), BigInt::from(denominator)).unwrap()
    }

    fn operands(args: &[Value]) -> Operands {
        Operands::coerce("test", args).unwrap()
    }

    #[test]
    fn test_rationals_are_normalised() {
        let test_cases = vec![
            ((2, 4), "1/2"),
            ((-2, 4), "-1/2"),
            ((2, -4), "-1/2"),
            ((-2, -4), "1/2"),
            ((6, 3), "2"),
            ((0, 5), "0"),
            ((-9, 3), "-3"),
        ];

        for ((numerator, denominator), expected) in test_cases {
            let value = rational(numerator, denominator);
            assert_eq!(
                format!("{value}"),
                expected,
                "{numerator}/{denominator} normalised wrongly"
            );
            if let Value::Rational(r) = &value {
                assert!(r.denominator().is_positive());
                assert!(!r.denominator().is_one());
            }
        }

        let err = Rational::new_value(BigInt::from(1), BigInt::zero()).unwrap_err();
        assert_eq!(err.type_name(), Some("division-by-zero"));
    }

    #[test]
    fn test_coercion_picks_widest_kind() {
        assert_eq!(
            operands(&[val(1), val(2)]),
            Operands::Integers(vec![BigInt::from(1), BigInt::from(2)])
        );
        assert!(matches!(
            operands(&[val(1), rational(1, 2)]),
            Operands::Rationals(_)
        ));
        assert_eq!(
            operands(&[val(1), rational(1, 2), Value::Float(2.0)]),
            Operands::Floats(vec![1.0, 0.5, 2.0])
        );

        let err = Operands::coerce("+", &[val(1), val("two")]).unwrap_err();
        assert_eq!(err.type_name(), Some("wrong-type"));
        assert!(format!("{err}").contains("\"two\""));
    }

    #[test]
    fn test_arithmetic_results() {
        type Op = fn(Operands) -> Result<Value, Error>;
        let test_cases: Vec<(Op, Vec<Value>, Value)> = vec![
            (add, vec![val(1), Value::Float(2.0)], Value::Float(3.0)),
            (add, vec![rational(1, 3), rational(1, 2)], rational(5, 6)),
            (add, vec![rational(3, 2), rational(1, 2)], val(2)),
            (subtract, vec![val(5)], val(-5)),
            (subtract, vec![rational(1, 2)], rational(-1, 2)),
            (subtract, vec![val(10), val(1), val(2)], val(7)),
            (multiply, vec![rational(2, 3), val(3)], val(2)),
            (multiply, vec![val(2), val(3), val(4)], val(24)),
            (divide, vec![val(1), val(2)], rational(1, 2)),
            (divide, vec![val(6), val(3)], val(2)),
            (divide, vec![val(1), Value::Float(4.0)], Value::Float(0.25)),
        ];

        for (i, (op, args, expected)) in test_cases.into_iter().enumerate() {
            let result = op(operands(&args)).unwrap();
            assert_eq!(result, expected, "arithmetic case #{} failed", i + 1);
        }
    }

    #[test]
    fn test_big_integers_do_not_overflow() {
        let big = Value::Integer(BigInt::from(i64::MAX));
        let result = multiply(operands(&[big.clone(), big])).unwrap();
        assert_eq!(
            format!("{result}"),
            "85070591730234615847396907784232501249"
        );
    }

    #[test]
    fn test_division_by_zero() {
        let err = divide(operands(&[val(1), val(0)])).unwrap_err();
        assert_eq!(err.type_name(), Some("division-by-zero"));

        let err = divide(operands(&[rational(1, 2), val(0)])).unwrap_err();
        assert_eq!(err.type_name(), Some("division-by-zero"));

        // IEEE semantics for floats
        let result = divide(operands(&[val(1), Value::Float(0.0)])).unwrap();
        assert_eq!(result, Value::Float(f64::INFINITY));

        let err = modulo(&BigInt::from(3), &BigInt::zero()).unwrap_err();
        assert_eq!(err.type_name(), Some("division-by-zero"));
    }

    #[test]
    fn test_floor_division_and_modulo() {
        let test_cases = vec![
            ((7, 2), (3, 1)),
            ((-7, 2), (-4, 1)),
            ((7, -2), (-4, -1)),
            ((-7, -2), (3, -1)),
        ];
        for ((a, b), (quotient, remainder)) in test_cases {
            let (a, b) = (BigInt::from(a), BigInt::from(b));
            assert_eq!(floor_divide(&a, &b).unwrap(), val(quotient));
            assert_eq!(modulo(&a, &b).unwrap(), val(remainder));
        }
    }

    #[test]
    fn test_less_than_chains() {
        assert!(less_than(operands(&[val(1), val(2), val(3)])));
        assert!(!less_than(operands(&[val(1), val(3), val(2)])));
        assert!(!less_than(operands(&[val(1), val(1)])));
        assert!(less_than(operands(&[rational(1, 3), rational(1, 2)])));
        assert!(less_than(operands(&[rational(1, 2), Value::Float(0.6)])));
    }

    #[test]
    fn test_float_formatting() {
        assert_eq!(format_float(3.0), "3.0");
        assert_eq!(format_float(-0.25), "-0.25");
        assert_eq!(format_float(f64::INFINITY), "inf");
        assert_eq!(format_float(f64::NAN), "nan");
    }

    #[test]
    fn test_numeric_equality_across_kinds() {
        assert_eq!(numeric_eq(&val(1), &Value::Float(1.0)), Some(true));
        assert_eq!(numeric_eq(&rational(1, 2), &Value::Float(0.5)), Some(true));
        assert_eq!(numeric_eq(&val(1), &val(2)), Some(false));
        assert_eq!(numeric_eq(&val(1), &val("1")), None);
    }
}
