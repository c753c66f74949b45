//! In-memory model for typed property values.
//!
//! A property value is a tagged union mirroring the container's variant
//! record types. Exactly one variant is active at a time and the payload
//! interpretation is determined solely by that variant. Scalar kinds with no
//! std equivalent get their own carrier types: [`Currency`] for fixed-point
//! amounts with four implied decimal places and [`Decimal`] for 96-bit
//! scaled decimals.

use std::fmt;

use chrono::{DateTime, Utc};

/// Divisor applied to the raw 64-bit currency amount.
const CURRENCY_SCALE: i64 = 10_000;

/// Largest mantissa representable in 96 bits.
const MAX_MANTISSA: u128 = (1 << 96) - 1;

/// Largest decimal scale the on-disk format allows.
const MAX_SCALE: u8 = 28;

/// Fixed-point currency amount stored as a 64-bit integer scaled by 10,000.
///
/// The raw value counts ten-thousandths, so `Currency::from_scaled(123_456)`
/// is the amount `12.3456`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Currency(i64);

impl Currency {
    /// Creates a currency amount from its raw scaled representation.
    pub const fn from_scaled(scaled: i64) -> Self {
        Currency(scaled)
    }

    /// Creates a currency amount from a float, rounding to the nearest
    /// ten-thousandth.
    pub fn from_f64(value: f64) -> Self {
        Currency((value * CURRENCY_SCALE as f64).round() as i64)
    }

    /// Returns the raw scaled representation.
    pub const fn scaled(self) -> i64 {
        self.0
    }

    /// Returns the amount as a float.
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / CURRENCY_SCALE as f64
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        write!(
            f,
            "{sign}{}.{:04}",
            magnitude / CURRENCY_SCALE as u64,
            magnitude % CURRENCY_SCALE as u64
        )
    }
}

/// High-precision decimal: a 96-bit unsigned mantissa interpreted with an
/// explicit scale and sign.
///
/// The represented value is `mantissa / 10^scale`, negated when the sign is
/// set. Comparison is representational: `1.50` (mantissa 150, scale 2) and
/// `1.5` (mantissa 15, scale 1) are distinct values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal {
    mantissa: u128,
    scale: u8,
    negative: bool,
}

impl Decimal {
    /// Creates a decimal from its parts.
    ///
    /// Returns `None` if the mantissa exceeds 96 bits or the scale exceeds
    /// 28, the limits of the on-disk representation.
    pub fn new(mantissa: u128, scale: u8, negative: bool) -> Option<Self> {
        if mantissa > MAX_MANTISSA || scale > MAX_SCALE {
            return None;
        }
        Some(Decimal {
            mantissa,
            scale,
            negative,
        })
    }

    /// Returns the unsigned 96-bit mantissa.
    pub const fn mantissa(self) -> u128 {
        self.mantissa
    }

    /// Returns the number of decimal digits the mantissa is shifted by.
    pub const fn scale(self) -> u8 {
        self.scale
    }

    /// Returns true if the value is negative.
    pub const fn is_negative(self) -> bool {
        self.negative
    }

    /// Returns the value as a float, losing precision beyond f64 range.
    pub fn to_f64(self) -> f64 {
        let magnitude = self.mantissa as f64 / 10f64.powi(i32::from(self.scale));
        if self.negative { -magnitude } else { magnitude }
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative && self.mantissa != 0 {
            write!(f, "-")?;
        }
        let digits = self.mantissa.to_string();
        let scale = usize::from(self.scale);
        if scale == 0 {
            return write!(f, "{digits}");
        }
        if digits.len() > scale {
            let split = digits.len() - scale;
            write!(f, "{}.{}", &digits[..split], &digits[split..])
        } else {
            write!(f, "0.{digits:0>scale$}")
        }
    }
}

/// A typed property value.
///
/// Variant names follow the on-disk type vocabulary: `I`/`U` prefixes for
/// signed/unsigned integers and `R` for floats, suffixed with the width in
/// bytes. Narrow and wide on-disk strings both decode into [`String`];
/// the two calendar encodings (day-count dates and file times) both decode
/// into [`DateTime`]. Callers must not assume which on-disk sub-encoding
/// produced a value.
///
/// [`String`]: PropertyValue::String
/// [`DateTime`]: PropertyValue::DateTime
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Boolean.
    Bool(bool),
    /// Signed 8-bit integer.
    I1(i8),
    /// Signed 16-bit integer.
    I2(i16),
    /// Signed 32-bit integer.
    I4(i32),
    /// Signed 64-bit integer.
    I8(i64),
    /// Unsigned 8-bit integer.
    U1(u8),
    /// Unsigned 16-bit integer.
    U2(u16),
    /// Unsigned 32-bit integer.
    U4(u32),
    /// Unsigned 64-bit integer.
    U8(u64),
    /// 32-bit float.
    R4(f32),
    /// 64-bit float.
    R8(f64),
    /// Fixed-point currency amount.
    Currency(Currency),
    /// 96-bit scaled decimal.
    Decimal(Decimal),
    /// Calendar date and time, normalized to UTC.
    DateTime(DateTime<Utc>),
    /// Text. Always written in the wide encoding; decoded from narrow or
    /// wide records alike.
    String(String),
    /// Raw 32-bit status code.
    Status(u32),
    /// A record this layer does not interpret: an exotic type tag, an
    /// external-object reference, or a payload that failed to decode.
    ///
    /// Carries the complete raw record so the entry can be listed and
    /// re-encoded bit-exactly. `tag` is the parsed type tag, or
    /// [`crate::variant::vt::ILLEGAL`] when the record was too short to
    /// carry one.
    Unsupported {
        /// On-disk type tag of the record.
        tag: u16,
        /// Complete raw record bytes, header included.
        record: Vec<u8>,
    },
}

impl PropertyValue {
    /// Returns a short name for the active variant.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "Bool",
            Self::I1(_) => "I1",
            Self::I2(_) => "I2",
            Self::I4(_) => "I4",
            Self::I8(_) => "I8",
            Self::U1(_) => "U1",
            Self::U2(_) => "U2",
            Self::U4(_) => "U4",
            Self::U8(_) => "U8",
            Self::R4(_) => "R4",
            Self::R8(_) => "R8",
            Self::Currency(_) => "Currency",
            Self::Decimal(_) => "Decimal",
            Self::DateTime(_) => "DateTime",
            Self::String(_) => "String",
            Self::Status(_) => "Status",
            Self::Unsupported { .. } => "Unsupported",
        }
    }

    /// Returns the value as a bool if this is the `Bool` variant.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the value as a string slice if this is the `String` variant.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the value as an i32 if this is the `I4` variant.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::I4(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the value as an i64 if this is the `I8` variant.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::I8(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the value as an f64 if this is the `R8` variant.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::R8(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the calendar value if this is the `DateTime` variant.
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::DateTime(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the currency amount if this is the `Currency` variant.
    pub fn as_currency(&self) -> Option<Currency> {
        match self {
            Self::Currency(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the decimal if this is the `Decimal` variant.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Decimal(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns true for the `Unsupported` pass-through variant.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i8> for PropertyValue {
    fn from(value: i8) -> Self {
        Self::I1(value)
    }
}

impl From<i16> for PropertyValue {
    fn from(value: i16) -> Self {
        Self::I2(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        Self::I4(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::I8(value)
    }
}

impl From<u8> for PropertyValue {
    fn from(value: u8) -> Self {
        Self::U1(value)
    }
}

impl From<u16> for PropertyValue {
    fn from(value: u16) -> Self {
        Self::U2(value)
    }
}

impl From<u32> for PropertyValue {
    fn from(value: u32) -> Self {
        Self::U4(value)
    }
}

impl From<u64> for PropertyValue {
    fn from(value: u64) -> Self {
        Self::U8(value)
    }
}

impl From<f32> for PropertyValue {
    fn from(value: f32) -> Self {
        Self::R4(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::R8(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::DateTime(value)
    }
}

impl From<Currency> for PropertyValue {
    fn from(value: Currency) -> Self {
        Self::Currency(value)
    }
}

impl From<Decimal> for PropertyValue {
    fn from(value: Decimal) -> Self {
        Self::Decimal(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_display() {
        assert_eq!(Currency::from_scaled(123_456).to_string(), "12.3456");
        assert_eq!(Currency::from_scaled(-123_456).to_string(), "-12.3456");
        assert_eq!(Currency::from_scaled(0).to_string(), "0.0000");
        assert_eq!(Currency::from_scaled(5).to_string(), "0.0005");
    }

    #[test]
    fn test_currency_float_round_trip() {
        let amount = Currency::from_f64(19.99);
        assert_eq!(amount.scaled(), 199_900);
        assert!((amount.to_f64() - 19.99).abs() < 1e-9);

        let negative = Currency::from_f64(-0.0001);
        assert_eq!(negative.scaled(), -1);
    }

    #[test]
    fn test_decimal_limits() {
        assert!(Decimal::new(MAX_MANTISSA, 28, false).is_some());
        assert!(Decimal::new(MAX_MANTISSA + 1, 0, false).is_none());
        assert!(Decimal::new(1, 29, false).is_none());
    }

    #[test]
    fn test_decimal_display() {
        let d = Decimal::new(123_450, 4, false).unwrap();
        assert_eq!(d.to_string(), "12.3450");

        let short = Decimal::new(12, 4, true).unwrap();
        assert_eq!(short.to_string(), "-0.0012");

        let whole = Decimal::new(42, 0, false).unwrap();
        assert_eq!(whole.to_string(), "42");

        let negative_zero = Decimal::new(0, 2, true).unwrap();
        assert_eq!(negative_zero.to_string(), "0.00");
    }

    #[test]
    fn test_decimal_to_f64() {
        let d = Decimal::new(314_159, 5, false).unwrap();
        assert!((d.to_f64() - 3.14159).abs() < 1e-12);

        let neg = Decimal::new(25, 1, true).unwrap();
        assert!((neg.to_f64() + 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_from_conversions() {
        assert_eq!(PropertyValue::from(true), PropertyValue::Bool(true));
        assert_eq!(PropertyValue::from(42i32), PropertyValue::I4(42));
        assert_eq!(PropertyValue::from(42u64), PropertyValue::U8(42));
        assert_eq!(
            PropertyValue::from("hello"),
            PropertyValue::String("hello".to_string())
        );
        assert_eq!(PropertyValue::from(2.5f64), PropertyValue::R8(2.5));
    }

    #[test]
    fn test_accessors_match_variant() {
        let value = PropertyValue::I4(7);
        assert_eq!(value.as_i32(), Some(7));
        assert_eq!(value.as_i64(), None);
        assert_eq!(value.type_name(), "I4");

        let text = PropertyValue::from("abc");
        assert_eq!(text.as_str(), Some("abc"));
        assert!(!text.is_unsupported());
    }
}
