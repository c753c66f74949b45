//! Variant record codec.
//!
//! Converts between [`PropertyValue`] and the container's on-disk property
//! record: a 16-bit type tag, two padding bytes, and a tag-determined payload,
//! padded to a 4-byte boundary. All multi-byte fields are little-endian.
//!
//! Write support is asymmetric by design: strings always encode with the wide
//! character-counted tag ([`vt::LPWSTR`]) and calendar values always encode
//! with the tick-based tag ([`vt::FILETIME`]), while decoding additionally
//! accepts narrow strings, byte-counted wide strings, and day-count dates
//! found in pre-existing documents. Records with a tag this layer does not
//! interpret decode into the [`PropertyValue::Unsupported`] pass-through case
//! and re-encode bit-exactly.

use std::io;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};

use crate::value::{Currency, Decimal, PropertyValue};

/// On-disk variant type tags.
///
/// The numbering is fixed by the container's property-record format and must
/// not be altered.
pub mod vt {
    /// No value.
    pub const EMPTY: u16 = 0;
    /// Explicit null.
    pub const NULL: u16 = 1;
    /// Signed 16-bit integer.
    pub const I2: u16 = 2;
    /// Signed 32-bit integer.
    pub const I4: u16 = 3;
    /// 32-bit float.
    pub const R4: u16 = 4;
    /// 64-bit float.
    pub const R8: u16 = 5;
    /// Currency: 64-bit integer scaled by 10,000.
    pub const CY: u16 = 6;
    /// Date as a fractional day count.
    pub const DATE: u16 = 7;
    /// Wide string with a byte-counted prefix.
    pub const BSTR: u16 = 8;
    /// External automation object reference.
    pub const DISPATCH: u16 = 9;
    /// 32-bit status code.
    pub const ERROR: u16 = 10;
    /// Boolean: 16-bit, all-ones for true.
    pub const BOOL: u16 = 11;
    /// Nested variant.
    pub const VARIANT: u16 = 12;
    /// External object reference.
    pub const UNKNOWN: u16 = 13;
    /// 96-bit scaled decimal.
    pub const DECIMAL: u16 = 14;
    /// Signed 8-bit integer.
    pub const I1: u16 = 16;
    /// Unsigned 8-bit integer.
    pub const UI1: u16 = 17;
    /// Unsigned 16-bit integer.
    pub const UI2: u16 = 18;
    /// Unsigned 32-bit integer.
    pub const UI4: u16 = 19;
    /// Signed 64-bit integer.
    pub const I8: u16 = 20;
    /// Unsigned 64-bit integer.
    pub const UI8: u16 = 21;
    /// Machine integer, stored as 32-bit.
    pub const INT: u16 = 22;
    /// Machine unsigned integer, stored as 32-bit.
    pub const UINT: u16 = 23;
    /// 32-bit result code.
    pub const HRESULT: u16 = 25;
    /// Narrow string with a byte-counted prefix.
    pub const LPSTR: u16 = 30;
    /// Wide string with a character-counted prefix.
    pub const LPWSTR: u16 = 31;
    /// File time: 100-nanosecond ticks.
    pub const FILETIME: u16 = 64;
    /// Marker for records too short to carry a tag. Never valid on disk.
    pub const ILLEGAL: u16 = 0xffff;
}

/// Record header length: tag plus padding.
const HEADER_LEN: usize = 4;

/// Milliseconds per day, for day-count date conversion.
const MILLIS_PER_DAY: i64 = 86_400_000;

/// 100-nanosecond ticks per second, for file-time conversion.
const TICKS_PER_SECOND: i64 = 10_000_000;

/// Day-count date domain bounds (exclusive), spanning years 100 to 9999.
const DAY_COUNT_MIN: f64 = -657_435.0;
const DAY_COUNT_MAX: f64 = 2_958_466.0;

fn truncated(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, msg)
}

fn invalid(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

/// Bounds-checked little-endian reader over a record payload.
struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Reader { data, offset: 0 }
    }

    fn take(&mut self, len: usize) -> io::Result<&'a [u8]> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| truncated("property record payload truncated"))?;
        let slice = &self.data[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn u8(&mut self) -> io::Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> io::Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> io::Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn u64(&mut self) -> io::Result<u64> {
        let bytes = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    fn f32(&mut self) -> io::Result<f32> {
        Ok(f32::from_bits(self.u32()?))
    }

    fn f64(&mut self) -> io::Result<f64> {
        Ok(f64::from_bits(self.u64()?))
    }
}

fn pad_to_boundary(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

/// Encodes a value into an on-disk property record.
///
/// The record is self-describing (tag plus payload) and padded to a 4-byte
/// boundary. [`PropertyValue::Unsupported`] re-emits its raw record verbatim.
///
/// # Errors
///
/// Fails with `InvalidData` only for calendar values outside the tick
/// encoding's domain (before 1601-01-01 or beyond its 64-bit range).
pub fn encode(value: &PropertyValue) -> io::Result<Vec<u8>> {
    if let PropertyValue::Unsupported { record, .. } = value {
        return Ok(record.clone());
    }

    let mut buf = Vec::with_capacity(24);
    buf.extend_from_slice(&tag_of(value).to_le_bytes());
    buf.extend_from_slice(&[0, 0]);

    match value {
        PropertyValue::Bool(flag) => {
            let raw: u16 = if *flag { 0xffff } else { 0 };
            buf.extend_from_slice(&raw.to_le_bytes());
        }
        PropertyValue::I1(v) => buf.push(*v as u8),
        PropertyValue::I2(v) => buf.extend_from_slice(&v.to_le_bytes()),
        PropertyValue::I4(v) => buf.extend_from_slice(&v.to_le_bytes()),
        PropertyValue::I8(v) => buf.extend_from_slice(&v.to_le_bytes()),
        PropertyValue::U1(v) => buf.push(*v),
        PropertyValue::U2(v) => buf.extend_from_slice(&v.to_le_bytes()),
        PropertyValue::U4(v) => buf.extend_from_slice(&v.to_le_bytes()),
        PropertyValue::U8(v) => buf.extend_from_slice(&v.to_le_bytes()),
        PropertyValue::R4(v) => buf.extend_from_slice(&v.to_bits().to_le_bytes()),
        PropertyValue::R8(v) => buf.extend_from_slice(&v.to_bits().to_le_bytes()),
        PropertyValue::Currency(amount) => {
            buf.extend_from_slice(&amount.scaled().to_le_bytes());
        }
        PropertyValue::Decimal(dec) => {
            buf.extend_from_slice(&0u16.to_le_bytes());
            buf.push(dec.scale());
            buf.push(if dec.is_negative() { 0x80 } else { 0 });
            let mantissa = dec.mantissa();
            buf.extend_from_slice(&((mantissa >> 64) as u32).to_le_bytes());
            buf.extend_from_slice(&(mantissa as u64).to_le_bytes());
        }
        PropertyValue::DateTime(when) => {
            buf.extend_from_slice(&ticks_from_date(*when)?.to_le_bytes());
        }
        PropertyValue::String(text) => {
            let units: Vec<u16> = text.encode_utf16().collect();
            let count = u32::try_from(units.len() + 1)
                .map_err(|_| invalid("string too long for a property record"))?;
            buf.extend_from_slice(&count.to_le_bytes());
            for unit in &units {
                buf.extend_from_slice(&unit.to_le_bytes());
            }
            buf.extend_from_slice(&0u16.to_le_bytes());
        }
        PropertyValue::Status(code) => buf.extend_from_slice(&code.to_le_bytes()),
        PropertyValue::Unsupported { .. } => unreachable!("handled above"),
    }

    pad_to_boundary(&mut buf);
    Ok(buf)
}

/// Decodes an on-disk property record.
///
/// Recognized tags decode into their typed variants; tags this layer does not
/// interpret (including external-object references) decode into the
/// [`PropertyValue::Unsupported`] pass-through case. Both 32-bit status tags
/// map to [`PropertyValue::Status`] and the machine-integer aliases map to
/// their fixed-width variants.
///
/// # Errors
///
/// Fails with `UnexpectedEof` when the record is shorter than its tag
/// requires and `InvalidData` when a payload cannot be interpreted (day count
/// or tick count outside the calendar domain, odd wide-string byte counts,
/// out-of-range decimal scale).
pub fn decode(record: &[u8]) -> io::Result<PropertyValue> {
    if record.len() < HEADER_LEN {
        return Err(truncated("property record shorter than its header"));
    }
    let tag = u16::from_le_bytes([record[0], record[1]]);
    let mut payload = Reader::new(&record[HEADER_LEN..]);

    let value = match tag {
        vt::I2 => PropertyValue::I2(payload.u16()? as i16),
        vt::I4 | vt::INT => PropertyValue::I4(payload.u32()? as i32),
        vt::R4 => PropertyValue::R4(payload.f32()?),
        vt::R8 => PropertyValue::R8(payload.f64()?),
        vt::CY => PropertyValue::Currency(Currency::from_scaled(payload.u64()? as i64)),
        vt::DATE => PropertyValue::DateTime(date_from_day_count(payload.f64()?)?),
        vt::BSTR => PropertyValue::String(read_byte_counted_wide(&mut payload)?),
        vt::ERROR | vt::HRESULT => PropertyValue::Status(payload.u32()?),
        vt::BOOL => PropertyValue::Bool(payload.u16()? != 0),
        vt::DECIMAL => PropertyValue::Decimal(read_decimal(&mut payload)?),
        vt::I1 => PropertyValue::I1(payload.u8()? as i8),
        vt::UI1 => PropertyValue::U1(payload.u8()?),
        vt::UI2 => PropertyValue::U2(payload.u16()?),
        vt::UI4 | vt::UINT => PropertyValue::U4(payload.u32()?),
        vt::I8 => PropertyValue::I8(payload.u64()? as i64),
        vt::UI8 => PropertyValue::U8(payload.u64()?),
        vt::LPSTR => PropertyValue::String(read_narrow(&mut payload)?),
        vt::LPWSTR => PropertyValue::String(read_char_counted_wide(&mut payload)?),
        vt::FILETIME => PropertyValue::DateTime(date_from_ticks(payload.u64()?)?),
        _ => PropertyValue::Unsupported {
            tag,
            record: record.to_vec(),
        },
    };
    Ok(value)
}

/// Wraps a record that could not be decoded in the pass-through case.
pub(crate) fn unsupported_record(record: &[u8]) -> PropertyValue {
    let tag = if record.len() >= 2 {
        u16::from_le_bytes([record[0], record[1]])
    } else {
        vt::ILLEGAL
    };
    PropertyValue::Unsupported {
        tag,
        record: record.to_vec(),
    }
}

fn tag_of(value: &PropertyValue) -> u16 {
    match value {
        PropertyValue::Bool(_) => vt::BOOL,
        PropertyValue::I1(_) => vt::I1,
        PropertyValue::I2(_) => vt::I2,
        PropertyValue::I4(_) => vt::I4,
        PropertyValue::I8(_) => vt::I8,
        PropertyValue::U1(_) => vt::UI1,
        PropertyValue::U2(_) => vt::UI2,
        PropertyValue::U4(_) => vt::UI4,
        PropertyValue::U8(_) => vt::UI8,
        PropertyValue::R4(_) => vt::R4,
        PropertyValue::R8(_) => vt::R8,
        PropertyValue::Currency(_) => vt::CY,
        PropertyValue::Decimal(_) => vt::DECIMAL,
        PropertyValue::DateTime(_) => vt::FILETIME,
        PropertyValue::String(_) => vt::LPWSTR,
        PropertyValue::Status(_) => vt::ERROR,
        PropertyValue::Unsupported { tag, .. } => *tag,
    }
}

fn read_decimal(payload: &mut Reader<'_>) -> io::Result<Decimal> {
    let _reserved = payload.u16()?;
    let scale = payload.u8()?;
    let sign = payload.u8()?;
    let hi32 = payload.u32()?;
    let lo64 = payload.u64()?;
    let mantissa = (u128::from(hi32) << 64) | u128::from(lo64);
    Decimal::new(mantissa, scale, sign & 0x80 != 0)
        .ok_or_else(|| invalid("decimal scale out of range"))
}

/// Reads a character-counted wide string: u32 unit count including the
/// terminator, then UTF-16 code units.
fn read_char_counted_wide(payload: &mut Reader<'_>) -> io::Result<String> {
    let count = payload.u32()? as usize;
    let bytes = payload.take(count.checked_mul(2).ok_or_else(|| {
        invalid("wide string length overflow")
    })?)?;
    Ok(units_to_string(bytes))
}

/// Reads a byte-counted wide string: u32 byte count including the two-byte
/// terminator, then UTF-16 code units.
fn read_byte_counted_wide(payload: &mut Reader<'_>) -> io::Result<String> {
    let count = payload.u32()? as usize;
    if count % 2 != 0 {
        return Err(invalid("wide string byte count is odd"));
    }
    let bytes = payload.take(count)?;
    Ok(units_to_string(bytes))
}

/// Reads a narrow string: u32 byte count including the terminator.
fn read_narrow(payload: &mut Reader<'_>) -> io::Result<String> {
    let count = payload.u32()? as usize;
    let mut bytes = payload.take(count)?;
    if let [head @ .., 0] = bytes {
        bytes = head;
    }
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

fn units_to_string(bytes: &[u8]) -> String {
    let mut units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    if units.last() == Some(&0) {
        units.pop();
    }
    // Tolerate unpaired surrogates left behind by legacy writers.
    String::from_utf16(&units).unwrap_or_else(|_| String::from_utf16_lossy(&units))
}

/// Epoch for day-count dates: 1899-12-30T00:00:00Z.
fn day_count_epoch() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .expect("fixed epoch is valid")
        .and_utc()
}

/// Epoch for file times: 1601-01-01T00:00:00Z.
fn filetime_epoch() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(1601, 1, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .expect("fixed epoch is valid")
        .and_utc()
}

/// Converts a fractional day count to a calendar value.
///
/// The integral part counts days from the epoch; the fractional part is the
/// time of day, measured forward even for dates before the epoch. Conversion
/// resolves to the nearest millisecond.
fn date_from_day_count(days: f64) -> io::Result<DateTime<Utc>> {
    if !days.is_finite() || days <= DAY_COUNT_MIN || days >= DAY_COUNT_MAX {
        return Err(invalid("day-count date outside the calendar domain"));
    }
    let rounding = if days >= 0.0 { 0.5 } else { -0.5 };
    let mut millis = (days * MILLIS_PER_DAY as f64 + rounding) as i64;
    if millis < 0 {
        // Mirror the time-of-day fraction so it runs forward.
        millis -= (millis % MILLIS_PER_DAY) * 2;
    }
    Ok(day_count_epoch() + TimeDelta::milliseconds(millis))
}

/// Converts a 100-nanosecond tick count to a calendar value.
fn date_from_ticks(ticks: u64) -> io::Result<DateTime<Utc>> {
    let seconds = (ticks / TICKS_PER_SECOND as u64) as i64;
    let nanos = ((ticks % TICKS_PER_SECOND as u64) * 100) as u32;
    let delta = TimeDelta::new(seconds, nanos)
        .ok_or_else(|| invalid("tick count outside the calendar domain"))?;
    filetime_epoch()
        .checked_add_signed(delta)
        .ok_or_else(|| invalid("tick count outside the calendar domain"))
}

/// Converts a calendar value to a 100-nanosecond tick count, truncating
/// sub-tick precision.
fn ticks_from_date(when: DateTime<Utc>) -> io::Result<u64> {
    let delta = when.signed_duration_since(filetime_epoch());
    let seconds = delta.num_seconds();
    let nanos = delta.subsec_nanos();
    if seconds < 0 || nanos < 0 {
        return Err(invalid("calendar value predates the tick epoch"));
    }
    (seconds as u64)
        .checked_mul(TICKS_PER_SECOND as u64)
        .and_then(|ticks| ticks.checked_add(nanos as u64 / 100))
        .ok_or_else(|| invalid("calendar value beyond the tick range"))
}
