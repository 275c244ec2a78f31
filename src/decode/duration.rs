//! 时长的文本形式
//!
//! 配置中的时长写作 `"500ms"`、`"1h30m"`、`"2.5s"` 这样的字符串，
//! 通过 `#[serde_as(as = "HumanDur")]` 挂到 `Duration` 字段上

use serde::{Deserialize, Deserializer, Serializer};
use serde_with::{DeserializeAs, SerializeAs};
use std::time::Duration;
use thiserror::Error;

pub use serde_with::serde_as;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DurationError {
    #[error("expected a number at {0:?}")]
    MissingNumber(String),
    #[error("missing unit after {0:?}")]
    MissingUnit(String),
    #[error("unknown unit {0:?}")]
    UnknownUnit(String),
    #[error("invalid number {0:?}")]
    InvalidNumber(String),
    #[error("duration overflow")]
    Overflow,
}

/// `Duration` 的文本格式化器
pub struct HumanDur;

impl SerializeAs<Duration> for HumanDur {
    fn serialize_as<S>(source: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_duration(*source))
    }
}

impl<'de> DeserializeAs<'de, Duration> for HumanDur {
    fn deserialize_as<D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

const UNITS: &[(&str, u128)] = &[
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60 * 1_000_000_000),
    ("h", 3_600 * 1_000_000_000),
    ("d", 86_400 * 1_000_000_000),
];

/// 解析 `1h30m45s` 形式的时长；空字符串为零时长
pub fn parse_duration(text: &str) -> Result<Duration, DurationError> {
    let text = text.trim();
    let mut rest = text;
    let mut total_nanos: u128 = 0;

    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_end == 0 {
            return Err(DurationError::MissingNumber(rest.to_string()));
        }
        let (number, after) = rest.split_at(number_end);

        let unit_end = after
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after.len());
        let (unit, next) = after.split_at(unit_end);
        if unit.is_empty() {
            return Err(DurationError::MissingUnit(number.to_string()));
        }
        let unit_lower = unit.to_lowercase();
        let scale = UNITS
            .iter()
            .find(|(name, _)| *name == unit_lower)
            .map(|(_, scale)| *scale)
            .ok_or_else(|| DurationError::UnknownUnit(unit.to_string()))?;

        total_nanos = total_nanos
            .checked_add(scaled(number, scale)?)
            .ok_or(DurationError::Overflow)?;
        rest = next;
    }

    let secs = u64::try_from(total_nanos / 1_000_000_000).map_err(|_| DurationError::Overflow)?;
    Ok(Duration::new(secs, (total_nanos % 1_000_000_000) as u32))
}

/// 十进制小数乘以单位纳秒数，整数部分与小数部分分开计算以避免浮点误差
fn scaled(number: &str, scale: u128) -> Result<u128, DurationError> {
    let invalid = || DurationError::InvalidNumber(number.to_string());
    let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
    if (whole.is_empty() && frac.is_empty()) || frac.contains('.') {
        return Err(invalid());
    }

    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| invalid())? };
    let mut nanos = whole.checked_mul(scale).ok_or(DurationError::Overflow)?;

    let mut place = scale;
    for digit in frac.bytes() {
        place /= 10;
        if place == 0 {
            break;
        }
        nanos += u128::from(digit - b'0') * place;
    }
    Ok(nanos)
}

/// 格式化为 `1h30m45s` 形式，不足一秒的部分按最大的整除单位输出
pub fn format_duration(duration: Duration) -> String {
    if duration.is_zero() {
        return "0s".to_string();
    }

    let mut out = String::new();
    let mut secs = duration.as_secs();
    for (unit, size) in [("h", 3600), ("m", 60), ("s", 1)] {
        if secs >= size {
            out.push_str(&format!("{}{}", secs / size, unit));
            secs %= size;
        }
    }

    let nanos = duration.subsec_nanos();
    if nanos > 0 {
        let part = if nanos % 1_000_000 == 0 {
            format!("{}ms", nanos / 1_000_000)
        } else if nanos % 1_000 == 0 {
            format!("{}us", nanos / 1_000)
        } else {
            format!("{}ns", nanos)
        };
        out.push_str(&part);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("1h30m"), Ok(Duration::from_secs(5400)));
        assert_eq!(parse_duration("2d"), Ok(Duration::from_secs(2 * 86400)));
        assert_eq!(parse_duration("1m500ms"), Ok(Duration::from_millis(60_500)));
        assert_eq!(parse_duration("10us"), Ok(Duration::from_micros(10)));
        assert_eq!(parse_duration("3µs"), Ok(Duration::from_micros(3)));
        assert_eq!(parse_duration(" 1S "), Ok(Duration::from_secs(1)));
    }

    #[test]
    fn test_parse_duration_fraction() {
        assert_eq!(parse_duration("2.5s"), Ok(Duration::from_millis(2500)));
        assert_eq!(parse_duration("0.1s"), Ok(Duration::from_millis(100)));
        assert_eq!(parse_duration(".5h"), Ok(Duration::from_secs(1800)));
        assert_eq!(parse_duration("1.5ns"), Ok(Duration::from_nanos(1)));
    }

    #[test]
    fn test_parse_duration_empty_is_zero() {
        assert_eq!(parse_duration(""), Ok(Duration::ZERO));
        assert_eq!(parse_duration("   "), Ok(Duration::ZERO));
    }

    #[test]
    fn test_parse_duration_errors() {
        assert_eq!(parse_duration("s"), Err(DurationError::MissingNumber("s".into())));
        assert_eq!(parse_duration("10"), Err(DurationError::MissingUnit("10".into())));
        assert_eq!(parse_duration("1x"), Err(DurationError::UnknownUnit("x".into())));
        assert_eq!(parse_duration("1.2.3s"), Err(DurationError::InvalidNumber("1.2.3".into())));
        assert!(parse_duration("-1s").is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(format_duration(Duration::from_secs(5400)), "1h30m");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h1m1s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1s500ms");
        assert_eq!(format_duration(Duration::from_micros(7)), "7us");
        assert_eq!(format_duration(Duration::from_nanos(42)), "42ns");
    }

    #[test]
    fn test_human_dur_json() {
        #[serde_as]
        #[derive(Debug, Serialize, Deserialize, PartialEq)]
        struct Options {
            #[serde_as(as = "HumanDur")]
            timeout: Duration,
        }

        let options: Options = serde_json::from_str(r#"{"timeout": "1m30s"}"#).unwrap();
        assert_eq!(options.timeout, Duration::from_secs(90));
        assert_eq!(serde_json::to_string(&options).unwrap(), r#"{"timeout":"1m30s"}"#);

        let err = serde_json::from_str::<Options>(r#"{"timeout": "soon"}"#).unwrap_err();
        assert!(err.to_string().contains("expected a number"));
    }
}
