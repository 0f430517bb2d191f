// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Parsers for the text arguments of protocol 0 opcodes.

use crate::{SparkPickleResult, error::Details, types::Value};
use num_bigint::BigInt;

fn invalid(literal: &[u8]) -> crate::Error {
    Details::PickleInvalidLiteral(String::from_utf8_lossy(literal).into_owned()).into()
}

fn parse_bigint(digits: &[u8], literal: &[u8]) -> SparkPickleResult<BigInt> {
    let digits = digits.trim_ascii();
    BigInt::parse_bytes(digits, 10).ok_or_else(|| invalid(literal))
}

/// Argument of `INT`: a decimal number, or `01`/`00` for the booleans of protocol 0.
pub fn parse_int(line: &[u8]) -> SparkPickleResult<Value> {
    match line {
        b"01" => Ok(Value::Bool(true)),
        b"00" => Ok(Value::Bool(false)),
        _ => parse_bigint(line, line).map(Value::from),
    }
}

/// Argument of `LONG`: a decimal number with an optional trailing `L`.
pub fn parse_long(line: &[u8]) -> SparkPickleResult<Value> {
    let digits = line.strip_suffix(b"L").unwrap_or(line);
    parse_bigint(digits, line).map(Value::from)
}

pub fn parse_float(line: &[u8]) -> SparkPickleResult<f64> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| invalid(line))
}

/// Little-endian two's complement, as written by `LONG1` and `LONG4`.
pub fn decode_long(bytes: &[u8]) -> Value {
    Value::from(BigInt::from_signed_bytes_le(bytes))
}

/// 8-bit strings become `str` when they hold valid UTF-8 and `bytes` otherwise.
pub fn byte_string(bytes: Vec<u8>) -> Value {
    match String::from_utf8(bytes) {
        Ok(s) => Value::String(s),
        Err(e) => Value::Bytes(e.into_bytes()),
    }
}

fn hex_digit(b: u8) -> Option<u32> {
    char::from(b).to_digit(16)
}

/// Argument of `STRING`: a quoted Python literal with backslash escapes.
pub fn parse_quoted_string(line: &[u8]) -> SparkPickleResult<Vec<u8>> {
    let body = match line {
        [q @ (b'\'' | b'"'), body @ .., last] if last == q => body,
        _ => return Err(invalid(line)),
    };
    let mut out = Vec::with_capacity(body.len());
    let mut i = 0;
    while i < body.len() {
        let b = body[i];
        i += 1;
        if b != b'\\' {
            out.push(b);
            continue;
        }
        let Some(&escaped) = body.get(i) else {
            return Err(invalid(line));
        };
        i += 1;
        match escaped {
            b'\n' => {}
            b'\\' | b'\'' | b'"' => out.push(escaped),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0C),
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'v' => out.push(0x0B),
            b'x' => {
                let value = body
                    .get(i..i + 2)
                    .and_then(|h| Some(hex_digit(h[0])? * 16 + hex_digit(h[1])?))
                    .ok_or_else(|| invalid(line))?;
                out.push(value as u8);
                i += 2;
            }
            b'0'..=b'7' => {
                let mut value = u32::from(escaped - b'0');
                for _ in 0..2 {
                    match body.get(i) {
                        Some(&d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(d - b'0');
                            i += 1;
                        }
                        _ => break,
                    }
                }
                out.push((value & 0xFF) as u8);
            }
            other => out.extend([b'\\', other]),
        }
    }
    Ok(out)
}

/// Argument of `UNICODE`: Latin-1 text where only `\uXXXX` and `\UXXXXXXXX` are escapes.
pub fn parse_raw_unicode_escape(line: &[u8]) -> SparkPickleResult<String> {
    let mut out = String::with_capacity(line.len());
    let mut i = 0;
    while i < line.len() {
        let b = line[i];
        let width = match (b, line.get(i + 1)) {
            (b'\\', Some(b'u')) => 4,
            (b'\\', Some(b'U')) => 8,
            _ => {
                out.push(char::from(b));
                i += 1;
                continue;
            }
        };
        let code = line
            .get(i + 2..i + 2 + width)
            .and_then(|digits| {
                digits
                    .iter()
                    .try_fold(0u32, |acc, &d| Some(acc * 16 + hex_digit(d)?))
            })
            .ok_or_else(|| invalid(line))?;
        out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
        i += 2 + width;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(b"42", Value::Int(42))]
    #[case(b"-7", Value::Int(-7))]
    #[case(b"01", Value::Bool(true))]
    #[case(b"00", Value::Bool(false))]
    fn ints(#[case] line: &[u8], #[case] expected: Value) -> anyhow::Result<()> {
        assert_eq!(parse_int(line)?, expected);
        Ok(())
    }

    #[test]
    fn longs() -> anyhow::Result<()> {
        assert_eq!(parse_long(b"12L")?, Value::Int(12));
        let big = parse_long(b"123456789012345678901234567890L")?;
        assert_eq!(big.to_string(), "123456789012345678901234567890");
        assert!(parse_long(b"L").is_err());
        Ok(())
    }

    #[test]
    fn two_complement_longs() {
        assert_eq!(decode_long(&[]), Value::Int(0));
        assert_eq!(decode_long(&[0xFF]), Value::Int(-1));
        assert_eq!(decode_long(&[0x00, 0x80]), Value::Int(-32768));
        assert_eq!(decode_long(&[0x00, 0x80, 0x00]), Value::Int(32768));
        let big = decode_long(&[0, 0, 0, 0, 0, 0, 0, 0, 0x01]);
        assert_eq!(big, Value::BigInt(BigInt::from(1u128 << 64)));
    }

    #[test]
    fn quoted_strings() -> anyhow::Result<()> {
        assert_eq!(parse_quoted_string(b"'abc'")?, b"abc");
        assert_eq!(parse_quoted_string(br"'it\'s\n'")?, b"it's\n");
        assert_eq!(parse_quoted_string(br#""\x41\101\q""#)?, b"AA\\q");
        assert!(parse_quoted_string(b"abc").is_err());
        assert!(parse_quoted_string(b"'abc\"").is_err());
        Ok(())
    }

    #[test]
    fn raw_unicode() -> anyhow::Result<()> {
        assert_eq!(parse_raw_unicode_escape(br"caf\u00e9")?, "café");
        assert_eq!(parse_raw_unicode_escape(br"\U0001F600!")?, "\u{1F600}!");
        assert_eq!(parse_raw_unicode_escape(b"\\x")?, "\\x");
        assert_eq!(parse_raw_unicode_escape(&[0xE9])?, "é");
        Ok(())
    }

    #[test]
    fn byte_strings_prefer_text() {
        assert_eq!(byte_string(b"abc".to_vec()), Value::from("abc"));
        assert_eq!(byte_string(vec![0xFF]), Value::Bytes(vec![0xFF]));
    }
}
