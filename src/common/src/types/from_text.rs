// Copyright 2025 RisingWave Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use super::{Data, Real};
use crate::error::{Error, Result};

/// Parse the canonical text form produced by
/// [`ToText`](super::to_text::ToText) back into a value.
pub fn from_text(input: &str) -> Result<Data> {
    let mut parser = Parser {
        input,
        pos: 0,
    };
    parser.skip_ws();
    let data = parser.parse_data()?;
    parser.skip_ws();
    if !parser.rest().is_empty() {
        return Err(Error::parse(format!(
            "trailing input at offset {}: {:?}",
            parser.pos,
            parser.rest()
        )));
    }
    Ok(data)
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|c| c.is_whitespace()) {
            self.bump();
        }
    }

    fn expect(&mut self, token: &str) -> Result<()> {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            Ok(())
        } else {
            Err(Error::parse(format!(
                "expected {token:?} at offset {}, found {:?}",
                self.pos,
                self.rest().chars().take(10).collect::<String>()
            )))
        }
    }

    fn parse_data(&mut self) -> Result<Data> {
        match self.peek() {
            Some('[') => self.parse_list(),
            Some('{') => self.parse_map(),
            Some('<') => self.parse_record(),
            Some('"') => self.parse_string(),
            Some('/') => self.parse_pattern(),
            Some('#') => self.parse_enum(),
            Some(_) => self.parse_scalar(),
            None => Err(Error::parse("empty input")),
        }
    }

    fn parse_list(&mut self) -> Result<Data> {
        self.expect("[")?;
        let mut elements = Vec::new();
        self.skip_ws();
        if self.peek() == Some(']') {
            self.bump();
            return Ok(Data::List(elements));
        }
        loop {
            elements.push(self.parse_data()?);
            self.skip_ws();
            match self.bump() {
                Some(',') => self.skip_ws(),
                Some(']') => return Ok(Data::List(elements)),
                _ => return Err(Error::parse("expected `,` or `]` in list")),
            }
        }
    }

    fn parse_map(&mut self) -> Result<Data> {
        self.expect("{")?;
        let mut entries = Vec::new();
        self.skip_ws();
        if self.peek() == Some('}') {
            self.bump();
            return Ok(Data::Map(entries));
        }
        loop {
            let key = self.parse_data()?;
            self.skip_ws();
            self.expect("->")?;
            self.skip_ws();
            let value = self.parse_data()?;
            entries.push((key, value));
            self.skip_ws();
            match self.bump() {
                Some(',') => self.skip_ws(),
                Some('}') => return Ok(Data::Map(entries)),
                _ => return Err(Error::parse("expected `,` or `}` in map")),
            }
        }
    }

    fn parse_record(&mut self) -> Result<Data> {
        self.expect("<")?;
        let mut fields = Vec::new();
        self.skip_ws();
        if self.peek() == Some('>') {
            self.bump();
            return Ok(Data::Record(fields));
        }
        loop {
            let name_end = self.rest().find(':').ok_or_else(|| {
                Error::parse("expected `name:` in record")
            })?;
            let name = self.rest()[..name_end].trim().to_owned();
            if name.is_empty() {
                return Err(Error::parse("empty record field name"));
            }
            self.pos += name_end + 1;
            self.skip_ws();
            let value = self.parse_data()?;
            fields.push((name, value));
            self.skip_ws();
            match self.bump() {
                Some(',') => self.skip_ws(),
                Some('>') => return Ok(Data::Record(fields)),
                _ => return Err(Error::parse("expected `,` or `>` in record")),
            }
        }
    }

    fn parse_string(&mut self) -> Result<Data> {
        self.expect("\"")?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(Error::parse("unterminated string")),
                Some('"') => return Ok(Data::Str(out)),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('r') => out.push('\r'),
                    Some('t') => out.push('\t'),
                    Some('0') => out.push('\0'),
                    Some('\\') => out.push('\\'),
                    Some('"') => out.push('"'),
                    Some('\'') => out.push('\''),
                    Some('u') => {
                        self.expect("{")?;
                        let end = self
                            .rest()
                            .find('}')
                            .ok_or_else(|| Error::parse("unterminated \\u escape"))?;
                        let hex = &self.rest()[..end];
                        let code = u32::from_str_radix(hex, 16)
                            .map_err(|_| Error::parse(format!("bad \\u escape: {hex}")))?;
                        out.push(
                            char::from_u32(code)
                                .ok_or_else(|| Error::parse(format!("bad code point: {code}")))?,
                        );
                        self.pos += end + 1;
                    }
                    c => return Err(Error::parse(format!("bad string escape: {c:?}"))),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn parse_pattern(&mut self) -> Result<Data> {
        self.expect("/")?;
        let mut source = String::new();
        loop {
            match self.bump() {
                None => return Err(Error::parse("unterminated pattern")),
                Some('/') => {
                    return Ok(Data::Pattern(super::Pattern::new(source)?));
                }
                Some('\\') => match self.bump() {
                    Some('/') => source.push('/'),
                    Some('\\') => source.push('\\'),
                    c => return Err(Error::parse(format!("bad pattern escape: {c:?}"))),
                },
                Some(c) => source.push(c),
            }
        }
    }

    fn parse_enum(&mut self) -> Result<Data> {
        self.expect("#")?;
        let token = self.take_token();
        token
            .parse::<u32>()
            .map(Data::Enum)
            .map_err(|_| Error::parse(format!("bad enumeration ordinal: {token}")))
    }

    fn take_token(&mut self) -> &'a str {
        let rest = self.rest();
        let end = rest
            .find(|c: char| c.is_whitespace() || matches!(c, ',' | ']' | '}' | '>'))
            .unwrap_or(rest.len());
        self.pos += end;
        &rest[..end]
    }

    fn parse_scalar(&mut self) -> Result<Data> {
        let token = self.take_token();
        match token {
            "" => return Err(Error::parse("expected a value")),
            "nil" => return Ok(Data::Nil),
            "true" => return Ok(Data::Bool(true)),
            "false" => return Ok(Data::Bool(false)),
            "nan" => return Ok(Data::Real(Real::new(f64::NAN))),
            "inf" => return Ok(Data::Real(Real::new(f64::INFINITY))),
            "-inf" => return Ok(Data::Real(Real::new(f64::NEG_INFINITY))),
            _ => {}
        }
        // Timestamps are the only tokens with a date-time separator.
        if token.contains('T') && token.ends_with('Z') {
            return token.parse().map(Data::Time);
        }
        if token.contains('/') {
            return token.parse().map(Data::Subnet);
        }
        if let Ok(addr) = token.parse() {
            return Ok(Data::Address(addr));
        }
        let (sign, digits) = match token.strip_prefix(['+', '-']) {
            Some(rest) => (true, rest),
            None => (false, token),
        };
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            return if sign {
                token
                    .parse::<i64>()
                    .map(Data::Integer)
                    .map_err(|_| Error::parse(format!("integer out of range: {token}")))
            } else {
                token
                    .parse::<u64>()
                    .map(Data::Count)
                    .map_err(|_| Error::parse(format!("count out of range: {token}")))
            };
        }
        if token.contains(['.', 'e', 'E']) {
            if let Ok(real) = token.parse::<f64>() {
                return Ok(Data::Real(Real::new(real)));
            }
        }
        if let Ok(duration) = token.parse() {
            return Ok(Data::Duration(duration));
        }
        Err(Error::parse(format!("not a value: {token}")))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::super::to_text::ToText;
    use super::super::{Address, Duration, Pattern, Subnet, Timestamp};
    use super::*;

    #[track_caller]
    fn round_trip(data: Data) {
        assert_eq!(from_text(&data.to_text()).unwrap(), data);
    }

    #[test]
    fn test_scalar_round_trips() {
        round_trip(Data::Nil);
        round_trip(Data::Bool(true));
        round_trip(Data::Integer(-7));
        round_trip(Data::Integer(7));
        round_trip(Data::Count(u64::MAX));
        round_trip(Data::Real(0.1.into()));
        round_trip(Data::Real(f64::NAN.into()));
        round_trip(Data::Str("hello \"world\"\n\u{1f980}".into()));
        round_trip(Data::Pattern(Pattern::new(r"\d+/\w+").unwrap()));
        round_trip(Data::Address("147.32.84.165".parse::<Address>().unwrap()));
        round_trip(Data::Address("2001:db8::1".parse::<Address>().unwrap()));
        round_trip(Data::Subnet("10.0.0.0/8".parse::<Subnet>().unwrap()));
        round_trip(Data::Time(
            "2011-08-12T13:00:36.349948Z".parse::<Timestamp>().unwrap(),
        ));
        round_trip(Data::Duration(Duration::from_nanos(1_500_000_000)));
        round_trip(Data::Enum(7));
    }

    #[test]
    fn test_container_round_trips() {
        round_trip(Data::List(vec![]));
        round_trip(Data::List(vec![
            Data::Count(1),
            Data::Nil,
            Data::Str("x, y".into()),
        ]));
        round_trip(Data::Map(vec![
            (Data::Str("a".into()), Data::Count(1)),
            (Data::Count(2), Data::List(vec![Data::Bool(false)])),
        ]));
        round_trip(Data::Record(vec![
            ("ts".into(), Data::Time(Timestamp::from_nanos(1))),
            (
                "id".into(),
                Data::Record(vec![(
                    "orig_h".into(),
                    Data::Address("10.0.0.1".parse::<Address>().unwrap()),
                )]),
            ),
        ]));
    }

    #[test]
    fn test_parse_errors() {
        assert!(from_text("").is_err());
        assert!(from_text("[1, 2").is_err());
        assert!(from_text("freeform text").is_err());
        assert!(from_text("1 2").is_err());
        assert!(from_text("{1 => 2}").is_err());
    }

    #[test]
    fn test_random_count_integer_round_trip() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        for _ in 0..256 {
            round_trip(Data::Count(rng.gen()));
            round_trip(Data::Integer(rng.gen()));
            round_trip(Data::Real(rng.gen::<f64>().into()));
            round_trip(Data::Duration(Duration::from_nanos(rng.gen())));
        }
    }
}
