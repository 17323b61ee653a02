//! Rule text parser.
//!
//! Recursive descent parser for the rule grammar. Converts text to a typed
//! [`RuleSpec`] tree with error messages carrying the character offset.
//!
//! ```text
//! rule   := leaf | all_of(rule, ...) | any_of(rule, ...)
//! leaf   := crossover_level(ref, number, dir)
//!         | crossover_series(ref, ref, dir)
//!         | threshold(ref, op, number)
//!         | direction(ref, int [, up|flat|down])
//!         | breakout_extreme(ref, int, dir)
//!         | streak_gate(ref, op, number, int)
//! ref    := ident '.' ident
//! op     := > | >= | < | <=
//! dir    := up | down | both
//! ```

use crate::domain::error::ParseError;
use crate::domain::rule::{Comparator, Direction, RuleSpec, Trend};
use crate::domain::series::SeriesRef;

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn error(&self, message: impl Into<String>, position: usize) -> ParseError {
        ParseError {
            message: message.into(),
            position,
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            Some(ch) => Err(self.error(
                format!("expected '{}', found '{}'", expected, ch),
                self.pos,
            )),
            None => Err(self.error(
                format!("expected '{}', found end of input", expected),
                self.pos,
            )),
        }
    }

    fn is_ident_char(ch: char) -> bool {
        ch.is_alphanumeric() || ch == '_'
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        let remaining = self.remaining();
        remaining.starts_with(keyword)
            && !remaining[keyword.len()..]
                .chars()
                .next()
                .is_some_and(Self::is_ident_char)
    }

    fn consume_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += keyword.len();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
        self.skip_whitespace();
        if self.consume_keyword(keyword) {
            Ok(())
        } else {
            let found = self.peek_word();
            Err(self.error(
                format!("expected '{}', found '{}'", keyword, found),
                self.pos,
            ))
        }
    }

    fn peek_word(&self) -> String {
        let word: String = self
            .remaining()
            .chars()
            .take_while(|&ch| Self::is_ident_char(ch))
            .collect();
        if word.is_empty() {
            self.peek()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "end of input".to_string())
        } else {
            word
        }
    }

    fn parse_ident(&mut self, what: &str) -> Result<String, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        while self.peek().is_some_and(Self::is_ident_char) {
            self.advance();
        }
        if self.pos == start {
            return Err(self.error(
                format!("expected {}, found '{}'", what, self.peek_word()),
                start,
            ));
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn parse_number(&mut self) -> Result<f64, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let mut has_dot = false;
        let mut digits = 0;

        if self.peek() == Some('-') {
            self.advance();
        }

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        if digits == 0 {
            return Err(self.error("expected number", start));
        }

        let num_str = &self.input[start..self.pos];
        num_str
            .parse::<f64>()
            .map_err(|_| self.error(format!("invalid number: {}", num_str), start))
    }

    /// Integer of at least 1: windows, lookbacks and streak lengths.
    fn parse_count(&mut self, what: &str) -> Result<usize, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        while self.peek().is_some_and(|ch| ch.is_ascii_digit()) {
            self.advance();
        }
        if self.pos == start {
            return Err(self.error(format!("expected integer {}", what), start));
        }
        let num_str = &self.input[start..self.pos];
        match num_str.parse::<usize>() {
            Ok(0) => Err(self.error(format!("{} must be at least 1", what), start)),
            Ok(v) => Ok(v),
            Err(_) => Err(self.error(format!("invalid integer: {}", num_str), start)),
        }
    }

    fn parse_ref(&mut self) -> Result<SeriesRef, ParseError> {
        let instance_id = self.parse_ident("series reference 'instance.series'")?;
        if self.peek() != Some('.') {
            return Err(self.error(
                format!("expected '.' after instance '{}'", instance_id),
                self.pos,
            ));
        }
        self.advance();
        let series_name = self.parse_ident("series name")?;
        Ok(SeriesRef {
            instance_id,
            series_name,
        })
    }

    fn parse_direction(&mut self) -> Result<Direction, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let word = self.parse_ident("direction (up, down, both)")?;
        match word.as_str() {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            "both" => Ok(Direction::Both),
            _ => Err(self.error(
                format!("expected direction (up, down, both), found '{}'", word),
                start,
            )),
        }
    }

    fn parse_trend(&mut self) -> Result<Trend, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let word = self.parse_ident("trend (up, flat, down)")?;
        match word.as_str() {
            "up" => Ok(Trend::Up),
            "flat" => Ok(Trend::Flat),
            "down" => Ok(Trend::Down),
            _ => Err(self.error(
                format!("expected trend (up, flat, down), found '{}'", word),
                start,
            )),
        }
    }

    fn parse_comparator(&mut self) -> Result<Comparator, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let op = match self.advance() {
            Some('>') => {
                if self.peek() == Some('=') {
                    self.advance();
                    Comparator::Ge
                } else {
                    Comparator::Gt
                }
            }
            Some('<') => {
                if self.peek() == Some('=') {
                    self.advance();
                    Comparator::Le
                } else {
                    Comparator::Lt
                }
            }
            _ => {
                self.pos = start;
                return Err(self.error(
                    format!(
                        "expected comparator (>, >=, <, <=), found '{}'",
                        self.peek_word()
                    ),
                    start,
                ));
            }
        };
        Ok(op)
    }

    fn parse_crossover_level(&mut self) -> Result<RuleSpec, ParseError> {
        self.expect_keyword("crossover_level")?;
        self.expect_char('(')?;
        let series = self.parse_ref()?;
        self.expect_char(',')?;
        let level = self.parse_number()?;
        self.expect_char(',')?;
        let direction = self.parse_direction()?;
        self.expect_char(')')?;
        Ok(RuleSpec::CrossoverLevel {
            series,
            level,
            direction,
        })
    }

    fn parse_crossover_series(&mut self) -> Result<RuleSpec, ParseError> {
        self.expect_keyword("crossover_series")?;
        self.expect_char('(')?;
        let left = self.parse_ref()?;
        self.expect_char(',')?;
        let right = self.parse_ref()?;
        self.expect_char(',')?;
        let direction = self.parse_direction()?;
        self.expect_char(')')?;
        Ok(RuleSpec::CrossoverSeries {
            left,
            right,
            direction,
        })
    }

    fn parse_threshold(&mut self) -> Result<RuleSpec, ParseError> {
        self.expect_keyword("threshold")?;
        self.expect_char('(')?;
        let series = self.parse_ref()?;
        self.expect_char(',')?;
        let op = self.parse_comparator()?;
        self.expect_char(',')?;
        let level = self.parse_number()?;
        self.expect_char(')')?;
        Ok(RuleSpec::Threshold { series, op, level })
    }

    fn parse_direction_rule(&mut self) -> Result<RuleSpec, ParseError> {
        self.expect_keyword("direction")?;
        self.expect_char('(')?;
        let series = self.parse_ref()?;
        self.expect_char(',')?;
        let lookback = self.parse_count("lookback")?;
        self.skip_whitespace();
        let only = if self.peek() == Some(',') {
            self.advance();
            Some(self.parse_trend()?)
        } else {
            None
        };
        self.expect_char(')')?;
        Ok(RuleSpec::Direction {
            series,
            lookback,
            only,
        })
    }

    fn parse_breakout(&mut self) -> Result<RuleSpec, ParseError> {
        self.expect_keyword("breakout_extreme")?;
        self.expect_char('(')?;
        let series = self.parse_ref()?;
        self.expect_char(',')?;
        let window = self.parse_count("window")?;
        self.expect_char(',')?;
        let direction = self.parse_direction()?;
        self.expect_char(')')?;
        Ok(RuleSpec::BreakoutExtreme {
            series,
            window,
            direction,
        })
    }

    fn parse_streak(&mut self) -> Result<RuleSpec, ParseError> {
        self.expect_keyword("streak_gate")?;
        self.expect_char('(')?;
        let series = self.parse_ref()?;
        self.expect_char(',')?;
        let op = self.parse_comparator()?;
        self.expect_char(',')?;
        let level = self.parse_number()?;
        self.expect_char(',')?;
        let min_consecutive = self.parse_count("min_consecutive")?;
        self.expect_char(')')?;
        Ok(RuleSpec::StreakGate {
            series,
            op,
            level,
            min_consecutive,
        })
    }

    fn parse_children(&mut self, keyword: &str) -> Result<Vec<RuleSpec>, ParseError> {
        self.expect_keyword(keyword)?;
        self.expect_char('(')?;

        let mut rules = vec![self.parse_rule()?];
        loop {
            self.skip_whitespace();
            if self.peek() == Some(')') {
                self.advance();
                break;
            }
            self.expect_char(',')?;
            rules.push(self.parse_rule()?);
        }
        Ok(rules)
    }

    fn parse_rule(&mut self) -> Result<RuleSpec, ParseError> {
        self.skip_whitespace();

        if self.peek_keyword("crossover_level") {
            return self.parse_crossover_level();
        }
        if self.peek_keyword("crossover_series") {
            return self.parse_crossover_series();
        }
        if self.peek_keyword("threshold") {
            return self.parse_threshold();
        }
        if self.peek_keyword("direction") {
            return self.parse_direction_rule();
        }
        if self.peek_keyword("breakout_extreme") {
            return self.parse_breakout();
        }
        if self.peek_keyword("streak_gate") {
            return self.parse_streak();
        }
        if self.peek_keyword("all_of") {
            return self.parse_children("all_of").map(RuleSpec::AllOf);
        }
        if self.peek_keyword("any_of") {
            return self.parse_children("any_of").map(RuleSpec::AnyOf);
        }

        let word = self.peek_word();
        Err(self.error(format!("expected rule, found '{}'", word), self.pos))
    }

    fn parse(&mut self) -> Result<RuleSpec, ParseError> {
        let rule = self.parse_rule()?;
        self.skip_whitespace();
        if self.pos < self.input.len() {
            return Err(self.error(
                format!("unexpected input after rule: '{}'", self.remaining()),
                self.pos,
            ));
        }
        Ok(rule)
    }
}

pub fn parse(input: &str) -> Result<RuleSpec, ParseError> {
    let mut parser = Parser::new(input);
    parser.parse()
}
