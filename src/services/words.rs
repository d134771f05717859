//! Custom-word rewriting of release names
//!
//! Words are applied in id order before a name is parsed. Each word either
//! removes text, substitutes text, or shifts the episode numbers found
//! between two anchors.

use anyhow::Result;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::db::custom_words::ANY_SEASON;
use crate::db::{CustomWordRecord, Database, WordKind};

static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid regex"));

/// Result of rewriting one name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WordsOutcome {
    pub title: String,
    pub ignored: Vec<String>,
    pub replaced: Vec<String>,
    pub offset: Vec<String>,
}

struct CompiledWord {
    kind: WordKind,
    season: i64,
    pattern: Option<Regex>,
    replace: String,
    front: Option<Regex>,
    back: Option<Regex>,
    offset: String,
    record: CustomWordRecord,
}

fn compile(pattern: &str, regex: bool) -> Result<Option<Regex>, regex::Error> {
    if pattern.is_empty() {
        return Ok(None);
    }
    let source = if regex {
        pattern.to_string()
    } else {
        regex::escape(pattern)
    };
    Regex::new(&source).map(Some)
}

impl CompiledWord {
    fn new(record: CustomWordRecord) -> Option<Self> {
        let kind = record.word_kind()?;
        let build = || -> Result<Self, regex::Error> {
            Ok(Self {
                kind,
                season: record.season,
                pattern: compile(&record.replaced, record.regex)?,
                replace: record.replace.clone(),
                front: compile(&record.front, record.regex)?,
                back: compile(&record.back, record.regex)?,
                offset: record.offset.clone(),
                record: record.clone(),
            })
        };
        match build() {
            Ok(word) => Some(word),
            Err(e) => {
                warn!(word_id = record.id, error = %e, "Skipping custom word with invalid pattern");
                None
            }
        }
    }

    fn applies_to(&self, season: Option<i64>) -> bool {
        if self.season < 0 || self.season == ANY_SEASON {
            return true;
        }
        season == Some(self.season)
    }
}

/// Cached enabled words
#[derive(Default)]
pub struct WordsEngine {
    words: RwLock<Vec<CompiledWord>>,
}

impl WordsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine over a fixed word list
    pub fn with_words(records: Vec<CustomWordRecord>) -> Self {
        let engine = Self::new();
        engine.set_words(records);
        engine
    }

    fn set_words(&self, records: Vec<CustomWordRecord>) -> usize {
        let compiled: Vec<CompiledWord> = records.into_iter().filter_map(CompiledWord::new).collect();
        let count = compiled.len();
        *self.words.write() = compiled;
        count
    }

    /// Reload every enabled word from the database
    pub async fn reload(&self, db: &Database) -> Result<usize> {
        let records = db.custom_words().list_enabled().await?;
        let count = self.set_words(records);
        debug!(count, "Custom words loaded");
        Ok(count)
    }

    /// Rewrite `title` with every word that applies to `season`
    pub fn process(&self, title: &str, season: Option<i64>) -> WordsOutcome {
        let mut outcome = WordsOutcome {
            title: title.to_string(),
            ..Default::default()
        };

        for word in self.words.read().iter().filter(|w| w.applies_to(season)) {
            match word.kind {
                WordKind::Block => {
                    if let Some(pattern) = &word.pattern
                        && pattern.is_match(&outcome.title)
                    {
                        outcome.title = pattern.replace_all(&outcome.title, "").into_owned();
                        outcome.ignored.push(word.record.replaced.clone());
                    }
                }
                WordKind::Replace => {
                    if let Some(pattern) = &word.pattern
                        && pattern.is_match(&outcome.title)
                    {
                        outcome.title = pattern
                            .replace_all(&outcome.title, word.replace.as_str())
                            .into_owned();
                        outcome
                            .replaced
                            .push(format!("{}@{}", word.record.replaced, word.replace));
                    }
                }
                WordKind::ReplaceOffset => {
                    let Some(pattern) = &word.pattern else { continue };
                    if !pattern.is_match(&outcome.title) {
                        continue;
                    }
                    outcome.title = pattern
                        .replace_all(&outcome.title, word.replace.as_str())
                        .into_owned();
                    outcome
                        .replaced
                        .push(format!("{}@{}", word.record.replaced, word.replace));
                    if let Some(shifted) = apply_offset(&outcome.title, word) {
                        outcome.title = shifted;
                        outcome.offset.push(offset_label(word));
                    }
                }
                WordKind::Offset => {
                    if let Some(shifted) = apply_offset(&outcome.title, word) {
                        outcome.title = shifted;
                        outcome.offset.push(offset_label(word));
                    }
                }
            }
        }

        outcome.title = outcome.title.trim().to_string();
        outcome
    }

    pub fn len(&self) -> usize {
        self.words.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.read().is_empty()
    }
}

fn offset_label(word: &CompiledWord) -> String {
    format!("{}@{}@{}", word.record.front, word.record.back, word.offset)
}

/// Shift the digit runs between the first FRONT match and the last BACK match.
/// `None` when an anchor is missing or nothing changed.
fn apply_offset(title: &str, word: &CompiledWord) -> Option<String> {
    if word.front.is_none() && word.back.is_none() {
        return None;
    }

    let start = match &word.front {
        Some(front) => front.find(title)?.end(),
        None => 0,
    };
    let end = match &word.back {
        Some(back) => back.find_iter(title).last()?.start(),
        None => title.len(),
    };
    if start > end {
        return None;
    }

    let region = &title[start..end];
    let mut failed = false;
    let shifted = DIGITS.replace_all(region, |caps: &regex::Captures| {
        let digits = &caps[0];
        let Ok(ep) = digits.parse::<i64>() else {
            failed = true;
            return digits.to_string();
        };
        match eval_offset(&word.offset, ep) {
            Some(value) if value >= 0 => format!("{:0width$}", value, width = digits.len()),
            _ => {
                failed = true;
                digits.to_string()
            }
        }
    });
    if failed || shifted == region {
        return None;
    }
    Some(format!("{}{}{}", &title[..start], shifted, &title[end..]))
}

/// An offset expression is `EP` combined with integers and `+ - * /`
pub fn validate_offset(expr: &str) -> bool {
    let compact: String = expr.chars().filter(|c| !c.is_whitespace()).collect();
    if !compact.contains("EP") {
        return false;
    }
    compact
        .replace("EP", "")
        .chars()
        .all(|c| c.is_ascii_digit() || "+-*/".contains(c))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(f64),
    Op(char),
}

fn tokenize(expr: &str, ep: i64) -> Option<Vec<Token>> {
    let compact: String = expr.chars().filter(|c| !c.is_whitespace()).collect();
    let compact = compact.replace("EP", &format!("({})", ep));
    let mut tokens = Vec::new();
    let mut chars = compact.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            let mut n = 0f64;
            while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
                n = n * 10.0 + d as f64;
                chars.next();
            }
            tokens.push(Token::Num(n));
        } else if "+-*/()".contains(c) {
            tokens.push(Token::Op(c));
            chars.next();
        } else {
            return None;
        }
    }
    Some(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn expr(&mut self) -> Option<f64> {
        let mut value = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Some(value)
    }

    fn term(&mut self) -> Option<f64> {
        let mut value = self.factor()?;
        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek() {
            self.pos += 1;
            let rhs = self.factor()?;
            value = if op == '*' {
                value * rhs
            } else if rhs == 0.0 {
                return None;
            } else {
                value / rhs
            };
        }
        Some(value)
    }

    fn factor(&mut self) -> Option<f64> {
        match self.peek()? {
            Token::Num(n) => {
                self.pos += 1;
                Some(n)
            }
            Token::Op('-') => {
                self.pos += 1;
                self.factor().map(|v| -v)
            }
            Token::Op('(') => {
                self.pos += 1;
                let value = self.expr()?;
                (self.peek()? == Token::Op(')')).then_some(())?;
                self.pos += 1;
                Some(value)
            }
            Token::Op(_) => None,
        }
    }
}

/// Evaluate an offset expression for episode `ep`, truncated toward zero
pub fn eval_offset(expr: &str, ep: i64) -> Option<i64> {
    if !validate_offset(expr) {
        return None;
    }
    let mut parser = Parser {
        tokens: tokenize(expr, ep)?,
        pos: 0,
    };
    let value = parser.expr()?;
    if parser.pos != parser.tokens.len() || !value.is_finite() {
        return None;
    }
    Some(value.trunc() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::custom_words::GENERAL_GROUP_ID;
    use pretty_assertions::assert_eq;

    fn word(id: i64, kind: WordKind, replaced: &str, replace: &str, front: &str, back: &str, offset: &str) -> CustomWordRecord {
        CustomWordRecord {
            id,
            replaced: replaced.to_string(),
            replace: replace.to_string(),
            front: front.to_string(),
            back: back.to_string(),
            offset: offset.to_string(),
            kind: kind.code(),
            group_id: GENERAL_GROUP_ID,
            season: ANY_SEASON,
            enabled: true,
            regex: true,
            help: String::new(),
            note: String::new(),
        }
    }

    #[test]
    fn test_block_and_replace() {
        let engine = WordsEngine::with_words(vec![
            word(1, WordKind::Block, r"\[?WEB-?DL\]?", "", "", "", ""),
            word(2, WordKind::Replace, "Shingeki no Kyojin", "Attack on Titan", "", "", ""),
        ]);
        let outcome = engine.process("Shingeki no Kyojin S04E01 [WEB-DL] 1080p", None);
        assert_eq!(outcome.title, "Attack on Titan S04E01  1080p");
        assert_eq!(outcome.ignored, vec![r"\[?WEB-?DL\]?"]);
        assert_eq!(outcome.replaced, vec!["Shingeki no Kyojin@Attack on Titan"]);
    }

    #[test]
    fn test_literal_word_is_escaped() {
        let mut w = word(1, WordKind::Block, "[HD]", "", "", "", "");
        w.regex = false;
        let engine = WordsEngine::with_words(vec![w]);
        assert_eq!(engine.process("Movie H [HD] 2020", None).title, "Movie H  2020");
    }

    #[test]
    fn test_offset_keeps_padding() {
        let engine = WordsEngine::with_words(vec![word(1, WordKind::Offset, "", "", r"\[", r"\]", "EP-12")]);
        let outcome = engine.process("[Group] Show [13][1080p]", None);
        assert_eq!(outcome.title, "[Group] Show [01][1080p]");
        assert_eq!(outcome.offset, vec![r"\[@\]@EP-12"]);
    }

    #[test]
    fn test_offset_requires_both_anchors() {
        let engine = WordsEngine::with_words(vec![word(1, WordKind::Offset, "", "", "Show ", " END", "EP+1")]);
        let outcome = engine.process("Show 05 1080p", None);
        assert_eq!(outcome.title, "Show 05 1080p");
        assert!(outcome.offset.is_empty());
    }

    #[test]
    fn test_replace_then_offset() {
        let engine = WordsEngine::with_words(vec![word(
            1,
            WordKind::ReplaceOffset,
            "Part2",
            "S01",
            "E",
            " ",
            "EP+12",
        )]);
        assert_eq!(engine.process("Show Part2 E03 720p", None).title, "Show S01 E15 720p");
    }

    #[test]
    fn test_season_scoped_word() {
        let mut w = word(1, WordKind::Replace, "Show", "Other", "", "", "");
        w.season = 2;
        let engine = WordsEngine::with_words(vec![w]);
        assert_eq!(engine.process("Show E01", Some(1)).title, "Show E01");
        assert_eq!(engine.process("Show E01", Some(2)).title, "Other E01");
        assert_eq!(engine.process("Show E01", None).title, "Show E01");
    }

    #[test]
    fn test_invalid_regex_is_skipped() {
        let engine = WordsEngine::with_words(vec![
            word(1, WordKind::Block, "(unclosed", "", "", "", ""),
            word(2, WordKind::Block, "x264", "", "", "", ""),
        ]);
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.process("Film x264", None).title, "Film");
    }

    #[test]
    fn test_eval_offset_precedence() {
        assert_eq!(eval_offset("EP*2-1", 5), Some(9));
        assert_eq!(eval_offset("EP-1*2", 5), Some(3));
        assert_eq!(eval_offset("EP/2", 5), Some(2));
        assert_eq!(eval_offset("EP / 0", 5), None);
        assert_eq!(eval_offset("12", 5), None);
    }

    #[test]
    fn test_validate_offset() {
        assert!(validate_offset("EP+1"));
        assert!(validate_offset("EP * 2 - 24"));
        assert!(!validate_offset("EP+x"));
        assert!(!validate_offset("1+2"));
    }
}
