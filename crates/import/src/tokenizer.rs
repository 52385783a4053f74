use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveTime};
use mledger_core::{Money, ParseWarning};
use regex::Regex;

use crate::config::ParserConfig;
use crate::util::KeywordSet;

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_anchor_iso,
    r"^(?P<receipt>[A-Z0-9]+)\s+(?P<date>\d{4}-\d{2}-\d{2})[\sT]+(?P<time>\d{1,2}:\d{2}(?::\d{2})?)(?:\s+(?P<rest>.*))?$");
re!(re_anchor_dmy_slash,
    r"^(?P<receipt>[A-Z0-9]+)\s+(?P<date>\d{1,2}/\d{1,2}/\d{4})\s+(?P<time>\d{1,2}:\d{2}(?::\d{2})?)(?:\s+(?P<rest>.*))?$");
re!(re_anchor_dmy_dash,
    r"^(?P<receipt>[A-Z0-9]+)\s+(?P<date>\d{1,2}-\d{1,2}-\d{4})\s+(?P<time>\d{1,2}:\d{2}(?::\d{2})?)(?:\s+(?P<rest>.*))?$");
re!(re_amount,
    r"^\(?(?:Ksh|KSh|KSH|KES|Kes)?\.?-?(?:\d{1,3}(?:,\d{3}){1,4}|\d{1,15})\.\d{2}\)?$");

// ── Anchor matching ───────────────────────────────────────────────────────────

/// Receipt id and timestamp opening a transaction block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub receipt_id: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    /// Text after the timestamp on the anchor line.
    pub rest: String,
}

/// One way statements print the receipt/timestamp marker.
struct AnchorPattern {
    regex: fn() -> &'static Regex,
    date_format: &'static str,
}

/// Evaluated in order; first match wins.
const ANCHOR_PATTERNS: &[AnchorPattern] = &[
    AnchorPattern { regex: re_anchor_iso, date_format: "%Y-%m-%d" },
    AnchorPattern { regex: re_anchor_dmy_slash, date_format: "%d/%m/%Y" },
    AnchorPattern { regex: re_anchor_dmy_dash, date_format: "%d-%m-%Y" },
];

impl AnchorPattern {
    fn try_match(&self, line: &str, min_receipt_len: usize) -> Option<Anchor> {
        let c = (self.regex)().captures(line)?;
        let receipt = c.name("receipt")?.as_str();
        if receipt.len() < min_receipt_len || !receipt.chars().any(|ch| ch.is_ascii_alphabetic()) {
            return None;
        }
        let date = NaiveDate::parse_from_str(c.name("date")?.as_str(), self.date_format).ok()?;
        let time = parse_time(c.name("time")?.as_str())?;
        Some(Anchor {
            receipt_id: receipt.to_string(),
            date,
            time,
            rest: c.name("rest").map(|m| m.as_str().to_string()).unwrap_or_default(),
        })
    }
}

pub fn match_anchor(line: &str, min_receipt_len: usize) -> Option<Anchor> {
    ANCHOR_PATTERNS
        .iter()
        .find_map(|p| p.try_match(line, min_receipt_len))
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

/// A whitespace-separated word that is a two-decimal amount.
pub fn decimal_token(word: &str) -> Option<Money> {
    let word = word.trim_end_matches([';', ':']);
    if !re_amount().is_match(word) {
        return None;
    }
    Money::parse(word)
}

fn decimal_tokens(text: &str) -> impl Iterator<Item = Money> + '_ {
    text.split_whitespace().filter_map(decimal_token)
}

// ── Blocks ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionBlock {
    pub receipt_id: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub description: String,
    /// Amounts in reading order across the whole block.
    pub tokens: Vec<Money>,
    /// Discovery order within the document.
    pub sequence: usize,
}

struct BlockBuilder {
    receipt_id: String,
    date: NaiveDate,
    time: NaiveTime,
    words: Vec<String>,
    tokens: Vec<Money>,
    sequence: usize,
}

impl BlockBuilder {
    fn new(anchor: &Anchor, sequence: usize) -> Self {
        Self {
            receipt_id: anchor.receipt_id.clone(),
            date: anchor.date,
            time: anchor.time,
            words: vec![],
            tokens: vec![],
            sequence,
        }
    }

    fn push(&mut self, text: &str, terminal: &KeywordSet) {
        for word in text.split_whitespace() {
            match decimal_token(word) {
                Some(amount) => self.tokens.push(amount),
                None if terminal.is_match(word) => {}
                None => self.words.push(word.to_string()),
            }
        }
    }

    fn build(self) -> TransactionBlock {
        TransactionBlock {
            receipt_id: self.receipt_id,
            date: self.date,
            time: self.time,
            description: self.words.join(" "),
            tokens: self.tokens,
            sequence: self.sequence,
        }
    }
}

#[derive(Debug, Default)]
pub struct Tokenized {
    pub blocks: Vec<TransactionBlock>,
    pub warnings: Vec<ParseWarning>,
}

impl Tokenized {
    pub fn discarded(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, ParseWarning::BlockDiscarded { .. }))
            .count()
    }
}

pub struct RecordTokenizer {
    min_receipt_len: usize,
    terminal: KeywordSet,
    charge: KeywordSet,
}

impl RecordTokenizer {
    pub fn new(config: &ParserConfig) -> Self {
        Self {
            min_receipt_len: config.min_receipt_len,
            terminal: KeywordSet::new(&config.terminal_keywords),
            charge: KeywordSet::new(&config.charge_keywords),
        }
    }

    /// A follow-up row carrying its own charge amount and balance.
    fn is_charge_row(&self, line: &str) -> bool {
        self.charge.is_match(line) && decimal_tokens(line).count() >= 2
    }

    /// Group lines into blocks, one per receipt-id/timestamp anchor.
    pub fn tokenize<'l, I>(&self, lines: I) -> Tokenized
    where
        I: IntoIterator<Item = &'l str>,
    {
        let mut out = Tokenized::default();
        let mut open: Option<BlockBuilder> = None;
        // Anchor of the most recent block, for charge rows printed beneath it.
        let mut last_anchor: Option<Anchor> = None;
        let mut sequence = 0usize;

        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(anchor) = match_anchor(line, self.min_receipt_len) {
                if let Some(b) = open.take() {
                    self.finish(b, &mut out);
                }
                let mut b = BlockBuilder::new(&anchor, sequence);
                sequence += 1;
                b.push(&anchor.rest, &self.terminal);
                if self.terminal.is_match(&anchor.rest) {
                    self.finish(b, &mut out);
                } else {
                    open = Some(b);
                }
                last_anchor = Some(anchor);
                continue;
            }

            // The current block already has its amounts: a charge row with its own
            // amounts belongs to a sibling record under the same receipt.
            let block_complete = match &open {
                Some(b) => b.tokens.len() >= 2,
                None => true,
            };
            if block_complete && self.is_charge_row(line) {
                if let Some(anchor) = &last_anchor {
                    if let Some(b) = open.take() {
                        self.finish(b, &mut out);
                    }
                    let mut sibling = BlockBuilder::new(anchor, sequence);
                    sequence += 1;
                    sibling.push(line, &self.terminal);
                    self.finish(sibling, &mut out);
                    continue;
                }
            }

            match open.as_mut() {
                Some(b) => {
                    b.push(line, &self.terminal);
                    if self.terminal.is_match(line) {
                        if let Some(b) = open.take() {
                            self.finish(b, &mut out);
                        }
                    }
                }
                None => {
                    // Header, footer or summary text between records.
                    last_anchor = None;
                }
            }
        }

        if let Some(b) = open.take() {
            self.finish(b, &mut out);
        }
        out
    }

    fn finish(&self, b: BlockBuilder, out: &mut Tokenized) {
        if b.tokens.len() < 2 {
            tracing::debug!(
                receipt = %b.receipt_id,
                tokens = b.tokens.len(),
                "discarding block without amount and balance"
            );
            out.warnings.push(ParseWarning::BlockDiscarded {
                receipt_id: b.receipt_id.clone(),
                tokens: b.tokens.len(),
            });
            return;
        }
        out.blocks.push(b.build());
    }
}
