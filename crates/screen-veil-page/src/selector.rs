//! CSS selector subset used by mask rules.
//!
//! Supported grammar: type selectors (`div`, `*`), `#id`, `.class`,
//! `:nth-of-type(n)`, the child (`>`) and descendant (whitespace)
//! combinators, and selector lists separated by `,`. Anything else fails to
//! parse, mirroring how a browser rejects a selector it cannot read.

use thiserror::Error;

/// Parsed selector list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList {
    pub(crate) selectors: Vec<ComplexSelector>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ComplexSelector {
    /// Compounds left to right.
    pub(crate) compounds: Vec<Compound>,
    /// `combinators[i]` joins `compounds[i]` and `compounds[i + 1]`.
    pub(crate) combinators: Vec<Combinator>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Compound {
    pub(crate) tag: Option<String>,
    pub(crate) id: Option<String>,
    pub(crate) classes: Vec<String>,
    pub(crate) nth_of_type: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Combinator {
    Child,
    Descendant,
}

/// Selector syntax error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid selector {selector:?} at byte {position}: {reason}")]
pub struct SelectorError {
    /// Offending selector text.
    pub selector: String,
    /// Byte offset where parsing stopped.
    pub position: usize,
    /// Short description of the violation.
    pub reason: &'static str,
}

impl SelectorList {
    /// Parses selector text.
    ///
    /// # Errors
    /// Returns [`SelectorError`] for empty input, unsupported syntax, or
    /// malformed identifiers (for example an id starting with a digit).
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        Parser::new(input).parse_list()
    }
}

struct Parser<'a> {
    input: &'a str,
    chars: Vec<(usize, char)>,
    cursor: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().collect(),
            cursor: 0,
        }
    }

    fn error(&self, reason: &'static str) -> SelectorError {
        let position = self
            .chars
            .get(self.cursor)
            .map(|(offset, _)| *offset)
            .unwrap_or(self.input.len());
        SelectorError {
            selector: self.input.to_string(),
            position,
            reason,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.cursor).map(|(_, ch)| *ch)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.cursor += 1;
        Some(ch)
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.cursor;
        while self.peek().is_some_and(char::is_whitespace) {
            self.cursor += 1;
        }
        self.cursor > start
    }

    fn parse_list(mut self) -> Result<SelectorList, SelectorError> {
        let mut selectors = Vec::new();
        loop {
            self.skip_whitespace();
            selectors.push(self.parse_complex()?);
            match self.peek() {
                None => break,
                Some(',') => {
                    self.cursor += 1;
                }
                Some(_) => return Err(self.error("unexpected character")),
            }
        }
        Ok(SelectorList { selectors })
    }

    fn parse_complex(&mut self) -> Result<ComplexSelector, SelectorError> {
        let mut compounds = vec![self.parse_compound()?];
        let mut combinators = Vec::new();

        loop {
            let had_space = self.skip_whitespace();
            match self.peek() {
                None | Some(',') => break,
                Some('>') => {
                    self.cursor += 1;
                    self.skip_whitespace();
                    combinators.push(Combinator::Child);
                }
                Some(_) if had_space => combinators.push(Combinator::Descendant),
                Some(_) => return Err(self.error("unexpected character")),
            }
            compounds.push(self.parse_compound()?);
        }

        Ok(ComplexSelector {
            compounds,
            combinators,
        })
    }

    fn parse_compound(&mut self) -> Result<Compound, SelectorError> {
        let mut compound = Compound::default();
        let mut matched_any = false;

        match self.peek() {
            Some('*') => {
                self.cursor += 1;
                matched_any = true;
            }
            Some(ch) if is_ident_start(ch) => {
                compound.tag = Some(self.parse_ident()?.to_ascii_lowercase());
                matched_any = true;
            }
            _ => {}
        }

        loop {
            match self.peek() {
                Some('#') => {
                    self.cursor += 1;
                    if compound.id.is_some() {
                        return Err(self.error("duplicate id in compound selector"));
                    }
                    compound.id = Some(self.parse_ident()?);
                }
                Some('.') => {
                    self.cursor += 1;
                    compound.classes.push(self.parse_ident()?);
                }
                Some(':') => {
                    self.cursor += 1;
                    compound.nth_of_type = Some(self.parse_nth_of_type()?);
                }
                _ => break,
            }
            matched_any = true;
        }

        if !matched_any {
            return Err(self.error("expected a selector"));
        }
        Ok(compound)
    }

    fn parse_ident(&mut self) -> Result<String, SelectorError> {
        let start = self.cursor;
        match self.peek() {
            Some('-') => {
                // `-` may only lead an identifier when not followed by a digit.
                if self
                    .chars
                    .get(self.cursor + 1)
                    .is_none_or(|(_, next)| next.is_ascii_digit())
                {
                    return Err(self.error("invalid identifier"));
                }
            }
            Some(ch) if is_ident_start(ch) => {}
            Some(ch) if ch.is_ascii_digit() => {
                return Err(self.error("identifier cannot start with a digit"));
            }
            _ => return Err(self.error("expected an identifier")),
        }

        while self.peek().is_some_and(is_ident_char) {
            self.cursor += 1;
        }

        Ok(self.chars[start..self.cursor].iter().map(|(_, ch)| *ch).collect())
    }

    fn parse_nth_of_type(&mut self) -> Result<usize, SelectorError> {
        let name = self.parse_ident()?;
        if name != "nth-of-type" {
            return Err(self.error("unsupported pseudo-class"));
        }
        if self.bump() != Some('(') {
            return Err(self.error("expected '('"));
        }
        self.skip_whitespace();

        let start = self.cursor;
        while self.peek().is_some_and(|ch| ch.is_ascii_digit()) {
            self.cursor += 1;
        }
        if start == self.cursor {
            return Err(self.error("expected an index"));
        }
        let digits: String = self.chars[start..self.cursor].iter().map(|(_, ch)| *ch).collect();
        let index = digits
            .parse()
            .map_err(|_| self.error("index out of range"))?;

        self.skip_whitespace();
        if self.bump() != Some(')') {
            return Err(self.error("expected ')'"));
        }
        Ok(index)
    }
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || ch == '-' || !ch.is_ascii()
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' || !ch.is_ascii()
}
