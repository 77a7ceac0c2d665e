//! Splits option source text into tokens.

use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use crate::error::OptionsError;
use crate::value::Value;

/// Single-character punctuation.
const PUNCTUATORS: &str = "[],():";
/// Punctuation that may also appear doubled (`--`, `{{`, `}}`).
const DOUBLE_PUNCTUATORS: &str = "-{}";
/// Characters allowed in symbols besides letters and digits.
const SYMBOL_EXTRA_CHARS: &str = "_-/.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    /// A number, string, symbol or reserved word.
    Value(Value),
    Punctuation(&'static str),
    End,
}

impl Token {
    pub(crate) fn is_punctuation(&self, value: &str) -> bool {
        matches!(self, Token::Punctuation(p) if *p == value)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Value(value) => write!(f, "{}", super::DisplayValue(value)),
            Token::Punctuation(p) => f.write_str(p),
            Token::End => f.write_str("end of input"),
        }
    }
}

fn is_symbol(c: char) -> bool {
    c.is_alphanumeric() || SYMBOL_EXTRA_CHARS.contains(c)
}

/// Static spelling of a punctuation character, single or doubled.
fn punctuation(c: char, doubled: bool) -> &'static str {
    match (c, doubled) {
        ('[', _) => "[",
        (']', _) => "]",
        (',', _) => ",",
        ('(', _) => "(",
        (')', _) => ")",
        (':', _) => ":",
        ('-', false) => "-",
        ('-', true) => "--",
        ('{', false) => "{",
        ('{', true) => "{{",
        ('}', false) => "}",
        (_, _) => "}}",
    }
}

struct Tokenizer<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Tokenizer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
        }
    }

    fn skip_whitespace(&mut self) {
        while self.chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}
    }

    /// Byte offset of the current character, or the end of input.
    fn offset(&mut self) -> usize {
        self.chars
            .peek()
            .map(|&(i, _)| i)
            .unwrap_or(self.source.len())
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.offset();
        while self.chars.next_if(|&(_, c)| pred(c)).is_some() {}
        let end = self.offset();
        &self.source[start..end]
    }

    fn next_token(&mut self) -> Result<Option<Token>, OptionsError> {
        self.skip_whitespace();
        let Some(&(_, c)) = self.chars.peek() else {
            return Ok(None);
        };
        let token = if c.is_ascii_digit() {
            let digits = self.take_while(|c| c.is_ascii_digit());
            let n = digits
                .parse::<i32>()
                .map_err(|_| OptionsError::Syntax(digits.to_string()))?;
            Token::Value(Value::Int(n))
        } else if c == '"' {
            self.chars.next();
            let contents = self.take_while(|c| c != '"');
            if self.chars.next().is_none() {
                return Err(OptionsError::UnterminatedString);
            }
            Token::Value(Value::str(contents))
        } else if PUNCTUATORS.contains(c) {
            self.chars.next();
            Token::Punctuation(punctuation(c, false))
        } else if DOUBLE_PUNCTUATORS.contains(c) {
            self.chars.next();
            let doubled = self.chars.next_if(|&(_, next)| next == c).is_some();
            Token::Punctuation(punctuation(c, doubled))
        } else if is_symbol(c) {
            Token::Value(match self.take_while(is_symbol) {
                "null" => Value::Null,
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                symbol => Value::str(symbol),
            })
        } else {
            return Err(OptionsError::Syntax(c.to_string()));
        };
        Ok(Some(token))
    }
}

/// Tokenizes each argument separately and terminates the result with
/// [`Token::End`].
pub(crate) fn tokenize<I, S>(args: I) -> Result<Vec<Token>, OptionsError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut tokens = Vec::new();
    for arg in args {
        let mut tokenizer = Tokenizer::new(arg.as_ref());
        while let Some(token) = tokenizer.next_token()? {
            tokens.push(token);
        }
    }
    tokens.push(Token::End);
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(args: &[&str]) -> Vec<Token> {
        tokenize(args).unwrap()
    }

    #[test]
    fn test_flag_and_symbol() {
        assert_eq!(
            values(&["--out build/x.bin"]),
            vec![
                Token::Punctuation("--"),
                Token::Value(Value::str("out")),
                Token::Value(Value::str("build/x.bin")),
                Token::End,
            ]
        );
    }

    #[test]
    fn test_symbol_keeps_inner_dashes() {
        assert_eq!(
            values(&["a-b_c"]),
            vec![Token::Value(Value::str("a-b_c")), Token::End]
        );
    }

    #[test]
    fn test_numbers_and_reserved_words() {
        assert_eq!(
            values(&["12 null true false"]),
            vec![
                Token::Value(Value::Int(12)),
                Token::Value(Value::Null),
                Token::Value(Value::Bool(true)),
                Token::Value(Value::Bool(false)),
                Token::End,
            ]
        );
    }

    #[test]
    fn test_string_keeps_spaces() {
        assert_eq!(
            values(&["\"a b\""]),
            vec![Token::Value(Value::str("a b")), Token::End]
        );
    }

    #[test]
    fn test_doubled_punctuation() {
        assert_eq!(
            values(&["{{ { } }}-"]),
            vec![
                Token::Punctuation("{{"),
                Token::Punctuation("{"),
                Token::Punctuation("}"),
                Token::Punctuation("}}"),
                Token::Punctuation("-"),
                Token::End,
            ]
        );
    }

    #[test]
    fn test_arguments_tokenized_separately() {
        // A `-` at the end of one argument does not pair with the next.
        assert_eq!(
            values(&["-", "-"]),
            vec![Token::Punctuation("-"), Token::Punctuation("-"), Token::End]
        );
    }

    #[test]
    fn test_errors() {
        assert_eq!(tokenize(["\"open"]), Err(OptionsError::UnterminatedString));
        assert_eq!(tokenize(["a ; b"]), Err(OptionsError::Syntax(";".to_string())));
        assert_eq!(
            tokenize(["99999999999"]),
            Err(OptionsError::Syntax("99999999999".to_string()))
        );
    }
}
