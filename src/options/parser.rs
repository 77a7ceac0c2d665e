//! Recursive-descent parser for option syntax.
//!
//! ```text
//! options      -> option*
//! option       -> map-entry | expression
//! expression   -> value | list | map | nested | "(" expression ")"
//! list         -> "[" expression* "]"
//! map          -> "{" map-entry* "}"
//! nested       -> "{{" options "}}"
//! map-entry    -> "--" expression expression?
//! ```

use super::tokenizer::Token;
use super::{Element, Options};
use crate::error::OptionsError;
use crate::value::{Map, ObjectRef, Value};

pub(crate) struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
}

impl Parser {
    /// `tokens` must end with [`Token::End`].
    pub(crate) fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, cursor: 0 }
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.cursor).unwrap_or(&Token::End)
    }

    fn advance(&mut self) {
        if self.cursor < self.tokens.len() {
            self.cursor += 1;
        }
    }

    fn has_more(&self) -> bool {
        *self.current() != Token::End
    }

    fn syntax_error(&self) -> OptionsError {
        OptionsError::Syntax(self.current().to_string())
    }

    fn expect_punctuation(&mut self, value: &str) -> Result<(), OptionsError> {
        if !self.current().is_punctuation(value) {
            return Err(self.syntax_error());
        }
        self.advance();
        Ok(())
    }

    /// Parses the whole token stream as one option set.
    pub(crate) fn parse_all(mut self) -> Result<Options, OptionsError> {
        let options = self.parse_options()?;
        if self.has_more() {
            return Err(self.syntax_error());
        }
        Ok(options)
    }

    fn parse_options(&mut self) -> Result<Options, OptionsError> {
        let mut options = Options::default();
        while self.has_more() && !self.current().is_punctuation("}}") {
            if self.current().is_punctuation("--") {
                let (key, value) = self.parse_map_entry()?;
                options.elements.push(Element::Flag { key, value });
            } else {
                let value = self.parse_expression()?;
                options.elements.push(Element::Argument(value));
            }
        }
        Ok(options)
    }

    fn at_expression(&self) -> bool {
        match self.current() {
            Token::Value(_) => true,
            Token::Punctuation(p) => matches!(*p, "[" | "{" | "(" | "{{"),
            Token::End => false,
        }
    }

    fn parse_expression(&mut self) -> Result<Value, OptionsError> {
        match self.current() {
            Token::Value(value) => {
                let value = value.clone();
                self.advance();
                Ok(value)
            }
            Token::Punctuation("[") => self.parse_list(),
            Token::Punctuation("{") => self.parse_map(),
            Token::Punctuation("{{") => {
                self.advance();
                let nested = self.parse_options()?;
                self.expect_punctuation("}}")?;
                Ok(Value::Object(ObjectRef::new(nested)))
            }
            Token::Punctuation("(") => {
                self.advance();
                let value = self.parse_expression()?;
                self.expect_punctuation(")")?;
                Ok(value)
            }
            _ => Err(self.syntax_error()),
        }
    }

    fn parse_list(&mut self) -> Result<Value, OptionsError> {
        self.expect_punctuation("[")?;
        let mut elements = Vec::new();
        while !self.current().is_punctuation("]") {
            elements.push(self.parse_expression()?);
        }
        self.advance();
        Ok(Value::Array(elements))
    }

    fn parse_map(&mut self) -> Result<Value, OptionsError> {
        self.expect_punctuation("{")?;
        let mut map = Map::new();
        while !self.current().is_punctuation("}") {
            let (key, value) = self.parse_map_entry()?;
            map.insert(key, value);
        }
        self.advance();
        Ok(Value::Map(map))
    }

    fn parse_map_entry(&mut self) -> Result<(Value, Value), OptionsError> {
        self.expect_punctuation("--")?;
        let key = self.parse_expression()?;
        let value = if self.at_expression() {
            self.parse_expression()?
        } else {
            Value::Null
        };
        Ok((key, value))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tokenizer::tokenize;
    use super::*;

    fn parse(args: &[&str]) -> Result<Options, OptionsError> {
        Parser::new(tokenize(args)?).parse_all()
    }

    #[test]
    fn test_arguments_and_flags() {
        let options = parse(&["foo --bar 1 --baz", "qux"]).unwrap();
        assert_eq!(
            options.elements,
            vec![
                Element::Argument(Value::str("foo")),
                Element::Flag {
                    key: Value::str("bar"),
                    value: Value::Int(1)
                },
                Element::Flag {
                    key: Value::str("baz"),
                    value: Value::str("qux")
                },
            ]
        );
    }

    #[test]
    fn test_flag_without_value() {
        let options = parse(&["--verbose --level 2"]).unwrap();
        assert_eq!(
            options.elements[0],
            Element::Flag {
                key: Value::str("verbose"),
                value: Value::Null
            }
        );
    }

    #[test]
    fn test_list_and_map() {
        let options = parse(&["[1 2 (3)] {--a 1 --b}"]).unwrap();
        let map: Map = [("a", Value::Int(1)), ("b", Value::Null)].into_iter().collect();
        assert_eq!(
            options.elements,
            vec![
                Element::Argument(Value::from(vec![1, 2, 3])),
                Element::Argument(Value::Map(map)),
            ]
        );
    }

    #[test]
    fn test_nested_options() {
        let options = parse(&["--inner {{--x 1 y}}"]).unwrap();
        let Element::Flag { value, .. } = &options.elements[0] else {
            panic!("expected a flag");
        };
        let inner = value.as_object().unwrap().downcast_ref::<Options>().unwrap();
        assert_eq!(inner.arguments(), vec![Value::str("y")]);
        assert_eq!(inner.flag("x"), Some(Value::Int(1)));
    }

    #[test]
    fn test_syntax_errors() {
        assert_eq!(parse(&["[1 2"]), Err(OptionsError::Syntax("end of input".into())));
        assert_eq!(parse(&["(1 2)"]), Err(OptionsError::Syntax("2".into())));
        assert_eq!(parse(&["--"]), Err(OptionsError::Syntax("end of input".into())));
        assert_eq!(parse(&["a }}"]), Err(OptionsError::Syntax("}}".into())));
        assert_eq!(parse(&[")"]), Err(OptionsError::Syntax(")".into())));
    }
}
