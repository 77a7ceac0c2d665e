//! Command-line option sets.
//!
//! Build tools hand option sets to each other as `p64/` strings: an
//! [`Options`] object encoded with plankton and then base64. This module
//! parses the textual option syntax into that model and converts it to and
//! from its encoded form.
//!
//! ```
//! use plankton::options;
//!
//! let opts = options::parse(["--out build/a.bin --trace main.n"]).unwrap();
//! assert_eq!(opts.flag("out"), Some("build/a.bin".into()));
//! assert_eq!(opts.to_string(), "{{--out build/a.bin --trace main.n}}");
//! ```

mod parser;
mod tokenizer;

use std::fmt;

use crate::codec::{Decoder, Encoder, P64_PREFIX};
use crate::convert::FromValue;
use crate::error::{OptionsError, RegistryError};
use crate::registry::{Header, Registry, RegistryBuilder, TypeRecord};
use crate::value::{Map, ObjectRef, Value};
use crate::wire_record;

/// Parses option syntax. Each argument is tokenized on its own and the
/// tokens of all arguments form one option set.
pub fn parse<I, S>(args: I) -> Result<Options, OptionsError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    parser::Parser::new(tokenizer::tokenize(args)?).parse_all()
}

/// One element of an option set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    /// A positional argument.
    Argument(Value),
    /// `--key value`, or `--key` alone with a null value.
    Flag {
        /// The flag's name, usually a string.
        key: Value,
        /// Its value.
        value: Value,
    },
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Argument(value) => write!(f, "{}", DisplayValue(value)),
            Element::Flag { key, value: Value::Null } => write!(f, "--{}", DisplayValue(key)),
            Element::Flag { key, value } => {
                write!(f, "--{} {}", DisplayValue(key), DisplayValue(value))
            }
        }
    }
}

/// Wire form of [`Element::Argument`].
#[derive(Debug, Clone, Default)]
pub struct ArgumentElement {
    /// The argument.
    pub value: Value,
}

wire_record!(ArgumentElement { value });

/// Wire form of [`Element::Flag`].
#[derive(Debug, Clone, Default)]
pub struct FlagElement {
    /// The flag's name.
    pub key: Value,
    /// Its value.
    pub value: Value,
}

wire_record!(FlagElement { key, value });

impl From<Element> for Value {
    fn from(element: Element) -> Self {
        Value::Object(match element {
            Element::Argument(value) => ObjectRef::new(ArgumentElement { value }),
            Element::Flag { key, value } => ObjectRef::new(FlagElement { key, value }),
        })
    }
}

impl FromValue for Element {
    fn from_value(value: Value) -> Result<Self, String> {
        if let Value::Object(object) = &value {
            if let Some(argument) = object.downcast_ref::<ArgumentElement>() {
                return Ok(Element::Argument(argument.value.clone()));
            }
            if let Some(flag) = object.downcast_ref::<FlagElement>() {
                return Ok(Element::Flag {
                    key: flag.key.clone(),
                    value: flag.value.clone(),
                });
            }
        }
        Err(format!(
            "expected an option element, found {}",
            crate::stringify::stringify(&value)
        ))
    }
}

/// An ordered set of arguments and flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    /// Arguments and flags in the order they were given.
    pub elements: Vec<Element>,
}

wire_record!(Options { elements });

impl Options {
    /// Appends a positional argument.
    pub fn add_argument(&mut self, value: impl Into<Value>) {
        self.elements.push(Element::Argument(value.into()));
    }

    /// Appends a flag.
    pub fn add_flag(&mut self, key: impl Into<Value>, value: impl Into<Value>) {
        self.elements.push(Element::Flag {
            key: key.into(),
            value: value.into(),
        });
    }

    /// The positional arguments, in order.
    pub fn arguments(&self) -> Vec<Value> {
        self.elements
            .iter()
            .filter_map(|element| match element {
                Element::Argument(value) => Some(value.clone()),
                Element::Flag { .. } => None,
            })
            .collect()
    }

    /// All flags by key. A flag given twice keeps its last value.
    pub fn flags(&self) -> Map {
        let mut flags = Map::new();
        for element in &self.elements {
            if let Element::Flag { key, value } = element {
                flags.insert(key.clone(), value.clone());
            }
        }
        flags
    }

    /// The value of the flag `name`. If there is none and the name contains
    /// `_`, the name with `_` replaced by `-` is tried.
    ///
    /// A flag given without a value is present with a null value.
    pub fn flag(&self, name: &str) -> Option<Value> {
        let flags = self.flags();
        if let Some(value) = flags.get_str(name) {
            return Some(value.clone());
        }
        if name.contains('_') {
            return flags.get_str(&name.replace('_', "-")).cloned();
        }
        None
    }

    /// Encodes the option set as a `p64/` string. `registry` must know the
    /// option types (see [`register`]).
    pub fn to_p64(&self, registry: &Registry) -> Result<String, OptionsError> {
        let value = Value::Object(ObjectRef::new(self.clone()));
        Ok(Encoder::new(registry).p64encode(&value)?)
    }

    /// Decodes a `p64/` string. Anything else is returned unchanged as a
    /// string value.
    pub fn from_p64(registry: &Registry, data: &str) -> Result<Value, OptionsError> {
        if !data.starts_with(P64_PREFIX) {
            return Ok(Value::str(data));
        }
        Ok(Decoder::new(registry).p64decode(data)?)
    }
}

impl fmt::Display for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{{")?;
        for (i, element) in self.elements.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{element}")?;
        }
        f.write_str("}}")
    }
}

/// Renders a value in option syntax.
pub(crate) struct DisplayValue<'a>(pub(crate) &'a Value);

impl fmt::Display for DisplayValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Value::Int(n) => write!(f, "{n}"),
            Value::Str(s) => f.write_str(s),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Array(elements) => {
                f.write_str("[")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", DisplayValue(element))?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "--{} {}", DisplayValue(key), DisplayValue(value))?;
                }
                f.write_str("}")
            }
            Value::Object(object) => match object.downcast_ref::<Options>() {
                Some(options) => write!(f, "{}", &*options),
                None => f.write_str(&crate::stringify::stringify(self.0)),
            },
            Value::Environment(_) => f.write_str(&crate::stringify::stringify(self.0)),
        }
    }
}

/// Registers [`Options`], [`ArgumentElement`] and [`FlagElement`] under
/// their `options/...` environment headers.
pub fn register(builder: &mut RegistryBuilder) -> &mut RegistryBuilder {
    builder
        .register(
            TypeRecord::builder::<ArgumentElement>()
                .header(Header::environment(["options", "ArgumentElement"]))
                .fields(ArgumentElement::FIELDS)
                .build(),
        )
        .register(
            TypeRecord::builder::<FlagElement>()
                .header(Header::environment(["options", "FlagElement"]))
                .fields(FlagElement::FIELDS)
                .build(),
        )
        .register(
            TypeRecord::builder::<Options>()
                .header(Header::environment(["options", "Options"]))
                .fields(Options::FIELDS)
                .build(),
        )
}

/// A registry that knows only the option types.
pub fn registry() -> Result<Registry, RegistryError> {
    let mut builder = Registry::builder();
    register(&mut builder);
    builder.build()
}
