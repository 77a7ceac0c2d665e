//! Plankton - binary object-graph codec
//!
//! Plankton serializes trees and graphs of values (integers, strings,
//! arrays, maps, booleans, null and registered native objects) to a compact
//! tagged byte format, and reads them back with object identity and cycles
//! intact. The Neutrino toolchain uses it to pass structured data between
//! processes, usually as `p64/` base64 strings on command lines.
//!
//! # Architecture
//!
//! - [`Value`] - the value tree; objects are shared [`ObjectRef`] handles
//! - [`WireRecord`] / [`wire_record!`] - native types that travel as objects
//! - [`Registry`] - how each native type maps to a header and a payload,
//!   built once and shared read-only
//! - [`Encoder`] / [`Decoder`] - one call, one self-contained slot table
//! - [`options`] - command-line option sets carried as plankton
//!
//! ```
//! use plankton::{wire_record, Decoder, Encoder, ObjectRef, Registry, TypeRecord, Value};
//!
//! #[derive(Debug, Default)]
//! struct Node {
//!     label: String,
//!     next: Value,
//! }
//!
//! wire_record!(Node { label, next });
//!
//! let mut builder = Registry::builder();
//! builder.register(TypeRecord::builder::<Node>().fields(Node::FIELDS).build());
//! let registry = builder.build().unwrap();
//!
//! let node = ObjectRef::new(Node { label: "a".into(), next: Value::Null });
//! let bytes = Encoder::new(&registry)
//!     .encode(&Value::from(vec![node.clone(), node]))
//!     .unwrap();
//!
//! let decoded = Decoder::new(&registry).decode(&bytes).unwrap();
//! let nodes = decoded.as_array().unwrap();
//! assert!(nodes[0].as_object().unwrap().ptr_eq(nodes[1].as_object().unwrap()));
//! ```
//!
//! # Concurrency Model
//!
//! A built [`Registry`] is `Send + Sync` and never changes. Encoders and
//! decoders borrow it and keep all per-call state to themselves, so any
//! number of threads can encode and decode against one registry. Values
//! themselves are single-threaded (`Rc`).

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![allow(clippy::uninlined_format_args)]

pub mod cli;
pub mod codec;
pub mod convert;
pub mod error;
pub mod options;
pub mod record;
pub mod registry;
pub mod stringify;
pub mod value;

// Re-exports for convenience
pub use codec::{Decoder, Encoder, P64_PREFIX};
pub use convert::FromValue;
pub use error::{DecodeError, EncodeError, OptionsError, RegistryError};
pub use options::Options;
pub use record::{UnknownObject, WireRecord};
pub use registry::{Header, Registry, RegistryBuilder, TypeRecord};
pub use stringify::{stringify, stringify_with};
pub use value::{EnvironmentKey, Map, ObjectRef, Value};
