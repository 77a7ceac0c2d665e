//! Command line of the `plankton` tool.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use regex::Regex;

use crate::codec::{Decoder, P64_PREFIX};
use crate::error::DecodeError;
use crate::options::{self, Options};
use crate::registry::Registry;
use crate::stringify::stringify_with;
use crate::value::{EnvironmentKey, Value};

/// Inspect and produce plankton data.
#[derive(Parser, Debug)]
#[command(version)]
pub struct Cli {
    /// Verbosity:
    /// -v -> Debug
    /// -vv -> Trace
    /// -q -> Warn
    /// -qq -> Error
    /// -qqq -> Off.
    /// Default (/ no argument given): 'info'
    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,

    /// The command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print every `p64/` line read from stdin in readable form.
    Filter {
        /// Disassemble instead of decoding.
        #[arg(long)]
        disass: bool,
    },
    /// Decode one `p64/` string.
    Decode {
        /// The encoded data, including the `p64/` prefix.
        data: String,
    },
    /// Disassemble one `p64/` string.
    Disassemble {
        /// The encoded data, including the `p64/` prefix.
        data: String,
    },
    /// Parse option syntax and print it as a `p64/` string.
    Options {
        /// Option source, e.g. `--out build main.n`.
        #[arg(allow_hyphen_values = true, trailing_var_arg = true)]
        args: Vec<String>,
    },
}

/// Access function used by the tool: keys that look like environment paths
/// stay markers, anything else is shown as text.
fn inspect_access(key: &Value) -> Option<Value> {
    Some(match EnvironmentKey::from_array(key) {
        Some(key) => Value::Environment(key),
        None => Value::Str(crate::stringify::stringify(key)),
    })
}

/// Decodes or disassembles `data`, a base64 string without its prefix.
pub fn render(registry: &Registry, data: &str, disassemble: bool) -> Result<String, DecodeError> {
    let decoder = Decoder::new(registry).with_access(inspect_access);
    if disassemble {
        return decoder.base64disassemble(data);
    }
    let value = decoder.base64decode(data)?;
    let options = value.as_object().and_then(|object| {
        object
            .downcast_ref::<Options>()
            .map(|options| options.to_string())
    });
    Ok(options.unwrap_or_else(|| stringify_with(registry, &value)))
}

/// Renders each `p64/` line of `input` to `output`. Other lines are skipped;
/// lines that fail to decode are reported and skipped.
pub fn filter(
    registry: &Registry,
    input: impl BufRead,
    output: &mut impl Write,
    disassemble: bool,
) -> Result<()> {
    let pattern = Regex::new(r"^p64/([a-zA-Z0-9=+/]+)$").context("invalid p64 pattern")?;
    for line in input.lines() {
        let line = line.context("could not read input")?;
        let Some(captures) = pattern.captures(line.trim_end()) else {
            continue;
        };
        match render(registry, &captures[1], disassemble) {
            Ok(text) => writeln!(output, "{text}")?,
            Err(err) => log::warn!("skipping undecodable line: {err}"),
        }
    }
    Ok(())
}

fn strip_p64(data: &str) -> Result<&str> {
    data.strip_prefix(P64_PREFIX)
        .with_context(|| format!("expected a `{P64_PREFIX}` string, got `{data}`"))
}

/// Runs `command`, writing results to `output`.
pub fn run(command: Command, output: &mut impl Write) -> Result<()> {
    let registry = options::registry().context("could not build the type registry")?;
    match command {
        Command::Filter { disass } => {
            let stdin = std::io::stdin();
            filter(&registry, stdin.lock(), output, disass)
        }
        Command::Decode { data } => {
            let text = render(&registry, strip_p64(&data)?, false)
                .with_context(|| format!("could not decode `{data}`"))?;
            writeln!(output, "{text}")?;
            Ok(())
        }
        Command::Disassemble { data } => {
            let text = render(&registry, strip_p64(&data)?, true)
                .with_context(|| format!("could not disassemble `{data}`"))?;
            writeln!(output, "{text}")?;
            Ok(())
        }
        Command::Options { args } => {
            let parsed = options::parse(&args).context("could not parse options")?;
            writeln!(output, "{}", parsed.to_p64(&registry)?)?;
            Ok(())
        }
    }
}
