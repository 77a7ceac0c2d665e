use anyhow::Result;
use clap::Parser;
use std::io::Write;

use plankton::cli;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    env_logger::Builder::new()
        .format(|buf, record| writeln!(buf, "{}: {}", record.level(), record.args()))
        .filter_level(cli.verbose.log_level_filter())
        .target(env_logger::fmt::Target::Stderr)
        .init();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    cli::run(cli.command, &mut out)?;
    out.flush()?;
    Ok(())
}
