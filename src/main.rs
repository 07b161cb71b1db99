mod ast;
mod builtins;
mod config;
mod job;
mod launcher;
mod logging;
mod parser;
mod repl;
mod shell;
mod supervisor;
mod tokenizer;
mod types;
mod utils;

#[cfg(test)]
mod tests;

use anyhow::Context;

fn main() -> anyhow::Result<()> {
    let config = config::Config::load().context("failed to load configuration")?;
    logging::init(&config).context("failed to initialise logging")?;
    log::debug!("starting with {:?}", config);

    repl::run(&config).context("interactive loop failed")?;
    Ok(())
}
