use clap::Parser;

use auntie_core::logging;

mod cli;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    // Parse first: the debug flag decides the log filter.
    let cli = Cli::parse();
    if logging::init_logging(cli.debug).is_err() {
        logging::init_logging_stderr(cli.debug);
    }

    match cli::run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("auntie error: {:#}", err);
            std::process::exit(1);
        }
    }
}
