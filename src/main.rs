mod args;
mod pollctl;

use clap::Parser;
use log::{debug, error};

use crate::args::Args;

fn main() {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
    debug!("args: {:?}", args);

    match pollctl::run(&args) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            error!("Command failed: {:?}", e);
            eprintln!("{}", e);
            std::process::exit(pollctl::exit_code(&e));
        }
    }
}
