use colored::Colorize;
use linkgraph::commands::command_argument_builder;
use linkgraph::handlers::{handle_build, handle_dump, handle_init, handle_lookup};
use tracing::Level;

fn init_logging(quiet: bool, verbose: bool) {
    let level = if quiet {
        Level::WARN
    } else if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let chosen_command = command_argument_builder().get_matches();
    let quiet = chosen_command.get_flag("quiet");
    let verbose = chosen_command.get_flag("verbose");

    init_logging(quiet, verbose);

    let result = match chosen_command.subcommand() {
        Some(("init", primary_command)) => handle_init(primary_command).map(|_| ()),
        Some(("build", primary_command)) => handle_build(primary_command, !quiet).map(|_| ()),
        Some(("dump", primary_command)) => handle_dump(primary_command, !quiet).map(|_| ()),
        Some(("lookup", primary_command)) => handle_lookup(primary_command).map(|_| ()),
        _ => unreachable!("clap should ensure we don't get here"),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}
