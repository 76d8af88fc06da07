use crate::CLAP_STYLING;
use clap::{arg, command};
use std::path::PathBuf;

pub const DEFAULT_CONFIG_DIR: &str = "~/.config/linkgraph/";

fn input_arg() -> clap::Arg {
    arg!(-i --"input" <PATH>)
        .required(true)
        .help("JSON-lines document file, or a directory of *.jsonl shards. May be repeated.")
        .num_args(1..)
        .action(clap::ArgAction::Append)
        .value_parser(clap::value_parser!(PathBuf))
}

fn threads_arg() -> clap::Arg {
    arg!(-t --"threads" <NUM_WORKERS>)
        .required(false)
        .help("Number of worker threads (default: one per CPU)")
        .value_parser(clap::value_parser!(usize))
}

fn id_store_arg() -> clap::Arg {
    arg!(--"id-store" <PATH>)
        .required(false)
        .help("Directory holding the domain id database, or the database file itself")
        .default_value(DEFAULT_CONFIG_DIR)
}

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("linkgraph")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("linkgraph")
        .about("Extract a domain-to-domain link graph from a crawled corpus")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Only print warnings and errors, hide progress")
                .required(false)
                .global(true)
                .conflicts_with("verbose"),
        )
        .arg(
            arg!(-v --"verbose" "Print debug logging")
                .required(false)
                .global(true),
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            command!("init")
                .about("Initializes the domain id database on your filesystem")
                .arg(
                    arg!([PATH])
                        .required(false)
                        .help("Location to store the domain id database")
                        .default_value(DEFAULT_CONFIG_DIR),
                )
                .arg(
                    arg!(-f - -"force")
                        .help(
                            "Forces the overwriting of any existing database at the specified \
                        location.",
                        )
                        .required(false),
                ),
        )
        .subcommand(
            command!("build")
                .about("Build the link graph of a corpus")
                .arg(input_arg())
                .arg(
                    arg!(-o --"output" <DIR>)
                        .required(true)
                        .help("Output directory. Must not exist, or be empty.")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Output format: text (adjacency pairs) or tables (edges/vertices Parquet)")
                        .value_parser(["text", "tables"])
                        .default_value("text"),
                )
                .arg(
                    arg!(--"shards" <N>)
                        .required(false)
                        .help("Number of output shards (default: one per partition)")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(--"shuffle")
                        .required(false)
                        .help("Redistribute rows across shards instead of merging neighbouring partitions")
                        .action(clap::ArgAction::SetTrue)
                        .requires("shards"),
                )
                .arg(
                    arg!(--"partitions" <N>)
                        .required(false)
                        .help("Number of hash partitions used while deduplicating")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("16"),
                )
                .arg(threads_arg())
                .arg(id_store_arg())
                .arg(
                    arg!(--"id-retries" <N>)
                        .required(false)
                        .help("Attempts per id store request before giving up")
                        .value_parser(clap::value_parser!(u32))
                        .default_value("3"),
                )
                .arg(
                    arg!(--"id-batch-size" <N>)
                        .required(false)
                        .help("Domains resolved per id store round trip")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("1000"),
                )
                .arg(
                    arg!(--"with-weight")
                        .required(false)
                        .help("Add a constant weight column to the edges table")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
        .subcommand(
            command!("dump")
                .about("Write the indexed per-document records, to build the graph from later")
                .arg(input_arg())
                .arg(
                    arg!(-o --"output" <DIR>)
                        .required(true)
                        .help("Dump directory. Must not exist, or be empty.")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(threads_arg()),
        )
        .subcommand(
            command!("lookup")
                .about("Print the ids assigned to domains")
                .arg(
                    arg!(<DOMAIN>)
                        .required(true)
                        .num_args(1..)
                        .help("Domains or URLs to look up"),
                )
                .arg(id_store_arg()),
        )
}
