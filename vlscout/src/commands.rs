use crate::CLAP_STYLING;
use clap::{ValueEnum, arg, command};
use url::Url;
use vlscout_core::Tag;

/// The persisted list a `prune` run works on.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ListArg {
    Ru,
    Global,
    Manual,
}

impl From<ListArg> for Tag {
    fn from(list: ListArg) -> Self {
        match list {
            ListArg::Ru => Tag::Ru,
            ListArg::Global => Tag::Global,
            ListArg::Manual => Tag::Manual,
        }
    }
}

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("vlscout")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("vlscout")
        .about("Hunts public VLESS subscription lists and sorts them into RU, global and manual-review lists")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Hide the progress spinner and the coloured summary")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-v --"verbose" ...)
                .help("Raise log verbosity (-v debug, -vv trace)")
                .global(true),
        )
        .arg(
            arg!(-c --"config" <PATH>)
                .required(false)
                .help("JSON config file; missing fields keep their defaults")
                .value_parser(clap::value_parser!(std::path::PathBuf))
                .global(true),
        )
        .arg(
            arg!(-o --"output-dir" <DIR>)
                .required(false)
                .help("Directory holding verified_ru.txt, verified_global.txt and manual_review.txt")
                .default_value(".")
                .global(true),
        )
        .arg(
            arg!(-t --"threads" <NUM_WORKERS>)
                .required(false)
                .help("The number of async workers draining the frontier (default: 20)")
                .value_parser(clap::value_parser!(usize))
                .global(true),
        )
        .arg(
            arg!(-d --"max-depth" <HOPS>)
                .required(false)
                .help("How many hops past the seeds aggregators are expanded (default: 1)")
                .value_parser(clap::value_parser!(usize))
                .global(true),
        )
        .arg(
            arg!(--"oracle-concurrency" <NUM>)
                .required(false)
                .help("Concurrent oracle calls, kept below the worker count (default: 2)")
                .value_parser(clap::value_parser!(usize))
                .global(true),
        )
        .arg(
            arg!(--"timeout" <SECONDS>)
                .required(false)
                .help("Per-request timeout in seconds (default: 10)")
                .value_parser(clap::value_parser!(u64))
                .global(true),
        )
        .arg(
            arg!(--"json-summary")
                .required(false)
                .help("Print the run summary as a single JSON line")
                .action(clap::ArgAction::SetTrue)
                .global(true),
        )
        .subcommand_required(true)
        .subcommand(
            command!("hunt")
                .about(
                    "Search GitHub code and the public gist feed for candidate lists, crawl them \
                and merge the results.",
                )
                .arg(
                    arg!(-H --"seeds-file" <PATH>)
                        .required(false)
                        .help("Extra newline-delimited seed URLs to crawl alongside the search results")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(--"no-search")
                        .required(false)
                        .help("Skip the GitHub code search")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"no-gists")
                        .required(false)
                        .help("Skip the public gist feed")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
        .subcommand(
            command!("crawl")
                .about("Crawl explicit seed URLs and merge the results.")
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(false)
                        .help("A seed URL; may be repeated")
                        .value_parser(clap::value_parser!(Url))
                        .action(clap::ArgAction::Append),
                )
                .arg(
                    arg!(-H --"seeds-file" <PATH>)
                        .required(false)
                        .help("Path to a newline-delimited file of seed URLs")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                ),
        )
        .subcommand(
            command!("prune")
                .about(
                    "Re-check every URL of one persisted list and drop those that no longer \
                classify to it. The previous file is kept as <file>.bak.",
                )
                .arg(
                    arg!([TAG])
                        .required(false)
                        .help("The list to prune")
                        .value_parser(clap::value_parser!(ListArg))
                        .default_value("global"),
                ),
        )
}
