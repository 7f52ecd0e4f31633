use clap::{arg, command};
use sitecopy_scanner::target::DEFAULT_USER_AGENT;
use std::path::PathBuf;

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("sitecopy")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("sitecopy")
        .about("Mirror a website onto local disk and preview it")
        .styles(CLAP_STYLING)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            command!("scrape")
                .visible_alias("s")
                .about("Mirror a website, starting from a seed URL, into a local directory tree.")
                .arg(
                    arg!(<URL>)
                        .required(true)
                        .help("The seed URL. Only its host is crawled."),
                )
                .arg(
                    arg!(-o --"output-dir" <PATH>)
                        .required(false)
                        .help("Directory scraped sites are written under")
                        .default_value("sites"),
                )
                .arg(
                    arg!(-c --"cache" <PATH>)
                        .required(false)
                        .help("Cache responses as files in this directory and reuse them on later runs"),
                )
                .arg(
                    arg!(-m --"max-depth" <DEPTH>)
                        .required(false)
                        .help("Maximum link depth to follow, the seed being depth 1. 0 means unlimited.")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("0"),
                )
                .arg(
                    arg!(-u --"user-agent" <AGENT>)
                        .required(false)
                        .help("User agent sent with every request and matched against robots.txt")
                        .default_value(DEFAULT_USER_AGENT),
                )
                .arg(
                    arg!(-i --"ignore-robots")
                        .required(false)
                        .help("Ignore restrictions set by the host's robots.txt")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(-t --"threads" <NUM_WORKERS>)
                        .required(false)
                        .help("The number of async workers fetching concurrently.")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("8"),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Request timeout in seconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("30"),
                )
                .arg(
                    arg!(-r --"report" <PATH>)
                        .required(false)
                        .help("Also write the run summary as JSON to this file")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-v --"verbose")
                        .required(false)
                        .help("Verbose output of logs")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(-d --"debug")
                        .required(false)
                        .help("Output of debug logs")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
        .subcommand(
            command!("preview")
                .visible_alias("p")
                .about("Run a local webserver to preview a scraped website.")
                .arg(
                    arg!(<SITE>)
                        .required(true)
                        .help("The scraped host to serve, e.g. example.com"),
                )
                .arg(
                    arg!(-o --"output-dir" <PATH>)
                        .required(false)
                        .help("Directory scraped sites were written under")
                        .default_value("sites"),
                )
                .arg(
                    arg!(-a --"address" <ADDRESS>)
                        .required(false)
                        .help("Address to listen on")
                        .default_value("127.0.0.1"),
                )
                .arg(
                    arg!(-p --"port" <PORT>)
                        .required(false)
                        .help("Port to listen on")
                        .value_parser(clap::value_parser!(u16))
                        .default_value("8000"),
                ),
        )
}
