pub mod commands;
pub mod handlers;

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);

pub use commands::command_argument_builder;
pub use handlers::{
    build_config, build_oracle, handle_crawl, handle_hunt, handle_prune, init_logging,
    load_urls_from_file, parse_token_list, parse_url_line,
};
