use colored::Colorize;
use vlscout::{command_argument_builder, handlers};

#[tokio::main]
async fn main() {
    let chosen_command = command_argument_builder().get_matches();

    let Some((name, sub_matches)) = chosen_command.subcommand() else {
        unreachable!("clap should ensure a subcommand is present")
    };

    handlers::init_logging(sub_matches.get_count("verbose"), sub_matches.get_flag("quiet"));

    let outcome = match name {
        "hunt" => handlers::handle_hunt(sub_matches).await,
        "crawl" => handlers::handle_crawl(sub_matches).await,
        "prune" => handlers::handle_prune(sub_matches).await,
        _ => unreachable!("clap should ensure we don't get here"),
    };

    if let Err(e) = outcome {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}
