use sitecopy::commands::command_argument_builder;
use sitecopy::handlers::{handle_preview, handle_scrape};

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();

    match chosen_command.subcommand() {
        Some(("scrape", primary_command)) => handle_scrape(primary_command).await,
        Some(("preview", primary_command)) => handle_preview(primary_command).await,
        _ => unreachable!("clap should ensure we don't get here"),
    }
}
