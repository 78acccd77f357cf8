use clap::Parser;
use procsync_lib::commands::Cli;

fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    if let Err(e) = procsync_lib::run(cli) {
        eprintln!("procsync: {e}");
        std::process::exit(1);
    }
}
