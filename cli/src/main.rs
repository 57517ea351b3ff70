use clap::Parser;
use zbuild_cli::cli::Args;
use zbuild_cli::driver;

fn main() {
    let args = Args::parse();

    let filter = if args.verbose {
        "zbuild=debug,zbuild_cli=debug"
    } else {
        "zbuild=info,zbuild_cli=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();

    if let Err(err) = driver::run(&args) {
        driver::report(&err);
        std::process::exit(1);
    }
}
