use std::path::PathBuf;

#[derive(Debug, clap::Parser)]
#[clap(name = "zbuild", version, author)]
pub struct Args {
    /// The rule to build; defaults to the script's `set special default`
    pub target: Option<String>,

    /// Path to the build script
    #[clap(short = 'f', long = "file", name = "PATH", default_value = "zeptux.zbuild")]
    pub file: PathBuf,

    /// Change to DIR before doing anything else
    #[clap(short = 'C', name = "DIR")]
    pub chdir: Option<PathBuf>,

    /// Show each command line before running it
    #[clap(short, long)]
    pub verbose: bool,

    /// Parse and build the graph, print what would run, but run nothing
    #[clap(short = 'n', long)]
    pub dry_run: bool,
}
