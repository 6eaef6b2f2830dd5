use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Synchronize the newest feed folder against the remote catalog
    Run {
        #[arg(long, help = "Load environment variables from this .env file")]
        env_file: Option<String>,
    },
    /// Show per-feed progress from the local checkpoint store
    Progress {
        #[arg(long, help = "Load environment variables from this .env file")]
        env_file: Option<String>,

        #[arg(
            long,
            help = "If set, prints the progress information as JSON instead of a table"
        )]
        json: bool,
    },
}
