use clap::Parser;

/// Weather subscription service CLI arguments
#[derive(Debug, Parser)]
#[command(
    name = "weather-subscriptions",
    version,
    about = "Email weather updates to confirmed subscribers"
)]
pub struct Cli {
    /// HTTP port to listen on (overrides SERVER_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database connection string (overrides DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,
}
