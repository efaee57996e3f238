use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "seal",
    about = "Sealed record issuance: gapless numbers, timestamp proofs, audit chain",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Issue sample records concurrently against in-memory stores
    Demo(DemoArgs),
    /// Print the SHA-256 content digest of a file
    Digest(DigestArgs),
    /// Print the effective configuration as TOML
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct DemoArgs {
    /// Series key the records are numbered in
    #[arg(long, default_value = "RE2025")]
    pub series: String,
    /// Number of drafts to issue concurrently
    #[arg(long, default_value_t = 3)]
    pub count: u32,
    /// Simulate an unreachable authority and accept unverified local proofs
    #[arg(long)]
    pub fallback: bool,
    /// Cancel the first issued record with a compensating record
    #[arg(long)]
    pub cancel_first: bool,
    /// Archive artifacts in this directory instead of in memory
    #[arg(long)]
    pub archive: Option<PathBuf>,
    /// Configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct DigestArgs {
    pub file: PathBuf,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Configuration file to load; defaults are printed without one
    #[arg(long)]
    pub file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_demo_flags() {
        let cli = Cli::parse_from(["seal", "demo", "--series", "GS2026", "--count", "5", "--fallback"]);
        match cli.command {
            Command::Demo(args) => {
                assert_eq!(args.series, "GS2026");
                assert_eq!(args.count, 5);
                assert!(args.fallback);
                assert!(!args.cancel_first);
            }
            _ => panic!("expected demo"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["seal", "digest", "a.pdf", "-v", "--format", "json"]);
        assert!(cli.verbose);
        assert_eq!(cli.format, OutputFormat::Json);
    }
}
