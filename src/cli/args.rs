//! CLI argument definitions using clap
//!
//! Usage:
//!   gpdbbr --type backup --dbname sales --jobs 4 \
//!          --s3endpoint 10.0.0.1:9000 --s3id admin --s3key secret \
//!          --s3bucket backups --s3folder sales

use std::fmt;

use clap::{Parser, ValueEnum};

use super::{Config, S3Params};

/// gpdbbr - backup, restore and row-check for Greenplum-class databases
#[derive(Parser, Debug)]
#[command(name = "gpdbbr")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Command type
    #[arg(long = "type", value_enum)]
    pub mode: Mode,

    /// Database name
    #[arg(long)]
    pub dbname: String,

    /// Parallel jobs
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=64))]
    pub jobs: u8,

    /// S3 endpoint (host:port)
    #[arg(long)]
    pub s3endpoint: String,

    /// S3 access key ID
    #[arg(long)]
    pub s3id: String,

    /// S3 secret access key
    #[arg(long)]
    pub s3key: String,

    /// S3 bucket name
    #[arg(long)]
    pub s3bucket: String,

    /// S3 folder name
    #[arg(long)]
    pub s3folder: String,
}

/// The three mutually exclusive run modes.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Backup,
    Restore,
    Check,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Backup => write!(f, "backup"),
            Mode::Restore => write!(f, "restore"),
            Mode::Check => write!(f, "check"),
        }
    }
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Consume the parsed arguments into a run configuration.
    pub fn into_config(self) -> Config {
        Config {
            dbname: self.dbname,
            jobs: self.jobs as usize,
            s3: S3Params {
                endpoint: self.s3endpoint,
                id: self.s3id,
                key: self.s3key,
                bucket: self.s3bucket,
                folder: self.s3folder,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Vec<&'static str> {
        vec![
            "gpdbbr",
            "--type",
            "backup",
            "--dbname",
            "sales",
            "--s3endpoint",
            "10.0.0.1:9000",
            "--s3id",
            "admin",
            "--s3key",
            "secret",
            "--s3bucket",
            "bk",
            "--s3folder",
            "sales",
        ]
    }

    #[test]
    fn test_parse_minimal_backup() {
        let cli = Cli::try_parse_from(base_args()).unwrap();
        assert_eq!(cli.mode, Mode::Backup);
        assert_eq!(cli.dbname, "sales");
        assert_eq!(cli.jobs, 1);
    }

    #[test]
    fn test_jobs_range_enforced() {
        let mut args = base_args();
        args.extend(["--jobs", "65"]);
        assert!(Cli::try_parse_from(args).is_err());

        let mut args = base_args();
        args.extend(["--jobs", "0"]);
        assert!(Cli::try_parse_from(args).is_err());

        let mut args = base_args();
        args.extend(["--jobs", "64"]);
        assert_eq!(Cli::try_parse_from(args).unwrap().jobs, 64);
    }

    #[test]
    fn test_mode_values() {
        for (flag, mode) in [
            ("backup", Mode::Backup),
            ("restore", Mode::Restore),
            ("check", Mode::Check),
        ] {
            let mut args = base_args();
            args[2] = flag;
            assert_eq!(Cli::try_parse_from(args).unwrap().mode, mode);
        }
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let mut args = base_args();
        args[2] = "verify";
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_missing_required_argument_rejected() {
        let args: Vec<&str> = base_args().into_iter().filter(|a| *a != "--s3bucket" && *a != "bk").collect();
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_into_config() {
        let mut args = base_args();
        args.extend(["--jobs", "8"]);
        let config = Cli::try_parse_from(args).unwrap().into_config();
        assert_eq!(config.jobs, 8);
        assert_eq!(config.s3.endpoint, "10.0.0.1:9000");
        assert_eq!(config.s3.folder, "sales");
    }
}
