//! Command-line argument parsing

use crate::config::AppConfig;
use crate::error::{OrasError, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sif-oras")]
#[command(about = "Push and pull SIF container images to OCI registries using ORAS")]
#[command(version)]
pub struct Args {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Flags shared by every subcommand
#[derive(clap::Args, Debug, Default, Clone)]
pub struct GlobalArgs {
    /// Registry username
    #[arg(long, short = 'u', global = true, help = "Username for registry authentication")]
    pub username: Option<String>,

    /// Registry password
    #[arg(long, short = 'p', global = true, help = "Password for registry authentication")]
    pub password: Option<String>,

    #[arg(
        long,
        global = true,
        help = "Path to a docker config.json style authentication file"
    )]
    pub authfile: Option<PathBuf>,

    #[arg(long, global = true, help = "Directory for temporary download files")]
    pub tmpdir: Option<PathBuf>,

    #[arg(long, global = true, help = "Use plain HTTP to reach the registry")]
    pub insecure: bool,

    /// Skip TLS verification
    #[arg(long = "skip-tls", global = true, help = "Skip TLS certificate verification")]
    pub skip_tls: bool,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, short = 'q', global = true, help = "Only print errors and results")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Download a SIF image from a registry
    Pull {
        /// Source reference, e.g. oras://ghcr.io/org/image:tag
        reference: String,
        /// Destination file
        path: PathBuf,
    },
    /// Upload a SIF image to a registry
    Push {
        /// SIF image to upload
        path: PathBuf,
        /// Destination reference
        reference: String,
    },
    /// Print the sha256 digest of a local image file
    Hash { path: PathBuf },
    /// Print the layer digest recorded for a remote image
    RefHash { reference: String },
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }

    /// Validate arguments
    pub fn validate(&self) -> Result<()> {
        match &self.command {
            Command::Pull { path, .. } if path.is_dir() => Err(OrasError::Config(format!(
                "destination {} is a directory",
                path.display()
            ))),
            Command::Push { path, .. } | Command::Hash { path } if !path.is_file() => {
                Err(OrasError::Config(format!(
                    "file does not exist: {}",
                    path.display()
                )))
            }
            _ => Ok(()),
        }
    }
}

impl GlobalArgs {
    /// Overlay flags given on the command line onto `config`
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(username) = &self.username {
            config.username = Some(username.clone());
        }
        if let Some(password) = &self.password {
            config.password = Some(password.clone());
        }
        if let Some(authfile) = &self.authfile {
            config.auth_file = Some(authfile.clone());
        }
        if let Some(tmpdir) = &self.tmpdir {
            config.tmp_dir = Some(tmpdir.clone());
        }
        config.insecure |= self.insecure;
        config.skip_tls |= self.skip_tls;
        config.verbose |= self.verbose;
        config.quiet |= self.quiet;
    }
}
