//! Runs the parsed command against the configured registry

use crate::cli::args::{Args, Command};
use crate::config::AppConfig;
use crate::digest::image_hash;
use crate::error::Result;
use crate::logging::Logger;
use crate::oras::OrasTransfer;
use crate::registry::progress::{ProgressSink, TransferBar};
use std::io::IsTerminal;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct Runner {
    args: Args,
    config: AppConfig,
    logger: Logger,
}

impl Runner {
    /// Merge environment and command-line settings, then validate them
    pub fn new(args: Args) -> Result<Self> {
        let mut config = AppConfig::from_env();
        args.global.apply(&mut config);
        config.validate()?;
        args.validate()?;

        let logger = config.logger();
        Ok(Self {
            args,
            config,
            logger,
        })
    }

    pub async fn run(&self) -> Result<()> {
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_interrupt.cancel();
            }
        });

        let transfer = OrasTransfer::new(&self.config).with_cancellation(cancel);

        match &self.args.command {
            Command::Pull { reference, path } => {
                self.logger.section("Pull SIF image");
                let progress = self
                    .interactive()
                    .then(|| Arc::new(TransferBar::new("Downloading")) as Arc<dyn ProgressSink>);
                transfer.download_image(path, reference, progress).await?;
            }
            Command::Push { path, reference } => {
                self.logger.section("Push SIF image");
                transfer.upload_image(path, reference).await?;
            }
            Command::Hash { path } => {
                println!("{}", image_hash(path)?);
            }
            Command::RefHash { reference } => {
                println!("{}", transfer.ref_hash(reference).await?);
            }
        }

        self.logger.verbose(&format!(
            "Completed in {}",
            self.logger.format_duration(self.logger.elapsed())
        ));
        Ok(())
    }

    fn interactive(&self) -> bool {
        !self.logger.quiet && std::io::stderr().is_terminal()
    }
}
