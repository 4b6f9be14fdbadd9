use sif_oras::Logger;
use sif_oras::cli::{Args, Runner};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse_args();

    let result = match Runner::new(args) {
        Ok(runner) => runner.run().await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            Logger::default().error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}
