use anyhow::Result;
use clap::Args;

use crate::cli::exchange::Exchange;

/// Arguments for the `calibrate` command.
#[derive(Debug, Args)]
pub struct CalibrateArgs {
    /// Calibration step: 0 white, 1 black, 2 zero.
    step: u8,
}

impl CalibrateArgs {
    #[must_use]
    pub fn new(step: u8) -> Self {
        Self { step }
    }
}

pub(crate) async fn run(exchange: &mut Exchange, args: &CalibrateArgs) -> Result<()> {
    exchange.session().calibrate(args.step)?;
    exchange.settle("Calibrating").await;
    Ok(())
}
