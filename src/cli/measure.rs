use anyhow::Result;
use clap::Args;
use tracing::debug;

use crate::cli::exchange::Exchange;

/// Arguments for the `measure` command.
#[derive(Debug, Args)]
pub struct MeasureArgs {
    /// Number of measurements to take, one after another.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    count: u16,
    /// Read back the sample stored at this index instead of measuring.
    #[arg(long, conflicts_with = "count")]
    stored: Option<u16>,
}

impl MeasureArgs {
    #[must_use]
    pub fn new(count: u16) -> Self {
        Self {
            count,
            stored: None,
        }
    }

    /// Reads back a stored sample instead of measuring.
    #[must_use]
    pub fn stored(index: u16) -> Self {
        Self {
            count: 1,
            stored: Some(index),
        }
    }
}

pub(crate) async fn run(exchange: &mut Exchange, args: &MeasureArgs) -> Result<()> {
    if let Some(index) = args.stored {
        exchange.session().retrieve_stored_sample(index)?;
        exchange.settle("Reading stored sample").await;
        return Ok(());
    }

    for taken in 0..args.count {
        debug!(taken, "requesting measurement");
        exchange.session().measure()?;
        exchange.settle("Measuring").await;
    }
    Ok(())
}
