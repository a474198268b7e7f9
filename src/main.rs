//! nozzle entry point.

use nozzle_lib::cli::{self, Cli};
use nozzle_lib::core::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    cli::execute(cli).await
}
