use anyhow::Result;
use weft_cli::app;

fn main() -> Result<()> {
    app::run()
}
