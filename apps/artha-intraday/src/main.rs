//! Artha intraday runner — CLI entry point.
//!
//! ## Usage
//! ```bash
//! # Validate a configuration without trading
//! cargo run -p artha-intraday -- validate-config --config configs/paper.toml
//!
//! # Paper session for 60 seconds
//! cargo run -p artha-intraday -- paper --config configs/paper.toml --duration-secs 60
//! ```

fn main() -> anyhow::Result<()> {
    artha_intraday::run_cli()
}
