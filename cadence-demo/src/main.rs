mod demo;

use anyhow::{Context, Result};
use cadence_runner::{LoopConfig, LoopSettings, ShowDirective};
use clap::Parser;
use std::path::PathBuf;

use crate::demo::DemoHost;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Draw into a borderless per-pixel-alpha window
    #[arg(short, long)]
    transparent: bool,

    /// Simulation ticks per second (the audio sample rate is 441 times this)
    #[arg(long, default_value_t = 100)]
    ticks_per_second: u32,

    /// Path to a JSON loop config (default search: <exe>.json, cadence.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Start with the window hidden
    #[arg(long, group = "show")]
    hidden: bool,

    /// Start minimized
    #[arg(long, group = "show")]
    minimized: bool,

    /// Start maximized
    #[arg(long, group = "show")]
    maximized: bool,
}

impl Args {
    fn show(&self) -> ShowDirective {
        if self.hidden {
            ShowDirective::Hidden
        } else if self.minimized {
            ShowDirective::Minimized
        } else if self.maximized {
            ShowDirective::Maximized
        } else {
            ShowDirective::Normal
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = LoopConfig::load(args.config.as_deref())?;
    let settings = LoopSettings {
        title: "Cadence Demo (W/S move, Space recolour)".to_string(),
        ticks_per_second: args.ticks_per_second,
        show: args.show(),
    };

    cadence_runner::run(settings, config, DemoHost::new(args.transparent)).context("Loop failed")?;
    log::info!("Successfully completed.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn show_flags_are_exclusive() {
        let args = Args::try_parse_from(["cadence-demo", "--maximized"]).unwrap();
        assert_eq!(args.show(), ShowDirective::Maximized);
        assert_eq!(args.ticks_per_second, 100);
        assert!(Args::try_parse_from(["cadence-demo", "--hidden", "--minimized"]).is_err());
    }
}
