//! Triangle demo for the swapline presenter.
//!
//! Opens a window and draws one triangle per frame, recreating the swapchain
//! on resize and idling while minimized.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p swapline-triangle -- [OPTIONS]
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

use anyhow::{bail, Context};
use swapline_app::{run_app, AppConfig};

const WIDTH: u32 = 800;
const HEIGHT: u32 = 600;

fn main() -> anyhow::Result<()> {
    // Check for help flag before starting the app
    if std::env::args().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    let config = parse_args(std::env::args().skip(1))?;
    run_app(config)
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::new("swapline - triangle").with_size(WIDTH, HEIGHT);
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--width" => config.width = parse_value(&arg, args.next())?,
            "--height" => config.height = parse_value(&arg, args.next())?,
            "--frames-in-flight" => {
                let frames: usize = parse_value(&arg, args.next())?;
                if frames == 0 {
                    bail!("--frames-in-flight must be at least 1");
                }
                config.frames_in_flight = frames;
            }
            "--vsync" => config.vsync = true,
            "--no-validation" => config.validation = false,
            other => bail!("Unknown argument: {other} (see --help)"),
        }
    }

    Ok(config)
}

fn parse_value<T>(flag: &str, value: Option<String>) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = value.with_context(|| format!("{flag} needs a value"))?;
    value
        .parse()
        .with_context(|| format!("Invalid value for {flag}: {value}"))
}

fn print_help() {
    eprintln!(
        "swapline triangle demo

USAGE:
    cargo run -p swapline-triangle -- [OPTIONS]

OPTIONS:
    --width <PX>              Initial window width (default: {WIDTH})
    --height <PX>             Initial window height (default: {HEIGHT})
    --frames-in-flight <N>    Frames the CPU may run ahead of the GPU (default: 2)
    --vsync                   Present with FIFO instead of MAILBOX
    --no-validation           Disable Vulkan validation layers
    -h, --help                Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                  Set log level (e.g., info, debug, trace)"
    );
}
