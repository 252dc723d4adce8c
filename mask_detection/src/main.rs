use clap::{Parser, Subcommand};
use mask_detection::{config, telemetry};
use std::path::PathBuf;

/// Face mask detection on still images and live camera feeds.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detect on one image and write an annotated copy.
    Image {
        path: PathBuf,
        /// Defaults to `<stem>_annotated.jpg` next to the input.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Serve the web view and start a camera session immediately.
    Camera {
        /// Overrides `camera.device_index` from the configuration.
        #[arg(short, long)]
        device: Option<i32>,
    },
    /// Serve the web view only; sessions are started over HTTP.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::get_configuration()?;
    telemetry::init_subscriber(&config.log_level);

    match cli.command {
        Command::Image { path, output } => mask_detection::run_image(config, path, output).await,
        Command::Camera { device } => {
            let device_index = device.unwrap_or(config.camera.device_index);
            mask_detection::serve(config, Some(device_index)).await
        }
        Command::Serve => mask_detection::serve(config, None).await,
    }
}
