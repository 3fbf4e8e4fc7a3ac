// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use filtercam::{FilterType, Resolution};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "filtercam")]
#[command(about = "Stream color-filtered video into a v4l2loopback virtual camera")]
#[command(version = filtercam::constants::app_info::version())]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream an image (or a test pattern) through the filter into the virtual camera
    Stream {
        /// Image file to stream (default: generated color bars)
        #[arg(short, long)]
        image: Option<PathBuf>,

        /// Output device (default from config, usually /dev/video42)
        #[arg(short, long)]
        device: Option<String>,

        /// Color filter: none, grayscale, sepia, invert, warm, cool
        #[arg(short, long)]
        filter: Option<FilterType>,

        /// Filter strength from 0.0 (original) to 1.0 (fully filtered)
        #[arg(short, long)]
        strength: Option<f32>,

        /// Force the output resolution, e.g. 1280x720
        #[arg(short, long)]
        resolution: Option<Resolution>,

        /// Frames per second
        #[arg(long)]
        fps: Option<u32>,

        /// Stop after this many frames (default: run until Ctrl-C)
        #[arg(short = 'n', long)]
        frames: Option<u64>,

        /// Config file to use instead of the default location
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Filter on the CPU even if a GPU is available
        #[arg(long)]
        cpu: bool,
    },

    /// Show V4L2 capabilities of a device, or list loopback devices
    Probe {
        /// Device node to query (default: list all v4l2loopback nodes)
        device: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=filtercam=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Stream {
            image,
            device,
            filter,
            strength,
            resolution,
            fps,
            frames,
            config,
            cpu,
        } => cli::stream(cli::StreamOptions {
            image,
            device,
            filter,
            strength,
            resolution,
            fps,
            frames,
            config,
            use_gpu: !cpu,
        }),
        Commands::Probe { device } => cli::probe(device),
    }
}
