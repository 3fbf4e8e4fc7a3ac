// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for the virtual camera
//!
//! This module provides command-line functionality for:
//! - Streaming an image or test pattern through the filter pipeline
//! - Probing V4L2 output devices

use filtercam::backends::virtual_camera::{
    DeviceCapabilities, find_loopback_devices, load_image_as_frame, query_capabilities,
    test_pattern,
};
use filtercam::constants::{timing, virtual_camera};
use filtercam::diagnostics::{self, Diagnostics};
use filtercam::{Config, FilterType, Resolution, VirtualCameraPipeline};
use std::io::Write;
use std::path::PathBuf;
use tokio::time::MissedTickBehavior;

/// Flags of the `stream` subcommand; `None` keeps the config value
pub struct StreamOptions {
    pub image: Option<PathBuf>,
    pub device: Option<String>,
    pub filter: Option<FilterType>,
    pub strength: Option<f32>,
    pub resolution: Option<Resolution>,
    pub fps: Option<u32>,
    pub frames: Option<u64>,
    pub config: Option<PathBuf>,
    pub use_gpu: bool,
}

impl StreamOptions {
    fn apply_to(&self, mut config: Config) -> Config {
        if let Some(device) = &self.device {
            config.device_path = device.clone();
        }
        if let Some(filter) = self.filter {
            config.filter = filter;
        }
        if let Some(strength) = self.strength {
            config.filter_strength = strength;
        }
        if self.resolution.is_some() {
            config.forced_resolution = self.resolution;
        }
        if let Some(fps) = self.fps {
            config.frame_rate = fps;
        }
        // Streaming means writing to the device
        config.enabled = true;
        config.normalized()
    }
}

/// Stream frames into the virtual camera until Ctrl-C or the frame limit
pub fn stream(options: StreamOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &options.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let config = options.apply_to(config);

    let frame = match &options.image {
        Some(path) => load_image_as_frame(path)?,
        None => test_pattern(
            virtual_camera::TEST_PATTERN_WIDTH,
            virtual_camera::TEST_PATTERN_HEIGHT,
        ),
    };

    let (diagnostics, mut receiver) = Diagnostics::channel();
    let mut pipeline = VirtualCameraPipeline::from_config(&config, options.use_gpu, diagnostics);

    println!("Device: {}", config.device_path);
    println!(
        "Source: {} ({}x{})",
        options
            .image
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "test pattern".to_string()),
        frame.width,
        frame.height
    );
    println!(
        "Filter: {} (strength {:.2}) on {}",
        config.filter,
        config.filter_strength,
        if pipeline.is_gpu() { "GPU" } else { "CPU" }
    );
    if let Some(resolution) = config.forced_resolution {
        println!("Output resolution: {}", resolution);
    }
    println!("Press Ctrl+C to stop");
    println!();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let result: Result<(), String> = runtime.block_on(async {
        let cell = pipeline.frame_cell();
        let mut ticker = tokio::time::interval(timing::frame_interval(config.frame_rate));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    println!();
                    println!("Stopping...");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            cell.publish(frame.clone());
            pipeline.tick();

            let errors = diagnostics::drain(&mut receiver);
            if !errors.is_empty() {
                println!();
                for error in &errors {
                    eprintln!("Error: {}", error);
                }
            }

            if !pipeline.sink().is_enabled() {
                return Err("virtual camera output was disabled after an error".to_string());
            }

            let written = pipeline.sink().frames_written();
            print!("\rStreaming: {} frames written", written);
            let _ = std::io::stdout().flush();

            if options.frames.is_some_and(|limit| written >= limit) {
                println!();
                return Ok(());
            }
        }
    });

    println!(
        "Wrote {} frames to {}",
        pipeline.sink().frames_written(),
        config.device_path
    );
    result.map_err(Into::into)
}

/// Print the capabilities of one device, or of every loopback device found
pub fn probe(device: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = device {
        let caps = query_capabilities(&path)
            .ok_or_else(|| format!("{} cannot be opened or is not a V4L2 device", path))?;
        print_capabilities(&path, &caps);
        if !caps.video_output {
            println!("      Warning: device does not accept output frames");
        }
        return Ok(());
    }

    let devices = find_loopback_devices();
    if devices.is_empty() {
        println!("No v4l2loopback devices found.");
        println!();
        println!("Create one with:");
        println!("  sudo modprobe v4l2loopback video_nr=42 card_label=\"filtercam\" exclusive_caps=1");
        return Ok(());
    }

    println!("Virtual camera devices:");
    println!();
    for path in &devices {
        match query_capabilities(path) {
            Some(caps) => print_capabilities(path, &caps),
            None => println!("  {} (not accessible)", path),
        }
        println!();
    }

    Ok(())
}

fn print_capabilities(path: &str, caps: &DeviceCapabilities) {
    println!("  {}", path);
    println!("      Driver: {}", caps.driver);
    println!("      Card:   {}", caps.card);
    if !caps.bus_info.is_empty() {
        println!("      Bus:    {}", caps.bus_info);
    }
    println!(
        "      Output: {}{}",
        if caps.video_output { "yes" } else { "no" },
        if caps.is_loopback() { " (v4l2loopback)" } else { "" }
    );
}
