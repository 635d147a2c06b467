//! islet demo
//!
//! Generates a procedural island, meshes it into chunks and traces it with
//! hardware ray tracing next to a reflective cube and an open box. Runs
//! headless: frames are written to disk instead of a window.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p islet-demo -- [OPTIONS]
//! ```
//!
//! ## Examples
//!
//! ```bash
//! # Trace one frame of the default island
//! cargo run -p islet-demo -- -o island.png
//!
//! # Small rough island, orbit for 60 frames and swap seeds halfway
//! cargo run -p islet-demo -- --side 256 --octaves 8 --frames 60 --regenerate
//!
//! # Height map only, no GPU needed
//! cargo run -p islet-demo -- --no-gpu --heightmap height.png
//! ```
//!
//! Run with `-h` for every option.

mod args;
mod camera;
mod demo;

use args::{DemoArgs, HELP};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = DemoArgs::from_env();
    if args.help {
        eprintln!("{HELP}");
        return Ok(());
    }

    if args.no_gpu {
        return demo::mesh_only(&args);
    }
    run(&args)
}

#[cfg(feature = "vulkan")]
fn run(args: &DemoArgs) -> anyhow::Result<()> {
    demo::run_gpu(args)
}

#[cfg(not(feature = "vulkan"))]
fn run(_args: &DemoArgs) -> anyhow::Result<()> {
    anyhow::bail!("built without the `vulkan` feature; pass --no-gpu")
}
