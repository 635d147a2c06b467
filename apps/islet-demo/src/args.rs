//! Command line options.

use islet_world::TerrainParams;
use std::path::PathBuf;

/// Options parsed from the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct DemoArgs {
    /// Height field side length in cells.
    pub side: usize,
    pub seed: u32,
    pub params: TerrainParams,
    pub chunk_size: usize,
    /// Cells at or below this height are covered by water.
    pub water_level: u8,
    /// Frames to trace while orbiting.
    pub frames: u32,
    pub width: u32,
    pub height: u32,
    pub shader_path: PathBuf,
    /// Write the generated height field as a colour PNG.
    pub heightmap: Option<PathBuf>,
    /// Write the last traced frame as a PNG.
    pub output: Option<PathBuf>,
    /// Generate and mesh only, without a GPU.
    pub no_gpu: bool,
    /// Regenerate with the next seed halfway through the orbit.
    pub regenerate: bool,
    pub help: bool,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self {
            side: 1024,
            seed: 0,
            params: TerrainParams::default(),
            chunk_size: 128,
            water_level: islet_core::constants::WATER_LEVEL,
            frames: 1,
            width: 1280,
            height: 720,
            shader_path: PathBuf::from("shaders/islet.spv"),
            heightmap: None,
            output: None,
            no_gpu: false,
            regenerate: false,
            help: false,
        }
    }
}

impl DemoArgs {
    /// Parse the process arguments.
    pub fn from_env() -> Self {
        Self::parse(std::env::args().skip(1))
    }

    /// Parse options, ignoring unknown flags and unparsable values.
    pub fn parse<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|a| a.as_ref().to_string()).collect();
        let mut parsed = Self::default();

        let mut i = 0;
        while i < args.len() {
            let value = args.get(i + 1).map(String::as_str);
            let mut consumed = true;
            match args[i].as_str() {
                "--side" => set(&mut parsed.side, value),
                "--seed" => set(&mut parsed.seed, value),
                "--octaves" => set(&mut parsed.params.octaves, value),
                "--persistence" => set(&mut parsed.params.persistence, value),
                "--frequency" => set(&mut parsed.params.frequency, value),
                "--lacunarity" => set(&mut parsed.params.lacunarity, value),
                "--chunk-size" => set(&mut parsed.chunk_size, value),
                "--water-level" => set(&mut parsed.water_level, value),
                "--frames" => set(&mut parsed.frames, value),
                "--width" => set(&mut parsed.width, value),
                "--height" => set(&mut parsed.height, value),
                "--shaders" => {
                    if let Some(path) = value {
                        parsed.shader_path = PathBuf::from(path);
                    }
                }
                "--heightmap" => parsed.heightmap = value.map(PathBuf::from),
                "-o" | "--output" => parsed.output = value.map(PathBuf::from),
                flag => {
                    consumed = false;
                    match flag {
                        "--no-gpu" => parsed.no_gpu = true,
                        "--regenerate" => parsed.regenerate = true,
                        "-h" | "--help" => parsed.help = true,
                        other => tracing::warn!("Ignoring unknown argument {other}"),
                    }
                }
            }
            i += if consumed && value.is_some() { 2 } else { 1 };
        }

        parsed.params = parsed.params.clamped();
        parsed.chunk_size = parsed.chunk_size.max(1);
        parsed
    }
}

fn set<T: std::str::FromStr>(field: &mut T, value: Option<&str>) {
    if let Some(v) = value.and_then(|v| v.parse().ok()) {
        *field = v;
    }
}

pub const HELP: &str = "islet demo: procedural island, hybrid ray traced

USAGE:
    cargo run -p islet-demo -- [OPTIONS]

TERRAIN OPTIONS:
    --side <N>              Height field side in cells (default: 1024)
    --seed <N>              Noise seed (default: 0)
    --octaves <N>           Noise octaves, 1-10 (default: 6)
    --persistence <F>       Amplitude falloff per octave (default: 0.5)
    --frequency <F>         Base frequency (default: 1.0)
    --lacunarity <F>        Frequency growth per octave (default: 2.0)
    --chunk-size <N>        Cells per chunk edge (default: 128)
    --water-level <N>       Height at or below which cells are water (default: 55)
    --heightmap <PATH>      Write the height field as a colour PNG

RENDER OPTIONS:
    --frames <N>            Frames to trace while orbiting (default: 1)
    --width <N>             Output width (default: 1280)
    --height <N>            Output height (default: 720)
    --shaders <PATH>        SPIR-V shader library (default: shaders/islet.spv)
    -o, --output <PATH>     Write the last frame as a PNG
    --regenerate            Regenerate with the next seed halfway through
    --no-gpu                Generate and mesh only

OTHER:
    -h, --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_arguments() {
        assert_eq!(DemoArgs::parse(Vec::<String>::new()), DemoArgs::default());
    }

    #[test]
    fn parses_values_and_flags() {
        let args = DemoArgs::parse([
            "--side", "256", "--seed", "9", "--octaves", "3", "--no-gpu", "-o", "frame.png",
            "--regenerate", "--water-level", "70",
        ]);
        assert_eq!(args.side, 256);
        assert_eq!(args.seed, 9);
        assert_eq!(args.params.octaves, 3);
        assert!(args.no_gpu);
        assert!(args.regenerate);
        assert_eq!(args.output, Some(PathBuf::from("frame.png")));
        assert_eq!(args.water_level, 70);
    }

    #[test]
    fn bad_values_keep_defaults_and_ranges_clamp() {
        let args = DemoArgs::parse(["--side", "big", "--octaves", "0", "--persistence", "7"]);
        assert_eq!(args.side, 1024);
        assert_eq!(args.params.octaves, 1);
        assert!((args.params.persistence - 1.0).abs() < f64::EPSILON);
    }
}
