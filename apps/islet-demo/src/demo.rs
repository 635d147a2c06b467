//! Scene setup and the headless frame loop.

use crate::args::DemoArgs;
use crate::camera::OrbitCamera;
use anyhow::Context;
use glam::Vec3;
use islet_rt::{
    FrameStats, InstanceId, Material, RayTracingBackend, SceneOrchestrator, TerrainScene,
    TerrainSceneConfig,
};
use islet_world::{ChunkMeshBuilder, ColorLut, HeightField, HeightFieldConfig, MeshingConfig};
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Terrain settings derived from the command line.
pub fn terrain_config(args: &DemoArgs, seed: u32) -> TerrainSceneConfig {
    TerrainSceneConfig::default()
        .with_scale(4.0 / args.side.max(1) as f32)
        .with_field(HeightFieldConfig::default().with_side(args.side).with_seed(seed))
        .with_meshing(
            MeshingConfig::default()
                .with_chunk_size(args.chunk_size)
                .with_water_level(args.water_level),
        )
}

/// The reflective cube and the open box shown next to the island.
pub fn add_default_objects<B: RayTracingBackend>(
    scene: &mut SceneOrchestrator<B>,
) -> islet_rt::Result<[InstanceId; 2]> {
    let cube = scene.create_cube(Material::specular(Vec3::new(0.8, 0.2, 0.2), 350.0))?;
    if let Some(instance) = scene.instance_mut(cube) {
        instance.set_position(Vec3::new(2.0, 0.0, 0.0));
    }

    let open_box = scene.create_empty_cube(Material::diffuse(Vec3::new(0.9, 0.8, 0.6)))?;
    if let Some(instance) = scene.instance_mut(open_box) {
        instance.set_position(Vec3::new(-2.0, 0.0, 0.0));
        instance.set_rotation(0.5);
    }

    Ok([cube, open_box])
}

/// Trace `args.frames` frames while orbiting the island.
///
/// With `args.regenerate` the terrain is rebuilt from the next seed halfway
/// through, exercising the remove and rebuild paths mid-run.
pub fn run_orbit<B: RayTracingBackend>(
    scene: &mut SceneOrchestrator<B>,
    terrain: &mut TerrainScene,
    args: &DemoArgs,
) -> anyhow::Result<Vec<FrameStats>> {
    let mut camera = OrbitCamera::with_aspect(args.width, args.height);
    let step = std::f32::consts::TAU / args.frames.max(1) as f32;
    let halfway = args.frames / 2;

    let mut frames = Vec::with_capacity(args.frames as usize);
    for frame in 0..args.frames {
        if args.regenerate && frame == halfway && frame > 0 {
            let seed = terrain.config().field.seed.wrapping_add(1);
            terrain.remove_from(scene)?;
            *terrain = TerrainScene::new(terrain_config(args, seed));
            terrain.regenerate(scene, &args.params)?;
        }

        let start = Instant::now();
        let stats = scene.render_frame(&camera)?;
        tracing::debug!(
            "Frame {frame}: {} instances, tlas rebuilt {}, traced {} in {:.2?}",
            stats.instances,
            stats.tlas_rebuilt,
            stats.traced,
            start.elapsed()
        );
        frames.push(stats);
        camera.orbit(step);
    }
    Ok(frames)
}

/// Generate and mesh the island without touching the GPU.
pub fn mesh_only(args: &DemoArgs) -> anyhow::Result<()> {
    let config = terrain_config(args, args.seed);
    let mut field = HeightField::new(config.field);

    let start = Instant::now();
    field.generate(&args.params);
    let generated = start.elapsed();

    let chunks = ChunkMeshBuilder::new(&field, &config.palette, config.meshing).build_parallel();
    let triangles: usize = chunks
        .iter()
        .map(|c| c.land.triangle_count() + c.water.triangle_count())
        .sum();
    info!(
        "Meshed {} chunks ({triangles} triangles): noise {generated:.2?}, total {:.2?}",
        chunks.len(),
        start.elapsed()
    );

    if let Some(path) = &args.heightmap {
        save_heightmap(&field, &config.palette, path)?;
    }
    Ok(())
}

/// Write a height field as a PNG coloured through `palette`.
pub fn save_heightmap(field: &HeightField, palette: &ColorLut, path: &Path) -> anyhow::Result<()> {
    let side = u32::try_from(field.side()).context("height field too large for an image")?;
    let pixels: Vec<u8> = field
        .samples()
        .iter()
        .flat_map(|&h| palette.lookup(h))
        .collect();
    let image = image::RgbImage::from_raw(side, side, pixels)
        .context("height field sample count does not match its side")?;
    image
        .save(path)
        .with_context(|| format!("writing {}", path.display()))?;
    info!("Height map saved: {}", path.display());
    Ok(())
}

/// Write RGBA8 pixels as a PNG.
pub fn save_frame(pixels: Vec<u8>, width: u32, height: u32, path: &Path) -> anyhow::Result<()> {
    let image = image::RgbaImage::from_raw(width, height, pixels)
        .context("frame size does not match the output extent")?;
    image
        .save(path)
        .with_context(|| format!("writing {}", path.display()))?;
    info!("Frame saved: {}", path.display());
    Ok(())
}

/// Build the scene on the Vulkan backend and trace the orbit.
#[cfg(feature = "vulkan")]
pub fn run_gpu(args: &DemoArgs) -> anyhow::Result<()> {
    use islet_rt::{VulkanBackend, VulkanBackendConfig};

    let backend = VulkanBackend::new(&VulkanBackendConfig {
        width: args.width,
        height: args.height,
        shader_path: args.shader_path.clone(),
        ..VulkanBackendConfig::default()
    })?;
    let mut scene = SceneOrchestrator::new(backend)?;
    add_default_objects(&mut scene)?;

    let mut terrain = TerrainScene::new(terrain_config(args, args.seed));
    let stats = terrain.regenerate(&mut scene, &args.params)?;
    info!(
        "Island ready: {} chunks, {} instances, {} triangles",
        stats.chunks, stats.instances, stats.triangles
    );
    if let Some(path) = &args.heightmap {
        save_heightmap(terrain.field(), &terrain.config().palette, path)?;
    }

    let frames = run_orbit(&mut scene, &mut terrain, args)?;
    info!("Traced {} frames", frames.iter().filter(|f| f.traced).count());

    if let Some(path) = &args.output {
        let [width, height] = scene.backend().output_extent();
        let pixels = scene.backend().read_output()?;
        save_frame(pixels, width, height, path)?;
    }

    terrain.remove_from(&mut scene)?;
    drop(scene.destroy()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use islet_rt::testing::RecordingBackend;

    fn small_args() -> DemoArgs {
        DemoArgs {
            side: 32,
            chunk_size: 16,
            frames: 4,
            ..DemoArgs::default()
        }
    }

    #[test]
    fn heightmap_uses_palette_colours() {
        let field = HeightField::from_samples(2, vec![0, 60, 100, 255]).unwrap();
        let palette = ColorLut::default();
        let path = std::env::temp_dir().join(format!("islet-heightmap-{}.png", std::process::id()));

        save_heightmap(&field, &palette, &path).unwrap();
        let image = image::open(&path).unwrap().to_rgb8();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(image.dimensions(), (2, 2));
        assert_eq!(image.get_pixel(1, 0).0, palette.lookup(60));
        assert_eq!(image.get_pixel(1, 1).0, palette.lookup(255));
    }

    #[test]
    fn default_objects_are_placed() {
        let mut scene = SceneOrchestrator::new(RecordingBackend::new()).unwrap();
        let [cube, open_box] = add_default_objects(&mut scene).unwrap();

        let cube = scene.instance(cube).unwrap();
        assert_eq!(cube.transform().position, Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(cube.material().hit_group(), islet_rt::HitGroup::Specular);

        let open_box = scene.instance(open_box).unwrap();
        assert!((open_box.transform().rotation_x - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn orbit_traces_every_frame() {
        let args = small_args();
        let mut scene = SceneOrchestrator::new(RecordingBackend::new()).unwrap();
        add_default_objects(&mut scene).unwrap();
        let mut terrain = TerrainScene::new(terrain_config(&args, args.seed));
        terrain.regenerate(&mut scene, &args.params).unwrap();

        let frames = run_orbit(&mut scene, &mut terrain, &args).unwrap();
        assert_eq!(frames.len(), 4);
        assert!(frames.iter().all(|f| f.traced));
        // Only the first frame has pending rebuilds
        assert!(frames[0].tlas_rebuilt);
        assert!(frames[1..].iter().all(|f| !f.tlas_rebuilt));
        assert_eq!(scene.backend().dispatches().len(), 4);
    }

    #[test]
    fn regenerate_swaps_terrain_halfway() {
        let args = DemoArgs {
            regenerate: true,
            ..small_args()
        };
        let mut scene = SceneOrchestrator::new(RecordingBackend::new()).unwrap();
        let mut terrain = TerrainScene::new(terrain_config(&args, args.seed));
        terrain.regenerate(&mut scene, &args.params).unwrap();

        let frames = run_orbit(&mut scene, &mut terrain, &args).unwrap();
        assert!(frames[2].tlas_rebuilt);
        assert!(frames[2].hit_table_rebuilt);
        assert_eq!(terrain.config().field.seed, args.seed + 1);
        assert_eq!(scene.instances().len(), terrain.instances().len());
    }
}
