#[test]
#[cfg(feature = "integration-tests")]
fn should_render_clear_colour() {
    use dusk_ngin::{context::Context, flow::Scene, gpu::wgpu_backend::WgpuGpu, resources::AssetLoader};

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let gpu = runtime.block_on(WgpuGpu::headless(4, 4)).unwrap();
    let mut ctx = Context::new(gpu, AssetLoader::with_defaults(".")).unwrap();

    let mut scene = Scene::new(4, 4);
    scene.clear_colour = [1.0, 1.0, 1.0, 1.0];
    scene.render(&mut ctx).unwrap();

    let pixels = ctx.gpu.read_pixels().unwrap();
    assert_eq!(pixels.len(), 4 * 4 * 4);
    assert!(pixels.iter().all(|&v| v == 255));
}
