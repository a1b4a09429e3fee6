//! Whole frames rendered against the recording backend.

use cgmath::{Matrix4, SquareMatrix, Vector3};

use umbra::config::CameraConfig;
use umbra::gfx::device::recording::{Command, RecordingDevice};
use umbra::gfx::device::{GraphicsContext, ShaderStage};
use umbra::gfx::geometry::generate_cube;
use umbra::gfx::lights::SceneLighting;
use umbra::gfx::rendering::cubemap::gradient_sky_faces;
use umbra::gfx::rendering::{CubeFace, Cubemap, FrameRenderer, Programs, ShadowPassState, Sky};
use umbra::gfx::resources::{ImageData, Material};
use umbra::gfx::scene::{Entity, Scene};
use umbra::gfx::FlyCamera;
use umbra::input::Input;
use umbra::{RenderError, RendererConfig};

struct Fixture {
    device: RecordingDevice,
    programs: Programs,
    renderer: FrameRenderer,
    scene: Scene,
}

fn fixture(with_sky: bool) -> Fixture {
    let mut device = RecordingDevice::new(160, 90);
    let config = RendererConfig::default().with_size(160, 90).with_shadow_resolution(32);
    let programs = Programs::new(&mut device).unwrap();

    let sky = if with_sky {
        let faces = gradient_sky_faces(4, [0, 0, 200, 255], [150, 150, 255, 255], [40, 40, 40, 255]);
        let day = Cubemap::from_faces(&mut device, "day", &faces).unwrap();
        Some(Sky::new(&mut device, &programs, day, None).unwrap())
    } else {
        None
    };
    let renderer = FrameRenderer::new(&mut device, &config, &programs, sky).unwrap();

    let camera = FlyCamera::new(config.aspect_ratio(), &CameraConfig::default());
    let mut scene = Scene::new(camera, SceneLighting::reference(config.ambient_color));
    let cube = scene.add_mesh(&mut device, "cube", &generate_cube()).unwrap();
    let material = scene.add_material(
        Material::new("plain", programs.lit_vertex.clone(), programs.lit_pixel.clone()).unwrap(),
    );
    scene.add_entity(Entity::new("cube", cube, material));

    Fixture {
        device,
        programs,
        renderer,
        scene,
    }
}

fn read_f32(bytes: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}

#[test]
fn identity_entity_sits_in_front_of_the_camera() {
    let mut f = fixture(true);
    f.scene.update(1.0 / 60.0, &Input::new());
    f.renderer.render(&mut f.device, &f.scene).unwrap();
    assert_eq!(f.scene.entities[0].transform.world_matrix(), Matrix4::identity());

    let buffer = f.programs.lit_vertex.constant_buffer().unwrap();
    let bytes = f.device.buffer_contents(buffer).unwrap();

    // world is identity
    for column in 0..4 {
        for row in 0..4 {
            let expected = if column == row { 1.0 } else { 0.0 };
            assert_eq!(read_f32(bytes, (column * 4 + row) * 4), expected);
        }
    }

    // view * origin: camera at z = -5 looking down +Z puts the origin at z = 5
    let view_offset = 128;
    let translation_z = read_f32(bytes, view_offset + (3 * 4 + 2) * 4);
    assert!((translation_z - 5.0).abs() < 1e-5);
}

#[test]
fn shadow_draws_precede_lit_draws_and_sky_is_last() {
    let mut f = fixture(true);
    let report = f.renderer.render(&mut f.device, &f.scene).unwrap();
    assert_eq!(report.draw_calls, 3);

    let draws: Vec<_> = f
        .device
        .commands()
        .iter()
        .filter_map(|c| match c {
            Command::DrawIndexed {
                color_target,
                pixel_shader,
                vertex_shader,
                ..
            } => Some((*color_target, *pixel_shader, *vertex_shader)),
            _ => None,
        })
        .collect();
    assert_eq!(draws.len(), 3);

    // depth only
    assert_eq!(draws[0].0, None);
    assert_eq!(draws[0].1, None);
    assert_eq!(draws[0].2, Some(f.programs.shadow_vertex.shader()));
    // lit
    assert_eq!(draws[1].1, Some(f.programs.lit_pixel.shader()));
    // sky
    assert_eq!(draws[2].2, Some(f.programs.sky_vertex.shader()));
}

#[test]
fn frames_are_hazard_free() {
    let mut f = fixture(true);
    for _ in 0..3 {
        f.renderer.render(&mut f.device, &f.scene).unwrap();
    }
    assert!(f.device.hazards().is_empty());
    assert_eq!(f.device.frames_presented(), 3);
    assert_eq!(f.renderer.shadow_map().state(), ShadowPassState::Idle);
}

#[test]
fn main_targets_are_bound_again_after_present() {
    let mut f = fixture(false);
    f.renderer.render(&mut f.device, &f.scene).unwrap();

    let targets = *f.renderer.targets();
    assert_eq!(
        f.device.bound_targets(),
        (Some(targets.color), Some(targets.depth.depth_view))
    );
}

#[test]
fn shadow_map_is_unbound_before_depth_writes() {
    let mut f = fixture(false);
    f.renderer.render(&mut f.device, &f.scene).unwrap();
    f.device.clear_log();
    f.renderer.render(&mut f.device, &f.scene).unwrap();

    let commands = f.device.commands();
    let shadow_dsv = f.renderer.shadow_map().depth_target().depth_view;
    let bind = commands
        .iter()
        .position(|c| matches!(c, Command::SetRenderTargets { depth: Some(d), .. } if *d == shadow_dsv))
        .unwrap();
    assert!(commands[..bind]
        .iter()
        .any(|c| matches!(c, Command::UnbindShaderResources { stage: ShaderStage::Pixel })));
}

#[test]
fn cubemap_slices_follow_face_order() {
    let mut device = RecordingDevice::new(8, 8);
    let colors: Vec<[u8; 4]> = (0..6u8).map(|i| [i * 40, 255 - i * 40, i, 255]).collect();
    let faces: Vec<ImageData> = colors.iter().map(|&c| ImageData::solid(2, 2, c)).collect();
    let cubemap = Cubemap::from_faces(&mut device, "faces", &faces).unwrap();

    for face in CubeFace::ALL {
        let layer = device.texture_layer(cubemap.texture, face.slice()).unwrap();
        assert_eq!(&layer[..4], &colors[face.slice() as usize]);
    }

    let up = device.sample_cube(cubemap.view, Vector3::new(0.0, 1.0, 0.0)).unwrap();
    assert_eq!(up, colors[2].to_vec());
    let back = device.sample_cube(cubemap.view, Vector3::new(0.0, 0.0, -1.0)).unwrap();
    assert_eq!(back, colors[5].to_vec());
}

#[test]
fn out_of_order_shadow_transitions_are_rejected() {
    let mut f = fixture(false);
    let targets = *f.renderer.targets();
    let shadow = f.renderer.shadow_map_mut();

    let err = shadow.begin_sampling(&mut f.device, &targets).unwrap_err();
    assert!(matches!(
        err,
        RenderError::InvalidPassTransition {
            from: "Idle",
            to: "Sampling"
        }
    ));

    shadow.begin_depth_pass(&mut f.device).unwrap();
    assert!(shadow.begin_depth_pass(&mut f.device).is_err());
    shadow.reset(&mut f.device);
    assert_eq!(shadow.state(), ShadowPassState::Idle);
}

#[test]
fn present_unbinds_targets() {
    let mut device = RecordingDevice::new(8, 8);
    device.set_render_targets(Some(umbra::gfx::device::RenderTargetView::BACK_BUFFER), None);
    device.present(false).unwrap();
    assert_eq!(device.bound_targets(), (None, None));
}
