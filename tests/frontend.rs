// Application-facing pieces: configuration, event routing, renderer without
// a backend, shader lookup.

use ash::vk;
use hearth_renderer::backend::shader::{load_spirv, shader_path, spirv_words, ShaderKind};
use hearth_renderer::backend::swapchain::{choose_present_mode, choose_surface_format, sharing_mode_for};
use hearth_renderer::backend::utils::{result_is_success, vk_result_string};
use hearth_renderer::backend::BackendError;
use hearth_renderer::event::{Event, EventBus, EventCode, ListenerId};
use hearth_renderer::{Config, RenderPacket, Renderer};
use std::path::Path;

#[test]
fn test_config_drives_backend_settings() {
    let config = Config::parse(
        r#"
        [graphics]
        prefer_mailbox = false

        [device]
        require_discrete_gpu = true
        require_compute = true

        [debug]
        validation_layers = false
        "#,
    )
    .unwrap();

    let backend = config.backend_config();
    assert!(!backend.prefer_mailbox);
    assert!(!backend.enable_validation);
    assert!(backend.device_requirements.discrete_gpu);
    assert!(backend.device_requirements.compute);
    assert!(backend
        .device_requirements
        .extensions
        .iter()
        .any(|ext| ext == "VK_KHR_swapchain"));
}

#[test]
fn test_resize_events_reach_renderer_without_backend() {
    let mut bus: EventBus<Renderer> = EventBus::new();
    assert!(bus.register(EventCode::Resized, ListenerId(1), |event, renderer| {
        if let Event::Resized { width, height } = *event {
            renderer.on_resized(width, height);
        }
        true
    }));

    let mut renderer = Renderer::default();
    assert!(bus.fire(&Event::Resized { width: 640, height: 480 }, &mut renderer));
    assert!(!bus.fire(&Event::Quit, &mut renderer));
    assert!(!renderer.draw_frame(&RenderPacket::default()).unwrap());
}

#[test]
fn test_builtin_shader_paths() {
    let vert = shader_path("Builtin.ObjectShader", ShaderKind::Vertex);
    let frag = shader_path("Builtin.ObjectShader", ShaderKind::Fragment);
    assert_eq!(vert, Path::new("assets/shaders/Builtin.ObjectShader.vert.spv"));
    assert_eq!(frag, Path::new("assets/shaders/Builtin.ObjectShader.frag.spv"));
}

#[test]
fn test_missing_shader_file() {
    let err = load_spirv(Path::new("assets/shaders/Missing.vert.spv")).unwrap_err();
    assert!(matches!(err, BackendError::ShaderIo { .. }));
    assert!(err.is_fatal());
}

#[test]
fn test_misaligned_bytecode() {
    assert!(matches!(spirv_words(&[0x03, 0x02, 0x23]), Err(BackendError::Shader(_))));
    assert!(matches!(spirv_words(&[]), Err(BackendError::Shader(_))));
}

#[test]
fn test_surface_choices() {
    let formats = [
        vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        },
        vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        },
    ];
    assert_eq!(
        choose_surface_format(&formats).map(|f| f.format),
        Some(vk::Format::B8G8R8A8_UNORM)
    );

    let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
    assert_eq!(choose_present_mode(&modes, true), vk::PresentModeKHR::MAILBOX);
    assert_eq!(choose_present_mode(&modes, false), vk::PresentModeKHR::FIFO);
    assert_eq!(choose_present_mode(&modes[..1], true), vk::PresentModeKHR::FIFO);

    assert_eq!(sharing_mode_for(0, 0).0, vk::SharingMode::EXCLUSIVE);
    assert_eq!(sharing_mode_for(0, 1), (vk::SharingMode::CONCURRENT, vec![0, 1]));
}

#[test]
fn test_result_classification() {
    assert!(result_is_success(vk::Result::SUBOPTIMAL_KHR));
    assert!(!result_is_success(vk::Result::ERROR_OUT_OF_DATE_KHR));
    assert_eq!(vk_result_string(vk::Result::ERROR_DEVICE_LOST, false), "VK_ERROR_DEVICE_LOST");
}
