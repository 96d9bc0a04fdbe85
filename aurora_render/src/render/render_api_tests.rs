use crate::error::Error;
use crate::render::config::Config;
use crate::render::context::{BindingModel, RenderContext};
use crate::render::mock_backend::{self, MockBackend};
use crate::render::render_api::*;

#[test]
fn test_api_names() {
    assert_eq!(RenderApi::OpenGl.to_string(), "OpenGL");
    assert_eq!(RenderApi::from_name("vulkan"), Some(RenderApi::Vulkan));
    assert_eq!(RenderApi::from_name("D3D12"), Some(RenderApi::D3d12));
    assert_eq!(RenderApi::from_name("metal"), None);
}

#[test]
fn test_registry_builds_registered_backend() {
    let log = mock_backend::new_log();
    let mut registry = BackendRegistry::new();
    registry.register(RenderApi::Vulkan, MockBackend::factory(RenderApi::Vulkan, BindingModel::Deferred, &log));

    let context = RenderContext::new(BindingModel::Immediate, 640, 480).into_shared();
    let backend = registry.build(RenderApi::Vulkan, &Config::default(), context.clone()).unwrap();

    assert_eq!(backend.api(), RenderApi::Vulkan);
    assert_eq!(context.lock().unwrap().binding_model(), BindingModel::Deferred);
    assert_eq!(registry.available(), vec![RenderApi::Vulkan]);
}

#[test]
fn test_registry_reports_missing_backend() {
    let registry = BackendRegistry::new();
    let context = RenderContext::new(BindingModel::Immediate, 640, 480).into_shared();
    let result = registry.build(RenderApi::D3d12, &Config::default(), context);
    assert!(matches!(result, Err(Error::BackendUnavailable(_))));
    assert!(!registry.is_registered(RenderApi::D3d12));
}
