// Shader module loading
//
// Shaders are precompiled SPIR-V read from `assets/shaders/<Name>.<stage>.spv`.
// Bytecode is consumed as 32-bit words, so a file whose length is not a
// multiple of four is rejected before any module is created.

use ash::vk;
use std::ffi::CStr;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use super::error::{BackendError, BackendResult};
use super::utils;

pub const SHADER_DIR: &str = "assets/shaders";
pub const SHADER_ENTRY_POINT: &CStr = c"main";

/// Pipeline stages a shader file can target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderKind {
    Vertex,
    Fragment,
}

impl ShaderKind {
    /// File-name suffix of the stage.
    pub fn extension(self) -> &'static str {
        match self {
            ShaderKind::Vertex => "vert",
            ShaderKind::Fragment => "frag",
        }
    }

    pub fn stage_flags(self) -> vk::ShaderStageFlags {
        match self {
            ShaderKind::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderKind::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

pub fn shader_path(name: &str, kind: ShaderKind) -> PathBuf {
    Path::new(SHADER_DIR).join(format!("{}.{}.spv", name, kind.extension()))
}

/// Validates SPIR-V bytes and converts them to words.
pub fn spirv_words(bytes: &[u8]) -> BackendResult<Vec<u32>> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return Err(BackendError::Shader(format!(
            "bytecode length {} is not a non-zero multiple of 4",
            bytes.len()
        )));
    }
    ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|e| BackendError::Shader(format!("invalid SPIR-V: {}", e)))
}

pub fn load_spirv(path: &Path) -> BackendResult<Vec<u32>> {
    let bytes = std::fs::read(path).map_err(|source| {
        log::error!("Unable to read shader module: {}", path.display());
        BackendError::ShaderIo {
            path: path.to_path_buf(),
            source,
        }
    })?;

    spirv_words(&bytes).map_err(|e| {
        log::error!("Malformed shader module {}: {}", path.display(), e);
        e
    })
}

/// A shader module plus the stage it is bound to.
#[derive(Debug, Default)]
pub struct ShaderStage {
    pub handle: vk::ShaderModule,
    pub stage: vk::ShaderStageFlags,
}

impl ShaderStage {
    /// Loads `assets/shaders/<name>.<stage>.spv` and creates the module. No
    /// module is created when the file is missing or malformed.
    pub fn create(device: &ash::Device, name: &str, kind: ShaderKind) -> BackendResult<Self> {
        let path = shader_path(name, kind);
        let code = load_spirv(&path)?;
        Self::from_words(device, &code, kind)
    }

    pub fn from_words(device: &ash::Device, code: &[u32], kind: ShaderKind) -> BackendResult<Self> {
        let create_info = vk::ShaderModuleCreateInfo::builder().code(code);

        let handle = unsafe { device.create_shader_module(&create_info, None) }
            .map_err(|e| utils::log_failure("Failed to create shader module", e))?;

        Ok(Self {
            handle,
            stage: kind.stage_flags(),
        })
    }

    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(self.stage)
            .module(self.handle)
            .name(SHADER_ENTRY_POINT)
            .build()
    }

    pub fn destroy(&mut self, device: &ash::Device) {
        if self.handle != vk::ShaderModule::null() {
            unsafe { device.destroy_shader_module(self.handle, None) };
            self.handle = vk::ShaderModule::null();
        }
    }
}
