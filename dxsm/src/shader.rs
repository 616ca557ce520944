//! The Vulkan boundary: turning emitted words into a shader module.
use ash::vk;
use log::warn;

use dxsm_core::parse::Stage;

use crate::TranslatedShader;

impl TranslatedShader {
    pub fn stage_flags(&self) -> vk::ShaderStageFlags {
        match self.stage {
            Stage::Vertex => vk::ShaderStageFlags::VERTEX,
            Stage::Pixel => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    /// Create the `VkShaderModule` for the emitted SPIR-V. Ownership of the
    /// handle passes to the caller; a malformed module surfaces here as the
    /// driver's `VkResult`.
    pub fn create_module(&self, device: &ash::Device) -> Result<vk::ShaderModule, vk::Result> {
        let create_info = vk::ShaderModuleCreateInfo::default().code(&self.words);
        unsafe { device.create_shader_module(&create_info, None) }.map_err(|err| {
            warn!("shader module creation failed: {err}");
            err
        })
    }
}
