//! Reflection data collected alongside the IR: resources, uniforms and the
//! techniques that tie shaders and render states together.

use std::collections::BTreeMap;

use crate::middle::{constant::Constant, ir::Id, ty::Type};

/// Name to value map attached to declarations with `< ... >`
pub type Annotations = BTreeMap<String, Annotation>;

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub ty: Type,
    pub value: Constant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureInfo {
    pub id: Id,
    pub name: String,
    pub unique_name: String,
    pub semantic: String,
    pub width: u32,
    pub height: u32,
    pub levels: u32,
    pub format: u32,
    pub annotations: Annotations,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplerInfo {
    pub id: Id,
    pub name: String,
    pub unique_name: String,
    pub texture_name: String,
    pub address_u: u32,
    pub address_v: u32,
    pub address_w: u32,
    pub filter: u32,
    pub srgb: bool,
    pub min_lod: f32,
    pub max_lod: f32,
    pub lod_bias: f32,
    pub annotations: Annotations,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UniformInfo {
    pub name: String,
    pub ty: Type,
    pub member_index: u32,
    pub offset: u32,
    pub size: u32,
    pub initializer: Option<Constant>,
    pub annotations: Annotations,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PassInfo {
    pub name: String,
    pub vertex_shader: Option<Id>,
    pub pixel_shader: Option<Id>,
    pub render_targets: [Option<String>; 8],
    pub clear_render_targets: bool,
    pub srgb_write_enable: bool,
    pub blend_enable: bool,
    pub stencil_enable: bool,
    pub color_write_mask: u32,
    pub stencil_read_mask: u32,
    pub stencil_write_mask: u32,
    pub blend_op: u32,
    pub blend_op_alpha: u32,
    pub src_blend: u32,
    pub src_blend_alpha: u32,
    pub dest_blend: u32,
    pub dest_blend_alpha: u32,
    pub stencil_comparison_func: u32,
    pub stencil_reference_value: u32,
    pub stencil_op_pass: u32,
    pub stencil_op_fail: u32,
    pub stencil_op_depth_fail: u32,
}

impl Default for PassInfo {
    fn default() -> Self {
        Self {
            name: String::new(),
            vertex_shader: None,
            pixel_shader: None,
            render_targets: Default::default(),
            clear_render_targets: true,
            srgb_write_enable: false,
            blend_enable: false,
            stencil_enable: false,
            color_write_mask: 0xF,
            stencil_read_mask: 0xFF,
            stencil_write_mask: 0xFF,
            blend_op: 1,
            blend_op_alpha: 1,
            src_blend: 1,
            src_blend_alpha: 1,
            dest_blend: 0,
            dest_blend_alpha: 0,
            stencil_comparison_func: 8,
            stencil_reference_value: 0,
            stencil_op_pass: 1,
            stencil_op_fail: 1,
            stencil_op_depth_fail: 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TechniqueInfo {
    pub name: String,
    pub annotations: Annotations,
    pub passes: Vec<PassInfo>,
}

/// Everything besides IR the parse of an effect produces
#[derive(Debug, Clone, Default)]
pub struct EffectInfo {
    pub textures: Vec<TextureInfo>,
    pub samplers: Vec<SamplerInfo>,
    pub uniforms: Vec<UniformInfo>,
    pub techniques: Vec<TechniqueInfo>,
}

impl EffectInfo {
    pub fn texture(&self, id: Id) -> Option<&TextureInfo> {
        self.textures.iter().find(|t| t.id == id)
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformInfo> {
        self.uniforms.iter().find(|u| u.name == name)
    }
}

/// Properties of a texture or sampler declaration block. Which ones are
/// meaningful depends on the declared type.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableProperties {
    pub texture: Option<Id>,
    pub width: u32,
    pub height: u32,
    pub levels: u32,
    pub format: u32,
    pub srgb: bool,
    pub address_u: u32,
    pub address_v: u32,
    pub address_w: u32,
    pub filter: u32,
    pub min_lod: f32,
    pub max_lod: f32,
    pub lod_bias: f32,
}

impl Default for VariableProperties {
    fn default() -> Self {
        Self {
            texture: None,
            width: 1,
            height: 1,
            levels: 1,
            format: 8,
            srgb: false,
            address_u: 1,
            address_v: 1,
            address_w: 1,
            // Linear minification, magnification and mip filtering
            filter: 0x15,
            min_lod: -f32::MAX,
            max_lod: f32::MAX,
            lod_bias: 0.0,
        }
    }
}
