//! Descriptor-block synthesis and the preamble constants.
//!
//! Before any instruction is lowered the translator fixes the uniform
//! interface the host binds against: the shader-constant block, the
//! render-state block and, for pixel stages, the sampled-image array and the
//! texture-stage state array. Binding numbers are part of the host contract
//! and never move.
use log::debug;
use spirv::{Decoration, Op, StorageClass};

use dxsm_core::parse::Stage;
use dxsm_core::ty::TypeDescriptor;

use crate::consts;
use crate::Translator;

impl<'a> Translator<'a> {
    /// The scalar and small-integer constants every translation reuses.
    pub(crate) fn generate_constant_indices(&mut self) {
        self.float_0 = self.const_f32(0.0);
        self.module.name(self.float_0, "float_0");
        self.float_1 = self.const_f32(1.0);
        self.module.name(self.float_1, "float_1");
        self.float_neg_1 = self.const_f32(-1.0);
        self.module.name(self.float_neg_1, "float_n1");

        self.vec4_0 = self.vec4_constant([self.float_0; 4]);
        self.module.name(self.vec4_0, "vec4_0");
        self.vec4_1 = self.vec4_constant([self.float_1; 4]);
        self.module.name(self.vec4_1, "vec4_1");

        for i in 0..self.const_ints.len() {
            let id = self.const_int(i as u32);
            self.const_ints[i] = id;
            self.module.name(id, &format!("int_{}", i));
        }
        self.types.set_length_constants(self.const_ints);
    }

    /// Constants that depend on the preamble: the packed-color divisor and
    /// the clip-space Y flip.
    pub(crate) fn generate_value_constants(&mut self) {
        self.float_255 = self.const_f32(255.0);
        self.vec4_255 = self.vec4_constant([self.float_255; 4]);
        self.vec4_y_flip = self.vec4_constant([
            self.float_1,
            self.float_neg_1,
            self.float_1,
            self.float_1,
        ]);
        debug!(
            "value constants ready (packed-color divisor {}, y-flip vector {})",
            self.vec4_255, self.vec4_y_flip
        );
    }

    fn vec4_constant(&mut self, parts: [u32; 4]) -> u32 {
        let ty = TypeDescriptor::vector(Op::TypeFloat, 4);
        let ty_id = self.type_id(&ty);
        let id = self.new_id(&ty);
        self.module.constant_composite(ty_id, id, &parts);
        id
    }

    /// The `i#`/`b#`/`c#` constant file as one uniform block.
    pub(crate) fn generate_constants_block(&mut self) {
        let int_ty = self.type_id(&TypeDescriptor::int());
        let ivec4_ty = self.type_id(&TypeDescriptor::vector(Op::TypeInt, 4));
        let vec4_ty = self.type_id(&TypeDescriptor::vector(Op::TypeFloat, 4));

        let struct_ty = self.module.alloc_id();
        let pointer_ty = self.module.alloc_id();
        let variable = self.module.alloc_id();

        self.module.decorate(struct_ty, Decoration::Block, &[]);
        self.module
            .decorate(variable, Decoration::DescriptorSet, &[consts::DESCRIPTOR_SET]);
        let binding = match self.stage {
            Stage::Vertex => consts::VS_CONSTANTS_BINDING,
            Stage::Pixel => consts::PS_CONSTANTS_BINDING,
        };
        self.module.decorate(variable, Decoration::Binding, &[binding]);

        let mut members = vec![struct_ty];
        let mut member = 0u32;
        let mut offset = 0u32;
        for _ in 0..self.config.int_vector_slots {
            members.push(ivec4_ty);
            self.module
                .member_decorate(struct_ty, member, Decoration::Offset, &[offset]);
            member += 1;
            offset += 16;
        }
        for _ in 0..self.config.bool_slots {
            members.push(int_ty);
            self.module
                .member_decorate(struct_ty, member, Decoration::Offset, &[offset]);
            member += 1;
            offset += 4;
        }
        for _ in 0..self.config.float_vector_slots {
            members.push(vec4_ty);
            self.module
                .member_decorate(struct_ty, member, Decoration::Offset, &[offset]);
            member += 1;
            offset += 16;
        }
        self.module.ty_instr(Op::TypeStruct, &members);
        self.module.ty_instr(
            Op::TypePointer,
            &[pointer_ty, StorageClass::Uniform as u32, struct_ty],
        );
        self.module
            .variable(pointer_ty, variable, StorageClass::Uniform);
        self.module.name(variable, "shader_constants");
        self.constants_block = variable;
    }

    /// One uint per render-state slot.
    pub(crate) fn generate_render_state_block(&mut self) {
        let int_ty = self.type_id(&TypeDescriptor::int());

        let struct_ty = self.module.alloc_id();
        let pointer_ty = self.module.alloc_id();
        let variable = self.module.alloc_id();

        self.module.decorate(struct_ty, Decoration::Block, &[]);
        self.module
            .decorate(variable, Decoration::DescriptorSet, &[consts::DESCRIPTOR_SET]);
        self.module
            .decorate(variable, Decoration::Binding, &[consts::RENDER_STATE_BINDING]);

        let mut members = vec![struct_ty];
        for member in 0..consts::RENDER_STATE_MEMBERS {
            members.push(int_ty);
            self.module
                .member_decorate(struct_ty, member, Decoration::Offset, &[member * 4]);
        }
        self.module.ty_instr(Op::TypeStruct, &members);
        self.module.ty_instr(
            Op::TypePointer,
            &[pointer_ty, StorageClass::Uniform as u32, struct_ty],
        );
        self.module
            .variable(pointer_ty, variable, StorageClass::Uniform);
        self.module.name(variable, "render_state");
        self.render_state_block = variable;
    }

    /// The sampled-image array the `s#` registers chain into.
    pub(crate) fn generate_textures_block(&mut self) {
        let array = TypeDescriptor {
            primary: Op::TypeArray,
            secondary: Op::TypeImage,
            component_count: consts::SAMPLER_SLOTS,
            ..Default::default()
        };
        let array_ty = self.type_id(&array);

        let pointer_ty = self.module.alloc_id();
        let variable = self.module.alloc_id();
        self.module.ty_instr(
            Op::TypePointer,
            &[pointer_ty, StorageClass::UniformConstant as u32, array_ty],
        );
        self.module
            .variable(pointer_ty, variable, StorageClass::UniformConstant);
        self.module
            .decorate(variable, Decoration::DescriptorSet, &[consts::DESCRIPTOR_SET]);
        self.module
            .decorate(variable, Decoration::Binding, &[consts::TEXTURES_BINDING]);
        self.module.name(variable, "textures");
        self.textures_block = variable;
    }

    /// Fixed-function texture-stage state, one struct of uints per stage.
    pub(crate) fn generate_texture_stages_block(&mut self) {
        let int_ty = self.type_id(&TypeDescriptor::int());

        let struct_ty = self.module.alloc_id();
        let array_ty = self.module.alloc_id();
        let pointer_ty = self.module.alloc_id();
        let variable = self.module.alloc_id();

        self.module.decorate(struct_ty, Decoration::Block, &[]);
        self.module
            .decorate(variable, Decoration::DescriptorSet, &[consts::DESCRIPTOR_SET]);
        self.module
            .decorate(variable, Decoration::Binding, &[consts::TEXTURE_STAGE_BINDING]);

        let mut members = vec![struct_ty];
        for member in 0..consts::TEXTURE_STAGE_MEMBERS {
            members.push(int_ty);
            self.module
                .member_decorate(struct_ty, member, Decoration::Offset, &[member * 4]);
        }
        self.module.ty_instr(Op::TypeStruct, &members);
        self.module.ty_instr(
            Op::TypeArray,
            &[
                array_ty,
                struct_ty,
                self.const_ints[consts::TEXTURE_STAGE_SLOTS as usize],
            ],
        );
        self.module.ty_instr(
            Op::TypePointer,
            &[pointer_ty, StorageClass::Uniform as u32, array_ty],
        );
        self.module
            .variable(pointer_ty, variable, StorageClass::Uniform);
        self.module.name(variable, "texture_stages");
        self.texture_stages_block = variable;
    }

    /// Load one uint field of a texture-stage struct, reinterpreted as the
    /// float the host packed into it.
    pub(crate) fn texture_stage_float(&mut self, stage: u32, member: u32) -> u32 {
        let ptr_ty = TypeDescriptor::scalar_pointer(Op::TypeInt, StorageClass::Uniform);
        let ptr_ty_id = self.type_id(&ptr_ty);
        let stage_index = self.const_int(stage);
        let member_index = self.const_int(member);
        let chain = self.new_id(&ptr_ty);
        let block = self.texture_stages_block;
        self.module.code(
            Op::AccessChain,
            &[ptr_ty_id, chain, block, stage_index, member_index],
        );

        let uint = self.push_load(chain);
        let float_ty = TypeDescriptor::float();
        let float_ty_id = self.type_id(&float_ty);
        let out = self.new_id(&float_ty);
        self.module.code(Op::Bitcast, &[float_ty_id, out, uint]);
        out
    }
}
