//! End-to-end translation scenarios over hand-assembled token streams.
use dxsm_core::spirv::{Op, StorageClass};
use dxsm_core::spv::{Instr, Instrs};
use pretty_assertions::assert_eq;

mod asm {
    //! Just enough of a D3D9 shader assembler to build test streams.
    use dxsm_core::parse::{Comparison, Opcode, RegisterType, Usage};

    pub const VS_2_0: u32 = 0xFFFE_0200;
    pub const PS_2_0: u32 = 0xFFFF_0200;
    pub const END: u32 = 0x0000_FFFF;

    fn register_bits(class: RegisterType) -> u32 {
        ((class as u32 & 0x7) << 28) | ((class as u32 & 0x18) << 8)
    }

    pub fn op(opcode: Opcode) -> u32 {
        opcode as u32
    }

    pub fn ifc(comparison: Comparison) -> u32 {
        Opcode::Ifc as u32 | ((comparison as u32) << 16)
    }

    /// Destination parameter token with a write mask, `0bwzyx`.
    pub fn dst(class: RegisterType, number: u32, mask: u32) -> u32 {
        0x8000_0000 | register_bits(class) | (mask << 16) | number
    }

    /// Source parameter token with the identity swizzle.
    pub fn src(class: RegisterType, number: u32) -> u32 {
        src_swizzled(class, number, [0, 1, 2, 3])
    }

    pub fn src_swizzled(class: RegisterType, number: u32, lanes: [u32; 4]) -> u32 {
        let swizzle = lanes[0] | (lanes[1] << 2) | (lanes[2] << 4) | (lanes[3] << 6);
        0x8000_0000 | register_bits(class) | (swizzle << 16) | number
    }

    /// The usage token of a `dcl`.
    pub fn dcl_usage(usage: Usage, index: u32) -> u32 {
        0x8000_0000 | usage as u32 | (index << 16)
    }
}

use dxsm_core::parse::{Comparison, Opcode, RegisterType, Usage};

use asm::*;

/// Scanner over an assembled module.
struct Module {
    words: Vec<u32>,
}

impl Module {
    fn translate(tokens: &[u32]) -> Module {
        let _ = env_logger::builder().is_test(true).try_init();
        let shader = dxsm::translate(tokens).expect("translation failed");
        Module {
            words: shader.into_words(),
        }
    }

    fn instrs(&self) -> Vec<Instr<'_>> {
        Instrs::of_module(&self.words).unwrap().collect()
    }

    fn find_all(&self, op: Op) -> Vec<Instr<'_>> {
        self.instrs()
            .into_iter()
            .filter(|x| x.op() == Some(op))
            .collect()
    }

    fn count(&self, op: Op) -> usize {
        self.find_all(op).len()
    }

    fn bound(&self) -> u32 {
        self.words[3]
    }

    /// Result id of the (single) 32-bit int/float type declaration.
    fn int_type(&self) -> u32 {
        let types = self.find_all(Op::TypeInt);
        assert_eq!(types.len(), 1, "duplicate OpTypeInt declarations");
        types[0].operand(0).unwrap()
    }

    fn float_type(&self) -> u32 {
        let types = self.find_all(Op::TypeFloat);
        assert_eq!(types.len(), 1, "duplicate OpTypeFloat declarations");
        types[0].operand(0).unwrap()
    }

    /// Id of the integer constant with the given value.
    fn int_const(&self, value: u32) -> Option<u32> {
        let ty = self.int_type();
        self.find_all(Op::Constant)
            .iter()
            .find(|x| x.operand(0) == Some(ty) && x.operand(2) == Some(value))
            .map(|x| x.operand(1).unwrap())
    }

    fn float_const(&self, value: f32) -> Option<u32> {
        let ty = self.float_type();
        self.find_all(Op::Constant)
            .iter()
            .find(|x| x.operand(0) == Some(ty) && x.operand(2) == Some(value.to_bits()))
            .map(|x| x.operand(1).unwrap())
    }

    /// Module-scope variables of a given storage class.
    fn variables(&self, storage: StorageClass) -> Vec<u32> {
        self.find_all(Op::Variable)
            .iter()
            .filter(|x| x.operand(2) == Some(storage as u32))
            .map(|x| x.operand(1).unwrap())
            .collect()
    }

    fn entry_point_interface(&self) -> Vec<u32> {
        let entries = self.find_all(Op::EntryPoint);
        assert_eq!(entries.len(), 1, "expected exactly one entry point");
        // Execution model, entry id, then "main\0" (two words), then the
        // interface ids.
        entries[0].operands()[4..].to_vec()
    }

    fn decoration_of(&self, id: u32, decoration: spirv::Decoration) -> Option<u32> {
        self.find_all(Op::Decorate)
            .iter()
            .find(|x| x.operand(0) == Some(id) && x.operand(1) == Some(decoration as u32))
            .map(|x| x.operand(2).unwrap_or(u32::MAX))
    }

    /// Every id used or defined anywhere in the module.
    fn check_universal_invariants(&self) {
        // Section order: capability first, entry point before types,
        // decorations before types, function body last.
        let ops: Vec<Op> = self.instrs().iter().filter_map(|x| x.op()).collect();
        assert_eq!(ops.first(), Some(&Op::Capability));
        let entry_at = ops.iter().position(|x| *x == Op::EntryPoint).unwrap();
        let first_type = ops
            .iter()
            .position(|x| matches!(*x, Op::TypeVoid | Op::TypeInt | Op::TypeFloat))
            .unwrap();
        let last_decorate = ops
            .iter()
            .rposition(|x| matches!(*x, Op::Decorate | Op::MemberDecorate))
            .unwrap();
        let function_at = ops.iter().position(|x| *x == Op::Function).unwrap();
        assert!(entry_at < first_type);
        assert!(last_decorate < first_type);
        assert!(first_type < function_at);

        // Every interface variable appears exactly once, and every
        // input/output variable is listed.
        let interface = self.entry_point_interface();
        let mut sorted = interface.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), interface.len(), "duplicate interface ids");
        let mut io = self.variables(StorageClass::Input);
        io.extend(self.variables(StorageClass::Output));
        for id in &io {
            assert!(
                interface.contains(id),
                "interface variable {} missing from OpEntryPoint",
                id
            );
        }
        assert_eq!(io.len(), interface.len());

        // The bound covers every referenced id. Operand words can be
        // literals too, so only result-id positions are checked.
        for instr in self.find_all(Op::Variable) {
            assert!(instr.operand(1).unwrap() < self.bound());
        }
        for instr in self.instrs() {
            if matches!(
                instr.op(),
                Some(Op::Load | Op::Store | Op::AccessChain | Op::FMul | Op::Phi)
            ) {
                for operand in instr.operands() {
                    assert!(*operand < self.bound());
                }
            }
        }
    }
}

#[test]
fn minimal_vertex_passthrough() {
    let module = Module::translate(&[
        VS_2_0,
        op(Opcode::Dcl),
        dcl_usage(Usage::Position, 0),
        dst(RegisterType::Input, 0, 0xF),
        op(Opcode::Mov),
        dst(RegisterType::RastOut, 0, 0xF),
        src(RegisterType::Input, 0),
        END,
    ]);
    module.check_universal_invariants();

    // One input at location 0; no packed-color decode on the position path.
    let inputs = module.variables(StorageClass::Input);
    assert_eq!(inputs.len(), 1);
    assert_eq!(
        module.decoration_of(inputs[0], spirv::Decoration::Location),
        Some(0)
    );
    assert_eq!(module.count(Op::ConvertUToF), 0);

    // The output is the position built-in.
    let outputs = module.variables(StorageClass::Output);
    assert_eq!(outputs.len(), 1);
    assert_eq!(
        module.decoration_of(outputs[0], spirv::Decoration::BuiltIn),
        Some(spirv::BuiltIn::Position as u32)
    );

    // w is forced to 1.0 on load.
    let one = module.float_const(1.0).unwrap();
    let inserts = module.find_all(Op::CompositeInsert);
    assert_eq!(inserts.len(), 1);
    assert_eq!(inserts[0].operand(2), Some(one));
    assert_eq!(inserts[0].operands().last(), Some(&3));

    // The y component is negated before return.
    let neg_one = module.float_const(-1.0).unwrap();
    let flips: Vec<_> = module
        .find_all(Op::FMul)
        .iter()
        .filter(|x| x.operands().contains(&neg_one))
        .map(|x| x.operand(1).unwrap())
        .collect();
    assert_eq!(flips.len(), 1);
    // ...and stored back.
    assert!(module
        .find_all(Op::Store)
        .iter()
        .any(|x| x.operand(1) == Some(flips[0])));
}

#[test]
fn pixel_color_output_from_constant() {
    let module = Module::translate(&[
        PS_2_0,
        op(Opcode::Mov),
        dst(RegisterType::Temp, 0, 0xF),
        src(RegisterType::Const, 0),
        END,
    ]);
    module.check_universal_invariants();

    // r0 is the color output at location 0, bound as such.
    let outputs = module.variables(StorageClass::Output);
    assert_eq!(outputs.len(), 1);
    assert_eq!(
        module.decoration_of(outputs[0], spirv::Decoration::Location),
        Some(0)
    );

    // c0 reads from member 16 + 16 + 0 of the constants block.
    let member = module.int_const(32).unwrap();
    let chains: Vec<_> = module
        .find_all(Op::AccessChain)
        .iter()
        .filter(|x| x.operands().last() == Some(&member))
        .map(|x| x.operand(1).unwrap())
        .collect();
    assert_eq!(chains.len(), 1);
    let load = module
        .find_all(Op::Load)
        .iter()
        .find(|x| x.operand(2) == Some(chains[0]))
        .map(|x| x.operand(1).unwrap())
        .unwrap();

    // All four channels are written in one store of the loaded value.
    let stores = module.find_all(Op::Store);
    assert!(stores
        .iter()
        .any(|x| x.operand(0) == Some(outputs[0]) && x.operand(1) == Some(load)));

    // Fragment stages declare their origin.
    assert_eq!(module.count(Op::ExecutionMode), 1);

    // The pixel-stage constants block sits at binding 6.
    let uniforms = module.variables(StorageClass::Uniform);
    let bindings: Vec<_> = uniforms
        .iter()
        .filter_map(|x| module.decoration_of(*x, spirv::Decoration::Binding))
        .collect();
    assert!(bindings.contains(&6));
    assert!(bindings.contains(&0));
}

#[test]
fn texkill_guards_three_components() {
    let module = Module::translate(&[
        PS_2_0,
        op(Opcode::TexKill),
        dst(RegisterType::Texture, 0, 0xF),
        END,
    ]);
    module.check_universal_invariants();

    assert_eq!(module.count(Op::Kill), 3);
    let zero = module.float_const(0.0).unwrap();
    let compares = module.find_all(Op::FOrdLessThan);
    assert_eq!(compares.len(), 3);
    for compare in &compares {
        assert_eq!(compare.operands().last(), Some(&zero));
    }
    // Each kill sits in its own guarded block.
    assert_eq!(module.count(Op::SelectionMerge), 3);
    assert_eq!(module.count(Op::BranchConditional), 3);
    // The guarded components are x, y and z of the coordinate.
    let extracted: Vec<_> = module
        .find_all(Op::CompositeExtract)
        .iter()
        .filter_map(|x| x.operands().last().copied())
        .collect();
    for lane in 0..3 {
        assert!(extracted.contains(&lane));
    }
}

#[test]
fn matrix_transform_builds_mat4_from_adjacent_registers() {
    let module = Module::translate(&[
        VS_2_0,
        op(Opcode::Dcl),
        dcl_usage(Usage::Position, 0),
        dst(RegisterType::Input, 0, 0xF),
        op(Opcode::M4x4),
        dst(RegisterType::RastOut, 0, 0xF),
        src(RegisterType::Input, 0),
        src(RegisterType::Const, 0),
        END,
    ]);
    module.check_universal_invariants();

    // c0..c3 load from members 32..35.
    for member in 32..36 {
        let constant = module.int_const(member).unwrap();
        assert!(
            module
                .find_all(Op::AccessChain)
                .iter()
                .any(|x| x.operands().last() == Some(&constant)),
            "no access chain for constant member {}",
            member
        );
    }

    // One matrix is constructed from the four columns and multiplied.
    let matrix_types = module.find_all(Op::TypeMatrix);
    assert_eq!(matrix_types.len(), 1);
    let mat4_ty = matrix_types[0].operand(0).unwrap();
    let constructs: Vec<_> = module
        .find_all(Op::CompositeConstruct)
        .iter()
        .filter(|x| x.operand(0) == Some(mat4_ty))
        .map(|x| x.word_count())
        .collect();
    assert_eq!(constructs, vec![7]);
    assert_eq!(module.count(Op::VectorTimesMatrix), 1);

    // Standard position epilogue still applies.
    let neg_one = module.float_const(-1.0).unwrap();
    assert!(module
        .find_all(Op::FMul)
        .iter()
        .any(|x| x.operands().contains(&neg_one)));
}

#[test]
fn loop_emits_phi_counter_idiom() {
    let module = Module::translate(&[
        VS_2_0,
        op(Opcode::Loop),
        dst(RegisterType::Loop, 0, 0xF),
        src(RegisterType::ConstInt, 0),
        op(Opcode::Add),
        dst(RegisterType::Temp, 0, 0xF),
        src(RegisterType::Temp, 0),
        src(RegisterType::Const, 0),
        op(Opcode::EndLoop),
        END,
    ]);
    module.check_universal_invariants();

    let zero = module.int_const(0).unwrap();
    let one = module.int_const(1).unwrap();

    // The counter starts at 0 on the preheader edge.
    let phis = module.find_all(Op::Phi);
    assert_eq!(phis.len(), 1);
    let counter = phis[0].operand(1).unwrap();
    assert_eq!(phis[0].operand(2), Some(zero));
    let header = {
        // The phi's block is the label immediately preceding it.
        let instrs = module.instrs();
        let at = instrs
            .iter()
            .position(|x| x.op() == Some(Op::Phi))
            .unwrap();
        assert_eq!(instrs[at - 1].op(), Some(Op::Label));
        instrs[at - 1].operand(0).unwrap()
    };

    // The condition compares the counter against the loop count.
    let compares = module.find_all(Op::SLessThanEqual);
    assert_eq!(compares.len(), 1);
    assert_eq!(compares[0].operand(2), Some(counter));

    assert_eq!(module.count(Op::LoopMerge), 1);

    // The back edge increments by one and branches to the header.
    let instrs = module.instrs();
    let iadd_at = instrs
        .iter()
        .position(|x| x.op() == Some(Op::IAdd))
        .expect("no counter increment");
    assert_eq!(instrs[iadd_at].operand(2), Some(counter));
    assert_eq!(instrs[iadd_at].operand(3), Some(one));
    assert_eq!(instrs[iadd_at + 1].op(), Some(Op::Branch));
    assert_eq!(instrs[iadd_at + 1].operand(0), Some(header));
    // That is the only branch back to the header from the body: the body
    // begins after the conditional branch.
    let body_start = instrs
        .iter()
        .position(|x| x.op() == Some(Op::BranchConditional))
        .unwrap();
    let back_branches = instrs[body_start..]
        .iter()
        .filter(|x| x.op() == Some(Op::Branch) && x.operand(0) == Some(header))
        .count();
    assert_eq!(back_branches, 1);
}

#[test]
fn nested_if_shares_one_merge_label() {
    let module = Module::translate(&[
        PS_2_0,
        ifc(Comparison::Gt),
        src_swizzled(RegisterType::Temp, 0, [0, 0, 0, 0]),
        src_swizzled(RegisterType::Const, 0, [0, 0, 0, 0]),
        op(Opcode::Mov),
        dst(RegisterType::Temp, 0, 0xF),
        src(RegisterType::Const, 1),
        op(Opcode::Else),
        op(Opcode::Mov),
        dst(RegisterType::Temp, 0, 0xF),
        src(RegisterType::Const, 2),
        op(Opcode::EndIf),
        END,
    ]);
    module.check_universal_invariants();

    assert_eq!(module.count(Op::FOrdGreaterThan), 1);
    let merges = module.find_all(Op::SelectionMerge);
    assert_eq!(merges.len(), 1);
    let end_label = merges[0].operand(0).unwrap();

    // Both arms branch to the merge label before it is emitted.
    let instrs = module.instrs();
    let label_at = instrs
        .iter()
        .position(|x| x.op() == Some(Op::Label) && x.operand(0) == Some(end_label))
        .expect("merge label never emitted");
    let arm_branches = instrs[..label_at]
        .iter()
        .filter(|x| x.op() == Some(Op::Branch) && x.operand(0) == Some(end_label))
        .count();
    assert_eq!(arm_branches, 2);

    // The conditional branch targets two distinct arm labels.
    let conditionals = module.find_all(Op::BranchConditional);
    assert_eq!(conditionals.len(), 1);
    assert_ne!(conditionals[0].operand(1), conditionals[0].operand(2));
}

#[test]
fn constant_read_goes_through_the_ubo_member() {
    // The round-trip law: mov r2, c3 must read member 16 + 16 + 3.
    let module = Module::translate(&[
        VS_2_0,
        op(Opcode::Mov),
        dst(RegisterType::Temp, 2, 0xF),
        src(RegisterType::Const, 3),
        END,
    ]);
    module.check_universal_invariants();

    let member = module.int_const(35).unwrap();
    let chains: Vec<_> = module
        .find_all(Op::AccessChain)
        .iter()
        .filter(|x| x.operands().last() == Some(&member))
        .map(|x| x.operand(1).unwrap())
        .collect();
    assert_eq!(chains.len(), 1);
    // The member is loaded and that load is what lands in r2.
    let load = module
        .find_all(Op::Load)
        .iter()
        .find(|x| x.operand(2) == Some(chains[0]))
        .map(|x| x.operand(1).unwrap())
        .unwrap();
    assert!(module
        .find_all(Op::Store)
        .iter()
        .any(|x| x.operand(1) == Some(load)));

    // The vertex-stage constants block sits at binding 5.
    let uniforms = module.variables(StorageClass::Uniform);
    let bindings: Vec<_> = uniforms
        .iter()
        .filter_map(|x| module.decoration_of(*x, spirv::Decoration::Binding))
        .collect();
    assert!(bindings.contains(&5));
}

#[test]
fn sincos_builds_cos_sin_vector() {
    let module = Module::translate(&[
        PS_2_0,
        op(Opcode::SinCos),
        dst(RegisterType::Temp, 1, 0x3),
        src_swizzled(RegisterType::Const, 0, [0, 0, 0, 0]),
        src(RegisterType::Const, 1),
        src(RegisterType::Const, 2),
        END,
    ]);
    module.check_universal_invariants();

    // One sine and one cosine, composed as (cos, sin, cos, sin).
    let ext: Vec<_> = module
        .find_all(Op::ExtInst)
        .iter()
        .map(|x| x.operand(3).unwrap())
        .collect();
    assert!(ext.contains(&(spirv::GLOp::Sin as u32)));
    assert!(ext.contains(&(spirv::GLOp::Cos as u32)));
    let constructs = module.find_all(Op::CompositeConstruct);
    assert!(constructs.iter().any(|x| {
        x.word_count() == 7 && x.operand(2) == x.operand(4) && x.operand(3) == x.operand(5)
    }));
    // The .xy mask stores two components through access chains.
    assert_eq!(module.count(Op::Store), 2);
}

#[test]
fn texture_sample_uses_the_sampler_array() {
    let module = Module::translate(&[
        PS_2_0,
        op(Opcode::Dcl),
        dcl_usage(Usage::Texcoord, 0),
        dst(RegisterType::Texture, 0, 0xF),
        op(Opcode::Tex),
        dst(RegisterType::Temp, 1, 0xF),
        src(RegisterType::Texture, 0),
        src(RegisterType::Sampler, 0),
        END,
    ]);
    module.check_universal_invariants();

    assert_eq!(module.count(Op::ImageSampleImplicitLod), 1);
    // The sampler resolves through an access chain into the
    // UniformConstant image array at binding 7.
    let textures = module.variables(StorageClass::UniformConstant);
    assert_eq!(textures.len(), 1);
    assert_eq!(
        module.decoration_of(textures[0], spirv::Decoration::Binding),
        Some(7)
    );
    assert!(module
        .find_all(Op::AccessChain)
        .iter()
        .any(|x| x.operand(2) == Some(textures[0])));
}
