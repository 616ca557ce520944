//! SPIR-V module assembly.
//!
//! Instructions are appended to one buffer per logical section while the
//! translation runs; [`ModuleBuilder::assemble`] emits the header and drains
//! the buffers in the order the SPIR-V binary layout mandates.
mod instr;

use fnv::FnvHashMap;
use spirv::{
    AddressingModel, Capability, Decoration, ExecutionMode, ExecutionModel, MemoryModel, Op,
    SourceLanguage, StorageClass,
};

pub use self::instr::{Instr, Instrs, Instruction, InstructionBuilder};

/// SPIR-V 1.0, the version every target driver accepts.
pub const SPIRV_VERSION: u32 = 0x0001_0000;

fn write(buf: &mut Vec<u32>, op: Op, operands: &[u32]) {
    buf.push((((operands.len() + 1) as u32) << 16) | (op as u32 & 0xFFFF));
    buf.extend_from_slice(operands);
}

/// Result-id allocator plus the per-section instruction buffers of a module
/// under construction.
pub struct ModuleBuilder {
    next_id: u32,
    capabilities: Vec<u32>,
    extensions: Vec<u32>,
    ext_inst_imports: Vec<u32>,
    memory_model: Vec<u32>,
    entry_points: Vec<u32>,
    execution_modes: Vec<u32>,
    strings: Vec<u32>,
    sources: Vec<u32>,
    source_extensions: Vec<u32>,
    names: Vec<u32>,
    member_names: Vec<u32>,
    decorations: Vec<u32>,
    member_decorations: Vec<u32>,
    types_global_values: Vec<u32>,
    function_declarations: Vec<u32>,
    functions: Vec<u32>,
    debug_names: FnvHashMap<u32, String>,
}

impl Default for ModuleBuilder {
    fn default() -> ModuleBuilder {
        ModuleBuilder::new()
    }
}

impl ModuleBuilder {
    pub fn new() -> ModuleBuilder {
        ModuleBuilder {
            // Id 0 is reserved by the binary format.
            next_id: 1,
            capabilities: Vec::new(),
            extensions: Vec::new(),
            ext_inst_imports: Vec::new(),
            memory_model: Vec::new(),
            entry_points: Vec::new(),
            execution_modes: Vec::new(),
            strings: Vec::new(),
            sources: Vec::new(),
            source_extensions: Vec::new(),
            names: Vec::new(),
            member_names: Vec::new(),
            decorations: Vec::new(),
            member_decorations: Vec::new(),
            types_global_values: Vec::new(),
            function_declarations: Vec::new(),
            functions: Vec::new(),
            debug_names: FnvHashMap::default(),
        }
    }

    /// Hand out the next result id. Ids are never reused.
    pub fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
    /// Reserve a range of ids without producing instructions for them.
    pub fn skip_ids(&mut self, n: u32) {
        self.next_id += n;
    }
    /// One past the largest id allocated so far.
    pub fn id_bound(&self) -> u32 {
        self.next_id
    }

    pub fn capability(&mut self, capability: Capability) {
        write(&mut self.capabilities, Op::Capability, &[capability as u32]);
    }

    pub fn ext_inst_import(&mut self, result_id: u32, name: &str) {
        let instr = InstructionBuilder::new(Op::ExtInstImport)
            .push(result_id)
            .push_str(name)
            .build();
        self.ext_inst_imports.extend_from_slice(instr.as_words());
    }

    pub fn memory_model(&mut self, addressing: AddressingModel, memory: MemoryModel) {
        write(
            &mut self.memory_model,
            Op::MemoryModel,
            &[addressing as u32, memory as u32],
        );
    }

    pub fn entry_point(
        &mut self,
        model: ExecutionModel,
        entry_id: u32,
        name: &str,
        interface: &[u32],
    ) {
        let instr = InstructionBuilder::new(Op::EntryPoint)
            .push(model as u32)
            .push(entry_id)
            .push_str(name)
            .push_list(interface)
            .build();
        self.entry_points.extend_from_slice(instr.as_words());
    }

    pub fn execution_mode(&mut self, entry_id: u32, mode: ExecutionMode, args: &[u32]) {
        let instr = InstructionBuilder::new(Op::ExecutionMode)
            .push(entry_id)
            .push(mode as u32)
            .push_list(args)
            .build();
        self.execution_modes.extend_from_slice(instr.as_words());
    }

    pub fn source(&mut self, language: SourceLanguage, version: u32) {
        write(&mut self.sources, Op::Source, &[language as u32, version]);
    }

    pub fn source_extension(&mut self, extension: &str) {
        let instr = InstructionBuilder::new(Op::SourceExtension)
            .push_str(extension)
            .build();
        self.source_extensions.extend_from_slice(instr.as_words());
    }

    pub fn name(&mut self, id: u32, name: &str) {
        let instr = InstructionBuilder::new(Op::Name)
            .push(id)
            .push_str(name)
            .build();
        self.names.extend_from_slice(instr.as_words());
        self.debug_names.insert(id, name.to_owned());
    }

    pub fn member_name(&mut self, id: u32, member: u32, name: &str) {
        let instr = InstructionBuilder::new(Op::MemberName)
            .push(id)
            .push(member)
            .push_str(name)
            .build();
        self.member_names.extend_from_slice(instr.as_words());
    }

    pub fn name_of(&self, id: u32) -> Option<&str> {
        self.debug_names.get(&id).map(|x| x.as_str())
    }

    pub fn decorate(&mut self, target: u32, decoration: Decoration, args: &[u32]) {
        let instr = InstructionBuilder::new(Op::Decorate)
            .push(target)
            .push(decoration as u32)
            .push_list(args)
            .build();
        self.decorations.extend_from_slice(instr.as_words());
    }

    pub fn member_decorate(
        &mut self,
        target: u32,
        member: u32,
        decoration: Decoration,
        args: &[u32],
    ) {
        let instr = InstructionBuilder::new(Op::MemberDecorate)
            .push(target)
            .push(member)
            .push(decoration as u32)
            .push_list(args)
            .build();
        self.member_decorations.extend_from_slice(instr.as_words());
    }

    /// Append a raw instruction to the type/constant/global-variable section.
    pub fn ty_instr(&mut self, op: Op, operands: &[u32]) {
        write(&mut self.types_global_values, op, operands);
    }

    /// Declare a module-scope `OpVariable`.
    pub fn variable(&mut self, result_type: u32, result_id: u32, storage: StorageClass) {
        self.ty_instr(Op::Variable, &[result_type, result_id, storage as u32]);
    }

    pub fn constant(&mut self, result_type: u32, result_id: u32, value: &[u32]) {
        let instr = InstructionBuilder::new(Op::Constant)
            .push(result_type)
            .push(result_id)
            .push_list(value)
            .build();
        self.types_global_values.extend_from_slice(instr.as_words());
    }

    pub fn constant_composite(&mut self, result_type: u32, result_id: u32, parts: &[u32]) {
        let instr = InstructionBuilder::new(Op::ConstantComposite)
            .push(result_type)
            .push(result_id)
            .push_list(parts)
            .build();
        self.types_global_values.extend_from_slice(instr.as_words());
    }

    /// Append a raw instruction to the current function body.
    pub fn code(&mut self, op: Op, operands: &[u32]) {
        write(&mut self.functions, op, operands);
    }

    /// `OpExtInst` against an imported instruction set.
    pub fn ext_inst(
        &mut self,
        result_type: u32,
        result_id: u32,
        set_id: u32,
        instruction: spirv::GLOp,
        args: &[u32],
    ) {
        let instr = InstructionBuilder::new(Op::ExtInst)
            .push(result_type)
            .push(result_id)
            .push(set_id)
            .push(instruction as u32)
            .push_list(args)
            .build();
        self.functions.extend_from_slice(instr.as_words());
    }

    /// Emit the header and drain every section in binary-layout order.
    pub fn assemble(self, generator: u32) -> Vec<u32> {
        let sections = [
            &self.capabilities,
            &self.extensions,
            &self.ext_inst_imports,
            &self.memory_model,
            &self.entry_points,
            &self.execution_modes,
            &self.strings,
            &self.sources,
            &self.source_extensions,
            &self.names,
            &self.member_names,
            &self.decorations,
            &self.member_decorations,
            &self.types_global_values,
            &self.function_declarations,
            &self.functions,
        ];
        let len = 5 + sections.iter().map(|x| x.len()).sum::<usize>();
        let mut words = Vec::with_capacity(len);
        words.push(spirv::MAGIC_NUMBER);
        words.push(SPIRV_VERSION);
        words.push(generator);
        words.push(self.next_id);
        words.push(0);
        for section in sections {
            words.extend_from_slice(section);
        }
        words
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ids_are_monotonic_and_bound_is_max_plus_one() {
        let mut module = ModuleBuilder::new();
        assert_eq!(module.alloc_id(), 1);
        assert_eq!(module.alloc_id(), 2);
        module.skip_ids(3);
        assert_eq!(module.alloc_id(), 6);
        assert_eq!(module.id_bound(), 7);
    }

    #[test]
    fn assemble_orders_sections() {
        let mut module = ModuleBuilder::new();
        let ext = module.alloc_id();
        module.capability(Capability::Shader);
        module.ext_inst_import(ext, "GLSL.std.450");
        module.memory_model(AddressingModel::Logical, MemoryModel::GLSL450);
        let float_ty = module.alloc_id();
        module.ty_instr(Op::TypeFloat, &[float_ty, 32]);
        module.decorate(float_ty, Decoration::RelaxedPrecision, &[]);
        module.code(Op::Return, &[]);

        let words = module.assemble(0);
        assert_eq!(words[0], spirv::MAGIC_NUMBER);
        assert_eq!(words[1], SPIRV_VERSION);
        assert_eq!(words[3], 3);

        let ops: Vec<_> = Instrs::of_module(&words)
            .unwrap()
            .map(|x| x.op().unwrap())
            .collect();
        assert_eq!(
            ops,
            vec![
                Op::Capability,
                Op::ExtInstImport,
                Op::MemoryModel,
                Op::Decorate,
                Op::TypeFloat,
                Op::Return,
            ]
        );
    }
}
