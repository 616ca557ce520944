//! Register symbol tables.
//!
//! D3D9 shaders are register-machine programs; SPIR-V is SSA. The bridge is
//! a table from logical register to the id holding its current value: every
//! write rebinds the register to the freshly produced id, so later reads
//! observe the latest version while earlier ids stay valid for whoever
//! already resolved them.
use fnv::FnvHashMap;

use dxsm_core::parse::{RegisterType, Usage};

#[derive(Default)]
pub struct SymbolTable {
    current: FnvHashMap<(RegisterType, u32), u32>,
    numbers: FnvHashMap<(RegisterType, u32), u32>,
    usages: FnvHashMap<u32, Usage>,
    mat4_of: FnvHashMap<u32, u32>,
    mat3_of: FnvHashMap<u32, u32>,
    vec3_of: FnvHashMap<u32, u32>,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable::default()
    }

    pub fn lookup(&self, class: RegisterType, number: u32) -> Option<u32> {
        self.current.get(&(class, number)).copied()
    }

    /// Bind `(class, number)` to `id`, superseding any earlier binding.
    pub fn bind(&mut self, class: RegisterType, number: u32, id: u32) {
        self.current.insert((class, number), id);
        self.numbers.insert((class, id), number);
    }

    /// Reverse lookup for diagnostics: the register number an id was last
    /// bound under.
    pub fn register_of(&self, class: RegisterType, id: u32) -> Option<u32> {
        self.numbers.get(&(class, id)).copied()
    }

    pub fn usage_of(&self, id: u32) -> Option<Usage> {
        self.usages.get(&id).copied()
    }
    pub fn set_usage(&mut self, id: u32, usage: Usage) {
        self.usages.insert(id, usage);
    }

    /// Conversion caches. Reading a vec4 register as a matrix or a narrower
    /// vector synthesizes a new composite; each source id is converted at
    /// most once.
    pub fn mat4_of(&self, id: u32) -> Option<u32> {
        self.mat4_of.get(&id).copied()
    }
    pub fn cache_mat4(&mut self, id: u32, matrix: u32) {
        self.mat4_of.insert(id, matrix);
    }
    pub fn mat3_of(&self, id: u32) -> Option<u32> {
        self.mat3_of.get(&id).copied()
    }
    pub fn cache_mat3(&mut self, id: u32, matrix: u32) {
        self.mat3_of.insert(id, matrix);
    }
    pub fn vec3_of(&self, id: u32) -> Option<u32> {
        self.vec3_of.get(&id).copied()
    }
    pub fn cache_vec3(&mut self, id: u32, vector: u32) {
        self.vec3_of.insert(id, vector);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebinding_supersedes_but_keeps_reverse_entries() {
        let mut symbols = SymbolTable::new();
        symbols.bind(RegisterType::Temp, 0, 7);
        symbols.bind(RegisterType::Temp, 0, 9);
        assert_eq!(symbols.lookup(RegisterType::Temp, 0), Some(9));
        // Both generations still resolve back to the register for logging.
        assert_eq!(symbols.register_of(RegisterType::Temp, 7), Some(0));
        assert_eq!(symbols.register_of(RegisterType::Temp, 9), Some(0));
    }

    #[test]
    fn classes_do_not_collide() {
        let mut symbols = SymbolTable::new();
        symbols.bind(RegisterType::Temp, 1, 5);
        symbols.bind(RegisterType::Input, 1, 6);
        assert_eq!(symbols.lookup(RegisterType::Temp, 1), Some(5));
        assert_eq!(symbols.lookup(RegisterType::Input, 1), Some(6));
    }
}
