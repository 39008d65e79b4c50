//! Hint execution
//!
//! Hints are out-of-band, non-provable snippets attached to instructions,
//! executed by the runner immediately before the owning instruction. The
//! processor exposes a narrow surface to hint code: read/write memory cells,
//! allocate segments, resolve `ids.<name>` bindings relative to ap/fp, and
//! dict-tracker operations. The built-in processor implements a closed
//! vocabulary keyed by the hint source text; unknown text is a typed error.

pub mod dict_manager;
pub mod math;

use crate::error::{HintError, MemoryError};
use crate::vm::VirtualMachine;
use cairn_spec::{Felt, HintParams, HintReference, MaybeRelocatable, Register, Relocatable};
use dict_manager::DictManager;
use math::isqrt;

pub use dict_manager::{compute_merkle_root, DictTracker, DICT_ACCESS_SIZE};

/// Executes hints against the VM's narrow hint surface
pub trait HintProcessor {
    fn execute_hint(
        &mut self,
        vm: &mut VirtualMachine,
        hint: &HintParams,
    ) -> Result<(), HintError>;
}

// The built-in hint vocabulary

pub const ISQRT_HINT: &str = "memory[ap] = isqrt(ids.value)";
pub const ALLOC_SEGMENT_HINT: &str = "memory[ap] = segments.add()";
pub const DICT_NEW_HINT: &str = "memory[ap] = dict_manager.new_dict(segments)";
pub const DEFAULT_DICT_NEW_HINT: &str =
    "memory[ap] = dict_manager.new_default_dict(segments, ids.default_value)";
pub const DICT_READ_HINT: &str =
    "memory[ap], memory[ap + 1] = dict_manager.read(ids.dict_ptr, ids.key)";
pub const DICT_WRITE_HINT: &str =
    "memory[ap] = dict_manager.write(ids.dict_ptr, ids.key, ids.new_value)";
pub const DICT_UPDATE_HINT: &str =
    "memory[ap] = dict_manager.update(ids.dict_ptr, ids.key, ids.prev_value, ids.new_value)";

/// Resolve an `ids.<name>` binding to its value
pub fn get_ids_value(
    vm: &VirtualMachine,
    hint: &HintParams,
    name: &str,
) -> Result<MaybeRelocatable, HintError> {
    let reference = hint
        .flow_tracking_data
        .reference_ids
        .get(name)
        .ok_or_else(|| HintError::MissingIdsVariable(name.to_string()))?;
    match reference {
        HintReference::Const { value } => Ok(MaybeRelocatable::Int(value.clone())),
        HintReference::Cell {
            register,
            offset,
            dereferenced,
            ..
        } => {
            let addr = cell_address(vm, *register, *offset)?;
            if *dereferenced {
                let value = vm
                    .segments
                    .memory
                    .get(&addr)
                    .ok_or(MemoryError::UnknownMemoryCell(addr))?;
                Ok(value.clone())
            } else {
                Ok(MaybeRelocatable::from(addr))
            }
        }
    }
}

/// Resolve an `ids.<name>` binding to an integer
pub fn get_ids_int(
    vm: &VirtualMachine,
    hint: &HintParams,
    name: &str,
) -> Result<Felt, HintError> {
    Ok(get_ids_value(vm, hint, name)?.get_int()?.clone())
}

/// Resolve an `ids.<name>` binding to a relocatable value
pub fn get_ids_relocatable(
    vm: &VirtualMachine,
    hint: &HintParams,
    name: &str,
) -> Result<Relocatable, HintError> {
    Ok(get_ids_value(vm, hint, name)?.get_relocatable()?)
}

fn cell_address(
    vm: &VirtualMachine,
    register: Register,
    offset: i32,
) -> Result<Relocatable, HintError> {
    let base = match register {
        Register::AP => vm.run_context.ap,
        Register::FP => vm.run_context.fp,
    };
    let addr = if offset >= 0 {
        base.add_usize(offset as usize)
    } else {
        base.sub_usize(-offset as usize)
    };
    Ok(addr.map_err(MemoryError::from)?)
}

/// Write a value to `[ap]`
fn write_ap(vm: &mut VirtualMachine, value: MaybeRelocatable) -> Result<(), HintError> {
    let ap = vm.run_context.ap;
    vm.segments.memory.insert(ap, value).map_err(HintError::from)
}

/// The closed-vocabulary hint processor used by the runner by default
#[derive(Debug, Default)]
pub struct BuiltinHintProcessor {
    pub dict_manager: DictManager,
}

impl BuiltinHintProcessor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HintProcessor for BuiltinHintProcessor {
    fn execute_hint(
        &mut self,
        vm: &mut VirtualMachine,
        hint: &HintParams,
    ) -> Result<(), HintError> {
        match hint.code.trim() {
            ISQRT_HINT => {
                let value = get_ids_int(vm, hint, "value")?;
                let root = Felt::new(isqrt(value.to_biguint()));
                write_ap(vm, MaybeRelocatable::Int(root))
            }
            ALLOC_SEGMENT_HINT => {
                let base = vm.segments.add();
                write_ap(vm, MaybeRelocatable::from(base))
            }
            DICT_NEW_HINT => {
                let base = self.dict_manager.new_dict(&mut vm.segments, None);
                write_ap(vm, MaybeRelocatable::from(base))
            }
            DEFAULT_DICT_NEW_HINT => {
                let default = get_ids_int(vm, hint, "default_value")?;
                let base = self
                    .dict_manager
                    .new_dict(&mut vm.segments, Some(default));
                write_ap(vm, MaybeRelocatable::from(base))
            }
            DICT_READ_HINT => {
                let dict_ptr = get_ids_relocatable(vm, hint, "dict_ptr")?;
                let key = get_ids_int(vm, hint, "key")?;
                let value = self
                    .dict_manager
                    .read(&mut vm.segments, dict_ptr, &key)?;
                write_ap(vm, MaybeRelocatable::Int(value))?;
                let updated = dict_ptr.add_usize(DICT_ACCESS_SIZE).map_err(MemoryError::from)?;
                let slot = vm.run_context.ap.add_usize(1).map_err(MemoryError::from)?;
                vm.segments
                    .memory
                    .insert(slot, MaybeRelocatable::from(updated))
                    .map_err(HintError::from)
            }
            DICT_WRITE_HINT => {
                let dict_ptr = get_ids_relocatable(vm, hint, "dict_ptr")?;
                let key = get_ids_int(vm, hint, "key")?;
                let new_value = get_ids_int(vm, hint, "new_value")?;
                self.dict_manager
                    .write(&mut vm.segments, dict_ptr, &key, &new_value)?;
                let updated = dict_ptr.add_usize(DICT_ACCESS_SIZE).map_err(MemoryError::from)?;
                write_ap(vm, MaybeRelocatable::from(updated))
            }
            DICT_UPDATE_HINT => {
                let dict_ptr = get_ids_relocatable(vm, hint, "dict_ptr")?;
                let key = get_ids_int(vm, hint, "key")?;
                let prev_value = get_ids_int(vm, hint, "prev_value")?;
                let new_value = get_ids_int(vm, hint, "new_value")?;
                self.dict_manager
                    .update(&mut vm.segments, dict_ptr, &key, &prev_value, &new_value)?;
                let updated = dict_ptr.add_usize(DICT_ACCESS_SIZE).map_err(MemoryError::from)?;
                write_ap(vm, MaybeRelocatable::from(updated))
            }
            other => Err(HintError::UnknownHint(other.to_string())),
        }
    }
}
