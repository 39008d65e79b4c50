//! Signature (ECDSA) builtin
//!
//! Two cells per slot: public key and message hash. Signatures are
//! registered out of band (by hints or the embedding application) against
//! the public-key cell address; the write-time validation rule checks a
//! registered signature exists for the slot and passes it through the
//! injected verifier capability.

use crate::crypto::SignatureVerifyFn;
use crate::error::MemoryError;
use crate::memory::Memory;
use cairn_spec::{Felt, Relocatable};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub const CELLS_PER_INSTANCE: usize = 2;

type SignatureMap = Rc<RefCell<HashMap<Relocatable, (Felt, Felt)>>>;

pub struct SignatureBuiltinRunner {
    pub base: Option<Relocatable>,
    signatures: SignatureMap,
    verify: SignatureVerifyFn,
}

impl std::fmt::Debug for SignatureBuiltinRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureBuiltinRunner")
            .field("base", &self.base)
            .field("signatures", &self.signatures.borrow().len())
            .finish()
    }
}

impl SignatureBuiltinRunner {
    pub fn new(verify: SignatureVerifyFn) -> Self {
        SignatureBuiltinRunner {
            base: None,
            signatures: Rc::new(RefCell::new(HashMap::new())),
            verify,
        }
    }

    /// Register the (r, s) signature for the slot whose public-key cell is
    /// at `addr`.
    pub fn add_signature(&self, addr: Relocatable, r: Felt, s: Felt) {
        self.signatures.borrow_mut().insert(addr, (r, s));
    }

    pub fn add_validation_rule(&self, memory: &mut Memory) -> Result<(), MemoryError> {
        let base = self.base.ok_or(MemoryError::EffectiveSizesNotComputed)?;
        let signatures = Rc::clone(&self.signatures);
        let verify = self.verify;
        memory.add_validation_rule(
            base.segment_index,
            Box::new(move |memory, addr| {
                let slot = Relocatable::new(
                    addr.segment_index,
                    addr.offset - addr.offset % CELLS_PER_INSTANCE,
                );
                let msg_addr = Relocatable::new(slot.segment_index, slot.offset + 1);
                // Only check once both cells of the slot are present
                let (Some(pubkey), Some(msg)) = (memory.get(&slot), memory.get(&msg_addr))
                else {
                    return Ok(());
                };
                let pubkey = pubkey.get_int()?;
                let msg = msg.get_int()?;
                let signatures = signatures.borrow();
                let (r, s) = signatures
                    .get(&slot)
                    .ok_or(MemoryError::MissingSignature(slot))?;
                if !verify(pubkey, msg, r, s) {
                    return Err(MemoryError::InvalidSignature(slot));
                }
                Ok(())
            }),
        )
    }
}
