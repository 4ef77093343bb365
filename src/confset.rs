//! The process-wide confset: a single vector of type-erased conf objects
//! indexed by [`ModuleHandle`], published as one atomic unit so that
//! within a single [`load`] pass every changed module lands in the same
//! new snapshot, or none does.
//!
//! Concrete conf types are wildly different shapes (a [`crate::segment`]
//! `SegmentedConf<T>` for one module, a plain JSON-decoded struct for
//! another). The C source gave every concrete type a common header and
//! dispatched through function pointers (`container_of`-style downcasting,
//! per the design notes). In Rust, `Arc<dyn Any + Send + Sync>` plus
//! `Arc::downcast` gives the same thing for free: clone/refcount-inc is
//! `Arc::clone`, refcount-dec is `Drop`, and downcasting only ever happens
//! in the module's own code that already knows its concrete type.

use crate::registry::{ConfInfo, ModuleHandle, Registry};
use crate::snapshot::Snapshot;
use std::any::Any;
use std::sync::Arc;

/// One module's slot in the confset: empty until that module's first
/// successful load.
pub type ConfsetSlot = Option<Arc<dyn Any + Send + Sync>>;

/// The published, module-indexed vector of live conf objects. Cloning this
/// (done once per [`load`] pass, to produce the next generation) bumps the
/// refcount of every slot's `Arc` rather than copying its payload.
#[derive(Default, Clone)]
pub struct ConfsetVec(Vec<ConfsetSlot>);

impl ConfsetVec {
    /// Replace (or grow into) the slot at `handle` with a freshly loaded
    /// value. Growing is rare — module handles are assigned once at
    /// startup registration, so the vector settles at its final length
    /// after the first pass touches every registered module.
    pub fn set(&mut self, handle: ModuleHandle, value: Arc<dyn Any + Send + Sync>) {
        let idx = handle as usize;
        if idx >= self.0.len() {
            self.0.resize_with(idx + 1, || None);
        }
        self.0[idx] = Some(value);
    }

    pub fn clear(&mut self, handle: ModuleHandle) {
        if let Some(slot) = self.0.get_mut(handle as usize) {
            *slot = None;
        }
    }

    /// Fetch `handle`'s current value as its concrete type. Returns `None`
    /// if the module has never loaded successfully, or (a programmer
    /// error) if `T` doesn't match the type the module actually stores.
    pub fn get<T: Send + Sync + 'static>(&self, handle: ModuleHandle) -> Option<Arc<T>> {
        self.0.get(handle as usize)?.clone()?.downcast::<T>().ok()
    }

    pub fn is_empty_slot(&self, handle: ModuleHandle) -> bool {
        !matches!(self.0.get(handle as usize), Some(Some(_)))
    }
}

/// A module-indexed confset, published under a monotonic generation
/// counter. `acquire`/`release` are [`Snapshot::acquire`] and an implicit
/// `Drop` — see [`crate::snapshot`] for the publication mechanics this
/// type reuses verbatim.
pub type Confset = Snapshot<ConfsetVec>;

/// Run one `load()` pass: for every registered module whose content may
/// have changed, hand its [`ConfInfo`] to `reload_one` and let it produce
/// either a fresh type-erased value or `None` (module unchanged /
/// unloadable this pass, depending on how the caller wired its dispatcher).
/// If anything changed, build exactly one new confset vector — copying
/// every untouched module's `Arc` forward verbatim — and publish it in a
/// single atomic swap. Returns the new generation iff a publish happened.
///
/// This is the crate's only orchestration point that spans more than one
/// module at once; everything below it (a single module's reload) is
/// handled entirely by that module's own [`crate::segment::SegmentDispatcher`]
/// or equivalent single-file reload logic, called from inside `reload_one`.
pub fn load(
    confset: &Confset,
    registry: &mut Registry,
    mut reload_one: impl FnMut(ModuleHandle, &mut ConfInfo) -> Option<Arc<dyn Any + Send + Sync>>,
) -> Option<u64> {
    let current = confset.acquire();
    let mut next = (*current).clone();
    let mut changed = false;

    for handle in registry.handles().collect::<Vec<_>>() {
        if !registry.is_changed(handle).unwrap_or(false) {
            continue;
        }

        let info = match registry.get_mut(handle) {
            Ok(info) => info,
            Err(_) => continue,
        };

        if let Some(value) = reload_one(handle, info) {
            next.set(handle, value);
            changed = true;
        }
    }

    if changed {
        Some(confset.publish(next))
    } else {
        None
    }
}
