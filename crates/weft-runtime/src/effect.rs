#![forbid(unsafe_code)]

//! Effects and the execution context they run in.
//!
//! An effect is a compiled recomputation unit registered against the scope
//! slots it depends on. Writing a slot through [`Cx::set`] queues every
//! effect registered on that slot when the value actually changed;
//! [`Cx::flush`] then runs the queue until it is empty.
//!
//! # Invariants
//!
//! 1. Within one flush each effect runs at most once, even if a running
//!    effect re-queues it.
//! 2. Effects run in the order they were first queued.
//! 3. A failed effect aborts the flush and drops the rest of the queue.

use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::dom::{Document, NodeRef};
use crate::error::{Result, RuntimeError};
use crate::scope::Scope;

/// Index of an effect in its renderer's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EffectId(u32);

impl EffectId {
    #[inline]
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Compiled effect body.
pub type EffectFn = Rc<dyn Fn(&mut Cx<'_>) -> Result<()>>;

#[derive(Clone)]
pub struct Effect {
    pub name: String,
    pub slots: SmallVec<[usize; 2]>,
    run: EffectFn,
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("name", &self.name)
            .field("slots", &self.slots)
            .finish_non_exhaustive()
    }
}

/// Effects of one renderer, indexed by the slots they depend on.
#[derive(Debug, Clone, Default)]
pub struct EffectTable {
    effects: Vec<Effect>,
    by_slot: Vec<SmallVec<[EffectId; 2]>>,
}

impl EffectTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `run` on `slots`.
    pub fn register(&mut self, name: &str, slots: &[usize], run: EffectFn) -> EffectId {
        let len = self.effects.len();
        assert!(
            len <= u32::MAX as usize,
            "effect id overflow: {len} (max={})",
            u32::MAX
        );
        let id = EffectId(len as u32);
        for &slot in slots {
            if self.by_slot.len() <= slot {
                self.by_slot.resize_with(slot + 1, SmallVec::new);
            }
            if !self.by_slot[slot].contains(&id) {
                self.by_slot[slot].push(id);
            }
        }
        self.effects.push(Effect {
            name: name.to_owned(),
            slots: slots.iter().copied().collect(),
            run,
        });
        id
    }

    #[must_use]
    pub fn get(&self, id: EffectId) -> Option<&Effect> {
        self.effects.get(id.index())
    }

    /// Effects depending on `slot`.
    #[must_use]
    pub fn on_slot(&self, slot: usize) -> &[EffectId] {
        self.by_slot.get(slot).map(SmallVec::as_slice).unwrap_or(&[])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.effects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }
}

/// What compiled callbacks see: one scope, its document, its effects.
pub struct Cx<'a> {
    scope: &'a mut Scope,
    doc: &'a mut Document,
    effects: &'a EffectTable,
}

impl<'a> Cx<'a> {
    pub fn new(scope: &'a mut Scope, doc: &'a mut Document, effects: &'a EffectTable) -> Self {
        Self {
            scope,
            doc,
            effects,
        }
    }

    #[must_use]
    pub fn scope(&self) -> &Scope {
        self.scope
    }

    pub fn scope_mut(&mut self) -> &mut Scope {
        self.scope
    }

    pub fn doc(&mut self) -> &mut Document {
        self.doc
    }

    /// Current value of `slot`; `null` for slots outside the scope.
    #[must_use]
    pub fn get(&self, slot: usize) -> &Value {
        self.scope.value(slot).unwrap_or(&Value::Null)
    }

    /// Write `slot` and queue its effects if the value changed. Returns
    /// whether it changed.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::SlotOutOfRange`] for slots outside the scope.
    pub fn set(&mut self, slot: usize, value: impl Into<Value>) -> Result<bool> {
        let changed = self
            .scope
            .store(slot, value.into())
            .ok_or(RuntimeError::SlotOutOfRange {
                slot,
                size: self.scope.size(),
            })?;
        if changed {
            for effect in self.effects.on_slot(slot) {
                self.scope.enqueue(*effect);
            }
        }
        Ok(changed)
    }

    /// Queue one effect directly.
    pub fn queue_effect(&mut self, effect: EffectId) -> bool {
        self.scope.enqueue(effect)
    }

    /// Node bound at walk index `index`.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::UnboundNode`] if the walk bound fewer nodes.
    pub fn node(&self, index: usize) -> Result<NodeRef> {
        self.scope
            .node(index)
            .ok_or(RuntimeError::UnboundNode { index })
    }

    /// Set the text of the bound node at `index` to the display form of
    /// `value`: strings verbatim, `null` as empty, anything else as JSON.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::UnboundNode`] if the walk bound fewer nodes.
    pub fn set_data(&mut self, index: usize, value: &Value) -> Result<()> {
        let node = self.node(index)?;
        let text = match value {
            Value::String(text) => text.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        self.doc.set_text(node, &text);
        Ok(())
    }

    /// Run queued effects until the queue is empty. Returns how many ran.
    ///
    /// # Errors
    ///
    /// The first effect error; the remaining queue is dropped.
    pub fn flush(&mut self) -> Result<usize> {
        let mut ran: SmallVec<[EffectId; 8]> = SmallVec::new();
        while let Some(id) = self.scope.dequeue() {
            if ran.contains(&id) {
                continue;
            }
            ran.push(id);
            let Some(effect) = self.effects.get(id) else {
                continue;
            };
            trace!(
                message = "runtime.effect",
                scope = self.scope.id().get(),
                effect = %effect.name,
            );
            let run = Rc::clone(&effect.run);
            if let Err(err) = run(self) {
                self.scope.clear_queue();
                return Err(err);
            }
        }
        debug!(
            message = "runtime.flush",
            scope = self.scope.id().get(),
            effects = ran.len(),
        );
        Ok(ran.len())
    }
}
