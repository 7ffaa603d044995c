//! Register sets
//!
//! A register set is a fixed-capacity array of slots. A slot either owns
//! its arena entry or borrows one owned by another slot. Writing to a
//! borrowing slot mutates the referent in place; overwriting an owning slot
//! replaces its entry in place, so every alias observes the new object.
//!
//! All operations are bounds checked; indices at or past the set size fail
//! with [`VmError::RegisterBounds`].

use crate::arena::{Arena, ArenaIndex};
use crate::object::Object;
use crate::{VmError, VmResult};

/// Advisory consumption flag carried by each occupied slot
///
/// `Keep` marks an object whose ownership is about to travel out of the
/// slot (the `throw` protocol), so clearing the slot must not destroy it.
/// The arena's ownership accounting enforces this mechanically; the mask
/// remains the instruction-visible surface (`setmask`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mask {
    /// Object is transferred out when the slot is consumed
    #[default]
    Move,
    /// Object is preserved when the slot is consumed
    Keep,
}

/// How a slot relates to its arena entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// The slot owns the entry
    Owning,
    /// The slot borrows an entry owned elsewhere; writes mutate the
    /// referent and clearing never destroys it
    Borrowed,
}

/// An occupied register slot
#[derive(Debug, Clone, Copy)]
pub struct Slot {
    /// The arena entry this slot designates
    pub entry: ArenaIndex,
    /// Owning or borrowed
    pub kind: SlotKind,
    /// Advisory consumption flag
    pub mask: Mask,
}

impl Slot {
    fn owning(entry: ArenaIndex) -> Self {
        Self {
            entry,
            kind: SlotKind::Owning,
            mask: Mask::Move,
        }
    }

    fn borrowed(entry: ArenaIndex) -> Self {
        Self {
            entry,
            kind: SlotKind::Borrowed,
            mask: Mask::Move,
        }
    }
}

/// Fixed-capacity array of owning or borrowing object slots
#[derive(Debug, Default)]
pub struct RegisterSet {
    slots: Vec<Option<Slot>>,
}

impl RegisterSet {
    /// Create a set of `size` empty slots
    pub fn new(size: usize) -> Self {
        Self {
            slots: vec![None; size],
        }
    }

    /// Number of slots
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    fn check(&self, index: usize) -> VmResult<()> {
        if index < self.slots.len() {
            Ok(())
        } else {
            Err(VmError::RegisterBounds {
                index,
                size: self.slots.len(),
            })
        }
    }

    fn slot(&self, index: usize) -> VmResult<&Slot> {
        self.check(index)?;
        self.slots[index]
            .as_ref()
            .ok_or(VmError::NullRegister(index))
    }

    /// Whether the slot is empty
    pub fn is_null(&self, index: usize) -> VmResult<bool> {
        self.check(index)?;
        Ok(self.slots[index].is_none())
    }

    /// Whether the slot borrows its entry
    pub fn is_reference(&self, index: usize) -> VmResult<bool> {
        Ok(self.slot(index)?.kind == SlotKind::Borrowed)
    }

    /// The arena entry the slot designates
    pub fn entry_of(&self, index: usize) -> VmResult<ArenaIndex> {
        Ok(self.slot(index)?.entry)
    }

    /// Read the object in the slot (through the referent for borrows)
    pub fn object<'a>(&self, arena: &'a Arena, index: usize) -> VmResult<&'a Object> {
        arena.object(self.slot(index)?.entry)
    }

    /// Mutably read the object in the slot
    pub fn object_mut<'a>(&self, arena: &'a mut Arena, index: usize) -> VmResult<&'a mut Object> {
        arena.object_mut(self.slot(index)?.entry)
    }

    /// Place `object` in the slot.
    ///
    /// An empty slot allocates a fresh owning entry. An occupied slot —
    /// owning or borrowing — replaces its entry's object in place, which
    /// both implements write-through-reference and keeps every alias of an
    /// overwritten owner pointing at the new object.
    pub fn set(&mut self, arena: &mut Arena, index: usize, object: Object) -> VmResult<()> {
        self.check(index)?;
        match &self.slots[index] {
            Some(slot) => arena.replace(slot.entry, object),
            None => {
                self.slots[index] = Some(Slot::owning(arena.alloc(object)));
                Ok(())
            }
        }
    }

    /// Set the advisory mask of an occupied slot
    pub fn set_mask(&mut self, index: usize, mask: Mask) -> VmResult<()> {
        self.check(index)?;
        match &mut self.slots[index] {
            Some(slot) => {
                slot.mask = mask;
                Ok(())
            }
            None => Err(VmError::NullRegister(index)),
        }
    }

    /// The advisory mask of an occupied slot
    pub fn mask(&self, index: usize) -> VmResult<Mask> {
        Ok(self.slot(index)?.mask)
    }

    /// Make `dst` a borrowing alias of `src`'s entry
    pub fn reference(&mut self, arena: &mut Arena, src: usize, dst: usize) -> VmResult<()> {
        let entry = self.slot(src)?.entry;
        self.check(dst)?;
        self.clear(arena, dst)?;
        arena.borrow(entry)?;
        self.slots[dst] = Some(Slot::borrowed(entry));
        Ok(())
    }

    /// Move the object from `src` to `dst`, clearing `src` without
    /// destruction.
    ///
    /// An empty destination receives the slot wholesale, so aliases of the
    /// source stay valid. An occupied destination has its entry's object
    /// replaced in place; a borrowing source contributes a deep copy of its
    /// referent (the referent itself stays where it is).
    pub fn move_reg(&mut self, arena: &mut Arena, src: usize, dst: usize) -> VmResult<()> {
        if src == dst {
            self.slot(src)?;
            return Ok(());
        }
        self.slot(src)?;
        self.check(dst)?;

        let Some(dst_entry) = self.slots[dst].as_ref().map(|slot| slot.entry) else {
            let moved = self.slots[src].take();
            self.slots[dst] = moved;
            return Ok(());
        };

        let object = self.take_object(arena, src)?;
        arena.replace(dst_entry, object)
    }

    /// Place a deep copy of `src`'s object into `dst`
    pub fn copy_reg(&mut self, arena: &mut Arena, src: usize, dst: usize) -> VmResult<()> {
        let copy = self.object(arena, src)?.deep_copy();
        self.set(arena, dst, copy)
    }

    /// Consume the slot and yield an owned object, clearing the slot.
    ///
    /// A sole owner moves its object out of the arena; an aliased owner or
    /// a borrow contributes a deep copy, leaving the referent with its
    /// remaining holders. Used where objects leave the register file for
    /// tree-owned storage (`vpush`, `vinsert`, foreign return values).
    pub fn take_object(&mut self, arena: &mut Arena, index: usize) -> VmResult<Object> {
        let slot = *self.slot(index)?;
        let object = match slot.kind {
            SlotKind::Owning => {
                if arena.borrows(slot.entry)? > 0 {
                    let copy = arena.object(slot.entry)?.deep_copy();
                    arena.disown(slot.entry)?;
                    copy
                } else {
                    arena.take(slot.entry, index)?
                }
            }
            SlotKind::Borrowed => {
                let copy = arena.object(slot.entry)?.deep_copy();
                arena.release_borrow(slot.entry)?;
                copy
            }
        };
        self.slots[index] = None;
        Ok(object)
    }

    /// Exchange two slots wholesale (entries, kinds and masks travel
    /// together); either side may be empty
    pub fn swap(&mut self, a: usize, b: usize) -> VmResult<()> {
        self.check(a)?;
        self.check(b)?;
        self.slots.swap(a, b);
        Ok(())
    }

    /// Destroy the slot's object and clear the slot.
    ///
    /// Fails on a borrowing slot (references are detached by overwrite,
    /// never freed through the alias) and on an owner whose entry other
    /// slots still borrow.
    pub fn free(&mut self, arena: &mut Arena, index: usize) -> VmResult<()> {
        let slot = *self.slot(index)?;
        if slot.kind == SlotKind::Borrowed {
            return Err(VmError::ReferenceFree(index));
        }
        arena.free_owned(slot.entry, index)?;
        self.slots[index] = None;
        Ok(())
    }

    /// Clear the slot without forcing destruction: an owner disowns its
    /// entry (destroyed only once no borrows remain), a borrow is released.
    /// Clearing an empty slot is a no-op.
    pub fn clear(&mut self, arena: &mut Arena, index: usize) -> VmResult<()> {
        self.check(index)?;
        if let Some(slot) = self.slots[index].take() {
            match slot.kind {
                SlotKind::Owning => arena.disown(slot.entry)?,
                SlotKind::Borrowed => arena.release_borrow(slot.entry)?,
            }
        }
        Ok(())
    }

    /// Take the slot out wholesale; ownership (or the borrow) travels with
    /// the returned [`Slot`]. Used by `move`, `throw` and the temporary
    /// slot protocol.
    pub fn take_slot(&mut self, index: usize) -> VmResult<Slot> {
        self.check(index)?;
        self.slots[index].take().ok_or(VmError::NullRegister(index))
    }

    /// Install a slot taken from elsewhere, releasing any occupant first
    pub fn put_slot(&mut self, arena: &mut Arena, index: usize, slot: Slot) -> VmResult<()> {
        self.check(index)?;
        self.clear(arena, index)?;
        self.slots[index] = Some(slot);
        Ok(())
    }

    /// Release every slot (frame teardown)
    pub fn release_all(&mut self, arena: &mut Arena) -> VmResult<()> {
        for index in 0..self.slots.len() {
            self.clear(arena, index)?;
        }
        Ok(())
    }

    /// Indices of the occupied slots, in order
    pub fn occupied(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| i))
            .collect()
    }
}
