//! Light/primitive relationships.
//!
//! Interactions live in an arena owned by the scene. Each one remembers its
//! slot in the light's list and in the primitive's list, so either side can
//! drop it in O(1) with a swap-remove.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{
    scene::{light::LightProxy, primitive::PrimitiveFlags, primitive::PrimitiveSceneInfo},
    utils::allocator::{InteractionId, LightId, PrimitiveId},
};

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct InteractionFlags: u32 {
        const CASTS_SHADOW                    = 1 << 0;
        const IS_DYNAMIC                      = 1 << 1;
        const IS_LIGHT_MAPPED                 = 1 << 2;
        const SELF_SHADOW_ONLY                = 1 << 3;
        const CASTS_TRANSLUCENT_OBJECT_SHADOW = 1 << 4;
        const CASTS_INSET_OBJECT_SHADOW       = 1 << 5;
    }
}

/// Which of the light's two lists an interaction sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LightInteractionList {
    OftenMoving,
    Static,
}

#[derive(Debug, Clone)]
pub struct LightPrimitiveInteraction {
    pub light: LightId,
    pub primitive: PrimitiveId,
    pub flags: InteractionFlags,
    pub(crate) light_list: LightInteractionList,
    pub(crate) light_slot: usize,
    pub(crate) primitive_slot: usize,
}

impl LightPrimitiveInteraction {
    /// Flags for a (light, primitive) pair, or `None` when no interaction
    /// should exist: the light cannot reach the primitive, or the pair is
    /// fully baked and casts no dynamic shadow.
    pub fn evaluate(
        light: &LightProxy,
        primitive: &PrimitiveSceneInfo,
    ) -> Option<InteractionFlags> {
        if !light.affects_bounds(&primitive.bounds) {
            return None;
        }

        let light_mapped = light.has_static_lighting() && primitive.has_static_lighting();
        let casts_shadow = light.casts_dynamic_shadow() && primitive.casts_dynamic_shadow();
        if light_mapped && !casts_shadow {
            return None;
        }

        let mut flags = InteractionFlags::empty();
        flags.set(InteractionFlags::IS_LIGHT_MAPPED, light_mapped);
        flags.set(InteractionFlags::IS_DYNAMIC, !light_mapped);
        flags.set(InteractionFlags::CASTS_SHADOW, casts_shadow);
        flags.set(
            InteractionFlags::SELF_SHADOW_ONLY,
            primitive.flags.contains(PrimitiveFlags::CASTS_SELF_SHADOW_ONLY),
        );
        flags.set(
            InteractionFlags::CASTS_TRANSLUCENT_OBJECT_SHADOW,
            casts_shadow
                && primitive
                    .flags
                    .contains(PrimitiveFlags::CASTS_VOLUMETRIC_TRANSLUCENT_SHADOW),
        );
        flags.set(
            InteractionFlags::CASTS_INSET_OBJECT_SHADOW,
            casts_shadow && primitive.flags.contains(PrimitiveFlags::CASTS_INSET_SHADOW),
        );
        Some(flags)
    }

    pub fn has_shadow(&self) -> bool {
        self.flags.contains(InteractionFlags::CASTS_SHADOW)
    }

    pub fn casts_self_shadow_only(&self) -> bool {
        self.flags.contains(InteractionFlags::SELF_SHADOW_ONLY)
    }

    pub fn is_dynamic(&self) -> bool {
        self.flags.contains(InteractionFlags::IS_DYNAMIC)
    }

    pub fn is_light_mapped(&self) -> bool {
        self.flags.contains(InteractionFlags::IS_LIGHT_MAPPED)
    }

    pub fn light_list(&self) -> LightInteractionList {
        self.light_list
    }
}

/// Unordered list of interaction ids with O(1) removal by slot.
#[derive(Debug, Clone, Default)]
pub struct InteractionList {
    ids: Vec<InteractionId>,
}

impl InteractionList {
    pub fn iter(&self) -> impl Iterator<Item = InteractionId> + '_ {
        self.ids.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn as_slice(&self) -> &[InteractionId] {
        &self.ids
    }

    /// Appends `id` and returns its slot.
    pub(crate) fn push(&mut self, id: InteractionId) -> usize {
        self.ids.push(id);
        self.ids.len() - 1
    }

    /// Removes the entry at `slot`. Returns the id that was moved into `slot`
    /// to fill the gap, whose stored slot must be updated by the caller.
    pub(crate) fn swap_remove(&mut self, slot: usize) -> Option<InteractionId> {
        debug_assert!(slot < self.ids.len(), "interaction slot {slot} out of range");
        if slot >= self.ids.len() {
            return None;
        }
        self.ids.swap_remove(slot);
        self.ids.get(slot).copied()
    }
}
