use glam::Vec3;

use crate::{
    geometry::BoxSphereBounds,
    scene::{
        interaction::{
            InteractionFlags, InteractionList, LightInteractionList, LightPrimitiveInteraction,
        },
        light::LightProxy,
        primitive::{MaterialTable, PrimitiveFlags, PrimitiveSceneInfo, ShadowMaterialQuery},
    },
    shadow::cache::ShadowCacheTable,
    utils::allocator::{Arena, InteractionId, LightId, PrimitiveId},
};

/// A light registered in a scene together with its interaction lists.
#[derive(Debug, Clone)]
pub struct LightSceneInfo {
    pub id: LightId,
    pub proxy: LightProxy,
    pub(crate) often_moving_interactions: InteractionList,
    pub(crate) static_interactions: InteractionList,
}

impl LightSceneInfo {
    pub fn often_moving_interactions(&self) -> &InteractionList {
        &self.often_moving_interactions
    }

    pub fn static_interactions(&self) -> &InteractionList {
        &self.static_interactions
    }

    fn list_mut(&mut self, list: LightInteractionList) -> &mut InteractionList {
        match list {
            LightInteractionList::OftenMoving => &mut self.often_moving_interactions,
            LightInteractionList::Static => &mut self.static_interactions,
        }
    }
}

/// Lights, primitives and their interactions, plus the persistent shadow
/// cache. Shadow setup only reads the scene; the cache table synchronizes its
/// own mutation.
pub struct Scene {
    lights: Arena<LightSceneInfo>,
    light_order: Vec<LightId>,
    primitives: Arena<PrimitiveSceneInfo>,
    interactions: Arena<LightPrimitiveInteraction>,
    materials: Box<dyn ShadowMaterialQuery>,
    cached_shadow_maps: ShadowCacheTable,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self {
            lights: Arena::new(),
            light_order: Vec::new(),
            primitives: Arena::new(),
            interactions: Arena::new(),
            materials: Box::new(MaterialTable::new()),
            cached_shadow_maps: ShadowCacheTable::new(),
        }
    }

    pub fn set_material_query<M>(&mut self, materials: M)
    where
        M: ShadowMaterialQuery + 'static,
    {
        self.materials = Box::new(materials);
    }

    pub fn materials(&self) -> &dyn ShadowMaterialQuery {
        self.materials.as_ref()
    }

    pub fn cached_shadow_maps(&self) -> &ShadowCacheTable {
        &self.cached_shadow_maps
    }

    pub fn add_light(&mut self, proxy: LightProxy) -> LightId {
        let id = LightId::from(self.lights.insert(LightSceneInfo {
            id: LightId::default(),
            proxy,
            often_moving_interactions: InteractionList::default(),
            static_interactions: InteractionList::default(),
        }));
        if let Some(info) = self.lights.get_mut(id) {
            info.id = id;
        }
        self.light_order.push(id);

        let primitive_ids: Vec<PrimitiveId> =
            self.primitives.ids().map(PrimitiveId::from).collect();
        for primitive_id in primitive_ids {
            self.try_create_interaction(id, primitive_id);
        }
        log::debug!("added light {:?} with {} interactions", id, self.light_interaction_count(id));
        id
    }

    /// Removes a light, detaching its interactions. Its cached shadow map is
    /// queued for release on the next frame.
    pub fn remove_light(&mut self, id: LightId) -> Option<LightProxy> {
        let info = self.lights.get(id)?;
        let attached: Vec<InteractionId> = info
            .often_moving_interactions
            .iter()
            .chain(info.static_interactions.iter())
            .collect();
        for interaction_id in attached {
            self.detach_interaction(interaction_id);
        }

        self.light_order.retain(|&light| light != id);
        self.cached_shadow_maps.remove_light(id);
        self.lights.remove(id).map(|info| info.proxy)
    }

    /// Replaces a light's proxy and re-evaluates all of its interactions.
    pub fn update_light(&mut self, id: LightId, proxy: LightProxy) -> bool {
        let Some(info) = self.lights.get_mut(id) else {
            return false;
        };
        info.proxy = proxy;
        let attached: Vec<InteractionId> = info
            .often_moving_interactions
            .iter()
            .chain(info.static_interactions.iter())
            .collect();
        for interaction_id in attached {
            self.detach_interaction(interaction_id);
        }

        let primitive_ids: Vec<PrimitiveId> =
            self.primitives.ids().map(PrimitiveId::from).collect();
        for primitive_id in primitive_ids {
            self.try_create_interaction(id, primitive_id);
        }
        true
    }

    /// Moves a light without changing anything else about it.
    pub fn set_light_transform(&mut self, id: LightId, position: Vec3, direction: Vec3) -> bool {
        let Some(mut proxy) = self.lights.get(id).map(|info| info.proxy.clone()) else {
            return false;
        };
        proxy.set_transform(position, direction);
        self.update_light(id, proxy)
    }

    pub fn add_primitive(&mut self, primitive: PrimitiveSceneInfo) -> PrimitiveId {
        let id = PrimitiveId::from(self.primitives.insert(primitive));
        if let Some(info) = self.primitives.get_mut(id) {
            info.id = id;
            info.interactions = InteractionList::default();
        }

        for light_id in self.light_order.clone() {
            self.try_create_interaction(light_id, id);
        }
        id
    }

    pub fn remove_primitive(&mut self, id: PrimitiveId) -> Option<PrimitiveSceneInfo> {
        let attached: Vec<InteractionId> = self.primitives.get(id)?.interactions.iter().collect();
        for interaction_id in attached {
            self.detach_interaction(interaction_id);
        }
        self.primitives.remove(id)
    }

    /// Changes a primitive's bounds and flags, re-evaluating its interactions.
    pub fn update_primitive(
        &mut self,
        id: PrimitiveId,
        bounds: BoxSphereBounds,
        flags: PrimitiveFlags,
    ) -> bool {
        let Some(info) = self.primitives.get_mut(id) else {
            return false;
        };
        info.bounds = bounds;
        info.flags = flags;
        let attached: Vec<InteractionId> = info.interactions.iter().collect();
        for interaction_id in attached {
            self.detach_interaction(interaction_id);
        }

        for light_id in self.light_order.clone() {
            self.try_create_interaction(light_id, id);
        }
        true
    }

    pub fn light(&self, id: LightId) -> Option<&LightSceneInfo> {
        self.lights.get(id)
    }

    /// Lights in registration order.
    pub fn lights(&self) -> impl Iterator<Item = &LightSceneInfo> + '_ {
        self.light_order.iter().filter_map(move |&id| self.lights.get(id))
    }

    pub fn light_ids(&self) -> &[LightId] {
        &self.light_order
    }

    pub fn light_count(&self) -> usize {
        self.light_order.len()
    }

    pub fn primitive(&self, id: PrimitiveId) -> Option<&PrimitiveSceneInfo> {
        self.primitives.get(id)
    }

    pub fn primitives(&self) -> impl Iterator<Item = &PrimitiveSceneInfo> + '_ {
        self.primitives.iter()
    }

    pub fn primitive_count(&self) -> usize {
        self.primitives.len()
    }

    pub fn interaction(&self, id: InteractionId) -> Option<&LightPrimitiveInteraction> {
        self.interactions.get(id)
    }

    pub fn interaction_count(&self) -> usize {
        self.interactions.len()
    }

    pub fn light_interaction_count(&self, id: LightId) -> usize {
        self.lights
            .get(id)
            .map(|info| info.often_moving_interactions.len() + info.static_interactions.len())
            .unwrap_or(0)
    }

    fn try_create_interaction(&mut self, light_id: LightId, primitive_id: PrimitiveId) {
        let (Some(light), Some(primitive)) =
            (self.lights.get(light_id), self.primitives.get(primitive_id))
        else {
            return;
        };
        let Some(flags) = LightPrimitiveInteraction::evaluate(&light.proxy, primitive) else {
            return;
        };
        let light_list = if primitive.is_often_moving() {
            LightInteractionList::OftenMoving
        } else {
            LightInteractionList::Static
        };

        let id = InteractionId::from(self.interactions.insert(LightPrimitiveInteraction {
            light: light_id,
            primitive: primitive_id,
            flags,
            light_list,
            light_slot: 0,
            primitive_slot: 0,
        }));

        let light_slot = match self.lights.get_mut(light_id) {
            Some(light) => light.list_mut(light_list).push(id),
            None => return,
        };
        let primitive_slot = match self.primitives.get_mut(primitive_id) {
            Some(primitive) => primitive.interactions.push(id),
            None => return,
        };
        if let Some(interaction) = self.interactions.get_mut(id) {
            interaction.light_slot = light_slot;
            interaction.primitive_slot = primitive_slot;
        }
        self.invalidate_static_depth(light_id, light_list, flags);
    }

    fn detach_interaction(&mut self, id: InteractionId) {
        let Some(interaction) = self.interactions.remove(id) else {
            return;
        };

        if let Some(light) = self.lights.get_mut(interaction.light) {
            let moved = light.list_mut(interaction.light_list).swap_remove(interaction.light_slot);
            if let Some(moved) = moved.and_then(|moved| self.interactions.get_mut(moved)) {
                moved.light_slot = interaction.light_slot;
            }
        }

        if let Some(primitive) = self.primitives.get_mut(interaction.primitive) {
            let moved = primitive.interactions.swap_remove(interaction.primitive_slot);
            if let Some(moved) = moved.and_then(|moved| self.interactions.get_mut(moved)) {
                moved.primitive_slot = interaction.primitive_slot;
            }
        }
        self.invalidate_static_depth(interaction.light, interaction.light_list, interaction.flags);
    }

    /// A static caster appearing in or leaving a light's static list makes
    /// its cached static depth wrong.
    fn invalidate_static_depth(
        &self,
        light_id: LightId,
        light_list: LightInteractionList,
        flags: InteractionFlags,
    ) {
        let casts_shadow = flags.contains(InteractionFlags::CASTS_SHADOW);
        if light_list == LightInteractionList::Static && casts_shadow {
            self.cached_shadow_maps.invalidate_static(light_id);
        }
    }
}
