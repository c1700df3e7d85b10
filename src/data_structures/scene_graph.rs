//! Entities, components and layers.
//!
//! A [`Layer`] owns an ordered list of [`Entity`]s and an entity owns an ordered list of
//! [`Component`]s. Update and render both walk these lists in insertion order. Components
//! never hold a reference to their entity: the entity passes its [`Transform`] into every
//! call instead.
//!
//! Everything holding GPU handles is released explicitly through [`GpuResource`].
//! Releasing an entity releases all of its components; releasing a layer releases all of
//! its entities.

use std::{
    any::Any,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::{
    context::GpuResource,
    data_structures::transform::Transform,
    error::GpuError,
    flow::UpdateContext,
    gpu::Gpu,
    render::RenderContext,
};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(u64);

/// A capability attached to an entity.
///
/// All methods have empty defaults so a component only implements what it needs.
pub trait Component: Any {
    fn update(&mut self, _transform: &mut Transform, _ctx: &UpdateContext) {}

    fn render(&self, _transform: &Transform, _ctx: &mut RenderContext<'_>) {}

    /// Give back every GPU handle the component holds.
    fn release(&mut self, _gpu: &mut dyn Gpu) {}
}

pub struct Entity {
    id: EntityId,
    layer: Option<LayerId>,
    transform: Transform,
    components: Vec<(ComponentId, Box<dyn Component>)>,
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("layer", &self.layer)
            .field("transform", &self.transform)
            .field("components", &self.components.len())
            .finish()
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::new()
    }
}

impl Entity {
    pub fn new() -> Self {
        Self {
            id: EntityId(next_id()),
            layer: None,
            transform: Transform::new(),
            components: Vec::new(),
        }
    }

    pub fn with_transform(transform: Transform) -> Self {
        Self {
            transform,
            ..Self::new()
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    /// The layer this entity was added to.
    pub fn layer(&self) -> Option<LayerId> {
        self.layer
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn transform_mut(&mut self) -> &mut Transform {
        &mut self.transform
    }

    /// Attach `component` after all existing ones. The entity takes ownership.
    pub fn add_component<C: Component>(&mut self, component: C) -> ComponentId {
        self.add_boxed_component(Box::new(component))
    }

    pub fn add_boxed_component(&mut self, component: Box<dyn Component>) -> ComponentId {
        let id = ComponentId(next_id());
        self.components.push((id, component));
        id
    }

    /// Detach a component and hand it back; the caller becomes responsible for releasing it.
    pub fn remove_component(&mut self, id: ComponentId) -> Option<Box<dyn Component>> {
        let idx = self.components.iter().position(|(cid, _)| *cid == id)?;
        Some(self.components.remove(idx).1)
    }

    /// The first component of type `C`.
    pub fn component<C: Component>(&self) -> Option<&C> {
        self.components
            .iter()
            .find_map(|(_, c)| (c.as_ref() as &dyn Any).downcast_ref::<C>())
    }

    pub fn component_mut<C: Component>(&mut self) -> Option<&mut C> {
        self.components
            .iter_mut()
            .find_map(|(_, c)| (c.as_mut() as &mut dyn Any).downcast_mut::<C>())
    }

    /// The component with `id`, if it has type `C`.
    pub fn component_by_id<C: Component>(&self, id: ComponentId) -> Option<&C> {
        self.components
            .iter()
            .find(|(cid, _)| *cid == id)
            .and_then(|(_, c)| (c.as_ref() as &dyn Any).downcast_ref::<C>())
    }

    pub fn component_by_id_mut<C: Component>(&mut self, id: ComponentId) -> Option<&mut C> {
        self.components
            .iter_mut()
            .find(|(cid, _)| *cid == id)
            .and_then(|(_, c)| (c.as_mut() as &mut dyn Any).downcast_mut::<C>())
    }

    pub fn component_ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.components.iter().map(|(id, _)| *id)
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn update(&mut self, ctx: &UpdateContext) {
        for (_, component) in self.components.iter_mut() {
            component.update(&mut self.transform, ctx);
        }
    }

    pub fn render(&self, ctx: &mut RenderContext<'_>) {
        for (_, component) in &self.components {
            component.render(&self.transform, ctx);
        }
    }
}

impl GpuResource for Entity {
    fn release(&mut self, gpu: &mut dyn Gpu) {
        for (_, mut component) in self.components.drain(..) {
            component.release(gpu);
        }
    }
}

/// A layer as the scene drives it.
pub trait SceneLayer: GpuResource + Any {
    fn update(&mut self, ctx: &UpdateContext);

    fn render(&self, ctx: &mut RenderContext<'_>);

    /// The window changed size.
    fn resize(&mut self, _gpu: &mut dyn Gpu, _width: u32, _height: u32) -> Result<(), GpuError> {
        Ok(())
    }
}

#[derive(Debug)]
pub struct Layer {
    id: LayerId,
    entities: Vec<Entity>,
}

impl Default for Layer {
    fn default() -> Self {
        Self::new()
    }
}

impl Layer {
    pub fn new() -> Self {
        Self {
            id: LayerId(next_id()),
            entities: Vec::new(),
        }
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    /// Append `entity`; it is updated and rendered after all entities added before it.
    pub fn add_entity(&mut self, mut entity: Entity) -> EntityId {
        entity.layer = Some(self.id);
        let id = entity.id;
        self.entities.push(entity);
        id
    }

    /// Take `id` out of the layer; the caller becomes responsible for releasing it.
    pub fn remove_entity(&mut self, id: EntityId) -> Option<Entity> {
        let idx = self.entities.iter().position(|e| e.id == id)?;
        let mut entity = self.entities.remove(idx);
        entity.layer = None;
        Some(entity)
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id == id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|e| e.id == id)
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn update(&mut self, ctx: &UpdateContext) {
        for entity in self.entities.iter_mut() {
            entity.update(ctx);
        }
    }

    pub fn render(&self, ctx: &mut RenderContext<'_>) {
        for entity in &self.entities {
            entity.render(ctx);
        }
    }
}

impl GpuResource for Layer {
    fn release(&mut self, gpu: &mut dyn Gpu) {
        for mut entity in self.entities.drain(..) {
            entity.release(gpu);
        }
    }
}

impl SceneLayer for Layer {
    fn update(&mut self, ctx: &UpdateContext) {
        Layer::update(self, ctx);
    }

    fn render(&self, ctx: &mut RenderContext<'_>) {
        Layer::render(self, ctx);
    }
}
