use std::{cell::RefCell, rc::Rc};

use dusk_ngin::{
    context::GpuResource,
    data_structures::{
        scene_graph::{Component, Entity, Layer},
        transform::Transform,
        ui_layer::UiLayer,
    },
    flow::{Scene, UpdateContext},
    gpu::{headless::GpuCommand, ClearFlags, Gpu},
    render::RenderContext,
};

use crate::common::test_utils::context_with;
mod common;

type Log = Rc<RefCell<Vec<String>>>;

struct Recorder {
    name: String,
    log: Log,
}

impl Component for Recorder {
    fn update(&mut self, _transform: &mut Transform, ctx: &UpdateContext) {
        self.log.borrow_mut().push(format!("update {} {}", self.name, ctx.delta_time));
    }

    fn render(&self, transform: &Transform, _ctx: &mut RenderContext<'_>) {
        self.log
            .borrow_mut()
            .push(format!("render {} at {}", self.name, transform.position.x));
    }

    fn release(&mut self, _gpu: &mut dyn Gpu) {
        self.log.borrow_mut().push(format!("release {}", self.name));
    }
}

fn entity(names: &[&str], x: f32, log: &Log) -> Entity {
    let mut entity = Entity::new();
    entity.transform_mut().position.x = x;
    for name in names {
        entity.add_component(Recorder {
            name: name.to_string(),
            log: Rc::clone(log),
        });
    }
    entity
}

fn two_layer_scene(log: &Log) -> Scene {
    let mut world = Layer::new();
    world.add_entity(entity(&["a1", "a2"], 1.0, log));
    world.add_entity(entity(&["b"], 2.0, log));
    let mut overlay = Layer::new();
    overlay.add_entity(entity(&["c"], 3.0, log));

    let mut scene = Scene::new(800, 600);
    scene.add_layer(world);
    scene.add_layer(overlay);
    scene
}

#[test]
fn update_visits_layers_entities_and_components_in_order() {
    let log = Log::default();
    let mut scene = two_layer_scene(&log);
    scene.update(&UpdateContext {
        delta_time: 0.5,
        ..Default::default()
    });
    assert_eq!(*log.borrow(), vec!["update a1 0.5", "update a2 0.5", "update b 0.5", "update c 0.5"]);
}

#[test]
fn render_clears_draws_in_order_and_presents() {
    let log = Log::default();
    let mut ctx = context_with(vec![]);
    let mut scene = two_layer_scene(&log);
    scene.clear_colour = [0.2, 0.3, 0.4, 1.0];
    ctx.gpu.take_commands();

    scene.render(&mut ctx).unwrap();
    assert_eq!(*log.borrow(), vec!["render a1 at 1", "render a2 at 1", "render b at 2", "render c at 3"]);

    let commands = ctx.gpu.take_commands();
    assert_eq!(commands[0], GpuCommand::BindFramebuffer(None));
    assert_eq!(
        commands[1],
        GpuCommand::Clear {
            flags: ClearFlags::COLOUR | ClearFlags::DEPTH,
            colour: [0.2, 0.3, 0.4, 1.0],
        }
    );
    assert_eq!(commands.last(), Some(&GpuCommand::EndFrame));
}

#[test]
fn layers_are_found_by_type() {
    let log = Log::default();
    let mut ctx = context_with(vec![]);
    let mut scene = two_layer_scene(&log);
    let ui = scene.add_layer(UiLayer::new(&mut ctx.gpu, 800, 600).unwrap());

    assert_eq!(scene.layer_count(), 3);
    assert_eq!(scene.layer::<Layer>(0).map(Layer::len), Some(2));
    assert!(scene.layer::<UiLayer>(0).is_none());
    assert!(scene.layer::<Layer>(7).is_none());

    let extra = entity(&["d"], 4.0, &log);
    scene.layer_mut::<UiLayer>(ui).unwrap().add_entity(extra);
    assert_eq!(scene.layer::<UiLayer>(ui).unwrap().layer().len(), 1);
}

#[test]
fn removed_entity_belongs_to_the_caller() {
    let log = Log::default();
    let mut ctx = context_with(vec![]);
    let mut layer = Layer::new();
    let kept = layer.add_entity(entity(&["kept"], 0.0, &log));
    let taken = layer.add_entity(entity(&["taken"], 0.0, &log));

    let mut removed = layer.remove_entity(taken).unwrap();
    layer.release(&mut ctx.gpu);
    assert_eq!(*log.borrow(), vec!["release kept"]);
    assert!(layer.entity(kept).is_none());

    removed.release(&mut ctx.gpu);
    assert_eq!(removed.component_count(), 0);
    assert_eq!(log.borrow().last().map(String::as_str), Some("release taken"));
}

#[test]
fn scene_release_tears_down_every_layer() {
    let log = Log::default();
    let mut ctx = context_with(vec![]);
    let mut scene = two_layer_scene(&log);
    scene.add_layer(UiLayer::new(&mut ctx.gpu, 320, 200).unwrap());

    scene.release(&mut ctx.gpu);
    assert_eq!(scene.layer_count(), 0);
    assert_eq!(log.borrow().len(), 4);
    assert_eq!(ctx.gpu.live_framebuffers(), 0);
    assert_eq!(ctx.gpu.live_buffers(), 0);
}

#[test]
fn resize_reaches_the_layers() {
    let mut ctx = context_with(vec![]);
    let mut scene = Scene::new(800, 600);
    let ui = scene.add_layer(UiLayer::new(&mut ctx.gpu, 800, 600).unwrap());
    scene.resize(&mut ctx.gpu, 1280, 720).unwrap();
    assert_eq!(scene.layer::<UiLayer>(ui).unwrap().size(), (1280, 720));

    // a minimised window keeps the previous size
    scene.resize(&mut ctx.gpu, 0, 0).unwrap();
    assert_eq!(scene.layer::<UiLayer>(ui).unwrap().size(), (1280, 720));
}
