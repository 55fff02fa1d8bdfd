//! The player character: camera-relative movement driven by the joystick,
//! grid collision, and idle/walk/run/bored clip blending.

use std::f32::consts::{PI, TAU};

use bevy::asset::LoadState;
use bevy::prelude::*;

use crate::camera::IsoCamera;
use crate::config::{CharacterConfig, GameConfig};
use crate::enemy::PlayerCaught;
use crate::input::JoystickInput;
use crate::level::LevelGrid;
use crate::{GameSet, GameState};

pub struct CharacterPlugin;

impl Plugin for CharacterPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(OnEnter(GameState::Playing), spawn_character);
        app.add_systems(
            Update,
            (
                handle_added_characters,
                watch_character_model,
                attach_animation_graphs,
            ),
        );
        app.add_systems(
            Update,
            (
                (move_character, respawn_caught_character)
                    .chain()
                    .in_set(GameSet::Movement),
                (update_locomotion, apply_locomotion_weights)
                    .chain()
                    .in_set(GameSet::Presentation),
            )
                .run_if(in_state(GameState::Playing)),
        );

        app.register_type::<IsoCharacter>();
        app.register_type::<CharacterController>();
        app.register_type::<Locomotion>();
    }
}

#[derive(Component, Default, Reflect)]
#[require(CharacterController, Locomotion, Transform, Visibility)]
pub struct IsoCharacter;

#[derive(Component, Default, Reflect, Debug, Clone)]
pub struct CharacterController {
    /// Yaw in radians; 0 faces +Z.
    pub facing: f32,
    /// Joystick magnitude this frame.
    pub intent: f32,
    pub idle_time: f32,
}

#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocomotionState {
    #[default]
    Idle,
    Walk,
    Run,
    Bored,
}

impl LocomotionState {
    pub const ALL: [LocomotionState; 4] = [
        LocomotionState::Idle,
        LocomotionState::Walk,
        LocomotionState::Run,
        LocomotionState::Bored,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Component, Reflect, Debug, Clone)]
pub struct Locomotion {
    pub state: LocomotionState,
    /// Clip weights indexed by [`LocomotionState::index`].
    pub weights: [f32; 4],
}

impl Default for Locomotion {
    fn default() -> Self {
        Self {
            state: LocomotionState::Idle,
            weights: [1.0, 0.0, 0.0, 0.0],
        }
    }
}

/// Tracks the glTF scene until it either loads or turns out to be missing.
#[derive(Component)]
struct PendingModel {
    scene: Handle<Scene>,
    placeholder: Entity,
}

/// Animation graph shared by every character instance.
#[derive(Resource)]
struct CharacterAnimations {
    graph: Handle<AnimationGraph>,
    nodes: Vec<AnimationNodeIndex>,
}

/// Points an [`AnimationPlayer`] deep inside a character scene back at the
/// character whose [`Locomotion`] drives it.
#[derive(Component)]
struct AnimationOwner(Entity);

/// Converts a joystick vector into a world-space XZ direction relative to the
/// camera: joystick up walks away from the camera. The result keeps the input
/// magnitude.
pub fn camera_relative_direction(input: Vec2, camera_rotation: Quat) -> Vec3 {
    let flatten = |v: Vec3| Vec3::new(v.x, 0.0, v.z).normalize_or_zero();
    let mut forward = flatten(camera_rotation * Vec3::NEG_Z);
    if forward == Vec3::ZERO {
        // Looking straight down: screen up is the camera's up vector.
        forward = flatten(camera_rotation * Vec3::Y);
    }
    let right = Vec3::new(-forward.z, 0.0, forward.x);
    right * input.x + forward * input.y
}

/// Ground speed for a joystick magnitude. Below the run threshold the walk
/// speed scales with how far the stick is pushed.
pub fn movement_speed(magnitude: f32, config: &CharacterConfig) -> f32 {
    if magnitude <= 0.0 {
        0.0
    } else if magnitude >= config.run_threshold {
        config.run_speed
    } else {
        config.walk_speed * (magnitude / config.run_threshold)
    }
}

/// Yaw for a horizontal direction; 0 faces +Z.
pub fn yaw_of(direction: Vec3) -> f32 {
    direction.x.atan2(direction.z)
}

/// Rotates `current` toward `target` along the shortest arc by at most `max_step`.
pub fn turn_towards(current: f32, target: f32, max_step: f32) -> f32 {
    let diff = (target - current + PI).rem_euclid(TAU) - PI;
    if diff.abs() <= max_step {
        target
    } else {
        current + max_step * diff.signum()
    }
}

pub fn classify_locomotion(magnitude: f32, idle_time: f32, config: &CharacterConfig) -> LocomotionState {
    if magnitude <= 0.0 {
        if idle_time >= config.bored_delay {
            LocomotionState::Bored
        } else {
            LocomotionState::Idle
        }
    } else if magnitude >= config.run_threshold {
        LocomotionState::Run
    } else {
        LocomotionState::Walk
    }
}

/// Moves every weight toward 1 for `target` and 0 otherwise by at most
/// `step`, then renormalises so the weights sum to 1.
pub fn blend_weights(weights: [f32; 4], target: LocomotionState, step: f32) -> [f32; 4] {
    let mut blended = weights;
    for (i, weight) in blended.iter_mut().enumerate() {
        let goal = if i == target.index() { 1.0 } else { 0.0 };
        *weight += (goal - *weight).clamp(-step, step);
    }
    let sum: f32 = blended.iter().sum();
    if sum > f32::EPSILON {
        blended.iter_mut().for_each(|w| *w /= sum);
    } else {
        blended = [0.0; 4];
        blended[target.index()] = 1.0;
    }
    blended
}

fn spawn_character(mut commands: Commands, grid: Res<LevelGrid>) {
    commands.spawn((
        Name::new("Player"),
        IsoCharacter,
        Transform::from_translation(grid.spawn_point()),
    ));
}

fn handle_added_characters(
    mut commands: Commands,
    added_characters: Query<Entity, Added<IsoCharacter>>,
    config: Res<GameConfig>,
    asset_server: Res<AssetServer>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut graphs: ResMut<Assets<AnimationGraph>>,
) {
    for char_ent in &added_characters {
        let placeholder = commands
            .spawn((
                Mesh3d(meshes.add(Capsule3d::new(0.3, 0.9))),
                MeshMaterial3d(materials.add(Color::srgb(0.9, 0.55, 0.3))),
                Transform::from_xyz(0.0, 0.75, 0.0),
                ChildOf(char_ent),
            ))
            .id();

        let Some(model) = config.character_model.clone() else {
            continue;
        };
        let scene = asset_server.load(GltfAssetLabel::Scene(0).from_asset(model.clone()));
        commands
            .entity(char_ent)
            .insert(PendingModel {
                scene: scene.clone(),
                placeholder,
            })
            .with_child((SceneRoot(scene), Transform::default()));

        let clips = LocomotionState::ALL.iter().map(|state| {
            asset_server.load(GltfAssetLabel::Animation(state.index()).from_asset(model.clone()))
        });
        let (graph, nodes) = AnimationGraph::from_clips(clips);
        commands.insert_resource(CharacterAnimations {
            graph: graphs.add(graph),
            nodes,
        });
    }
}

fn watch_character_model(
    mut commands: Commands,
    asset_server: Res<AssetServer>,
    pending: Query<(Entity, &PendingModel)>,
) {
    for (char_ent, model) in &pending {
        match asset_server.load_state(&model.scene) {
            LoadState::Loaded => {
                commands.entity(model.placeholder).despawn();
                commands.entity(char_ent).remove::<PendingModel>();
            }
            LoadState::Failed(err) => {
                warn!("character model unavailable ({err}), keeping the placeholder capsule");
                commands.entity(char_ent).remove::<PendingModel>();
            }
            LoadState::NotLoaded | LoadState::Loading => {}
        }
    }
}

fn attach_animation_graphs(
    mut commands: Commands,
    animations: Option<Res<CharacterAnimations>>,
    mut players: Query<(Entity, &mut AnimationPlayer), Added<AnimationPlayer>>,
    parents: Query<&ChildOf>,
    characters: Query<(), With<IsoCharacter>>,
) {
    let Some(animations) = animations else {
        return;
    };
    for (player_ent, mut player) in &mut players {
        let mut current = player_ent;
        let owner = loop {
            let Ok(child_of) = parents.get(current) else {
                break None;
            };
            current = child_of.parent();
            if characters.contains(current) {
                break Some(current);
            }
        };
        let Some(owner) = owner else {
            continue;
        };

        for (state, &node) in LocomotionState::ALL.iter().zip(&animations.nodes) {
            let weight = if *state == LocomotionState::Idle { 1.0 } else { 0.0 };
            player.play(node).repeat().set_weight(weight);
        }
        commands.entity(player_ent).insert((
            AnimationGraphHandle(animations.graph.clone()),
            AnimationOwner(owner),
        ));
        debug!("animation player {player_ent} bound to character {owner}");
    }
}

fn move_character(
    time: Res<Time>,
    config: Res<GameConfig>,
    joystick: Res<JoystickInput>,
    grid: Res<LevelGrid>,
    camera: Query<&Transform, (With<IsoCamera>, Without<IsoCharacter>)>,
    mut characters: Query<(&mut Transform, &mut CharacterController), With<IsoCharacter>>,
) {
    let dt = time.delta_secs();
    let camera_rotation = camera
        .single()
        .map(|transform| transform.rotation)
        .unwrap_or(Quat::IDENTITY);
    let settings = &config.character;

    let magnitude = joystick.vector.length().min(1.0);
    let direction = camera_relative_direction(joystick.vector, camera_rotation).normalize_or_zero();
    let speed = movement_speed(magnitude, settings);

    for (mut transform, mut controller) in &mut characters {
        controller.intent = magnitude;
        if magnitude <= 0.0 {
            controller.idle_time += dt;
            continue;
        }
        controller.idle_time = 0.0;

        let target = transform.translation + direction * speed * dt;
        transform.translation =
            grid.resolve_move(transform.translation, target - transform.translation, settings.radius);

        controller.facing = turn_towards(controller.facing, yaw_of(direction), settings.turn_rate * dt);
        transform.rotation = Quat::from_rotation_y(controller.facing);
    }
}

fn respawn_caught_character(
    mut caught: EventReader<PlayerCaught>,
    grid: Res<LevelGrid>,
    mut characters: Query<(&mut Transform, &mut CharacterController), With<IsoCharacter>>,
) {
    if caught.read().last().is_none() {
        return;
    }
    for (mut transform, mut controller) in &mut characters {
        transform.translation = grid.spawn_point();
        controller.idle_time = 0.0;
    }
}

fn update_locomotion(
    time: Res<Time>,
    config: Res<GameConfig>,
    mut characters: Query<(&CharacterController, &mut Locomotion)>,
) {
    let settings = &config.character;
    let step = settings.blend_rate * time.delta_secs();
    for (controller, mut locomotion) in &mut characters {
        let state = classify_locomotion(controller.intent, controller.idle_time, settings);
        if state != locomotion.state {
            debug!("locomotion {:?} -> {:?}", locomotion.state, state);
            locomotion.state = state;
        }
        locomotion.weights = blend_weights(locomotion.weights, state, step);
    }
}

fn apply_locomotion_weights(
    animations: Option<Res<CharacterAnimations>>,
    mut players: Query<(&mut AnimationPlayer, &AnimationOwner)>,
    locomotion: Query<&Locomotion>,
) {
    let Some(animations) = animations else {
        return;
    };
    for (mut player, owner) in &mut players {
        let Ok(locomotion) = locomotion.get(owner.0) else {
            continue;
        };
        for (&node, &weight) in animations.nodes.iter().zip(&locomotion.weights) {
            if let Some(active) = player.animation_mut(node) {
                active.set_weight(weight);
            }
        }
    }
}
