//! Guards that patrol a loop of waypoints, chase the player on sight, search
//! where they last saw them, and walk back to their route when they give up.

use bevy::prelude::*;

use crate::character::{IsoCharacter, turn_towards, yaw_of};
use crate::config::{EnemyConfig, GameConfig};
use crate::level::{LevelGrid, LevelObject, LoadedLevel};
use crate::{GameSet, GameState};

/// Radians per second guards turn toward where they are walking.
const ENEMY_TURN_RATE: f32 = 8.0;

pub struct EnemyPlugin;

impl Plugin for EnemyPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<PlayerCaught>();
        app.add_systems(OnEnter(GameState::Playing), spawn_enemies);
        app.add_systems(
            Update,
            (
                (run_enemies, catch_player).chain().in_set(GameSet::Ai),
                tint_enemies.in_set(GameSet::Presentation),
            )
                .run_if(in_state(GameState::Playing)),
        );

        app.register_type::<Enemy>();
    }
}

#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnemyState {
    #[default]
    Patrol,
    Chase,
    Search,
    Return,
}

#[derive(Component, Reflect, Debug, Clone, Default)]
#[require(Transform, Visibility)]
pub struct Enemy {
    pub state: EnemyState,
    /// World-space route, walked in order and looped.
    pub patrol: Vec<Vec3>,
    pub waypoint: usize,
    /// Where the guard stands when it has no route.
    pub home: Vec3,
    pub last_seen: Vec3,
    pub search_timer: f32,
    /// Yaw in radians; 0 faces +Z.
    pub facing: f32,
}

impl Enemy {
    pub fn new(home: Vec3, patrol: Vec<Vec3>) -> Self {
        Self {
            home,
            last_seen: home,
            patrol,
            ..default()
        }
    }

    fn route_target(&self) -> Vec3 {
        self.patrol.get(self.waypoint).copied().unwrap_or(self.home)
    }

    fn nearest_waypoint(&self, position: Vec3) -> usize {
        self.patrol
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                a.distance_squared(position)
                    .total_cmp(&b.distance_squared(position))
            })
            .map_or(0, |(i, _)| i)
    }
}

#[derive(Event, Debug, Clone, Copy)]
pub struct PlayerCaught {
    pub by: Entity,
}

/// What a guard knows this frame when choosing its next state.
#[derive(Debug, Clone, Copy, Default)]
pub struct Perception {
    pub sees_player: bool,
    pub search_elapsed: f32,
    pub search_duration: f32,
    pub reached_route: bool,
}

/// State transition for one frame. Seeing the player always wins.
pub fn decide(state: EnemyState, perception: Perception) -> EnemyState {
    if perception.sees_player {
        return EnemyState::Chase;
    }
    match state {
        EnemyState::Chase => EnemyState::Search,
        EnemyState::Search if perception.search_elapsed >= perception.search_duration => {
            EnemyState::Return
        }
        EnemyState::Return if perception.reached_route => EnemyState::Patrol,
        other => other,
    }
}

/// Whether a guard at `position` facing `facing` can see `target`: in range,
/// inside the view cone, and with no sight-blocking cell in between.
pub fn can_see(
    grid: &LevelGrid,
    position: Vec3,
    facing: f32,
    target: Vec3,
    config: &EnemyConfig,
) -> bool {
    let to_target = Vec2::new(target.x - position.x, target.z - position.z);
    let distance = to_target.length();
    if distance > config.vision_range {
        return false;
    }
    if distance > f32::EPSILON {
        let forward = Vec2::new(facing.sin(), facing.cos());
        let angle = forward.dot(to_target / distance).clamp(-1.0, 1.0).acos();
        if angle > config.vision_half_angle_degrees.to_radians() {
            return false;
        }
    }
    grid.line_of_sight(position, target)
}

/// Steps toward `target` by at most `max_distance`, with grid collision.
/// Returns the new position and whether `target` is within `tolerance` of it.
pub fn step_towards(
    grid: &LevelGrid,
    from: Vec3,
    target: Vec3,
    max_distance: f32,
    radius: f32,
    tolerance: f32,
) -> (Vec3, bool) {
    let flat_target = target.with_y(from.y);
    let offset = flat_target - from;
    let distance = offset.length();
    if distance <= tolerance {
        return (from, true);
    }
    let delta = offset / distance * max_distance.min(distance);
    let position = grid.resolve_move(from, delta, radius);
    (position, position.distance(flat_target) <= tolerance)
}

fn spawn_enemies(
    mut commands: Commands,
    level: Res<LoadedLevel>,
    grid: Res<LevelGrid>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let body = meshes.add(Capsule3d::new(0.3, 0.8));
    let eye = meshes.add(Cuboid::new(0.35, 0.1, 0.12));
    let eye_material = materials.add(StandardMaterial {
        base_color: Color::WHITE,
        emissive: LinearRgba::rgb(2.0, 2.0, 1.5),
        ..default()
    });

    let mut count = 0;
    for object in &level.0.objects {
        let LevelObject::Enemy { x, y, patrol } = object else {
            continue;
        };
        let home = grid.cell_center(UVec2::new(*x, *y));
        let route = patrol
            .iter()
            .map(|&[px, py]| grid.cell_center(UVec2::new(px, py)))
            .collect();
        commands
            .spawn((
                Name::new(format!("Guard {count}")),
                Enemy::new(home, route),
                Tint(EnemyState::Patrol),
                Transform::from_translation(home),
            ))
            .with_children(|parent| {
                parent.spawn((
                    Mesh3d(body.clone()),
                    MeshMaterial3d(materials.add(state_color(EnemyState::Patrol))),
                    Transform::from_xyz(0.0, 0.7, 0.0),
                ));
                parent.spawn((
                    Mesh3d(eye.clone()),
                    MeshMaterial3d(eye_material.clone()),
                    Transform::from_xyz(0.0, 1.1, 0.28),
                ));
            });
        count += 1;
    }
    info!("spawned {count} guards");
}

fn run_enemies(
    time: Res<Time>,
    config: Res<GameConfig>,
    grid: Res<LevelGrid>,
    player: Query<&Transform, (With<IsoCharacter>, Without<Enemy>)>,
    mut enemies: Query<(Entity, &mut Enemy, &mut Transform)>,
) {
    let dt = time.delta_secs();
    let settings = &config.enemy;
    let player = player.single().ok().map(|transform| transform.translation);

    for (entity, mut enemy, mut transform) in &mut enemies {
        let position = transform.translation;
        let sees_player =
            player.is_some_and(|target| can_see(&grid, position, enemy.facing, target, settings));
        if let (true, Some(target)) = (sees_player, player) {
            enemy.last_seen = target;
        }

        let reached_route =
            position.with_y(0.0).distance(enemy.route_target().with_y(0.0)) <= settings.waypoint_tolerance;
        let next = decide(
            enemy.state,
            Perception {
                sees_player,
                search_elapsed: enemy.search_timer,
                search_duration: settings.search_duration,
                reached_route,
            },
        );
        if next != enemy.state {
            debug!("guard {entity}: {:?} -> {:?}", enemy.state, next);
            match next {
                EnemyState::Search => enemy.search_timer = 0.0,
                EnemyState::Return => enemy.waypoint = enemy.nearest_waypoint(position),
                EnemyState::Patrol | EnemyState::Chase => {}
            }
            enemy.state = next;
        }

        let patrol_step = settings.patrol_speed * dt;
        let step = |target: Vec3, distance: f32| {
            step_towards(
                &grid,
                position,
                target,
                distance,
                settings.radius,
                settings.waypoint_tolerance,
            )
        };
        let (moved_to, scan) = match enemy.state {
            EnemyState::Patrol => {
                let (to, arrived) = step(enemy.route_target(), patrol_step);
                let looping = enemy.patrol.len() >= 2;
                if arrived && looping {
                    enemy.waypoint = (enemy.waypoint + 1) % enemy.patrol.len();
                }
                // Guards without a loop stand on their post and look around.
                (to, arrived && !looping)
            }
            EnemyState::Chase => match player {
                Some(target) => (step(target, settings.chase_speed * dt).0, false),
                None => (position, true),
            },
            EnemyState::Search => {
                enemy.search_timer += dt;
                step(enemy.last_seen, patrol_step)
            }
            EnemyState::Return => (step(enemy.route_target(), patrol_step).0, false),
        };

        let travelled = moved_to - position;
        if scan {
            enemy.facing += settings.scan_rate * dt;
        } else if travelled.length_squared() > f32::EPSILON {
            enemy.facing = turn_towards(enemy.facing, yaw_of(travelled), ENEMY_TURN_RATE * dt);
        }
        transform.translation = moved_to;
        transform.rotation = Quat::from_rotation_y(enemy.facing);
    }
}

fn catch_player(
    config: Res<GameConfig>,
    player: Query<&Transform, With<IsoCharacter>>,
    mut enemies: Query<(Entity, &mut Enemy, &Transform), Without<IsoCharacter>>,
    mut caught: EventWriter<PlayerCaught>,
) {
    let Ok(player) = player.single() else {
        return;
    };
    let radius = config.enemy.catch_radius;
    let catcher = enemies.iter().find_map(|(entity, _, transform)| {
        let offset = transform.translation - player.translation;
        (Vec2::new(offset.x, offset.z).length() <= radius).then_some(entity)
    });
    let Some(catcher) = catcher else {
        return;
    };

    info!("player caught by guard {catcher}");
    caught.write(PlayerCaught { by: catcher });
    for (_, mut enemy, transform) in &mut enemies {
        enemy.waypoint = enemy.nearest_waypoint(transform.translation);
        enemy.state = EnemyState::Return;
    }
}

pub fn state_color(state: EnemyState) -> Color {
    match state {
        EnemyState::Patrol => Color::srgb(0.55, 0.5, 0.6),
        EnemyState::Chase => Color::srgb(0.9, 0.15, 0.15),
        EnemyState::Search => Color::srgb(0.95, 0.75, 0.2),
        EnemyState::Return => Color::srgb(0.35, 0.5, 0.85),
    }
}

/// State the guard's body colour currently shows.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
struct Tint(EnemyState);

fn tint_enemies(
    mut enemies: Query<(&Enemy, &mut Tint, &Children), Changed<Enemy>>,
    bodies: Query<&MeshMaterial3d<StandardMaterial>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    for (enemy, mut tint, children) in &mut enemies {
        if tint.0 == enemy.state {
            continue;
        }
        tint.0 = enemy.state;
        // The body is always the first child.
        let Some(body) = children.first() else {
            continue;
        };
        let Ok(material) = bodies.get(*body) else {
            continue;
        };
        if let Some(material) = materials.get_mut(&material.0) {
            material.base_color = state_color(enemy.state);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bevy::time::TimeUpdateStrategy;

    use super::*;
    use crate::level::LevelDescription;

    fn corridor() -> LevelGrid {
        // 8x3 grid with a wall at (4, 1).
        let json = r#"{
            "grid": { "width": 8, "height": 3, "tile_size": 1.0 },
            "tiles": { "default": "grass" },
            "layers": [ { "name": "walls", "cells": [ { "x": 4, "y": 1, "tile": "wall" } ] } ]
        }"#;
        let description: LevelDescription = serde_json::from_str(json).unwrap();
        LevelGrid::build(&description).unwrap()
    }

    fn at(grid: &LevelGrid, x: u32, y: u32) -> Vec3 {
        grid.cell_center(UVec2::new(x, y))
    }

    #[test]
    fn sight_always_wins() {
        let seen = Perception {
            sees_player: true,
            ..default()
        };
        for state in [
            EnemyState::Patrol,
            EnemyState::Chase,
            EnemyState::Search,
            EnemyState::Return,
        ] {
            assert_eq!(decide(state, seen), EnemyState::Chase);
        }
    }

    #[test]
    fn losing_sight_walks_the_loop() {
        let mut perception = Perception {
            search_duration: 4.0,
            ..default()
        };
        assert_eq!(decide(EnemyState::Chase, perception), EnemyState::Search);

        perception.search_elapsed = 3.9;
        assert_eq!(decide(EnemyState::Search, perception), EnemyState::Search);
        perception.search_elapsed = 4.0;
        assert_eq!(decide(EnemyState::Search, perception), EnemyState::Return);

        assert_eq!(decide(EnemyState::Return, perception), EnemyState::Return);
        perception.reached_route = true;
        assert_eq!(decide(EnemyState::Return, perception), EnemyState::Patrol);
        assert_eq!(decide(EnemyState::Patrol, perception), EnemyState::Patrol);
    }

    #[test]
    fn vision_needs_range_cone_and_clear_line() {
        let grid = corridor();
        let config = EnemyConfig::default();
        let guard = at(&grid, 1, 1);
        let east = std::f32::consts::FRAC_PI_2;

        assert!(can_see(&grid, guard, east, at(&grid, 3, 1), &config));
        // Behind the guard.
        assert!(!can_see(&grid, guard, -east, at(&grid, 3, 1), &config));
        // Behind the wall.
        assert!(!can_see(&grid, guard, east, at(&grid, 6, 1), &config));

        let short = EnemyConfig {
            vision_range: 1.5,
            ..default()
        };
        assert!(!can_see(&grid, guard, east, at(&grid, 3, 1), &short));
        assert!(can_see(&grid, guard, 0.0, guard, &config));
    }

    #[test]
    fn step_towards_stops_at_target() {
        let grid = corridor();
        let from = at(&grid, 0, 0);
        let target = at(&grid, 2, 0);
        let (position, arrived) = step_towards(&grid, from, target, 0.5, 0.3, 0.1);
        assert!((position - (from + Vec3::X * 0.5)).length() < 1e-4);
        assert!(!arrived);

        let (position, arrived) = step_towards(&grid, from, target, 10.0, 0.3, 0.1);
        assert!((position - target).length() < 1e-4);
        assert!(arrived);
    }

    #[test]
    fn step_towards_respects_walls() {
        let grid = corridor();
        let from = at(&grid, 3, 1);
        let (position, _) = step_towards(&grid, from, at(&grid, 6, 1), 2.0, 0.3, 0.1);
        assert!(position.x <= 4.0 - 0.3 + 1e-4, "{position}");
    }

    #[test]
    fn nearest_waypoint_is_picked_for_return() {
        let enemy = Enemy::new(
            Vec3::ZERO,
            vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(5.0, 0.0, 0.0), Vec3::new(9.0, 0.0, 0.0)],
        );
        assert_eq!(enemy.nearest_waypoint(Vec3::new(6.0, 0.0, 1.0)), 1);
        assert_eq!(Enemy::new(Vec3::ONE, Vec::new()).route_target(), Vec3::ONE);
    }

    fn ai_app(grid: LevelGrid, config: GameConfig) -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_millis(100)));
        app.insert_resource(config);
        app.insert_resource(grid);
        app.add_event::<PlayerCaught>();
        app.add_systems(Update, (run_enemies, catch_player).chain());
        app
    }

    #[test]
    fn guard_runs_the_whole_loop() {
        let grid = corridor();
        let mut config = GameConfig::default();
        config.enemy.search_duration = 0.3;
        let home = at(&grid, 1, 0);
        let route = vec![at(&grid, 1, 0), at(&grid, 2, 0)];
        let player_at = at(&grid, 3, 0);
        let mut app = ai_app(grid, config);

        let guard = app
            .world_mut()
            .spawn((
                Enemy {
                    facing: std::f32::consts::FRAC_PI_2,
                    ..Enemy::new(home, route)
                },
                Transform::from_translation(home),
            ))
            .id();
        let player = app
            .world_mut()
            .spawn((IsoCharacter, Transform::from_translation(player_at)))
            .id();

        app.update();
        assert_eq!(app.world().get::<Enemy>(guard).unwrap().state, EnemyState::Chase);
        assert_eq!(app.world().get::<Enemy>(guard).unwrap().last_seen, player_at);

        app.world_mut().despawn(player);
        let mut states = vec![EnemyState::Chase];
        for _ in 0..30 {
            app.update();
            let state = app.world().get::<Enemy>(guard).unwrap().state;
            if states.last() != Some(&state) {
                states.push(state);
            }
        }
        assert_eq!(
            states,
            vec![
                EnemyState::Chase,
                EnemyState::Search,
                EnemyState::Return,
                EnemyState::Patrol
            ]
        );
    }

    #[test]
    fn touching_the_player_catches_them() {
        let grid = corridor();
        let home = at(&grid, 1, 0);
        let mut app = ai_app(grid, GameConfig::default());
        let guard = app
            .world_mut()
            .spawn((
                Enemy::new(home, vec![home]),
                Transform::from_translation(home),
            ))
            .id();
        app.world_mut().spawn((
            IsoCharacter,
            Transform::from_translation(home + Vec3::new(0.3, 0.0, 0.0)),
        ));

        app.update();
        let events = app.world().resource::<Events<PlayerCaught>>();
        let caught: Vec<_> = events.get_cursor().read(events).map(|e| e.by).collect();
        assert_eq!(caught, vec![guard]);
        assert_eq!(app.world().get::<Enemy>(guard).unwrap().state, EnemyState::Return);
    }

    #[test]
    fn body_is_recoloured_only_when_the_state_changes() {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.init_resource::<Assets<StandardMaterial>>();
        app.add_systems(Update, tint_enemies);

        let material = app
            .world_mut()
            .resource_mut::<Assets<StandardMaterial>>()
            .add(state_color(EnemyState::Patrol));
        let guard = app
            .world_mut()
            .spawn((Enemy::new(Vec3::ZERO, Vec::new()), Tint(EnemyState::Patrol)))
            .id();
        app.world_mut()
            .spawn((MeshMaterial3d(material.clone()), ChildOf(guard)));
        let color = |app: &App| {
            app.world()
                .resource::<Assets<StandardMaterial>>()
                .get(&material)
                .unwrap()
                .base_color
        };

        app.world_mut().get_mut::<Enemy>(guard).unwrap().state = EnemyState::Chase;
        app.update();
        assert_eq!(color(&app), state_color(EnemyState::Chase));
        assert_eq!(app.world().get::<Tint>(guard), Some(&Tint(EnemyState::Chase)));

        // Guards are written every frame; an unchanged state leaves the material alone.
        app.world_mut()
            .resource_mut::<Assets<StandardMaterial>>()
            .get_mut(&material)
            .unwrap()
            .base_color = Color::BLACK;
        app.world_mut().get_mut::<Enemy>(guard).unwrap().facing = 1.0;
        app.update();
        assert_eq!(color(&app), Color::BLACK);
    }
}
