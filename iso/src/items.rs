//! Collectible props: they bob, spin and glow until the player walks over them.

use std::f32::consts::TAU;

use bevy::prelude::*;
use serde::Deserialize;

use crate::character::IsoCharacter;
use crate::config::GameConfig;
use crate::level::{LevelGrid, LevelObject, LoadedLevel};
use crate::{GameSet, GameState};

/// Height of an item's resting point above the ground.
const ITEM_HEIGHT: f32 = 0.6;

pub struct ItemsPlugin;

impl Plugin for ItemsPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<ItemCollected>();
        app.add_event::<LevelComplete>();
        app.init_resource::<Score>();

        app.add_systems(OnEnter(GameState::Playing), (spawn_items, spawn_hud));
        app.add_systems(
            Update,
            (
                collect_items.in_set(GameSet::Items),
                check_level_complete.in_set(GameSet::Items).after(collect_items),
                (animate_items, update_hud).in_set(GameSet::Presentation),
            )
                .run_if(in_state(GameState::Playing)),
        );

        app.register_type::<Item>();
        app.register_type::<Score>();
    }
}

#[derive(Deserialize, Reflect, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Coin,
    Gem,
    Heart,
}

impl ItemKind {
    pub fn value(self) -> u32 {
        match self {
            ItemKind::Coin => 1,
            ItemKind::Gem => 5,
            ItemKind::Heart => 0,
        }
    }

    pub fn color(self) -> Color {
        match self {
            ItemKind::Coin => Color::srgb(1.0, 0.82, 0.2),
            ItemKind::Gem => Color::srgb(0.3, 0.9, 1.0),
            ItemKind::Heart => Color::srgb(1.0, 0.25, 0.35),
        }
    }

    fn mesh(self) -> Mesh {
        match self {
            ItemKind::Coin => Cylinder::new(0.25, 0.06).into(),
            ItemKind::Gem => Cuboid::from_length(0.3).into(),
            ItemKind::Heart => Sphere::new(0.2).into(),
        }
    }
}

#[derive(Component, Reflect, Debug, Clone)]
pub struct Item {
    pub kind: ItemKind,
    pub base_y: f32,
    /// Offsets the bob and glow so neighbouring items don't move in lockstep.
    pub phase: f32,
}

#[derive(Resource, Reflect, Default, Debug, Clone, PartialEq)]
#[reflect(Resource)]
pub struct Score {
    pub points: u32,
    pub collected: u32,
    pub remaining: u32,
    pub completed: bool,
}

#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct ItemCollected {
    pub kind: ItemKind,
    pub value: u32,
}

#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct LevelComplete {
    pub points: u32,
}

#[derive(Component)]
struct ScoreText;

/// Vertical offset of a floating item at time `t`.
pub fn float_offset(t: f32, amplitude: f32, frequency: f32, phase: f32) -> f32 {
    amplitude * (t * frequency + phase).sin()
}

/// Emissive strength of a glowing item at time `t`, between `min` and `max`.
pub fn glow_intensity(t: f32, min: f32, max: f32, frequency: f32, phase: f32) -> f32 {
    let wave = 0.5 + 0.5 * (t * frequency + phase).sin();
    min + (max - min) * wave
}

/// Pickup ignores height so a bobbing item is taken at any point of its cycle.
pub fn within_pickup(player: Vec3, item: Vec3, radius: f32) -> bool {
    Vec2::new(player.x - item.x, player.z - item.z).length_squared() <= radius * radius
}

fn spawn_items(
    mut commands: Commands,
    level: Res<LoadedLevel>,
    grid: Res<LevelGrid>,
    mut score: ResMut<Score>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    *score = Score::default();
    for (index, object) in level.0.objects.iter().enumerate() {
        let LevelObject::Item { x, y, kind } = *object else {
            continue;
        };
        let cell = UVec2::new(x, y);
        if !grid.is_walkable_cell(x as i32, y as i32) {
            warn!("{kind:?} at {cell} sits on a blocked cell and can never be picked up");
        }

        let color = kind.color();
        // Each item owns its material so the glow can pulse independently.
        let material = materials.add(StandardMaterial {
            base_color: color,
            emissive: color.to_linear(),
            metallic: 0.6,
            perceptual_roughness: 0.3,
            ..default()
        });
        let position = grid.cell_center(cell).with_y(ITEM_HEIGHT);
        commands
            .spawn((
                Name::new(format!("{kind:?} {index}")),
                Item {
                    kind,
                    base_y: ITEM_HEIGHT,
                    phase: index as f32 * 1.7 % TAU,
                },
                Mesh3d(meshes.add(kind.mesh())),
                MeshMaterial3d(material),
                Transform::from_translation(position),
            ))
            .with_child((
                PointLight {
                    color,
                    intensity: 20_000.0,
                    range: 2.5,
                    shadows_enabled: false,
                    ..default()
                },
                Transform::from_xyz(0.0, 0.3, 0.0),
            ));
        score.remaining += 1;
    }
    info!("spawned {} items", score.remaining);
}

fn animate_items(
    time: Res<Time>,
    config: Res<GameConfig>,
    mut items: Query<(&Item, &mut Transform, &MeshMaterial3d<StandardMaterial>)>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let t = time.elapsed_secs();
    let settings = &config.items;
    for (item, mut transform, material) in &mut items {
        transform.translation.y = item.base_y
            + float_offset(t, settings.float_amplitude, settings.float_frequency, item.phase);
        transform.rotate_y(settings.spin_rate * time.delta_secs());

        if let Some(material) = materials.get_mut(&material.0) {
            let glow = glow_intensity(
                t,
                settings.glow_min,
                settings.glow_max,
                settings.glow_frequency,
                item.phase,
            );
            material.emissive = item.kind.color().to_linear() * glow;
        }
    }
}

fn collect_items(
    mut commands: Commands,
    config: Res<GameConfig>,
    player: Query<&Transform, With<IsoCharacter>>,
    items: Query<(Entity, &Item, &Transform)>,
    mut score: ResMut<Score>,
    mut collected: EventWriter<ItemCollected>,
) {
    let Ok(player) = player.single() else {
        return;
    };
    for (entity, item, transform) in &items {
        if !within_pickup(player.translation, transform.translation, config.items.pickup_radius) {
            continue;
        }
        commands.entity(entity).despawn();
        let value = item.kind.value();
        score.points += value;
        score.collected += 1;
        score.remaining = score.remaining.saturating_sub(1);
        info!("picked up {:?} (+{value}), score {}", item.kind, score.points);
        collected.write(ItemCollected {
            kind: item.kind,
            value,
        });
    }
}

fn check_level_complete(mut score: ResMut<Score>, mut complete: EventWriter<LevelComplete>) {
    if score.completed || score.collected == 0 || score.remaining > 0 {
        return;
    }
    score.completed = true;
    info!("all items collected, final score {}", score.points);
    complete.write(LevelComplete {
        points: score.points,
    });
}

fn spawn_hud(mut commands: Commands) {
    commands.spawn((
        ScoreText,
        Text::new(""),
        TextFont {
            font_size: 22.0,
            ..default()
        },
        TextColor(Color::WHITE),
        Node {
            position_type: PositionType::Absolute,
            top: Val::Px(12.0),
            left: Val::Px(12.0),
            ..default()
        },
    ));
}

fn update_hud(score: Res<Score>, mut texts: Query<&mut Text, With<ScoreText>>) {
    if !score.is_changed() {
        return;
    }
    for mut text in &mut texts {
        text.0 = if score.completed {
            format!("score {}  level complete!", score.points)
        } else {
            format!("score {}  items left {}", score.points, score.remaining)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_per_kind() {
        assert_eq!(ItemKind::Coin.value(), 1);
        assert_eq!(ItemKind::Gem.value(), 5);
        assert_eq!(ItemKind::Heart.value(), 0);
    }

    #[test]
    fn kind_parses_lowercase() {
        let kind: ItemKind = serde_json::from_str("\"gem\"").unwrap();
        assert_eq!(kind, ItemKind::Gem);
        assert!(serde_json::from_str::<ItemKind>("\"Gem\"").is_err());
    }

    #[test]
    fn float_stays_within_amplitude() {
        for i in 0..100 {
            let offset = float_offset(i as f32 * 0.1, 0.15, 2.5, 0.7);
            assert!(offset.abs() <= 0.15 + 1e-6);
        }
        assert_eq!(float_offset(0.0, 0.15, 2.5, 0.0), 0.0);
    }

    #[test]
    fn glow_stays_in_range() {
        for i in 0..100 {
            let glow = glow_intensity(i as f32 * 0.05, 0.5, 4.0, 3.0, 1.0);
            assert!((0.5 - 1e-5..=4.0 + 1e-5).contains(&glow));
        }
        assert!((glow_intensity(0.0, 0.5, 4.0, 3.0, 0.0) - 2.25).abs() < 1e-5);
    }

    #[test]
    fn pickup_ignores_height() {
        let player = Vec3::new(1.0, 0.0, 1.0);
        assert!(within_pickup(player, Vec3::new(1.5, 3.0, 1.2), 0.7));
        assert!(!within_pickup(player, Vec3::new(1.6, 0.0, 1.5), 0.7));
    }

    fn app_with_items() -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.add_event::<ItemCollected>();
        app.add_event::<LevelComplete>();
        app.insert_resource(GameConfig::default());
        app.insert_resource(Score {
            remaining: 2,
            ..default()
        });
        app.add_systems(Update, (collect_items, check_level_complete).chain());
        app
    }

    fn spawn_item(app: &mut App, kind: ItemKind, at: Vec3) {
        app.world_mut().spawn((
            Item {
                kind,
                base_y: at.y,
                phase: 0.0,
            },
            Transform::from_translation(at),
        ));
    }

    #[test]
    fn walking_over_items_scores_and_completes() {
        let mut app = app_with_items();
        spawn_item(&mut app, ItemKind::Gem, Vec3::new(0.2, 0.6, 0.0));
        spawn_item(&mut app, ItemKind::Coin, Vec3::new(5.0, 0.6, 0.0));
        let player = app
            .world_mut()
            .spawn((IsoCharacter, Transform::default()))
            .id();

        app.update();
        let score = app.world().resource::<Score>().clone();
        assert_eq!(score.points, 5);
        assert_eq!(score.remaining, 1);
        assert!(!score.completed);

        app.world_mut().get_mut::<Transform>(player).unwrap().translation = Vec3::new(5.0, 0.0, 0.3);
        app.update();
        let score = app.world().resource::<Score>().clone();
        assert_eq!(score.points, 6);
        assert_eq!(score.collected, 2);
        assert!(score.completed);

        let events = app.world().resource::<Events<LevelComplete>>();
        let mut cursor = events.get_cursor();
        let complete: Vec<_> = cursor.read(events).copied().collect();
        assert_eq!(complete, vec![LevelComplete { points: 6 }]);
        let world = app.world_mut();
        let mut items = world.query::<&Item>();
        assert_eq!(items.iter(world).count(), 0);
    }

    #[test]
    fn nothing_collected_is_not_complete() {
        let mut app = app_with_items();
        app.world_mut().resource_mut::<Score>().remaining = 0;
        app.update();
        assert!(!app.world().resource::<Score>().completed);
    }
}
