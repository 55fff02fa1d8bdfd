use bevy::prelude::*;
use bevy_egui::{EguiContexts, EguiPlugin, EguiPrimaryContextPass, egui};
use bevy_inspector_egui::quick::WorldInspectorPlugin;
use iso::camera::{CameraRig, TogglePreset};
use iso::character::{IsoCharacter, Locomotion};
use iso::config::GameConfig;
use iso::enemy::{Enemy, state_color};
use iso::input::JoystickInput;
use iso::items::Score;
use iso::level::LevelGrid;

pub struct DebugPlugin;

impl Plugin for DebugPlugin {
    fn build(&self, app: &mut App) {
        info!("adding debug plugin");
        app.add_plugins(EguiPlugin::default());
        app.add_plugins(WorldInspectorPlugin::default());

        app.init_resource::<DebugOverlay>();
        app.add_systems(EguiPrimaryContextPass, gameplay_panel);
        app.add_systems(Update, (draw_blocked_cells, draw_vision_cones));
    }
}

#[derive(Resource, Default)]
pub struct DebugOverlay {
    pub enabled: bool,
}

fn gameplay_panel(
    mut contexts: EguiContexts,
    joystick: Res<JoystickInput>,
    score: Res<Score>,
    mut overlay: ResMut<DebugOverlay>,
    characters: Query<&Locomotion, With<IsoCharacter>>,
    rigs: Query<&CameraRig>,
    enemies: Query<(&Name, &Enemy)>,
    mut toggles: EventWriter<TogglePreset>,
) -> Result {
    let ctx = contexts.ctx_mut()?;
    egui::Window::new("Gameplay").show(ctx, |ui| {
        ui.label(format!(
            "stick ({:.2}, {:.2}){}",
            joystick.vector.x,
            joystick.vector.y,
            if joystick.active { " touch" } else { "" }
        ));
        for locomotion in &characters {
            let [idle, walk, run, bored] = locomotion.weights;
            ui.label(format!(
                "{:?}  idle {idle:.2} walk {walk:.2} run {run:.2} bored {bored:.2}",
                locomotion.state
            ));
        }
        ui.label(format!(
            "score {}  collected {}  left {}",
            score.points, score.collected, score.remaining
        ));

        ui.separator();
        for rig in &rigs {
            ui.horizontal(|ui| {
                ui.label(format!("camera {:?}", rig.preset));
                if ui.button("toggle").clicked() {
                    toggles.write(TogglePreset);
                }
            });
        }
        ui.checkbox(&mut overlay.enabled, "collision + vision overlay");

        ui.separator();
        for (name, enemy) in &enemies {
            ui.label(format!("{name}: {:?}", enemy.state));
        }
    });
    Ok(())
}

fn draw_blocked_cells(overlay: Res<DebugOverlay>, grid: Option<Res<LevelGrid>>, mut gizmos: Gizmos) {
    let Some(grid) = grid.filter(|_| overlay.enabled) else {
        return;
    };
    let half = grid.tile_size() * 0.45;
    let color = Color::srgb(1.0, 0.2, 0.2);
    for y in 0..grid.height() {
        for x in 0..grid.width() {
            if grid.is_walkable_cell(x as i32, y as i32) {
                continue;
            }
            let center = grid.cell_center(UVec2::new(x, y)) + Vec3::Y * 0.05;
            gizmos.line(center + Vec3::new(-half, 0.0, -half), center + Vec3::new(half, 0.0, half), color);
            gizmos.line(center + Vec3::new(-half, 0.0, half), center + Vec3::new(half, 0.0, -half), color);
        }
    }
}

fn draw_vision_cones(
    overlay: Res<DebugOverlay>,
    config: Res<GameConfig>,
    enemies: Query<(&Enemy, &Transform)>,
    mut gizmos: Gizmos,
) {
    if !overlay.enabled {
        return;
    }
    const SEGMENTS: usize = 8;
    let range = config.enemy.vision_range;
    let half_angle = config.enemy.vision_half_angle_degrees.to_radians();
    for (enemy, transform) in &enemies {
        let origin = transform.translation + Vec3::Y * 0.1;
        let color = state_color(enemy.state);
        let edge = |yaw: f32| origin + Vec3::new(yaw.sin(), 0.0, yaw.cos()) * range;

        let points: Vec<Vec3> = (0..=SEGMENTS)
            .map(|i| enemy.facing - half_angle + 2.0 * half_angle * i as f32 / SEGMENTS as f32)
            .map(edge)
            .collect();
        gizmos.line(origin, points[0], color);
        gizmos.line(origin, points[SEGMENTS], color);
        gizmos.linestrip(points, color);
    }
}
