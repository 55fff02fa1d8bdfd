use bevy::prelude::*;
use bevy::render::camera::ScalingMode;

use crate::character::IsoCharacter;
use crate::config::{CameraConfig, GameConfig, PresetConfig};
use crate::level::LevelGrid;
use crate::{GameSet, GameState};

/// Height above the followed character's feet that the camera aims at.
const TARGET_HEIGHT: f32 = 0.8;

pub struct CameraPlugin;

impl Plugin for CameraPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<TogglePreset>();
        app.add_systems(Startup, spawn_camera);
        app.add_systems(Update, handle_added_iso_cameras);
        app.add_systems(
            Update,
            (toggle_preset_key, apply_preset_toggle).chain().in_set(GameSet::Input),
        );
        app.add_systems(OnEnter(GameState::Playing), snap_to_level);
        app.add_systems(
            Update,
            follow_target
                .in_set(GameSet::Camera)
                .run_if(in_state(GameState::Playing)),
        );

        app.register_type::<IsoCamera>();
        app.register_type::<CameraRig>();
    }
}

#[derive(Component, Reflect, Default)]
pub struct IsoCamera;

#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraPreset {
    CloseUp,
    #[default]
    Isometric,
}

impl CameraPreset {
    pub fn toggled(self) -> Self {
        match self {
            CameraPreset::CloseUp => CameraPreset::Isometric,
            CameraPreset::Isometric => CameraPreset::CloseUp,
        }
    }

    pub fn settings(self, config: &CameraConfig) -> PresetConfig {
        match self {
            CameraPreset::CloseUp => config.close_up,
            CameraPreset::Isometric => config.isometric,
        }
    }
}

#[derive(Component, Reflect, Debug, Clone)]
pub struct CameraRig {
    pub preset: CameraPreset,
    /// Point the camera is currently looking at; trails the character.
    pub focus: Vec3,
}

impl Default for CameraRig {
    fn default() -> Self {
        Self {
            preset: CameraPreset::default(),
            focus: Vec3::ZERO,
        }
    }
}

/// Switches the camera between the close-up and isometric presets.
#[derive(Event, Debug, Clone, Copy, Default)]
pub struct TogglePreset;

/// Offset from the focus point to the camera for a preset.
pub fn preset_offset(preset: &PresetConfig) -> Vec3 {
    let yaw = preset.yaw_degrees.to_radians();
    let pitch = preset.pitch_degrees.to_radians();
    Vec3::new(
        pitch.cos() * yaw.sin(),
        pitch.sin(),
        pitch.cos() * yaw.cos(),
    ) * preset.distance
}

/// Per-frame lerp factor tuned at 60 fps, corrected for the actual frame time.
pub fn smoothing_factor(lerp: f32, dt: f32) -> f32 {
    1.0 - (1.0 - lerp.clamp(0.0, 1.0)).powf(dt * 60.0)
}

/// One smoothing step of the focus point toward `target`.
pub fn follow_step(current: Vec3, target: Vec3, lerp: f32, dt: f32) -> Vec3 {
    current.lerp(target, smoothing_factor(lerp, dt))
}

fn orthographic(viewport_height: f32) -> Projection {
    Projection::from(OrthographicProjection {
        scaling_mode: ScalingMode::FixedVertical { viewport_height },
        ..OrthographicProjection::default_3d()
    })
}

fn spawn_camera(mut commands: Commands) {
    commands.spawn((Name::new("Camera"), IsoCamera));
}

fn handle_added_iso_cameras(
    mut commands: Commands,
    added_iso_cameras: Query<Entity, Added<IsoCamera>>,
    config: Res<GameConfig>,
) {
    for cam_ent in &added_iso_cameras {
        let rig = CameraRig::default();
        let preset = rig.preset.settings(&config.camera);
        commands.entity(cam_ent).insert((
            Camera3d::default(),
            orthographic(preset.viewport_height),
            Transform::from_translation(preset_offset(&preset)).looking_at(Vec3::ZERO, Vec3::Y),
            rig,
        ));
    }
}

fn toggle_preset_key(keys: Option<Res<ButtonInput<KeyCode>>>, mut toggles: EventWriter<TogglePreset>) {
    if keys.is_some_and(|keys| keys.just_pressed(KeyCode::KeyC)) {
        toggles.write(TogglePreset);
    }
}

fn apply_preset_toggle(mut toggles: EventReader<TogglePreset>, mut rigs: Query<&mut CameraRig>) {
    // An even number of toggles in one frame cancels out.
    if toggles.read().count() % 2 == 0 {
        return;
    }
    for mut rig in &mut rigs {
        rig.preset = rig.preset.toggled();
        info!("camera preset {:?}", rig.preset);
    }
}

fn snap_to_level(
    grid: Res<LevelGrid>,
    config: Res<GameConfig>,
    mut cameras: Query<(&mut Transform, &mut CameraRig), With<IsoCamera>>,
) {
    let focus = grid.spawn_point() + Vec3::Y * TARGET_HEIGHT;
    for (mut transform, mut rig) in &mut cameras {
        rig.focus = focus;
        let preset = rig.preset.settings(&config.camera);
        *transform = Transform::from_translation(focus + preset_offset(&preset)).looking_at(focus, Vec3::Y);
    }
}

fn follow_target(
    time: Res<Time>,
    config: Res<GameConfig>,
    target: Query<&Transform, (With<IsoCharacter>, Without<IsoCamera>)>,
    mut cameras: Query<(&mut Transform, &mut CameraRig, &mut Projection), With<IsoCamera>>,
) {
    let Ok(target) = target.single() else {
        return;
    };
    let dt = time.delta_secs();
    let goal = target.translation + Vec3::Y * TARGET_HEIGHT;

    for (mut transform, mut rig, mut projection) in &mut cameras {
        let preset = rig.preset.settings(&config.camera);
        rig.focus = follow_step(rig.focus, goal, config.camera.lerp, dt);
        let desired = rig.focus + preset_offset(&preset);
        transform.translation = follow_step(transform.translation, desired, config.camera.lerp, dt);
        transform.look_at(rig.focus, Vec3::Y);

        if let Projection::Orthographic(ortho) = projection.as_mut() {
            if let ScalingMode::FixedVertical { viewport_height } = &mut ortho.scaling_mode {
                let t = smoothing_factor(config.camera.lerp, dt);
                *viewport_height += (preset.viewport_height - *viewport_height) * t;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isometric_offset_is_diagonal() {
        let config = CameraConfig::default();
        let offset = preset_offset(&config.isometric);
        assert!((offset.length() - config.isometric.distance).abs() < 1e-3);
        assert!((offset.x - offset.z).abs() < 1e-4);
        // True isometric: equal components on all three axes.
        assert!((offset.x - offset.y).abs() < 1e-2, "{offset}");
    }

    #[test]
    fn close_up_is_lower_and_tighter() {
        let config = CameraConfig::default();
        let close = preset_offset(&config.close_up);
        let iso = preset_offset(&config.isometric);
        assert!(close.y < iso.y);
        assert!(config.close_up.viewport_height < config.isometric.viewport_height);
    }

    #[test]
    fn smoothing_is_frame_rate_independent() {
        let one_frame = smoothing_factor(0.1, 1.0 / 60.0);
        assert!((one_frame - 0.1).abs() < 1e-5);

        // Two half-length frames land on the same point as one full frame.
        let start = Vec3::ZERO;
        let target = Vec3::new(10.0, 0.0, 0.0);
        let once = follow_step(start, target, 0.1, 1.0 / 30.0);
        let twice = follow_step(follow_step(start, target, 0.1, 1.0 / 60.0), target, 0.1, 1.0 / 60.0);
        assert!((once - twice).length() < 1e-4);
        assert_eq!(follow_step(start, target, 0.1, 0.0), start);
    }

    #[test]
    fn toggle_flips_preset() {
        assert_eq!(CameraPreset::Isometric.toggled(), CameraPreset::CloseUp);
        assert_eq!(CameraPreset::CloseUp.toggled().toggled(), CameraPreset::CloseUp);
    }

    #[test]
    fn toggle_event_switches_rig() {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.add_event::<TogglePreset>();
        app.add_systems(Update, apply_preset_toggle);
        let camera = app.world_mut().spawn(CameraRig::default()).id();

        app.world_mut().send_event(TogglePreset);
        app.update();
        assert_eq!(app.world().get::<CameraRig>(camera).unwrap().preset, CameraPreset::CloseUp);

        app.world_mut().send_event(TogglePreset);
        app.world_mut().send_event(TogglePreset);
        app.update();
        assert_eq!(app.world().get::<CameraRig>(camera).unwrap().preset, CameraPreset::CloseUp);
    }
}
