//! Gameplay tunables.
//!
//! Every number the gameplay systems read lives here so it can be tweaked from
//! a `config.json` or live from the inspector. Missing fields fall back to the
//! defaults below.

use bevy::prelude::*;
use serde::Deserialize;

#[derive(Resource, Reflect, Deserialize, Debug, Clone, PartialEq)]
#[reflect(Resource)]
#[serde(default)]
pub struct GameConfig {
    /// Asset path of the level description, relative to the asset root.
    pub level_path: String,
    /// glTF file holding the character mesh and its idle/walk/run/bored clips.
    pub character_model: Option<String>,
    pub joystick: JoystickConfig,
    pub character: CharacterConfig,
    pub camera: CameraConfig,
    pub enemy: EnemyConfig,
    pub items: ItemConfig,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            level_path: "levels/meadow.level.json".to_string(),
            character_model: Some("models/character.glb".to_string()),
            joystick: JoystickConfig::default(),
            character: CharacterConfig::default(),
            camera: CameraConfig::default(),
            enemy: EnemyConfig::default(),
            items: ItemConfig::default(),
        }
    }
}

#[derive(Reflect, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct JoystickConfig {
    /// Max knob travel in logical pixels.
    pub radius: f32,
    /// Fraction of `radius` treated as zero.
    pub dead_zone: f32,
    /// Magnitude reported for keyboard movement without Shift.
    pub keyboard_walk: f32,
}

impl Default for JoystickConfig {
    fn default() -> Self {
        Self {
            radius: 60.0,
            dead_zone: 0.15,
            keyboard_walk: 0.5,
        }
    }
}

#[derive(Reflect, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CharacterConfig {
    pub walk_speed: f32,
    pub run_speed: f32,
    /// Joystick magnitude at which walking turns into running.
    pub run_threshold: f32,
    /// Radians per second.
    pub turn_rate: f32,
    /// Seconds of idling before the bored clip takes over.
    pub bored_delay: f32,
    /// Weight change per second when cross-fading clips.
    pub blend_rate: f32,
    pub radius: f32,
}

impl Default for CharacterConfig {
    fn default() -> Self {
        Self {
            walk_speed: 2.0,
            run_speed: 5.0,
            run_threshold: 0.7,
            turn_rate: 10.0,
            bored_delay: 6.0,
            blend_rate: 5.0,
            radius: 0.3,
        }
    }
}

#[derive(Reflect, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    /// Per-frame lerp factor at 60 fps.
    pub lerp: f32,
    pub close_up: PresetConfig,
    pub isometric: PresetConfig,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            lerp: 0.1,
            close_up: PresetConfig {
                yaw_degrees: 45.0,
                pitch_degrees: 25.0,
                distance: 12.0,
                viewport_height: 6.0,
            },
            isometric: PresetConfig {
                yaw_degrees: 45.0,
                pitch_degrees: 35.264,
                distance: 20.0,
                viewport_height: 14.0,
            },
        }
    }
}

#[derive(Reflect, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(default)]
pub struct PresetConfig {
    pub yaw_degrees: f32,
    pub pitch_degrees: f32,
    pub distance: f32,
    pub viewport_height: f32,
}

#[derive(Reflect, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EnemyConfig {
    pub patrol_speed: f32,
    pub chase_speed: f32,
    pub vision_range: f32,
    pub vision_half_angle_degrees: f32,
    pub catch_radius: f32,
    pub search_duration: f32,
    /// Radians per second while scanning in place.
    pub scan_rate: f32,
    pub waypoint_tolerance: f32,
    pub radius: f32,
}

impl Default for EnemyConfig {
    fn default() -> Self {
        Self {
            patrol_speed: 1.5,
            chase_speed: 3.5,
            vision_range: 7.0,
            vision_half_angle_degrees: 50.0,
            catch_radius: 0.6,
            search_duration: 4.0,
            scan_rate: 1.5,
            waypoint_tolerance: 0.15,
            radius: 0.3,
        }
    }
}

#[derive(Reflect, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ItemConfig {
    pub pickup_radius: f32,
    pub float_amplitude: f32,
    pub float_frequency: f32,
    pub spin_rate: f32,
    pub glow_min: f32,
    pub glow_max: f32,
    pub glow_frequency: f32,
}

impl Default for ItemConfig {
    fn default() -> Self {
        Self {
            pickup_radius: 0.7,
            float_amplitude: 0.15,
            float_frequency: 2.5,
            spin_rate: 1.5,
            glow_min: 0.5,
            glow_max: 4.0,
            glow_frequency: 3.0,
        }
    }
}
