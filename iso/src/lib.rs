use bevy::prelude::*;

pub mod camera;
pub mod character;
pub mod config;
pub mod enemy;
pub mod error;
pub mod input;
pub mod items;
pub mod level;

pub mod prelude {
    pub use crate::camera::{CameraPreset, CameraRig, IsoCamera, TogglePreset};
    pub use crate::character::{CharacterController, IsoCharacter, Locomotion, LocomotionState};
    pub use crate::config::GameConfig;
    pub use crate::enemy::{Enemy, EnemyState, PlayerCaught};
    pub use crate::error::LevelError;
    pub use crate::input::JoystickInput;
    pub use crate::items::{Item, ItemCollected, ItemKind, LevelComplete, Score};
    pub use crate::level::{LevelDescription, LevelGrid, LoadedLevel};
    pub use crate::{GameSet, GameState, IsoPlugin};
}

/// Top-level flow: wait for the level asset, then play.
#[derive(States, Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Reflect)]
pub enum GameState {
    #[default]
    Loading,
    Playing,
}

/// Per-frame ordering of the gameplay systems.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameSet {
    Input,
    Movement,
    Ai,
    Items,
    Camera,
    Presentation,
}

pub struct IsoPlugin;

impl Plugin for IsoPlugin {
    fn build(&self, app: &mut App) {
        app.init_state::<GameState>();
        app.init_resource::<config::GameConfig>();
        app.configure_sets(
            Update,
            (
                GameSet::Input,
                GameSet::Movement,
                GameSet::Ai,
                GameSet::Items,
                GameSet::Camera,
                GameSet::Presentation,
            )
                .chain(),
        );

        app.add_plugins((
            level::LevelPlugin,
            input::InputPlugin,
            camera::CameraPlugin,
            character::CharacterPlugin,
            enemy::EnemyPlugin,
            items::ItemsPlugin,
        ));

        app.register_type::<config::GameConfig>();
        app.register_type::<GameState>();
    }
}
