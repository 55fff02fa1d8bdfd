use bevy::log::{Level, LogPlugin};
use bevy::prelude::*;
use bevy::window::{Window, WindowPlugin, WindowResolution};
use iso::IsoPlugin;

pub mod config;

pub extern crate bevy;
pub extern crate iso;

pub mod prelude {
    pub use bevy;
    pub use bevy::prelude::*;
    pub use crate::iso;
    pub use crate::iso::prelude::*;
    pub use crate::IsoquestPlugin;
}

pub struct IsoquestPlugin;

impl Plugin for IsoquestPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(
            DefaultPlugins
                .set(WindowPlugin {
                    primary_window: Some(Window {
                        title: "isoquest".to_string(),
                        resolution: WindowResolution::new(640., 480.)
                            .with_scale_factor_override(1.),
                        ..default()
                    }),
                    ..default()
                })
                .set(LogPlugin {
                    level: Level::INFO,
                    filter: "wgpu=error,naga=warn".to_string(),
                    ..default()
                }),
        );

        // Loaded after DefaultPlugins so failures go through the log plugin.
        app.insert_resource(config::load_game_config());
        app.add_plugins(IsoPlugin);
    }
}
