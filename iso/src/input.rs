//! Virtual joystick. A touch (or left mouse drag) anywhere on screen anchors
//! the stick where the finger went down; dragging away from that point pushes
//! the stick. WASD and the arrow keys drive the same vector on desktop.

use bevy::input::touch::Touches;
use bevy::prelude::*;
use bevy::window::PrimaryWindow;

use crate::config::{GameConfig, JoystickConfig};
use crate::GameSet;

pub struct InputPlugin;

impl Plugin for InputPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<JoystickInput>();
        app.add_systems(Startup, spawn_joystick_ui);
        app.add_systems(
            Update,
            (
                read_joystick.in_set(GameSet::Input),
                draw_joystick.in_set(GameSet::Presentation),
            ),
        );
        app.register_type::<JoystickInput>();
    }
}

#[derive(Resource, Reflect, Default, Debug, Clone, PartialEq)]
#[reflect(Resource)]
pub struct JoystickInput {
    /// x right, y up; length at most 1.
    pub vector: Vec2,
    pub active: bool,
    /// Screen position where the current drag started.
    pub origin: Option<Vec2>,
    /// Knob offset from `origin` in screen pixels, clamped to the radius.
    pub knob: Vec2,
    pointer: Option<Pointer>,
}

#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
enum Pointer {
    Touch(u64),
    Mouse,
}

#[derive(Component)]
struct JoystickBase;

#[derive(Component)]
struct JoystickKnob;

const KNOB_SIZE: f32 = 44.0;

/// Clamps a screen-space drag to the stick radius. Screen y grows downward,
/// so the result is flipped to make up positive.
pub fn knob_offset(origin: Vec2, current: Vec2, radius: f32) -> Vec2 {
    let delta = Vec2::new(current.x - origin.x, origin.y - current.y);
    delta.clamp_length_max(radius)
}

/// Joystick output for a drag from `origin` to `current`. Inside the dead
/// zone the output is zero; beyond it the magnitude is rescaled so it starts
/// from zero at the dead-zone edge and reaches 1 at `radius`.
pub fn joystick_vector(origin: Vec2, current: Vec2, radius: f32, dead_zone: f32) -> Vec2 {
    if radius <= 0.0 {
        return Vec2::ZERO;
    }
    let normalized = knob_offset(origin, current, radius) / radius;
    let magnitude = normalized.length();
    if magnitude <= dead_zone || magnitude == 0.0 {
        return Vec2::ZERO;
    }
    let scaled = ((magnitude - dead_zone) / (1.0 - dead_zone)).clamp(0.0, 1.0);
    normalized / magnitude * scaled
}

/// Keyboard direction, unit length when any key is held, shortened to the
/// walk magnitude unless `run` is set.
pub fn keyboard_vector(up: bool, down: bool, left: bool, right: bool, run: bool, walk: f32) -> Vec2 {
    let raw = Vec2::new(
        (right as i32 - left as i32) as f32,
        (up as i32 - down as i32) as f32,
    );
    let direction = raw.normalize_or_zero();
    if run { direction } else { direction * walk }
}

fn pointer_state(
    joystick: &JoystickInput,
    touches: Option<&Touches>,
    mouse: Option<&ButtonInput<MouseButton>>,
    cursor: Option<Vec2>,
) -> Option<(Pointer, Vec2, Vec2)> {
    match joystick.pointer {
        Some(Pointer::Touch(id)) => {
            let touch = touches?.get_pressed(id)?;
            Some((Pointer::Touch(id), touch.start_position(), touch.position()))
        }
        Some(Pointer::Mouse) => {
            let origin = joystick.origin?;
            if !mouse?.pressed(MouseButton::Left) {
                return None;
            }
            // Off-window cursors hold the knob where it was last seen.
            let current = cursor.unwrap_or(origin + Vec2::new(joystick.knob.x, -joystick.knob.y));
            Some((Pointer::Mouse, origin, current))
        }
        None => {
            if let Some(touch) = touches.and_then(|t| t.iter_just_pressed().next()) {
                return Some((Pointer::Touch(touch.id()), touch.start_position(), touch.position()));
            }
            if mouse.is_some_and(|m| m.just_pressed(MouseButton::Left)) {
                return cursor.map(|current| (Pointer::Mouse, current, current));
            }
            None
        }
    }
}

fn read_joystick(
    config: Res<GameConfig>,
    keys: Option<Res<ButtonInput<KeyCode>>>,
    mouse: Option<Res<ButtonInput<MouseButton>>>,
    touches: Option<Res<Touches>>,
    windows: Query<&Window, With<PrimaryWindow>>,
    mut joystick: ResMut<JoystickInput>,
) {
    let JoystickConfig {
        radius,
        dead_zone,
        keyboard_walk,
    } = config.joystick;
    let cursor = windows.single().ok().and_then(Window::cursor_position);

    let next = match pointer_state(&joystick, touches.as_deref(), mouse.as_deref(), cursor) {
        Some((pointer, origin, current)) => JoystickInput {
            vector: joystick_vector(origin, current, radius, dead_zone),
            active: true,
            origin: Some(origin),
            knob: knob_offset(origin, current, radius),
            pointer: Some(pointer),
        },
        None => {
            let vector = keys.as_deref().map_or(Vec2::ZERO, |keys| {
                let held = |a, b| keys.any_pressed([a, b]);
                keyboard_vector(
                    held(KeyCode::KeyW, KeyCode::ArrowUp),
                    held(KeyCode::KeyS, KeyCode::ArrowDown),
                    held(KeyCode::KeyA, KeyCode::ArrowLeft),
                    held(KeyCode::KeyD, KeyCode::ArrowRight),
                    held(KeyCode::ShiftLeft, KeyCode::ShiftRight),
                    keyboard_walk,
                )
            });
            JoystickInput {
                vector,
                ..default()
            }
        }
    };
    joystick.set_if_neq(next);
}

fn spawn_joystick_ui(mut commands: Commands, config: Res<GameConfig>) {
    let size = config.joystick.radius * 2.0;
    commands
        .spawn((
            JoystickBase,
            Node {
                position_type: PositionType::Absolute,
                width: Val::Px(size),
                height: Val::Px(size),
                border: UiRect::all(Val::Px(3.0)),
                justify_content: JustifyContent::Center,
                align_items: AlignItems::Center,
                ..default()
            },
            BorderColor(Color::srgba(1.0, 1.0, 1.0, 0.6)),
            BorderRadius::MAX,
            BackgroundColor(Color::srgba(0.0, 0.0, 0.0, 0.2)),
            Visibility::Hidden,
        ))
        .with_child((
            JoystickKnob,
            Node {
                position_type: PositionType::Absolute,
                width: Val::Px(KNOB_SIZE),
                height: Val::Px(KNOB_SIZE),
                ..default()
            },
            BorderRadius::MAX,
            BackgroundColor(Color::srgba(1.0, 1.0, 1.0, 0.7)),
        ));
}

fn draw_joystick(
    joystick: Res<JoystickInput>,
    config: Res<GameConfig>,
    mut base: Query<(&mut Node, &mut Visibility), (With<JoystickBase>, Without<JoystickKnob>)>,
    mut knob: Query<&mut Node, (With<JoystickKnob>, Without<JoystickBase>)>,
) {
    if !joystick.is_changed() {
        return;
    }
    let radius = config.joystick.radius;
    let Ok((mut base_node, mut visibility)) = base.single_mut() else {
        return;
    };
    let Some(origin) = joystick.origin.filter(|_| joystick.active) else {
        *visibility = Visibility::Hidden;
        return;
    };
    *visibility = Visibility::Inherited;
    base_node.left = Val::Px(origin.x - radius);
    base_node.top = Val::Px(origin.y - radius);

    if let Ok(mut knob_node) = knob.single_mut() {
        // Node offsets are in screen space, so flip y back.
        let center = radius - KNOB_SIZE * 0.5;
        knob_node.left = Val::Px(center + joystick.knob.x);
        knob_node.top = Val::Px(center - joystick.knob.y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inside_dead_zone_is_zero() {
        let origin = Vec2::new(100.0, 100.0);
        assert_eq!(joystick_vector(origin, Vec2::new(105.0, 100.0), 60.0, 0.15), Vec2::ZERO);
        assert_eq!(joystick_vector(origin, origin, 60.0, 0.15), Vec2::ZERO);
    }

    #[test]
    fn screen_down_is_stick_down() {
        let origin = Vec2::new(100.0, 100.0);
        let v = joystick_vector(origin, Vec2::new(100.0, 200.0), 60.0, 0.15);
        assert!((v - Vec2::NEG_Y).length() < 1e-5, "{v}");
    }

    #[test]
    fn beyond_radius_is_clamped_to_one() {
        let origin = Vec2::ZERO;
        let v = joystick_vector(origin, Vec2::new(300.0, -400.0), 60.0, 0.15);
        assert!((v.length() - 1.0).abs() < 1e-5);
        assert!((v.normalize() - Vec2::new(0.6, 0.8)).length() < 1e-5);
    }

    #[test]
    fn magnitude_rescales_past_dead_zone() {
        let origin = Vec2::ZERO;
        // Halfway between the dead-zone edge (0.2) and the rim.
        let v = joystick_vector(origin, Vec2::new(60.0, 0.0), 100.0, 0.2);
        assert!((v.x - 0.5).abs() < 1e-5, "{v}");
        assert_eq!(v.y, 0.0);
    }

    #[test]
    fn knob_is_clamped_and_flipped() {
        let knob = knob_offset(Vec2::new(50.0, 50.0), Vec2::new(50.0, 0.0), 30.0);
        assert_eq!(knob, Vec2::new(0.0, 30.0));
    }

    #[test]
    fn keyboard_walks_unless_shift() {
        let walk = keyboard_vector(true, false, false, true, false, 0.5);
        assert!((walk.length() - 0.5).abs() < 1e-5);
        let run = keyboard_vector(true, false, false, false, true, 0.5);
        assert_eq!(run, Vec2::Y);
        assert_eq!(keyboard_vector(true, true, false, false, true, 0.5), Vec2::ZERO);
    }

    #[test]
    fn mouse_drag_survives_leaving_the_window() {
        let mut mouse = ButtonInput::<MouseButton>::default();
        mouse.press(MouseButton::Left);
        let origin = Vec2::new(200.0, 200.0);
        let dragging = JoystickInput {
            vector: joystick_vector(origin, Vec2::new(240.0, 200.0), 60.0, 0.15),
            active: true,
            origin: Some(origin),
            knob: knob_offset(origin, Vec2::new(240.0, 200.0), 60.0),
            pointer: Some(Pointer::Mouse),
        };

        let (pointer, held_origin, current) =
            pointer_state(&dragging, None, Some(&mouse), None).expect("drag still held");
        assert_eq!(pointer, Pointer::Mouse);
        assert_eq!(held_origin, origin);
        assert_eq!(current, Vec2::new(240.0, 200.0));

        mouse.release(MouseButton::Left);
        assert!(pointer_state(&dragging, None, Some(&mouse), None).is_none());
    }

    #[test]
    fn keyboard_drives_the_resource() {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.insert_resource(GameConfig::default());
        app.init_resource::<JoystickInput>();
        app.init_resource::<ButtonInput<KeyCode>>();
        app.add_systems(Update, read_joystick);

        app.world_mut()
            .resource_mut::<ButtonInput<KeyCode>>()
            .press(KeyCode::KeyD);
        app.update();
        let joystick = app.world().resource::<JoystickInput>().clone();
        assert!((joystick.vector - Vec2::new(0.5, 0.0)).length() < 1e-5);
        assert!(!joystick.active);

        app.world_mut()
            .resource_mut::<ButtonInput<KeyCode>>()
            .release(KeyCode::KeyD);
        app.update();
        assert_eq!(app.world().resource::<JoystickInput>().vector, Vec2::ZERO);
    }
}
