//! Tile levels: the JSON description, the resolved walkability grid, and the
//! systems that load a level and place its meshes.
//!
//! A level is a `width` x `height` grid of square cells, `tile_size` world
//! units wide. Cell `(x, y)` covers world `x * tile_size .. (x + 1) * tile_size`
//! on the X axis and the same range on Z; the grid's y axis runs along world Z.
//! Every cell has a ground tile (the default unless overridden) and may carry
//! extra tiles from named layers. A cell is walkable only if every tile on it
//! is walkable.

use std::collections::{BTreeMap, HashMap, HashSet};

use bevy::asset::LoadState;
use bevy::prelude::*;
use bevy_common_assets::json::JsonAssetPlugin;
use serde::Deserialize;

use crate::config::GameConfig;
use crate::error::LevelError;
use crate::items::ItemKind;
use crate::GameState;

/// Bottom face of every tile mesh. Tiles are drawn from here up to their `top`.
const FLOOR_BOTTOM: f32 = -0.2;

/// Largest grid a level may declare, in cells.
pub const MAX_LEVEL_CELLS: u32 = 1 << 20;

pub struct LevelPlugin;

impl Plugin for LevelPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(JsonAssetPlugin::<LevelDescription>::new(&["level.json"]));

        app.add_systems(OnEnter(GameState::Loading), start_level_load);
        app.add_systems(
            Update,
            poll_level_load.run_if(in_state(GameState::Loading)),
        );
        app.add_systems(OnEnter(GameState::Playing), spawn_level_scene);

        app.register_type::<LevelGrid>();
    }
}

#[derive(Asset, TypePath, Deserialize, Debug, Clone, PartialEq)]
pub struct LevelDescription {
    #[serde(default)]
    pub name: String,
    pub grid: GridSpec,
    pub tiles: TileSpec,
    /// Extra tile types, or overrides of the built-in ones.
    #[serde(default)]
    pub tile_types: BTreeMap<String, TileType>,
    #[serde(default)]
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub objects: Vec<LevelObject>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    pub width: u32,
    pub height: u32,
    pub tile_size: f32,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct TileSpec {
    pub default: String,
    #[serde(default)]
    pub overrides: Vec<CellTile>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct CellTile {
    pub x: u32,
    pub y: u32,
    pub tile: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Layer {
    pub name: String,
    #[serde(default)]
    pub elevation: f32,
    #[serde(default)]
    pub cells: Vec<CellTile>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LevelObject {
    Spawn {
        x: u32,
        y: u32,
    },
    Item {
        x: u32,
        y: u32,
        kind: ItemKind,
    },
    Enemy {
        x: u32,
        y: u32,
        #[serde(default)]
        patrol: Vec<[u32; 2]>,
    },
}

impl LevelObject {
    pub fn cell(&self) -> UVec2 {
        match *self {
            LevelObject::Spawn { x, y }
            | LevelObject::Item { x, y, .. }
            | LevelObject::Enemy { x, y, .. } => UVec2::new(x, y),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TileType {
    /// sRGB colour of the placeholder block.
    pub color: [f32; 3],
    /// World y of the tile's upper face.
    pub top: f32,
    pub walkable: bool,
    pub blocks_sight: bool,
    /// glTF scene drawn instead of the placeholder block.
    pub model: Option<String>,
    pub scale: f32,
}

impl Default for TileType {
    fn default() -> Self {
        Self {
            color: [0.5, 0.5, 0.5],
            top: 0.0,
            walkable: true,
            blocks_sight: false,
            model: None,
            scale: 1.0,
        }
    }
}

impl TileType {
    fn solid(color: [f32; 3], top: f32) -> Self {
        Self {
            color,
            top,
            walkable: false,
            blocks_sight: true,
            ..default()
        }
    }
}

pub fn builtin_tile_types() -> BTreeMap<String, TileType> {
    let floor = |color| TileType { color, ..default() };
    BTreeMap::from([
        ("grass".to_string(), floor([0.36, 0.62, 0.29])),
        ("dirt".to_string(), floor([0.55, 0.42, 0.28])),
        ("stone".to_string(), floor([0.62, 0.62, 0.6])),
        (
            "water".to_string(),
            TileType {
                color: [0.2, 0.45, 0.8],
                top: -0.1,
                walkable: false,
                ..default()
            },
        ),
        ("wall".to_string(), TileType::solid([0.45, 0.43, 0.4], 1.5)),
        ("tree".to_string(), TileType::solid([0.16, 0.38, 0.18], 2.0)),
    ])
}

impl LevelDescription {
    /// Built-in tile types with this level's `tile_types` merged over them.
    pub fn tile_catalog(&self) -> BTreeMap<String, TileType> {
        let mut catalog = builtin_tile_types();
        catalog.extend(self.tile_types.clone());
        catalog
    }

    pub fn validate(&self) -> Result<(), LevelError> {
        let GridSpec {
            width,
            height,
            tile_size,
        } = self.grid;
        if width == 0 || height == 0 {
            return Err(LevelError::EmptyGrid { width, height });
        }
        if width
            .checked_mul(height)
            .is_none_or(|cells| cells > MAX_LEVEL_CELLS)
        {
            return Err(LevelError::TooLarge {
                width,
                height,
                max: MAX_LEVEL_CELLS,
            });
        }
        if !(tile_size > 0.0) {
            return Err(LevelError::InvalidTileSize(tile_size));
        }

        let catalog = self.tile_catalog();
        let known = |context: &str, tile: &str| {
            if catalog.contains_key(tile) {
                Ok(())
            } else {
                Err(LevelError::UnknownTile {
                    context: context.to_string(),
                    tile: tile.to_string(),
                })
            }
        };
        let in_bounds = |context: &str, x: u32, y: u32| {
            if x < width && y < height {
                Ok(())
            } else {
                Err(LevelError::OutOfBounds {
                    context: context.to_string(),
                    x,
                    y,
                    width,
                    height,
                })
            }
        };

        known("default tile", &self.tiles.default)?;
        for cell in &self.tiles.overrides {
            in_bounds("tile override", cell.x, cell.y)?;
            known("tile override", &cell.tile)?;
        }

        let mut names = HashSet::new();
        for layer in &self.layers {
            if !names.insert(layer.name.as_str()) {
                return Err(LevelError::DuplicateLayer(layer.name.clone()));
            }
            let context = format!("layer '{}'", layer.name);
            for cell in &layer.cells {
                in_bounds(&context, cell.x, cell.y)?;
                known(&context, &cell.tile)?;
            }
        }

        for object in &self.objects {
            let cell = object.cell();
            in_bounds("object", cell.x, cell.y)?;
            if let LevelObject::Enemy { patrol, .. } = object {
                for &[x, y] in patrol {
                    in_bounds("patrol waypoint", x, y)?;
                }
            }
        }
        Ok(())
    }

    /// Level used when the configured one cannot be loaded: a walled meadow
    /// with a pond, a few coins and one patrolling guard.
    pub fn fallback() -> Self {
        let size = 12;
        let mut walls = Vec::new();
        for i in 0..size {
            for (x, y) in [(i, 0), (i, size - 1), (0, i), (size - 1, i)] {
                walls.push(CellTile {
                    x,
                    y,
                    tile: "wall".to_string(),
                });
            }
        }
        let water = [(7, 3), (8, 3), (7, 4), (8, 4)]
            .into_iter()
            .map(|(x, y)| CellTile {
                x,
                y,
                tile: "water".to_string(),
            })
            .collect();
        let mut objects = vec![LevelObject::Spawn { x: 2, y: 2 }];
        objects.extend([(4, 6), (6, 9), (9, 8), (3, 9)].map(|(x, y)| LevelObject::Item {
            x,
            y,
            kind: ItemKind::Coin,
        }));
        objects.push(LevelObject::Enemy {
            x: 9,
            y: 6,
            patrol: vec![[9, 6], [9, 9], [5, 9], [5, 6]],
        });

        Self {
            name: "fallback meadow".to_string(),
            grid: GridSpec {
                width: size,
                height: size,
                tile_size: 1.0,
            },
            tiles: TileSpec {
                default: "grass".to_string(),
                overrides: water,
            },
            tile_types: BTreeMap::new(),
            layers: vec![Layer {
                name: "walls".to_string(),
                elevation: 0.0,
                cells: walls,
            }],
            objects,
        }
    }
}

/// Ground tile names with overrides applied. Later overrides win.
#[derive(Debug, Clone)]
pub struct TileGrid {
    width: u32,
    height: u32,
    tiles: Vec<String>,
}

impl TileGrid {
    pub fn resolve(description: &LevelDescription) -> Self {
        let GridSpec { width, height, .. } = description.grid;
        let mut tiles = vec![description.tiles.default.clone(); (width * height) as usize];
        for cell in &description.tiles.overrides {
            if cell.x < width && cell.y < height {
                tiles[(cell.y * width + cell.x) as usize] = cell.tile.clone();
            }
        }
        Self {
            width,
            height,
            tiles,
        }
    }

    pub fn get(&self, x: u32, y: u32) -> Option<&str> {
        if x < self.width && y < self.height {
            Some(&self.tiles[(y * self.width + x) as usize])
        } else {
            None
        }
    }
}

/// Collision and visibility lookup derived from a [`LevelDescription`].
#[derive(Resource, Reflect, Debug, Clone)]
#[reflect(Resource)]
pub struct LevelGrid {
    width: u32,
    height: u32,
    tile_size: f32,
    walkable: Vec<bool>,
    opaque: Vec<bool>,
    spawn: UVec2,
}

impl LevelGrid {
    pub fn build(description: &LevelDescription) -> Result<Self, LevelError> {
        description.validate()?;
        let GridSpec {
            width,
            height,
            tile_size,
        } = description.grid;
        let catalog = description.tile_catalog();
        let ground = TileGrid::resolve(description);

        let len = (width * height) as usize;
        let mut walkable = vec![true; len];
        let mut opaque = vec![false; len];
        let mut mark = |x: u32, y: u32, name: &str| {
            let index = (y * width + x) as usize;
            if let Some(tile) = catalog.get(name) {
                walkable[index] &= tile.walkable;
                opaque[index] |= tile.blocks_sight;
            }
        };
        for y in 0..height {
            for x in 0..width {
                if let Some(name) = ground.get(x, y) {
                    mark(x, y, name);
                }
            }
        }
        for layer in &description.layers {
            for cell in &layer.cells {
                mark(cell.x, cell.y, &cell.tile);
            }
        }

        // Movers must start on open ground and items must be reachable.
        let open = |context: &str, x: u32, y: u32| {
            if walkable[(y * width + x) as usize] {
                Ok(())
            } else {
                Err(LevelError::BlockedCell {
                    context: context.to_string(),
                    x,
                    y,
                })
            }
        };
        for object in &description.objects {
            match object {
                LevelObject::Spawn { x, y } => open("spawn", *x, *y)?,
                LevelObject::Enemy { x, y, patrol } => {
                    open("enemy", *x, *y)?;
                    for &[px, py] in patrol {
                        open("patrol waypoint", px, py)?;
                    }
                }
                LevelObject::Item { x, y, .. } => open("item", *x, *y)?,
            }
        }

        let explicit_spawn = description.objects.iter().find_map(|object| match object {
            LevelObject::Spawn { x, y } => Some(UVec2::new(*x, *y)),
            _ => None,
        });
        let spawn = match explicit_spawn {
            Some(spawn) => spawn,
            None => {
                let index = walkable
                    .iter()
                    .position(|&w| w)
                    .ok_or(LevelError::MissingSpawn)?;
                UVec2::new(index as u32 % width, index as u32 / width)
            }
        };

        Ok(Self {
            width,
            height,
            tile_size,
            walkable,
            opaque,
            spawn,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn tile_size(&self) -> f32 {
        self.tile_size
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            None
        } else {
            Some((y as u32 * self.width + x as u32) as usize)
        }
    }

    /// World position of the centre of a cell, on the ground plane.
    pub fn cell_center(&self, cell: UVec2) -> Vec3 {
        Vec3::new(
            (cell.x as f32 + 0.5) * self.tile_size,
            0.0,
            (cell.y as f32 + 0.5) * self.tile_size,
        )
    }

    fn cell_coords(&self, position: Vec3) -> IVec2 {
        IVec2::new(
            (position.x / self.tile_size).floor() as i32,
            (position.z / self.tile_size).floor() as i32,
        )
    }

    pub fn world_to_cell(&self, position: Vec3) -> Option<UVec2> {
        let cell = self.cell_coords(position);
        self.index(cell.x, cell.y).map(|_| cell.as_uvec2())
    }

    pub fn is_walkable_cell(&self, x: i32, y: i32) -> bool {
        self.index(x, y).is_some_and(|i| self.walkable[i])
    }

    pub fn blocks_sight_cell(&self, x: i32, y: i32) -> bool {
        self.index(x, y).is_none_or(|i| self.opaque[i])
    }

    pub fn is_walkable(&self, position: Vec3) -> bool {
        let cell = self.cell_coords(position);
        self.is_walkable_cell(cell.x, cell.y)
    }

    /// Whether a circle of `radius` around `position` fits on walkable cells.
    /// Checks the centre and the four corners of the bounding square.
    pub fn is_walkable_area(&self, position: Vec3, radius: f32) -> bool {
        [
            Vec3::ZERO,
            Vec3::new(radius, 0.0, radius),
            Vec3::new(radius, 0.0, -radius),
            Vec3::new(-radius, 0.0, radius),
            Vec3::new(-radius, 0.0, -radius),
        ]
        .into_iter()
        .all(|offset| self.is_walkable(position + offset))
    }

    /// Moves `from` by the horizontal part of `delta`, sliding along blocked
    /// cells one axis at a time. Long moves are split into sub-steps no longer
    /// than half a tile so they cannot skip over a blocked cell.
    pub fn resolve_move(&self, from: Vec3, delta: Vec3, radius: f32) -> Vec3 {
        let horizontal = Vec3::new(delta.x, 0.0, delta.z);
        let steps = (horizontal.length() / (self.tile_size * 0.5)).ceil().max(1.0) as u32;
        let step = horizontal / steps as f32;

        let mut position = from;
        for _ in 0..steps {
            let along_x = position + Vec3::new(step.x, 0.0, 0.0);
            if self.is_walkable_area(along_x, radius) {
                position = along_x;
            }
            let along_z = position + Vec3::new(0.0, 0.0, step.z);
            if self.is_walkable_area(along_z, radius) {
                position = along_z;
            }
        }
        position
    }

    /// Grid raycast from `from` to `to`. False as soon as the ray crosses a
    /// cell that blocks sight or leaves the grid.
    pub fn line_of_sight(&self, from: Vec3, to: Vec3) -> bool {
        let start = Vec2::new(from.x, from.z) / self.tile_size;
        let end = Vec2::new(to.x, to.z) / self.tile_size;
        let mut cell = start.floor().as_ivec2();
        let target = end.floor().as_ivec2();
        let dir = end - start;

        let step = IVec2::new(dir.x.signum() as i32, dir.y.signum() as i32);
        let t_delta = Vec2::new(
            if dir.x != 0.0 { (1.0 / dir.x).abs() } else { f32::INFINITY },
            if dir.y != 0.0 { (1.0 / dir.y).abs() } else { f32::INFINITY },
        );
        let boundary = |origin: f32, cell: i32, d: f32| {
            if d > 0.0 {
                (cell as f32 + 1.0 - origin) / d
            } else if d < 0.0 {
                (origin - cell as f32) / -d
            } else {
                f32::INFINITY
            }
        };
        let mut t_max = Vec2::new(
            boundary(start.x, cell.x, dir.x),
            boundary(start.y, cell.y, dir.y),
        );

        let cells = (target - cell).abs().element_sum() + 1;
        for _ in 0..cells {
            if self.blocks_sight_cell(cell.x, cell.y) {
                return false;
            }
            if cell == target {
                return true;
            }
            if t_max.x < t_max.y {
                cell.x += step.x;
                t_max.x += t_delta.x;
            } else {
                cell.y += step.y;
                t_max.y += t_delta.y;
            }
        }
        true
    }

    pub fn spawn_cell(&self) -> UVec2 {
        self.spawn
    }

    pub fn spawn_point(&self) -> Vec3 {
        self.cell_center(self.spawn)
    }

    /// World position of the middle of the grid.
    pub fn center(&self) -> Vec3 {
        Vec3::new(
            self.width as f32 * self.tile_size * 0.5,
            0.0,
            self.height as f32 * self.tile_size * 0.5,
        )
    }
}

/// The description the current [`LevelGrid`] was built from.
#[derive(Resource, Debug, Clone)]
pub struct LoadedLevel(pub LevelDescription);

#[derive(Resource)]
struct LevelHandle {
    path: String,
    handle: Handle<LevelDescription>,
}

/// Marker for meshes and lights placed by the level loader.
#[derive(Component, Default, Reflect)]
pub struct LevelTile;

fn start_level_load(
    mut commands: Commands,
    asset_server: Res<AssetServer>,
    config: Res<GameConfig>,
) {
    info!("loading level '{}'", config.level_path);
    commands.insert_resource(LevelHandle {
        path: config.level_path.clone(),
        handle: asset_server.load(config.level_path.clone()),
    });
}

fn poll_level_load(
    mut commands: Commands,
    asset_server: Res<AssetServer>,
    level_handle: Res<LevelHandle>,
    levels: Res<Assets<LevelDescription>>,
    mut next_state: ResMut<NextState<GameState>>,
) -> Result {
    let loaded = match asset_server.load_state(&level_handle.handle) {
        LoadState::Loaded => match levels.get(&level_handle.handle) {
            Some(description) => Ok(description.clone()),
            None => return Ok(()),
        },
        LoadState::Failed(err) => Err(LevelError::Load(err.to_string())),
        LoadState::NotLoaded | LoadState::Loading => return Ok(()),
    };

    let (description, grid) = settle_level(&level_handle.path, loaded)?;
    info!(
        "level '{}' ready: {}x{} cells, {} objects",
        description.name,
        grid.width(),
        grid.height(),
        description.objects.len()
    );
    commands.insert_resource(grid);
    commands.insert_resource(LoadedLevel(description));
    commands.remove_resource::<LevelHandle>();
    next_state.set(GameState::Playing);
    Ok(())
}

/// Builds the grid for a loaded level, or for the built-in level when the
/// load failed or the description does not validate.
fn settle_level(
    path: &str,
    loaded: Result<LevelDescription, LevelError>,
) -> Result<(LevelDescription, LevelGrid), LevelError> {
    match loaded.and_then(|d| LevelGrid::build(&d).map(|g| (d, g))) {
        Ok(built) => Ok(built),
        Err(err) => {
            error!("level '{path}' unusable: {err}; falling back to the built-in level");
            let description = LevelDescription::fallback();
            let grid = LevelGrid::build(&description)?;
            Ok((description, grid))
        }
    }
}

fn spawn_level_scene(
    mut commands: Commands,
    level: Res<LoadedLevel>,
    grid: Res<LevelGrid>,
    asset_server: Res<AssetServer>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let description = &level.0;
    let catalog = description.tile_catalog();
    let ground = TileGrid::resolve(description);
    let tile_size = grid.tile_size();

    let mut material_cache: HashMap<String, Handle<StandardMaterial>> = HashMap::new();
    let mut mesh_cache: HashMap<(String, u32), Handle<Mesh>> = HashMap::new();

    let mut place = |name: &str, cell: UVec2, base: f32| {
        let Some((key, tile)) = catalog.get_key_value(name) else {
            warn!("no tile type '{name}' at {cell}");
            return;
        };
        let center = grid.cell_center(cell);

        if let Some(model) = &tile.model {
            let scene = asset_server.load(GltfAssetLabel::Scene(0).from_asset(model.clone()));
            commands.spawn((
                LevelTile,
                SceneRoot(scene),
                Transform::from_translation(center + Vec3::Y * base)
                    .with_scale(Vec3::splat(tile.scale)),
            ));
            return;
        }

        let bottom = if base == 0.0 { FLOOR_BOTTOM } else { base };
        let top = (base + tile.top).max(bottom + 0.05);
        let thickness = top - bottom;
        let mesh = mesh_cache
            .entry((key.clone(), thickness.to_bits()))
            .or_insert_with(|| meshes.add(Cuboid::new(tile_size, thickness, tile_size)))
            .clone();
        let material = material_cache
            .entry(key.clone())
            .or_insert_with(|| {
                let [r, g, b] = tile.color;
                materials.add(StandardMaterial {
                    base_color: Color::srgb(r, g, b),
                    perceptual_roughness: 0.9,
                    ..default()
                })
            })
            .clone();
        commands.spawn((
            LevelTile,
            Mesh3d(mesh),
            MeshMaterial3d(material),
            Transform::from_translation(center.with_y(bottom + thickness * 0.5)),
        ));
    };

    for y in 0..grid.height() {
        for x in 0..grid.width() {
            if let Some(name) = ground.get(x, y) {
                place(name, UVec2::new(x, y), 0.0);
            }
        }
    }
    for layer in &description.layers {
        for cell in &layer.cells {
            place(&cell.tile, UVec2::new(cell.x, cell.y), layer.elevation);
        }
    }

    commands.insert_resource(AmbientLight {
        color: Color::WHITE,
        brightness: 300.0,
        ..default()
    });
    commands.spawn((
        LevelTile,
        DirectionalLight {
            illuminance: 8_000.0,
            shadows_enabled: true,
            ..default()
        },
        Transform::from_translation(grid.center() + Vec3::new(-4.0, 10.0, 6.0))
            .looking_at(grid.center(), Vec3::Y),
    ));
}
