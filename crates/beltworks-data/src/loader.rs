//! Resolution pipeline: reads data files, resolves cross-references, builds registry.
//!
//! Provides format detection (RON/JSON/TOML), file discovery, and deserialization
//! helpers, plus [`load_prototypes`], which turns a data directory into a
//! validated [`Prototypes`] registry.

use crate::schema::*;
use beltworks_core::chunk::TileLayer;
use beltworks_core::fixed::f64_to_fixed64;
use beltworks_core::id::PrototypeId;
use beltworks_core::prototype::*;
use log::{debug, info};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// A required data file was not found in the given directory.
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: &'static str, dir: PathBuf },

    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A name reference could not be resolved.
    #[error("unresolved {expected_kind} reference '{name}' in {file}")]
    UnresolvedRef {
        file: PathBuf,
        name: String,
        expected_kind: &'static str,
    },

    /// A duplicate name was found.
    #[error("duplicate name '{name}' in {file}")]
    DuplicateName { file: PathBuf, name: String },

    /// The resolved prototypes failed post-load validation.
    #[error(transparent)]
    Prototype(#[from] PrototypeError),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Scan a directory for a data file with the given base name (without extension).
///
/// Looks for `{base_name}.ron`, `{base_name}.toml`, and `{base_name}.json`.
/// Returns `Ok(None)` if no file is found, or `Err(ConflictingFormats)` if
/// multiple formats exist for the same base name.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found: Option<PathBuf> = None;

    for ext in ["ron", "toml", "json"] {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if candidate.exists() {
            if let Some(existing) = found {
                return Err(DataLoadError::ConflictingFormats {
                    a: existing,
                    b: candidate,
                });
            }
            found = Some(candidate);
        }
    }

    Ok(found)
}

/// Like [`find_data_file`], but returns an error if no file is found.
pub fn require_data_file(dir: &Path, base_name: &'static str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, base_name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base_name,
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Deserialization
// ===========================================================================

fn parse_error(path: &Path, detail: impl ToString) -> DataLoadError {
    DataLoadError::Parse {
        file: path.to_path_buf(),
        detail: detail.to_string(),
    }
}

/// Read a file and deserialize it according to its format (detected from extension).
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;

    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Toml => toml::from_str(&content).map_err(|e| parse_error(path, e)),
    }
}

/// Deserialize a list from a file. For TOML files, extracts the array at the
/// given `toml_key` from a top-level table. For RON and JSON, deserializes
/// directly as `Vec<T>`.
pub fn deserialize_list<T: DeserializeOwned>(
    path: &Path,
    toml_key: &str,
) -> Result<Vec<T>, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;

    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Toml => {
            let mut table: toml::Table = toml::from_str(&content).map_err(|e| parse_error(path, e))?;
            let array = table
                .remove(toml_key)
                .ok_or_else(|| parse_error(path, format!("missing key '{toml_key}' in TOML file")))?;
            array
                .try_into()
                .map_err(|e: toml::de::Error| parse_error(path, e))
        }
    }
}

/// Load an optional list file. A missing file is an empty list.
fn load_optional_list<T: DeserializeOwned>(
    dir: &Path,
    base_name: &str,
) -> Result<(Vec<T>, PathBuf), DataLoadError> {
    match find_data_file(dir, base_name)? {
        Some(path) => Ok((deserialize_list(&path, base_name)?, path)),
        None => Ok((Vec::new(), dir.join(base_name))),
    }
}

// ===========================================================================
// Name resolution helpers
// ===========================================================================

/// Look up a name in a map, returning an `UnresolvedRef` error if not found.
pub fn resolve_name<'a, V>(
    map: &'a HashMap<String, V>,
    name: &str,
    file: &Path,
    expected_kind: &'static str,
) -> Result<&'a V, DataLoadError> {
    map.get(name).ok_or_else(|| DataLoadError::UnresolvedRef {
        file: file.to_path_buf(),
        name: name.to_string(),
        expected_kind,
    })
}

/// Check whether a name already exists in a map, returning a `DuplicateName`
/// error if so.
pub fn check_duplicate<V>(
    map: &HashMap<String, V>,
    name: &str,
    file: &Path,
) -> Result<(), DataLoadError> {
    if map.contains_key(name) {
        Err(DataLoadError::DuplicateName {
            file: file.to_path_buf(),
            name: name.to_string(),
        })
    } else {
        Ok(())
    }
}

// ===========================================================================
// Loading pipeline
// ===========================================================================

/// Names registered so far, per category, plus every name for duplicate
/// detection across files.
#[derive(Default)]
struct NameTables {
    all: HashMap<String, PrototypeId>,
    items: HashMap<String, PrototypeId>,
    tiles: HashMap<String, PrototypeId>,
    resources: HashMap<String, PrototypeId>,
}

impl NameTables {
    fn register(
        &mut self,
        builder: &mut PrototypesBuilder,
        name: &str,
        kind: PrototypeKind,
        file: &Path,
    ) -> Result<PrototypeId, DataLoadError> {
        check_duplicate(&self.all, name, file)?;
        let category = kind.category();
        let id = builder.register(name, kind);
        self.all.insert(name.to_string(), id);
        let table = match category {
            Category::Item => Some(&mut self.items),
            Category::Tile => Some(&mut self.tiles),
            Category::Resource => Some(&mut self.resources),
            _ => None,
        };
        if let Some(table) = table {
            table.insert(name.to_string(), id);
        }
        Ok(id)
    }
}

fn entity_kind(data: &EntityData) -> PrototypeKind {
    let max_health = data.max_health;
    match data.kind {
        EntityKindData::Container { inventory_size } => PrototypeKind::Container(ContainerProto {
            max_health,
            inventory_size,
        }),
        EntityKindData::TransportBelt { speed } => PrototypeKind::TransportBelt(BeltProto {
            max_health,
            speed: f64_to_fixed64(speed),
        }),
        EntityKindData::AssemblyMachine { crafting_speed } => {
            PrototypeKind::AssemblyMachine(AssemblyMachineProto {
                max_health,
                crafting_speed,
            })
        }
        EntityKindData::MiningDrill {
            mining_speed,
            mining_radius,
        } => PrototypeKind::MiningDrill(MiningDrillProto {
            max_health,
            mining_speed,
            mining_radius,
        }),
        EntityKindData::Inserter {
            tile_reach,
            swing_time,
        } => PrototypeKind::Inserter(InserterProto {
            max_health,
            tile_reach,
            swing_time,
        }),
    }
}

/// Load every prototype file in `dir` and build a validated registry.
///
/// `items` is required; `tiles`, `resources`, `entities`, `recipes` and
/// `noise_layers` are optional. Files are read in that order so each file
/// may only reference names defined by the ones before it.
pub fn load_prototypes(dir: &Path) -> Result<Prototypes, DataLoadError> {
    let mut builder = PrototypesBuilder::new();
    let mut names = NameTables::default();

    let items_path = require_data_file(dir, "items")?;
    let items: Vec<ItemData> = deserialize_list(&items_path, "items")?;
    for item in &items {
        names.register(
            &mut builder,
            &item.name,
            PrototypeKind::Item(ItemProto {
                stack_size: item.stack_size,
            }),
            &items_path,
        )?;
    }

    let (tiles, tiles_path) = load_optional_list::<TileData>(dir, "tiles")?;
    for tile in &tiles {
        names.register(
            &mut builder,
            &tile.name,
            PrototypeKind::Tile(TileProto {
                is_water: tile.is_water,
            }),
            &tiles_path,
        )?;
    }

    let (resources, resources_path) = load_optional_list::<ResourceData>(dir, "resources")?;
    for res in &resources {
        let product = *resolve_name(&names.items, &res.product, &resources_path, "item")?;
        names.register(
            &mut builder,
            &res.name,
            PrototypeKind::Resource(ResourceProto {
                product,
                pickup_time: res.pickup_time,
            }),
            &resources_path,
        )?;
    }

    let (entities, entities_path) = load_optional_list::<EntityData>(dir, "entities")?;
    for entity in &entities {
        names.register(&mut builder, &entity.name, entity_kind(entity), &entities_path)?;
    }

    let (recipes, recipes_path) = load_optional_list::<RecipeData>(dir, "recipes")?;
    for recipe in &recipes {
        let ingredients = recipe
            .ingredients
            .iter()
            .map(|(name, count)| {
                resolve_name(&names.items, name, &recipes_path, "item").map(|&id| (id, *count))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let product = *resolve_name(&names.items, &recipe.product.0, &recipes_path, "item")?;
        names.register(
            &mut builder,
            &recipe.name,
            PrototypeKind::Recipe(RecipeProto {
                ingredients,
                product: (product, recipe.product.1),
                crafting_time: recipe.crafting_time,
            }),
            &recipes_path,
        )?;
    }

    let (layers, layers_path) = load_optional_list::<NoiseLayerData>(dir, "noise_layers")?;
    for layer in &layers {
        let (target, table, kind_name) = match layer.target {
            NoiseTargetData::Base => (TileLayer::Base, &names.tiles, "tile"),
            NoiseTargetData::Resource => (TileLayer::Resource, &names.resources, "resource"),
        };
        let ranges = layer
            .ranges
            .iter()
            .map(|(bound, name)| resolve_name(table, name, &layers_path, kind_name).map(|&id| (*bound, id)))
            .collect::<Result<Vec<_>, _>>()?;
        names.register(
            &mut builder,
            &layer.name,
            PrototypeKind::NoiseLayer(NoiseLayerProto {
                target,
                octaves: layer.octaves,
                frequency: layer.frequency,
                persistence: layer.persistence,
                start_value: layer.start_value,
                ranges,
                richness: layer.richness,
            }),
            &layers_path,
        )?;
    }

    debug!(
        "resolved {} items, {} tiles, {} resources, {} entities, {} recipes, {} noise layers",
        items.len(),
        tiles.len(),
        resources.len(),
        entities.len(),
        recipes.len(),
        layers.len()
    );

    let prototypes = builder.build()?;
    info!("loaded {} prototypes from {}", prototypes.len(), dir.display());
    Ok(prototypes)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Create a temporary directory with a unique name for test isolation.
    fn make_test_dir(suffix: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "beltworks_data_test_{suffix}_{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Clean up a test directory.
    fn cleanup(dir: &Path) {
        let _ = fs::remove_dir_all(dir);
    }

    const ITEMS_RON: &str = r#"[(name: "iron-ore"), (name: "iron-plate", stack_size: 100), (name: "gear")]"#;

    // -----------------------------------------------------------------------
    // detect_format / find_data_file
    // -----------------------------------------------------------------------

    #[test]
    fn detect_format_by_extension() {
        assert_eq!(detect_format(Path::new("items.ron")).unwrap(), Format::Ron);
        assert_eq!(detect_format(Path::new("items.toml")).unwrap(), Format::Toml);
        assert_eq!(detect_format(Path::new("items.json")).unwrap(), Format::Json);
        assert!(matches!(
            detect_format(Path::new("items.yaml")),
            Err(DataLoadError::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            detect_format(Path::new("items")),
            Err(DataLoadError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn find_data_file_found_and_missing() {
        let dir = make_test_dir("find");
        assert_eq!(find_data_file(&dir, "items").unwrap(), None);

        fs::write(dir.join("items.json"), "[]").unwrap();
        assert_eq!(find_data_file(&dir, "items").unwrap(), Some(dir.join("items.json")));

        cleanup(&dir);
    }

    #[test]
    fn find_data_file_conflict() {
        let dir = make_test_dir("find_conflict");
        fs::write(dir.join("items.ron"), "[]").unwrap();
        fs::write(dir.join("items.json"), "[]").unwrap();

        let result = find_data_file(&dir, "items");
        assert!(matches!(result, Err(DataLoadError::ConflictingFormats { .. })));

        cleanup(&dir);
    }

    #[test]
    fn require_data_file_missing() {
        let dir = make_test_dir("require_missing");

        let result = require_data_file(&dir, "items");
        assert!(matches!(
            result,
            Err(DataLoadError::MissingRequired { file: "items", .. })
        ));

        cleanup(&dir);
    }

    // -----------------------------------------------------------------------
    // deserialize_list
    // -----------------------------------------------------------------------

    #[test]
    fn deserialize_list_toml() {
        let dir = make_test_dir("list_toml");
        let path = dir.join("items.toml");
        fs::write(
            &path,
            r#"
[[items]]
name = "iron-ore"

[[items]]
name = "copper-ore"
"#,
        )
        .unwrap();

        let items: Vec<ItemData> = deserialize_list(&path, "items").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "iron-ore");

        cleanup(&dir);
    }

    #[test]
    fn deserialize_list_toml_missing_key() {
        let dir = make_test_dir("list_toml_missing");
        let path = dir.join("items.toml");
        fs::write(&path, r#"foo = "bar""#).unwrap();

        let result: Result<Vec<ItemData>, _> = deserialize_list(&path, "items");
        assert!(matches!(result, Err(DataLoadError::Parse { .. })));

        cleanup(&dir);
    }

    #[test]
    fn deserialize_file_parse_error() {
        let dir = make_test_dir("deser_parse_err");
        let path = dir.join("bad.ron");
        fs::write(&path, "this is not valid RON {{{").unwrap();

        let result: Result<Vec<ItemData>, _> = deserialize_file(&path);
        assert!(matches!(result, Err(DataLoadError::Parse { .. })));

        cleanup(&dir);
    }

    // -----------------------------------------------------------------------
    // load_prototypes
    // -----------------------------------------------------------------------

    #[test]
    fn load_items_only() {
        let dir = make_test_dir("load_items");
        fs::write(dir.join("items.ron"), ITEMS_RON).unwrap();

        let protos = load_prototypes(&dir).unwrap();
        assert_eq!(protos.len(), 3);
        let plate = protos.id("iron-plate").unwrap();
        assert_eq!(protos.stack_size(plate), 100);
        assert_eq!(protos.category(plate), Some(Category::Item));

        cleanup(&dir);
    }

    #[test]
    fn load_requires_items() {
        let dir = make_test_dir("load_no_items");
        fs::write(dir.join("tiles.ron"), r#"[(name: "grass")]"#).unwrap();

        assert!(matches!(
            load_prototypes(&dir),
            Err(DataLoadError::MissingRequired { .. })
        ));

        cleanup(&dir);
    }

    #[test]
    fn load_mixed_formats_resolves_references() {
        let dir = make_test_dir("load_mixed");
        fs::write(dir.join("items.ron"), ITEMS_RON).unwrap();
        fs::write(
            dir.join("tiles.json"),
            r#"[{"name": "grass"}, {"name": "water", "is_water": true}]"#,
        )
        .unwrap();
        fs::write(
            dir.join("resources.toml"),
            r#"
[[resources]]
name = "iron-deposit"
product = "iron-ore"
pickup_time = 2.0
"#,
        )
        .unwrap();
        fs::write(
            dir.join("recipes.ron"),
            r#"[(name: "gear-recipe", ingredients: [("iron-plate", 2)], product: ("gear", 1), crafting_time: 0.5)]"#,
        )
        .unwrap();
        fs::write(
            dir.join("noise_layers.ron"),
            r#"[
                (name: "terrain", target: base, ranges: [(-0.3, "water"), (1.0, "grass")]),
                (name: "iron-field", target: resource, start_value: 0.2, ranges: [(1.0, "iron-deposit")], richness: 500.0),
            ]"#,
        )
        .unwrap();

        let protos = load_prototypes(&dir).unwrap();
        let deposit = protos.by_name("iron-deposit").unwrap();
        match &deposit.kind {
            PrototypeKind::Resource(r) => {
                assert_eq!(Some(r.product), protos.id("iron-ore"));
                assert_eq!(r.pickup_time, 2.0);
            }
            other => panic!("expected resource, got {other:?}"),
        }
        assert!(protos.is_water(protos.id("water").unwrap()));
        assert_eq!(protos.noise_layers().count(), 2);

        cleanup(&dir);
    }

    #[test]
    fn load_rejects_unresolved_reference() {
        let dir = make_test_dir("load_unresolved");
        fs::write(dir.join("items.ron"), ITEMS_RON).unwrap();
        fs::write(
            dir.join("resources.ron"),
            r#"[(name: "copper-deposit", product: "copper-ore")]"#,
        )
        .unwrap();

        let result = load_prototypes(&dir);
        assert!(matches!(
            result,
            Err(DataLoadError::UnresolvedRef { ref name, expected_kind: "item", .. }) if name == "copper-ore"
        ));

        cleanup(&dir);
    }

    #[test]
    fn load_rejects_wrong_kind_reference() {
        // A base noise layer may only name tiles.
        let dir = make_test_dir("load_wrong_kind");
        fs::write(dir.join("items.ron"), ITEMS_RON).unwrap();
        fs::write(
            dir.join("noise_layers.ron"),
            r#"[(name: "terrain", target: base, ranges: [(1.0, "iron-ore")])]"#,
        )
        .unwrap();

        assert!(matches!(
            load_prototypes(&dir),
            Err(DataLoadError::UnresolvedRef { expected_kind: "tile", .. })
        ));

        cleanup(&dir);
    }

    #[test]
    fn load_rejects_duplicate_across_files() {
        let dir = make_test_dir("load_duplicate");
        fs::write(dir.join("items.ron"), ITEMS_RON).unwrap();
        fs::write(dir.join("tiles.ron"), r#"[(name: "gear")]"#).unwrap();

        assert!(matches!(
            load_prototypes(&dir),
            Err(DataLoadError::DuplicateName { ref name, .. }) if name == "gear"
        ));

        cleanup(&dir);
    }

    #[test]
    fn load_surfaces_validation_errors() {
        let dir = make_test_dir("load_invalid");
        fs::write(dir.join("items.ron"), ITEMS_RON).unwrap();
        fs::write(
            dir.join("entities.ron"),
            r#"[(name: "belt", kind: TransportBelt(speed: 0.0))]"#,
        )
        .unwrap();

        assert!(matches!(
            load_prototypes(&dir),
            Err(DataLoadError::Prototype(PrototypeError::Invalid { .. }))
        ));

        cleanup(&dir);
    }

    #[test]
    fn error_display_messages() {
        let e = DataLoadError::MissingRequired {
            file: "items",
            dir: PathBuf::from("/data"),
        };
        assert!(format!("{e}").contains("items"));
        assert!(format!("{e}").contains("/data"));

        let e = DataLoadError::UnresolvedRef {
            file: PathBuf::from("recipes.ron"),
            name: "iron-plate".to_string(),
            expected_kind: "item",
        };
        let msg = format!("{e}");
        assert!(msg.contains("iron-plate"));
        assert!(msg.contains("item"));

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let data_err: DataLoadError = io_err.into();
        assert!(matches!(data_err, DataLoadError::Io(_)));
    }
}
