//! Assembly machines.
//!
//! A machine with a recipe starts crafting as soon as its ingredient
//! inventory covers the recipe and the product inventory has room. Starting
//! consumes the ingredients and schedules one deferral; when it fires the
//! product is added and the machine tries to start again.

use crate::chunk::TileLayer;
use crate::coord::{Orientation, WorldCoord};
use crate::deferral::DeferralEntry;
use crate::entity::{BuildError, entity_prototype};
use crate::id::PrototypeId;
use crate::inventory::Inventory;
use crate::prototype::{Category, Prototype, PrototypeKind, Prototypes, RecipeProto};
use crate::relocation::TileLocation;
use crate::unique::AssemblyMachineData;
use crate::world::World;
use log::{debug, warn};

/// Payload of the craft-completion deferral.
const CRAFT_DONE: u64 = 0;

fn recipe_proto(prototypes: &Prototypes, id: PrototypeId) -> Option<&RecipeProto> {
    match &prototypes.get(id)?.kind {
        PrototypeKind::Recipe(r) => Some(r),
        _ => None,
    }
}

fn crafting_speed(prototypes: &Prototypes, world: &World, coord: WorldCoord) -> Option<f64> {
    match &entity_prototype(world, prototypes, coord)?.kind {
        PrototypeKind::AssemblyMachine(a) => Some(a.crafting_speed),
        _ => None,
    }
}

pub(crate) fn on_build(
    world: &mut World,
    _prototypes: &Prototypes,
    proto: &Prototype,
    coord: WorldCoord,
    layer: TileLayer,
    _orientation: Orientation,
) -> Result<(), BuildError> {
    if !matches!(proto.kind, PrototypeKind::AssemblyMachine(_)) {
        return Err(BuildError::WrongEntity {
            coord,
            expected: Category::AssemblyMachine,
        });
    }
    world.make_unique_data(
        coord,
        layer,
        AssemblyMachineData {
            recipe: None,
            ingredients: Inventory::new(0),
            product: Inventory::new(0),
            craft: None,
        },
    )?;
    Ok(())
}

pub(crate) fn on_remove(
    world: &mut World,
    _prototypes: &Prototypes,
    _proto: &Prototype,
    coord: WorldCoord,
    layer: TileLayer,
) {
    if let Some(handle) = world
        .get_unique_data::<AssemblyMachineData>(coord, layer)
        .and_then(|m| m.craft)
    {
        world.cancel_deferral(handle);
    }
}

/// Select the recipe of the machine at `coord`. `None` clears it.
///
/// Changing the recipe cancels a craft in progress and empties both
/// inventories.
pub fn set_recipe(
    world: &mut World,
    prototypes: &Prototypes,
    coord: WorldCoord,
    recipe: Option<PrototypeId>,
) -> Result<(), BuildError> {
    // Each ingredient gets its own bound slot so one input can't crowd out another.
    let (ingredients, product) = match recipe {
        Some(id) => {
            let r = recipe_proto(prototypes, id).ok_or(BuildError::NotARecipe(id))?;
            (
                Inventory::filtered(r.ingredients.iter().map(|(item, _)| *item)),
                Inventory::filtered([r.product.0]),
            )
        }
        None => (Inventory::new(0), Inventory::new(0)),
    };

    let machine = world
        .get_unique_data_mut::<AssemblyMachineData>(coord, TileLayer::Entity)
        .ok_or(BuildError::WrongEntity {
            coord,
            expected: Category::AssemblyMachine,
        })?;
    let pending = machine.craft.take();
    machine.recipe = recipe;
    machine.ingredients = ingredients;
    machine.product = product;

    if let Some(handle) = pending {
        world.cancel_deferral(handle);
    }
    try_begin_crafting(world, prototypes, coord);
    Ok(())
}

/// Whether the machine at `coord` takes `item` as an ingredient right now.
pub fn accepts_ingredient(
    world: &World,
    prototypes: &Prototypes,
    coord: WorldCoord,
    item: PrototypeId,
) -> bool {
    let Some(machine) = world.get_unique_data::<AssemblyMachineData>(coord, TileLayer::Entity) else {
        return false;
    };
    let Some(recipe) = machine.recipe.and_then(|id| recipe_proto(prototypes, id)) else {
        return false;
    };
    recipe.ingredients.iter().any(|(i, _)| *i == item)
        && machine
            .ingredients
            .can_add(item, 1, prototypes.stack_size(item))
}

/// Start a craft if the machine is idle, the ingredients cover the recipe
/// and the product inventory has room. Returns whether a craft started.
pub fn try_begin_crafting(world: &mut World, prototypes: &Prototypes, coord: WorldCoord) -> bool {
    let Some(speed) = crafting_speed(prototypes, world, coord) else {
        return false;
    };
    let Some(owner) = world.unique_id(coord, TileLayer::Entity) else {
        return false;
    };
    let Some(machine) = world.get_unique_data::<AssemblyMachineData>(coord, TileLayer::Entity) else {
        return false;
    };
    if machine.craft.is_some() {
        return false;
    }
    let Some(recipe) = machine.recipe.and_then(|id| recipe_proto(prototypes, id)) else {
        return false;
    };
    let (product, count) = recipe.product;
    let ready = recipe
        .ingredients
        .iter()
        .all(|(item, need)| machine.ingredients.count(*item) >= *need)
        && machine
            .product
            .can_add(product, count, prototypes.stack_size(product));
    if !ready {
        return false;
    }

    let ticks = prototypes.crafting_ticks(recipe, speed);
    let handle = match world.schedule_deferral(owner, ticks, CRAFT_DONE) {
        Ok(handle) => handle,
        Err(e) => {
            warn!("assembly machine at {coord:?} cannot schedule craft: {e}");
            return false;
        }
    };

    let Some(machine) = world.get_unique_data_mut::<AssemblyMachineData>(coord, TileLayer::Entity) else {
        return false;
    };
    for (item, need) in &recipe.ingredients {
        if let Err(e) = machine.ingredients.remove(*item, *need) {
            warn!("assembly machine at {coord:?} lost ingredients: {e}");
        }
    }
    machine.craft = Some(handle);
    debug!("assembly machine at {coord:?} crafting for {ticks} ticks");
    true
}

pub(crate) fn on_deferral(
    world: &mut World,
    prototypes: &Prototypes,
    _proto: &Prototype,
    location: TileLocation,
    entry: &DeferralEntry,
) {
    if entry.payload != CRAFT_DONE {
        return;
    }
    let coord = location.coord;
    let Some(machine) = world.get_unique_data_mut::<AssemblyMachineData>(coord, location.layer) else {
        return;
    };
    machine.craft = None;
    if let Some((product, count)) = machine
        .recipe
        .and_then(|id| recipe_proto(prototypes, id))
        .map(|r| r.product)
    {
        let leftover = machine
            .product
            .add(product, count, prototypes.stack_size(product));
        if leftover > 0 {
            warn!("assembly machine at {coord:?} dropped {leftover} crafted items");
        }
    }
    try_begin_crafting(world, prototypes, coord);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    fn machine(world: &World, at: WorldCoord) -> &AssemblyMachineData {
        world
            .get_unique_data::<AssemblyMachineData>(at, TileLayer::Entity)
            .unwrap()
    }

    fn setup() -> (Fixture, World, WorldCoord) {
        let fx = fixture();
        let mut world = world_with_origin_chunk();
        let at = WorldCoord::new(5, 5);
        world
            .build(&fx.protos, at, TileLayer::Entity, Orientation::Up, fx.assembler)
            .unwrap();
        set_recipe(&mut world, &fx.protos, at, Some(fx.gear_recipe)).unwrap();
        (fx, world, at)
    }

    fn feed(world: &mut World, fx: &Fixture, at: WorldCoord, plates: u32) {
        let m = world
            .get_unique_data_mut::<AssemblyMachineData>(at, TileLayer::Entity)
            .unwrap();
        let left = m.ingredients.add(fx.iron_plate, plates, 100);
        assert_eq!(left, 0);
    }

    #[test]
    fn set_recipe_rejects_non_recipe() {
        let (fx, mut world, at) = setup();
        assert_eq!(
            set_recipe(&mut world, &fx.protos, at, Some(fx.gear)),
            Err(BuildError::NotARecipe(fx.gear))
        );
    }

    #[test]
    fn craft_consumes_then_produces() {
        let (fx, mut world, at) = setup();
        feed(&mut world, &fx, at, 2);
        assert!(try_begin_crafting(&mut world, &fx.protos, at));
        assert_eq!(machine(&world, at).ingredients.count(fx.iron_plate), 0);
        assert!(machine(&world, at).craft.is_some());

        // 0.5 s at crafting speed 1.
        run_ticks(&mut world, &fx.protos, 29);
        assert_eq!(machine(&world, at).product.count(fx.gear), 0);
        run_ticks(&mut world, &fx.protos, 1);
        assert_eq!(machine(&world, at).product.count(fx.gear), 1);
        assert!(machine(&world, at).craft.is_none());
    }

    #[test]
    fn missing_ingredients_keep_machine_idle() {
        let (fx, mut world, at) = setup();
        feed(&mut world, &fx, at, 1);
        assert!(!try_begin_crafting(&mut world, &fx.protos, at));
        assert!(world.deferral().is_empty());
    }

    #[test]
    fn crafting_restarts_while_ingredients_last() {
        let (fx, mut world, at) = setup();
        feed(&mut world, &fx, at, 4);
        try_begin_crafting(&mut world, &fx.protos, at);
        run_ticks(&mut world, &fx.protos, 30);
        // Second craft started immediately after the first.
        assert!(machine(&world, at).craft.is_some());
        run_ticks(&mut world, &fx.protos, 30);
        assert_eq!(machine(&world, at).product.count(fx.gear), 2);
    }

    #[test]
    fn accepts_only_recipe_ingredients() {
        let (fx, world, at) = setup();
        assert!(accepts_ingredient(&world, &fx.protos, at, fx.iron_plate));
        assert!(!accepts_ingredient(&world, &fx.protos, at, fx.iron_ore));
    }

    #[test]
    fn each_ingredient_keeps_its_own_slot() {
        let fx = fixture();
        let (ore, plate, gear) = (fx.iron_ore, fx.iron_plate, fx.gear);
        let mut world = world_with_origin_chunk();
        let at = WorldCoord::new(5, 5);
        world
            .build(&fx.protos, at, TileLayer::Entity, Orientation::Up, fx.assembler)
            .unwrap();
        set_recipe(&mut world, &fx.protos, at, Some(fx.mixed_recipe)).unwrap();

        // Stuff ore until the machine refuses it; plates must still fit.
        let mut accepted = 0;
        while accepts_ingredient(&world, &fx.protos, at, ore) {
            let m = world
                .get_unique_data_mut::<AssemblyMachineData>(at, TileLayer::Entity)
                .unwrap();
            assert_eq!(m.ingredients.add(ore, 1, fx.protos.stack_size(ore)), 0);
            accepted += 1;
        }
        assert_eq!(accepted, fx.protos.stack_size(ore));
        assert!(accepts_ingredient(&world, &fx.protos, at, plate));

        let m = world
            .get_unique_data_mut::<AssemblyMachineData>(at, TileLayer::Entity)
            .unwrap();
        assert_eq!(m.ingredients.add(plate, 1, 100), 0);
        assert!(try_begin_crafting(&mut world, &fx.protos, at));
        run_ticks(&mut world, &fx.protos, 30);
        assert_eq!(machine(&world, at).product.count(gear), 1);
    }

    #[test]
    fn removing_machine_cancels_craft() {
        let (fx, mut world, at) = setup();
        feed(&mut world, &fx, at, 2);
        try_begin_crafting(&mut world, &fx.protos, at);
        world.remove(&fx.protos, at, TileLayer::Entity).unwrap();

        let report = world.step(&fx.protos);
        assert_eq!(report.deferrals.fired, 0);
        run_ticks(&mut world, &fx.protos, 40);
        assert!(world.deferral().is_empty());
    }
}
