use crate::chunk::TileLayer;
use crate::coord::{Orientation, WorldCoord};
use crate::entity::BuildError;
use crate::inventory::Inventory;
use crate::prototype::{Category, Prototype, PrototypeKind, Prototypes};
use crate::unique::ContainerData;
use crate::world::World;

/// Give the chest an empty inventory sized by its prototype.
pub(crate) fn on_build(
    world: &mut World,
    _prototypes: &Prototypes,
    proto: &Prototype,
    coord: WorldCoord,
    layer: TileLayer,
    _orientation: Orientation,
) -> Result<(), BuildError> {
    let PrototypeKind::Container(container) = &proto.kind else {
        return Err(BuildError::WrongEntity {
            coord,
            expected: Category::Container,
        });
    };
    world.make_unique_data(
        coord,
        layer,
        ContainerData {
            inventory: Inventory::new(usize::from(container.inventory_size)),
        },
    )?;
    Ok(())
}
