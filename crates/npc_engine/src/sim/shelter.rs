use super::math::Vec3;
use super::world::WorldQuery;

/// Highest block above the point that may serve as a roof.
pub const SHELTER_MAX_ROOF_HEIGHT: i32 = 4;
/// How far along each cardinal direction a wall is searched for.
pub const SHELTER_MAX_WALL_DISTANCE: i32 = 6;
/// Walls required out of the four cardinal sides.
pub const SHELTER_MIN_WALLS: usize = 3;

const CARDINALS: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

/// Whether `point` is enclosed: solid floor directly below, a roof within
/// [`SHELTER_MAX_ROOF_HEIGHT`] blocks above, and walls on at least
/// [`SHELTER_MIN_WALLS`] cardinal sides at the point's height.
///
/// Solidity comes from [`WorldQuery::is_solid`], so an open door leaves a gap
/// in its wall while a closed door seals it.
pub fn is_sheltered(world: &dyn WorldQuery, point: Vec3) -> bool {
    let (bx, by, bz) = point.block_coords();

    if !world.is_solid(bx, by - 1, bz) {
        return false;
    }

    let has_roof = (1..=SHELTER_MAX_ROOF_HEIGHT).any(|dy| world.is_solid(bx, by + dy, bz));
    if !has_roof {
        return false;
    }

    let walls = CARDINALS
        .iter()
        .filter(|(dx, dz)| has_wall(world, (bx, by, bz), *dx, *dz))
        .count();
    walls >= SHELTER_MIN_WALLS
}

fn has_wall(world: &dyn WorldQuery, origin: (i32, i32, i32), dx: i32, dz: i32) -> bool {
    let (bx, by, bz) = origin;
    (1..=SHELTER_MAX_WALL_DISTANCE).any(|step| world.is_solid(bx + dx * step, by, bz + dz * step))
}
