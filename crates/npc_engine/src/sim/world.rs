use std::collections::HashMap;

use thiserror::Error;

/// Block contents at an integer voxel coordinate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BlockKind {
    #[default]
    Air,
    Grass,
    Pavement,
    Brick,
    Wood,
    Glass,
    Door {
        open: bool,
    },
}

impl BlockKind {
    /// An open door is passable and counts as a gap; a closed door is a wall.
    pub fn is_solid(self) -> bool {
        match self {
            BlockKind::Air => false,
            BlockKind::Door { open } => !open,
            BlockKind::Grass
            | BlockKind::Pavement
            | BlockKind::Brick
            | BlockKind::Wood
            | BlockKind::Glass => true,
        }
    }
}

/// Read-only view of the world used by the simulation.
pub trait WorldQuery {
    fn block_at(&self, x: i32, y: i32, z: i32) -> BlockKind;

    fn is_solid(&self, x: i32, y: i32, z: i32) -> bool {
        self.block_at(x, y, z).is_solid()
    }

    /// `Some(open)` when the block is a door.
    fn door_state(&self, x: i32, y: i32, z: i32) -> Option<bool> {
        match self.block_at(x, y, z) {
            BlockKind::Door { open } => Some(open),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error("block at ({x}, {y}, {z}) is not a door")]
    NotADoor { x: i32, y: i32, z: i32 },
    #[error("invalid box extents: min ({min:?}) exceeds max ({max:?})")]
    InvalidExtents {
        min: (i32, i32, i32),
        max: (i32, i32, i32),
    },
}

/// Sparse voxel grid; unset coordinates are air.
#[derive(Debug, Clone, Default)]
pub struct VoxelWorld {
    blocks: HashMap<(i32, i32, i32), BlockKind>,
}

impl VoxelWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_block(&mut self, x: i32, y: i32, z: i32, block: BlockKind) {
        if block == BlockKind::Air {
            self.blocks.remove(&(x, y, z));
        } else {
            self.blocks.insert((x, y, z), block);
        }
    }

    /// Fills the inclusive box `min..=max`.
    pub fn fill_box(
        &mut self,
        min: (i32, i32, i32),
        max: (i32, i32, i32),
        block: BlockKind,
    ) -> Result<(), WorldError> {
        if min.0 > max.0 || min.1 > max.1 || min.2 > max.2 {
            return Err(WorldError::InvalidExtents { min, max });
        }
        for x in min.0..=max.0 {
            for y in min.1..=max.1 {
                for z in min.2..=max.2 {
                    self.set_block(x, y, z, block);
                }
            }
        }
        Ok(())
    }

    pub fn set_door_open(&mut self, x: i32, y: i32, z: i32, open: bool) -> Result<(), WorldError> {
        match self.blocks.get_mut(&(x, y, z)) {
            Some(BlockKind::Door { open: state }) => {
                *state = open;
                Ok(())
            }
            _ => Err(WorldError::NotADoor { x, y, z }),
        }
    }

    /// Flat ground layer at `y = ground_y` across the inclusive square.
    pub fn lay_ground(&mut self, half_extent: i32, ground_y: i32) {
        for x in -half_extent..=half_extent {
            for z in -half_extent..=half_extent {
                self.set_block(x, ground_y, z, BlockKind::Grass);
            }
        }
    }

    /// Hollow single-room building with its floor at `origin.1 - 1`, a roof
    /// `interior_height` blocks above the floor and a closed door in the
    /// middle of the south (`-z`) wall. Returns the door coordinate.
    pub fn build_hut(
        &mut self,
        origin: (i32, i32, i32),
        interior_width: i32,
        interior_depth: i32,
        interior_height: i32,
    ) -> (i32, i32, i32) {
        let (ox, oy, oz) = origin;
        let min_x = ox - 1;
        let max_x = ox + interior_width;
        let min_z = oz - 1;
        let max_z = oz + interior_depth;
        let floor_y = oy - 1;
        let roof_y = oy + interior_height;

        for x in min_x..=max_x {
            for z in min_z..=max_z {
                self.set_block(x, floor_y, z, BlockKind::Wood);
                self.set_block(x, roof_y, z, BlockKind::Brick);
            }
        }
        for y in oy..roof_y {
            for x in min_x..=max_x {
                self.set_block(x, y, min_z, BlockKind::Brick);
                self.set_block(x, y, max_z, BlockKind::Brick);
            }
            for z in min_z..=max_z {
                self.set_block(min_x, y, z, BlockKind::Brick);
                self.set_block(max_x, y, z, BlockKind::Brick);
            }
        }

        let door = (ox + interior_width / 2, oy, min_z);
        self.set_block(door.0, door.1, door.2, BlockKind::Door { open: false });
        if interior_height > 1 {
            self.set_block(door.0, door.1 + 1, door.2, BlockKind::Door { open: false });
        }
        door
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}

impl WorldQuery for VoxelWorld {
    fn block_at(&self, x: i32, y: i32, z: i32) -> BlockKind {
        self.blocks.get(&(x, y, z)).copied().unwrap_or_default()
    }
}
