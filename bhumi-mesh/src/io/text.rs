//! Line-oriented text format for hand-written and dumped meshes.
//!
//! ```text
//! # comment
//! g minX minY minZ maxX maxY maxZ [id]      grid cell
//! n minX minY minZ maxX maxY maxZ [flags]   base cell of the last grid cell
//! r minX minY minZ maxX maxY maxZ cost threat
//! ```
//!
//! Flags default to walkable. The whole input is parsed before anything is
//! applied, so a malformed line leaves the navmesh untouched.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::error::{NavmeshError, Result};
use crate::flags::MovementFlags;
use crate::geometry::Aabb;
use crate::grid_cell::{CellData, GridCellData};
use crate::navmesh::Navmesh;
use crate::region::Region;

/// Parsed content of a text mesh.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextMesh {
    pub grid_cells: Vec<GridCellData>,
    pub regions: Vec<Region>,
}

fn parse_error(line: usize, message: impl Into<String>) -> NavmeshError {
    NavmeshError::Parse {
        line,
        message: message.into(),
    }
}

fn parse_f32(token: &str, line: usize) -> Result<f32> {
    let v: f32 = token
        .parse()
        .map_err(|_| parse_error(line, format!("invalid number '{}'", token)))?;
    if !v.is_finite() {
        return Err(parse_error(line, format!("non-finite number '{}'", token)));
    }
    Ok(v)
}

fn parse_box(tokens: &[&str], line: usize) -> Result<Aabb> {
    if tokens.len() < 6 {
        return Err(parse_error(line, format!("expected 6 box coordinates, found {}", tokens.len())));
    }
    let mut c = [0.0f32; 6];
    for (slot, token) in c.iter_mut().zip(tokens) {
        *slot = parse_f32(token, line)?;
    }
    if c[0] > c[3] || c[1] > c[4] || c[2] > c[5] {
        return Err(parse_error(line, "box min exceeds max"));
    }
    Ok(Aabb::from_coords(c[0], c[1], c[2], c[3], c[4], c[5]))
}

/// Parse a whole text mesh.
pub fn parse_text(input: &str) -> Result<TextMesh> {
    let mut mesh = TextMesh::default();

    for (index, raw) in input.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let tokens: Vec<&str> = trimmed.split_whitespace().collect();
        let (kind, rest) = (tokens[0], &tokens[1..]);

        match kind {
            "g" => {
                if rest.len() > 7 {
                    return Err(parse_error(line, "too many fields for grid cell"));
                }
                let aabb = parse_box(rest, line)?;
                let id = match rest.get(6) {
                    Some(token) => Some(
                        token
                            .parse::<u32>()
                            .map_err(|_| parse_error(line, format!("invalid grid cell id '{}'", token)))?,
                    ),
                    None => None,
                };
                mesh.grid_cells.push(GridCellData {
                    id,
                    aabb,
                    cells: Vec::new(),
                });
            }
            "n" => {
                if rest.len() > 7 {
                    return Err(parse_error(line, "too many fields for cell"));
                }
                let aabb = parse_box(rest, line)?;
                let flags = match rest.get(6) {
                    Some(token) => MovementFlags(
                        token
                            .parse::<u8>()
                            .map_err(|_| parse_error(line, format!("invalid flags '{}'", token)))?,
                    ),
                    None => MovementFlags::WALK,
                };
                let grid = mesh
                    .grid_cells
                    .last_mut()
                    .ok_or_else(|| parse_error(line, "cell before any grid cell"))?;
                grid.cells.push(CellData {
                    aabb,
                    flags,
                    movement_cost_mult: 1.0,
                });
            }
            "r" => {
                if rest.len() != 8 {
                    return Err(parse_error(
                        line,
                        format!("region needs 6 coordinates, cost and threat, found {} fields", rest.len()),
                    ));
                }
                let aabb = parse_box(rest, line)?;
                let cost = parse_f32(rest[6], line)?;
                let threat = parse_f32(rest[7], line)?;
                mesh.regions.push(Region::new(aabb, cost, threat));
            }
            other => return Err(parse_error(line, format!("unknown record '{}'", other))),
        }
    }

    Ok(mesh)
}

fn push_box(out: &mut String, tag: char, aabb: &Aabb) {
    let _ = write!(
        out,
        "{} {} {} {} {} {} {}",
        tag, aabb.min.x, aabb.min.y, aabb.min.z, aabb.max.x, aabb.max.y, aabb.max.z
    );
}

impl Navmesh {
    /// Add the grid cells and regions of a text mesh.
    ///
    /// Regions are appended to the active ones. Returns the number of grid
    /// cells added.
    pub fn load_text(&self, input: &str) -> Result<usize> {
        let mesh = parse_text(input)?;
        let count = mesh.grid_cells.len();
        for grid in mesh.grid_cells {
            self.add(grid, true);
        }
        if !mesh.regions.is_empty() {
            let mut regions = self.regions();
            regions.extend(mesh.regions);
            self.set_regions(regions);
        }
        tracing::info!("Loaded {} grid cells from text", count);
        Ok(count)
    }

    /// Dump grid cells, base cells and regions. Replacement cells are derived
    /// data and are not written.
    pub fn dump_text(&self) -> String {
        let mut out = String::new();
        {
            let data = self.data.read();
            for grid in data.grid_cells.values() {
                push_box(&mut out, 'g', grid.aabb());
                let _ = writeln!(out, " {}", grid.id());
                for cell in grid.cells().iter().filter_map(|id| data.arena.get(*id)) {
                    push_box(&mut out, 'n', &cell.aabb);
                    let _ = writeln!(out, " {}", cell.flags.bits());
                }
            }
        }
        for region in self.regions() {
            push_box(&mut out, 'r', &region.aabb);
            let _ = writeln!(out, " {} {}", region.movement_cost_mult, region.threat);
        }
        out
    }

    /// [`Navmesh::load_text`] from a file.
    pub fn load_file(&self, path: &Path) -> Result<usize> {
        let content = fs::read_to_string(path)?;
        self.load_text(&content)
    }

    /// [`Navmesh::dump_text`] to a file.
    pub fn dump_file(&self, path: &Path) -> Result<()> {
        fs::write(path, self.dump_text())?;
        Ok(())
    }
}
