// Position and coordinate mapper
//
// A tray is scanned in a linear order by the detection pipeline, but results
// are stored by grid coordinates. This module is the pure, stateless bridge
// between the two: a 0-based scan index on one side, a 1-based (row, col)
// pair on the other.
//
// Two scan patterns exist on real handlers:
// - Snake: odd rows left-to-right, even rows right-to-left (boustrophedon)
// - RowWise: every row left-to-right

use crate::error::{Result, TrayError};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Scan pattern used to linearize the tray grid
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingMode {
    /// Alternating direction per row: (1,1)..(1,c), (2,c)..(2,1), ...
    #[default]
    Snake,
    /// Always left-to-right: (1,1)..(1,c), (2,1)..(2,c), ...
    RowWise,
}

impl FromStr for MappingMode {
    type Err = TrayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "snake" => Ok(MappingMode::Snake),
            "rowwise" | "row_wise" | "row-wise" => Ok(MappingMode::RowWise),
            other => Err(TrayError::Format(format!(
                "unknown mapping mode {other:?} (expected \"snake\" or \"rowwise\")"
            ))),
        }
    }
}

/// One (row, col) cell in a tray grid, both 1-based
///
/// Immutable value type with structural equality, usable as a map key.
/// Wire format is `"row_col"`, which is also how it serializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub row: u32,
    pub col: u32,
}

impl Position {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Parse position text against a tray's dimensions
    ///
    /// Accepted shapes:
    /// - `"row_col"` or `"row,col"` - explicit 1-based coordinates
    /// - a bare non-negative integer - 0-based scan index, converted via
    ///   [`index_to_position`] with the given mapping mode
    ///
    /// Empty/whitespace input is a `Validation` error, any other shape is a
    /// `Format` error, and in-bounds checks produce `Range` errors.
    pub fn parse(text: &str, rows: u32, cols: u32, mode: MappingMode) -> Result<Position> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(TrayError::Validation("position text is empty".into()));
        }

        if let Some(sep) = [',', '_'].into_iter().find(|sep| trimmed.contains(*sep)) {
            let mut parts = trimmed.splitn(2, sep);
            let row = parse_coord(parts.next().unwrap_or(""), trimmed)?;
            let col = parse_coord(parts.next().unwrap_or(""), trimmed)?;
            check_bounds(row, col, rows, cols)?;
            return Ok(Position::new(row, col));
        }

        let index: usize = trimmed
            .parse()
            .map_err(|_| TrayError::Format(format!("unrecognized position text {trimmed:?}")))?;
        index_to_position(index, rows, cols, mode)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.row, self.col)
    }
}

impl FromStr for Position {
    type Err = TrayError;

    /// Format-level parse of `"row_col"` without bounds checking
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.splitn(2, '_');
        let row = parse_coord(parts.next().unwrap_or(""), s)?;
        let col = parse_coord(parts.next().unwrap_or(""), s)?;
        Ok(Position::new(row, col))
    }
}

// Serialized as its "row_col" wire form so positions are readable map keys
// and event fields in exported JSON.
impl Serialize for Position {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Position {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

fn parse_coord(part: &str, whole: &str) -> Result<u32> {
    part.trim()
        .parse::<u32>()
        .map_err(|_| TrayError::Format(format!("unrecognized position text {whole:?}")))
}

fn check_dimensions(rows: u32, cols: u32) -> Result<()> {
    if rows == 0 || cols == 0 {
        return Err(TrayError::Range(format!(
            "tray dimensions must be positive, got {rows}x{cols}"
        )));
    }
    Ok(())
}

fn check_bounds(row: u32, col: u32, rows: u32, cols: u32) -> Result<()> {
    check_dimensions(rows, cols)?;
    if row < 1 || row > rows || col < 1 || col > cols {
        return Err(TrayError::Range(format!(
            "position {row}_{col} outside {rows}x{cols} tray"
        )));
    }
    Ok(())
}

/// Map a 0-based scan index to a 1-based grid position
pub fn index_to_position(
    index: usize,
    rows: u32,
    cols: u32,
    mode: MappingMode,
) -> Result<Position> {
    check_dimensions(rows, cols)?;
    let total = rows as usize * cols as usize;
    if index >= total {
        return Err(TrayError::Range(format!(
            "scan index {index} outside 0..{total}"
        )));
    }

    let row = (index / cols as usize) as u32 + 1;
    let offset = (index % cols as usize) as u32;
    let col = match mode {
        MappingMode::RowWise => offset + 1,
        MappingMode::Snake => {
            // Odd rows (1, 3, 5, ...) read left-to-right, even rows reversed
            if row % 2 == 1 {
                offset + 1
            } else {
                cols - offset
            }
        }
    };

    Ok(Position::new(row, col))
}

/// Map a 1-based grid position back to its 0-based scan index
///
/// Exact inverse of [`index_to_position`] for the same dimensions and mode.
pub fn position_to_index(
    position: Position,
    rows: u32,
    cols: u32,
    mode: MappingMode,
) -> Result<usize> {
    check_bounds(position.row, position.col, rows, cols)?;

    let base = (position.row - 1) as usize * cols as usize;
    let offset = match mode {
        MappingMode::RowWise => position.col - 1,
        MappingMode::Snake => {
            if position.row % 2 == 1 {
                position.col - 1
            } else {
                cols - position.col
            }
        }
    };

    Ok(base + offset as usize)
}
