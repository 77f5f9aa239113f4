pub const GRID_COLUMNS: u8 = 4;
pub const GRID_ROWS: u8 = 3;

/// Swing direction required to cut a note, Beat Saber ids.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CutDirection {
    Up = 0,
    Down = 1,
    Left = 2,
    Right = 3,
    UpLeft = 4,
    UpRight = 5,
    DownLeft = 6,
    DownRight = 7,
    Any = 8,
}

// counter-clockwise from Right, 45 degrees apart
const COMPASS: [CutDirection; 8] = [
    CutDirection::Right,
    CutDirection::UpRight,
    CutDirection::Up,
    CutDirection::UpLeft,
    CutDirection::Left,
    CutDirection::DownLeft,
    CutDirection::Down,
    CutDirection::DownRight,
];

impl CutDirection {
    pub const fn id(self) -> u8 {
        self as u8
    }

    pub const fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::Up),
            1 => Some(Self::Down),
            2 => Some(Self::Left),
            3 => Some(Self::Right),
            4 => Some(Self::UpLeft),
            5 => Some(Self::UpRight),
            6 => Some(Self::DownLeft),
            7 => Some(Self::DownRight),
            8 => Some(Self::Any),
            _ => None,
        }
    }

    /// Nearest compass direction of a grid displacement, rows growing upward.
    pub fn from_displacement(columns: i32, rows: i32) -> Self {
        if columns == 0 && rows == 0 {
            return Self::Any;
        }
        let angle = f64::from(rows).atan2(f64::from(columns));
        let octant = (angle / std::f64::consts::FRAC_PI_4).round() as i32;
        COMPASS[octant.rem_euclid(8) as usize]
    }
}

/// Which saber a note belongs to, Beat Saber note `_type`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Saber {
    Left = 0,
    Right = 1,
}

impl Saber {
    /// Two left columns for the left saber
    pub const fn for_column(column: u8) -> Self {
        if column < GRID_COLUMNS / 2 {
            Self::Left
        } else {
            Self::Right
        }
    }

    pub const fn id(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GridNote {
    /// Beats since the start of the audio
    pub beat: f64,
    /// `_lineIndex`, 0 is the leftmost lane
    pub column: u8,
    /// `_lineLayer`, 0 is the bottom layer
    pub row: u8,
    pub direction: CutDirection,
}

impl GridNote {
    pub const fn new(beat: f64, column: u8, row: u8, direction: CutDirection) -> Self {
        Self {
            beat,
            column,
            row,
            direction,
        }
    }

    pub const fn cell(&self) -> (u8, u8) {
        (self.column, self.row)
    }

    pub const fn saber(&self) -> Saber {
        Saber::for_column(self.column)
    }
}
