//! Command model and line formatting for the subset of G-code the controller
//! emits. Tokens come from the configured mnemonic table, so the same command
//! model can drive firmwares that disagree on the literal codes.

use std::cell::Cell;
use std::fmt::{self, Display, Formatter};

use indexmap::IndexMap;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn letter(self) -> char {
        match self {
            Axis::X => 'X',
            Axis::Y => 'Y',
            Axis::Z => 'Z',
        }
    }

    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    pub fn from_letter(letter: char) -> Option<Axis> {
        match letter.to_ascii_uppercase() {
            'X' => Some(Axis::X),
            'Y' => Some(Axis::Y),
            'Z' => Some(Axis::Z),
            _ => None,
        }
    }
}

/// Parses an axis-set argument like `"XZ"`. Duplicate letters collapse;
/// anything outside XYZ is rejected with the offending character.
pub fn parse_axis_set(letters: &str) -> Result<Vec<Axis>, char> {
    let mut axes = Vec::new();
    for letter in letters.chars() {
        match Axis::from_letter(letter) {
            Some(axis) => {
                if !axes.contains(&axis) {
                    axes.push(axis);
                }
            }
            None => return Err(letter),
        }
    }
    Ok(axes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plane {
    XY,
    ZX,
    YZ,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Millimeter,
    Inch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateMode {
    Absolute,
    Incremental,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Clockwise,
    Counterclockwise,
}

/// (axis, value) pairs making up the coordinate words of one command.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisValues(pub Vec<(Axis, f64)>);

/// One line of G-code, before rendering against a mnemonic table.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Move {
        position: AxisValues,
        feedrate: Option<f64>,
    },
    ArcMove {
        orientation: Orientation,
        position: AxisValues,
        radius: f64,
        feedrate: Option<f64>,
    },
    Home(Vec<Axis>),
    SetCoordinateMode(CoordinateMode),
    SetUnits(Unit),
    SetPlane(Plane),
    SetFeedrate(f64),
    EnableMotors(Vec<Axis>),
    DisableMotors(Vec<Axis>),
    InfoRequest,
}

/// Symbolic names the controller looks up in the mnemonic table.
pub mod mnemonic {
    pub const LINEAR_MOVE: &str = "LINEAR_MOVE";
    pub const ARC_CW: &str = "ARC_CW";
    pub const ARC_CCW: &str = "ARC_CCW";
    pub const AUTO_HOME: &str = "AUTO_HOME";
    pub const SET_ABS: &str = "SET_ABS";
    pub const SET_REL: &str = "SET_REL";
    pub const SET_UNITS_MM: &str = "SET_UNITS_MM";
    pub const SET_UNITS_INCH: &str = "SET_UNITS_INCH";
    pub const SET_XY_PLANE: &str = "SET_XY_PLANE";
    pub const SET_ZX_PLANE: &str = "SET_ZX_PLANE";
    pub const SET_YZ_PLANE: &str = "SET_YZ_PLANE";
    pub const ENABLE_MOTORS: &str = "ENABLE_MOTORS";
    pub const DISABLE_MOTORS: &str = "DISABLE_MOTORS";
    pub const GET_INFO: &str = "GET_INFO";

    /// Every name the controller can emit; config load refuses tables that
    /// lack any of these.
    pub const REQUIRED: [&str; 14] = [
        LINEAR_MOVE,
        ARC_CW,
        ARC_CCW,
        AUTO_HOME,
        SET_ABS,
        SET_REL,
        SET_UNITS_MM,
        SET_UNITS_INCH,
        SET_XY_PLANE,
        SET_ZX_PLANE,
        SET_YZ_PLANE,
        ENABLE_MOTORS,
        DISABLE_MOTORS,
        GET_INFO,
    ];
}

/// Mnemonic name to literal G-code token, in file order.
#[derive(Debug, Clone, Deserialize)]
pub struct GcodeTable(pub IndexMap<String, String>);

impl GcodeTable {
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn token(&self, name: &str) -> &str {
        // Presence of every REQUIRED mnemonic is checked at config load.
        self.0
            .get(name)
            .map(String::as_str)
            .expect("mnemonic missing from validated table")
    }
}

/// Renders one `Command` as a single space-separated G-code line.
/// Coordinates use `float_digits` decimals; feedrates print as plain numbers.
pub struct LineFormatter<'a> {
    pub table: &'a GcodeTable,
    pub float_digits: usize,
    pub command: &'a Command,
}

impl Display for LineFormatter<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let needs_preceding_space = Cell::new(false);
        macro_rules! write_word {
            ($($tokens:tt)*) => {
                {
                    if needs_preceding_space.replace(true) {
                        write!(f, " ")?;
                    }
                    write!(f, $($tokens)*)?
                }
            }
        }
        let digits = self.float_digits;
        let write_axes = |f: &mut Formatter<'_>, values: &AxisValues| -> fmt::Result {
            for (axis, value) in &values.0 {
                if needs_preceding_space.replace(true) {
                    write!(f, " ")?;
                }
                write!(f, "{}{:.*}", axis.letter(), digits, value)?;
            }
            Ok(())
        };
        match self.command {
            Command::Move { position, feedrate } => {
                write_word!("{}", self.table.token(mnemonic::LINEAR_MOVE));
                write_axes(f, position)?;
                if let Some(feedrate) = feedrate {
                    write_word!("F{}", feedrate);
                }
            }
            Command::ArcMove {
                orientation,
                position,
                radius,
                feedrate,
            } => {
                let name = match orientation {
                    Orientation::Clockwise => mnemonic::ARC_CW,
                    Orientation::Counterclockwise => mnemonic::ARC_CCW,
                };
                write_word!("{}", self.table.token(name));
                write_axes(f, position)?;
                write_word!("R{:.*}", digits, radius);
                if let Some(feedrate) = feedrate {
                    write_word!("F{}", feedrate);
                }
            }
            Command::Home(axes) => {
                write_word!("{}", self.table.token(mnemonic::AUTO_HOME));
                for axis in axes {
                    write_word!("{}", axis.letter());
                }
            }
            Command::SetCoordinateMode(CoordinateMode::Absolute) => {
                write_word!("{}", self.table.token(mnemonic::SET_ABS));
            }
            Command::SetCoordinateMode(CoordinateMode::Incremental) => {
                write_word!("{}", self.table.token(mnemonic::SET_REL));
            }
            Command::SetUnits(Unit::Millimeter) => {
                write_word!("{}", self.table.token(mnemonic::SET_UNITS_MM));
            }
            Command::SetUnits(Unit::Inch) => {
                write_word!("{}", self.table.token(mnemonic::SET_UNITS_INCH));
            }
            Command::SetPlane(Plane::XY) => {
                write_word!("{}", self.table.token(mnemonic::SET_XY_PLANE));
            }
            Command::SetPlane(Plane::ZX) => {
                write_word!("{}", self.table.token(mnemonic::SET_ZX_PLANE));
            }
            Command::SetPlane(Plane::YZ) => {
                write_word!("{}", self.table.token(mnemonic::SET_YZ_PLANE));
            }
            Command::SetFeedrate(feedrate) => {
                write_word!("{}", self.table.token(mnemonic::LINEAR_MOVE));
                write_word!("F{}", feedrate);
            }
            Command::EnableMotors(axes) => {
                write_word!("{}", self.table.token(mnemonic::ENABLE_MOTORS));
                for axis in axes {
                    write_word!("{}", axis.letter());
                }
            }
            Command::DisableMotors(axes) => {
                write_word!("{}", self.table.token(mnemonic::DISABLE_MOTORS));
                for axis in axes {
                    write_word!("{}", axis.letter());
                }
            }
            Command::InfoRequest => {
                write_word!("{}", self.table.token(mnemonic::GET_INFO));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use {super::*, std::string::ToString};

    fn default_table() -> GcodeTable {
        let pairs = [
            (mnemonic::LINEAR_MOVE, "G0"),
            (mnemonic::ARC_CW, "G2"),
            (mnemonic::ARC_CCW, "G3"),
            (mnemonic::AUTO_HOME, "G28"),
            (mnemonic::SET_ABS, "G90"),
            (mnemonic::SET_REL, "G91"),
            (mnemonic::SET_UNITS_MM, "G21"),
            (mnemonic::SET_UNITS_INCH, "G20"),
            (mnemonic::SET_XY_PLANE, "G17"),
            (mnemonic::SET_ZX_PLANE, "G18"),
            (mnemonic::SET_YZ_PLANE, "G19"),
            (mnemonic::ENABLE_MOTORS, "M17"),
            (mnemonic::DISABLE_MOTORS, "M18"),
            (mnemonic::GET_INFO, "M115"),
        ];
        GcodeTable(
            pairs
                .iter()
                .map(|(name, token)| (name.to_string(), token.to_string()))
                .collect(),
        )
    }

    fn line_to_string(command: &Command) -> String {
        LineFormatter {
            table: &default_table(),
            float_digits: 3,
            command,
        }
        .to_string()
    }

    #[test]
    fn test_simple_move() {
        let command = Command::Move {
            position: AxisValues(vec![(Axis::X, 5.0)]),
            feedrate: None,
        };
        assert_eq!(line_to_string(&command), "G0 X5.000");
    }

    #[test]
    fn test_move_with_feedrate() {
        let command = Command::Move {
            position: AxisValues(vec![(Axis::X, 5.0), (Axis::Y, 12.5)]),
            feedrate: Some(1000.0),
        };
        assert_eq!(line_to_string(&command), "G0 X5.000 Y12.500 F1000");
    }

    #[test]
    fn test_fractional_feedrate() {
        let command = Command::SetFeedrate(1512.5);
        assert_eq!(line_to_string(&command), "G0 F1512.5");
    }

    #[test]
    fn test_arc_move() {
        let command = Command::ArcMove {
            orientation: Orientation::Counterclockwise,
            position: AxisValues(vec![(Axis::X, 100.0), (Axis::Y, 60.0), (Axis::Z, 20.0)]),
            radius: 50.0,
            feedrate: None,
        };
        assert_eq!(line_to_string(&command), "G3 X100.000 Y60.000 Z20.000 R50.000");
    }

    #[test]
    fn test_home_subset() {
        assert_eq!(line_to_string(&Command::Home(vec![Axis::X, Axis::Z])), "G28 X Z");
        assert_eq!(line_to_string(&Command::Home(Axis::ALL.to_vec())), "G28 X Y Z");
    }

    #[test]
    fn test_modals() {
        assert_eq!(
            line_to_string(&Command::SetCoordinateMode(CoordinateMode::Incremental)),
            "G91"
        );
        assert_eq!(line_to_string(&Command::SetUnits(Unit::Inch)), "G20");
        assert_eq!(line_to_string(&Command::SetPlane(Plane::ZX)), "G18");
        assert_eq!(line_to_string(&Command::InfoRequest), "M115");
    }

    #[test]
    fn test_motor_commands() {
        assert_eq!(
            line_to_string(&Command::EnableMotors(vec![Axis::X, Axis::Y])),
            "M17 X Y"
        );
        assert_eq!(
            line_to_string(&Command::DisableMotors(Axis::ALL.to_vec())),
            "M18 X Y Z"
        );
    }

    #[test]
    fn test_axis_set_parsing() {
        assert_eq!(parse_axis_set("xz"), Ok(vec![Axis::X, Axis::Z]));
        assert_eq!(parse_axis_set("XXY"), Ok(vec![Axis::X, Axis::Y]));
        assert_eq!(parse_axis_set(""), Ok(vec![]));
        assert_eq!(parse_axis_set("XQ"), Err('Q'));
    }
}
