//! Cell adjacency rules used when grouping patches and networks.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

const FOUR: [(isize, isize); 4] = [(-1, 0), (0, -1), (0, 1), (1, 0)];
const EIGHT: [(isize, isize); 8] = [
    (-1, -1), (-1, 0), (-1, 1),
    ( 0, -1),          ( 0, 1),
    ( 1, -1), ( 1, 0), ( 1, 1),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "NeighbourhoodRepr", into = "u8")]
pub enum Neighbourhood {
    /// Edge-sharing cells only.
    Four,
    /// Edge- or corner-sharing cells.
    #[default]
    Eight,
}

impl Neighbourhood {
    pub fn offsets(self) -> &'static [(isize, isize)] {
        match self {
            Neighbourhood::Four => &FOUR,
            Neighbourhood::Eight => &EIGHT,
        }
    }

    pub fn cells(self) -> u8 {
        match self {
            Neighbourhood::Four => 4,
            Neighbourhood::Eight => 8,
        }
    }
}

impl fmt::Display for Neighbourhood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cells())
    }
}

impl FromStr for Neighbourhood {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "4" | "four" => Ok(Neighbourhood::Four),
            "8" | "eight" => Ok(Neighbourhood::Eight),
            other => Err(Error::param("neighbourhood", format!("expected 4 or 8, got `{other}`"))),
        }
    }
}

impl From<Neighbourhood> for u8 {
    fn from(n: Neighbourhood) -> u8 {
        n.cells()
    }
}

// Config files may say `8` or `"eight"`.
#[derive(Deserialize)]
#[serde(untagged)]
enum NeighbourhoodRepr {
    Number(u8),
    Name(String),
}

impl TryFrom<NeighbourhoodRepr> for Neighbourhood {
    type Error = Error;

    fn try_from(repr: NeighbourhoodRepr) -> Result<Self, Self::Error> {
        match repr {
            NeighbourhoodRepr::Number(n) => n.to_string().parse(),
            NeighbourhoodRepr::Name(s) => s.parse(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numbers_and_names() {
        assert_eq!("4".parse::<Neighbourhood>().unwrap(), Neighbourhood::Four);
        assert_eq!("Eight".parse::<Neighbourhood>().unwrap(), Neighbourhood::Eight);
        assert!("6".parse::<Neighbourhood>().is_err());
    }

    #[test]
    fn serde_accepts_both_forms() {
        let n: Neighbourhood = serde_json::from_str("4").unwrap();
        assert_eq!(n, Neighbourhood::Four);
        let n: Neighbourhood = serde_json::from_str("\"eight\"").unwrap();
        assert_eq!(n, Neighbourhood::Eight);
        assert_eq!(serde_json::to_string(&Neighbourhood::Four).unwrap(), "4");
    }

    #[test]
    fn offsets_have_expected_sizes() {
        assert_eq!(Neighbourhood::Four.offsets().len(), 4);
        assert_eq!(Neighbourhood::Eight.offsets().len(), 8);
        assert_eq!(Neighbourhood::default(), Neighbourhood::Eight);
    }
}
