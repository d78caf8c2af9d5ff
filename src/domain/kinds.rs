//! Closed enumerations used by the aggregates

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::DomainError;

/// Sex of a person
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    Male,
    Female,
    #[default]
    Unknown,
}

impl Sex {
    /// GEDCOM `SEX` letter
    pub fn gedcom_code(&self) -> &'static str {
        match self {
            Sex::Male => "M",
            Sex::Female => "F",
            Sex::Unknown => "U",
        }
    }
}

impl FromStr for Sex {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" | "m" => Ok(Sex::Male),
            "female" | "f" => Ok(Sex::Female),
            "unknown" | "u" => Ok(Sex::Unknown),
            _ => Err(DomainError::invalid_enumeration("sex", s)),
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sex::Male => write!(f, "male"),
            Sex::Female => write!(f, "female"),
            Sex::Unknown => write!(f, "unknown"),
        }
    }
}

/// Kind of union a family represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Marriage,
    Partnership,
    #[default]
    Unknown,
}

impl FromStr for RelationshipType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "marriage" => Ok(RelationshipType::Marriage),
            "partnership" => Ok(RelationshipType::Partnership),
            "unknown" => Ok(RelationshipType::Unknown),
            _ => Err(DomainError::invalid_enumeration("relationship_type", s)),
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationshipType::Marriage => write!(f, "marriage"),
            RelationshipType::Partnership => write!(f, "partnership"),
            RelationshipType::Unknown => write!(f, "unknown"),
        }
    }
}
