// src/slots/types.rs

//! Slot descriptors and values

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Owner of a slot definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotOwner {
    ActionType,
    Package,
}

impl SlotOwner {
    pub fn as_i32(self) -> i32 {
        match self {
            SlotOwner::ActionType => 1,
            SlotOwner::Package => 2,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(SlotOwner::ActionType),
            2 => Some(SlotOwner::Package),
            _ => None,
        }
    }
}

/// Kind of instance a slot value is stored against
///
/// Actions instantiate action types; sub-packages instantiate packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotInstance {
    Action,
    SubPackage,
}

impl SlotInstance {
    pub fn as_i32(self) -> i32 {
        match self {
            SlotInstance::Action => 1,
            SlotInstance::SubPackage => 2,
        }
    }

    /// The kind of owner whose slots this instance carries
    pub fn owner(self) -> SlotOwner {
        match self {
            SlotInstance::Action => SlotOwner::ActionType,
            SlotInstance::SubPackage => SlotOwner::Package,
        }
    }
}

/// Value type of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotType {
    FileGroup,
    Boolean,
    Integer,
    Text,
    Enumeration,
    Directory,
    File,
}

impl SlotType {
    pub fn as_i32(self) -> i32 {
        match self {
            SlotType::FileGroup => 1,
            SlotType::Boolean => 2,
            SlotType::Integer => 3,
            SlotType::Text => 4,
            SlotType::Enumeration => 5,
            SlotType::Directory => 6,
            SlotType::File => 7,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(SlotType::FileGroup),
            2 => Some(SlotType::Boolean),
            3 => Some(SlotType::Integer),
            4 => Some(SlotType::Text),
            5 => Some(SlotType::Enumeration),
            6 => Some(SlotType::Directory),
            7 => Some(SlotType::File),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SlotType::FileGroup => "file-group",
            SlotType::Boolean => "boolean",
            SlotType::Integer => "integer",
            SlotType::Text => "text",
            SlotType::Enumeration => "enumeration",
            SlotType::Directory => "directory",
            SlotType::File => "file",
        }
    }
}

impl fmt::Display for SlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SlotType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "file-group" => Ok(SlotType::FileGroup),
            "boolean" => Ok(SlotType::Boolean),
            "integer" => Ok(SlotType::Integer),
            "text" => Ok(SlotType::Text),
            "enumeration" => Ok(SlotType::Enumeration),
            "directory" => Ok(SlotType::Directory),
            "file" => Ok(SlotType::File),
            _ => Err(Error::BadValue(format!("invalid slot type: {}", s))),
        }
    }
}

/// Position of a slot relative to its owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotPos {
    Input,
    Output,
    Parameter,
    Local,
}

impl SlotPos {
    pub fn as_i32(self) -> i32 {
        match self {
            SlotPos::Input => 1,
            SlotPos::Output => 2,
            SlotPos::Parameter => 3,
            SlotPos::Local => 4,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(SlotPos::Input),
            2 => Some(SlotPos::Output),
            3 => Some(SlotPos::Parameter),
            4 => Some(SlotPos::Local),
            _ => None,
        }
    }
}

/// Cardinality of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotCard {
    Optional,
    Required,
    Multi,
}

impl SlotCard {
    pub fn as_i32(self) -> i32 {
        match self {
            SlotCard::Optional => 1,
            SlotCard::Required => 2,
            SlotCard::Multi => 3,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(SlotCard::Optional),
            2 => Some(SlotCard::Required),
            3 => Some(SlotCard::Multi),
            _ => None,
        }
    }
}

/// A typed slot value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotValue {
    FileGroup(i32),
    Boolean(bool),
    Integer(i32),
    Text(String),
    Enumeration(String),
    Directory(i32),
    File(i32),
}

impl SlotValue {
    pub fn slot_type(&self) -> SlotType {
        match self {
            SlotValue::FileGroup(_) => SlotType::FileGroup,
            SlotValue::Boolean(_) => SlotType::Boolean,
            SlotValue::Integer(_) => SlotType::Integer,
            SlotValue::Text(_) => SlotType::Text,
            SlotValue::Enumeration(_) => SlotType::Enumeration,
            SlotValue::Directory(_) => SlotType::Directory,
            SlotValue::File(_) => SlotType::File,
        }
    }

    /// Text form kept in the store
    pub fn to_stored(&self) -> String {
        match self {
            SlotValue::FileGroup(id) | SlotValue::Directory(id) | SlotValue::File(id) => {
                id.to_string()
            }
            SlotValue::Boolean(b) => if *b { "1" } else { "0" }.to_string(),
            SlotValue::Integer(n) => n.to_string(),
            SlotValue::Text(s) | SlotValue::Enumeration(s) => s.clone(),
        }
    }

    /// Parse the stored text form of a value of type `slot_type`
    pub fn from_stored(slot_type: SlotType, stored: &str) -> Result<Self> {
        let id = || {
            stored
                .parse::<i32>()
                .map_err(|_| Error::Corrupt(format!("stored {} value '{}'", slot_type, stored)))
        };
        Ok(match slot_type {
            SlotType::FileGroup => SlotValue::FileGroup(id()?),
            SlotType::Directory => SlotValue::Directory(id()?),
            SlotType::File => SlotValue::File(id()?),
            SlotType::Integer => SlotValue::Integer(id()?),
            SlotType::Boolean => match stored {
                "1" => SlotValue::Boolean(true),
                "0" => SlotValue::Boolean(false),
                _ => {
                    return Err(Error::Corrupt(format!("stored boolean value '{}'", stored)));
                }
            },
            SlotType::Text => SlotValue::Text(stored.to_string()),
            SlotType::Enumeration => SlotValue::Enumeration(stored.to_string()),
        })
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SlotValue::Text(s) | SlotValue::Enumeration(s) => Some(s),
            _ => None,
        }
    }

    /// Path, group or integer payload
    pub fn as_id(&self) -> Option<i32> {
        match self {
            SlotValue::FileGroup(id)
            | SlotValue::Directory(id)
            | SlotValue::File(id)
            | SlotValue::Integer(id) => Some(*id),
            _ => None,
        }
    }
}

/// Everything known about a slot definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotDetails {
    pub id: i32,
    pub owner: SlotOwner,
    pub owner_id: i32,
    pub name: String,
    pub description: String,
    pub slot_type: SlotType,
    pub pos: SlotPos,
    pub card: SlotCard,
    pub default_value: Option<SlotValue>,
    pub enum_values: Vec<String>,
}

/// Parameters for defining a new slot
#[derive(Debug, Clone)]
pub struct NewSlot {
    pub name: String,
    pub description: String,
    pub slot_type: SlotType,
    pub pos: SlotPos,
    pub card: SlotCard,
    pub default_value: Option<SlotValue>,
    pub enum_values: Vec<String>,
}

impl NewSlot {
    pub fn new(name: impl Into<String>, slot_type: SlotType, pos: SlotPos) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            slot_type,
            pos,
            card: SlotCard::Optional,
            default_value: None,
            enum_values: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn card(mut self, card: SlotCard) -> Self {
        self.card = card;
        self
    }

    pub fn default_value(mut self, value: SlotValue) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn enum_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = values.into_iter().map(Into::into).collect();
        self
    }
}

/// Slot names start with a letter and continue with letters, digits or `_`
pub fn is_valid_slot_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
