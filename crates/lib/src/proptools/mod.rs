//! Property engine.
//!
//! Binds parsed build file properties onto typed property structs
//! ([`Unpacker`]), merges property structs with the append / prepend /
//! replace algebra ([`extend_properties`] and friends), and renders structs
//! back into property syntax ([`render_properties`]).

mod escape;
mod extend;
mod names;
mod render;
mod schema;
mod unpack;

use thiserror::Error;

use crate::parser::Pos;

pub use escape::{ninja_escape, ninja_escape_list, shell_escape, shell_escape_list};
pub use extend::{
  ExtendOptions, FilterArgs, Order, Origin, append_matching_properties, append_properties, extend_matching_properties,
  extend_properties, prepend_matching_properties, prepend_properties,
};
pub use names::{base_property_name, field_name_for_property, property_name_for_field};
pub use render::{render_properties, render_struct};
pub use schema::{
  DynProperties, Field, FieldKind, FieldMut, FieldRef, OptionalStruct, PropertyField, PropertyStruct, StructList, Tags,
  same_type, tag, walk_fields, walk_fields_mut,
};
pub use unpack::{UnpackOptions, Unpacker, unpack_properties};

/// Errors from unpacking or extending property structs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PropertyError {
  /// The input does not fit the property struct.
  #[error("{pos}: {message}")]
  Invalid { pos: Pos, property: String, message: String },

  /// The property struct shape cannot be handled at all.
  #[error("{pos}: {message}")]
  Unsupported { pos: Pos, property: String, message: String },

  /// A caller passed inconsistent values.
  #[error("{0}")]
  Internal(String),
}

impl PropertyError {
  pub fn invalid(pos: &Pos, property: impl Into<String>, message: impl Into<String>) -> Self {
    PropertyError::Invalid {
      pos: pos.clone(),
      property: property.into(),
      message: message.into(),
    }
  }

  pub fn unsupported(property: impl Into<String>, message: impl Into<String>) -> Self {
    PropertyError::Unsupported {
      pos: Pos::synthetic(),
      property: property.into(),
      message: message.into(),
    }
  }

  pub fn message(&self) -> &str {
    match self {
      PropertyError::Invalid { message, .. } | PropertyError::Unsupported { message, .. } => message,
      PropertyError::Internal(message) => message,
    }
  }
}
