//! Field name to property name mapping.

/// Convert a struct field name to its build file property name.
///
/// `CompileMultilib`, `Compile_multilib` and `compile_multilib` all map to
/// `compile_multilib`.
pub fn property_name_for_field(field: &str) -> String {
  let field = field.strip_prefix("r#").unwrap_or(field);
  let mut out = String::with_capacity(field.len() + 4);
  let mut prev: Option<char> = None;
  for c in field.chars() {
    if c.is_ascii_uppercase() {
      if let Some(p) = prev
        && p != '_'
        && (p.is_ascii_lowercase() || p.is_ascii_digit())
      {
        out.push('_');
      }
      out.push(c.to_ascii_lowercase());
    } else {
      out.push(c);
    }
    prev = Some(c);
  }
  out
}

/// Convert a property name to the exported field spelling (`compile_multilib`
/// becomes `Compile_multilib`).
pub fn field_name_for_property(property: &str) -> String {
  let mut chars = property.chars();
  match chars.next() {
    Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
    None => String::new(),
  }
}

/// Split a dotted property path into its last component.
pub fn base_property_name(path: &str) -> &str {
  path.rsplit('.').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn field_names_map_to_snake_case() {
    assert_eq!(property_name_for_field("CompileMultilib"), "compile_multilib");
    assert_eq!(property_name_for_field("Compile_multilib"), "compile_multilib");
    assert_eq!(property_name_for_field("compile_multilib"), "compile_multilib");
    assert_eq!(property_name_for_field("Srcs"), "srcs");
    assert_eq!(property_name_for_field("r#type"), "type");
    assert_eq!(property_name_for_field("Arm64"), "arm64");
  }

  #[test]
  fn property_names_map_back() {
    assert_eq!(field_name_for_property("compile_multilib"), "Compile_multilib");
    assert_eq!(field_name_for_property(""), "");
  }

  #[test]
  fn base_names() {
    assert_eq!(base_property_name("arch.arm.cflags"), "cflags");
    assert_eq!(base_property_name("srcs"), "srcs");
  }
}
