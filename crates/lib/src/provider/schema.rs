//! Attribute schemas.
//!
//! Declared attributes are untyped until they reach a provider. Each provider
//! publishes an [`AttributeSchema`] so the catalog compiler can reject unknown
//! attributes, wrong value kinds and missing required attributes before any
//! provider touches the system.

use thiserror::Error;

use crate::resource::{Resource, Value, ValueKind};

/// Why a resource's attributes were rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
  #[error("unknown attribute '{attribute}'")]
  Unknown { attribute: String },

  #[error("attribute '{attribute}' must be a {expected}, got {found}")]
  WrongKind {
    attribute: String,
    expected: ValueKind,
    found: ValueKind,
  },

  #[error("attribute '{attribute}' must be one of [{}], got '{value}'", allowed.join(", "))]
  NotAllowed {
    attribute: String,
    value: String,
    allowed: Vec<String>,
  },

  #[error("missing required attribute '{attribute}'")]
  Missing { attribute: String },

  #[error("attribute '{attribute}' is invalid: {message}")]
  Invalid { attribute: String, message: String },
}

/// One accepted attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSpec {
  pub name: &'static str,
  pub kind: ValueKind,
  pub required: bool,
  /// Permitted string values; empty means any.
  pub allowed: &'static [&'static str],
  /// A string attribute that also takes an unquoted integer, such as `mode: 644`.
  pub accepts_int: bool,
}

impl AttributeSpec {
  fn accepts(&self, kind: ValueKind) -> bool {
    kind == self.kind || (self.accepts_int && self.kind == ValueKind::String && kind == ValueKind::Int)
  }
}

/// The set of attributes a provider accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeSchema {
  specs: Vec<AttributeSpec>,
}

impl AttributeSchema {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn required(mut self, name: &'static str, kind: ValueKind) -> Self {
    self.specs.push(AttributeSpec {
      name,
      kind,
      required: true,
      allowed: &[],
      accepts_int: false,
    });
    self
  }

  pub fn optional(mut self, name: &'static str, kind: ValueKind) -> Self {
    self.specs.push(AttributeSpec {
      name,
      kind,
      required: false,
      allowed: &[],
      accepts_int: false,
    });
    self
  }

  /// An optional string attribute restricted to `allowed`.
  pub fn one_of(mut self, name: &'static str, allowed: &'static [&'static str]) -> Self {
    self.specs.push(AttributeSpec {
      name,
      kind: ValueKind::String,
      required: false,
      allowed,
      accepts_int: false,
    });
    self
  }

  /// An optional string attribute that also accepts an integer written
  /// without quotes.
  pub fn optional_numeric_string(mut self, name: &'static str) -> Self {
    self.specs.push(AttributeSpec {
      name,
      kind: ValueKind::String,
      required: false,
      allowed: &[],
      accepts_int: true,
    });
    self
  }

  pub fn get(&self, name: &str) -> Option<&AttributeSpec> {
    self.specs.iter().find(|spec| spec.name == name)
  }

  pub fn specs(&self) -> &[AttributeSpec] {
    &self.specs
  }

  /// Check every attribute of `resource` against this schema.
  ///
  /// Attributes are checked in name order, then required attributes, so the
  /// first reported error is stable.
  pub fn validate(&self, resource: &Resource) -> Result<(), SchemaError> {
    for (name, value) in &resource.attributes {
      let spec = self.get(name).ok_or_else(|| SchemaError::Unknown {
        attribute: name.clone(),
      })?;

      if !spec.accepts(value.kind()) {
        return Err(SchemaError::WrongKind {
          attribute: name.clone(),
          expected: spec.kind,
          found: value.kind(),
        });
      }

      if let Value::String(s) = value
        && !spec.allowed.is_empty()
        && !spec.allowed.contains(&s.as_str())
      {
        return Err(SchemaError::NotAllowed {
          attribute: name.clone(),
          value: s.clone(),
          allowed: spec.allowed.iter().map(ToString::to_string).collect(),
        });
      }
    }

    for spec in self.specs.iter().filter(|spec| spec.required) {
      if !resource.attributes.contains_key(spec.name) {
        return Err(SchemaError::Missing {
          attribute: spec.name.to_string(),
        });
      }
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn schema() -> AttributeSchema {
    AttributeSchema::new()
      .required("command", ValueKind::String)
      .optional("timeout", ValueKind::Int)
      .one_of("ensure", &["present", "absent"])
  }

  #[test]
  fn accepts_valid_attributes() {
    let resource = Resource::new("exec", "x")
      .with_attr("command", "true")
      .with_attr("timeout", 30i64)
      .with_attr("ensure", "present");
    assert_eq!(schema().validate(&resource), Ok(()));
  }

  #[test]
  fn rejects_unknown_attribute() {
    let resource = Resource::new("exec", "x")
      .with_attr("command", "true")
      .with_attr("comand", "typo");
    assert_eq!(
      schema().validate(&resource),
      Err(SchemaError::Unknown {
        attribute: "comand".to_string()
      })
    );
  }

  #[test]
  fn rejects_wrong_kind() {
    let resource = Resource::new("exec", "x")
      .with_attr("command", "true")
      .with_attr("timeout", "30");
    let err = schema().validate(&resource).unwrap_err();
    assert_eq!(
      err,
      SchemaError::WrongKind {
        attribute: "timeout".to_string(),
        expected: ValueKind::Int,
        found: ValueKind::String,
      }
    );
    assert_eq!(err.to_string(), "attribute 'timeout' must be a int, got string");
  }

  #[test]
  fn rejects_value_outside_allowed_set() {
    let resource = Resource::new("exec", "x")
      .with_attr("command", "true")
      .with_attr("ensure", "installed");
    let err = schema().validate(&resource).unwrap_err();
    assert_eq!(
      err.to_string(),
      "attribute 'ensure' must be one of [present, absent], got 'installed'"
    );
  }

  #[test]
  fn int_only_accepted_where_declared() {
    let schema = AttributeSchema::new()
      .optional_numeric_string("mode")
      .optional("owner", ValueKind::String);

    let numeric = Resource::new("file", "/x").with_attr("mode", 644i64);
    assert_eq!(schema.validate(&numeric), Ok(()));

    let owner = Resource::new("file", "/x").with_attr("owner", 0i64);
    assert!(matches!(
      schema.validate(&owner),
      Err(SchemaError::WrongKind { ref attribute, .. }) if attribute == "owner"
    ));
  }

  #[test]
  fn rejects_missing_required() {
    let resource = Resource::new("exec", "x");
    assert_eq!(
      schema().validate(&resource),
      Err(SchemaError::Missing {
        attribute: "command".to_string()
      })
    );
  }
}
