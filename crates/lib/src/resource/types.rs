use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Error parsing a `type[title]` reference.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceIdError {
  #[error("invalid resource reference '{0}': expected type[title]")]
  Malformed(String),

  #[error("invalid resource reference '{0}': type must not be empty")]
  EmptyType(String),

  #[error("invalid resource reference '{0}': title must not be empty")]
  EmptyTitle(String),
}

/// Identity of a resource: its type name and title.
///
/// Type names are case-insensitive and stored lowercase, so `Package[nginx]`
/// and `package[nginx]` name the same resource. Titles are kept verbatim.
///
/// Serialized as the string form `type[title]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId {
  pub kind: String,
  pub title: String,
}

impl ResourceId {
  pub fn new(kind: impl AsRef<str>, title: impl Into<String>) -> Self {
    Self {
      kind: kind.as_ref().trim().to_lowercase(),
      title: title.into(),
    }
  }
}

impl fmt::Display for ResourceId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}[{}]", self.kind, self.title)
  }
}

impl FromStr for ResourceId {
  type Err = ResourceIdError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let trimmed = s.trim();
    let (Some(open), true) = (trimmed.find('['), trimmed.ends_with(']')) else {
      return Err(ResourceIdError::Malformed(s.to_string()));
    };

    let kind = trimmed[..open].trim();
    let title = &trimmed[open + 1..trimmed.len() - 1];

    if kind.is_empty() {
      return Err(ResourceIdError::EmptyType(s.to_string()));
    }
    if title.is_empty() {
      return Err(ResourceIdError::EmptyTitle(s.to_string()));
    }

    Ok(ResourceId::new(kind, title))
  }
}

impl TryFrom<String> for ResourceId {
  type Error = ResourceIdError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<ResourceId> for String {
  fn from(id: ResourceId) -> Self {
    id.to_string()
  }
}

/// The kind of a [`Value`], used by attribute schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
  String,
  Bool,
  Int,
  List,
}

impl fmt::Display for ValueKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ValueKind::String => "string",
      ValueKind::Bool => "bool",
      ValueKind::Int => "int",
      ValueKind::List => "list of strings",
    };
    f.write_str(name)
  }
}

/// An attribute value.
///
/// Declaration files write these untagged: `true`, `42`, `"text"`, `["a", "b"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
  Bool(bool),
  Int(i64),
  String(String),
  List(Vec<String>),
}

impl Value {
  pub fn kind(&self) -> ValueKind {
    match self {
      Value::Bool(_) => ValueKind::Bool,
      Value::Int(_) => ValueKind::Int,
      Value::String(_) => ValueKind::String,
      Value::List(_) => ValueKind::List,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::String(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      Value::Bool(b) => Some(*b),
      _ => None,
    }
  }

  pub fn as_int(&self) -> Option<i64> {
    match self {
      Value::Int(n) => Some(*n),
      _ => None,
    }
  }

  pub fn as_list(&self) -> Option<&[String]> {
    match self {
      Value::List(items) => Some(items),
      _ => None,
    }
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Bool(b) => write!(f, "{}", b),
      Value::Int(n) => write!(f, "{}", n),
      Value::String(s) => write!(f, "{}", s),
      Value::List(items) => write!(f, "[{}]", items.join(", ")),
    }
  }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self {
    Value::String(s.to_string())
  }
}

impl From<String> for Value {
  fn from(s: String) -> Self {
    Value::String(s)
  }
}

impl From<bool> for Value {
  fn from(b: bool) -> Self {
    Value::Bool(b)
  }
}

impl From<i64> for Value {
  fn from(n: i64) -> Self {
    Value::Int(n)
  }
}

impl From<Vec<String>> for Value {
  fn from(items: Vec<String>) -> Self {
    Value::List(items)
  }
}

/// Which relationship attribute an edge was declared through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationshipKind {
  /// `before: X`: this resource converges before X.
  Before,
  /// `require: X`: X converges before this resource.
  Require,
  /// `notify: X`: like `before`, and X is refreshed when this resource changes.
  Notify,
  /// `subscribe: X`: like `require`, and this resource is refreshed when X changes.
  Subscribe,
}

impl fmt::Display for RelationshipKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      RelationshipKind::Before => "before",
      RelationshipKind::Require => "require",
      RelationshipKind::Notify => "notify",
      RelationshipKind::Subscribe => "subscribe",
    };
    f.write_str(name)
  }
}

/// Relationship attributes of a resource.
///
/// Each entry may be written as a single reference or a list of references.
/// References are not checked for existence until catalog compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Relationships {
  #[serde(deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
  pub before: Vec<ResourceId>,
  #[serde(deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
  pub require: Vec<ResourceId>,
  #[serde(deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
  pub notify: Vec<ResourceId>,
  #[serde(deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
  pub subscribe: Vec<ResourceId>,
}

impl Relationships {
  /// Iterate all references along with the attribute they came from.
  pub fn iter(&self) -> impl Iterator<Item = (RelationshipKind, &ResourceId)> {
    (self.before.iter().map(|id| (RelationshipKind::Before, id)))
      .chain(self.require.iter().map(|id| (RelationshipKind::Require, id)))
      .chain(self.notify.iter().map(|id| (RelationshipKind::Notify, id)))
      .chain(self.subscribe.iter().map(|id| (RelationshipKind::Subscribe, id)))
  }

  pub fn is_empty(&self) -> bool {
    self.before.is_empty() && self.require.is_empty() && self.notify.is_empty() && self.subscribe.is_empty()
  }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<ResourceId>, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum OneOrMany {
    One(ResourceId),
    Many(Vec<ResourceId>),
  }

  Ok(match OneOrMany::deserialize(deserializer)? {
    OneOrMany::One(id) => vec![id],
    OneOrMany::Many(ids) => ids,
  })
}

/// A declared desired-state unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
  pub id: ResourceId,
  pub attributes: BTreeMap<String, Value>,
  pub relationships: Relationships,
}

impl Resource {
  pub fn new(kind: impl AsRef<str>, title: impl Into<String>) -> Self {
    Self {
      id: ResourceId::new(kind, title),
      attributes: BTreeMap::new(),
      relationships: Relationships::default(),
    }
  }

  pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
    self.attributes.insert(name.into(), value.into());
    self
  }

  pub fn before(mut self, target: ResourceId) -> Self {
    self.relationships.before.push(target);
    self
  }

  pub fn require(mut self, target: ResourceId) -> Self {
    self.relationships.require.push(target);
    self
  }

  pub fn notify(mut self, target: ResourceId) -> Self {
    self.relationships.notify.push(target);
    self
  }

  pub fn subscribe(mut self, target: ResourceId) -> Self {
    self.relationships.subscribe.push(target);
    self
  }

  pub fn title(&self) -> &str {
    &self.id.title
  }

  pub fn attr(&self, name: &str) -> Option<&Value> {
    self.attributes.get(name)
  }

  pub fn attr_str(&self, name: &str) -> Option<&str> {
    self.attr(name).and_then(Value::as_str)
  }

  pub fn attr_bool(&self, name: &str) -> Option<bool> {
    self.attr(name).and_then(Value::as_bool)
  }
}
