//! PostgreSQL roles via `psql`, run as the `postgres` system user.
//!
//! Attributes:
//! - `ensure`: `present` (default) or `absent`
//! - `login`, `superuser`, `createdb`: role flags; unset flags are left alone
//! - `password`: set when the role is created; never compared afterwards

use std::sync::Arc;

use tracing::info;

use super::{ApplyOutcome, AttributeSchema, CommandOutput, CommandRunner, CommandSpec, Provider, ProviderError, State};
use crate::resource::{Resource, ValueKind};

/// Role flags in `pg_roles` column order, with their `CREATE ROLE` keywords.
const FLAGS: &[(&str, &str, &str)] = &[
  ("login", "LOGIN", "NOLOGIN"),
  ("superuser", "SUPERUSER", "NOSUPERUSER"),
  ("createdb", "CREATEDB", "NOCREATEDB"),
];

pub struct RoleProvider {
  runner: Arc<dyn CommandRunner>,
  schema: AttributeSchema,
}

fn quote_ident(name: &str) -> String {
  format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_literal(value: &str) -> String {
  format!("'{}'", value.replace('\'', "''"))
}

impl RoleProvider {
  pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
    Self {
      runner,
      schema: AttributeSchema::new()
        .one_of("ensure", &["present", "absent"])
        .optional("login", ValueKind::Bool)
        .optional("superuser", ValueKind::Bool)
        .optional("createdb", ValueKind::Bool)
        .optional("password", ValueKind::String),
    }
  }

  fn wants_present(resource: &Resource) -> bool {
    resource.attr_str("ensure") != Some("absent")
  }

  fn psql(&self, sql: &str) -> Result<CommandOutput, ProviderError> {
    let spec = CommandSpec::new("runuser").args(["-u", "postgres", "--", "psql", "-X", "-tA", "-c", sql]);
    self.runner.run_checked(&spec)
  }

  /// `WITH` options for every declared flag that differs from `current`.
  fn options(resource: &Resource, current: &State) -> Vec<String> {
    FLAGS
      .iter()
      .filter_map(|(name, on, off)| {
        let wanted = resource.attr_bool(name)?;
        (current.get_bool(name) != Some(wanted)).then(|| if wanted { on } else { off }.to_string())
      })
      .collect()
  }
}

impl Provider for RoleProvider {
  fn schema(&self) -> &AttributeSchema {
    &self.schema
  }

  fn read_current_state(&self, resource: &Resource) -> Result<State, ProviderError> {
    let sql = format!(
      "SELECT rolcanlogin, rolsuper, rolcreatedb FROM pg_roles WHERE rolname = {}",
      quote_literal(resource.title())
    );
    let output = self.psql(&sql)?;

    if output.stdout.is_empty() {
      return Ok(State::absent());
    }

    let columns: Vec<&str> = output.stdout.trim().split('|').collect();
    if columns.len() != FLAGS.len() {
      return Err(ProviderError::UnexpectedOutput {
        cmd: sql,
        output: output.stdout,
      });
    }

    let mut state = State::present();
    for ((name, _, _), column) in FLAGS.iter().zip(columns) {
      state = state.with(*name, column == "t");
    }
    Ok(state)
  }

  fn is_in_sync(&self, resource: &Resource, state: &State) -> bool {
    if !Self::wants_present(resource) {
      return !state.exists;
    }
    state.exists && Self::options(resource, state).is_empty()
  }

  fn apply(&self, resource: &Resource) -> Result<ApplyOutcome, ProviderError> {
    let role = quote_ident(resource.title());
    let current = self.read_current_state(resource)?;

    if !Self::wants_present(resource) {
      info!(role = resource.title(), "dropping role");
      self.psql(&format!("DROP ROLE IF EXISTS {}", role))?;
      return Ok(ApplyOutcome::new("dropped"));
    }

    if current.exists {
      let options = Self::options(resource, &current);
      info!(role = resource.title(), options = %options.join(" "), "altering role");
      self.psql(&format!("ALTER ROLE {} WITH {}", role, options.join(" ")))?;
      return Ok(ApplyOutcome::new(format!("altered ({})", options.join(" "))));
    }

    // A fresh role starts from the server defaults, so every declared flag is spelled out
    let mut options = Self::options(resource, &State::present());
    if let Some(password) = resource.attr_str("password") {
      options.push(format!("PASSWORD {}", quote_literal(password)));
    }

    info!(role = resource.title(), "creating role");
    let sql = if options.is_empty() {
      format!("CREATE ROLE {}", role)
    } else {
      format!("CREATE ROLE {} WITH {}", role, options.join(" "))
    };
    self.psql(&sql)?;
    Ok(ApplyOutcome::new("created"))
  }
}
