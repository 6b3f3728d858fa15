//! Attribute and command surface offered to a host control framework.
//!
//! A control framework (Tango-like, gRPC, CLI, ...) needs to know which
//! names exist and how to read, write or invoke them. [`AttributeInfo`] is
//! the static metadata; [`AttributeAccess`] and [`Commandable`] are the
//! name-keyed dispatch. Values travel as `serde_json::Value`.

use crate::error::BoardResult;
use async_trait::async_trait;
use serde::Serialize;

/// Metadata of one exposed attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttributeInfo {
    /// Name used for dispatch
    pub name: &'static str,
    /// Short human label
    pub label: &'static str,
    /// Physical unit, if any
    pub unit: Option<&'static str>,
    /// Whether the attribute accepts writes
    pub writable: bool,
    /// One-line description
    pub description: &'static str,
}

impl AttributeInfo {
    /// Read-only attribute.
    pub const fn read_only(
        name: &'static str,
        label: &'static str,
        unit: Option<&'static str>,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            label,
            unit,
            writable: false,
            description,
        }
    }

    /// Read/write attribute.
    pub const fn read_write(
        name: &'static str,
        label: &'static str,
        unit: Option<&'static str>,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            label,
            unit,
            writable: true,
            description,
        }
    }
}

/// Metadata of one exposed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommandInfo {
    /// Name used for dispatch
    pub name: &'static str,
    /// Argument description, `None` for commands without arguments
    pub argument: Option<&'static str>,
    /// One-line description
    pub description: &'static str,
}

/// Name-keyed attribute access.
#[async_trait]
pub trait AttributeAccess: Send + Sync {
    /// All exposed attributes.
    fn attributes(&self) -> &'static [AttributeInfo];

    /// Read an attribute.
    async fn read_attribute(&self, name: &str) -> BoardResult<serde_json::Value>;

    /// Write an attribute.
    async fn write_attribute(&self, name: &str, value: serde_json::Value) -> BoardResult<()>;
}

/// Name-keyed command execution.
///
/// # Contract
/// - `execute_command()` takes a command name and JSON arguments.
/// - Returns a JSON value with results (`null` for commands without output).
#[async_trait]
pub trait Commandable: Send + Sync {
    /// All exposed commands.
    fn commands(&self) -> &'static [CommandInfo];

    /// Execute a command.
    async fn execute_command(
        &self,
        command: &str,
        args: serde_json::Value,
    ) -> BoardResult<serde_json::Value>;
}
