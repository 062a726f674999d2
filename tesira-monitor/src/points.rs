//! Control point definitions file
//!
//! The file is a JSON array of control point definitions:
//!
//! ```json
//! [
//!   { "key": "program", "kind": "fader", "instanceTag": "ProgramLevel" },
//!   { "key": "phone", "kind": "dialer", "instanceTag": "Dialer1", "secondaryTag": "Dialer1Status" }
//! ]
//! ```

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tesira_client::ControlPointConfig;

/// Read and validate control point definitions
pub fn load(path: &Path) -> Result<Vec<ControlPointConfig>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read control points from {}", path.display()))?;
    parse(&raw).with_context(|| format!("Invalid control points file {}", path.display()))
}

pub fn parse(raw: &str) -> Result<Vec<ControlPointConfig>> {
    let definitions: Vec<ControlPointConfig> = serde_json::from_str(raw).context("Malformed JSON")?;

    let mut keys = HashSet::new();
    for definition in &definitions {
        definition
            .validate()
            .with_context(|| format!("Control point '{}' is invalid", definition.key))?;
        if !keys.insert(definition.key.as_str()) {
            bail!("Control point key '{}' is defined more than once", definition.key);
        }
    }

    Ok(definitions)
}
