//! Native-messaging host manifest for Chromium-based browsers
use anyhow::{bail, Result};
use serde_json::{json, Value};
use std::path::PathBuf;

pub const HOST_NAME: &str = "com.tabfocus.host";

fn manifest(extension_id: &str, binary: &str) -> Result<Value> {
    let id = extension_id.trim();
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_lowercase()) {
        bail!("Invalid extension id '{extension_id}'");
    }
    Ok(json!({
        "name": HOST_NAME,
        "description": "TabFocus focus mode and timer host",
        "path": binary,
        "type": "stdio",
        "allowed_origins": [format!("chrome-extension://{id}/")],
    }))
}

pub fn print_manifest(extension_id: &str, path: Option<PathBuf>) -> Result<()> {
    let binary = match path {
        Some(p) => p,
        None => std::env::current_exe()?,
    };
    let manifest = manifest(extension_id, &binary.to_string_lossy())?;
    println!("{}", serde_json::to_string_pretty(&manifest)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_fields() {
        let value = manifest("abcdefghijklmnop", "/usr/local/bin/tabfocus").unwrap();
        assert_eq!(value["name"], HOST_NAME);
        assert_eq!(value["type"], "stdio");
        assert_eq!(value["path"], "/usr/local/bin/tabfocus");
        assert_eq!(value["allowed_origins"][0], "chrome-extension://abcdefghijklmnop/");
    }

    #[test]
    fn test_manifest_rejects_bad_id() {
        assert!(manifest("", "/bin/tabfocus").is_err());
        assert!(manifest("not/an-id", "/bin/tabfocus").is_err());
    }
}
