// src/checks/menu.rs

//! Installer menu descriptor validation
//!
//! Packages may ship `Menu/*.json` documents describing desktop shortcuts.
//! A document that is not JSON at all yields a format warning; one that is
//! JSON but does not follow the menu schema yields a schema warning. Neither
//! fails the build.

use crate::manifest::FileManifest;
use crate::report::{Finding, FindingKind};
use glob::Pattern;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Manifest entries that are menu descriptors
pub const MENU_PATTERN: &str = "Menu/*.json";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MenuDocument {
    #[serde(rename = "$schema")]
    _schema: Option<String>,
    #[serde(rename = "$id")]
    _id: Option<String>,
    menu_name: String,
    menu_items: Vec<MenuItem>,
}

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MenuItem {
    name: MenuItemName,
    description: String,
    command: Vec<String>,
    icon: Option<String>,
    precommand: Option<String>,
    precreate: Option<String>,
    working_dir: Option<String>,
    activate: Option<bool>,
    terminal: Option<bool>,
    platforms: Platforms,
}

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MenuItemName {
    Plain(String),
    Conditional {
        target_environment_is_base: String,
        target_environment_is_not_base: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Platforms {
    linux: Option<Map<String, Value>>,
    osx: Option<Map<String, Value>>,
    win: Option<Map<String, Value>>,
}

impl MenuDocument {
    /// Rules serde cannot express
    fn check(&self) -> std::result::Result<(), String> {
        if self.menu_name.trim().is_empty() {
            return Err("'menu_name' is empty".to_string());
        }
        if self.menu_items.is_empty() {
            return Err("'menu_items' is empty".to_string());
        }
        for (index, item) in self.menu_items.iter().enumerate() {
            if item.command.is_empty() {
                return Err(format!("menu_items[{}].command is empty", index));
            }
            if let MenuItemName::Plain(name) = &item.name
                && name.trim().is_empty()
            {
                return Err(format!("menu_items[{}].name is empty", index));
            }
            let platforms = &item.platforms;
            if platforms.linux.is_none() && platforms.osx.is_none() && platforms.win.is_none() {
                return Err(format!("menu_items[{}] targets no platform", index));
            }
        }
        Ok(())
    }
}

/// Validate one descriptor; `None` when it is valid
pub fn validate_menu(path: &Path, entry: &Path) -> Option<Finding> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            return Some(Finding::new(
                FindingKind::FormatWarning,
                format!("'{}' could not be read: {}", entry.display(), e),
                vec![entry.to_path_buf()],
            ));
        }
    };

    let value: Value = match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(e) => {
            warn!("'{}' is not a valid menuinst JSON document!", entry.display());
            return Some(Finding::new(
                FindingKind::FormatWarning,
                format!(
                    "'{}' is not a valid menuinst JSON document! Failed to parse JSON: {}",
                    entry.display(),
                    e
                ),
                vec![entry.to_path_buf()],
            ));
        }
    };

    let checked = serde_json::from_value::<MenuDocument>(value)
        .map_err(|e| e.to_string())
        .and_then(|document| document.check());

    match checked {
        Ok(()) => {
            info!("'{}' is a valid menuinst JSON document", entry.display());
            None
        }
        Err(reason) => {
            warn!("'{}' is not a valid menuinst JSON document: {}", entry.display(), reason);
            Some(Finding::new(
                FindingKind::SchemaWarning,
                format!(
                    "'{}' is not a valid menuinst JSON document! Schema violation: {}",
                    entry.display(),
                    reason
                ),
                vec![entry.to_path_buf()],
            ))
        }
    }
}

/// Validate every `Menu/*.json` entry of the manifest
pub fn validate_menus(prefix: &Path, manifest: &FileManifest) -> Vec<Finding> {
    let Ok(pattern) = Pattern::new(MENU_PATTERN) else {
        return Vec::new();
    };

    let menus: Vec<&PathBuf> = manifest
        .iter()
        .filter(|entry| pattern.matches_path(entry))
        .collect();

    menus
        .into_iter()
        .filter_map(|entry| validate_menu(&prefix.join(entry), entry))
        .collect()
}
