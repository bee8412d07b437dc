//! Discovery of launch configurations from `.vscode/launch.json`.

use std::path::{Path, PathBuf};

use debug_bridge_core::types::DebugConfiguration;
use debug_bridge_core::Result;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

pub const LAUNCH_FILE: &str = ".vscode/launch.json";

#[derive(Debug, Default, Deserialize)]
struct LaunchFile {
    #[serde(default)]
    configurations: Vec<Value>,
}

pub fn launch_file_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(LAUNCH_FILE)
}

/// Reads the launch configurations of `workspace_root`. A missing file yields an empty
/// list; entries without a name or type are skipped.
pub async fn read_configurations(workspace_root: &Path) -> Result<Vec<DebugConfiguration>> {
    let path = launch_file_path(workspace_root);
    let contents = match tokio::fs::read_to_string(&path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No launch file at {}", path.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };
    parse_configurations(&contents)
}

pub fn parse_configurations(contents: &str) -> Result<Vec<DebugConfiguration>> {
    let file: LaunchFile = serde_json::from_str(&strip_jsonc(contents))?;
    let configurations = file
        .configurations
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<DebugConfiguration>(entry) {
            Ok(configuration) => Some(configuration),
            Err(e) => {
                warn!("Skipping launch configuration: {}", e);
                None
            }
        })
        .collect();
    Ok(configurations)
}

/// Removes `//` and `/* */` comments and trailing commas, leaving string literals intact.
fn strip_jsonc(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut previous = '\0';
                for skipped in chars.by_ref() {
                    if previous == '*' && skipped == '/' {
                        break;
                    }
                    previous = skipped;
                }
            }
            _ => out.push(c),
        }
    }

    remove_trailing_commas(&out)
}

fn remove_trailing_commas(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if c == '"' {
            in_string = true;
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}
