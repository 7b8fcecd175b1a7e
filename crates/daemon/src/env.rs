// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment and path resolution for the daemon.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

/// Resolve the state directory:
/// `GAFFER_STATE_DIR` > `XDG_STATE_HOME/gaffer` > `~/.local/state/gaffer`.
pub fn state_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("GAFFER_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("gaffer"));
    }
    let home = dirs::home_dir().context("cannot resolve home directory")?;
    Ok(home.join(".local/state/gaffer"))
}

/// This machine's node identity: `GAFFER_NODE_ID` > `HOSTNAME` > `/etc/hostname`.
pub fn node_id() -> Result<String> {
    if let Ok(id) = std::env::var("GAFFER_NODE_ID") {
        if !id.is_empty() {
            return Ok(id);
        }
    }
    if let Ok(name) = std::env::var("HOSTNAME") {
        if !name.is_empty() {
            return Ok(name);
        }
    }
    let name = std::fs::read_to_string("/etc/hostname").unwrap_or_default();
    let name = name.trim();
    if name.is_empty() {
        bail!("cannot determine node id; set GAFFER_NODE_ID");
    }
    Ok(name.to_string())
}

/// Parse a `lo-hi` port range (or a single port).
pub fn parse_port_range(s: &str) -> Result<(u16, u16)> {
    if let Some((lo, hi)) = s.split_once('-') {
        let lo: u16 = lo.trim().parse().with_context(|| format!("bad port range {s:?}"))?;
        let hi: u16 = hi.trim().parse().with_context(|| format!("bad port range {s:?}"))?;
        if lo > hi {
            bail!("bad port range {s:?}: start exceeds end");
        }
        return Ok((lo, hi));
    }
    let port: u16 = s.trim().parse().with_context(|| format!("bad port {s:?}"))?;
    Ok((port, port))
}
