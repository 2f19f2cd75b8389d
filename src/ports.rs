use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

use crate::types::PortSpec;

/// Why a port catalog could not be loaded.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read port catalog {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse port catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    common_ports: Vec<PortSpec>,
}

/// Parse catalog content of the form `{"common_ports": [{"name", "port", "protocol"}, ...]}`.
///
/// - Entry order is preserved; it decides the port-minor probe order.
/// - Entries with port `0` are dropped with a warning.
/// - Ports above 65535 fail to deserialize and reject the whole document.
pub fn parse_catalog_str(s: &str) -> Result<Vec<PortSpec>, CatalogError> {
    let file: CatalogFile = serde_json::from_str(s)?;
    let mut out = Vec::with_capacity(file.common_ports.len());
    for spec in file.common_ports {
        if spec.port == 0 {
            warn!(name = %spec.name, "skipping catalog entry with port 0");
            continue;
        }
        out.push(spec);
    }
    Ok(out)
}

/// Load the catalog from a file path. Errors if the file cannot be read or parsed.
pub fn load_catalog_from_path(path: impl AsRef<Path>) -> Result<Vec<PortSpec>, CatalogError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| CatalogError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_catalog_str(&content)
}

/// Load the catalog, degrading to an empty list if it is missing or malformed.
pub fn load_catalog_or_empty(path: impl AsRef<Path>) -> Vec<PortSpec> {
    match load_catalog_from_path(path) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "port catalog unavailable, scanning zero ports");
            Vec::new()
        }
    }
}
