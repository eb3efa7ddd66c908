//! IPv4 forwarding switch

use crate::error::NetworkError;
use std::path::Path;

/// Write the forwarding flag and confirm the kernel kept it.
pub fn write_ipv4_forwarding(path: &Path, enabled: bool) -> Result<(), NetworkError> {
    let value = if enabled { "1" } else { "0" };

    std::fs::write(path, value).map_err(|e| NetworkError::Forwarding {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let current = read_ipv4_forwarding(path)?;
    if current != enabled {
        return Err(NetworkError::Forwarding {
            path: path.display().to_string(),
            reason: format!("value reads back as {}", if current { "1" } else { "0" }),
        });
    }

    Ok(())
}

/// Read the forwarding flag.
pub fn read_ipv4_forwarding(path: &Path) -> Result<bool, NetworkError> {
    let content = std::fs::read_to_string(path).map_err(|e| NetworkError::Forwarding {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    match content.trim() {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(NetworkError::Forwarding {
            path: path.display().to_string(),
            reason: format!("unexpected value '{}'", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enable_and_disable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ip_forward");
        std::fs::write(&path, "0\n").unwrap();

        write_ipv4_forwarding(&path, true).unwrap();
        assert!(read_ipv4_forwarding(&path).unwrap());

        write_ipv4_forwarding(&path, false).unwrap();
        assert!(!read_ipv4_forwarding(&path).unwrap());
    }

    #[test]
    fn test_unwritable_path_is_forwarding_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("ip_forward");

        let result = write_ipv4_forwarding(&path, true);
        assert!(matches!(result, Err(NetworkError::Forwarding { .. })));
    }

    #[test]
    fn test_garbage_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ip_forward");
        std::fs::write(&path, "yes").unwrap();

        assert!(read_ipv4_forwarding(&path).is_err());
    }
}
