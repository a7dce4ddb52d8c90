use std::process::Command;

use crate::config::HostIdentifier;
use crate::store::{ResultStore, StoreError};

/// Current hostname, or "localhost" if it cannot be determined.
pub fn hostname() -> String {
    let from_command = Command::new("hostname")
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .filter(|name| !name.is_empty());

    from_command
        .or_else(|| std::env::var("HOSTNAME").ok())
        .or_else(|| std::env::var("COMPUTERNAME").ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Resolve the identifier stamped on every log record.
/// The uuid form lives in the result store so it survives restarts.
pub fn host_identifier(kind: &HostIdentifier, store: &ResultStore) -> Result<String, StoreError> {
    match kind {
        HostIdentifier::Hostname => Ok(hostname()),
        HostIdentifier::Uuid => store.host_uuid(),
        HostIdentifier::Literal(value) => Ok(value.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_is_never_empty() {
        assert!(!hostname().is_empty());
    }

    #[test]
    fn uuid_identifier_comes_from_store() {
        let store = ResultStore::open_in_memory().unwrap();
        let first = host_identifier(&HostIdentifier::Uuid, &store).unwrap();
        let second = host_identifier(&HostIdentifier::Uuid, &store).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn literal_identifier_is_passed_through() {
        let store = ResultStore::open_in_memory().unwrap();
        let ident = host_identifier(&HostIdentifier::Literal("web-01".into()), &store).unwrap();
        assert_eq!(ident, "web-01");
    }
}
