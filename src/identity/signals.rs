//! Raw device signal collection.

use std::fs;

/// Raw attributes read from the host.
///
/// Every field except `os` is optional; a signal set with none of the
/// optional fields present cannot identify a device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSignals {
    pub hostname: Option<String>,
    pub os: String,
    pub username: Option<String>,
    pub machine_id: Option<String>,
}

impl DeviceSignals {
    /// Read the current host's attributes.
    pub fn collect() -> Self {
        let hostname = env_nonempty("HOSTNAME")
            .or_else(|| env_nonempty("COMPUTERNAME"))
            .or_else(|| read_trimmed("/etc/hostname"));
        let username = env_nonempty("USER").or_else(|| env_nonempty("USERNAME"));
        let machine_id = read_trimmed("/etc/machine-id")
            .or_else(|| read_trimmed("/var/lib/dbus/machine-id"));

        let signals = Self {
            hostname,
            os: std::env::consts::OS.to_string(),
            username,
            machine_id,
        };

        tracing::debug!(
            has_hostname = signals.hostname.is_some(),
            has_username = signals.username.is_some(),
            has_machine_id = signals.machine_id.is_some(),
            os = %signals.os,
            "Collected device signals"
        );

        signals
    }

    /// True when at least one stable, device-distinguishing attribute exists.
    pub fn is_identifying(&self) -> bool {
        self.hostname.is_some() || self.username.is_some() || self.machine_id.is_some()
    }

    /// Canonical byte encoding fed into the fingerprint hash.
    pub(crate) fn canonical(&self) -> String {
        format!(
            "host={}|os={}|user={}|machine={}",
            self.hostname.as_deref().unwrap_or(""),
            self.os,
            self.username.as_deref().unwrap_or(""),
            self.machine_id.as_deref().unwrap_or("")
        )
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn read_trimmed(path: &str) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifying() {
        let empty = DeviceSignals {
            os: "linux".into(),
            ..Default::default()
        };
        assert!(!empty.is_identifying());

        let host_only = DeviceSignals {
            hostname: Some("box".into()),
            os: "linux".into(),
            ..Default::default()
        };
        assert!(host_only.is_identifying());
    }

    #[test]
    fn test_canonical_distinguishes_fields() {
        let a = DeviceSignals {
            hostname: Some("ab".into()),
            os: "linux".into(),
            username: Some("c".into()),
            machine_id: None,
        };
        let b = DeviceSignals {
            hostname: Some("a".into()),
            os: "linux".into(),
            username: Some("bc".into()),
            machine_id: None,
        };
        assert_ne!(a.canonical(), b.canonical());
    }
}
