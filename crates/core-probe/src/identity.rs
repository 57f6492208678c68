//! Process identity (`user@host:pid`)
//!
//! Identity is static for the life of a process, so rails compute it once at
//! construction and reuse it for every entry.

use crate::UNKNOWN;
use serde::{Deserialize, Serialize};
use std::fmt;
use sysinfo::System;

/// Who is running: user, host and process id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user: String,
    pub host: String,
    pub pid: u32,
}

impl Identity {
    /// Probe the current process
    ///
    /// `USER` (then `LOGNAME`) names the user; the hostname comes from
    /// `sysinfo`. Either falls back to [`UNKNOWN`].
    pub fn current() -> Self {
        let user = ["USER", "LOGNAME"]
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|value| !value.is_empty())
            .unwrap_or_else(|| UNKNOWN.to_string());

        let host = System::host_name()
            .filter(|host| !host.is_empty())
            .unwrap_or_else(|| UNKNOWN.to_string());

        Self {
            user,
            host,
            pid: std::process::id(),
        }
    }

    /// Format as the actor string written into every entry
    pub fn actor(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.pid)
    }

    /// Parse an actor string produced by [`Identity::actor`]
    pub fn parse_actor(actor: &str) -> Option<Self> {
        let (user_host, pid) = actor.rsplit_once(':')?;
        let (user, host) = user_host.rsplit_once('@')?;
        Some(Self {
            user: user.to_string(),
            host: host.to_string(),
            pid: pid.parse().ok()?,
        })
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.pid)
    }
}
