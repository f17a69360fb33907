//! Scripted stand-in for the remote command transport.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::error::TransportError;
use crate::store::RemoteServer;
use crate::transport::CommandTransport;

#[derive(Default)]
struct Script {
    down: HashSet<String>,
    rejecting: HashSet<String>,
    failing_commands: HashMap<String, Vec<String>>,
    calls: Vec<(String, String)>,
}

/// Succeeds everywhere unless told otherwise, and records every call as
/// `(server id, command)`.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    script: Mutex<Script>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Connections to this server are refused.
    pub(crate) fn take_down(&self, server_id: &str) {
        self.script.lock().unwrap().down.insert(server_id.to_string());
    }

    pub(crate) fn bring_up(&self, server_id: &str) {
        let mut script = self.script.lock().unwrap();
        script.down.remove(server_id);
        script.rejecting.remove(server_id);
        script.failing_commands.remove(server_id);
    }

    pub(crate) fn reject_auth(&self, server_id: &str) {
        self.script.lock().unwrap().rejecting.insert(server_id.to_string());
    }

    /// Any command starting with `prefix` fails on this server.
    pub(crate) fn fail_command(&self, server_id: &str, prefix: &str) {
        self.script
            .lock()
            .unwrap()
            .failing_commands
            .entry(server_id.to_string())
            .or_default()
            .push(prefix.to_string());
    }

    pub(crate) fn calls(&self) -> Vec<(String, String)> {
        self.script.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl CommandTransport for ScriptedTransport {
    async fn execute(
        &self,
        server: &RemoteServer,
        _secret: &str,
        command: &str,
    ) -> Result<String, TransportError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push((server.id.clone(), command.to_string()));

        if script.down.contains(&server.id) {
            return Err(TransportError::Connection(format!("{}: connection refused", server.address())));
        }
        if script.rejecting.contains(&server.id) {
            return Err(TransportError::Auth);
        }
        let fails = script
            .failing_commands
            .get(&server.id)
            .is_some_and(|prefixes| prefixes.iter().any(|p| command.starts_with(p.as_str())));
        if fails {
            return Err(TransportError::Io("broken pipe".to_string()));
        }

        Ok(format!("ok: {command}"))
    }
}
