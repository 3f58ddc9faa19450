//! Operator key input
//!
//! Each line typed on stdin is one key press: `r` returns to running, an
//! object's key starts recording that object. Commands reach the
//! acquisition loop over a channel and are applied between blocks.

use crossbeam_channel::Sender;
use std::io::{self, BufRead};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use crate::calibration::Command;
use crate::store::ModelStore;

/// Key that ends any recording
pub const RETURN_KEY: char = 'r';

/// Maps key presses to commands
#[derive(Debug, Clone)]
pub struct KeyMap {
    bindings: Vec<(char, String)>,
}

impl KeyMap {
    pub fn from_store(store: &ModelStore) -> Self {
        let bindings = store
            .iter()
            .map(|(name, model)| (model.key(), name.to_string()))
            .collect::<Vec<_>>();

        for (key, name) in &bindings {
            if *key == RETURN_KEY {
                warn!(
                    "Object '{}' is bound to '{}', which is reserved for returning to running",
                    name, RETURN_KEY
                );
            }
        }

        Self { bindings }
    }

    /// Command for a single key; `r` takes precedence over object keys
    pub fn command(&self, key: char) -> Option<Command> {
        if key == RETURN_KEY {
            return Some(Command::ReturnToRunning);
        }
        self.bindings
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, name)| Command::StartRecording(name.clone()))
    }

    /// Command for one line of input, keyed by its first non-blank character
    pub fn parse_line(&self, line: &str) -> Option<Command> {
        line.trim().chars().next().and_then(|key| self.command(key))
    }

    /// Human readable key list
    pub fn help(&self) -> String {
        let mut parts: Vec<String> = self
            .bindings
            .iter()
            .map(|(key, name)| format!("{} = record {}", key, name))
            .collect();
        parts.push(format!("{} = run", RETURN_KEY));
        parts.join(", ")
    }
}

/// Read commands from `reader` until it ends or the receiver is gone
pub fn forward_commands<R: BufRead>(reader: R, keymap: &KeyMap, sender: &Sender<Command>) -> usize {
    let mut sent = 0;
    for line in reader.lines() {
        let Ok(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        match keymap.parse_line(&line) {
            Some(command) => {
                debug!("Key '{}' -> {:?}", line.trim(), command);
                if sender.send(command).is_err() {
                    break;
                }
                sent += 1;
            }
            None => warn!("Unknown key '{}' ({})", line.trim(), keymap.help()),
        }
    }
    sent
}

/// Spawn a thread forwarding stdin key presses as commands
pub fn spawn_stdin_reader(keymap: KeyMap, sender: Sender<Command>) -> io::Result<JoinHandle<()>> {
    info!("Keys: {}", keymap.help());
    thread::Builder::new()
        .name("stdin-keys".into())
        .spawn(move || {
            let stdin = io::stdin();
            let sent = forward_commands(stdin.lock(), &keymap, &sender);
            debug!("Input closed after {} commands", sent);
        })
}
