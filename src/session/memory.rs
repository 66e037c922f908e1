/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! An in-process multiplexer that records everything typed into it. Backs `--dry-run` and the
//! test suite.

use super::{Multiplexer, Pane, Window};
use colored::Colorize;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Created { id: String, name: String },
    Keys { name: String, keys: String, enter: bool },
    Killed { id: String, name: String },
}

#[derive(Default)]
struct State {
    next_id: usize,
    windows: Vec<(String, String)>,
    events: Vec<Event>,
    captures: HashMap<String, Vec<String>>,
    echo: bool,
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
pub struct MemoryMultiplexer {
    state: Arc<Mutex<State>>,
}
impl MemoryMultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs every keystroke as it is sent.
    pub fn echoing() -> Self {
        let mux = Self::default();
        lock(&mux.state).echo = true;
        mux
    }

    /// Sets the lines every pane called `name` returns from `capture`.
    pub fn script_capture(&self, name: &str, lines: &[&str]) {
        lock(&self.state).captures.insert(
            name.to_string(),
            lines.iter().map(|line| line.to_string()).collect(),
        );
    }

    pub fn events(&self) -> Vec<Event> {
        lock(&self.state).events.clone()
    }

    /// Non-empty input typed into panes called `name`, in order, without the history
    /// suppressing space.
    pub fn sent_to(&self, name: &str) -> Vec<String> {
        lock(&self.state)
            .events
            .iter()
            .filter_map(|event| match event {
                Event::Keys { name: n, keys, .. } if n == name && !keys.is_empty() => {
                    Some(keys.trim_start().to_string())
                }
                _ => None,
            })
            .collect()
    }

    /// Every non-empty input as `(pane name, input)`, in the order it was typed.
    pub fn all_sent(&self) -> Vec<(String, String)> {
        lock(&self.state)
            .events
            .iter()
            .filter_map(|event| match event {
                Event::Keys { name, keys, .. } if !keys.is_empty() => {
                    Some((name.clone(), keys.trim_start().to_string()))
                }
                _ => None,
            })
            .collect()
    }

    /// Names of every pane ever created, in creation order.
    pub fn created(&self) -> Vec<String> {
        lock(&self.state)
            .events
            .iter()
            .filter_map(|event| match event {
                Event::Created { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Names of every pane destroyed, in order.
    pub fn killed(&self) -> Vec<String> {
        lock(&self.state)
            .events
            .iter()
            .filter_map(|event| match event {
                Event::Killed { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Names of the panes currently open, sorted.
    pub fn window_names(&self) -> Vec<String> {
        let mut names = lock(&self.state)
            .windows
            .iter()
            .map(|(_, name)| name.clone())
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    fn window(&self, id: &str, name: &str) -> Window {
        Window {
            id: id.to_string(),
            name: name.to_string(),
            pane: Arc::new(MemoryPane {
                name: name.to_string(),
                state: self.state.clone(),
            }),
        }
    }
}
impl Multiplexer for MemoryMultiplexer {
    fn new_window(&self, name: &str) -> anyhow::Result<Window> {
        let id = {
            let mut state = lock(&self.state);
            let id = format!("@{}", state.next_id);
            state.next_id += 1;
            state.windows.push((id.clone(), name.to_string()));
            state.events.push(Event::Created {
                id: id.clone(),
                name: name.to_string(),
            });
            if state.echo {
                info!("{} {}", "+".green(), name);
            }
            id
        };

        Ok(self.window(&id, name))
    }

    fn windows(&self) -> anyhow::Result<Vec<Window>> {
        let windows = lock(&self.state).windows.clone();
        Ok(windows
            .iter()
            .map(|(id, name)| self.window(id, name))
            .collect())
    }

    fn kill_window(&self, window: &Window) -> anyhow::Result<()> {
        let mut state = lock(&self.state);
        let before = state.windows.len();
        state.windows.retain(|(id, _)| id != &window.id);
        if state.windows.len() < before {
            state.events.push(Event::Killed {
                id: window.id.clone(),
                name: window.name.clone(),
            });
            if state.echo {
                info!("{} {}", "-".red(), window.name);
            }
        }
        Ok(())
    }
}

struct MemoryPane {
    name: String,
    state: Arc<Mutex<State>>,
}
impl Pane for MemoryPane {
    fn send_keys(&self, keys: &str, enter: bool) -> anyhow::Result<()> {
        let mut state = lock(&self.state);
        if state.echo && !keys.is_empty() {
            info!("[{}] {}", self.name.cyan(), keys.trim_start());
        }
        state.events.push(Event::Keys {
            name: self.name.clone(),
            keys: keys.to_string(),
            enter,
        });
        Ok(())
    }

    fn capture(&self) -> anyhow::Result<Vec<String>> {
        Ok(lock(&self.state)
            .captures
            .get(&self.name)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_keys_per_window() -> anyhow::Result<()> {
        let mux = MemoryMultiplexer::new();
        let a = mux.new_window("a")?;
        let b = mux.new_window("b")?;

        a.pane.send_keys(" make", true)?;
        b.pane.send_keys("tas", true)?;
        a.pane.send_keys("", true)?;

        assert_eq!(mux.sent_to("a"), vec!["make"]);
        assert_eq!(
            mux.all_sent(),
            vec![
                ("a".to_string(), "make".to_string()),
                ("b".to_string(), "tas".to_string())
            ]
        );
        Ok(())
    }

    #[test]
    fn killing_twice_is_recorded_once() -> anyhow::Result<()> {
        let mux = MemoryMultiplexer::new();
        let a = mux.new_window("a")?;

        mux.kill_window(&a)?;
        mux.kill_window(&a)?;

        assert_eq!(mux.killed(), vec!["a"]);
        assert!(mux.window_names().is_empty());
        Ok(())
    }

    #[test]
    fn capture_returns_scripted_lines() -> anyhow::Result<()> {
        let mux = MemoryMultiplexer::new();
        let a = mux.new_window("a")?;
        assert!(a.pane.capture()?.is_empty());

        mux.script_capture("a", &["$ whoami", "tas", "$"]);
        assert_eq!(a.pane.capture()?, vec!["$ whoami", "tas", "$"]);
        Ok(())
    }
}
