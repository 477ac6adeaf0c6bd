use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Things a key can ask the comment view to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum KeyAction {
    NextPage,
    PrevPage,
    FirstPage,
    LastPage,
    ToggleSort,
    Refresh,
    Export,
    Quit,
}

/// Maps key events to view actions. Digits are not bound here; the view
/// collects them into a page number for goto.
#[derive(Debug, Clone)]
pub struct KeyBindingMap {
    bindings: HashMap<KeyEvent, KeyAction>,
}

impl KeyBindingMap {
    pub fn new() -> Self {
        Self {
            bindings: HashMap::new(),
        }
    }

    /// Default bindings: vi-ish letters plus the usual paging keys.
    pub fn with_defaults() -> Self {
        let mut map = Self::new();
        for (code, action) in [
            (KeyCode::Char('n'), KeyAction::NextPage),
            (KeyCode::Char('l'), KeyAction::NextPage),
            (KeyCode::Right, KeyAction::NextPage),
            (KeyCode::PageDown, KeyAction::NextPage),
            (KeyCode::Char('p'), KeyAction::PrevPage),
            (KeyCode::Char('h'), KeyAction::PrevPage),
            (KeyCode::Left, KeyAction::PrevPage),
            (KeyCode::PageUp, KeyAction::PrevPage),
            (KeyCode::Char('g'), KeyAction::FirstPage),
            (KeyCode::Home, KeyAction::FirstPage),
            (KeyCode::Char('G'), KeyAction::LastPage),
            (KeyCode::End, KeyAction::LastPage),
            (KeyCode::Char('t'), KeyAction::ToggleSort),
            (KeyCode::Char('r'), KeyAction::Refresh),
            (KeyCode::Char('e'), KeyAction::Export),
            (KeyCode::Char('q'), KeyAction::Quit),
            (KeyCode::Esc, KeyAction::Quit),
        ] {
            map.add_binding(KeyEvent::new(code, KeyModifiers::empty()), action);
        }
        map.add_binding(
            KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL),
            KeyAction::Quit,
        );
        map
    }

    pub fn add_binding(&mut self, key: KeyEvent, action: KeyAction) {
        self.bindings.insert(key, action);
    }

    /// Look up a key. Shift is ignored for characters because terminals report
    /// `G` both with and without the modifier.
    pub fn get_action(&self, key: &KeyEvent) -> Option<KeyAction> {
        let mut normalized = KeyEvent::new(key.code, key.modifiers);
        if matches!(key.code, KeyCode::Char(_)) {
            normalized.modifiers.remove(KeyModifiers::SHIFT);
        }
        self.bindings.get(&normalized).copied()
    }

    /// Merge custom keybindings from configuration
    pub fn merge_config(&mut self, bindings: &HashMap<String, KeyAction>) {
        for (key_str, action) in bindings {
            match parse_key_str(key_str) {
                Some(key_event) => self.add_binding(key_event, *action),
                None => tracing::warn!("Invalid key string in config: {}", key_str),
            }
        }
    }
}

impl Default for KeyBindingMap {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Parse a key string into a KeyEvent
/// Supported formats:
/// - Single char: "n", "G", "1"
/// - Special keys: "Enter", "Esc", "Left", "Right", "Home", "End", "PageUp", "PageDown"
/// - With modifiers: "Ctrl+C", "Alt+n"
pub fn parse_key_str(key_str: &str) -> Option<KeyEvent> {
    let parts: Vec<&str> = key_str.split('+').collect();
    let (key_part, modifier_parts) = parts.split_last()?;

    let mut modifiers = KeyModifiers::empty();
    for modifier in modifier_parts {
        match modifier.to_lowercase().as_str() {
            "ctrl" => modifiers |= KeyModifiers::CONTROL,
            "shift" => modifiers |= KeyModifiers::SHIFT,
            "alt" => modifiers |= KeyModifiers::ALT,
            _ => return None,
        }
    }

    let code = match *key_part {
        "Enter" => KeyCode::Enter,
        "Esc" => KeyCode::Esc,
        "Up" => KeyCode::Up,
        "Down" => KeyCode::Down,
        "Left" => KeyCode::Left,
        "Right" => KeyCode::Right,
        "Home" => KeyCode::Home,
        "End" => KeyCode::End,
        "PageUp" => KeyCode::PageUp,
        "PageDown" => KeyCode::PageDown,
        s => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => KeyCode::Char(c),
                _ => return None,
            }
        }
    };

    Some(KeyEvent::new(code, modifiers))
}
