/// Centralized keybinding definitions for Tunnelmon
/// This ensures the help overlay, status bar, and actual key handlers stay in sync

#[derive(Debug, Clone)]
pub struct KeyBinding {
    pub key: &'static str,
    pub description: &'static str,
    pub category: KeyCategory,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyCategory {
    Navigation,
    Actions,
    System,
}

impl KeyCategory {
    pub fn title(&self) -> &'static str {
        match self {
            KeyCategory::Navigation => "Navigation",
            KeyCategory::Actions => "Actions",
            KeyCategory::System => "System",
        }
    }
}

/// Get all keybindings
pub fn get_all_keybindings() -> Vec<KeyBinding> {
    vec![
        // Navigation
        KeyBinding {
            key: "↑/k",
            description: "Move selection up",
            category: KeyCategory::Navigation,
        },
        KeyBinding {
            key: "↓/j",
            description: "Move selection down",
            category: KeyCategory::Navigation,
        },
        // Actions
        KeyBinding {
            key: "n",
            description: "Show/hide connections",
            category: KeyCategory::Actions,
        },
        KeyBinding {
            key: "r",
            description: "Reload selected tunnel (auto only)",
            category: KeyCategory::Actions,
        },
        KeyBinding {
            key: "t",
            description: "Terminate selected tunnel",
            category: KeyCategory::Actions,
        },
        // System
        KeyBinding {
            key: "h/?",
            description: "Toggle this help",
            category: KeyCategory::System,
        },
        KeyBinding {
            key: "q/Esc",
            description: "Quit",
            category: KeyCategory::System,
        },
        KeyBinding {
            key: "Ctrl+C",
            description: "Force quit (always exits)",
            category: KeyCategory::System,
        },
    ]
}

/// Get keybindings for the status bar (most common ones)
pub fn get_status_bar_keybindings() -> Vec<(&'static str, &'static str)> {
    vec![
        ("↑↓", "Navigate"),
        ("n", "Connections"),
        ("r", "Reload"),
        ("t", "Terminate"),
        ("h", "Help"),
        ("q", "Quit"),
    ]
}
