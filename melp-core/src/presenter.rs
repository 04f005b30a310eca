//! Where the countdown is shown, and what the user can ask of it.

/// Something that can display a short title, such as a tray icon.
pub trait TrayPresenter {
    /// Replace the displayed title. An empty string clears it.
    fn set_title(&mut self, title: &str);
}

/// Requests raised by the user through the presenter's menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Refresh,
    Quit,
}

impl Command {
    /// Menu entries, in display order.
    pub const ALL: [Command; 2] = [Command::Refresh, Command::Quit];

    /// Stable id of the menu entry raising this command.
    pub fn menu_id(self) -> &'static str {
        match self {
            Command::Refresh => "refresh",
            Command::Quit => "quit",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Command::Refresh => "Refresh",
            Command::Quit => "Quit",
        }
    }

    pub fn from_menu_id(id: &str) -> Option<Self> {
        Command::ALL.into_iter().find(|command| command.menu_id() == id)
    }
}
