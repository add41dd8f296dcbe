use crate::fieldcode::{self, FieldCodeFlags};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopEntry {
    pub id: String,            // Path of the .desktop file
    pub name: String,          // Display name
    pub exec: String,          // Raw Exec= value, field codes intact
    pub icon: Option<String>,  // Icon name/path, never resolved
    pub use_terminal: bool,
    pub flags: FieldCodeFlags, // Derived from exec
}

impl DesktopEntry {
    pub fn new(id: String, name: String, exec: String, use_terminal: bool) -> Self {
        let flags = fieldcode::analyze(&exec);
        Self {
            id,
            name,
            exec,
            icon: None,
            use_terminal,
            flags,
        }
    }

    pub fn needs_argument(&self) -> bool {
        self.flags != FieldCodeFlags::NO_PLACEHOLDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_follow_exec() {
        let entry = DesktopEntry::new("a.desktop".into(), "A".into(), "cat %f".into(), false);
        assert_eq!(entry.flags, FieldCodeFlags::SINGLE_FILE);
        assert!(entry.needs_argument());

        let entry = DesktopEntry::new("b.desktop".into(), "B".into(), "echo 100%%".into(), false);
        assert!(!entry.needs_argument());
    }
}
