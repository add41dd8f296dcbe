use crate::model::DesktopEntry;
use crate::sources::Source;
use anyhow::Result;
use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use directories::BaseDirs;
use log::{info, debug};
use walkdir::WalkDir;

const DEFAULT_DATA_DIRS: &str = "/usr/local/share:/usr/share";

pub struct DesktopSource {
    dirs: Vec<PathBuf>,
}

impl DesktopSource {
    /// User data dir first, then `$XDG_DATA_DIRS`.
    pub fn from_env() -> Self {
        let mut dirs = Vec::new();

        if let Some(base_dirs) = BaseDirs::new() {
            dirs.push(base_dirs.data_dir().join("applications"));
        }

        let data_dirs = env::var("XDG_DATA_DIRS")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_DATA_DIRS.to_string());
        for dir in data_dirs.split(':').filter(|d| !d.is_empty()) {
            let dir = Path::new(dir).join("applications");
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }

        Self::with_dirs(dirs)
    }

    pub fn with_dirs(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }
}

impl Source for DesktopSource {
    fn scan(&self) -> Result<Vec<DesktopEntry>> {
        let mut entries = Vec::new();
        let mut seen = HashSet::new();

        for dir in &self.dirs {
            if !dir.exists() {
                continue;
            }
            debug!("Scanning desktop files in {:?}", dir);

            let files = WalkDir::new(dir)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .flatten()
                .filter(|e| e.file_type().is_file())
                .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("desktop"));

            for file in files {
                let path = file.path();
                let Ok(content) = fs::read_to_string(path) else {
                    debug!("Skipping unreadable {:?}", path);
                    continue;
                };
                let Some(parsed) = parse_desktop_file(&content) else {
                    debug!("Skipping {:?}", path);
                    continue;
                };
                if !seen.insert(parsed.name.clone()) {
                    debug!("Skipping {:?}, '{}' already found", path, parsed.name);
                    continue;
                }
                // A hidden copy still claims its name so later directories stay masked.
                if !parsed.visible {
                    debug!("Skipping hidden {:?}", path);
                    continue;
                }

                let mut entry = DesktopEntry::new(
                    path.to_string_lossy().to_string(),
                    parsed.name,
                    parsed.exec,
                    parsed.terminal,
                );
                entry.icon = parsed.icon;
                entries.push(entry);
            }
        }

        info!("DesktopSource: found {} entries", entries.len());
        Ok(entries)
    }
}

#[derive(Debug, PartialEq, Eq)]
struct ParsedEntry {
    name: String,
    exec: String,
    icon: Option<String>,
    terminal: bool,
    visible: bool,
}

fn parse_desktop_file(content: &str) -> Option<ParsedEntry> {
    let mut name = None;
    let mut exec = None;
    let mut icon = None;
    let mut terminal = false;
    let mut no_display = false;
    let mut hidden = false;
    let mut is_application = true;
    let mut is_desktop_entry = false;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') { continue; }

        if line.starts_with('[') {
            is_desktop_entry = line == "[Desktop Entry]";
            continue;
        }

        if !is_desktop_entry { continue; }

        let Some((key, value)) = line.split_once('=') else { continue; };
        let value = value.trim();

        match key.trim() {
            "Name" => name = Some(value.to_string()),
            "Exec" => exec = Some(value.to_string()),
            "Icon" => icon = Some(value.to_string()).filter(|i| !i.is_empty()),
            "Terminal" => terminal = value == "true",
            "NoDisplay" => no_display = value == "true",
            "Hidden" => hidden = value == "true",
            "Type" => is_application = value == "Application",
            _ => {}
        }
    }

    if !is_application { return None; }
    let name = name.filter(|n| !n.is_empty())?;
    let visible = !no_display && !hidden;
    let exec = exec.filter(|e| !e.is_empty());

    if visible && exec.is_none() { return None; }

    Some(ParsedEntry {
        name,
        exec: exec.unwrap_or_default(),
        icon,
        terminal,
        visible,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fieldcode::FieldCodeFlags;
    use tempfile::tempdir;

    fn write_entry(dir: &Path, file: &str, body: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(file), body).unwrap();
    }

    #[test]
    fn parses_main_group_only() {
        let parsed = parse_desktop_file(
            "# comment\n[Desktop Entry]\nType=Application\nName=Vim\nName[de]=Wim\nExec=vim %F\nIcon=gvim\nTerminal=true\n\
             [Desktop Action new]\nName=New\nExec=vim -n\n",
        )
        .unwrap();
        assert_eq!(
            parsed,
            ParsedEntry {
                name: "Vim".into(),
                exec: "vim %F".into(),
                icon: Some("gvim".into()),
                terminal: true,
                visible: true,
            }
        );
    }

    #[test]
    fn skips_hidden_and_incomplete_entries() {
        let no_display = parse_desktop_file("[Desktop Entry]\nName=A\nExec=a\nNoDisplay=true\n").unwrap();
        assert!(!no_display.visible);
        let hidden = parse_desktop_file("[Desktop Entry]\nName=A\nHidden=true\n").unwrap();
        assert!(!hidden.visible);
        assert_eq!(hidden.exec, "");

        assert!(parse_desktop_file("[Desktop Entry]\nName=A\n").is_none());
        assert!(parse_desktop_file("[Desktop Entry]\nName=\nExec=a\n").is_none());
        assert!(parse_desktop_file("[Desktop Entry]\nType=Link\nName=A\nExec=a\n").is_none());
        assert!(parse_desktop_file("Name=A\nExec=a\n").is_none());
    }

    #[test]
    fn first_directory_wins_on_duplicate_names() {
        let tmp = tempdir().unwrap();
        let user = tmp.path().join("user");
        let system = tmp.path().join("system");
        write_entry(&user, "cat.desktop", "[Desktop Entry]\nName=Cat\nExec=cat %f\n");
        write_entry(&system, "cat.desktop", "[Desktop Entry]\nName=Cat\nExec=/usr/bin/cat\n");
        write_entry(&system, "echo.desktop", "[Desktop Entry]\nName=Echo\nExec=echo 100%%f\n");
        write_entry(&system, "hidden.desktop", "[Desktop Entry]\nName=Ghost\nExec=ghost\nNoDisplay=true\n");
        write_entry(&system.join("kde"), "nested.desktop", "[Desktop Entry]\nName=Nested\nExec=nested %U\n");
        write_entry(&system, "notes.txt", "[Desktop Entry]\nName=Txt\nExec=txt\n");

        let entries = DesktopSource::with_dirs(vec![user, system, tmp.path().join("missing")])
            .scan()
            .unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["Cat", "Echo", "Nested"]);

        assert_eq!(entries[0].exec, "cat %f");
        assert_eq!(entries[0].flags, FieldCodeFlags::SINGLE_FILE);
        assert!(entries[1].flags.is_empty());
        assert_eq!(entries[2].flags, FieldCodeFlags::MULTI_URL);
    }

    #[test]
    fn hidden_user_copy_masks_system_entry() {
        let tmp = tempdir().unwrap();
        let user = tmp.path().join("user");
        let system = tmp.path().join("system");
        write_entry(&user, "foo.desktop", "[Desktop Entry]\nName=Foo\nExec=foo\nNoDisplay=true\n");
        write_entry(&system, "foo.desktop", "[Desktop Entry]\nName=Foo\nExec=foo\n");
        write_entry(&system, "bar.desktop", "[Desktop Entry]\nName=Bar\nHidden=true\n");
        write_entry(&system.join("vendor"), "bar.desktop", "[Desktop Entry]\nName=Bar\nExec=bar\n");

        let entries = DesktopSource::with_dirs(vec![user, system]).scan().unwrap();
        assert!(entries.is_empty(), "{entries:?}");
    }
}
