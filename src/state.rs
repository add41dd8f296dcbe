use crate::config::Config;
use crate::executor::{ExecutionRequest, LaunchError};
use crate::fieldcode;
use crate::matcher::FuzzyMatcher;
use crate::model::DesktopEntry;
use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Browse,
    /// Collecting substitution text for `entries[entry]`.
    Prompt { entry: usize, input: String },
}

pub struct AppState {
    pub config: Config,
    pub entries: Vec<DesktopEntry>,
    pub filtered_indices: Vec<usize>,
    pub selected_index: usize,
    pub query: String,
    pub matcher: FuzzyMatcher,
    pub mode: Mode,
    pub error: Option<String>,
    hide: Vec<Regex>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let hide = config.general.hide_patterns();
        Self {
            config,
            entries: Vec::new(),
            filtered_indices: Vec::new(),
            selected_index: 0,
            query: String::new(),
            matcher: FuzzyMatcher::new(),
            mode: Mode::Browse,
            error: None,
            hide,
        }
    }

    pub fn set_entries(&mut self, mut entries: Vec<DesktopEntry>) {
        entries.retain(|e| !self.hide.iter().any(|re| re.is_match(&e.name)));
        self.entries = entries;
        self.mode = Mode::Browse;
        self.update_filter();
    }

    pub fn update_query(&mut self, query: &str) {
        self.query = query.to_string();
        self.update_filter();
    }

    pub fn update_filter(&mut self) {
        if self.query.is_empty() {
            let mut indices: Vec<usize> = (0..self.entries.len()).collect();
            indices.sort_by(|&a, &b| self.entries[a].name.cmp(&self.entries[b].name));
            self.filtered_indices = indices;
        } else {
            self.filtered_indices = self.matcher.rank(&self.query, &self.entries);
        }

        log::debug!("AppState: query='{}', filtered_count={}", self.query, self.filtered_indices.len());
        self.selected_index = 0;
    }

    pub fn move_selection(&mut self, delta: i32) {
        if self.filtered_indices.is_empty() {
            self.selected_index = 0;
            return;
        }

        let len = self.filtered_indices.len() as i32;
        let new_index = (self.selected_index as i32 + delta).rem_euclid(len);
        self.selected_index = new_index as usize;
    }

    pub fn get_selected(&self) -> Option<&DesktopEntry> {
        self.filtered_indices.get(self.selected_index)
            .map(|&idx| &self.entries[idx])
    }

    /// Typed text goes to the prompt input while prompting, to the query otherwise.
    pub fn push_text(&mut self, text: &str) {
        self.error = None;
        match &mut self.mode {
            Mode::Prompt { input, .. } => input.push_str(text),
            Mode::Browse => {
                let query = format!("{}{}", self.query, text);
                self.update_query(&query);
            }
        }
    }

    pub fn pop_char(&mut self) {
        self.error = None;
        match &mut self.mode {
            Mode::Prompt { input, .. } => {
                input.pop();
            }
            Mode::Browse => {
                let mut query = self.query.clone();
                query.pop();
                self.update_query(&query);
            }
        }
    }

    /// Activate the selected row, or submit the prompt. Returns a request
    /// when something should be launched now.
    pub fn activate(&mut self, fast_path: bool) -> Option<ExecutionRequest> {
        match &self.mode {
            Mode::Prompt { entry, input } => {
                Some(ExecutionRequest::for_entry(&self.entries[*entry], Some(input.clone())))
            }
            Mode::Browse => match self.filtered_indices.get(self.selected_index) {
                Some(&idx) => self.activate_entry(idx, fast_path),
                None => self.activate_command(),
            },
        }
    }

    /// Run the query itself as a command line. Placeholders typed into it
    /// are removed like on the fast path.
    pub fn activate_command(&mut self) -> Option<ExecutionRequest> {
        if self.mode != Mode::Browse {
            return None;
        }
        let command = self.query.trim();
        if command.is_empty() {
            return None;
        }
        Some(ExecutionRequest {
            template: command.to_string(),
            flags: fieldcode::analyze(command),
            substitution: None,
            wrap_in_terminal: false,
        })
    }

    /// Activate the `offset`-th visible row counted from `scroll_offset`.
    pub fn activate_visible(&mut self, scroll_offset: usize, offset: usize, fast_path: bool) -> Option<ExecutionRequest> {
        if self.mode != Mode::Browse {
            return None;
        }
        let target = scroll_offset + offset;
        let idx = *self.filtered_indices.get(target)?;
        self.selected_index = target;
        self.activate_entry(idx, fast_path)
    }

    fn activate_entry(&mut self, idx: usize, fast_path: bool) -> Option<ExecutionRequest> {
        let entry = &self.entries[idx];
        if !entry.needs_argument() {
            return Some(ExecutionRequest::for_entry(entry, None));
        }
        if fast_path {
            return Some(ExecutionRequest::for_entry(entry, Some(String::new())));
        }
        self.error = None;
        self.mode = Mode::Prompt { entry: idx, input: String::new() };
        None
    }

    /// Leave the prompt. Returns true when there was nothing to leave.
    pub fn cancel(&mut self) -> bool {
        self.error = None;
        match self.mode {
            Mode::Prompt { .. } => {
                self.mode = Mode::Browse;
                false
            }
            Mode::Browse => true,
        }
    }

    /// Record the outcome of a launch. Returns true when the launcher is done.
    pub fn finish_launch(&mut self, result: Result<(), LaunchError>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Launch failed: {}", e);
                self.error = Some(e.to_string());
                false
            }
        }
    }

    pub fn prompt_entry(&self) -> Option<(&DesktopEntry, &str)> {
        match &self.mode {
            Mode::Prompt { entry, input } => Some((&self.entries[*entry], input.as_str())),
            Mode::Browse => None,
        }
    }

    pub fn prompt_label(&self) -> Option<&'static str> {
        self.prompt_entry()
            .and_then(|(entry, _)| fieldcode::prompt_label(entry.flags))
    }
}

/// First visible row so that the selection stays centred once the list
/// no longer fits.
pub fn scroll_offset(selected: usize, total: usize, visible: usize) -> usize {
    if total <= visible || selected < visible / 2 {
        0
    } else if selected >= total - visible / 2 {
        total.saturating_sub(visible)
    } else {
        selected - visible / 2
    }
}
