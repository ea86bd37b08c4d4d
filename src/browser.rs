//! State of the MIDI file picker shown when no file is given on the command line.

use std::path::{Path, PathBuf};

/// Rows the list shows before it starts scrolling.
pub const VISIBLE_ROWS: usize = 20;

/// Returns true for `.mid` and `.midi` files.
pub fn is_midi_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| matches!(ext.to_lowercase().as_str(), "mid" | "midi"))
}

/// Directory listing with a cursor.
#[derive(Debug, Clone)]
pub struct FileBrowser {
    /// Directory being listed.
    pub current_dir: PathBuf,
    /// `..` (unless at the root), then directories, then MIDI files.
    pub entries: Vec<PathBuf>,
    /// Index of the highlighted entry.
    pub selected: usize,
    /// First visible entry.
    pub scroll: usize,
}

impl FileBrowser {
    /// Opens the browser on `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let mut browser = Self {
            current_dir: dir.into(),
            entries: Vec::new(),
            selected: 0,
            scroll: 0,
        };
        browser.refresh_entries();
        browser
    }

    /// Re-reads the current directory.
    pub fn refresh_entries(&mut self) {
        self.entries.clear();

        // Add parent directory entry if not at root
        if self.current_dir.parent().is_some() {
            self.entries.push(PathBuf::from(".."));
        }

        match std::fs::read_dir(&self.current_dir) {
            Ok(entries) => {
                let mut dirs: Vec<PathBuf> = Vec::new();
                let mut files: Vec<PathBuf> = Vec::new();

                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.is_dir() {
                        dirs.push(path);
                    } else if is_midi_file(&path) {
                        files.push(path);
                    }
                }

                dirs.sort();
                files.sort();
                self.entries.extend(dirs);
                self.entries.extend(files);
            }
            Err(e) => {
                tracing::warn!(
                    dir = %self.current_dir.display(),
                    error = %e,
                    "cannot list directory"
                );
            }
        }

        if self.selected >= self.entries.len() {
            self.selected = 0;
            self.scroll = 0;
        }
    }

    /// Moves the cursor up one entry.
    pub fn move_up(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
            if self.selected < self.scroll {
                self.scroll = self.selected;
            }
        }
    }

    /// Moves the cursor down one entry.
    pub fn move_down(&mut self) {
        if self.selected + 1 < self.entries.len() {
            self.selected += 1;
            if self.selected >= self.scroll + VISIBLE_ROWS {
                self.scroll = self.selected + 1 - VISIBLE_ROWS;
            }
        }
    }

    /// Opens the highlighted entry.
    ///
    /// # Returns
    ///
    /// The chosen file, or `None` if a directory was entered instead
    pub fn select(&mut self) -> Option<PathBuf> {
        let selected_path = self.entries.get(self.selected)?.clone();

        let next_dir = if selected_path == Path::new("..") {
            self.current_dir.parent().map(Path::to_path_buf)
        } else if selected_path.is_dir() {
            Some(selected_path)
        } else {
            return Some(selected_path);
        };

        if let Some(dir) = next_dir {
            self.current_dir = dir;
            self.selected = 0;
            self.scroll = 0;
            self.refresh_entries();
        }
        None
    }
}
