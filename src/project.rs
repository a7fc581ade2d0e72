use std::path::PathBuf;
use uuid::Uuid;

use crate::canvas::{CanvasState, PixelBuffer};
use crate::components::gesture::GestureController;
use crate::components::history::HistoryManager;
use crate::io::save_document;
use crate::settings::SelectionSettings;

/// Single open document.
pub struct Project {
    pub id: Uuid,
    pub canvas_state: CanvasState,
    pub history: HistoryManager,
    /// Selection / floating-transform engine for this document.
    pub selection: GestureController,
    /// `None` for unsaved/untitled files.
    pub path: Option<PathBuf>,
    pub is_dirty: bool,

    /// Display name (derived from path or "Untitled-X")
    pub name: String,
}

impl Project {
    pub fn new_untitled(untitled_counter: usize, width: u32, height: u32, settings: SelectionSettings) -> Self {
        let name = format!("Untitled-{}", untitled_counter);
        Self::with_canvas(name, None, CanvasState::new(width, height), settings)
    }

    pub fn from_file(path: PathBuf, canvas_state: CanvasState, settings: SelectionSettings) -> Self {
        let name = name_from_path(&path);
        Self::with_canvas(name, Some(path), canvas_state, settings)
    }

    /// Untitled single-layer project over existing pixels.
    pub fn from_pixels(name: &str, pixels: PixelBuffer, settings: SelectionSettings) -> Self {
        Self::with_canvas(name.to_string(), None, CanvasState::from_pixels(pixels), settings)
    }

    fn with_canvas(name: String, path: Option<PathBuf>, canvas_state: CanvasState, settings: SelectionSettings) -> Self {
        let history =
            HistoryManager::new(settings.max_undo_steps).with_memory_limit(Some(settings.max_history_bytes()));
        Self {
            id: Uuid::new_v4(),
            canvas_state,
            history,
            selection: GestureController::new(settings),
            path,
            is_dirty: false,
            name,
        }
    }

    pub fn undo(&mut self) -> Option<String> {
        let desc = self.selection.undo(&mut self.canvas_state, &mut self.history)?;
        self.is_dirty = true;
        Some(desc)
    }

    pub fn redo(&mut self) -> Option<String> {
        let desc = self.selection.redo(&mut self.canvas_state, &mut self.history)?;
        self.is_dirty = true;
        Some(desc)
    }

    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    /// Commit any float, write the document to `path` (format from the
    /// extension) and adopt that path as the project's file.
    pub fn save_as(&mut self, path: PathBuf) -> Result<(), String> {
        self.selection.commit(&mut self.canvas_state, &mut self.history);
        save_document(&self.canvas_state, &path)?;
        self.path = Some(path);
        self.update_name_from_path();
        self.mark_clean();
        Ok(())
    }

    pub fn update_name_from_path(&mut self) {
        if let Some(ref path) = self.path {
            self.name = name_from_path(path);
        }
    }

    /// Get the display title (name with dirty indicator)
    pub fn display_title(&self) -> String {
        if self.is_dirty {
            format!("{}*", self.name)
        } else {
            self.name.clone()
        }
    }
}

fn name_from_path(path: &std::path::Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::PixRect;
    use crate::selection::SelectionMode;

    #[test]
    fn undo_redo_route_through_the_controller() {
        let mut p = Project::new_untitled(1, 32, 32, SelectionSettings::default());
        assert_eq!(p.display_title(), "Untitled-1");
        let (canvas, history) = (&mut p.canvas_state, &mut p.history);
        assert!(p.selection.select_rect(canvas, history, PixRect::new(2, 2, 4, 4), SelectionMode::Replace));
        assert_eq!(p.undo().as_deref(), Some("Select"));
        assert!(p.canvas_state.selection.is_empty());
        assert_eq!(p.display_title(), "Untitled-1*");
        assert_eq!(p.redo().as_deref(), Some("Select"));
        assert_eq!(p.canvas_state.selection.bounds(), PixRect::new(2, 2, 4, 4));
    }

    #[test]
    fn history_limit_comes_from_settings() {
        let settings = SelectionSettings { max_undo_steps: 2, ..Default::default() };
        let mut p = Project::new_untitled(2, 16, 16, settings);
        for i in 0..4 {
            let r = PixRect::new(i, 0, 2, 2);
            p.selection.select_rect(&mut p.canvas_state, &mut p.history, r, SelectionMode::Replace);
        }
        assert_eq!(p.history.undo_count(), 2);
    }

    #[test]
    fn save_as_commits_and_cleans() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = Project::new_untitled(3, 8, 8, SelectionSettings::default());
        p.canvas_state.layers[0].pixels.put_pixel(1, 1, [0, 0, 255, 255]);
        let (canvas, history) = (&mut p.canvas_state, &mut p.history);
        p.selection.select_rect(canvas, history, PixRect::new(0, 0, 2, 2), SelectionMode::Replace);
        p.selection.nudge(canvas, history, 2, 0);
        p.mark_dirty();

        let path = dir.path().join("moved.pxs");
        p.save_as(path.clone()).unwrap();
        assert!(!p.selection.is_floating());
        assert_eq!(p.display_title(), "moved.pxs");
        assert_eq!(p.path.as_deref(), Some(path.as_path()));

        let doc = crate::io::load_project(&path).unwrap();
        assert_eq!(doc.layers[0].pixels.get_pixel(3, 1), [0, 0, 255, 255]);
        assert_eq!(doc.selection.bounds(), PixRect::new(2, 0, 2, 2));
    }
}
