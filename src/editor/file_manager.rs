//! File management for the node editor
//!
//! Handles saving, loading and modified-state tracking for graph documents.
//! Files ending in `.json` use the JSON format, everything else the binary one.

use super::NodeEditor;
use crate::nodes::factory::NodesContext;
use crate::serialization::{Result, SerializationError};
use log::info;
use std::io;
use std::path::{Path, PathBuf};

/// On-disk encoding of a graph document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    Json,
    Binary,
}

impl GraphFormat {
    /// Picks the format from a file extension
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => GraphFormat::Json,
            _ => GraphFormat::Binary,
        }
    }
}

/// Manages file operations for the node editor
#[derive(Debug, Default)]
pub struct FileManager {
    /// Current file path (None if unsaved/new file)
    current_file_path: Option<PathBuf>,
    /// Whether the document has been modified since last save
    is_modified: bool,
}

impl FileManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_file_path(&self) -> Option<&PathBuf> {
        self.current_file_path.as_ref()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.is_modified
    }

    pub fn mark_modified(&mut self) {
        self.is_modified = true;
    }

    pub fn mark_saved(&mut self) {
        self.is_modified = false;
    }

    /// File name for title bars, with a trailing `*` when modified
    pub fn get_file_display_name(&self) -> String {
        let name = match &self.current_file_path {
            Some(path) => path.file_name().and_then(|n| n.to_str()).unwrap_or("Unknown"),
            None => "Untitled",
        };
        if self.is_modified {
            format!("{}*", name)
        } else {
            name.to_string()
        }
    }

    /// Forgets the current file and clears the editor
    pub fn new_file<C: NodesContext>(&mut self, editor: &mut NodeEditor<C>) {
        editor.clear();
        self.current_file_path = None;
        self.is_modified = false;
    }

    /// Writes the editor's graph to `file_path`, stamping the modification time
    pub fn save_to_file<C: NodesContext>(&mut self, file_path: &Path, editor: &mut NodeEditor<C>) -> Result<()> {
        editor.metadata_mut().touch();
        let format = GraphFormat::from_path(file_path);
        let content = match format {
            GraphFormat::Json => editor.serialize_to_json()?.into_bytes(),
            GraphFormat::Binary => editor.serialize()?,
        };
        std::fs::write(file_path, content)?;
        info!("Saved {:?} graph to {}", format, file_path.display());

        self.current_file_path = Some(file_path.to_path_buf());
        self.is_modified = false;
        Ok(())
    }

    /// Replaces the editor's graph with the document at `file_path`
    pub fn load_from_file<C: NodesContext>(&mut self, file_path: &Path, editor: &mut NodeEditor<C>) -> Result<()> {
        let content = std::fs::read(file_path)?;
        match GraphFormat::from_path(file_path) {
            GraphFormat::Json => editor.deserialize_from_json(&String::from_utf8(content)?)?,
            GraphFormat::Binary => editor.deserialize(&content)?,
        }

        self.current_file_path = Some(file_path.to_path_buf());
        self.is_modified = false;
        Ok(())
    }

    /// Saves to the current path; fails if the document was never saved
    pub fn save_file<C: NodesContext>(&mut self, editor: &mut NodeEditor<C>) -> Result<()> {
        let path = self.current_file_path.clone().ok_or_else(|| {
            SerializationError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "no file path set, use save_to_file instead",
            ))
        })?;
        self.save_to_file(&path, editor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contexts::MathContext;
    use egui::Pos2;

    fn editor_with_nodes() -> NodeEditor<MathContext> {
        let mut editor = NodeEditor::new(MathContext::new());
        let a = editor.add_node_by_method_name("InputValue", Pos2::ZERO).unwrap();
        let b = editor.add_node_by_method_name("Multiply", Pos2::new(200.0, 0.0)).unwrap();
        editor.connect_sockets(a, "outValue", b, "a").unwrap();
        editor
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(GraphFormat::from_path(Path::new("a/graph.json")), GraphFormat::Json);
        assert_eq!(GraphFormat::from_path(Path::new("graph.JSON")), GraphFormat::Json);
        assert_eq!(GraphFormat::from_path(Path::new("graph.nodes")), GraphFormat::Binary);
        assert_eq!(GraphFormat::from_path(Path::new("graph")), GraphFormat::Binary);
    }

    #[test]
    fn test_display_name_tracks_state() {
        let mut files = FileManager::new();
        assert_eq!(files.get_file_display_name(), "Untitled");
        files.mark_modified();
        assert_eq!(files.get_file_display_name(), "Untitled*");
        assert!(files.has_unsaved_changes());
    }

    #[test]
    fn test_save_and_load_both_formats() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["graph.json", "graph.bin"] {
            let path = dir.path().join(name);
            let mut editor = editor_with_nodes();
            let mut files = FileManager::new();
            files.mark_modified();

            files.save_to_file(&path, &mut editor).unwrap();
            assert_eq!(files.get_file_display_name(), name);
            assert!(!files.has_unsaved_changes());

            let mut loaded = NodeEditor::new(MathContext::new());
            FileManager::new().load_from_file(&path, &mut loaded).unwrap();
            assert_eq!(loaded.nodes().len(), 2);
            assert_eq!(loaded.graph().connections().len(), 1);
        }
    }

    #[test]
    fn test_save_file_requires_path() {
        let mut editor = editor_with_nodes();
        let mut files = FileManager::new();
        assert!(matches!(files.save_file(&mut editor), Err(SerializationError::Io(_))));

        files.new_file(&mut editor);
        assert!(editor.nodes().is_empty());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut editor = editor_with_nodes();
        let result = FileManager::new().load_from_file(&dir.path().join("missing.json"), &mut editor);
        assert!(matches!(result, Err(SerializationError::Io(_))));
        assert_eq!(editor.nodes().len(), 2);
    }
}
