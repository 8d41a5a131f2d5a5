// ============================================================================
// PROJECTS: pages of elements, saved as .cfe files
// ============================================================================

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::canvas::{CanvasElement, CanvasSpec, ElementId, ElementPatch};
use crate::ops::color::Rgb;

/// Magic header for the project file (v1)
const CFE_MAGIC_V1: &str = "CFE1";
/// Maximum number of pages in a project file.
const MAX_PAGES: usize = 500;
/// Maximum number of elements on one page.
const MAX_ELEMENTS: usize = 2_000;
/// Maximum physical canvas size per axis.
const MAX_CANVAS_DIM: u32 = 16_384;

/// One page: an ordered layer list, bottom first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: Uuid,
    pub elements: Vec<CanvasElement>,
}

impl Page {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            elements: Vec::new(),
        }
    }

    pub fn element(&self, id: ElementId) -> Option<&CanvasElement> {
        self.elements.iter().find(|e| e.id == id)
    }

    /// Replace element `id` with the patched copy. Returns false when the
    /// element is not on this page.
    pub fn apply_patch(&mut self, id: ElementId, patch: &ElementPatch) -> bool {
        match self.elements.iter_mut().find(|e| e.id == id) {
            Some(el) => {
                *el = el.with_patch(patch);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: ElementId) -> Option<CanvasElement> {
        let idx = self.elements.iter().position(|e| e.id == id)?;
        Some(self.elements.remove(idx))
    }

    /// Swap a layer with its neighbour above (`up`) or below.
    pub fn move_layer(&mut self, index: usize, up: bool) {
        if up && index + 1 < self.elements.len() {
            self.elements.swap(index, index + 1);
        } else if !up && index > 0 && index < self.elements.len() {
            self.elements.swap(index, index - 1);
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub canvas: CanvasSpec,
    pub background: Rgb,
    pub pages: Vec<Page>,
}

impl Project {
    /// New project with one empty page on a white background.
    pub fn new(name: impl Into<String>, canvas: CanvasSpec) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            canvas,
            background: Rgb::WHITE,
            pages: vec![Page::new()],
        }
    }

    pub fn add_page(&mut self) -> usize {
        self.pages.push(Page::new());
        self.pages.len() - 1
    }

    /// Remove a page. The last remaining page is never removed.
    pub fn remove_page(&mut self, index: usize) -> Option<Page> {
        if self.pages.len() <= 1 || index >= self.pages.len() {
            return None;
        }
        Some(self.pages.remove(index))
    }
}

/// Serializable project file.
#[derive(Serialize, Deserialize)]
struct ProjectFileV1 {
    magic: String,
    project: Project,
}

/// Error type for project file operations
#[derive(Debug)]
pub enum ProjectError {
    Io(std::io::Error),
    Serialize(String),
    InvalidFormat(String),
}

impl std::fmt::Display for ProjectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectError::Io(e) => write!(f, "I/O error: {}", e),
            ProjectError::Serialize(e) => write!(f, "Serialization error: {}", e),
            ProjectError::InvalidFormat(e) => write!(f, "Invalid format: {}", e),
        }
    }
}

impl std::error::Error for ProjectError {}

impl From<std::io::Error> for ProjectError {
    fn from(e: std::io::Error) -> Self {
        ProjectError::Io(e)
    }
}

impl From<Box<bincode::ErrorKind>> for ProjectError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        ProjectError::Serialize(e.to_string())
    }
}

/// Save a project as a .cfe file.
pub fn save_project(project: &Project, path: &Path) -> Result<(), ProjectError> {
    let file = ProjectFileV1 {
        magic: CFE_MAGIC_V1.to_string(),
        project: project.clone(),
    };
    let writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(writer, &file)?;
    log_info!("Project '{}' saved to {}", project.name, path.display());
    Ok(())
}

/// Load and validate a .cfe file.
pub fn load_project(path: &Path) -> Result<Project, ProjectError> {
    let raw = std::fs::read(path)?;
    if raw.len() < 12 {
        return Err(ProjectError::InvalidFormat("File too small".into()));
    }
    // bincode writes a String as an 8-byte length prefix followed by the
    // bytes, so the 4-char magic sits at 8..12.
    let magic = std::str::from_utf8(&raw[8..12]).unwrap_or("");
    if magic != CFE_MAGIC_V1 {
        return Err(ProjectError::InvalidFormat(format!("Unknown magic '{}'", magic)));
    }

    let file: ProjectFileV1 = bincode::deserialize(&raw)?;
    let project = file.project;
    validate(&project)?;
    log_info!(
        "Project '{}' loaded: {} page(s), canvas {}",
        project.name,
        project.pages.len(),
        project.canvas.label()
    );
    Ok(project)
}

fn validate(project: &Project) -> Result<(), ProjectError> {
    let c = &project.canvas;
    if c.physical_width == 0 || c.physical_height == 0 || !(c.logical_width > 0.0 && c.logical_height > 0.0) {
        return Err(ProjectError::InvalidFormat("Canvas dimensions cannot be zero".into()));
    }
    if c.physical_width > MAX_CANVAS_DIM || c.physical_height > MAX_CANVAS_DIM {
        return Err(ProjectError::InvalidFormat(format!(
            "Canvas size {} exceeds maximum allowed {}x{}",
            c.label(),
            MAX_CANVAS_DIM,
            MAX_CANVAS_DIM
        )));
    }
    if project.pages.is_empty() || project.pages.len() > MAX_PAGES {
        return Err(ProjectError::InvalidFormat(format!(
            "Project has {} pages (allowed 1..={})",
            project.pages.len(),
            MAX_PAGES
        )));
    }
    if let Some(page) = project.pages.iter().find(|p| p.elements.len() > MAX_ELEMENTS) {
        return Err(ProjectError::InvalidFormat(format!(
            "Page {} has {} elements, which exceeds the maximum of {}",
            page.id,
            page.elements.len(),
            MAX_ELEMENTS
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::ImageAsset;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("comicfe-{}-{}.cfe", name, std::process::id()))
    }

    #[test]
    fn save_load_round_trip() {
        let mut project = Project::new("Strip", CanvasSpec::PORTRAIT);
        project.background = Rgb::new(250, 240, 200);
        let el = CanvasElement::image_at(ImageAsset::Remote("bg.png".into()), 0.0, 0.0, 400.0, 500.0);
        project.pages[0].elements.push(el);
        project.add_page();

        let path = temp_path("roundtrip");
        save_project(&project, &path).unwrap();
        let loaded = load_project(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, project);
    }

    #[test]
    fn rejects_foreign_files() {
        let path = temp_path("foreign");
        std::fs::write(&path, b"\x04\0\0\0\0\0\0\0ABC1 and then some").unwrap();
        let err = load_project(&path).unwrap_err();
        let _ = std::fs::remove_file(&path);
        assert!(matches!(err, ProjectError::InvalidFormat(_)));
    }

    #[test]
    fn last_page_is_kept() {
        let mut project = Project::new("p", CanvasSpec::SQUARE);
        assert!(project.remove_page(0).is_none());
        project.add_page();
        assert!(project.remove_page(1).is_some());
        assert_eq!(project.pages.len(), 1);
    }

    #[test]
    fn patches_and_layer_order() {
        let mut page = Page::new();
        let a = CanvasElement::image_at(ImageAsset::Remote("a".into()), 0.0, 0.0, 10.0, 10.0);
        let b = CanvasElement::image_at(ImageAsset::Remote("b".into()), 0.0, 0.0, 10.0, 10.0);
        let (a_id, b_id) = (a.id, b.id);
        page.elements = vec![a, b];

        let patch = ElementPatch::content(&page.elements[0], ImageAsset::Remote("a2".into()));
        assert!(page.apply_patch(a_id, &patch));
        assert!(!page.apply_patch(12, &patch));
        assert_eq!(page.element(a_id).and_then(|e| e.asset()), Some(&ImageAsset::Remote("a2".into())));

        page.move_layer(0, true);
        assert_eq!(page.elements[1].id, a_id);
        page.move_layer(0, false);
        assert_eq!(page.elements[0].id, b_id);
        assert!(page.remove(b_id).is_some());
        assert_eq!(page.elements.len(), 1);
    }
}
