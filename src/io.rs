use image::codecs::bmp::BmpEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tga::TgaEncoder;
use image::{ImageEncoder, ImageError};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::canvas::{CanvasState, Layer, PixelBuffer};
use crate::selection::Region;

/// Output formats the exporter can write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveFormat {
    Png,
    Bmp,
    Tga,
    /// Native layered project file.
    Pxs,
}

impl SaveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SaveFormat::Png => "png",
            SaveFormat::Bmp => "bmp",
            SaveFormat::Tga => "tga",
            SaveFormat::Pxs => "pxs",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(SaveFormat::Png),
            "bmp" => Some(SaveFormat::Bmp),
            "tga" => Some(SaveFormat::Tga),
            "pxs" => Some(SaveFormat::Pxs),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension().and_then(|e| e.to_str()).and_then(Self::from_extension)
    }
}

// ============================================================================
// PXS PROJECT FILE FORMAT
// ============================================================================

const PXS_MAGIC: &str = "PXS1";

/// Sanity limits applied when loading a project file.
const MAX_CANVAS_DIM: u32 = 16_384;
const MAX_LAYERS: usize = 256;

#[derive(Serialize, Deserialize)]
struct ProjectFile {
    magic: String,
    width: u32,
    height: u32,
    active_layer_index: usize,
    layers: Vec<LayerData>,
    /// 0/255 selection mask, `width * height` bytes (empty = no selection).
    selection: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct LayerData {
    name: String,
    visible: bool,
    /// BGRA8 bytes.
    pixels: Vec<u8>,
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

/// Save a CanvasState as a .pxs project file. A floating offset on the
/// selection is written at its current position.
pub fn save_project(state: &CanvasState, path: &Path) -> Result<(), ProjectError> {
    let layers = state
        .layers
        .iter()
        .map(|layer| LayerData {
            name: layer.name.clone(),
            visible: layer.visible,
            pixels: layer.pixels.as_raw().to_vec(),
        })
        .collect();

    let selection = if state.selection.is_empty() {
        Vec::new()
    } else {
        let mut region = state.selection.clone();
        region.realize_offset();
        region.mask().as_raw().clone()
    };

    let project = ProjectFile {
        magic: PXS_MAGIC.to_string(),
        width: state.width,
        height: state.height,
        active_layer_index: state.active_layer_index,
        layers,
        selection,
    };

    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    bincode::serialize_into(writer, &project)?;
    log_info!("Saved project {} ({}x{})", path.display(), state.width, state.height);
    Ok(())
}

/// Load a .pxs project file
pub fn load_project(path: &Path) -> Result<CanvasState, ProjectError> {
    let mut raw = Vec::new();
    BufReader::new(File::open(path)?).read_to_end(&mut raw)?;
    decode_project(&raw)
}

fn decode_project(raw: &[u8]) -> Result<CanvasState, ProjectError> {
    let project: ProjectFile = bincode::deserialize(raw)?;

    if project.magic != PXS_MAGIC {
        return Err(ProjectError::InvalidFormat(format!(
            "Unknown file magic '{}'",
            project.magic.escape_debug()
        )));
    }
    if project.width == 0 || project.height == 0 {
        return Err(ProjectError::InvalidFormat(
            "Canvas dimensions cannot be zero".into(),
        ));
    }
    if project.width > MAX_CANVAS_DIM || project.height > MAX_CANVAS_DIM {
        return Err(ProjectError::InvalidFormat(format!(
            "Canvas size {}x{} exceeds maximum allowed {}x{}",
            project.width, project.height, MAX_CANVAS_DIM, MAX_CANVAS_DIM
        )));
    }
    if project.layers.len() > MAX_LAYERS {
        return Err(ProjectError::InvalidFormat(format!(
            "Project contains {} layers, which exceeds the maximum of {}",
            project.layers.len(),
            MAX_LAYERS
        )));
    }
    if project.layers.is_empty() {
        return Err(ProjectError::InvalidFormat("Project contains no layers".into()));
    }

    let (w, h) = (project.width, project.height);
    let mut layers = Vec::with_capacity(project.layers.len());
    for ld in project.layers {
        let len = ld.pixels.len();
        let pixels = PixelBuffer::from_raw(w, h, ld.pixels).ok_or_else(|| {
            ProjectError::InvalidFormat(format!(
                "Layer '{}' has {} bytes, expected {}",
                ld.name,
                len,
                w as usize * h as usize * 4
            ))
        })?;
        layers.push(Layer { name: ld.name, visible: ld.visible, pixels });
    }

    let selection = if project.selection.is_empty() {
        Region::new(w, h)
    } else {
        Region::from_mask_bytes(w, h, project.selection).ok_or_else(|| {
            ProjectError::InvalidFormat("Selection mask does not match canvas size".into())
        })?
    };

    let mut state = CanvasState::new(w, h);
    state.active_layer_index = project.active_layer_index.min(layers.len() - 1);
    state.layers = layers;
    state.selection = selection;
    Ok(state)
}

// ============================================================================
// IMAGE LOAD / SAVE
// ============================================================================

/// Load an image or project file into a fresh document.
pub fn load_image_sync(path: &Path) -> Result<CanvasState, String> {
    if SaveFormat::from_path(path) == Some(SaveFormat::Pxs) {
        return load_project(path).map_err(|e| e.to_string());
    }

    let img = image::open(path).map_err(|e| e.to_string())?.to_rgba8();
    let mut state = CanvasState::from_pixels(PixelBuffer::from_rgba_image(&img));
    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
        state.layers[0].name = stem.to_string();
    }
    log_info!("Loaded {} ({}x{})", path.display(), state.width, state.height);
    Ok(state)
}

/// Encode a flat buffer as PNG, BMP or TGA.
pub fn encode_and_write(buffer: &PixelBuffer, path: &Path, format: SaveFormat) -> Result<(), ImageError> {
    let image = buffer.to_rgba_image();
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let (w, h) = (image.width(), image.height());

    match format {
        SaveFormat::Png => {
            PngEncoder::new(&mut writer).write_image(image.as_raw(), w, h, image::ColorType::Rgba8)?;
        }
        SaveFormat::Bmp => {
            BmpEncoder::new(&mut writer).write_image(image.as_raw(), w, h, image::ColorType::Rgba8)?;
        }
        SaveFormat::Tga => {
            TgaEncoder::new(&mut writer).write_image(image.as_raw(), w, h, image::ColorType::Rgba8)?;
        }
        SaveFormat::Pxs => {
            return Err(ImageError::IoError(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "project files are not a flat image format",
            )));
        }
    }
    Ok(())
}

/// Save a document to `path`, picking the format from its extension.
/// Flat formats get the composite of all visible layers.
pub fn save_document(state: &CanvasState, path: &Path) -> Result<(), String> {
    let format = SaveFormat::from_path(path)
        .ok_or_else(|| format!("Unsupported output format: {}", path.display()))?;
    if format == SaveFormat::Pxs {
        return save_project(state, path).map_err(|e| e.to_string());
    }
    encode_and_write(&state.composite(), path, format).map_err(|e| e.to_string())?;
    log_info!("Exported {} as {}", path.display(), format.extension());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{Bgra, PixRect};
    use crate::selection::{SelectionMode, SelectionShape};

    fn sample_state() -> CanvasState {
        let mut state = CanvasState::new(6, 4);
        state.layers[0].pixels.put_pixel(1, 2, [10, 20, 30, 255]);
        let mut top = Layer::new("Ink".to_string(), 6, 4, [0, 0, 0, 0]);
        top.visible = false;
        top.pixels.put_pixel(5, 3, [1, 2, 3, 128]);
        state.layers.push(top);
        state.active_layer_index = 1;
        state.selection.apply_shape(&SelectionShape::Rectangle(PixRect::new(1, 1, 3, 2)), SelectionMode::Replace);
        state
    }

    #[test]
    fn project_round_trip_keeps_layers_and_selection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pxs");
        let state = sample_state();
        save_project(&state, &path).unwrap();

        let loaded = load_project(&path).unwrap();
        assert_eq!((loaded.width, loaded.height), (6, 4));
        assert_eq!(loaded.layers.len(), 2);
        assert_eq!(loaded.active_layer_index, 1);
        assert_eq!(loaded.layers[1].name, "Ink");
        assert!(!loaded.layers[1].visible);
        assert_eq!(loaded.layers[0].pixels, state.layers[0].pixels);
        assert_eq!(loaded.layers[1].pixels, state.layers[1].pixels);
        assert_eq!(loaded.selection, state.selection);
    }

    #[test]
    fn rejects_wrong_magic_and_bad_sizes() {
        let bogus = ProjectFile {
            magic: "NOPE".into(),
            width: 2,
            height: 2,
            active_layer_index: 0,
            layers: vec![LayerData { name: "a".into(), visible: true, pixels: vec![0; 16] }],
            selection: Vec::new(),
        };
        let raw = bincode::serialize(&bogus).unwrap();
        assert!(matches!(decode_project(&raw), Err(ProjectError::InvalidFormat(_))));

        let short = ProjectFile {
            magic: PXS_MAGIC.into(),
            layers: vec![LayerData { name: "a".into(), visible: true, pixels: vec![0; 3] }],
            ..bogus
        };
        let raw = bincode::serialize(&short).unwrap();
        assert!(matches!(decode_project(&raw), Err(ProjectError::InvalidFormat(_))));

        assert!(matches!(decode_project(&[1, 2, 3]), Err(ProjectError::Serialize(_))));
    }

    #[test]
    fn png_export_reloads_composite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flat.png");
        let mut state = CanvasState::new(3, 3);
        let red: Bgra = [0, 0, 255, 255];
        state.layers[0].pixels.put_pixel(2, 0, red);
        save_document(&state, &path).unwrap();

        let loaded = load_image_sync(&path).unwrap();
        assert_eq!(loaded.layers[0].name, "flat");
        assert_eq!(loaded.layers[0].pixels.get_pixel(2, 0), red);
        assert_eq!(loaded.layers[0].pixels.get_pixel(0, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(SaveFormat::from_path(Path::new("a/b.PNG")), Some(SaveFormat::Png));
        assert_eq!(SaveFormat::from_path(Path::new("x.pxs")), Some(SaveFormat::Pxs));
        assert_eq!(SaveFormat::from_path(Path::new("x.jpg")), None);
        assert!(save_document(&CanvasState::new(1, 1), Path::new("x.jpg")).is_err());
    }
}
