// ============================================================================
// Asset loading
// ============================================================================
//
// Reads and decodes the bar model and its textures off the render thread.
// The render loop polls `AssetLoader` once per frame; progress and the final
// bundle arrive over a crossbeam channel. A bundle is only delivered when
// every asset decoded, so the scene never sees a partial load.
//
// Natively the work runs on one `std::thread`; in the browser it runs in a
// `spawn_local` future using `fetch`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crossbeam::channel::{self, Receiver, Sender};
use image::RgbaImage;

use crate::config::AssetConfig;
use crate::gltf_loader::{self, MeshData};
use crate::{Context, Error, Result};

// ============================================================================
// Sources
// ============================================================================

/// Where asset bytes come from. Paths are relative to the asset root and use
/// `/` separators.
pub trait AssetSource: Send + 'static {
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    fn exists(&self, path: &str) -> bool;
}

/// Plain directory on disk.
#[derive(Debug, Clone)]
pub struct FsSource {
    root: PathBuf,
}

impl FsSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl AssetSource for FsSource {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path);
        std::fs::read(&full).with_context(|| format!("reading {}", full.display()))
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_file()
    }
}

/// In-memory source, for tests and embedded assets.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.files.insert(path.into(), bytes);
        self
    }
}

impl AssetSource for MemorySource {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.files.get(path).cloned().ok_or_else(|| {
            Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, format!("{path} not found")))
        })
    }

    fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }
}

// ============================================================================
// Manifest and bundle
// ============================================================================

/// Everything one load needs, independent of where the bytes come from.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetManifest {
    pub model: String,
    pub ao_map: String,
    pub mask: Option<String>,
    pub reveal: Option<String>,
    /// Uniform scale baked into the model once after parsing.
    pub geometry_scale: f32,
}

impl AssetManifest {
    pub fn new(config: &AssetConfig, geometry_scale: f32) -> Self {
        Self {
            model: config.model.clone(),
            ao_map: config.ao_map.clone(),
            mask: config.mask.clone(),
            reveal: config.reveal.clone(),
            geometry_scale,
        }
    }

    /// Number of progress steps: the model plus each texture.
    pub fn total(&self) -> usize {
        2 + self.mask.is_some() as usize + self.reveal.is_some() as usize
    }
}

/// Decoded assets, ready for GPU upload on the render thread.
#[derive(Debug, Clone)]
pub struct LoadedAssets {
    pub mesh: MeshData,
    pub ao_map: RgbaImage,
    pub mask: Option<RgbaImage>,
    pub reveal: Option<RgbaImage>,
}

/// Messages from the loading task.
#[derive(Debug)]
pub enum LoadEvent {
    Progress { loaded: usize, total: usize, url: String },
    Done(Result<LoadedAssets>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Loading,
    Ready,
    Failed,
}

/// What to do with the bytes of the primary model file.
#[derive(Debug)]
pub enum ModelStep {
    Parsed(MeshData),
    /// The file needs Draco; read this uncompressed sibling instead.
    UseSibling(String),
}

/// First step of the model fallback: parse, or name the sibling to try.
pub fn model_step(path: &str, bytes: &[u8], sibling_exists: bool) -> Result<ModelStep> {
    if gltf_loader::requires_draco(bytes)? {
        if sibling_exists {
            let sibling = sibling_path(path);
            log::info!("{path} is Draco-compressed, using {sibling}");
            return Ok(ModelStep::UseSibling(sibling));
        }
        return Err(Error::CompressedModel { path: PathBuf::from(path) });
    }
    Ok(ModelStep::Parsed(gltf_loader::parse_mesh(bytes, Path::new(path))?))
}

pub fn sibling_path(path: &str) -> String {
    gltf_loader::decompressed_sibling(Path::new(path)).to_string_lossy().replace('\\', "/")
}

pub fn decode_image(path: &str, bytes: &[u8]) -> Result<RgbaImage> {
    let img = image::load_from_memory(bytes).with_context(|| format!("decoding {path}"))?;
    Ok(img.to_rgba8())
}

/// Loads the whole manifest synchronously from `source`, reporting each
/// finished asset through `progress`.
pub fn load_bundle(
    source: &dyn AssetSource,
    manifest: &AssetManifest,
    mut progress: impl FnMut(usize, usize, &str),
) -> Result<LoadedAssets> {
    let total = manifest.total();
    let mut loaded = 0;
    let mut step = |url: &str| {
        loaded += 1;
        progress(loaded, total, url);
    };

    let bytes = source.read(&manifest.model)?;
    let sibling = sibling_path(&manifest.model);
    let mut mesh = match model_step(&manifest.model, &bytes, source.exists(&sibling))? {
        ModelStep::Parsed(mesh) => mesh,
        ModelStep::UseSibling(path) => gltf_loader::parse_mesh(&source.read(&path)?, Path::new(&path))?,
    };
    mesh.scale(manifest.geometry_scale);
    step(&manifest.model);

    let ao_map = decode_image(&manifest.ao_map, &source.read(&manifest.ao_map)?)?;
    step(&manifest.ao_map);

    let mut optional = |path: &Option<String>| -> Result<Option<RgbaImage>> {
        match path {
            Some(path) => {
                let img = decode_image(path, &source.read(path)?)?;
                step(path);
                Ok(Some(img))
            }
            None => Ok(None),
        }
    };
    let mask = optional(&manifest.mask)?;
    let reveal = optional(&manifest.reveal)?;

    Ok(LoadedAssets { mesh, ao_map, mask, reveal })
}

// ============================================================================
// Loader handle
// ============================================================================

/// Receiving end of one background load.
pub struct AssetLoader {
    rx: Receiver<LoadEvent>,
    state: LoadState,
    loaded: usize,
    total: usize,
}

impl AssetLoader {
    fn with_channel(rx: Receiver<LoadEvent>, total: usize) -> Self {
        Self { rx, state: LoadState::Loading, loaded: 0, total }
    }

    /// Starts loading from `source` on a background thread.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn spawn<S: AssetSource>(source: S, manifest: AssetManifest) -> Result<Self> {
        let (tx, rx) = channel::unbounded();
        let total = manifest.total();
        std::thread::Builder::new()
            .name("asset-loader".into())
            .spawn(move || run_blocking(&source, &manifest, &tx))?;
        Ok(Self::with_channel(rx, total))
    }

    /// Starts loading over `fetch`, relative to `base_url`.
    #[cfg(target_arch = "wasm32")]
    pub fn spawn_fetch(base_url: String, manifest: AssetManifest) -> Self {
        let (tx, rx) = channel::unbounded();
        let total = manifest.total();
        wasm_bindgen_futures::spawn_local(async move {
            let result = web::load_bundle(&base_url, &manifest, &tx).await;
            let _ = tx.send(LoadEvent::Done(result));
        });
        Self::with_channel(rx, total)
    }

    /// Loads on the calling thread. Events are queued for the next `poll`.
    pub fn blocking<S: AssetSource>(source: S, manifest: AssetManifest) -> Self {
        let (tx, rx) = channel::unbounded();
        let total = manifest.total();
        run_blocking(&source, &manifest, &tx);
        Self::with_channel(rx, total)
    }

    /// Drains pending events. Returns the bundle (or the failure) exactly
    /// once; afterwards it returns `None`.
    pub fn poll(&mut self) -> Option<Result<LoadedAssets>> {
        if self.state != LoadState::Loading {
            return None;
        }
        loop {
            match self.rx.try_recv() {
                Ok(LoadEvent::Progress { loaded, total, url }) => {
                    log::debug!("loaded {url} ({loaded}/{total})");
                    self.loaded = loaded;
                    self.total = total;
                }
                Ok(LoadEvent::Done(result)) => {
                    self.state = if result.is_ok() { LoadState::Ready } else { LoadState::Failed };
                    return Some(result);
                }
                Err(channel::TryRecvError::Empty) => return None,
                Err(channel::TryRecvError::Disconnected) => {
                    self.state = LoadState::Failed;
                    return Some(Err(Error::custom("asset loader stopped without a result")));
                }
            }
        }
    }

    #[inline]
    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Fraction of assets finished, [0, 1].
    pub fn progress(&self) -> f32 {
        if self.total == 0 {
            return 1.0;
        }
        self.loaded as f32 / self.total as f32
    }
}

fn run_blocking(source: &dyn AssetSource, manifest: &AssetManifest, tx: &Sender<LoadEvent>) {
    let _span = tracing::info_span!("load_assets", model = %manifest.model).entered();
    let result = load_bundle(source, manifest, |loaded, total, url| {
        let _ = tx.send(LoadEvent::Progress { loaded, total, url: url.to_string() });
    });
    if let Err(e) = &result {
        log::error!("asset load failed: {e}");
    }
    let _ = tx.send(LoadEvent::Done(result));
}

#[cfg(target_arch = "wasm32")]
mod web {
    use super::*;
    use wasm_bindgen::JsCast;
    use wasm_bindgen_futures::JsFuture;

    fn js_error(url: &str, value: wasm_bindgen::JsValue) -> Error {
        Error::custom(format!("fetch {url}: {value:?}"))
    }

    /// `None` on a non-2xx response.
    async fn fetch(url: &str) -> Result<Option<Vec<u8>>> {
        let window = web_sys::window().ok_or_else(|| Error::custom("no window"))?;
        let response = JsFuture::from(window.fetch_with_str(url)).await.map_err(|e| js_error(url, e))?;
        let response: web_sys::Response = response.dyn_into().map_err(|e| js_error(url, e))?;
        if !response.ok() {
            return Ok(None);
        }
        let buffer = response.array_buffer().map_err(|e| js_error(url, e))?;
        let buffer = JsFuture::from(buffer).await.map_err(|e| js_error(url, e))?;
        Ok(Some(js_sys::Uint8Array::new(&buffer).to_vec()))
    }

    async fn fetch_required(base: &str, path: &str) -> Result<Vec<u8>> {
        let url = format!("{}/{}", base.trim_end_matches('/'), path);
        fetch(&url).await?.ok_or_else(|| {
            Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, format!("{url} not found")))
        })
    }

    pub(super) async fn load_bundle(base: &str, manifest: &AssetManifest, tx: &Sender<LoadEvent>) -> Result<LoadedAssets> {
        let total = manifest.total();
        let mut loaded = 0;
        let mut step = |url: &str| {
            loaded += 1;
            let _ = tx.send(LoadEvent::Progress { loaded, total, url: url.to_string() });
        };

        let bytes = fetch_required(base, &manifest.model).await?;
        let sibling = sibling_path(&manifest.model);
        let sibling_bytes = if gltf_loader::requires_draco(&bytes)? {
            let url = format!("{}/{}", base.trim_end_matches('/'), sibling);
            fetch(&url).await?
        } else {
            None
        };
        let mut mesh = match model_step(&manifest.model, &bytes, sibling_bytes.is_some())? {
            ModelStep::Parsed(mesh) => mesh,
            ModelStep::UseSibling(path) => {
                let bytes = sibling_bytes.unwrap_or_default();
                gltf_loader::parse_mesh(&bytes, Path::new(&path))?
            }
        };
        mesh.scale(manifest.geometry_scale);
        step(&manifest.model);

        let ao_map = decode_image(&manifest.ao_map, &fetch_required(base, &manifest.ao_map).await?)?;
        step(&manifest.ao_map);

        let mut textures = Vec::new();
        for path in [&manifest.mask, &manifest.reveal] {
            textures.push(match path {
                Some(path) => {
                    let img = decode_image(path, &fetch_required(base, path).await?)?;
                    step(path);
                    Some(img)
                }
                None => None,
            });
        }
        let reveal = textures.pop().flatten();
        let mask = textures.pop().flatten();
        Ok(LoadedAssets { mesh, ao_map, mask, reveal })
    }
}
