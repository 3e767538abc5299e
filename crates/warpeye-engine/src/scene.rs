//! Scenes and the scene rotation.
//!
//! A scene directory holds a `scene.json` mapping variant name to
//! `{ "video": "<relative path>", "moves": [[x, y, secs], ...] }`. At most one
//! scene is started at a time; a started scene owns exactly one video source and
//! one move scheduler.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Deserialize;

use crate::assets::load_json_value;
use crate::error::EngineError;
use crate::moves::{MoveScheduler, MoveStep};
use crate::texture::{SourceFactory, TextureHandle, VideoTextureSource};
use crate::validate::{emit_issues, emit_summary, lint_manifest};
use crate::{logd, loge, logi};

pub const MANIFEST_FILE: &str = "scene.json";
pub const DISABLED_SUFFIX: &str = ".disabled";
pub const DEFAULT_VARIANT: &str = "default";

#[derive(Debug, Clone, Deserialize)]
pub struct VariantDef {
    pub video: PathBuf,
    #[serde(default)]
    pub moves: Option<Vec<MoveStep>>,
}

pub struct Scene {
    name: String,
    dir: PathBuf,
    variants: BTreeMap<String, VariantDef>,
    source: Option<Box<dyn VideoTextureSource>>,
    variant: Option<String>,
    mover: MoveScheduler,
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("name", &self.name)
            .field("variants", &self.variants.keys().collect::<Vec<_>>())
            .field("variant", &self.variant)
            .field("started", &self.is_started())
            .finish()
    }
}

impl Scene {
    /// Read, lint and validate `dir/scene.json`.
    pub fn load(dir: &Path) -> Result<Self, EngineError> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let raw = load_json_value(&manifest_path)?;

        let label = manifest_path.display().to_string();
        let issues = lint_manifest(&label, &raw);
        emit_issues("SCENE", &issues);
        emit_summary("SCENE", &label, &issues);

        let variants: BTreeMap<String, VariantDef> =
            serde_json::from_value(raw).map_err(|e| EngineError::InvalidManifest {
                path: manifest_path.clone(),
                msg: e.to_string(),
            })?;
        if variants.is_empty() {
            return Err(EngineError::InvalidManifest {
                path: manifest_path,
                msg: "no variants defined".into(),
            });
        }

        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string());

        let scene = Self {
            name,
            dir: dir.to_path_buf(),
            variants,
            source: None,
            variant: None,
            mover: MoveScheduler::new(Vec::new()),
        };
        scene.validate()?;
        Ok(scene)
    }

    /// Every referenced video must exist.
    pub fn validate(&self) -> Result<(), EngineError> {
        for def in self.variants.values() {
            let path = self.dir.join(&def.video);
            if !path.is_file() {
                return Err(EngineError::MissingResource { path });
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn variant_names(&self) -> impl Iterator<Item = &str> {
        self.variants.keys().map(String::as_str)
    }

    /// `default` when defined, else the first variant by name.
    pub fn entry_variant(&self) -> &str {
        if self.variants.contains_key(DEFAULT_VARIANT) {
            return DEFAULT_VARIANT;
        }
        self.variants.keys().next().map(String::as_str).unwrap_or(DEFAULT_VARIANT)
    }

    /// Variant currently playing, if started.
    pub fn variant(&self) -> Option<&str> {
        self.variant.as_deref()
    }

    pub fn is_started(&self) -> bool {
        self.source.is_some()
    }

    /// Acquire the variant's video source and start its moves at keyframe 0.
    ///
    /// # Panics
    /// If the scene already holds a video source. Call [`Scene::stop`] first.
    pub fn start(
        &mut self,
        variant: &str,
        factory: &mut dyn SourceFactory,
        now: Instant,
    ) -> Result<(), EngineError> {
        assert!(
            self.source.is_none(),
            "scene '{}' started while it still holds a video source",
            self.name
        );

        let def = self.variants.get(variant).ok_or_else(|| EngineError::UnknownVariant {
            scene: self.dir.clone(),
            variant: variant.to_string(),
        })?;

        let source = factory.open(&self.dir.join(&def.video))?;
        self.mover = MoveScheduler::new(def.moves.clone().unwrap_or_default());
        self.mover.start(now);
        self.source = Some(source);
        self.variant = Some(variant.to_string());
        logi!("SCENE", "started {}:{variant}", self.name);
        Ok(())
    }

    /// Release the video source and idle the moves. No-op when already stopped.
    pub fn stop(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.release();
            logi!("SCENE", "stopped {}", self.name);
        }
        self.mover.stop();
        self.variant = None;
    }

    pub fn update_texture(&mut self) -> Result<TextureHandle, EngineError> {
        match self.source.as_mut() {
            Some(source) => source.next_frame(),
            None => Ok(TextureHandle::NONE),
        }
    }

    pub fn update_position(&mut self, now: Instant) -> (f32, f32) {
        self.mover.advance(now)
    }

    pub fn fps(&self) -> Option<f32> {
        self.source.as_ref().and_then(|s| s.fps())
    }
}

impl Drop for Scene {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Load every enabled scene under `root`, sorted by directory name. Scenes that
/// fail to load are logged and left out.
pub fn discover_scenes(root: &Path) -> Vec<Scene> {
    let entries = match fs::read_dir(root) {
        Ok(rd) => rd,
        Err(e) => {
            loge!("SCENE", "cannot read scenes dir {}: {e}", root.display());
            return Vec::new();
        }
    };

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();

    let mut scenes = Vec::new();
    for dir in dirs {
        let disabled = dir
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(DISABLED_SUFFIX));
        if disabled {
            logd!("SCENE", "skipping disabled {}", dir.display());
            continue;
        }
        match Scene::load(&dir) {
            Ok(scene) => scenes.push(scene),
            Err(e) => loge!("SCENE", "excluding {}: {e}", dir.display()),
        }
    }

    logi!("SCENE", "{} scene(s) in rotation from {}", scenes.len(), root.display());
    scenes
}

/// The scene rotation. Owns the source factory, so sources are always released
/// while the factory (and whatever context it wraps) is still alive.
pub struct SceneManager<F: SourceFactory> {
    // Declared before `factory`: scenes drop first.
    scenes: Vec<Scene>,
    current: usize,
    root: PathBuf,
    factory: F,
}

impl<F: SourceFactory> SceneManager<F> {
    pub fn new(root: impl Into<PathBuf>, factory: F) -> Self {
        let root = root.into();
        Self {
            scenes: discover_scenes(&root),
            current: 0,
            root,
            factory,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scenes.iter().map(Scene::name)
    }

    pub fn current(&self) -> Option<&Scene> {
        self.scenes.get(self.current)
    }

    pub fn factory_mut(&mut self) -> &mut F {
        &mut self.factory
    }

    /// Start the current scene at its entry variant. A scene that cannot start is
    /// dropped from the rotation and the next one is tried. False once none remain.
    pub fn start_or_skip(&mut self, now: Instant) -> bool {
        loop {
            let Some(scene) = self.scenes.get_mut(self.current) else {
                return false;
            };
            if scene.is_started() {
                return true;
            }
            let variant = scene.entry_variant().to_string();
            match scene.start(&variant, &mut self.factory, now) {
                Ok(()) => return true,
                Err(e) => {
                    loge!("SCENE", "cannot start {}: {e}", scene.name());
                    self.remove_current();
                }
            }
        }
    }

    /// Stop the current scene and take it out of the rotation, then move on.
    pub fn skip_broken(&mut self, now: Instant) -> bool {
        self.remove_current();
        self.start_or_skip(now)
    }

    fn remove_current(&mut self) {
        if self.current < self.scenes.len() {
            let scene = self.scenes.remove(self.current);
            logi!("SCENE", "removed {} from rotation", scene.name());
        }
        if self.current >= self.scenes.len() {
            self.current = 0;
        }
    }

    fn switch_to(&mut self, index: usize, now: Instant) -> bool {
        if let Some(scene) = self.scenes.get_mut(self.current) {
            scene.stop();
        }
        self.current = index;
        self.start_or_skip(now)
    }

    pub fn next(&mut self, now: Instant) -> bool {
        if self.scenes.is_empty() {
            return false;
        }
        self.switch_to((self.current + 1) % self.scenes.len(), now)
    }

    pub fn prev(&mut self, now: Instant) -> bool {
        if self.scenes.is_empty() {
            return false;
        }
        let len = self.scenes.len();
        self.switch_to((self.current + len - 1) % len, now)
    }

    /// Restart the current scene on another variant. On failure the entry variant
    /// is restarted instead.
    pub fn select_variant(&mut self, variant: &str, now: Instant) -> Result<(), EngineError> {
        let Some(scene) = self.scenes.get_mut(self.current) else {
            return Ok(());
        };
        scene.stop();
        let res = scene.start(variant, &mut self.factory, now);
        if res.is_err() {
            self.start_or_skip(now);
        }
        res
    }

    /// Reload every scene from disk. The previously current scene is selected
    /// again when it still loads.
    pub fn rescan(&mut self, now: Instant) -> bool {
        let previous = self.current().map(|s| s.name().to_string());
        if let Some(scene) = self.scenes.get_mut(self.current) {
            scene.stop();
        }
        // Old scenes are dropped before any new source is opened.
        self.scenes.clear();
        self.scenes = discover_scenes(&self.root);
        self.current = previous
            .and_then(|name| self.scenes.iter().position(|s| s.name() == name))
            .unwrap_or(0);
        self.start_or_skip(now)
    }

    pub fn update_texture(&mut self) -> Result<TextureHandle, EngineError> {
        match self.scenes.get_mut(self.current) {
            Some(scene) => scene.update_texture(),
            None => Ok(TextureHandle::NONE),
        }
    }

    pub fn update_position(&mut self, now: Instant) -> (f32, f32) {
        match self.scenes.get_mut(self.current) {
            Some(scene) => scene.update_position(now),
            None => (0.0, 0.0),
        }
    }

    pub fn fps(&self) -> Option<f32> {
        self.current().and_then(Scene::fps)
    }

    pub fn stop(&mut self) {
        if let Some(scene) = self.scenes.get_mut(self.current) {
            scene.stop();
        }
    }
}
