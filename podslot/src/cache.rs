//! Build-cache gate: has anything the image is built from changed since the
//! last successful build?
//!
//! Each [`Layer`] is checksummed from its configured input paths. The gate
//! is advisory; what "rebuild" means is up to the caller.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use crate::core::checksum::{ChecksumBuilder, to_hex};
use crate::core::identity::{ProjectIdentity, image_name};
use crate::core::layers::{BuildLayerSnapshot, Layer, RebuildDecision};
use crate::error::{FsContext, SlotError};
use crate::io::config::BuildConfig;
use crate::io::lock::ProjectLock;
use crate::io::paths::ProjectPaths;
use crate::io::project_meta::ensure_project_path;
use crate::io::runtime::ContainerRuntime;
use crate::io::snapshot_store::{load_snapshot, write_snapshot};

pub struct BuildCacheGate {
    project: ProjectIdentity,
    paths: ProjectPaths,
    inputs: BuildConfig,
}

impl BuildCacheGate {
    pub fn open(home: &Path, project_path: &Path, inputs: &BuildConfig) -> Result<Self, SlotError> {
        let project = ProjectIdentity::new(project_path)?;
        let paths = ProjectPaths::new(home, &project);
        Ok(Self {
            project,
            paths,
            inputs: inputs.clone(),
        })
    }

    pub fn project(&self) -> &ProjectIdentity {
        &self.project
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.paths.layers_path
    }

    /// Configured input paths of one layer.
    pub fn layer_inputs(&self, layer: Layer) -> &[PathBuf] {
        match layer {
            Layer::BaseDefinition => &self.inputs.base_definition,
            Layer::SupportScripts => &self.inputs.support_scripts,
            Layer::ProfileConfig => &self.inputs.profile_config,
        }
    }

    /// Whether the project image `{prefix}-{slug}` exists in `runtime`.
    pub fn image_exists<R: ContainerRuntime + ?Sized>(
        &self,
        runtime: &R,
        prefix: &str,
    ) -> Result<bool, SlotError> {
        let image = image_name(prefix, &self.project);
        let exists = runtime.inspect_image(&image)?;
        debug!(%image, exists, "inspected project image");
        Ok(exists)
    }

    /// Checksum every layer from scratch.
    #[instrument(skip_all, fields(project = %self.project.path_str()))]
    pub fn compute_snapshot(&self) -> Result<BuildLayerSnapshot, SlotError> {
        let mut snapshot = BuildLayerSnapshot::new();
        for layer in Layer::ALL {
            let sum = layer_checksum(self.project.path(), self.layer_inputs(layer))?;
            debug!(%layer, checksum = %to_hex(sum), "layer checksum");
            snapshot.insert(layer, sum);
        }
        Ok(snapshot)
    }

    /// Compare current inputs with the last committed snapshot.
    ///
    /// A missing image, a missing snapshot, or an unreadable snapshot all
    /// mean every layer changed.
    #[instrument(skip_all, fields(project = %self.project.path_str(), image_exists))]
    pub fn needs_rebuild(&self, image_exists: bool) -> Result<RebuildDecision, SlotError> {
        if !image_exists {
            info!("image missing, full rebuild");
            return Ok(RebuildDecision::all_layers());
        }
        let previous = match load_snapshot(&self.paths.layers_path) {
            Ok(Some(previous)) => previous,
            Ok(None) => {
                info!("no recorded build, full rebuild");
                return Ok(RebuildDecision::all_layers());
            }
            Err(SlotError::StateCorruption { detail, .. }) => {
                warn!(%detail, "ignoring unreadable layer snapshot, full rebuild");
                return Ok(RebuildDecision::all_layers());
            }
            Err(err) => return Err(err),
        };
        let current = self.compute_snapshot()?;
        let decision = RebuildDecision::from_changed(current.changed_since(&previous));
        info!(
            rebuild = decision.rebuild,
            changed = ?decision.changed_layers,
            "build cache checked"
        );
        Ok(decision)
    }

    /// Record `snapshot` as the baseline. Only call after a successful build.
    #[instrument(skip_all, fields(project = %self.project.path_str()))]
    pub fn commit_snapshot(&self, snapshot: &BuildLayerSnapshot) -> Result<(), SlotError> {
        let _lock = ProjectLock::acquire(&self.paths.lock_path)?;
        ensure_project_path(&self.paths, &self.project)?;
        write_snapshot(&self.paths.layers_path, snapshot)?;
        info!("layer snapshot committed");
        Ok(())
    }

    /// Compute and commit the current snapshot in one step.
    pub fn commit_current(&self) -> Result<BuildLayerSnapshot, SlotError> {
        let snapshot = self.compute_snapshot()?;
        self.commit_snapshot(&snapshot)?;
        Ok(snapshot)
    }
}

/// Checksum one layer's inputs in configured order.
///
/// Inputs are identified by the path as configured, not the resolved one,
/// so relocating the project directory does not invalidate the cache.
fn layer_checksum(project_dir: &Path, inputs: &[PathBuf]) -> Result<u32, SlotError> {
    let mut hasher = ChecksumBuilder::new();
    for input in inputs {
        let resolved = if input.is_absolute() {
            input.clone()
        } else {
            project_dir.join(input)
        };
        hasher.update(input.to_string_lossy().as_bytes()).update(b"\0");
        hash_entry(&mut hasher, &resolved)?;
    }
    Ok(hasher.finish())
}

fn hash_entry(hasher: &mut ChecksumBuilder, path: &Path) -> Result<(), SlotError> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            hasher.update(b"missing\0");
            return Ok(());
        }
        Err(err) => return Err(SlotError::fs("stat build input", path, err)),
    };

    if meta.file_type().is_symlink() {
        let target = fs::read_link(path).fs_context("read build input link", path)?;
        hasher
            .update(b"link\0")
            .update(target.to_string_lossy().as_bytes())
            .update(b"\0");
    } else if meta.is_dir() {
        hasher.update(b"dir\0");
        let mut children = Vec::new();
        for entry in fs::read_dir(path).fs_context("read build input directory", path)? {
            let entry = entry.fs_context("read build input directory", path)?;
            children.push(entry.file_name());
        }
        children.sort();
        for name in children {
            hasher.update(name.to_string_lossy().as_bytes()).update(b"\0");
            hash_entry(hasher, &path.join(&name))?;
        }
        hasher.update(b"end\0");
    } else {
        let contents = fs::read(path).fs_context("read build input", path)?;
        hasher
            .update(b"file\0")
            .update(&(contents.len() as u64).to_be_bytes())
            .update(&contents);
    }
    Ok(())
}
