//! Slot lifecycle for one project: allocate, select-for-run, revoke, prune.
//!
//! Slot directories are the source of truth for which indices are live; the
//! counter only bounds the scan. Every mutating operation runs under the
//! project lock, loads the counter once and persists it at most once.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use crate::core::checksum::parse_hex;
use crate::core::identity::{ProjectIdentity, SlotChain, SlotIdentity};
use crate::core::status::{is_free_for_run, resolve_status};
use crate::core::types::{
    RevokeOutcome, RevokeTarget, RunningState, SkipReason, SkippedSlot, SlotHandle, SlotRecord,
};
use crate::error::{FsContext, SlotError};
use crate::io::config::PodslotConfig;
use crate::io::counter::{load_counter, write_counter};
use crate::io::lock::ProjectLock;
use crate::io::paths::ProjectPaths;
use crate::io::project_meta::{ensure_project_path, read_project_path};
use crate::io::runtime::{ContainerRuntime, RunningContainers, RuntimeProbe};

/// Upper bound on chain steps when rebuilding a lost counter.
pub const MAX_REPAIR_SCAN: u32 = 4096;

/// Store settings taken from the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    pub container_prefix: String,
    pub credential_file: String,
}

impl From<&PodslotConfig> for StoreOptions {
    fn from(cfg: &PodslotConfig) -> Self {
        Self {
            container_prefix: cfg.container_prefix.clone(),
            credential_file: cfg.credential_file.clone(),
        }
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::from(&PodslotConfig::default())
    }
}

/// Result of rebuilding the counter from the directories on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOutcome {
    pub counter: u32,
    /// Hex-named directories that are not on this project's chain.
    pub orphans: Vec<PathBuf>,
}

/// Counter loaded under the project lock; written back once on commit.
struct CounterTxn {
    _lock: ProjectLock,
    path: PathBuf,
    loaded: u32,
    value: u32,
}

impl CounterTxn {
    fn commit(self) -> Result<u32, SlotError> {
        if self.value != self.loaded {
            info!(from = self.loaded, to = self.value, "counter updated");
            write_counter(&self.path, self.value)?;
        }
        Ok(self.value)
    }
}

/// All slot state transitions for one project.
pub struct SlotStore<'r, R: ContainerRuntime + ?Sized> {
    project: ProjectIdentity,
    paths: ProjectPaths,
    probe: RuntimeProbe<'r, R>,
    credential_file: String,
}

impl<'r, R: ContainerRuntime + ?Sized> SlotStore<'r, R> {
    /// Open the store for `project_path` under `home`.
    ///
    /// Nothing is written until the first mutating operation.
    pub fn open(
        home: &Path,
        project_path: &Path,
        runtime: &'r R,
        options: &StoreOptions,
    ) -> Result<Self, SlotError> {
        let project = ProjectIdentity::new(project_path)?;
        let paths = ProjectPaths::new(home, &project);
        if let Some(stored) = read_project_path(&paths.path_file)?
            && stored != project.path_str()
        {
            return Err(SlotError::corrupt(
                &paths.path_file,
                format!(
                    "directory belongs to '{stored}', not '{}' (checksum collision)",
                    project.path_str()
                ),
            ));
        }
        debug!(project = %project.path_str(), parent = %paths.parent_dir.display(), "opened slot store");
        Ok(Self {
            probe: RuntimeProbe::new(runtime, options.container_prefix.clone(), project.clone()),
            project,
            paths,
            credential_file: options.credential_file.clone(),
        })
    }

    pub fn project(&self) -> &ProjectIdentity {
        &self.project
    }

    pub fn paths(&self) -> &ProjectPaths {
        &self.paths
    }

    pub fn probe(&self) -> &RuntimeProbe<'r, R> {
        &self.probe
    }

    /// Current counter value (read-only, no lock).
    pub fn counter(&self) -> Result<u32, SlotError> {
        load_counter(&self.paths.counter_path)
    }

    pub fn slot_dir(&self, slot: &SlotIdentity) -> PathBuf {
        self.paths.slot_dir(slot)
    }

    /// Reuse the lowest dead slot, or grow the counter by one.
    ///
    /// A dead slot whose container is somehow still running is passed over.
    /// The runtime is only consulted when a dead slot exists, and a probe
    /// failure aborts the allocation.
    #[instrument(skip_all, fields(project = %self.project.path_str()))]
    pub fn allocate(&self) -> Result<SlotHandle, SlotError> {
        let mut txn = self.begin()?;
        let mut running: Option<RunningContainers> = None;
        let mut reuse = None;

        for slot in self.project.slots(txn.value) {
            if self.slot_exists(&slot)? {
                continue;
            }
            if running.is_none() {
                running = Some(self.probe.snapshot()?);
            }
            if let Some(snapshot) = &running
                && self.probe.is_running_in(snapshot, &slot)
            {
                warn!(slot = slot.index, "dead slot still has a running container, skipping");
                continue;
            }
            reuse = Some(slot);
            break;
        }

        let slot = match reuse {
            Some(slot) => {
                info!(slot = slot.index, checksum = %slot.hex(), "reusing dead slot");
                slot
            }
            None => {
                let next = txn.value.checked_add(1).ok_or_else(|| {
                    SlotError::corrupt(&txn.path, "counter cannot grow past u32::MAX")
                })?;
                txn.value = next;
                let slot = self.project.slot(next);
                info!(slot = slot.index, checksum = %slot.hex(), "allocating new slot");
                slot
            }
        };

        let dir = self.slot_dir(&slot);
        fs::create_dir_all(&dir).fs_context("create slot directory", &dir)?;
        txn.commit()?;
        Ok(self.handle(&slot))
    }

    /// First existing slot whose container is not running.
    ///
    /// `Ok(None)` when no slot exists yet or every slot is busy; the caller
    /// should offer to allocate a new one.
    #[instrument(skip_all, fields(project = %self.project.path_str()))]
    pub fn select_for_run(&self) -> Result<Option<SlotHandle>, SlotError> {
        let counter = self.counter()?;
        let mut existing = Vec::new();
        for slot in self.project.slots(counter) {
            if self.slot_exists(&slot)? {
                existing.push(slot);
            }
        }
        if existing.is_empty() {
            debug!(counter, "no slot directories exist");
            return Ok(None);
        }

        let running = self.probe.snapshot()?;
        for slot in &existing {
            let state = if self.probe.is_running_in(&running, slot) {
                RunningState::Running
            } else {
                RunningState::NotRunning
            };
            if !is_free_for_run(resolve_status(true, state)) {
                debug!(slot = slot.index, "slot busy");
                continue;
            }
            debug!(slot = slot.index, "selected slot for run");
            return Ok(Some(self.handle(slot)));
        }
        debug!(existing = existing.len(), "all slots busy");
        Ok(None)
    }

    /// Remove slot directories per `target`.
    ///
    /// Slots whose container is running, or whose running state cannot be
    /// probed, are skipped and reported in the outcome. A directory removal
    /// failure aborts the operation; the counter is then left untouched and
    /// the next prune reconciles it.
    #[instrument(skip_all, fields(project = %self.project.path_str(), revoke_target = ?target))]
    pub fn revoke(&self, target: RevokeTarget) -> Result<RevokeOutcome, SlotError> {
        let mut txn = self.begin()?;
        if txn.value == 0 {
            return Err(SlotError::NoSlots);
        }
        let mut outcome = RevokeOutcome::default();

        match target {
            RevokeTarget::Highest => {
                let slot = self.project.slot(txn.value);
                if self.slot_exists(&slot)? {
                    if self.revoke_one(&slot, &mut outcome)? {
                        txn.value -= 1;
                    }
                } else {
                    debug!(slot = slot.index, "highest slot already gone, pruning");
                    txn.value = self.highest_existing(txn.value)?;
                }
            }
            RevokeTarget::Index(index) => {
                if index > txn.value {
                    return Err(SlotError::InvalidInput(format!(
                        "slot {index} was never allocated (highest is {})",
                        txn.value
                    )));
                }
                let slot = self.project.slot(index);
                if self.slot_exists(&slot)? {
                    self.revoke_one(&slot, &mut outcome)?;
                } else {
                    debug!(slot = index, "slot directory already gone");
                }
                if index == txn.value {
                    txn.value = self.highest_existing(txn.value)?;
                }
            }
            RevokeTarget::All => {
                // One runtime query for the whole sweep; if it fails every
                // existing slot is skipped rather than assumed idle.
                let running = self.probe.snapshot();
                let slots: Vec<SlotIdentity> = self.project.slots(txn.value).collect();
                for slot in slots.iter().rev() {
                    if !self.slot_exists(slot)? {
                        continue;
                    }
                    let skip = match &running {
                        Ok(running) if self.probe.is_running_in(running, slot) => {
                            Some(SkipReason::Running)
                        }
                        Ok(_) => None,
                        Err(err) => Some(SkipReason::ProbeFailed(err.to_string())),
                    };
                    match skip {
                        Some(reason) => self.skip(slot, reason, &mut outcome),
                        None => self.remove_slot_dir(slot, &mut outcome)?,
                    }
                }
                txn.value = if outcome.skipped.is_empty() {
                    0
                } else {
                    self.highest_existing(txn.value)?
                };
            }
        }

        outcome.counter = txn.commit()?;
        Ok(outcome)
    }

    /// Lower the counter to the highest index whose directory still exists.
    #[instrument(skip_all, fields(project = %self.project.path_str()))]
    pub fn prune(&self) -> Result<u32, SlotError> {
        let mut txn = self.begin()?;
        txn.value = self.highest_existing(txn.value)?;
        txn.commit()
    }

    /// Rebuild the counter from directory names, ignoring the counter file.
    ///
    /// Used when the counter file is corrupt. Walks the chain up to
    /// [`MAX_REPAIR_SCAN`] steps or until every hex-named directory is
    /// accounted for.
    #[instrument(skip_all, fields(project = %self.project.path_str()))]
    pub fn repair(&self) -> Result<RepairOutcome, SlotError> {
        let lock = ProjectLock::acquire(&self.paths.lock_path)?;
        ensure_project_path(&self.paths, &self.project)?;

        let mut pending: Vec<(u32, PathBuf)> = Vec::new();
        let entries = fs::read_dir(&self.paths.parent_dir)
            .fs_context("read directory", &self.paths.parent_dir)?;
        for entry in entries {
            let entry = entry.fs_context("read directory entry", &self.paths.parent_dir)?;
            let path = entry.path();
            let Some(checksum) = entry.file_name().to_str().and_then(parse_hex) else {
                continue;
            };
            if path.is_dir() {
                pending.push((checksum, path));
            }
        }

        let mut counter = 0;
        for slot in self.project.slots(MAX_REPAIR_SCAN) {
            if pending.is_empty() {
                break;
            }
            if let Some(pos) = pending.iter().position(|(sum, _)| *sum == slot.checksum) {
                pending.swap_remove(pos);
                counter = slot.index;
            }
        }

        let mut orphans: Vec<PathBuf> = pending.into_iter().map(|(_, path)| path).collect();
        orphans.sort();
        for orphan in &orphans {
            warn!(dir = %orphan.display(), "directory is not a slot of this project");
        }
        info!(counter, "counter rebuilt from slot directories");
        write_counter(&self.paths.counter_path, counter)?;
        drop(lock);
        Ok(RepairOutcome { counter, orphans })
    }

    /// Records for slots `1..=counter`, lazily.
    ///
    /// Never mutates state. The runtime is queried once up front; if that
    /// fails every record reports [`RunningState::Unknown`]. Call
    /// [`SlotStore::prune`] first to drop trailing dead slots.
    pub fn list(&self) -> Result<SlotListing<'_, 'r, R>, SlotError> {
        let counter = self.counter()?;
        let running = match self.probe.snapshot() {
            Ok(running) => Some(running),
            Err(err) => {
                warn!(err = %err, "listing without running state");
                None
            }
        };
        Ok(SlotListing {
            store: self,
            chain: self.project.slots(counter),
            running,
        })
    }

    fn begin(&self) -> Result<CounterTxn, SlotError> {
        let lock = ProjectLock::acquire(&self.paths.lock_path)?;
        ensure_project_path(&self.paths, &self.project)?;
        let loaded = load_counter(&self.paths.counter_path)?;
        Ok(CounterTxn {
            _lock: lock,
            path: self.paths.counter_path.clone(),
            loaded,
            value: loaded,
        })
    }

    /// Probe and remove a single slot. Returns whether it was removed.
    fn revoke_one(
        &self,
        slot: &SlotIdentity,
        outcome: &mut RevokeOutcome,
    ) -> Result<bool, SlotError> {
        match self.probe.is_running(slot) {
            Ok(false) => {
                self.remove_slot_dir(slot, outcome)?;
                Ok(true)
            }
            Ok(true) => {
                self.skip(slot, SkipReason::Running, outcome);
                Ok(false)
            }
            Err(err) => {
                self.skip(slot, SkipReason::ProbeFailed(err.to_string()), outcome);
                Ok(false)
            }
        }
    }

    fn remove_slot_dir(
        &self,
        slot: &SlotIdentity,
        outcome: &mut RevokeOutcome,
    ) -> Result<(), SlotError> {
        let dir = self.slot_dir(slot);
        fs::remove_dir_all(&dir).fs_context("remove slot directory", &dir)?;
        info!(slot = slot.index, checksum = %slot.hex(), "slot removed");
        outcome.removed.push(slot.index);
        Ok(())
    }

    fn skip(&self, slot: &SlotIdentity, reason: SkipReason, outcome: &mut RevokeOutcome) {
        warn!(slot = slot.index, %reason, "slot left in place");
        outcome.skipped.push(SkippedSlot {
            index: slot.index,
            checksum: slot.hex(),
            reason,
        });
    }

    fn highest_existing(&self, counter: u32) -> Result<u32, SlotError> {
        let slots: Vec<SlotIdentity> = self.project.slots(counter).collect();
        for slot in slots.iter().rev() {
            if self.slot_exists(slot)? {
                return Ok(slot.index);
            }
        }
        Ok(0)
    }

    fn slot_exists(&self, slot: &SlotIdentity) -> Result<bool, SlotError> {
        let dir = self.slot_dir(slot);
        match fs::metadata(&dir) {
            Ok(meta) if meta.is_dir() => Ok(true),
            Ok(_) => Err(SlotError::corrupt(&dir, "slot path exists but is not a directory")),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(SlotError::fs("stat slot directory", &dir, err)),
        }
    }

    fn handle(&self, slot: &SlotIdentity) -> SlotHandle {
        SlotHandle {
            index: slot.index,
            checksum: slot.hex(),
            directory: self.slot_dir(slot),
            container_name: self.probe.container_name(slot),
        }
    }

    fn record(
        &self,
        slot: &SlotIdentity,
        running: Option<&RunningContainers>,
    ) -> Result<SlotRecord, SlotError> {
        let directory = self.slot_dir(slot);
        let directory_exists = self.slot_exists(slot)?;
        let credential_present =
            directory_exists && directory.join(&self.credential_file).is_file();
        let running = match running {
            Some(running) if self.probe.is_running_in(running, slot) => RunningState::Running,
            Some(_) => RunningState::NotRunning,
            None => RunningState::Unknown,
        };
        Ok(SlotRecord {
            index: slot.index,
            checksum: slot.hex(),
            directory,
            directory_exists,
            credential_present,
            running,
            status: resolve_status(directory_exists, running),
        })
    }
}

/// Lazy, finite listing of a project's slots.
///
/// Clone before iterating to walk it more than once.
pub struct SlotListing<'s, 'r, R: ContainerRuntime + ?Sized> {
    store: &'s SlotStore<'r, R>,
    chain: SlotChain,
    running: Option<RunningContainers>,
}

impl<R: ContainerRuntime + ?Sized> Clone for SlotListing<'_, '_, R> {
    fn clone(&self) -> Self {
        Self {
            store: self.store,
            chain: self.chain.clone(),
            running: self.running.clone(),
        }
    }
}

impl<R: ContainerRuntime + ?Sized> Iterator for SlotListing<'_, '_, R> {
    type Item = Result<SlotRecord, SlotError>;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.chain.next()?;
        Some(self.store.record(&slot, self.running.as_ref()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chain.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeRuntime, TestProject};

    #[test]
    fn first_allocation_creates_slot_one() {
        let fixture = TestProject::new().expect("fixture");
        let runtime = FakeRuntime::new();
        let store = fixture.store(&runtime).expect("store");

        let handle = store.allocate().expect("allocate");
        assert_eq!(handle.index, 1);
        assert_eq!(handle.checksum, store.project().slot(1).hex());
        assert!(handle.directory.is_dir());
        assert_eq!(store.counter().expect("counter"), 1);
        assert_eq!(runtime.ps_calls(), 0, "no dead slots, no probe");
    }

    #[test]
    fn allocate_records_project_path() {
        let fixture = TestProject::new().expect("fixture");
        let runtime = FakeRuntime::new();
        let store = fixture.store(&runtime).expect("store");
        store.allocate().expect("allocate");
        assert_eq!(
            read_project_path(&store.paths().path_file).expect("read"),
            Some(store.project().path_str().to_string())
        );
    }

    #[test]
    fn allocate_skips_dead_slot_with_running_container() {
        let fixture = TestProject::new().expect("fixture");
        let runtime = FakeRuntime::new();
        let store = fixture.store(&runtime).expect("store");
        fixture.seed(&store, 2, &[2]).expect("seed");
        runtime.set_running(vec![store.probe().container_name(&store.project().slot(1))]);

        let handle = store.allocate().expect("allocate");
        assert_eq!(handle.index, 3);
        assert_eq!(store.counter().expect("counter"), 3);
    }

    #[test]
    fn allocate_surfaces_probe_failure_when_reusing() {
        let fixture = TestProject::new().expect("fixture");
        let runtime = FakeRuntime::new();
        let store = fixture.store(&runtime).expect("store");
        fixture.seed(&store, 2, &[2]).expect("seed");
        runtime.fail_with("daemon down");

        assert!(matches!(
            store.allocate(),
            Err(SlotError::RuntimeUnavailable(_))
        ));
        assert_eq!(store.counter().expect("counter"), 2);
        assert!(!store.slot_dir(&store.project().slot(1)).exists());
    }

    #[test]
    fn non_directory_slot_path_is_corruption() {
        let fixture = TestProject::new().expect("fixture");
        let runtime = FakeRuntime::new();
        let store = fixture.store(&runtime).expect("store");
        fixture.seed(&store, 1, &[]).expect("seed");
        let slot = store.project().slot(1);
        fs::write(store.slot_dir(&slot), "oops").expect("write file");

        assert!(matches!(
            store.select_for_run(),
            Err(SlotError::StateCorruption { .. })
        ));
    }

    #[test]
    fn open_rejects_foreign_parent_directory() {
        let fixture = TestProject::new().expect("fixture");
        let runtime = FakeRuntime::new();
        let store = fixture.store(&runtime).expect("store");
        crate::io::atomic::write_atomic(&store.paths().path_file, "/elsewhere").expect("write");

        assert!(matches!(
            fixture.store(&runtime),
            Err(SlotError::StateCorruption { .. })
        ));
    }

    #[test]
    fn repair_rebuilds_counter_and_reports_orphans() {
        let fixture = TestProject::new().expect("fixture");
        let runtime = FakeRuntime::new();
        let store = fixture.store(&runtime).expect("store");
        fixture.seed(&store, 4, &[2, 4]).expect("seed");
        fs::write(&store.paths().counter_path, "garbage").expect("corrupt counter");
        let orphan = store.paths().parent_dir.join("0badf00d");
        fs::create_dir_all(&orphan).expect("orphan");

        assert!(matches!(
            store.prune(),
            Err(SlotError::StateCorruption { .. })
        ));
        let outcome = store.repair().expect("repair");
        assert_eq!(outcome.counter, 4);
        assert_eq!(outcome.orphans, vec![orphan]);
        assert_eq!(store.counter().expect("counter"), 4);
    }

    #[test]
    fn listing_is_restartable_and_read_only() {
        let fixture = TestProject::new().expect("fixture");
        let runtime = FakeRuntime::new();
        let store = fixture.store(&runtime).expect("store");
        fixture.seed(&store, 3, &[3]).expect("seed");

        let listing = store.list().expect("list");
        let first: Vec<SlotRecord> = listing.clone().collect::<Result<_, _>>().expect("records");
        let second: Vec<SlotRecord> = listing.collect::<Result<_, _>>().expect("records");
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert_eq!(store.counter().expect("counter"), 3);
    }
}
