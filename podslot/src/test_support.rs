//! Test-only helpers: a scripted container runtime and a temp project fixture.

use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;

use crate::error::SlotError;
use crate::io::counter::write_counter;
use crate::io::runtime::ContainerRuntime;
use crate::store::{SlotStore, StoreOptions};

/// In-memory runtime whose running containers and images are set by tests.
#[derive(Debug, Default)]
pub struct FakeRuntime {
    running: RefCell<Vec<String>>,
    images: RefCell<Vec<String>>,
    failure: RefCell<Option<String>>,
    ps_calls: Cell<usize>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_running(&self, names: Vec<String>) {
        *self.running.borrow_mut() = names;
    }

    pub fn add_image(&self, name: &str) {
        self.images.borrow_mut().push(name.to_string());
    }

    /// Make every subsequent query fail as if the daemon were down.
    pub fn fail_with(&self, message: &str) {
        *self.failure.borrow_mut() = Some(message.to_string());
    }

    pub fn recover(&self) {
        *self.failure.borrow_mut() = None;
    }

    /// Number of `list_running_container_names` calls so far.
    pub fn ps_calls(&self) -> usize {
        self.ps_calls.get()
    }

    fn check_failure(&self) -> Result<(), SlotError> {
        match self.failure.borrow().as_ref() {
            Some(message) => Err(SlotError::RuntimeUnavailable(message.clone())),
            None => Ok(()),
        }
    }
}

impl ContainerRuntime for FakeRuntime {
    fn list_running_container_names(&self) -> Result<Vec<String>, SlotError> {
        self.ps_calls.set(self.ps_calls.get() + 1);
        self.check_failure()?;
        Ok(self.running.borrow().clone())
    }

    fn inspect_image(&self, name: &str) -> Result<bool, SlotError> {
        self.check_failure()?;
        Ok(self.images.borrow().iter().any(|image| image == name))
    }
}

/// Temp home plus a temp project directory.
pub struct TestProject {
    home: TempDir,
    project: TempDir,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        Ok(Self {
            home: tempfile::tempdir().context("create home tempdir")?,
            project: tempfile::tempdir().context("create project tempdir")?,
        })
    }

    pub fn home(&self) -> &Path {
        self.home.path()
    }

    pub fn project_path(&self) -> &Path {
        self.project.path()
    }

    pub fn store<'r>(&self, runtime: &'r FakeRuntime) -> Result<SlotStore<'r, FakeRuntime>, SlotError> {
        SlotStore::open(
            self.home(),
            self.project_path(),
            runtime,
            &StoreOptions::default(),
        )
    }

    /// Write `counter` and create directories for exactly the `present` slots.
    pub fn seed<R: ContainerRuntime + ?Sized>(
        &self,
        store: &SlotStore<'_, R>,
        counter: u32,
        present: &[u32],
    ) -> Result<()> {
        for index in present {
            let dir = store.slot_dir(&store.project().slot(*index));
            fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        }
        write_counter(&store.paths().counter_path, counter)?;
        Ok(())
    }

    /// Write a file into the project directory, creating parents.
    pub fn write_input(&self, relative: &str, contents: &str) -> Result<PathBuf> {
        let path = self.project_path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}
